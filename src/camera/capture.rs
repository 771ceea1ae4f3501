//! Frame capture for calibration submissions.
//!
//! Frames are addressed by camera slot only; the capturer reads whatever
//! stream the lifecycle manager currently has bound to that slot.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ExtendedColorType, RgbaImage};
use std::sync::Arc;

use super::lifecycle::StreamLifecycleManager;
use super::stream::CameraFrame;
use crate::error::{Error, Result};

/// A still image ready to send to the calibration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
}

impl EncodedImage {
    /// Size of the JPEG payload before base64 expansion.
    pub fn jpeg_len(&self) -> usize {
        let encoded = self
            .data_url
            .split_once(',')
            .map_or(0, |(_, payload)| payload.len());
        encoded / 4 * 3
    }
}

/// Snapshots bound camera slots into JPEG data URLs.
pub struct FrameCapturer {
    streams: Arc<StreamLifecycleManager>,
    jpeg_quality: u8,
}

impl FrameCapturer {
    pub fn new(streams: Arc<StreamLifecycleManager>, jpeg_quality: u8) -> Self {
        Self {
            streams,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Encode the current frame of `slot`.
    pub fn capture(&self, slot: usize) -> Result<EncodedImage> {
        let image = self.snapshot(slot)?;
        self.encode(image)
    }

    /// Encode `left` and `right` side by side: combined width, tallest height.
    ///
    /// The stereo sample travels to the service as one image.
    pub fn capture_pair(&self, left: usize, right: usize) -> Result<EncodedImage> {
        let left_image = self.snapshot(left)?;
        let right_image = self.snapshot(right)?;
        self.encode(compose_side_by_side(&left_image, &right_image))
    }

    fn snapshot(&self, slot: usize) -> Result<RgbaImage> {
        let stream = self.streams.stream(slot).ok_or(Error::NotReady(slot))?;
        let (width, height) = stream.natural_size();
        if width == 0 || height == 0 {
            return Err(Error::NotReady(slot));
        }
        let frame = stream.latest_frame().ok_or(Error::NotReady(slot))?;
        frame_to_image(frame).ok_or(Error::NotReady(slot))
    }

    fn encode(&self, image: RgbaImage) -> Result<EncodedImage> {
        let (width, height) = image.dimensions();
        let rgb = DynamicImage::ImageRgba8(image).to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| Error::Encode(e.to_string()))?;

        log::debug!("Encoded {}x{} frame ({} bytes)", width, height, jpeg.len());
        Ok(EncodedImage {
            width,
            height,
            data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
        })
    }
}

fn frame_to_image(frame: CameraFrame) -> Option<RgbaImage> {
    if !frame.is_complete() {
        return None;
    }
    RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
}

/// Place two images next to each other on a black canvas.
pub fn compose_side_by_side(left: &RgbaImage, right: &RgbaImage) -> RgbaImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, i64::from(left.width()), 0);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::surface::{DisplaySurface, PreviewSurface};
    use crate::camera::testing::FakeBackend;
    use crate::config::CameraConfig;
    use crate::notify::Notifier;

    fn capturer(backend: FakeBackend) -> (Arc<StreamLifecycleManager>, FrameCapturer) {
        let surfaces: Vec<Arc<dyn DisplaySurface>> = (0..3)
            .map(|i| Arc::new(PreviewSurface::new(format!("camera {}", i))) as Arc<dyn DisplaySurface>)
            .collect();
        let (notifier, _rx) = Notifier::channel();
        let manager = Arc::new(StreamLifecycleManager::new(
            Arc::new(backend),
            surfaces,
            &CameraConfig::default(),
            notifier,
        ));
        let capturer = FrameCapturer::new(manager.clone(), 90);
        (manager, capturer)
    }

    fn decode(image: &EncodedImage) -> DynamicImage {
        let payload = image.data_url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbound_slot_is_not_ready_until_bound() {
        let (manager, capturer) =
            capturer(FakeBackend::with_devices(&["cam-a"]).frame_size("cam-a", 32, 24));

        assert!(matches!(capturer.capture(0), Err(Error::NotReady(0))));

        manager.initialize(&[0]).await.unwrap();
        let image = capturer.capture(0).unwrap();

        assert_eq!((image.width, image.height), (32, 24));
        assert!(image.jpeg_len() > 0);
        let decoded = decode(&image);
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_without_frames_is_not_ready() {
        let (manager, capturer) = capturer(FakeBackend::with_devices(&["cam-a"]).without_frames("cam-a"));
        manager.initialize(&[0]).await.unwrap();

        assert!(matches!(capturer.capture(0), Err(Error::NotReady(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_is_side_by_side() {
        let (manager, capturer) = capturer(
            FakeBackend::with_devices(&["cam-a", "cam-b", "cam-c"])
                .frame_size("cam-a", 32, 16)
                .frame_size("cam-c", 16, 24),
        );
        manager.initialize(&[0, 2]).await.unwrap();

        let image = capturer.capture_pair(0, 2).unwrap();

        assert_eq!((image.width, image.height), (48, 24));
        let decoded = decode(&image);
        assert_eq!((decoded.width(), decoded.height()), (48, 24));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_requires_both_slots() {
        let (manager, capturer) = capturer(FakeBackend::with_devices(&["cam-a"]));
        manager.initialize(&[0]).await.unwrap();

        assert!(matches!(capturer.capture_pair(0, 2), Err(Error::NotReady(2))));
    }

    #[test]
    fn test_compose_pads_shorter_image() {
        let left = RgbaImage::from_pixel(2, 1, image::Rgba([255, 0, 0, 255]));
        let right = RgbaImage::from_pixel(3, 2, image::Rgba([0, 255, 0, 255]));

        let canvas = compose_side_by_side(&left, &right);

        assert_eq!(canvas.dimensions(), (5, 2));
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(0, 1).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(4, 1).0, [0, 255, 0, 255]);
    }
}
