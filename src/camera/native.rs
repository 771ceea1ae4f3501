//! Native camera backend
//!
//! Cross-platform capture using the nokhwa crate. Each open stream runs a
//! dedicated capture thread that keeps the latest decoded frame in a triple
//! buffer for the UI and the frame capturer.

use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::device::{MediaBackend, VideoDevice};
use super::stream::{CameraFrame, StreamConstraint, StreamHandle, VideoStream};
use crate::error::{Error, Result};

/// How long to wait for a capture thread to report that its stream opened.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Media backend over the platform camera API.
pub struct NokhwaBackend {
    requested_width: u32,
    requested_height: u32,
    /// Device ids with a live stream opened through this backend.
    opened: Arc<Mutex<HashSet<String>>>,
}

impl NokhwaBackend {
    pub fn new(requested_width: u32, requested_height: u32) -> Self {
        Self {
            requested_width,
            requested_height,
            opened: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn query() -> Result<Vec<VideoDevice>> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Error::Unsupported
        })?;

        Ok(cameras
            .iter()
            .enumerate()
            .map(|(idx, info)| VideoDevice {
                index: idx,
                id: info.index().to_string(),
                label: info.human_name(),
            })
            .collect())
    }
}

#[async_trait]
impl MediaBackend for NokhwaBackend {
    fn is_supported(&self) -> bool {
        nokhwa::native_api_backend().is_some()
    }

    async fn request_access(&self) -> Result<Option<StreamHandle>> {
        let granted = tokio::task::spawn_blocking(|| {
            let (tx, rx) = crossbeam_channel::bounded(1);
            nokhwa::nokhwa_initialize(move |granted| {
                let _ = tx.send(granted);
            });
            rx.recv_timeout(Duration::from_secs(30)).unwrap_or(false) || nokhwa::nokhwa_check()
        })
        .await
        .map_err(|e| Error::Bind(format!("permission task failed: {}", e)))?;

        if granted {
            Ok(None)
        } else {
            Err(Error::PermissionDenied)
        }
    }

    async fn enumerate(&self) -> Result<Vec<VideoDevice>> {
        tokio::task::spawn_blocking(Self::query)
            .await
            .map_err(|e| Error::Bind(format!("enumeration task failed: {}", e)))?
    }

    async fn open(&self, constraint: &StreamConstraint) -> Result<StreamHandle> {
        let devices = self.enumerate().await?;
        let device = {
            let opened = self.opened.lock();
            match constraint {
                StreamConstraint::Exact(id) => devices.into_iter().find(|d| &d.id == id),
                StreamConstraint::AnyVideo => {
                    devices.into_iter().find(|d| !opened.contains(&d.id))
                }
            }
        }
        .ok_or_else(|| Error::Bind(format!("no camera matches {:?}", constraint)))?;

        let width = self.requested_width;
        let height = self.requested_height;
        let opened = self.opened.clone();
        let stream = tokio::task::spawn_blocking(move || {
            NokhwaStream::open(device, width, height, opened)
        })
        .await
        .map_err(|e| Error::Bind(format!("open task failed: {}", e)))??;

        let handle: StreamHandle = Arc::new(stream);
        Ok(handle)
    }
}

/// Shared state between a capture thread and the stream handle.
struct CaptureShared {
    /// Latest captured frames (triple buffered)
    frames: [Mutex<Option<CameraFrame>>; 3],
    /// Index of the latest complete frame
    latest_frame_idx: AtomicU64,
    /// Whether any frame has been written yet
    has_frame: AtomicBool,
    /// Whether capture is running
    running: AtomicBool,
    /// Natural size of the negotiated format
    size: Mutex<(u32, u32)>,
}

/// Live camera stream backed by a capture thread.
pub struct NokhwaStream {
    device_id: String,
    shared: Arc<CaptureShared>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    opened: Arc<Mutex<HashSet<String>>>,
}

impl NokhwaStream {
    fn open(
        device: VideoDevice,
        width: u32,
        height: u32,
        opened: Arc<Mutex<HashSet<String>>>,
    ) -> Result<Self> {
        let shared = Arc::new(CaptureShared {
            frames: [Mutex::new(None), Mutex::new(None), Mutex::new(None)],
            latest_frame_idx: AtomicU64::new(0),
            has_frame: AtomicBool::new(false),
            running: AtomicBool::new(true),
            size: Mutex::new((0, 0)),
        });

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let thread_shared = shared.clone();
        let index = CameraIndex::Index(device.index as u32);
        let thread_handle = std::thread::Builder::new()
            .name(format!("camera-capture-{}", device.index))
            .spawn(move || capture_thread(index, width, height, thread_shared, ready_tx))
            .map_err(|e| Error::Bind(format!("failed to spawn capture thread: {}", e)))?;

        let ready = ready_rx
            .recv_timeout(OPEN_TIMEOUT)
            .unwrap_or_else(|_| Err("camera did not start in time".to_string()));

        if let Err(reason) = ready {
            shared.running.store(false, Ordering::Release);
            let _ = thread_handle.join();
            return Err(Error::Bind(format!("{}: {}", device.label, reason)));
        }

        opened.lock().insert(device.id.clone());
        Ok(Self {
            device_id: device.id,
            shared,
            thread_handle: Mutex::new(Some(thread_handle)),
            opened,
        })
    }
}

impl VideoStream for NokhwaStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn natural_size(&self) -> (u32, u32) {
        if self.shared.has_frame.load(Ordering::Acquire) {
            *self.shared.size.lock()
        } else {
            (0, 0)
        }
    }

    fn latest_frame(&self) -> Option<CameraFrame> {
        if !self.shared.has_frame.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.shared.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.shared.frames[slot].lock().clone()
    }

    fn is_live(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.lock().take() {
            release_when_finished(handle, self.device_id.clone(), self.opened.clone());
        }
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Join a capture thread off the caller's thread, then mark its device free.
///
/// A frame read on an unplugged device can block for a long time, so `stop`
/// returns immediately and the join happens on a short-lived reaper thread.
fn release_when_finished(
    handle: JoinHandle<()>,
    device_id: String,
    opened: Arc<Mutex<HashSet<String>>>,
) {
    let reaper = std::thread::Builder::new()
        .name(format!("camera-release-{}", device_id))
        .spawn({
            let device_id = device_id.clone();
            let opened = opened.clone();
            move || {
                let _ = handle.join();
                opened.lock().remove(&device_id);
                log::info!("Camera stream {} stopped", device_id);
            }
        });
    if let Err(e) = reaper {
        // The capture thread still exits on its own once it sees `running`
        // cleared; only the bookkeeping is lost.
        log::warn!("Failed to spawn release thread for {}: {}", device_id, e);
        opened.lock().remove(&device_id);
    }
}

fn open_camera(index: &CameraIndex, width: u32, height: u32) -> std::result::Result<Camera, String> {
    let closest = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
        CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30),
    ));

    match Camera::new(index.clone(), closest) {
        Ok(c) => Ok(c),
        Err(e) => {
            log::warn!("Failed to open camera {} at {}x{}: {:?}", index, width, height, e);

            let highest = RequestedFormat::new::<RgbAFormat>(
                RequestedFormatType::AbsoluteHighestResolution,
            );
            match Camera::new(index.clone(), highest) {
                Ok(c) => Ok(c),
                Err(e2) => {
                    log::warn!("Failed with AbsoluteHighestResolution: {:?}", e2);
                    let any = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
                    Camera::new(index.clone(), any).map_err(|e3| format!("{:?}", e3))
                }
            }
        }
    }
}

fn capture_thread(
    index: CameraIndex,
    width: u32,
    height: u32,
    shared: Arc<CaptureShared>,
    ready: crossbeam_channel::Sender<std::result::Result<(), String>>,
) {
    log::info!("Starting camera capture thread (camera {})", index);

    let mut camera = match open_camera(&index, width, height) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(format!("failed to open camera stream: {:?}", e)));
        return;
    }

    log::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );
    let _ = ready.send(Ok(()));

    let mut write_idx: u64 = 0;
    let mut frame_number: u64 = 0;

    while shared.running.load(Ordering::Acquire) {
        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to capture frame: {:?}", e);
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        match frame.decode_image::<RgbAFormat>() {
            Ok(image) => {
                let (w, h) = (image.width(), image.height());
                let camera_frame = CameraFrame::new(image.into_raw(), w, h, frame_number);
                frame_number += 1;

                let slot = (write_idx % 3) as usize;
                *shared.frames[slot].lock() = Some(camera_frame);
                *shared.size.lock() = (w, h);
                shared.latest_frame_idx.store(write_idx, Ordering::Release);
                shared.has_frame.store(true, Ordering::Release);
                write_idx = write_idx.wrapping_add(1);
            }
            Err(e) => {
                log::warn!("Failed to decode frame: {:?}", e);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        log::warn!("Failed to stop camera stream: {:?}", e);
    }
    log::info!("Camera capture thread stopped (camera {})", index);
}
