//! Live video streams and the frames they produce.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// Camera frame data
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Bytes,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32, frame_number: u64) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    /// True when the pixel buffer matches the declared dimensions.
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Which device a stream request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamConstraint {
    /// Exactly this device identifier.
    Exact(String),
    /// Any available video input.
    AnyVideo,
}

/// A live video stream owned by whoever opened it.
///
/// The owner must call [`VideoStream::stop`] when done; stopping twice is a no-op.
pub trait VideoStream: Send + Sync {
    /// Identifier of the device backing this stream.
    fn device_id(&self) -> &str;

    /// Natural frame size; `(0, 0)` until the first frame arrives.
    fn natural_size(&self) -> (u32, u32);

    /// Most recent frame, if any.
    fn latest_frame(&self) -> Option<CameraFrame>;

    /// Whether the stream still has live tracks.
    fn is_live(&self) -> bool;

    /// Stop every track of this stream.
    fn stop(&self);
}

/// Shared handle to a live stream.
pub type StreamHandle = Arc<dyn VideoStream>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_completeness() {
        assert!(CameraFrame::new(vec![0u8; 2 * 2 * 4], 2, 2, 0).is_complete());
        assert!(!CameraFrame::new(vec![0u8; 7], 2, 2, 0).is_complete());
        assert!(!CameraFrame::new(Vec::<u8>::new(), 0, 0, 0).is_complete());
    }
}
