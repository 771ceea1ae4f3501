//! Scripted in-memory media backend for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::device::{MediaBackend, VideoDevice};
use super::stream::{CameraFrame, StreamConstraint, StreamHandle, VideoStream};
use super::surface::{DisplaySurface, PreviewSurface};
use crate::error::{Error, Result};

struct FakeDevice {
    id: String,
    available: bool,
    size: (u32, u32),
}

pub(crate) struct FakeBackend {
    devices: Vec<FakeDevice>,
    supported: bool,
    permission: bool,
    open_delay: Duration,
    live: Arc<AtomicUsize>,
    probes: AtomicUsize,
    requests: Mutex<Vec<StreamConstraint>>,
}

impl FakeBackend {
    pub fn with_devices(ids: &[&str]) -> Self {
        Self {
            devices: ids
                .iter()
                .map(|id| FakeDevice {
                    id: id.to_string(),
                    available: true,
                    size: (8, 6),
                })
                .collect(),
            supported: true,
            permission: true,
            open_delay: Duration::ZERO,
            live: Arc::new(AtomicUsize::new(0)),
            probes: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission = false;
        self
    }

    /// Listed but cannot be opened.
    pub fn unavailable(mut self, id: &str) -> Self {
        for device in self.devices.iter_mut().filter(|d| d.id == id) {
            device.available = false;
        }
        self
    }

    /// Opens fine but never produces frames.
    pub fn without_frames(mut self, id: &str) -> Self {
        for device in self.devices.iter_mut().filter(|d| d.id == id) {
            device.size = (0, 0);
        }
        self
    }

    pub fn frame_size(mut self, id: &str, width: u32, height: u32) -> Self {
        for device in self.devices.iter_mut().filter(|d| d.id == id) {
            device.size = (width, height);
        }
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn device(&self, index: usize) -> VideoDevice {
        VideoDevice {
            index,
            id: self.devices[index].id.clone(),
            label: format!("Fake Camera {}", index),
        }
    }

    pub fn open_requests(&self) -> Vec<StreamConstraint> {
        self.requests.lock().clone()
    }

    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn probes_opened(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn spawn_stream(&self, id: &str, size: (u32, u32)) -> Arc<FakeStream> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeStream {
            device_id: id.to_string(),
            size,
            live: AtomicBool::new(true),
            counter: Some(self.live.clone()),
        })
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_access(&self) -> Result<Option<StreamHandle>> {
        if !self.permission {
            return Err(Error::PermissionDenied);
        }
        self.probes.fetch_add(1, Ordering::SeqCst);
        let probe: StreamHandle = self.spawn_stream("probe", (8, 6));
        Ok(Some(probe))
    }

    async fn enumerate(&self) -> Result<Vec<VideoDevice>> {
        Ok((0..self.devices.len()).map(|i| self.device(i)).collect())
    }

    async fn open(&self, constraint: &StreamConstraint) -> Result<StreamHandle> {
        self.requests.lock().push(constraint.clone());
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        let device = match constraint {
            StreamConstraint::Exact(id) => self.devices.iter().find(|d| &d.id == id && d.available),
            StreamConstraint::AnyVideo => self.devices.iter().find(|d| d.available),
        };

        match device {
            Some(d) => {
                let stream: StreamHandle = self.spawn_stream(&d.id, d.size);
                Ok(stream)
            }
            None => Err(Error::Bind("device could not be started".to_string())),
        }
    }
}

pub(crate) struct FakeStream {
    device_id: String,
    size: (u32, u32),
    live: AtomicBool,
    counter: Option<Arc<AtomicUsize>>,
}

impl FakeStream {
    pub fn standalone(id: &str, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            device_id: id.to_string(),
            size: (width, height),
            live: AtomicBool::new(true),
            counter: None,
        })
    }
}

impl VideoStream for FakeStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn natural_size(&self) -> (u32, u32) {
        self.size
    }

    fn latest_frame(&self) -> Option<CameraFrame> {
        let (w, h) = self.size;
        if w == 0 || h == 0 || !self.is_live() {
            return None;
        }
        let shade = (self.device_id.len() * 40 % 256) as u8;
        let data: Vec<u8> = (0..w * h).flat_map(|_| [shade, shade, shade, 255]).collect();
        Some(CameraFrame::new(data, w, h, 0))
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            if let Some(counter) = &self.counter {
                counter.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

/// Surface whose first `failures` play attempts fail.
pub(crate) struct FlakySurface {
    inner: PreviewSurface,
    failures: u64,
    attempts: AtomicU64,
}

impl FlakySurface {
    pub fn failing(failures: u64) -> Self {
        Self {
            inner: PreviewSurface::new("flaky"),
            failures,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn play_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DisplaySurface for FlakySurface {
    fn attach(&self, stream: StreamHandle) {
        self.inner.attach(stream);
    }

    async fn play(&self) -> std::result::Result<(), String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err("playback interrupted".to_string());
        }
        self.inner.play().await
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn source(&self) -> Option<StreamHandle> {
        self.inner.source()
    }
}
