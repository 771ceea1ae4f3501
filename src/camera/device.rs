//! Video device discovery.

use async_trait::async_trait;

use super::stream::{StreamConstraint, StreamHandle};
use crate::error::{Error, Result};

/// Information about an available video input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    /// Position in the enumeration order
    pub index: usize,
    /// Stable device identifier
    pub id: String,
    /// Human readable name
    pub label: String,
}

/// Ordered list of video inputs from one enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    devices: Vec<VideoDevice>,
}

impl DeviceList {
    pub fn new(devices: Vec<VideoDevice>) -> Self {
        Self { devices }
    }

    pub fn get(&self, index: usize) -> Option<&VideoDevice> {
        self.devices.get(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoDevice> {
        self.devices.iter()
    }
}

/// Platform media capability: permission, enumeration and stream opening.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Whether the platform can capture video at all.
    fn is_supported(&self) -> bool;

    /// Ask for generic camera access.
    ///
    /// Some platforms grant access by opening a throwaway stream; that stream
    /// is returned so the caller can release it once enumeration is done.
    async fn request_access(&self) -> Result<Option<StreamHandle>>;

    /// List every video input currently visible.
    async fn enumerate(&self) -> Result<Vec<VideoDevice>>;

    /// Open a stream matching `constraint`.
    async fn open(&self, constraint: &StreamConstraint) -> Result<StreamHandle>;
}

/// Request access, enumerate video inputs and release the probing stream.
pub async fn list_video_devices(backend: &dyn MediaBackend) -> Result<DeviceList> {
    if !backend.is_supported() {
        return Err(Error::Unsupported);
    }

    let probe = backend.request_access().await?;
    let enumerated = backend.enumerate().await;

    if let Some(stream) = probe {
        stream.stop();
        log::debug!("Released permission probe stream ({})", stream.device_id());
    }

    let devices = enumerated?;
    if devices.is_empty() {
        return Err(Error::NoDevices);
    }

    log::info!("Found {} video device(s)", devices.len());
    for device in &devices {
        log::debug!("  [{}] {} ({})", device.index, device.label, device.id);
    }

    Ok(DeviceList::new(devices))
}
