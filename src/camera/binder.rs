//! Binds a physical device to a display surface.

use std::sync::Arc;
use std::time::Duration;

use super::device::{MediaBackend, VideoDevice};
use super::stream::{StreamConstraint, StreamHandle};
use super::surface::DisplaySurface;
use crate::error::{Error, Result};

/// Opens a device stream and starts it playing on a surface.
///
/// Policy: one relaxed-constraint fallback when the exact device cannot be
/// opened, and one delayed playback retry. Nothing further.
pub struct StreamBinder {
    backend: Arc<dyn MediaBackend>,
    replay_delay: Duration,
}

impl StreamBinder {
    pub fn new(backend: Arc<dyn MediaBackend>, replay_delay: Duration) -> Self {
        Self {
            backend,
            replay_delay,
        }
    }

    /// Bind `device` (or any device, when `None`) to `surface`.
    ///
    /// On success the caller owns the returned handle and must stop it.
    pub async fn bind(
        &self,
        device: Option<&VideoDevice>,
        surface: &dyn DisplaySurface,
    ) -> Result<StreamHandle> {
        let stream = self.open(device).await?;

        surface.attach(stream.clone());
        if let Err(first) = surface.play().await {
            log::warn!("Playback failed, retrying in {:?}: {}", self.replay_delay, first);
            tokio::time::sleep(self.replay_delay).await;

            if let Err(second) = surface.play().await {
                stream.stop();
                surface.clear();
                return Err(Error::Bind(format!("playback failed: {}", second)));
            }
        }

        log::info!("Bound camera stream {}", stream.device_id());
        Ok(stream)
    }

    async fn open(&self, device: Option<&VideoDevice>) -> Result<StreamHandle> {
        if let Some(device) = device {
            match self
                .backend
                .open(&StreamConstraint::Exact(device.id.clone()))
                .await
            {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::warn!(
                        "Failed to open {} ({}), falling back to any camera: {}",
                        device.label,
                        device.id,
                        e
                    );
                }
            }
        } else {
            log::warn!("No device for this slot, trying any available camera");
        }

        self.backend
            .open(&StreamConstraint::AnyVideo)
            .await
            .map_err(|e| match e {
                Error::Bind(_) => e,
                other => Error::Bind(other.to_string()),
            })
    }
}
