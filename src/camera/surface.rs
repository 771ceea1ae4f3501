//! Display surfaces that show a slot's live stream.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::stream::{CameraFrame, StreamHandle};

/// Something a live stream can be attached to and played on.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Attach `stream` as the surface source, replacing any previous one.
    fn attach(&self, stream: StreamHandle);

    /// Start playback of the attached source.
    async fn play(&self) -> Result<(), String>;

    /// Detach the current source.
    fn clear(&self);

    /// Currently attached source.
    fn source(&self) -> Option<StreamHandle>;
}

/// Preview surface for the UI; renders the attached stream's latest frame.
#[derive(Default)]
pub struct PreviewSurface {
    label: String,
    state: Mutex<PreviewState>,
}

#[derive(Default)]
struct PreviewState {
    source: Option<StreamHandle>,
    playing: bool,
}

impl PreviewSurface {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(PreviewState::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Frame to draw, if a source is attached and playing.
    pub fn current_frame(&self) -> Option<CameraFrame> {
        let state = self.state.lock();
        if !state.playing {
            return None;
        }
        state.source.as_ref().and_then(|s| s.latest_frame())
    }
}

#[async_trait]
impl DisplaySurface for PreviewSurface {
    fn attach(&self, stream: StreamHandle) {
        let mut state = self.state.lock();
        state.source = Some(stream);
        state.playing = false;
    }

    async fn play(&self) -> Result<(), String> {
        let mut state = self.state.lock();
        match &state.source {
            None => Err(format!("{}: no source attached", self.label)),
            Some(source) if !source.is_live() => {
                Err(format!("{}: source stream has ended", self.label))
            }
            Some(_) => {
                state.playing = true;
                Ok(())
            }
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.source = None;
        state.playing = false;
    }

    fn source(&self) -> Option<StreamHandle> {
        self.state.lock().source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::stream::VideoStream;
    use crate::camera::testing::FakeStream;

    #[tokio::test]
    async fn test_play_requires_live_source() {
        let surface = PreviewSurface::new("cam 1");
        assert!(surface.play().await.is_err());

        let stream = FakeStream::standalone("cam-a", 4, 3);
        surface.attach(stream.clone());
        surface.play().await.unwrap();
        assert!(surface.is_playing());
        assert_eq!(surface.current_frame().unwrap().width, 4);

        stream.stop();
        assert!(surface.play().await.is_err());
    }

    #[tokio::test]
    async fn test_clear_detaches() {
        let surface = PreviewSurface::new("cam 1");
        surface.attach(FakeStream::standalone("cam-a", 4, 3));
        surface.play().await.unwrap();

        surface.clear();
        assert!(surface.source().is_none());
        assert!(surface.current_frame().is_none());
        surface.clear();
    }
}
