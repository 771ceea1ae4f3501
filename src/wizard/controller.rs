//! Wizard step controller.
//!
//! Drives the camera lifecycle for each step, submits captures to the
//! calibration service and keeps the per-slot capture counts the UI shows.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::captures::{CaptureRecord, REQUIRED_CAPTURES};
use super::steps::{required_slots, WizardStep};
use crate::calibration::{CalibrationApi, CalibrationJob, CalibrationProgressCoordinator, JobStatus};
use crate::camera::{FrameCapturer, InitializeOutcome, StreamLifecycleManager};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};
use crate::profile::{CalibrationProfile, CameraStatus, ProfileCamera, Resolution};

/// Result of entering a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEntry {
    pub step: WizardStep,
    /// Camera initialization for camera steps.
    pub cameras: Option<InitializeOutcome>,
}

/// What the service made of a submitted capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Counted; `count` is the slot's new total.
    Accepted { count: u32 },
    /// Counted, but the service reported no checkerboard in the image.
    NotDetected { count: u32 },
    /// The service refused the sample. Not counted.
    Rejected(String),
}

struct WizardState {
    step: WizardStep,
    selected_camera: usize,
    intrinsic_captures: CaptureRecord,
    extrinsic_captures: CaptureRecord,
    intrinsic_results: BTreeMap<usize, CalibrationJob>,
    resolutions: BTreeMap<usize, Resolution>,
}

pub struct WizardController {
    cameras: Arc<StreamLifecycleManager>,
    capturer: FrameCapturer,
    api: Arc<dyn CalibrationApi>,
    coordinator: CalibrationProgressCoordinator,
    notifier: Notifier,
    max_slots: usize,
    extrinsic_pair: [usize; 2],
    state: Arc<Mutex<WizardState>>,
    result_watch: Mutex<Option<JoinHandle<()>>>,
}

impl WizardController {
    pub fn new(
        cameras: Arc<StreamLifecycleManager>,
        api: Arc<dyn CalibrationApi>,
        config: &AppConfig,
        notifier: Notifier,
    ) -> Self {
        Self {
            capturer: FrameCapturer::new(cameras.clone(), config.cameras.jpeg_quality),
            coordinator: CalibrationProgressCoordinator::new(
                api.clone(),
                config.calibration.poll_interval(),
                notifier.clone(),
            ),
            max_slots: config.cameras.max_slots.min(cameras.slot_count()),
            cameras,
            api,
            notifier,
            extrinsic_pair: config.calibration.extrinsic_pair,
            state: Arc::new(Mutex::new(WizardState {
                step: WizardStep::CameraIdentification,
                selected_camera: 0,
                intrinsic_captures: CaptureRecord::new(),
                extrinsic_captures: CaptureRecord::new(),
                intrinsic_results: BTreeMap::new(),
                resolutions: BTreeMap::new(),
            })),
            result_watch: Mutex::new(None),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.state.lock().step
    }

    pub fn selected_camera(&self) -> usize {
        self.state.lock().selected_camera
    }

    pub fn cameras(&self) -> &Arc<StreamLifecycleManager> {
        &self.cameras
    }

    pub fn intrinsic_captures(&self) -> CaptureRecord {
        self.state.lock().intrinsic_captures.clone()
    }

    pub fn extrinsic_captures(&self) -> CaptureRecord {
        self.state.lock().extrinsic_captures.clone()
    }

    pub fn calibration_status(&self) -> CalibrationJob {
        self.coordinator.snapshot()
    }

    pub fn subscribe_calibration(&self) -> watch::Receiver<CalibrationJob> {
        self.coordinator.subscribe()
    }

    pub fn is_calibrating(&self) -> bool {
        self.coordinator.is_active()
    }

    /// Slots the current step needs bound.
    pub fn required_slots(&self) -> Vec<usize> {
        required_slots(
            self.step(),
            self.available_cameras(),
            self.max_slots,
            self.extrinsic_pair,
        )
    }

    /// Cameras from the last enumeration, or every slot before the first.
    fn available_cameras(&self) -> usize {
        let devices = self.cameras.devices();
        if devices.is_empty() {
            self.max_slots
        } else {
            devices.len()
        }
    }

    /// Switch to `step`, releasing the previous step's cameras and binding
    /// the ones the new step needs.
    pub async fn enter_step(&self, step: WizardStep) -> Result<StepEntry> {
        if self.coordinator.is_active() {
            self.stop_calibration().await;
        }
        {
            let mut state = self.state.lock();
            if state.step != step {
                state.selected_camera = 0;
            }
            state.step = step;
        }
        log::info!("Entering {}", step);

        loop {
            self.cameras.teardown();
            if !step.uses_cameras() {
                return Ok(StepEntry { step, cameras: None });
            }

            // A cycle cancelled by the teardown still holds the manager
            // until it unwinds.
            self.cameras.wait_idle().await;
            let required = self.required_slots();
            let outcome = self.cameras.initialize(&required).await?;
            if outcome == InitializeOutcome::Suppressed && self.step() == step {
                continue;
            }
            return Ok(StepEntry {
                step,
                cameras: Some(outcome),
            });
        }
    }

    pub async fn advance(&self) -> Result<StepEntry> {
        match self.step().next() {
            Some(next) => self.enter_step(next).await,
            None => Ok(StepEntry {
                step: self.step(),
                cameras: None,
            }),
        }
    }

    pub async fn go_back(&self) -> Result<StepEntry> {
        match self.step().previous() {
            Some(previous) => self.enter_step(previous).await,
            None => Ok(StepEntry {
                step: self.step(),
                cameras: None,
            }),
        }
    }

    /// Choose the camera the intrinsic step captures from.
    pub fn select_camera(&self, slot: usize) -> Result<()> {
        if slot >= self.max_slots || self.cameras.stream(slot).is_none() {
            return Err(self.report(Error::NotReady(slot)));
        }
        self.state.lock().selected_camera = slot;
        log::info!("Selected camera {}", slot + 1);
        Ok(())
    }

    /// Try to bring a single camera back without touching the others.
    pub async fn retry_camera(&self, slot: usize) -> Result<InitializeOutcome> {
        self.cameras.rebind_slot(slot).await
    }

    /// Capture the selected camera and submit it for intrinsic calibration.
    pub async fn capture_intrinsic(&self) -> Result<CaptureOutcome> {
        let slot = self.selected_camera();
        let image = self.capturer.capture(slot).map_err(|e| self.report(e))?;
        let reply = self
            .api
            .submit_frame(&image, slot)
            .await
            .map_err(|e| self.report(e))?;

        let outcome = if reply.accepted {
            let mut state = self.state.lock();
            state.resolutions.insert(
                slot,
                Resolution {
                    width: image.width,
                    height: image.height,
                },
            );
            let count = state.intrinsic_captures.record_accepted(slot);
            if reply.detected == Some(false) {
                CaptureOutcome::NotDetected { count }
            } else {
                CaptureOutcome::Accepted { count }
            }
        } else {
            CaptureOutcome::Rejected(reply.message.clone().unwrap_or_default())
        };

        self.announce_capture(&outcome, &format!("Camera {}", slot + 1), reply.message.as_deref());
        Ok(outcome)
    }

    /// Capture the stereo pair side by side and submit it for extrinsic
    /// calibration. An accepted pair counts once for each camera.
    pub async fn capture_extrinsic(&self) -> Result<CaptureOutcome> {
        let [left, right] = self.extrinsic_pair;
        let image = self
            .capturer
            .capture_pair(left, right)
            .map_err(|e| self.report(e))?;
        let reply = self
            .api
            .submit_extrinsic(&image, self.extrinsic_pair)
            .await
            .map_err(|e| self.report(e))?;

        let outcome = if reply.success {
            let mut state = self.state.lock();
            let left_count = state.extrinsic_captures.record_accepted(left);
            let right_count = state.extrinsic_captures.record_accepted(right);
            CaptureOutcome::Accepted {
                count: left_count.min(right_count),
            }
        } else {
            CaptureOutcome::Rejected(reply.message.clone())
        };

        let message = (!reply.message.is_empty()).then_some(reply.message.as_str());
        self.announce_capture(
            &outcome,
            &format!("Cameras {} and {}", left + 1, right + 1),
            message,
        );
        Ok(outcome)
    }

    fn announce_capture(&self, outcome: &CaptureOutcome, subject: &str, message: Option<&str>) {
        let notification = match outcome {
            CaptureOutcome::Accepted { count } | CaptureOutcome::NotDetected { count }
                if *count == REQUIRED_CAPTURES =>
            {
                Notification::info(
                    "Ready to Calibrate",
                    format!(
                        "{} captured {} images. Start calibration when ready.",
                        subject, REQUIRED_CAPTURES
                    ),
                )
            }
            CaptureOutcome::Accepted { count } => Notification::info(
                "Checkerboard Detected",
                format!("{}: {}/{} images captured.", subject, count, REQUIRED_CAPTURES),
            ),
            CaptureOutcome::NotDetected { count } => Notification::warning(
                "No Checkerboard Detected",
                format!(
                    "{}: {}/{} images captured. {}",
                    subject,
                    count,
                    REQUIRED_CAPTURES,
                    message.unwrap_or("Make sure the whole checkerboard is visible and well lit.")
                ),
            ),
            CaptureOutcome::Rejected(reason) => Notification::error(
                "Capture Failed",
                if reason.is_empty() {
                    "The calibration service could not process the image. Try again.".to_string()
                } else {
                    format!("{}. Try again.", reason.trim_end_matches('.'))
                },
            ),
        };
        self.notifier.send(notification);
    }

    /// Clear capture counts for one slot, or for every slot when `slot` is
    /// `None`. Both the intrinsic and the extrinsic records are reset.
    pub fn reset_captures(&self, slot: Option<usize>) {
        let mut state = self.state.lock();
        match slot {
            Some(slot) => {
                state.intrinsic_captures.reset(slot);
                state.extrinsic_captures.reset(slot);
                state.resolutions.remove(&slot);
                log::info!("Reset captures for camera {}", slot + 1);
            }
            None => {
                state.intrinsic_captures.reset_all();
                state.extrinsic_captures.reset_all();
                state.resolutions.clear();
                log::info!("Reset captures for all cameras");
            }
        }
    }

    /// Start the remote calibration job.
    ///
    /// In the intrinsic step the result is stored for the selected camera
    /// once the job completes.
    pub async fn start_calibration(&self) -> Result<()> {
        let target = match self.step() {
            WizardStep::IntrinsicCalibration => Some(self.selected_camera()),
            _ => None,
        };
        let mut updates = self.coordinator.subscribe();
        self.coordinator.start().await?;

        let Some(slot) = target else {
            return Ok(());
        };
        let state = self.state.clone();
        let watcher = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let job = updates.borrow_and_update().clone();
                match job.status {
                    JobStatus::Complete => {
                        log::info!("Stored intrinsic calibration for camera {}", slot + 1);
                        state.lock().intrinsic_results.insert(slot, job);
                        break;
                    }
                    JobStatus::Error | JobStatus::Idle => break,
                    JobStatus::Detecting | JobStatus::Calibrating => {}
                }
            }
        });
        if let Some(previous) = self.result_watch.lock().replace(watcher) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop the remote job; local state is idle afterwards either way.
    pub async fn stop_calibration(&self) -> bool {
        if let Some(watcher) = self.result_watch.lock().take() {
            watcher.abort();
        }
        self.coordinator.stop().await
    }

    /// Leave the wizard: stop calibration and release every camera.
    pub async fn close(&self) {
        if self.coordinator.is_active() {
            self.stop_calibration().await;
        }
        self.cameras.teardown();
        log::info!("Wizard closed");
    }

    /// Snapshot of everything calibrated so far as a profile record.
    pub fn build_profile(&self, name: &str) -> CalibrationProfile {
        let devices = self.cameras.devices();
        let bound = self.cameras.bound_slots();
        let count = self.available_cameras().min(self.max_slots);
        let state = self.state.lock();

        let mut profile = CalibrationProfile::new(name);
        for slot in 0..count {
            let label = devices
                .get(slot)
                .map(|d| d.label.clone())
                .unwrap_or_else(|| format!("Camera {}", slot + 1));
            let mut camera = ProfileCamera::new(slot, label);
            camera.calibration_images = state.intrinsic_captures.count(slot);
            camera.resolution = state.resolutions.get(&slot).copied();

            camera.status = if let Some(job) = state.intrinsic_results.get(&slot) {
                camera.intrinsic_matrix = job.intrinsic_matrix.clone();
                camera.distortion_coeffs = job.distortion_coeffs.clone();
                camera.calibration_error = job.reprojection_error;
                CameraStatus::Calibrated
            } else if self.coordinator.is_active()
                && state.step == WizardStep::IntrinsicCalibration
                && state.selected_camera == slot
            {
                CameraStatus::Calibrating
            } else if bound.contains(&slot) {
                CameraStatus::Connected
            } else {
                CameraStatus::Disconnected
            };
            profile.cameras.push(camera);
        }
        profile
    }

    fn report(&self, error: Error) -> Error {
        self.notifier.send(error.notification());
        error
    }
}

impl Drop for WizardController {
    fn drop(&mut self) {
        if let Some(watcher) = self.result_watch.lock().take() {
            watcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{ExtrinsicResponse, StartResponse, StopResponse, SubmitResponse};
    use crate::camera::testing::FakeBackend;
    use crate::camera::{DisplaySurface, EncodedImage, PreviewSurface};
    use crate::notify::Severity;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Calibration service stand-in with scripted capture replies.
    #[derive(Default)]
    struct FakeService {
        frame_replies: Mutex<VecDeque<Result<SubmitResponse>>>,
        submitted: Mutex<Vec<(usize, u32, u32)>>,
        pairs: Mutex<Vec<([usize; 2], u32, u32)>>,
    }

    impl FakeService {
        fn reply(&self, accepted: bool, detected: Option<bool>) {
            self.frame_replies.lock().push_back(Ok(SubmitResponse {
                accepted,
                detected,
                message: None,
            }));
        }
    }

    #[async_trait]
    impl CalibrationApi for FakeService {
        async fn start(&self) -> Result<StartResponse> {
            Ok(StartResponse { success: true })
        }

        async fn submit_frame(&self, image: &EncodedImage, camera_index: usize) -> Result<SubmitResponse> {
            self.submitted.lock().push((camera_index, image.width, image.height));
            self.frame_replies.lock().pop_front().unwrap_or(Ok(SubmitResponse {
                accepted: true,
                detected: Some(true),
                message: None,
            }))
        }

        async fn submit_extrinsic(
            &self,
            image: &EncodedImage,
            camera_indices: [usize; 2],
        ) -> Result<ExtrinsicResponse> {
            self.pairs.lock().push((camera_indices, image.width, image.height));
            Ok(ExtrinsicResponse {
                success: true,
                message: "pair stored".to_string(),
            })
        }

        async fn query_status(&self) -> Result<CalibrationJob> {
            let mut job = CalibrationJob::new(JobStatus::Complete, 100.0, "done");
            job.intrinsic_matrix = Some(serde_json::json!([[800.0, 0.0, 4.0], [0.0, 800.0, 3.0], [0.0, 0.0, 1.0]]));
            job.reprojection_error = Some(0.42);
            Ok(job)
        }

        async fn stop(&self) -> Result<StopResponse> {
            Ok(StopResponse { accepted: true })
        }
    }

    struct Harness {
        backend: Arc<FakeBackend>,
        service: Arc<FakeService>,
        wizard: WizardController,
        notifications: UnboundedReceiver<Notification>,
    }

    fn harness(backend: FakeBackend) -> Harness {
        let backend = Arc::new(backend);
        let service = Arc::new(FakeService::default());
        let surfaces: Vec<Arc<dyn DisplaySurface>> = (0..3)
            .map(|i| Arc::new(PreviewSurface::new(format!("camera {}", i + 1))) as Arc<dyn DisplaySurface>)
            .collect();
        let config = AppConfig::default();
        let (notifier, notifications) = Notifier::channel();
        let cameras = Arc::new(StreamLifecycleManager::new(
            backend.clone(),
            surfaces,
            &config.cameras,
            notifier.clone(),
        ));
        let wizard = WizardController::new(cameras, service.clone(), &config, notifier);
        Harness {
            backend,
            service,
            wizard,
            notifications,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn three_cameras() -> FakeBackend {
        FakeBackend::with_devices(&["cam-a", "cam-b", "cam-c"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_drive_required_cameras() {
        let h = harness(three_cameras());

        let entry = h.wizard.enter_step(WizardStep::CameraIdentification).await.unwrap();
        match entry.cameras {
            Some(InitializeOutcome::Ready(bound)) => assert_eq!(bound.bound, vec![0, 1, 2]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.backend.live_streams(), 3);

        h.wizard.enter_step(WizardStep::ExtrinsicCalibration).await.unwrap();
        assert_eq!(h.wizard.cameras().bound_slots(), vec![0, 2]);
        assert_eq!(h.backend.live_streams(), 2);

        let entry = h.wizard.advance().await.unwrap();
        assert_eq!(entry.step, WizardStep::DartboardRegistration);
        assert!(entry.cameras.is_none());
        assert_eq!(h.backend.live_streams(), 0);

        let entry = h.wizard.go_back().await.unwrap();
        assert_eq!(entry.step, WizardStep::ExtrinsicCalibration);
        assert_eq!(h.backend.live_streams(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_stops_at_last_step() {
        let h = harness(three_cameras());
        h.wizard.enter_step(WizardStep::SaveLoad).await.unwrap();

        let entry = h.wizard.advance().await.unwrap();
        assert_eq!(entry.step, WizardStep::SaveLoad);
        assert_eq!(h.wizard.step(), WizardStep::SaveLoad);
    }

    async fn intrinsic_on_camera(h: &mut Harness, slot: usize) {
        h.wizard.enter_step(WizardStep::IntrinsicCalibration).await.unwrap();
        h.wizard.select_camera(slot).unwrap();
        drain(&mut h.notifications);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_detected_capture_counts() {
        let mut h = harness(three_cameras());
        intrinsic_on_camera(&mut h, 1).await;
        h.service.reply(true, Some(true));

        let outcome = h.wizard.capture_intrinsic().await.unwrap();

        assert_eq!(outcome, CaptureOutcome::Accepted { count: 1 });
        assert_eq!(h.wizard.intrinsic_captures().count(1), 1);
        assert_eq!(h.wizard.intrinsic_captures().count(0), 0);
        assert_eq!(h.service.submitted.lock()[0], (1, 8, 6));
        let notes = drain(&mut h.notifications);
        assert_eq!(notes[0].title, "Checkerboard Detected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_without_detection_still_counts() {
        let mut h = harness(three_cameras());
        intrinsic_on_camera(&mut h, 1).await;
        h.service.reply(true, Some(false));

        let outcome = h.wizard.capture_intrinsic().await.unwrap();

        assert_eq!(outcome, CaptureOutcome::NotDetected { count: 1 });
        assert_eq!(h.wizard.intrinsic_captures().count(1), 1);
        let notes = drain(&mut h.notifications);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Warning);
        assert_eq!(notes[0].title, "No Checkerboard Detected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_without_detection_flag_counts() {
        let mut h = harness(three_cameras());
        intrinsic_on_camera(&mut h, 0).await;
        h.service.reply(true, None);

        let outcome = h.wizard.capture_intrinsic().await.unwrap();

        assert_eq!(outcome, CaptureOutcome::Accepted { count: 1 });
        assert_eq!(h.wizard.intrinsic_captures().count(0), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_capture_is_not_counted() {
        let mut h = harness(three_cameras());
        intrinsic_on_camera(&mut h, 2).await;
        h.service.reply(false, None);
        h.service.reply(false, Some(true));

        for _ in 0..2 {
            let outcome = h.wizard.capture_intrinsic().await.unwrap();
            assert!(matches!(outcome, CaptureOutcome::Rejected(_)));
        }

        assert_eq!(h.wizard.intrinsic_captures().count(2), 0);
        assert_eq!(h.service.submitted.lock().len(), 2);
        let notes = drain(&mut h.notifications);
        assert!(notes.iter().all(|n| n.severity == Severity::Error && n.title == "Capture Failed"));

        // Nothing was accepted, so no resolution is known for the camera.
        let profile = h.wizard.build_profile("Rejected");
        assert_eq!(profile.cameras[2].resolution, None);
        assert_eq!(profile.cameras[2].calibration_images, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_is_not_counted() {
        let mut h = harness(three_cameras());
        intrinsic_on_camera(&mut h, 1).await;
        h.service
            .frame_replies
            .lock()
            .push_back(Err(Error::Network("connection reset".into())));

        let result = h.wizard.capture_intrinsic().await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(h.wizard.intrinsic_captures().count(1), 0);
        let notes = drain(&mut h.notifications);
        assert_eq!(notes[0].title, "Connection Error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_captures_clears_counts() {
        let mut h = harness(three_cameras());
        intrinsic_on_camera(&mut h, 0).await;
        h.wizard.capture_intrinsic().await.unwrap();
        h.wizard.capture_intrinsic().await.unwrap();
        h.wizard.select_camera(1).unwrap();
        h.wizard.capture_intrinsic().await.unwrap();

        h.wizard.reset_captures(Some(0));
        assert_eq!(h.wizard.intrinsic_captures().count(0), 0);
        assert_eq!(h.wizard.intrinsic_captures().count(1), 1);

        h.wizard.select_camera(0).unwrap();
        assert_eq!(h.wizard.capture_intrinsic().await.unwrap(), CaptureOutcome::Accepted { count: 1 });

        h.wizard.enter_step(WizardStep::ExtrinsicCalibration).await.unwrap();
        h.wizard.capture_extrinsic().await.unwrap();
        h.wizard.reset_captures(None);

        assert_eq!(h.wizard.intrinsic_captures(), CaptureRecord::new());
        assert_eq!(h.wizard.extrinsic_captures(), CaptureRecord::new());
        assert_eq!(h.wizard.capture_extrinsic().await.unwrap(), CaptureOutcome::Accepted { count: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_change_during_pending_bind_binds_new_step() {
        let h = harness(three_cameras().open_delay(Duration::from_millis(500)));
        let wizard = Arc::new(h.wizard);

        let first = {
            let wizard = wizard.clone();
            tokio::spawn(async move { wizard.enter_step(WizardStep::IntrinsicCalibration).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(wizard.cameras().is_initializing());

        let second = wizard.enter_step(WizardStep::ExtrinsicCalibration).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap().cameras, Some(InitializeOutcome::Cancelled));
        assert!(matches!(second.cameras, Some(InitializeOutcome::Ready(_))));
        assert_eq!(wizard.step(), WizardStep::ExtrinsicCalibration);
        assert_eq!(wizard.cameras().bound_slots(), vec![0, 2]);
        assert_eq!(h.backend.live_streams(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_announced_at_threshold() {
        let mut h = harness(three_cameras());
        h.wizard.enter_step(WizardStep::IntrinsicCalibration).await.unwrap();
        drain(&mut h.notifications);

        for _ in 0..REQUIRED_CAPTURES {
            h.wizard.capture_intrinsic().await.unwrap();
        }

        assert!(h.wizard.intrinsic_captures().is_ready(0));
        let ready: Vec<_> = drain(&mut h.notifications)
            .into_iter()
            .filter(|n| n.title == "Ready to Calibrate")
            .collect();
        assert_eq!(ready.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_unbound_camera_fails() {
        let h = harness(FakeBackend::with_devices(&["cam-a"]));
        h.wizard.enter_step(WizardStep::IntrinsicCalibration).await.unwrap();

        assert!(matches!(h.wizard.select_camera(2), Err(Error::NotReady(2))));
        assert_eq!(h.wizard.selected_camera(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extrinsic_capture_counts_both_cameras() {
        let h = harness(three_cameras());
        h.wizard.enter_step(WizardStep::ExtrinsicCalibration).await.unwrap();

        let outcome = h.wizard.capture_extrinsic().await.unwrap();

        assert_eq!(outcome, CaptureOutcome::Accepted { count: 1 });
        let record = h.wizard.extrinsic_captures();
        assert_eq!((record.count(0), record.count(2)), (1, 1));
        assert_eq!(h.service.pairs.lock()[0], ([0, 2], 16, 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_intrinsic_calibration_lands_in_profile() {
        let h = harness(three_cameras());
        h.wizard.enter_step(WizardStep::IntrinsicCalibration).await.unwrap();
        h.wizard.select_camera(2).unwrap();
        h.wizard.capture_intrinsic().await.unwrap();

        h.wizard.start_calibration().await.unwrap();
        assert!(h.wizard.is_calibrating());
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(h.wizard.calibration_status().status, JobStatus::Complete);

        let profile = h.wizard.build_profile("Home");
        assert_eq!(profile.cameras.len(), 3);
        let camera = &profile.cameras[2];
        assert_eq!(camera.status, CameraStatus::Calibrated);
        assert_eq!(camera.calibration_error, Some(0.42));
        assert_eq!(camera.calibration_images, 1);
        assert_eq!(camera.resolution, Some(Resolution { width: 8, height: 6 }));
        assert_eq!(profile.cameras[0].status, CameraStatus::Connected);
        assert_eq!(profile.cameras[0].name, "Fake Camera 0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_everything() {
        let h = harness(three_cameras());
        h.wizard.enter_step(WizardStep::IntrinsicCalibration).await.unwrap();
        h.wizard.start_calibration().await.unwrap();

        h.wizard.close().await;

        assert!(!h.wizard.is_calibrating());
        assert_eq!(h.wizard.calibration_status().status, JobStatus::Idle);
        assert_eq!(h.backend.live_streams(), 0);
        assert_eq!(h.wizard.cameras().live_stream_count(), 0);
    }
}
