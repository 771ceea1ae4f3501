//! Stream lifecycle across wizard steps.
//!
//! One initialization cycle: enumerate devices, release every held stream,
//! wait for the devices to settle, then bind the requested slots one at a
//! time in increasing slot order. A cycle that is already running suppresses
//! new requests instead of queueing them, so callers treat `initialize` as
//! fire-and-forget and read the resulting state afterwards.
//!
//! Teardown bumps an epoch counter. A cycle that observes a newer epoch after
//! any suspension point releases whatever it just acquired and exits.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::binder::StreamBinder;
use super::device::{list_video_devices, DeviceList, MediaBackend};
use super::stream::StreamHandle;
use super::surface::DisplaySurface;
use crate::config::CameraConfig;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};

/// Phase of the current initialization cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Nothing running.
    Idle,
    /// Requesting access and listing devices.
    Enumerating,
    /// Binding the given slot.
    Binding(usize),
    /// At least one requested slot is live.
    Ready,
    /// The last cycle bound nothing.
    Failed,
}

/// A logical camera role and whatever is currently bound to it.
#[derive(Clone)]
pub struct CameraSlot {
    pub index: usize,
    pub device_id: Option<String>,
    pub stream: Option<StreamHandle>,
}

impl CameraSlot {
    fn empty(index: usize) -> Self {
        Self {
            index,
            device_id: None,
            stream: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.stream.is_some()
    }
}

/// Result of a completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundSlots {
    /// Slots that are now live.
    pub bound: Vec<usize>,
    /// Requested slots that could not be bound.
    pub failed: Vec<usize>,
}

/// What an `initialize` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    /// The cycle finished with at least one live slot.
    Ready(BoundSlots),
    /// Another cycle was in flight; this call did nothing.
    Suppressed,
    /// Teardown happened mid-cycle; everything acquired was released.
    Cancelled,
}

enum SlotBind {
    Bound,
    Cancelled,
}

struct LifecycleState {
    phase: LifecyclePhase,
    slots: Vec<CameraSlot>,
    devices: DeviceList,
    devices_stale: bool,
}

/// Resets the in-flight flag when a cycle ends, however it ends, and wakes
/// anyone waiting for the manager to go idle.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, idle: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, idle })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Owns every camera slot and its display surface.
pub struct StreamLifecycleManager {
    backend: Arc<dyn MediaBackend>,
    binder: StreamBinder,
    surfaces: Vec<Arc<dyn DisplaySurface>>,
    settle_delay: Duration,
    bind_interval: Duration,
    notifier: Notifier,
    state: Mutex<LifecycleState>,
    initializing: AtomicBool,
    idle: Notify,
    epoch: AtomicU64,
}

impl StreamLifecycleManager {
    /// `surfaces[i]` is the display surface for slot `i`.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        surfaces: Vec<Arc<dyn DisplaySurface>>,
        config: &CameraConfig,
        notifier: Notifier,
    ) -> Self {
        let slots = (0..surfaces.len()).map(CameraSlot::empty).collect();
        Self {
            binder: StreamBinder::new(backend.clone(), config.replay_delay()),
            backend,
            surfaces,
            settle_delay: config.settle_delay(),
            bind_interval: config.bind_interval(),
            notifier,
            state: Mutex::new(LifecycleState {
                phase: LifecyclePhase::Idle,
                slots,
                devices: DeviceList::default(),
                devices_stale: true,
            }),
            initializing: AtomicBool::new(false),
            idle: Notify::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Run one initialization cycle for `required` slots.
    ///
    /// Succeeds when at least one slot bound. Individual slot failures are
    /// logged and listed in [`BoundSlots::failed`].
    pub async fn initialize(&self, required: &[usize]) -> Result<InitializeOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.initializing, &self.idle) else {
            log::debug!("Camera initialization already in progress, ignoring request");
            return Ok(InitializeOutcome::Suppressed);
        };
        let epoch = self.epoch.load(Ordering::Acquire);

        self.set_phase(LifecyclePhase::Enumerating);
        let devices = match list_video_devices(self.backend.as_ref()).await {
            Ok(devices) => devices,
            Err(e) => {
                self.fail_cycle(&e);
                return Err(e);
            }
        };
        if self.is_cancelled(epoch) {
            return Ok(InitializeOutcome::Cancelled);
        }
        {
            let mut state = self.state.lock();
            state.devices = devices.clone();
            state.devices_stale = false;
        }

        self.cleanup();
        tokio::time::sleep(self.settle_delay).await;

        let mut order = required.to_vec();
        order.sort_unstable();
        order.dedup();

        let mut result = BoundSlots::default();
        for slot in order {
            if self.is_cancelled(epoch) {
                return Ok(InitializeOutcome::Cancelled);
            }
            match self.bind_slot(slot, &devices, epoch).await {
                Ok(SlotBind::Bound) => result.bound.push(slot),
                Ok(SlotBind::Cancelled) => return Ok(InitializeOutcome::Cancelled),
                Err(e) => {
                    log::warn!("Failed to initialize camera slot {}: {}", slot, e);
                    result.failed.push(slot);
                }
            }
            tokio::time::sleep(self.bind_interval).await;
        }

        if self.is_cancelled(epoch) {
            return Ok(InitializeOutcome::Cancelled);
        }

        if result.bound.is_empty() {
            let error = Error::Bind("none of the requested cameras could be started".to_string());
            self.fail_cycle(&error);
            return Err(error);
        }

        self.set_phase(LifecyclePhase::Ready);
        self.notifier.send(Notification::info(
            "Cameras Initialized",
            format!("Successfully initialized {} camera(s).", result.bound.len()),
        ));
        Ok(InitializeOutcome::Ready(result))
    }

    /// Retry a single slot, keeping the others untouched.
    ///
    /// The device list is fetched again first when the previous cycle saw a
    /// device failure.
    pub async fn rebind_slot(&self, slot: usize) -> Result<InitializeOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.initializing, &self.idle) else {
            log::debug!("Camera initialization already in progress, ignoring rebind");
            return Ok(InitializeOutcome::Suppressed);
        };
        let epoch = self.epoch.load(Ordering::Acquire);

        let cached = {
            let state = self.state.lock();
            (!state.devices_stale).then(|| state.devices.clone())
        };
        let devices = match cached {
            Some(devices) => devices,
            None => {
                self.set_phase(LifecyclePhase::Enumerating);
                let devices = match list_video_devices(self.backend.as_ref()).await {
                    Ok(devices) => devices,
                    Err(e) => {
                        self.fail_cycle(&e);
                        return Err(e);
                    }
                };
                let mut state = self.state.lock();
                state.devices = devices.clone();
                state.devices_stale = false;
                devices
            }
        };

        match self.bind_slot(slot, &devices, epoch).await {
            Ok(SlotBind::Bound) => {
                self.set_phase(LifecyclePhase::Ready);
                self.notifier.send(Notification::info(
                    "Camera Initialized",
                    format!("Camera {} is live.", slot + 1),
                ));
                Ok(InitializeOutcome::Ready(BoundSlots {
                    bound: vec![slot],
                    failed: Vec::new(),
                }))
            }
            Ok(SlotBind::Cancelled) => Ok(InitializeOutcome::Cancelled),
            Err(e) => {
                let phase = if self.bound_slots().is_empty() {
                    LifecyclePhase::Failed
                } else {
                    LifecyclePhase::Ready
                };
                self.set_phase(phase);
                self.notifier.send(e.notification());
                Err(e)
            }
        }
    }

    async fn bind_slot(&self, slot: usize, devices: &DeviceList, epoch: u64) -> Result<SlotBind> {
        let surface = self
            .surfaces
            .get(slot)
            .cloned()
            .ok_or_else(|| Error::Bind(format!("no display surface for slot {}", slot)))?;

        self.set_phase(LifecyclePhase::Binding(slot));
        self.release_slot(slot);

        let stream = match self.binder.bind(devices.get(slot), surface.as_ref()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state.lock().devices_stale = true;
                return Err(e);
            }
        };

        let conflict = {
            let mut state = self.state.lock();
            let holder = state
                .slots
                .iter()
                .find(|s| s.index != slot && s.device_id.as_deref() == Some(stream.device_id()))
                .map(|s| s.index);
            if self.is_cancelled(epoch) {
                Some(None)
            } else if let Some(holder) = holder {
                state.devices_stale = true;
                Some(Some(holder))
            } else {
                state.slots[slot] = CameraSlot {
                    index: slot,
                    device_id: Some(stream.device_id().to_string()),
                    stream: Some(stream.clone()),
                };
                None
            }
        };

        match conflict {
            None => {
                log::info!("Camera slot {} bound to {}", slot, stream.device_id());
                Ok(SlotBind::Bound)
            }
            Some(None) => {
                log::info!("Camera slot {} bound after teardown, releasing", slot);
                stream.stop();
                surface.clear();
                Ok(SlotBind::Cancelled)
            }
            Some(Some(holder)) => {
                let device_id = stream.device_id().to_string();
                stream.stop();
                surface.clear();
                Err(Error::Bind(format!(
                    "device {} is already held by slot {}",
                    device_id, holder
                )))
            }
        }
    }

    /// Stop every held stream and clear every surface.
    ///
    /// Safe to call repeatedly and with nothing bound.
    pub fn cleanup(&self) {
        let streams: Vec<StreamHandle> = {
            let mut state = self.state.lock();
            state
                .slots
                .iter_mut()
                .filter_map(|slot| {
                    slot.device_id = None;
                    slot.stream.take()
                })
                .collect()
        };

        if !streams.is_empty() {
            log::info!("Cleaning up {} camera stream(s)", streams.len());
        }
        for stream in streams {
            stream.stop();
        }
        for surface in &self.surfaces {
            surface.clear();
        }
    }

    /// Release everything and invalidate any cycle still in flight.
    pub fn teardown(&self) {
        {
            let mut state = self.state.lock();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            state.phase = LifecyclePhase::Idle;
        }
        self.cleanup();
        log::debug!("Camera streams torn down");
    }

    fn release_slot(&self, slot: usize) {
        let previous = {
            let mut state = self.state.lock();
            state.slots.get_mut(slot).and_then(|s| {
                s.device_id = None;
                s.stream.take()
            })
        };
        if let Some(stream) = previous {
            log::debug!("Releasing previous stream on slot {}", slot);
            stream.stop();
        }
    }

    fn fail_cycle(&self, error: &Error) {
        {
            let mut state = self.state.lock();
            state.phase = LifecyclePhase::Failed;
            state.devices_stale = true;
        }
        self.notifier.send(error.notification());
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        self.state.lock().phase = phase;
    }

    fn is_cancelled(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) != epoch
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.state.lock().phase
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    /// Wait until no cycle is in flight.
    ///
    /// A cycle cancelled by [`teardown`](Self::teardown) keeps running until
    /// its next suspension point; callers that want to start a fresh cycle
    /// right after a teardown wait here first.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if !self.is_initializing() {
                return;
            }
            notified.await;
        }
    }

    /// Device list from the last successful enumeration.
    pub fn devices(&self) -> DeviceList {
        self.state.lock().devices.clone()
    }

    pub fn devices_stale(&self) -> bool {
        self.state.lock().devices_stale
    }

    pub fn slot_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn slot(&self, slot: usize) -> Option<CameraSlot> {
        self.state.lock().slots.get(slot).cloned()
    }

    /// Live stream bound to `slot`.
    pub fn stream(&self, slot: usize) -> Option<StreamHandle> {
        self.state
            .lock()
            .slots
            .get(slot)
            .and_then(|s| s.stream.clone())
    }

    pub fn surface(&self, slot: usize) -> Option<Arc<dyn DisplaySurface>> {
        self.surfaces.get(slot).cloned()
    }

    pub fn bound_slots(&self) -> Vec<usize> {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|s| s.is_bound())
            .map(|s| s.index)
            .collect()
    }

    pub fn live_stream_count(&self) -> usize {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|s| s.stream.as_ref().is_some_and(|st| st.is_live()))
            .count()
    }
}

impl Drop for StreamLifecycleManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
