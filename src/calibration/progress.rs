//! Calibration progress coordination.
//!
//! Starts a remote calibration job, polls its status on a fixed interval and
//! publishes the cached [`CalibrationJob`] through a watch channel. At most
//! one poll loop exists per coordinator; results from a previous session or
//! an out-of-order request are dropped.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::client::CalibrationApi;
use super::types::{CalibrationJob, JobStatus};
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};

struct Session {
    active: bool,
    /// Bumped by every start and stop; a poll loop only applies results for
    /// the session it was spawned in.
    id: u64,
    /// Highest request sequence applied so far.
    last_applied: u64,
    poller: Option<JoinHandle<()>>,
}

struct Shared {
    session: Mutex<Session>,
    job_tx: watch::Sender<CalibrationJob>,
    request_seq: AtomicU64,
}

enum Applied {
    Obsolete,
    OutOfOrder,
    Running,
    Finished(CalibrationJob),
}

impl Shared {
    fn publish(&self, job: CalibrationJob) {
        log::debug!("Calibration {} ({:.0}%): {}", job.status, job.progress, job.message);
        self.job_tx.send_replace(job);
    }

    fn apply(&self, session_id: u64, seq: u64, job: CalibrationJob) -> Applied {
        let mut session = self.session.lock();
        if !session.active || session.id != session_id {
            return Applied::Obsolete;
        }
        if seq <= session.last_applied {
            return Applied::OutOfOrder;
        }
        session.last_applied = seq;

        let finished = job.status.is_terminal();
        if finished {
            session.active = false;
            session.poller = None;
        }
        self.publish(job.clone());

        if finished {
            Applied::Finished(job)
        } else {
            Applied::Running
        }
    }

    fn is_current(&self, session_id: u64) -> bool {
        let session = self.session.lock();
        session.active && session.id == session_id
    }
}

/// Owns the remote job lifecycle for one wizard.
pub struct CalibrationProgressCoordinator {
    api: Arc<dyn CalibrationApi>,
    poll_interval: Duration,
    notifier: Notifier,
    shared: Arc<Shared>,
}

impl CalibrationProgressCoordinator {
    pub fn new(api: Arc<dyn CalibrationApi>, poll_interval: Duration, notifier: Notifier) -> Self {
        let (job_tx, _) = watch::channel(CalibrationJob::default());
        Self {
            api,
            poll_interval,
            notifier,
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    active: false,
                    id: 0,
                    last_applied: 0,
                    poller: None,
                }),
                job_tx,
                request_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Current cached job.
    pub fn snapshot(&self) -> CalibrationJob {
        self.shared.job_tx.borrow().clone()
    }

    /// Receiver that observes every published job.
    pub fn subscribe(&self) -> watch::Receiver<CalibrationJob> {
        self.shared.job_tx.subscribe()
    }

    /// Whether a job is running and being polled.
    pub fn is_active(&self) -> bool {
        self.shared.session.lock().active
    }

    /// Start a remote job and begin polling its status.
    pub async fn start(&self) -> Result<()> {
        let session_id = {
            let mut session = self.shared.session.lock();
            if session.active {
                drop(session);
                let err = Error::AlreadyRunning;
                self.notifier.send(err.notification());
                return Err(err);
            }
            if let Some(stale) = session.poller.take() {
                stale.abort();
            }
            session.active = true;
            session.id += 1;
            session.id
        };
        self.shared
            .publish(CalibrationJob::new(JobStatus::Detecting, 0.0, "Starting calibration..."));

        let started = match self.api.start().await {
            Ok(reply) if reply.success => Ok(()),
            Ok(_) => Err(Error::Remote {
                status: 200,
                message: "calibration service refused to start".to_string(),
            }),
            Err(e) => Err(e),
        };

        if let Err(e) = started {
            log::error!("Failed to start calibration: {}", e);
            let current = {
                let mut session = self.shared.session.lock();
                let current = session.active && session.id == session_id;
                if current {
                    session.active = false;
                }
                current
            };
            if current {
                self.shared
                    .publish(CalibrationJob::new(JobStatus::Error, 0.0, "Failed to start calibration"));
            }
            self.notifier.send(Notification::error(
                "Error",
                "Failed to start calibration. Check that the calibration service is running and try again.",
            ));
            return Err(e);
        }

        let mut session = self.shared.session.lock();
        if !session.active || session.id != session_id {
            log::info!("Calibration stopped before polling began");
            return Ok(());
        }
        session.poller = Some(tokio::spawn(poll_loop(
            self.shared.clone(),
            self.api.clone(),
            self.notifier.clone(),
            self.poll_interval,
            session_id,
        )));
        drop(session);

        self.notifier.send(Notification::info(
            "Calibration Started",
            "Move the checkerboard slowly through the view of every camera.",
        ));
        Ok(())
    }

    /// Stop polling and ask the service to stop.
    ///
    /// The local state always returns to idle; the return value reports
    /// whether the service acknowledged the stop.
    pub async fn stop(&self) -> bool {
        let (poller, session_id) = {
            let mut session = self.shared.session.lock();
            session.active = false;
            session.id += 1;
            (session.poller.take(), session.id)
        };
        if let Some(poller) = poller {
            poller.abort();
        }

        let acknowledged = match self.api.stop().await {
            Ok(reply) => reply.accepted,
            Err(e) => {
                log::warn!("Remote calibration stop failed: {}", e);
                false
            }
        };

        let session = self.shared.session.lock();
        if !session.active && session.id == session_id {
            self.shared.publish(CalibrationJob::idle("Calibration stopped"));
        }
        drop(session);

        self.notifier.send(Notification::info(
            "Calibration Stopped",
            "Calibration has been stopped. Start again when the board is in view.",
        ));
        acknowledged
    }
}

impl Drop for CalibrationProgressCoordinator {
    fn drop(&mut self) {
        let mut session = self.shared.session.lock();
        session.active = false;
        if let Some(poller) = session.poller.take() {
            poller.abort();
        }
    }
}

async fn poll_loop(
    shared: Arc<Shared>,
    api: Arc<dyn CalibrationApi>,
    notifier: Notifier,
    interval: Duration,
    session_id: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let seq = shared.request_seq.fetch_add(1, Ordering::AcqRel) + 1;

        match api.query_status().await {
            Ok(job) => match shared.apply(session_id, seq, job) {
                Applied::Obsolete => break,
                Applied::OutOfOrder => {
                    log::debug!("Discarding out-of-order status response {}", seq);
                }
                Applied::Running => {}
                Applied::Finished(job) => {
                    notifier.send(finished_notification(&job));
                    break;
                }
            },
            Err(e) => {
                if !shared.is_current(session_id) {
                    break;
                }
                notifier.send(Notification::warning(
                    "Status Unavailable",
                    format!("Failed to get calibration status ({}). Retrying.", e),
                ));
            }
        }
    }
    log::debug!("Calibration poll loop for session {} ended", session_id);
}

fn finished_notification(job: &CalibrationJob) -> Notification {
    match job.status {
        JobStatus::Complete => {
            let mut description = if job.message.is_empty() {
                "Calibration finished successfully.".to_string()
            } else {
                job.message.clone()
            };
            if let Some(error) = job.reprojection_error {
                description.push_str(&format!(" Reprojection error: {:.3} px.", error));
            }
            Notification::info("Calibration Complete", description)
        }
        _ => {
            let reason = if job.message.is_empty() {
                "The calibration service reported an error".to_string()
            } else {
                job.message.clone()
            };
            Notification::error(
                "Calibration Error",
                format!("{}. Adjust the checkerboard and start again.", reason.trim_end_matches('.')),
            )
        }
    }
}
