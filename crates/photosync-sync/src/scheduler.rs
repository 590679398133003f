//! Sync scheduler - decides when reconciliation passes run
//!
//! The [`SyncScheduler`] owns at most one control loop. The loop keeps
//! running passes while records are `Local`, waits between passes for the
//! polling period or a record store notification (whichever comes first),
//! and goes `Idle` once nothing is left.
//!
//! ## Flow
//!
//! ```text
//! RecordStore ──subscribe──▶ watcher ──recheck + wake──▶ control loop ──▶ SyncEngine::run_pass
//!                               │                             ▲
//!                               └──── start_if_idle ──────────┘
//! ```
//!
//! ## Design Notes
//!
//! - All state transitions happen under one mutex. The loop goes `Idle`
//!   only under that lock and only when no notification arrived since its
//!   last count, and the watcher restarts the loop only when it sees `Idle`
//!   under the same lock, so no wakeup is lost between the two.
//! - `stop()` is sticky: notifications do not restart a stopped scheduler
//!   until `start()` is called again.
//! - Once started, the watcher also recounts pending records every polling
//!   period while the loop is idle, so records written by another process
//!   on a shared database are picked up without a notification.
//! - With [`StopMode::Cancel`], tasks of the in-flight batch that have not
//!   started uploading release their claim instead of running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast::error::RecvError, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;
use crate::events::{publish, EngineEvent};

/// Observable state of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No control loop is running
    Idle,
    /// The control loop is running or waiting between passes
    Running,
    /// A stop was requested; the loop exits at its next checkpoint
    StopRequested,
}

/// How `stop_with` treats the in-flight batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Let the in-flight batch finish
    #[default]
    Drain,
    /// Abandon tasks that have not started uploading
    Cancel,
}

struct Slot {
    state: SchedulerState,
    /// Set by `stop`, cleared by `start`
    stopped: bool,
    /// Cancels the in-flight batch on `StopMode::Cancel`
    pass_cancel: CancellationToken,
    control: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
}

struct Inner {
    engine: Arc<SyncEngine>,
    poll_period: Duration,
    slot: Mutex<Slot>,
    /// A notification arrived since the loop last counted pending records
    recheck: AtomicBool,
    wake: Notify,
    shutdown: CancellationToken,
    state_tx: watch::Sender<SchedulerState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets the state; must be called with the slot locked
    fn set_state(&self, slot: &mut Slot, state: SchedulerState) {
        if slot.state == state {
            return;
        }
        debug!(from = ?slot.state, to = ?state, "Scheduler state change");
        slot.state = state;
        self.state_tx.send_replace(state);
        publish(self.engine.events(), EngineEvent::StateChanged(state));
    }
}

/// Starts and stops the background reconciliation loop
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let poll_period = engine.config().polling_period;
        let (state_tx, _) = watch::channel(SchedulerState::Idle);

        info!(
            poll_ms = poll_period.as_millis() as u64,
            "Creating sync scheduler"
        );

        Self {
            inner: Arc::new(Inner {
                engine,
                poll_period,
                slot: Mutex::new(Slot {
                    state: SchedulerState::Idle,
                    stopped: false,
                    pass_cancel: CancellationToken::new(),
                    control: None,
                    watcher: None,
                }),
                recheck: AtomicBool::new(false),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                state_tx,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    /// Subscribes to state changes
    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state_tx.subscribe()
    }

    /// Starts the control loop
    ///
    /// Idempotent: returns false without spawning anything if a loop is
    /// already running. A pending stop request is withdrawn. Must be called
    /// from within a Tokio runtime.
    pub fn start(&self) -> bool {
        if self.inner.shutdown.is_cancelled() {
            warn!("Scheduler is shut down, ignoring start");
            return false;
        }

        let mut slot = self.inner.lock();
        slot.stopped = false;
        if slot.watcher.is_none() {
            slot.watcher = Some(tokio::spawn(watch_store(self.inner.clone())));
        }
        spawn_loop(&self.inner, &mut slot)
    }

    /// Requests a stop, letting the in-flight batch finish
    pub fn stop(&self) {
        self.stop_with(StopMode::Drain);
    }

    /// Requests a stop
    ///
    /// The loop starts no new batch and reaches `Idle` at its next
    /// checkpoint: after the in-flight batch, or immediately if waiting.
    pub fn stop_with(&self, mode: StopMode) {
        let mut slot = self.inner.lock();
        slot.stopped = true;
        if slot.state == SchedulerState::Running {
            self.inner.set_state(&mut slot, SchedulerState::StopRequested);
        }
        if mode == StopMode::Cancel {
            slot.pass_cancel.cancel();
        }
        drop(slot);

        info!(?mode, "Scheduler stop requested");
        self.inner.wake.notify_one();
    }

    /// Stops the scheduler for good and waits for its tasks to end
    pub async fn shutdown(&self, mode: StopMode) {
        self.stop_with(mode);
        self.inner.shutdown.cancel();

        let (control, watcher) = {
            let mut slot = self.inner.lock();
            (slot.control.take(), slot.watcher.take())
        };
        for handle in [control, watcher].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Scheduler shut down");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

/// Spawns the control loop if none is running; the slot must be locked
fn spawn_loop(inner: &Arc<Inner>, slot: &mut Slot) -> bool {
    match slot.state {
        SchedulerState::Running => false,
        SchedulerState::StopRequested => {
            // The loop is still alive; withdraw the request.
            if slot.pass_cancel.is_cancelled() {
                slot.pass_cancel = CancellationToken::new();
            }
            inner.set_state(slot, SchedulerState::Running);
            false
        }
        SchedulerState::Idle => {
            if slot.pass_cancel.is_cancelled() {
                slot.pass_cancel = CancellationToken::new();
            }
            inner.set_state(slot, SchedulerState::Running);
            slot.control = Some(tokio::spawn(control_loop(inner.clone())));
            info!("Scheduler started");
            true
        }
    }
}

/// Restarts an idle loop if records are pending
async fn start_if_idle(inner: &Arc<Inner>) {
    {
        let slot = inner.lock();
        if slot.state != SchedulerState::Idle || slot.stopped {
            return;
        }
    }

    let pending = match inner.engine.pending_count().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Could not count pending records");
            return;
        }
    };
    if pending == 0 {
        return;
    }

    let mut slot = inner.lock();
    if !slot.stopped && !inner.shutdown.is_cancelled() && spawn_loop(inner, &mut slot) {
        info!(pending, "Pending records found, scheduler restarted");
    }
}

/// Relays record store notifications to the control loop
///
/// While idle, also recounts pending records once per polling period:
/// writes made by another process sharing the store raise no notification
/// here.
async fn watch_store(inner: Arc<Inner>) {
    let mut changes = inner.engine.store().subscribe();
    let mut changes_open = true;
    let mut idle_check = tokio::time::interval(inner.poll_period);
    idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; `start` just ran the loop
    idle_check.tick().await;

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            received = changes.recv(), if changes_open => {
                match received {
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Change notifications lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Record store change channel closed, polling only");
                        changes_open = false;
                        continue;
                    }
                }
                inner.recheck.store(true, Ordering::Release);
                inner.wake.notify_one();
                start_if_idle(&inner).await;
            }
            _ = idle_check.tick() => {
                start_if_idle(&inner).await;
            }
        }
    }
}

/// Ends the loop at a checkpoint if a stop was requested
///
/// Returns the cancellation token for the next pass otherwise.
fn checkpoint(inner: &Inner) -> Option<CancellationToken> {
    let mut slot = inner.lock();
    if slot.state != SchedulerState::Running || inner.shutdown.is_cancelled() {
        inner.set_state(&mut slot, SchedulerState::Idle);
        return None;
    }
    Some(slot.pass_cancel.clone())
}

async fn control_loop(inner: Arc<Inner>) {
    info!("Control loop running");
    let engine = inner.engine.clone();

    loop {
        let Some(cancel) = checkpoint(&inner) else {
            break;
        };

        inner.recheck.store(false, Ordering::Release);
        let run_again = match engine.pending_count().await {
            Ok(0) => {
                let mut slot = inner.lock();
                if !inner.recheck.load(Ordering::Acquire)
                    && slot.state == SchedulerState::Running
                {
                    inner.set_state(&mut slot, SchedulerState::Idle);
                    info!("No pending records, scheduler idle");
                    break;
                }
                true
            }
            Ok(pending) => {
                debug!(pending, "Pending records");
                match engine.run_pass(&cancel).await {
                    Ok(Some(report)) => !report.is_halted(),
                    Ok(None) => false,
                    Err(e) => {
                        warn!(error = %e, "Pass aborted");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not count pending records");
                false
            }
        };

        if run_again {
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.poll_period) => {}
            _ = inner.wake.notified() => {}
            _ = inner.shutdown.cancelled() => {}
        }
    }

    debug!("Control loop exited");
}
