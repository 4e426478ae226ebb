//! The periodic estimation worker.
//!
//! A named thread owns the [`EstimationCycle`] and drives it from an
//! [`AbsoluteScheduler`]. Commands from the owning thread travel over a
//! bounded crossbeam channel and are handled between two cycles, so they
//! never interleave with filter updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, info, warn};
use wholebody_errors::{LifecycleError, Result};
use wholebody_scheduler::AbsoluteScheduler;

use crate::cycle::EstimationCycle;

/// Capacity of the worker command queue.
pub const COMMAND_QUEUE: usize = 8;

/// How long `change_dof` waits for the worker to answer.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands handled by the worker between cycles.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Resize the cycle to a new number of joints
    ChangeDof {
        /// New number of joints
        joints: usize,
        /// Receives the outcome
        response: Sender<Result<()>>,
    },
    /// Leave the loop
    Shutdown,
}

struct WorkerContext {
    cycle: EstimationCycle,
    scheduler: AbsoluteScheduler,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    commands: Receiver<WorkerCommand>,
}

/// Handle to the estimation worker thread.
#[derive(Debug)]
pub struct EstimatorThread {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    commands: Sender<WorkerCommand>,
    handle: Option<JoinHandle<EstimationCycle>>,
    period: Duration,
}

impl EstimatorThread {
    /// Initialize `cycle` on the calling thread, then hand it to a new
    /// worker ticking every `period`.
    ///
    /// # Errors
    ///
    /// Returns the scheduler or `thread_init` error, in which case the cycle
    /// is released, or [`LifecycleError::Worker`] if the thread cannot be
    /// spawned.
    pub fn start(mut cycle: EstimationCycle, period: Duration) -> Result<Self> {
        let scheduler = AbsoluteScheduler::with_period(period)?;
        if let Err(e) = cycle.thread_init() {
            cycle.thread_release();
            return Err(e);
        }

        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = channel::bounded(COMMAND_QUEUE);
        let ctx = WorkerContext {
            cycle,
            scheduler,
            running: Arc::clone(&running),
            paused: Arc::clone(&paused),
            commands: command_rx,
        };

        let handle = thread::Builder::new()
            .name("wholebody-estimator".into())
            .spawn(move || worker_main(ctx))
            .map_err(|e| LifecycleError::Worker(format!("failed to spawn estimator thread: {e}")))?;

        info!(period_us = period.as_micros(), "estimator thread started");
        Ok(Self {
            running,
            paused,
            commands: command_tx,
            handle: Some(handle),
            period,
        })
    }

    /// Suspend the cycle; commands are still handled.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            info!("estimator thread paused");
        }
    }

    /// Resume the cycle. The schedule is re-anchored so the paused time does
    /// not count as missed deadlines.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            info!("estimator thread resumed");
        }
    }

    /// Whether the cycle is suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Whether the worker loop is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Tick period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Resize the cycle to `joints` joints.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::WorkerRunning`] unless paused,
    /// [`LifecycleError::Worker`] if the worker does not answer, or the
    /// cycle's own `change_dof` error.
    pub fn change_dof(&self, joints: usize) -> Result<()> {
        if !self.is_paused() {
            return Err(LifecycleError::WorkerRunning.into());
        }
        let (response_tx, response_rx) = channel::bounded(1);
        self.commands
            .try_send(WorkerCommand::ChangeDof {
                joints,
                response: response_tx,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => LifecycleError::QueueFull,
                TrySendError::Disconnected(_) => {
                    LifecycleError::Worker("estimator thread is gone".into())
                }
            })?;
        response_rx
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|e| LifecycleError::Worker(format!("no answer to change_dof: {e}")))?
    }

    /// Stop the worker and return the released cycle.
    ///
    /// Returns `Ok(None)` if already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Worker`] if the thread panicked.
    pub fn stop(&mut self) -> Result<Option<EstimationCycle>> {
        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.commands.try_send(WorkerCommand::Shutdown) {
            debug!(error = %e, "shutdown command not queued");
        }

        match handle.join() {
            Ok(cycle) => {
                info!("estimator thread stopped cleanly");
                Ok(Some(cycle))
            }
            Err(e) => {
                error!(panic = ?e, "estimator thread panicked");
                Err(LifecycleError::Worker("estimator thread panicked".into()).into())
            }
        }
    }
}

impl Drop for EstimatorThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("estimator thread dropped while running, stopping it");
            if let Err(e) = self.stop() {
                error!(error = %e, "failed to stop estimator thread");
            }
        }
    }
}

fn worker_main(mut ctx: WorkerContext) -> EstimationCycle {
    let mut was_paused = false;
    while ctx.running.load(Ordering::Acquire) {
        if !process_commands(&mut ctx) {
            break;
        }

        if ctx.paused.load(Ordering::Acquire) {
            was_paused = true;
            match ctx.commands.recv_timeout(ctx.scheduler.period()) {
                Ok(command) => {
                    if !handle_command(&mut ctx.cycle, command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            continue;
        }
        if was_paused {
            ctx.scheduler.rearm();
            was_paused = false;
        }

        let tick = ctx.scheduler.wait_for_tick();
        if let Err(e) = ctx.cycle.run(&tick) {
            error!(error = %e, cycle = tick.count, "estimation cycle failed, stopping worker");
            break;
        }
    }

    ctx.running.store(false, Ordering::Release);
    let jitter = ctx.scheduler.metrics().summary();
    info!(
        ticks = jitter.ticks,
        missed = jitter.missed,
        p99_us = jitter.p99_ns / 1_000,
        max_us = jitter.max_ns / 1_000,
        "estimator timing: {jitter}"
    );
    ctx.cycle.thread_release();
    ctx.cycle
}

/// Drain pending commands; `false` asks the loop to exit.
fn process_commands(ctx: &mut WorkerContext) -> bool {
    while let Ok(command) = ctx.commands.try_recv() {
        if !handle_command(&mut ctx.cycle, command) {
            return false;
        }
    }
    true
}

fn handle_command(cycle: &mut EstimationCycle, command: WorkerCommand) -> bool {
    match command {
        WorkerCommand::ChangeDof { joints, response } => {
            let result = cycle.change_dof(joints);
            if let Err(e) = &result {
                warn!(joints, error = %e, "change_dof rejected");
            }
            if response.send(result).is_err() {
                debug!("change_dof caller went away");
            }
            true
        }
        WorkerCommand::Shutdown => false,
    }
}
