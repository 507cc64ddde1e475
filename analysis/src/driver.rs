//! Runs an [`EventSource`] to completion on a dedicated worker thread.
//!
//! The worker is the only writer of the [`MatchAggregator`]. Between two steps
//! it passes the pause gate, which is also where cancellation is observed, so
//! a step that already started (advancing the source and applying its events)
//! always completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::demo_analysis::ScoreBoard;
use parking_lot::{Condvar, MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};

use crate::aggregator::{ApplyError, MatchAggregator};
use crate::events::DemoEvent;
use crate::model::{Game, PartialGame};
use crate::source::{EventSource, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl DriverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// What to do with an event that references a team or player the decoder
/// never announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownEntityPolicy {
    /// Log the event and continue with the next one
    #[default]
    Skip,
    /// Fail the run
    Fail,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub unknown_entities: UnknownEntityPolicy,
    pub thread_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            unknown_entities: UnknownEntityPolicy::Skip,
            thread_name: "demo-driver".to_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("source: {0}")]
    Source(#[from] SourceError),
    #[error("applying event: {0}")]
    Apply(#[from] ApplyError),
    #[error("worker panicked")]
    WorkerPanicked,
    #[error("spawning worker: {0}")]
    Spawn(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 0 to 100
    pub percentage: u8,
    pub position: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(position: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((position as f64 / total as f64) * 100.0)
                .round()
                .clamp(0.0, 100.0) as u8
        };

        Self {
            percentage,
            position,
            total,
        }
    }
}

pub type ProgressReceiver = tokio::sync::mpsc::UnboundedReceiver<Progress>;

#[derive(Debug)]
pub enum Outcome {
    Completed {
        game: Game,
        scoreboard: Arc<ScoreBoard>,
    },
    Cancelled(PartialGame),
    Failed {
        error: DriverError,
        game: Game,
    },
}

impl Outcome {
    pub fn state(&self) -> DriverState {
        match self {
            Self::Completed { .. } => DriverState::Completed,
            Self::Cancelled(_) => DriverState::Cancelled,
            Self::Failed { .. } => DriverState::Failed,
        }
    }

    pub fn game(&self) -> &Game {
        match self {
            Self::Completed { game, .. } => game,
            Self::Cancelled(partial) => partial.game(),
            Self::Failed { game, .. } => game,
        }
    }
}

#[derive(Debug)]
struct Gate {
    state: DriverState,
    cancel_requested: bool,
}

#[derive(Debug)]
pub(crate) struct Control {
    gate: Mutex<Gate>,
    wake: Condvar,
    position: AtomicU64,
    total: AtomicU64,
}

impl Control {
    pub(crate) fn new() -> Self {
        Self {
            gate: Mutex::new(Gate {
                state: DriverState::Idle,
                cancel_requested: false,
            }),
            wake: Condvar::new(),
            position: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> DriverState {
        self.gate.lock().state
    }

    pub(crate) fn set_state(&self, state: DriverState) {
        self.gate.lock().state = state;
    }

    pub(crate) fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Release);
    }

    fn pause(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.state != DriverState::Running || gate.cancel_requested {
            return false;
        }
        gate.state = DriverState::Paused;
        true
    }

    fn resume(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.state != DriverState::Paused || gate.cancel_requested {
            return false;
        }
        gate.state = DriverState::Running;
        self.wake.notify_all();
        true
    }

    fn cancel(&self) -> bool {
        let mut gate = self.gate.lock();
        if !matches!(gate.state, DriverState::Running | DriverState::Paused) {
            return false;
        }
        gate.cancel_requested = true;
        self.wake.notify_all();
        true
    }

    /// Blocks while paused. Returns `false` once a cancel was requested.
    fn pass(&self) -> bool {
        let mut gate = self.gate.lock();
        while gate.state == DriverState::Paused && !gate.cancel_requested {
            self.wake.wait(&mut gate);
        }
        !gate.cancel_requested
    }
}

/// Read-only view of a running driver, cheap to clone
#[derive(Debug, Clone)]
pub struct Monitor {
    control: Arc<Control>,
}

impl Monitor {
    pub(crate) fn new(control: Arc<Control>) -> Self {
        Self { control }
    }

    pub fn state(&self) -> DriverState {
        self.control.state()
    }

    pub fn position(&self) -> u64 {
        self.control.position.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.control.total.load(Ordering::Acquire)
    }
}

/// A driver that has not been started yet
pub struct Driver<S> {
    source: S,
    config: DriverConfig,
}

impl<S> Driver<S>
where
    S: EventSource + 'static,
{
    pub fn new(source: S) -> Self {
        Self::with_config(source, DriverConfig::default())
    }

    pub fn with_config(source: S, config: DriverConfig) -> Self {
        Self { source, config }
    }

    /// Spawns the worker and moves into [`DriverState::Running`].
    pub fn start(self) -> Result<(DriverHandle, ProgressReceiver), DriverError> {
        let control = Arc::new(Control::new());
        control.set_state(DriverState::Running);

        let aggregator = Arc::new(RwLock::new(MatchAggregator::new()));
        let (progress_tx, progress_rx) = tokio::sync::mpsc::unbounded_channel();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let worker = Worker {
            control: control.clone(),
            aggregator: aggregator.clone(),
            progress: progress_tx,
            policy: self.config.unknown_entities,
        };
        let source = self.source;

        let thread = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let outcome = worker.run(source);
                let _ = done_tx.send(outcome);
            })
            .map_err(DriverError::Spawn)?;

        Ok((
            DriverHandle {
                control,
                aggregator,
                done: done_rx,
                thread,
            },
            progress_rx,
        ))
    }
}

/// Consumer side of a started driver
pub struct DriverHandle {
    control: Arc<Control>,
    aggregator: Arc<RwLock<MatchAggregator>>,
    done: tokio::sync::oneshot::Receiver<Outcome>,
    thread: std::thread::JoinHandle<()>,
}

impl DriverHandle {
    pub fn state(&self) -> DriverState {
        self.control.state()
    }

    pub fn monitor(&self) -> Monitor {
        Monitor::new(self.control.clone())
    }

    pub fn pause(&self) -> bool {
        let paused = self.control.pause();
        if paused {
            tracing::debug!("Paused");
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = self.control.resume();
        if resumed {
            tracing::debug!("Resumed");
        }
        resumed
    }

    /// Requests cancellation, the worker stops before its next step.
    pub fn cancel(&self) -> bool {
        let cancelled = self.control.cancel();
        if cancelled {
            tracing::debug!("Cancel requested");
        }
        cancelled
    }

    /// The live game. The worker cannot apply events while the guard is held,
    /// and the current round may only be partially updated.
    pub fn game(&self) -> MappedRwLockReadGuard<'_, Game> {
        RwLockReadGuard::map(self.aggregator.read(), |a| a.game())
    }

    pub fn scoreboard(&self) -> Option<Arc<ScoreBoard>> {
        self.aggregator.read().scoreboard()
    }

    /// Blocks until the worker is done. Must not be called from within an
    /// async context, use [`DriverHandle::finished`] there.
    pub fn wait(self) -> Outcome {
        let outcome = self.done.blocking_recv();
        Self::join(outcome, self.thread, &self.control, &self.aggregator)
    }

    pub async fn finished(self) -> Outcome {
        let outcome = self.done.await;
        Self::join(outcome, self.thread, &self.control, &self.aggregator)
    }

    fn join(
        outcome: Result<Outcome, tokio::sync::oneshot::error::RecvError>,
        thread: std::thread::JoinHandle<()>,
        control: &Control,
        aggregator: &RwLock<MatchAggregator>,
    ) -> Outcome {
        match outcome {
            Ok(outcome) => {
                let _ = thread.join();
                outcome
            }
            Err(_) => {
                tracing::error!("Worker exited without an outcome");
                let _ = thread.join();
                control.set_state(DriverState::Failed);
                Outcome::Failed {
                    error: DriverError::WorkerPanicked,
                    game: aggregator.read().game().clone(),
                }
            }
        }
    }
}

struct Worker {
    control: Arc<Control>,
    aggregator: Arc<RwLock<MatchAggregator>>,
    progress: tokio::sync::mpsc::UnboundedSender<Progress>,
    policy: UnknownEntityPolicy,
}

impl Worker {
    fn run<S>(self, source: S) -> Outcome
    where
        S: EventSource,
    {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.drive(source)))
            .unwrap_or(Err(DriverError::WorkerPanicked));

        let outcome = match result {
            Ok(DriverState::Cancelled) => {
                tracing::info!("Cancelled");
                Outcome::Cancelled(PartialGame(self.aggregator.read().game().clone()))
            }
            Ok(_) => {
                let mut aggregator = self.aggregator.write();
                match aggregator.finish() {
                    Ok(scoreboard) => {
                        tracing::info!("Completed");
                        Outcome::Completed {
                            game: aggregator.game().clone(),
                            scoreboard,
                        }
                    }
                    Err(e) => Outcome::Failed {
                        error: DriverError::Apply(e.into()),
                        game: aggregator.game().clone(),
                    },
                }
            }
            Err(error) => Outcome::Failed {
                error,
                game: self.aggregator.read().game().clone(),
            },
        };

        if let Outcome::Failed { error, .. } = &outcome {
            tracing::error!("Failed: {}", error);
        }

        self.control.set_state(outcome.state());
        outcome
    }

    #[tracing::instrument(name = "Driver", skip_all)]
    fn drive<S>(&self, mut source: S) -> Result<DriverState, DriverError>
    where
        S: EventSource,
    {
        let opening = source.open()?;
        if source.header().is_none() {
            return Err(SourceError::MissingHeader.into());
        }
        let total = source.total();
        self.control.total.store(total, Ordering::Release);

        tracing::info!(total, "Starting");

        self.dispatch(opening)?;

        loop {
            if !self.control.pass() {
                return Ok(DriverState::Cancelled);
            }

            let step = source.step()?;
            self.dispatch(step.events)?;

            let position = source.position();
            self.control.set_position(position);
            // The consumer may have stopped listening
            let _ = self.progress.send(Progress::new(position, total));

            if !step.has_more {
                return Ok(DriverState::Completed);
            }
        }
    }

    fn dispatch(&self, events: Vec<DemoEvent>) -> Result<(), DriverError> {
        for event in events {
            let name = event.name();

            match self.aggregator.write().apply(event) {
                Ok(()) => {}
                Err(ApplyError::UnknownEntityReference(entity))
                    if self.policy == UnknownEntityPolicy::Skip =>
                {
                    tracing::warn!(event = name, %entity, "Skipping event with unknown reference");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}
