use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::metrics::ProgressSnapshot;
use crate::observer::{ControllerState, RunEvent};
use crate::run::{CancelToken, Pacer, Run, RunOutcome};
use crate::sampling::{PointSource, RngSource};
use crate::state::{lock_state, RunState, SharedRunState, VisualizationSample};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Builds the point source for a run.
pub type SourceFactory =
    Box<dyn Fn(&SimulationConfig) -> Result<Box<dyn PointSource>, EngineError> + Send>;

fn default_source(config: &SimulationConfig) -> Result<Box<dyn PointSource>, EngineError> {
    Ok(Box::new(RngSource::from_seed_option(config.seed())?))
}

/// Controller state shared with the run thread, which records the final state.
#[derive(Clone)]
struct SharedPhase(Arc<Mutex<ControllerState>>);

impl SharedPhase {
    fn get(&self) -> ControllerState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ControllerState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Owns the run state and drives runs on a background thread.
///
/// `Idle -> Running -> (Completed | Cancelled) -> Idle`. Every transition is
/// published as [`RunEvent::StateChanged`] on the channel returned by [`RunController::new`].
pub struct RunController {
    config: SimulationConfig,
    // Configuration the current state was produced under.
    active: SimulationConfig,
    state: SharedRunState,
    phase: SharedPhase,
    cancel: CancelToken,
    events: Sender<RunEvent>,
    source_factory: SourceFactory,
    handle: Option<JoinHandle<()>>,
}

impl RunController {
    pub fn new(config: SimulationConfig) -> (Self, Receiver<RunEvent>) {
        let (events, receiver) = unbounded();
        let controller = Self {
            state: Arc::new(Mutex::new(RunState::new(config.visualization_limit()))),
            active: config.clone(),
            config,
            phase: SharedPhase(Arc::new(Mutex::new(ControllerState::Idle))),
            cancel: CancelToken::new(),
            events,
            source_factory: Box::new(default_source),
            handle: None,
        };
        (controller, receiver)
    }

    /// Replaces the default RNG source, e.g. with a scripted one.
    pub fn with_source_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&SimulationConfig) -> Result<Box<dyn PointSource>, EngineError> + Send + 'static,
    {
        self.source_factory = Box::new(factory);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.phase.get()
    }

    /// Replaces the configuration for the next run. Ignored while running.
    pub fn configure(&mut self, config: SimulationConfig) -> bool {
        if self.state() == ControllerState::Running {
            warn!("Ignoring configuration change while a run is in progress");
            return false;
        }
        self.config = config;
        true
    }

    /// Starts a run with the current configuration. A no-op while running.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state() == ControllerState::Running {
            warn!("start() ignored: a run is already in progress");
            return Ok(());
        }
        self.join_run_thread();

        let source = (self.source_factory)(&self.config).map_err(|e| self.fail(e))?;

        self.cancel = CancelToken::new();
        self.active = self.config.clone();
        {
            let mut state = lock_state(&self.state);
            *state = RunState::new(self.config.visualization_limit());
            state.begin();
        }
        let run = Run::new(
            self.config.clone(),
            source,
            Arc::clone(&self.state),
            self.cancel.clone(),
        )
        .map_err(|e| self.fail(e))?;

        info!(
            "Starting {} run of {} points ({} worker(s))",
            run.scheduler_name(),
            self.config.total_points(),
            self.config.worker_count()
        );
        self.transition(ControllerState::Running);

        let state = Arc::clone(&self.state);
        let phase = self.phase.clone();
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name("montepi-run".to_string())
            .spawn(move || drive(run, state, phase, events))
            .map_err(|e| self.fail(EngineError::Spawn(e)))?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Requests cooperative cancellation; the run stops within one batch.
    pub fn cancel(&self) {
        if self.state() == ControllerState::Running {
            debug!("Cancellation requested");
            self.cancel.cancel();
        }
    }

    /// Cancels any active run, discards its state and returns to `Idle`.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.join_run_thread();
        *lock_state(&self.state) = RunState::new(self.config.visualization_limit());
        self.active = self.config.clone();
        if self.state() != ControllerState::Idle {
            self.transition(ControllerState::Idle);
        }
    }

    /// Blocks until the active run (if any) has finished.
    pub fn wait(&mut self) -> ControllerState {
        self.join_run_thread();
        self.state()
    }

    pub fn current_snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::project(&lock_state(&self.state), self.active.total_points())
    }

    pub fn samples(&self) -> Vec<VisualizationSample> {
        lock_state(&self.state).samples().to_vec()
    }

    fn transition(&self, state: ControllerState) {
        self.phase.set(state);
        let _ = self.events.send(RunEvent::StateChanged(state));
    }

    /// Fatal setup failure: the run is abandoned as `Cancelled` with a diagnostic.
    fn fail(&self, err: EngineError) -> EngineError {
        error!("Run aborted: {}", err);
        lock_state(&self.state).finish();
        let _ = self.events.send(RunEvent::Diagnostic(err.to_string()));
        self.transition(ControllerState::Cancelled);
        err
    }

    fn join_run_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Run thread terminated abnormally");
            }
        }
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.join_run_thread();
    }
}

/// Body of the run thread: one progress event per batch, then the final state.
fn drive(mut run: Run, state: SharedRunState, phase: SharedPhase, events: Sender<RunEvent>) {
    let pacer = Pacer::new(run.config().pacing());
    let total = run.config().total_points();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut published = 0;
        while let Some(batch) = run.next() {
            pacer.wait_until(batch.virtual_start);

            let (snapshot, new_samples) = {
                let guard = lock_state(&state);
                let new_samples = guard.samples()[published..].to_vec();
                (ProgressSnapshot::project(&guard, total), new_samples)
            };
            published += new_samples.len();

            // A dropped receiver only means nobody is watching.
            let _ = events.send(RunEvent::Progress { snapshot, batch, new_samples });
        }
        run.finish()
    }));

    let final_state = match outcome {
        Ok(RunOutcome::Completed) => ControllerState::Completed,
        Ok(RunOutcome::Cancelled) => ControllerState::Cancelled,
        Err(payload) => {
            lock_state(&state).finish();
            let message = panic_message(payload.as_ref());
            error!("Run thread panicked: {}", message);
            let _ = events.send(RunEvent::Diagnostic(format!("run aborted: {}", message)));
            ControllerState::Cancelled
        }
    };

    let snapshot = ProgressSnapshot::project(&lock_state(&state), total);
    info!(
        "Run {}: {} points, pi ~ {:.6} (error {:.6}) in {}ms",
        final_state,
        snapshot.processed_points,
        snapshot.pi_estimate,
        snapshot.absolute_error,
        snapshot.elapsed_millis
    );

    phase.set(final_state);
    let _ = events.send(RunEvent::StateChanged(final_state));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
