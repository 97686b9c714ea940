//! The runner for the tracking session.
//!
//! [`SessionRuntime::spawn`] moves a [`SessionMachine`] into a tokio task together with the
//! collaborators that perform its effects. The task owns the single repeating timer, drives
//! permission, position and transmission futures to completion and feeds their results back into
//! the machine. Callers talk to it through the cloneable [`TrackingController`] handle.

pub mod error;

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::permission::PermissionGate;
use crate::position::PositionSource;
use crate::sample::EpochMillis;
use crate::state_machine::StateMachine;
use crate::state_machine::session::{
    Generation, SessionId, SessionInput, SessionMachine, SessionOutput, SessionState,
    StartOutcome,
};
use crate::state_machine::wrappers::input::system::SystemResource;
use crate::status::StatusSink;
use crate::transmission::TransmissionChannel;
use crate::unit::UnitId;

pub use self::error::{ControllerClosed, SessionAlreadyActive, StartError};

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FIX_AGE: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 16;

/// Timing parameters of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct SessionTiming {
    /// Interval between repeating reports. Must be non-zero.
    #[builder(default = DEFAULT_SAMPLE_PERIOD)]
    pub sample_period: Duration,

    /// How long the position source may take to produce a fix.
    #[builder(default = DEFAULT_FIX_TIMEOUT)]
    pub fix_timeout: Duration,

    /// Maximum age of a cached fix the position source may hand back.
    #[builder(default = DEFAULT_MAX_FIX_AGE)]
    pub max_fix_age: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything a tracking session needs, ready to be spawned.
///
/// # Example
///
/// ```ignore
/// let runtime = SessionRuntime::builder()
///     .gate(ConsentGate::new(source.clone(), ConsentFile::unrecorded()))
///     .source(source)
///     .channel(HttpChannel::new(channel_config)?)
///     .sink((DashboardSink, LogSink))
///     .build();
///
/// let (controller, task) = runtime.spawn();
/// controller.start(UnitId::parse("BUS-42")?).await?;
/// ```
#[derive(Builder)]
pub struct SessionRuntime<G, P, T, K> {
    gate: G,
    source: P,
    channel: T,
    sink: K,
    #[builder(default)]
    timing: SessionTiming,
}

impl<G, P, T, K> SessionRuntime<G, P, T, K>
where
    G: PermissionGate,
    P: PositionSource,
    T: TransmissionChannel,
    K: StatusSink,
{
    /// Start the controller task on the current tokio runtime.
    ///
    /// The task ends after [`TrackingController::shutdown`] or once every controller handle has
    /// been dropped, in both cases stopping any running session first.
    pub fn spawn(self) -> (TrackingController, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionState::default());

        let driver = Driver {
            machine: SessionMachine::new(),
            gate: Arc::new(self.gate),
            source: Arc::new(self.source),
            channel: Arc::new(self.channel),
            sink: self.sink,
            timing: self.timing,
            commands: commands_rx,
            status: status_tx,
            timer: None,
            effects: FuturesUnordered::new(),
            incoming_start: None,
            pending_start: None,
        };

        let task = tokio::spawn(driver.run());

        let controller = TrackingController {
            commands: commands_tx,
            status: status_rx,
        };

        (controller, task)
    }
}

type StartReply = oneshot::Sender<Result<SessionState, StartError>>;

#[derive(Debug)]
enum Command {
    Start { unit_id: UnitId, reply: StartReply },
    Stop { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Handle to a running tracking controller.
#[derive(Debug, Clone)]
pub struct TrackingController {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionState>,
}

impl TrackingController {
    /// Begin tracking `unit_id`.
    ///
    /// Resolves once the permission gate has answered and, when granted, the first report has
    /// been attempted. A failed first report still starts tracking; the failure is visible in the
    /// returned state's `last_error`.
    pub async fn start(&self, unit_id: UnitId) -> Result<SessionState, StartError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { unit_id, reply })
            .await
            .map_err(|_| ControllerClosed)?;

        response.await.map_err(|_| ControllerClosed)?
    }

    /// Stop tracking. A no-op when already idle.
    pub async fn stop(&self) -> Result<(), ControllerClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop { reply })
            .await
            .map_err(|_| ControllerClosed)?;

        response.await.map_err(|_| ControllerClosed)
    }

    /// Stop tracking and end the controller task.
    pub async fn shutdown(&self) -> Result<(), ControllerClosed> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| ControllerClosed)
    }

    /// The most recently published session state.
    pub fn snapshot(&self) -> SessionState {
        self.status.borrow().clone()
    }

    /// Receive every published session state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.status.clone()
    }
}

struct ArmedTimer {
    generation: Generation,
    interval: Interval,
}

/// Resolves on the next firing of the armed timer, or never when no timer is armed.
async fn next_tick(timer: &mut Option<ArmedTimer>) -> Generation {
    match timer {
        Some(armed) => {
            armed.interval.tick().await;
            armed.generation
        }
        None => std::future::pending().await,
    }
}

struct Driver<G, P, T, K> {
    machine: SessionMachine,
    gate: Arc<G>,
    source: Arc<P>,
    channel: Arc<T>,
    sink: K,
    timing: SessionTiming,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<SessionState>,
    timer: Option<ArmedTimer>,
    effects: FuturesUnordered<BoxFuture<'static, SessionInput>>,
    /// Reply for a start command currently being processed.
    incoming_start: Option<StartReply>,
    /// Reply for an accepted start that has not settled yet.
    pending_start: Option<StartReply>,
}

impl<G, P, T, K> Driver<G, P, T, K>
where
    G: PermissionGate,
    P: PositionSource,
    T: TransmissionChannel,
    K: StatusSink,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Start { unit_id, reply }) => self.start(unit_id, reply),
                    Some(Command::Stop { reply }) => {
                        self.apply(SessionInput::Stop);
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown) | None => {
                        self.apply(SessionInput::Stop);
                        break;
                    }
                },

                generation = next_tick(&mut self.timer) => {
                    self.apply(SessionInput::TimerFired { generation });
                }

                Some(input) = self.effects.next(), if !self.effects.is_empty() => {
                    self.apply(input);
                }
            }
        }

        debug!("Tracking controller exited");
    }

    fn start(&mut self, unit_id: UnitId, reply: StartReply) {
        let (session_id, started_at): (SessionId, EpochMillis) = SystemResource::generate();

        info!(
            vehicle_id = %unit_id,
            session_id = %session_id,
            "Starting tracking"
        );

        self.incoming_start = Some(reply);
        self.apply(SessionInput::Start {
            unit_id,
            session_id,
            started_at,
        });

        if let Some(reply) = self.incoming_start.take() {
            self.pending_start = Some(reply);
        }
    }

    fn apply(&mut self, input: SessionInput) {
        self.machine.process_input(input);
        while let Some(output) = self.machine.poll_output() {
            self.perform(output);
        }
    }

    fn perform(&mut self, output: SessionOutput) {
        match output {
            SessionOutput::Status(state) => {
                self.sink.on_update(&state);
                self.status.send_replace(state);
            }

            SessionOutput::AcquirePermission { generation } => {
                let gate = Arc::clone(&self.gate);
                self.effects.push(
                    async move {
                        let result = gate.acquire().await;
                        SessionInput::PermissionResolved { generation, result }
                    }
                    .boxed(),
                );
            }

            SessionOutput::ArmTimer { generation } => {
                let period = self.timing.sample_period.max(Duration::from_millis(1));
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.timer = Some(ArmedTimer {
                    generation,
                    interval,
                });

                info!(
                    generation = %generation,
                    period_ms = period.as_millis() as u64,
                    "Tracking timer armed"
                );
            }

            SessionOutput::DisarmTimer { generation } => {
                if self
                    .timer
                    .as_ref()
                    .is_some_and(|armed| armed.generation == generation)
                {
                    self.timer = None;
                    info!(generation = %generation, "Tracking timer disarmed");
                }
            }

            SessionOutput::FetchPosition { generation } => {
                let source = Arc::clone(&self.source);
                let SessionTiming {
                    fix_timeout,
                    max_fix_age,
                    ..
                } = self.timing;
                self.effects.push(
                    async move {
                        let result = source.fetch_current(fix_timeout, max_fix_age).await;
                        SessionInput::FixResolved { generation, result }
                    }
                    .boxed(),
                );
            }

            SessionOutput::Transmit {
                generation,
                unit_id,
                sample,
            } => {
                let channel = Arc::clone(&self.channel);
                self.effects.push(
                    async move {
                        let result = channel.send(&unit_id, &sample).await;
                        SessionInput::SendResolved {
                            generation,
                            result,
                            completed_at: EpochMillis::generate(),
                        }
                    }
                    .boxed(),
                );
            }

            SessionOutput::StartRejected { phase } => {
                if let Some(reply) = self.incoming_start.take() {
                    let _ = reply.send(Err(SessionAlreadyActive { phase }.into()));
                }
            }

            SessionOutput::StartSettled { outcome } => {
                let Some(reply) = self.pending_start.take() else {
                    return;
                };
                let result = match outcome {
                    StartOutcome::Active => Ok(self.machine.state().clone()),
                    StartOutcome::Refused(err) => Err(StartError::Permission(err)),
                    StartOutcome::Cancelled => Err(StartError::Cancelled),
                };
                let _ = reply.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::permission::{PermissionError, PermissionStatus};
    use crate::position::PositionError;
    use crate::sample::Sample;
    use crate::state_machine::session::Phase;
    use crate::status::LogSink;
    use crate::transmission::TransmissionError;

    #[derive(Clone, Copy)]
    struct FakeGate {
        result: Result<PermissionStatus, PermissionError>,
        delay: Duration,
    }

    impl FakeGate {
        fn granted() -> Self {
            Self {
                result: Ok(PermissionStatus::Granted),
                delay: Duration::ZERO,
            }
        }
    }

    impl PermissionGate for FakeGate {
        fn acquire(
            &self,
        ) -> impl Future<Output = Result<PermissionStatus, PermissionError>> + Send {
            let Self { result, delay } = *self;
            async move {
                tokio::time::sleep(delay).await;
                result
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeSource {
        fetches: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl FakeSource {
        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl PositionSource for FakeSource {
        fn fetch_current(
            &self,
            _timeout: Duration,
            _max_age: Duration,
        ) -> impl Future<Output = Result<Sample, PositionError>> + Send {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                Ok(Sample::new(
                    1.0 + n as f64,
                    2.0,
                    Some(10.0),
                    EpochMillis::generate(),
                ))
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeChannel {
        sent: Arc<Mutex<Vec<(UnitId, Sample)>>>,
        fail_with: Option<u16>,
        delay: Duration,
    }

    impl FakeChannel {
        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl TransmissionChannel for FakeChannel {
        fn send(
            &self,
            unit_id: &UnitId,
            sample: &Sample,
        ) -> impl Future<Output = Result<(), TransmissionError>> + Send {
            self.sent.lock().unwrap().push((unit_id.clone(), *sample));
            let fail_with = self.fail_with;
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                match fail_with {
                    Some(status) => Err(TransmissionError::Status { status }),
                    None => Ok(()),
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<SessionState>>>);

    impl StatusSink for Recorder {
        fn on_update(&self, state: &SessionState) {
            self.0.lock().unwrap().push(state.clone());
        }
    }

    fn unit() -> UnitId {
        UnitId::parse("BUS-1").unwrap()
    }

    fn spawn(
        gate: FakeGate,
        source: &FakeSource,
        channel: &FakeChannel,
    ) -> (TrackingController, JoinHandle<()>) {
        SessionRuntime::builder()
            .gate(gate)
            .source(source.clone())
            .channel(channel.clone())
            .sink(LogSink)
            .build()
            .spawn()
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied() {
        let gate = FakeGate {
            result: Err(PermissionError::Denied),
            delay: Duration::ZERO,
        };
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, _task) = spawn(gate, &source, &channel);

        let result = controller.start(unit()).await;
        assert_eq!(result, Err(StartError::Permission(PermissionError::Denied)));

        tokio::time::sleep(Duration::from_secs(20)).await;

        let state = controller.snapshot();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.permission_status, PermissionStatus::Denied);
        assert!(!state.tracking_enabled);
        assert_eq!(source.fetches(), 0);
        assert_eq!(channel.sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_immediately_then_every_period() {
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, _task) = spawn(FakeGate::granted(), &source, &channel);

        let state = controller.start(unit()).await.unwrap();
        assert!(state.tracking_enabled);
        assert_eq!(state.phase, Phase::Active);
        assert_eq!(state.permission_status, PermissionStatus::Granted);
        assert!(state.last_send_timestamp.is_some());
        assert_eq!(state.last_error, None);
        assert_eq!(channel.sent(), 1);

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(channel.sent(), 3);

        let sent = channel.sent.lock().unwrap();
        assert!(sent.iter().all(|(id, _)| *id == unit()));
        assert_eq!(controller.snapshot().last_sample, Some(sent[2].1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_keeps_tracking() {
        let source = FakeSource::default();
        let channel = FakeChannel {
            fail_with: Some(500),
            ..Default::default()
        };
        let (controller, _task) = spawn(FakeGate::granted(), &source, &channel);

        let state = controller.start(unit()).await.unwrap();
        assert!(state.tracking_enabled);
        assert!(state.last_sample.is_some());
        assert_eq!(state.last_send_timestamp, None);
        assert_eq!(state.last_error.as_deref(), Some("HTTP error! status: 500"));

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(channel.sent(), 2);
        assert!(controller.snapshot().tracking_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disarms_timer() {
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, _task) = spawn(FakeGate::granted(), &source, &channel);

        controller.start(unit()).await.unwrap();
        controller.stop().await.unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(channel.sent(), 1);
        assert_eq!(controller.snapshot(), SessionState::default());

        // Stopping again is harmless
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, _task) = spawn(FakeGate::granted(), &source, &channel);

        controller.start(unit()).await.unwrap();
        let result = controller.start(UnitId::parse("BUS-2").unwrap()).await;

        assert_eq!(
            result,
            Err(StartError::AlreadyActive(SessionAlreadyActive {
                phase: Phase::Active
            }))
        );
        assert_eq!(controller.snapshot().unit_id, Some(unit()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_awaiting_permission() {
        let gate = FakeGate {
            delay: Duration::from_secs(1),
            ..FakeGate::granted()
        };
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, _task) = spawn(gate, &source, &channel);

        let starting = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start(unit()).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.snapshot().phase, Phase::AwaitingPermission);
        controller.stop().await.unwrap();

        assert_eq!(starting.await.unwrap(), Err(StartError::Cancelled));

        // The late grant is discarded
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(source.fetches(), 0);
        assert!(!controller.snapshot().tracking_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fix_skips_overlapping_tick() {
        let source = FakeSource {
            delay: Duration::from_secs(7),
            ..Default::default()
        };
        let channel = FakeChannel::default();
        let (controller, _task) = spawn(FakeGate::granted(), &source, &channel);

        // First fetch spans the 5s timer firing, which is skipped
        controller.start(unit()).await.unwrap();
        assert_eq!(source.fetches(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_send_after_stop_is_discarded() {
        let source = FakeSource::default();
        let channel = FakeChannel {
            delay: Duration::from_secs(2),
            ..Default::default()
        };
        let (controller, _task) = spawn(FakeGate::granted(), &source, &channel);

        controller.start(unit()).await.unwrap();

        // The 5s tick is mid-send when tracking stops
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(channel.sent(), 2);
        controller.stop().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(channel.sent(), 2);
        assert_eq!(controller.snapshot(), SessionState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_sees_every_transition() {
        let recorder = Recorder::default();
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, _task) = SessionRuntime::builder()
            .gate(FakeGate::granted())
            .source(source.clone())
            .channel(channel.clone())
            .sink(recorder.clone())
            .build()
            .spawn();

        controller.start(unit()).await.unwrap();
        controller.stop().await.unwrap();

        let states = recorder.0.lock().unwrap();
        let phases: Vec<Phase> = states.iter().map(|state| state.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::AwaitingPermission,
                Phase::Active,
                Phase::Active,
                Phase::Active,
                Phase::Idle,
            ]
        );
        assert!(states[3].last_send_timestamp.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_ends_task() {
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, task) = spawn(FakeGate::granted(), &source, &channel);

        controller.start(unit()).await.unwrap();
        let status = controller.subscribe();
        drop(controller);

        task.await.unwrap();
        assert_eq!(status.borrow().phase, Phase::Idle);
        assert!(!status.borrow().tracking_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_controller() {
        let source = FakeSource::default();
        let channel = FakeChannel::default();
        let (controller, task) = spawn(FakeGate::granted(), &source, &channel);

        controller.start(unit()).await.unwrap();
        controller.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(
            controller.start(unit()).await,
            Err(StartError::Closed(ControllerClosed))
        );
        assert_eq!(controller.stop().await, Err(ControllerClosed));
    }
}
