pub mod session;
pub mod wrappers;

/// The [`StateMachine`] trait provides calling semantics and indicates the upholding of invariants
/// that guarantee deterministic behavior.
///
/// # Functionality
/// State machines operate on defined inputs and outputs. A machine usually accepts several kinds
/// of input and emits several kinds of output, which in Rust is represented with an enum per
/// direction. The associated types [`Input`](StateMachine::Input) and
/// [`Output`](StateMachine::Output) name those groupings, while
/// [`process_input`](StateMachine::process_input) and [`poll_output`](StateMachine::poll_output)
/// map them onto the inherent methods that hold the actual logic.
///
/// Outputs of a machine that drives the outside world are usually *effects*: requests for the
/// container to perform some I/O and feed the result back in as a later input.
///
/// # Invariants
/// A [`StateMachine`] must be pure: its operation may not depend on any external behavior of the
/// broader system, so that two runs fed the same inputs produce the same outputs.
///
/// Implementors of this trait *must* uphold all the following invariants.
///
/// ## No Interior Mutability
/// All data is either immutable or mutable only through `&mut` access. [`std::cell`] containers,
/// [`std::sync`] locks and reference counted pointers such as [`Arc`](std::sync::Arc) are
/// prohibited. The only allowed shared data is `&'static` references to values without interior
/// mutability.
///
/// ## No IO
/// [`std::io`], [`std::net`], files, sockets and HTTP clients are forbidden inside the machine.
///
/// ### No System Time
/// Reading [`std::time::Instant::now`] or [`std::time::SystemTime`] makes two otherwise identical
/// runs diverge. Wall-clock values the machine needs (e.g. the moment a transmission was
/// acknowledged) must arrive through input.
///
/// ### No System RNG
/// Random values, including freshly generated identifiers, must also arrive through input.
///
/// ## No Concurrency
/// No threads, no async. The executor driving an async task is external state, so
/// [`std::task`] based code is forbidden inside the machine. Timers are expressed as effects the
/// container arms and disarms, with each firing delivered back as input.
///
/// ## No Blocking
/// Every call returns promptly. Blocking would require either locks or I/O, both already ruled
/// out, and long running loops are considered degenerate.
///
/// # Side Effects
/// Side effects that neither affect the logic of the machine nor drive any other system, such as
/// logging and metrics, are permitted. The machine *must not* rely on their outcome.
///
/// # Handling Time and Randomness via Injection
/// A "Runner" wraps the pure machine, performs the impure system calls and passes their results
/// in as [`Input`](StateMachine::Input). See the [`wrappers`][self::wrappers] module for the
/// [`SystemResource`](wrappers::input::system::SystemResource) trait runners use to produce those
/// values, and [`crate::controller`] for the runner of the tracking session.
///
/// # Example
/// ```ignore
/// pub struct Odometer {
///     total_m: f64,
///     pending: bool,
/// }
///
/// pub enum OdometerInput {
///     Travelled(f64),
///     Reset,
/// }
///
/// pub struct OdometerOutput(pub f64);
///
/// impl StateMachine for Odometer {
///     type Input = OdometerInput;
///     type Output = OdometerOutput;
///
///     fn process_input(&mut self, input: Self::Input) {
///         match input {
///             OdometerInput::Travelled(metres) => self.total_m += metres,
///             OdometerInput::Reset => self.total_m = 0.0,
///         }
///         self.pending = true;
///     }
///
///     fn poll_output(&mut self) -> Option<Self::Output> {
///         std::mem::take(&mut self.pending).then_some(OdometerOutput(self.total_m))
///     }
/// }
/// ```
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) from the state machine.
    type Output;

    /// Process the provided `input` into the state machine.
    fn process_input(&mut self, input: Self::Input);

    /// Poll the state machine for output, returning the first available output if present.
    fn poll_output(&mut self) -> Option<Self::Output>;
}
