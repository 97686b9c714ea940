use impl_trait_for_tuples::impl_for_tuples;

use crate::sample::EpochMillis;
use crate::state_machine::session::SessionId;

/// The [`SystemResource`] trait indicates that a type is a resource inherently provided by the
/// system context of the application.
///
/// Provides a single method [`generate`](SystemResource::generate) which takes no input, producing
/// an instance of the resource from only the implicit system context (clock, entropy).
///
/// Runners call this right before building an input for a [`StateMachine`](super::super::StateMachine),
/// so the machine itself stays free of system calls.
pub trait SystemResource {
    /// Produce an instance of this resource with no direct input, drawing only from the implicitly
    /// available global system context.
    fn generate() -> Self;
}

#[impl_for_tuples(1, 4)]
impl SystemResource for Tuple {
    fn generate() -> Self {
        for_tuples!( ( #( Tuple::generate() ),* ) )
    }
}

impl SystemResource for EpochMillis {
    fn generate() -> Self {
        EpochMillis::from_millis(chrono::Utc::now().timestamp_millis())
    }
}

impl SystemResource for SessionId {
    fn generate() -> Self {
        SessionId::from_uuid(uuid::Uuid::new_v4())
    }
}
