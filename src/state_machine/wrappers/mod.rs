//! Common wrappers that let [`StateMachine`](super::StateMachine) containers provide system
//! resources to machines that must receive them deterministically via input.

pub mod input;
