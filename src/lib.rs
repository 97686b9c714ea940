//! Client-side vehicle location reporting.
//!
//! A [`controller::TrackingController`] asks the [`permission`] gate once per start, then on a
//! fixed period takes a fix from a [`position`] source and posts it through a [`transmission`]
//! channel. Every state change is published to a [`status::StatusSink`].

pub mod config;
pub mod controller;
pub mod permission;
pub mod position;
pub mod sample;
pub mod state_machine;
pub mod status;
pub mod transmission;
pub mod unit;
pub mod unit_store;
