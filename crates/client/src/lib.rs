//! Client-side orchestration of generation jobs.
//!
//! Wires the pure [`JobMachine`](sketchflow_core::machine::JobMachine) to
//! the outside world: the REST API, the push channel with its reconnect
//! policy, the status-poll fallback, the debounced capture stage and the
//! user-facing action façade.

pub mod actions;
pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod events;
pub mod messages;
pub mod origin;
pub mod poller;
pub mod reconnect;
pub mod runtime;
pub mod session;
