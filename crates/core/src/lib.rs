//! Domain model and job lifecycle state machine for sketchflow.
//!
//! This crate performs no I/O. The client crate drives [`machine::JobMachine`]
//! from network events and executes the effects it returns.

pub mod error;
pub mod history;
pub mod machine;
pub mod types;
