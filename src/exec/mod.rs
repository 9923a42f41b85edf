// src/exec/mod.rs

//! Unit execution layer.
//!
//! This module is responsible for actually invoking the function
//! capabilities bound to compiled units, and reporting back to the runtime
//! via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `FunctionExecutorBackend` the runtime uses in production; tests replace
//!   it with fake implementations.
//! - [`invoke`] handles a single unit invocation: backoff delay for retries,
//!   secret resolution, capability dispatch, and outcome classification.

pub mod backend;
pub mod invoke;

pub use backend::{ExecutorBackend, FunctionExecutorBackend};
