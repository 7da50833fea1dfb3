//! Core, transport-agnostic pieces of the inference gateway: the chat
//! message model, sampling normalizer, tool registry and orchestrator,
//! pluggable session stores, configuration, and the error taxonomy shared
//! by the HTTP layer in `runtime-server`.

pub mod config;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod sampling;
pub mod session;
pub mod tools;
pub mod trace;

pub use error::{Result, RuntimeError};
