//! Core domain types shared across the engine.

pub mod error;

pub use error::{EngineError, Result};
