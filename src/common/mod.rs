//! Common Types for the Wagering Engine
//!
//! Unified error handling shared across modules.

pub mod error;

pub use error::{EngineError, Result};
