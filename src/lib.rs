//! Real-time DMX mixing engine.
//!
//! A [`graph::Graph`] of controllables is mixed once per tick by
//! [`engine::Management`]; the quantized universes are handed to output
//! devices and published as an immutable [`models::ValueSnapshot`].

pub mod engine;
pub mod error;
pub mod fixtures;
pub mod graph;
pub mod models;
pub mod output;
pub mod settings;
pub mod show;

pub use engine::{Management, Timing};
pub use error::{EngineError, Result};
pub use graph::Graph;
pub use models::{ControlValue, ValueSnapshot};
pub use settings::EngineSettings;
