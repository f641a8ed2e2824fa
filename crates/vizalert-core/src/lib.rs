//! # VizAlert Core
//!
//! Shared building blocks for the alert & report execution engine:
//! configuration, the error type, the domain model and the traits every
//! external collaborator (query engine, screenshot driver, document renderer,
//! notification channel) is consumed through.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::VizAlertConfig;
pub use error::{Result, VizAlertError};
