// Docflow - Reactive document state and view row buffering

pub mod config;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod types;
pub mod unit_of_work;
pub mod view;

pub use config::{CountPolicy, DependencyConfig, EngineConfig, HIGH_VOLUME_THRESHOLD};
pub use error::{Result, StateError};
pub use unit_of_work::{FlushedChanges, UnitOfWork};
