//! Pipeline execution engine

pub mod config;
pub mod engine;
pub mod executor;
pub mod workspace;

pub use config::{default_data_dir, EngineConfig};
pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::StepExecutor;
pub use workspace::Workspace;
