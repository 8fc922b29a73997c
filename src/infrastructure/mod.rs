// Infrastructure layer - configuration and external adapters
pub mod config;

pub use config::{EngineConfig, load_engine_config};
