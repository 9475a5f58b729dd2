pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::Engine;
pub use config::CollectionPolicy;
pub use error::{EngineError, Result};
