pub mod config_manager;
pub mod error;
pub mod runtime_config;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use runtime_config::*;
pub use types::*;
