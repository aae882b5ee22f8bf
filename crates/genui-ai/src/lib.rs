pub mod error;
pub mod gateway;
pub mod llm_factory;
pub mod llm_provider;
pub mod openai_compatible_provider;
pub mod output_shape;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::*;
pub use gateway::*;
pub use llm_factory::*;
pub use llm_provider::*;
pub use openai_compatible_provider::*;
pub use output_shape::*;
