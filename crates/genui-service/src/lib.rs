pub mod blob;
pub mod error;
pub mod events;
pub mod service;
pub mod store;

pub use blob::*;
pub use error::*;
pub use events::*;
pub use service::*;
pub use store::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
