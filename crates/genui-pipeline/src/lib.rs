pub mod controller;
pub mod error;
pub mod fences;
pub mod interpolate;
pub mod progress;
pub mod prompts;
pub mod schemas;
pub mod stages;

pub use controller::*;
pub use error::*;
pub use fences::*;
pub use interpolate::*;
pub use progress::*;
pub use prompts::*;
pub use schemas::*;
pub use stages::*;
