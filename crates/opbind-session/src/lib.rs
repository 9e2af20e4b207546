pub mod context;
pub mod error;
pub mod handler;
pub mod registry;

pub use context::*;
pub use error::*;
pub use handler::*;
pub use registry::*;
