pub mod backend;
pub mod catalog;
pub mod error;
pub mod graph;
pub mod identity;
pub mod kernel;
pub mod tensor;

pub use backend::*;
pub use catalog::*;
pub use error::*;
pub use graph::*;
pub use identity::*;
pub use kernel::*;
pub use tensor::*;
