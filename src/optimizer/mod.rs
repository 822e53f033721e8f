pub mod constraints;
pub mod engine;
pub mod strategies;
pub mod types;

pub use constraints::*;
pub use engine::*;
pub use strategies::*;
pub use types::*;
