pub mod device;
pub mod grid;
pub mod snapshot;

pub use device::*;
pub use grid::*;
pub use snapshot::*;
