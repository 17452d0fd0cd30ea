pub mod rotation;
pub mod stations;
pub mod types;
pub mod vehicle;

pub use rotation::*;
pub use stations::*;
pub use types::*;
pub use vehicle::*;
