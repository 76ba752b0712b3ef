pub mod lifecycle;
pub mod order;

pub use lifecycle::*;
pub use order::*;
