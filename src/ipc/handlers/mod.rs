pub mod core;
pub mod grid;
pub mod registry;
pub mod scores;
pub mod session;
