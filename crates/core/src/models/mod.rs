//! Data models for Ofisu

mod office;
mod room;

pub use office::*;
pub use room::*;
