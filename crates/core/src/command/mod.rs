//! Command module
//!
//! Queued instructions to devices and their delivery state machine.

mod model;
mod store;

pub use model::*;
pub use store::CommandStore;
