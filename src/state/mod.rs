//! State cell and update operations.
//!
//! The cell owns the current snapshot and a FIFO queue of updaters. Each
//! updater receives the most recently queued state as an explicit argument,
//! so consecutive transforms compose even before a flush.

mod cell;
mod operations;

pub use cell::{FlushReport, StateCell};
pub use operations::{apply_field_update, apply_key_update, apply_merge};

pub(crate) use cell::Updater;
