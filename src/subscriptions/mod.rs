//! Change notifications for a state container.
//!
//! Every flush that produces a new version emits one
//! [`StateEvent::Changed`] carrying the new snapshot and the names of the
//! fields that differ. Subscriptions support:
//! - Filtering by field name
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let handle = state.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::fields(["count"]),
//!     ..Default::default()
//! });
//!
//! state.set_field(field!(Counter, count), FieldUpdate::value(1));
//! state.flush();
//!
//! match handle.recv() {
//!     Ok(StateEvent::Changed { version, snapshot, .. }) => println!("{version}: {snapshot:?}"),
//!     Ok(StateEvent::Dropped { reason }) => println!("dropped: {reason:?}"),
//!     Err(_) => {}
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, StateEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
