//! # Object State
//!
//! A container for one flat record of named fields, with two update
//! granularities queued onto a single state cell.
//!
//! ## Core Concepts
//!
//! - **Records**: fixed-shape structs declared with [`record!`], or
//!   [`JsonRecord`] for shapes known only at run time
//! - **Field updates**: replace one field with a literal or a transform of
//!   its previous value
//! - **Merges**: overwrite the fields present in a patch, or in the patch
//!   returned by a function of the previous state
//! - **Flush**: queued updates apply in submission order, each one seeing
//!   the output of the one before
//! - **Handles**: a snapshot of the fields at one version, plus the update
//!   operations
//!
//! ## Example
//!
//! ```ignore
//! use object_state::{field, record, FieldUpdate, MergeUpdate, ObjectState};
//!
//! record! {
//!     #[derive(Clone, Debug, PartialEq)]
//!     pub struct Counter patch CounterPatch {
//!         pub count: i64,
//!         pub label: String,
//!     }
//! }
//!
//! let state = ObjectState::create(Counter { count: 0, label: "clicks".into() });
//! let handle = state.handle();
//!
//! handle.set(field!(Counter, count), FieldUpdate::with(|c| c + 1));
//! handle.set_state(MergeUpdate::with(|prev: &Counter| {
//!     CounterPatch::default().count(prev.count + 1)
//! }));
//! state.flush();
//!
//! assert_eq!(state.handle().count, 2);
//! ```

pub mod container;
pub mod dynamic;
pub mod error;
pub mod record;
pub mod state;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use container::{FlushMode, Handle, ObjectState, StateConfig};
pub use dynamic::{JsonKind, JsonRecord, UnknownFieldPolicy};
pub use error::{Result, StateError};
pub use record::Record;
pub use state::{apply_field_update, apply_key_update, apply_merge, FlushReport, StateCell};
pub use subscriptions::{
    DropReason, StateEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
