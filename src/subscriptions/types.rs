//! Subscription types for state change events.

use crate::types::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 64
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only notify when one of these fields changed (None = every change).
    pub fields: Option<Vec<String>>,
}

impl SubscriptionFilter {
    /// Subscribe to every change.
    pub fn all() -> Self {
        Self::default()
    }

    /// Subscribe to changes touching any of `names`.
    pub fn fields<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            fields: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    pub(crate) fn matches(&self, changed: &[String]) -> bool {
        match &self.fields {
            None => true,
            Some(names) => changed.iter().any(|c| names.contains(c)),
        }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug)]
pub enum StateEvent<S> {
    /// A flush produced a new version.
    Changed {
        version: Version,
        /// Fields whose values differ from the previous version.
        fields: Vec<String>,
        snapshot: Arc<S>,
    },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle<S> {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StateEvent<S>>,
}

impl<S> SubscriptionHandle<S> {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StateEvent<S>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StateEvent<S>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StateEvent<S>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
