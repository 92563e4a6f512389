//! Subscription manager for broadcasting state changes.

use crate::types::Version;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{
    DropReason, StateEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription<S> {
    config: SubscriptionConfig,
    sender: Sender<StateEvent<S>>,
}

impl<S> Subscription<S> {
    /// Try to send an event. Returns the drop reason if the subscriber must go.
    ///
    /// The channel has one slot beyond `buffer_size`, kept free for the
    /// final `Dropped` notice.
    fn try_send(&self, event: StateEvent<S>) -> Option<DropReason> {
        if self.sender.len() >= self.config.buffer_size {
            return Some(DropReason::BufferOverflow);
        }
        match self.sender.try_send(event) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => Some(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Some(DropReason::Disconnected),
        }
    }
}

/// Manages subscriptions and broadcasts change events.
pub struct SubscriptionManager<S> {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription<S>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl<S> SubscriptionManager<S> {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Only changes after this call are delivered.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle<S> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size + 1);

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(StateEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Broadcast a change to every subscription whose filter matches.
    /// Drops subscribers that fail to receive.
    pub fn broadcast_change(&self, version: Version, fields: &[String], snapshot: &Arc<S>) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.config.filter.matches(fields) {
                    continue;
                }
                let event = StateEvent::Changed {
                    version,
                    fields: fields.to_vec(),
                    snapshot: Arc::clone(snapshot),
                };
                if let Some(reason) = sub.try_send(event) {
                    to_remove.push((*id, reason));
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for (id, reason) in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::warn!(subscription = id.0, ?reason, "dropping state subscriber");
                    let _ = sub.sender.try_send(StateEvent::Dropped { reason });
                }
            }
        }
    }
}

impl<S> Default for SubscriptionManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::SubscriptionFilter;
    use std::time::Duration;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager: SubscriptionManager<i32> = SubscriptionManager::new();

        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(
            event,
            StateEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_broadcast_to_matching() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::fields(["count"]),
            ..Default::default()
        };
        let handle = manager.subscribe(config);

        manager.broadcast_change(Version(1), &fields(&["count", "name"]), &Arc::new(7));

        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            StateEvent::Changed {
                version,
                fields,
                snapshot,
            } => {
                assert_eq!(version, Version(1));
                assert_eq!(fields, vec!["count".to_string(), "name".to_string()]);
                assert_eq!(*snapshot, 7);
            }
            other => panic!("Expected Changed event, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_filters_non_matching() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::fields(["count"]),
            ..Default::default()
        };
        let handle = manager.subscribe(config);

        manager.broadcast_change(Version(1), &fields(&["name"]), &Arc::new(0));

        let result = handle.recv_timeout(Duration::from_millis(50));
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            buffer_size: 2,
            ..Default::default()
        };
        let handle = manager.subscribe(config);

        for i in 0..10 {
            manager.broadcast_change(Version(i), &fields(&["count"]), &Arc::new(i));
        }

        assert_eq!(manager.subscription_count(), 0);

        let events: Vec<_> = handle.receiver.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StateEvent::Changed { version: Version(0), .. }));
        assert!(matches!(events[1], StateEvent::Changed { version: Version(1), .. }));
        assert!(matches!(
            events[2],
            StateEvent::Dropped {
                reason: DropReason::BufferOverflow
            }
        ));
    }

    #[test]
    fn test_unsubscribe_notice_fits_full_buffer() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 1,
            ..Default::default()
        });

        manager.broadcast_change(Version(1), &fields(&["count"]), &Arc::new(1));
        manager.unsubscribe(handle.id);

        let events: Vec<_> = handle.receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            StateEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_drop_disconnected_subscriber() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());
        drop(handle);

        manager.broadcast_change(Version(1), &fields(&["count"]), &Arc::new(1));
        assert_eq!(manager.subscription_count(), 0);
    }
}
