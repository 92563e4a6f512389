//! Queued state cell.

use crate::error::{Result, StateError};
use crate::record::Record;
use crate::subscriptions::SubscriptionManager;
use crate::types::Version;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A queued transition from the previous state to the next one.
pub(crate) type Updater<S> = Box<dyn FnOnce(&S) -> Result<S> + Send>;

struct Queued<S> {
    label: String,
    run: Updater<S>,
}

struct Current<S> {
    snapshot: Arc<S>,
    version: Version,
}

/// Outcome of draining the update queue.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Version after the flush.
    pub version: Version,
    /// Updaters that produced a new state.
    pub applied: usize,
    /// Updaters that failed, by label. The state they saw passed through.
    pub rejected: Vec<(String, StateError)>,
    /// Fields whose values differ from the state before the flush.
    pub changed_fields: Vec<String>,
}

impl FlushReport {
    /// True when the flush produced a new version.
    pub fn is_changed(&self) -> bool {
        !self.changed_fields.is_empty()
    }

    /// Fold a later drain into this report.
    fn absorb(&mut self, later: FlushReport) {
        self.version = later.version;
        self.applied += later.applied;
        self.rejected.extend(later.rejected);
        for field in later.changed_fields {
            if !self.changed_fields.contains(&field) {
                self.changed_fields.push(field);
            }
        }
    }
}

/// Held for the duration of a drain. Records the draining thread so a
/// nested `flush` on that thread can be recognised.
struct Flushing<'a> {
    _lock: MutexGuard<'a, ()>,
    owner: &'a Mutex<Option<ThreadId>>,
}

impl<'a> Flushing<'a> {
    fn new(lock: MutexGuard<'a, ()>, owner: &'a Mutex<Option<ThreadId>>) -> Self {
        *owner.lock() = Some(thread::current().id());
        Self { _lock: lock, owner }
    }
}

impl Drop for Flushing<'_> {
    fn drop(&mut self) {
        *self.owner.lock() = None;
    }
}

/// Holds the current snapshot and the pending updaters.
pub struct StateCell<S: Record> {
    current: RwLock<Current<S>>,
    queue: Mutex<VecDeque<Queued<S>>>,
    /// Serialises flushes so queue order is application order.
    flush_lock: Mutex<()>,
    /// Thread currently holding `flush_lock`, if any.
    flushing_thread: Mutex<Option<ThreadId>>,
    subscriptions: SubscriptionManager<S>,
}

impl<S: Record> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: RwLock::new(Current {
                snapshot: Arc::new(initial),
                version: Version::default(),
            }),
            queue: Mutex::new(VecDeque::new()),
            flush_lock: Mutex::new(()),
            flushing_thread: Mutex::new(None),
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.current.read().snapshot)
    }

    pub fn version(&self) -> Version {
        self.current.read().version
    }

    /// Snapshot and version read under one lock.
    pub fn read(&self) -> (Arc<S>, Version) {
        let current = self.current.read();
        (Arc::clone(&current.snapshot), current.version)
    }

    /// Number of updaters waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager<S> {
        &self.subscriptions
    }

    pub(crate) fn enqueue(&self, label: impl Into<String>, run: Updater<S>) {
        self.queue.lock().push_back(Queued {
            label: label.into(),
            run,
        });
    }

    /// Apply every pending updater in submission order.
    ///
    /// Updaters run without the queue lock held, so anything they enqueue
    /// is drained by this same flush. If the result equals the state before
    /// the flush, the version stays put and no event is sent.
    ///
    /// Called from inside an updater, `flush` returns an empty report at
    /// the current version and leaves the queue to the running flush.
    pub fn flush(&self) -> FlushReport {
        if self.is_flushing_here() {
            return FlushReport {
                version: self.version(),
                ..Default::default()
            };
        }
        let _flushing = Flushing::new(self.flush_lock.lock(), &self.flushing_thread);
        self.drain()
    }

    /// Flush unless another flush is running.
    ///
    /// A flush that finds the queue non-empty after releasing the lock goes
    /// round again, so an update whose own `try_flush` lost the race is
    /// still applied before the winning call returns.
    pub fn try_flush(&self) -> Option<FlushReport> {
        let mut report: Option<FlushReport> = None;
        loop {
            let Some(lock) = self.flush_lock.try_lock() else {
                return report;
            };
            let flushing = Flushing::new(lock, &self.flushing_thread);
            let drained = self.drain();
            drop(flushing);

            report = Some(match report.take() {
                Some(mut earlier) => {
                    earlier.absorb(drained);
                    earlier
                }
                None => drained,
            });
            if self.queue.lock().is_empty() {
                return report;
            }
        }
    }

    fn is_flushing_here(&self) -> bool {
        *self.flushing_thread.lock() == Some(thread::current().id())
    }

    fn drain(&self) -> FlushReport {
        let (before, version) = self.read();
        let mut report = FlushReport {
            version,
            ..Default::default()
        };

        if self.queue.lock().is_empty() {
            return report;
        }

        let mut working: S = (*before).clone();
        loop {
            let next = self.queue.lock().pop_front();
            let Some(Queued { label, run }) = next else {
                break;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| run(&working))) {
                Ok(Ok(state)) => {
                    working = state;
                    report.applied += 1;
                }
                Ok(Err(e)) => report.rejected.push((label, e)),
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    report.rejected.push((label, StateError::UpdaterPanicked(message)));
                }
            }
        }

        if working == *before {
            return report;
        }

        report.changed_fields = before.diff(&working);
        let snapshot = Arc::new(working);
        {
            let mut current = self.current.write();
            current.version = current.version.next();
            current.snapshot = Arc::clone(&snapshot);
            report.version = current.version;
        }

        self.subscriptions
            .broadcast_change(report.version, &report.changed_fields, &snapshot);

        report
    }
}
