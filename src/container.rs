//! The state container and the handles it hands out.

use crate::dynamic::JsonRecord;
use crate::error::Result;
use crate::record::Record;
use crate::state::{apply_key_update, apply_merge, FlushReport, StateCell, Updater};
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionId};
use crate::types::{Field, FieldAssignment, FieldUpdate, MergeUpdate, Update, Version};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// When queued updates are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushMode {
    /// Batch updates until [`ObjectState::flush`] is called.
    Manual,
    /// Apply each update as soon as it is queued.
    Immediate,
}

impl Default for FlushMode {
    fn default() -> Self {
        FlushMode::Manual
    }
}

/// State container configuration.
#[derive(Clone, Debug)]
pub struct StateConfig {
    pub flush_mode: FlushMode,

    /// Label used in log lines.
    pub name: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::default(),
            name: "state".to_string(),
        }
    }
}

struct Inner<S: Record> {
    config: StateConfig,
    cell: StateCell<S>,
}

/// Owns one record and exposes field-level and merge-level updates.
///
/// Updates are queued and applied in submission order on [`flush`]. Every
/// updater receives the most recently queued state, so transforms compose:
///
/// ```ignore
/// let state = ObjectState::create(Counter { count: 0 });
/// state.set_field(field!(Counter, count), FieldUpdate::with(|c| c + 1));
/// state.set_field(field!(Counter, count), FieldUpdate::with(|c| c + 1));
/// state.flush();
/// assert_eq!(state.handle().count, 2);
/// ```
///
/// Literals computed from a stale handle do not compose: two writes of
/// `handle.count + 1` from the same handle both write the same value.
///
/// Cloning is cheap and every clone shares the same state.
///
/// [`flush`]: ObjectState::flush
pub struct ObjectState<S: Record> {
    inner: Arc<Inner<S>>,
}

impl<S: Record> Clone for ObjectState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Record> ObjectState<S> {
    pub fn create(initial: S) -> Self {
        Self::with_config(initial, StateConfig::default())
    }

    pub fn with_config(initial: S, config: StateConfig) -> Self {
        tracing::debug!(state = %config.name, mode = ?config.flush_mode, "created state container");
        Self {
            inner: Arc::new(Inner {
                config,
                cell: StateCell::new(initial),
            }),
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.inner.config
    }

    /// Current values plus the update operations.
    pub fn handle(&self) -> Handle<S> {
        let (snapshot, version) = self.inner.cell.read();
        Handle {
            snapshot,
            version,
            state: self.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<S> {
        self.inner.cell.snapshot()
    }

    pub fn version(&self) -> Version {
        self.inner.cell.version()
    }

    /// Updates queued but not yet applied.
    pub fn pending(&self) -> usize {
        self.inner.cell.pending()
    }

    /// Replace one field with a literal or a transform of its previous value.
    pub fn set_field<V>(&self, field: Field<S, V>, update: FieldUpdate<V>)
    where
        V: Send + 'static,
    {
        self.enqueue_field(FieldAssignment::new(field, update));
    }

    /// Merge a patch, or a function of the previous state returning one.
    pub fn merge_state(&self, update: MergeUpdate<S>) {
        self.enqueue("merge", Box::new(move |prev: &S| apply_merge(prev, update)));
    }

    /// Dispatch either kind of update by its tag.
    pub fn set(&self, update: impl Into<Update<S>>) {
        match update.into() {
            Update::Field(assignment) => self.enqueue_field(assignment),
            Update::Merge(merge) => self.merge_state(merge),
        }
    }

    /// Apply every queued update.
    ///
    /// Calling this from inside an updater does not block: it returns an
    /// empty report and the running flush drains what was queued.
    pub fn flush(&self) -> FlushReport {
        let report = self.inner.cell.flush();
        self.log_flush(&report);
        report
    }

    fn log_flush(&self, report: &FlushReport) {
        for (label, error) in &report.rejected {
            tracing::warn!(state = %self.inner.config.name, update = %label, %error, "rejected state update");
        }
        tracing::debug!(
            state = %self.inner.config.name,
            version = report.version.0,
            applied = report.applied,
            rejected = report.rejected.len(),
            changed = ?report.changed_fields,
            "flushed state updates"
        );
    }

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle<S> {
        self.inner.cell.subscriptions().subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.cell.subscriptions().unsubscribe(id);
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.cell.subscriptions().subscription_count()
    }

    fn enqueue_field(&self, assignment: FieldAssignment<S>) {
        let label = assignment.name();
        self.enqueue(label, Box::new(move |prev: &S| Ok(assignment.apply(prev))));
    }

    fn enqueue(&self, label: &str, run: Updater<S>) {
        tracing::trace!(state = %self.inner.config.name, update = label, "queued state update");
        self.inner.cell.enqueue(label, run);
        // A flush already running on any thread drains this before it returns
        if self.inner.config.flush_mode == FlushMode::Immediate {
            if let Some(report) = self.inner.cell.try_flush() {
                self.log_flush(&report);
            }
        }
    }
}

impl ObjectState<JsonRecord> {
    /// Replace one key of a JSON record.
    ///
    /// The key and any literal value are checked against the current shape
    /// before queueing. Transform results are checked when applied.
    pub fn set_key(&self, key: impl Into<String>, update: FieldUpdate<Value>) -> Result<()> {
        let key = key.into();
        let current = self.snapshot();
        match &update {
            FieldUpdate::Value(value) => current.check_value(&key, value)?,
            FieldUpdate::With(_) => current.check_key(&key)?,
        }

        let label = key.clone();
        self.enqueue(
            &label,
            Box::new(move |prev: &JsonRecord| apply_key_update(prev, &key, update)),
        );
        Ok(())
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.snapshot().get(key).cloned()
    }
}

impl<S: Record + fmt::Debug> fmt::Debug for ObjectState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (snapshot, version) = self.inner.cell.read();
        f.debug_struct("ObjectState")
            .field("name", &self.inner.config.name)
            .field("version", &version)
            .field("state", &snapshot)
            .field("pending", &self.pending())
            .finish()
    }
}

/// A read of the state at one version, plus the update operations.
///
/// Field values are read through `Deref`. They belong to the version the
/// handle was taken at; take a new handle after a flush to see new values.
pub struct Handle<S: Record> {
    snapshot: Arc<S>,
    version: Version,
    state: ObjectState<S>,
}

impl<S: Record> Handle<S> {
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn snapshot(&self) -> &Arc<S> {
        &self.snapshot
    }

    pub fn get<V>(&self, field: Field<S, V>) -> &V {
        field.get(&self.snapshot)
    }

    /// Per-field update.
    pub fn set<V>(&self, field: Field<S, V>, update: FieldUpdate<V>)
    where
        V: Send + 'static,
    {
        self.state.set_field(field, update);
    }

    /// Partial merge.
    pub fn set_state(&self, update: MergeUpdate<S>) {
        self.state.merge_state(update);
    }

    /// Either kind of update, dispatched by tag.
    pub fn apply(&self, update: impl Into<Update<S>>) {
        self.state.set(update);
    }

    /// True once the container has moved past this handle's version.
    pub fn is_stale(&self) -> bool {
        self.state.version() != self.version
    }

    pub fn refresh(&self) -> Handle<S> {
        self.state.handle()
    }
}

impl<S: Record> Deref for Handle<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.snapshot
    }
}

impl<S: Record + fmt::Debug> fmt::Debug for Handle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("version", &self.version)
            .field("state", &self.snapshot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use serde_json::json;

    crate::record! {
        #[derive(Clone, Debug, PartialEq)]
        struct Form patch FormPatch {
            count: i64,
            name: String,
        }
    }

    fn form() -> ObjectState<Form> {
        ObjectState::create(Form {
            count: 0,
            name: "a".to_string(),
        })
    }

    #[test]
    fn test_handle_reflects_initial() {
        let state = form();
        let handle = state.handle();
        assert_eq!(handle.count, 0);
        assert_eq!(handle.name, "a");
        assert_eq!(handle.version(), Version(0));
    }

    #[test]
    fn test_handle_set_and_set_state() {
        let state = form();
        let handle = state.handle();
        handle.set(crate::field!(Form, count), FieldUpdate::value(5));
        handle.set_state(MergeUpdate::patch(FormPatch::default().name("b".to_string())));
        state.flush();

        assert!(handle.is_stale());
        assert_eq!(handle.count, 0);

        let fresh = handle.refresh();
        assert_eq!(fresh.count, 5);
        assert_eq!(fresh.name, "b");
        assert!(!fresh.is_stale());
    }

    #[test]
    fn test_immediate_mode() {
        let state = ObjectState::with_config(
            Form {
                count: 1,
                name: "a".to_string(),
            },
            StateConfig {
                flush_mode: FlushMode::Immediate,
                ..Default::default()
            },
        );
        state.set_field(crate::field!(Form, count), FieldUpdate::with(|c: &i64| c * 10));

        assert_eq!(state.pending(), 0);
        assert_eq!(state.handle().count, 10);
        assert_eq!(state.version(), Version(1));
    }

    #[test]
    fn test_immediate_mode_reentrant_update() {
        let state = ObjectState::with_config(
            Form {
                count: 0,
                name: "a".to_string(),
            },
            StateConfig {
                flush_mode: FlushMode::Immediate,
                ..Default::default()
            },
        );
        let inner = state.clone();
        state.merge_state(MergeUpdate::with(move |prev: &Form| {
            inner.set_field(crate::field!(Form, name), FieldUpdate::value("nested".to_string()));
            FormPatch::default().count(prev.count + 1)
        }));

        let handle = state.handle();
        assert_eq!(handle.count, 1);
        assert_eq!(handle.name, "nested");
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn test_flush_inside_updater_does_not_block() {
        let state = form();
        let inner = state.clone();
        state.merge_state(MergeUpdate::with(move |prev: &Form| {
            inner.set_field(crate::field!(Form, name), FieldUpdate::value("nested".to_string()));
            assert_eq!(inner.flush().applied, 0);
            FormPatch::default().count(prev.count + 1)
        }));

        let report = state.flush();
        assert!(report.rejected.is_empty());
        assert_eq!(report.applied, 2);

        let handle = state.handle();
        assert_eq!(handle.count, 1);
        assert_eq!(handle.name, "nested");
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn test_json_set_key_rejects_unknown_eagerly() {
        let record = JsonRecord::new(json!({"count": 0}), Default::default()).unwrap();
        let state = ObjectState::create(record);

        let result = state.set_key("missing", FieldUpdate::value(json!(1)));
        assert!(matches!(result, Err(StateError::UnknownField(_))));
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn test_json_transform_checked_on_flush() {
        let record = JsonRecord::new(json!({"count": 0}), Default::default()).unwrap();
        let state = ObjectState::create(record);

        state
            .set_key("count", FieldUpdate::with(|_: &Value| json!("not a number")))
            .unwrap();
        let report = state.flush();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, "count");
        assert_eq!(state.get("count"), Some(json!(0)));
        assert_eq!(state.version(), Version(0));
    }
}
