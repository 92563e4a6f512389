//! Core types for state updates.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of effective changes applied to a state.
///
/// Starts at zero and is bumped once per flush that changed the state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl Version {
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed lens onto one field of a record.
///
/// Usually built with the [`field!`](crate::field) macro:
///
/// ```ignore
/// let count = field!(Counter, count);
/// assert_eq!(count.name(), "count");
/// ```
pub struct Field<S, V> {
    name: &'static str,
    get: fn(&S) -> &V,
    get_mut: fn(&mut S) -> &mut V,
}

impl<S, V> Field<S, V> {
    pub fn new(name: &'static str, get: fn(&S) -> &V, get_mut: fn(&mut S) -> &mut V) -> Self {
        Self { name, get, get_mut }
    }

    /// Field name as declared on the record.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<'a>(&self, record: &'a S) -> &'a V {
        (self.get)(record)
    }

    pub fn get_mut<'a>(&self, record: &'a mut S) -> &'a mut V {
        (self.get_mut)(record)
    }
}

impl<S, V> Clone for Field<S, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, V> Copy for Field<S, V> {}

impl<S, V> fmt::Debug for Field<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({})", self.name)
    }
}

/// New value for a single field: a literal, or a transform of the field's
/// previous value.
pub enum FieldUpdate<V> {
    Value(V),
    With(Box<dyn FnOnce(&V) -> V + Send>),
}

impl<V> FieldUpdate<V> {
    pub fn value(value: V) -> Self {
        FieldUpdate::Value(value)
    }

    /// Transform the previous value of the field.
    ///
    /// Transforms see the most recently queued value, so consecutive
    /// transforms compose even when no flush happens in between.
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&V) -> V + Send + 'static,
    {
        FieldUpdate::With(Box::new(f))
    }

    /// Resolve against the previous value of the field.
    pub fn resolve(self, prev: &V) -> V {
        match self {
            FieldUpdate::Value(value) => value,
            FieldUpdate::With(f) => f(prev),
        }
    }

    pub fn is_transform(&self) -> bool {
        matches!(self, FieldUpdate::With(_))
    }
}

impl<V> From<V> for FieldUpdate<V> {
    fn from(value: V) -> Self {
        FieldUpdate::Value(value)
    }
}

impl<V: fmt::Debug> fmt::Debug for FieldUpdate<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldUpdate::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldUpdate::With(_) => f.write_str("With(<fn>)"),
        }
    }
}

/// Partial merge into the whole record: a literal patch, or a function of
/// the previous snapshot returning a patch.
pub enum MergeUpdate<S: Record> {
    Patch(S::Patch),
    With(Box<dyn FnOnce(&S) -> S::Patch + Send>),
}

impl<S: Record> MergeUpdate<S> {
    pub fn patch(patch: S::Patch) -> Self {
        MergeUpdate::Patch(patch)
    }

    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&S) -> S::Patch + Send + 'static,
    {
        MergeUpdate::With(Box::new(f))
    }

    /// Resolve against the previous snapshot.
    pub fn resolve(self, prev: &S) -> S::Patch {
        match self {
            MergeUpdate::Patch(patch) => patch,
            MergeUpdate::With(f) => f(prev),
        }
    }
}

impl<S: Record> fmt::Debug for MergeUpdate<S>
where
    S::Patch: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeUpdate::Patch(patch) => f.debug_tuple("Patch").field(patch).finish(),
            MergeUpdate::With(_) => f.write_str("With(<fn>)"),
        }
    }
}

/// A field update with its value type erased.
pub struct FieldAssignment<S> {
    name: &'static str,
    apply: Box<dyn FnOnce(&S) -> S + Send>,
}

impl<S: Record> FieldAssignment<S> {
    pub fn new<V>(field: Field<S, V>, update: FieldUpdate<V>) -> Self
    where
        V: Send + 'static,
    {
        Self {
            name: field.name(),
            apply: Box::new(move |prev| crate::state::apply_field_update(prev, field, update)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Produce the next state from `prev`.
    pub fn apply(self, prev: &S) -> S {
        (self.apply)(prev)
    }
}

impl<S> fmt::Debug for FieldAssignment<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldAssignment({})", self.name)
    }
}

/// Either update granularity, selected by tag.
pub enum Update<S: Record> {
    Field(FieldAssignment<S>),
    Merge(MergeUpdate<S>),
}

impl<S: Record> fmt::Debug for Update<S>
where
    S::Patch: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Field(assignment) => f.debug_tuple("Field").field(assignment).finish(),
            Update::Merge(update) => f.debug_tuple("Merge").field(update).finish(),
        }
    }
}

impl<S: Record> Update<S> {
    pub fn field<V>(field: Field<S, V>, update: FieldUpdate<V>) -> Self
    where
        V: Send + 'static,
    {
        Update::Field(FieldAssignment::new(field, update))
    }

    pub fn merge(update: MergeUpdate<S>) -> Self {
        Update::Merge(update)
    }
}

impl<S: Record> From<MergeUpdate<S>> for Update<S> {
    fn from(update: MergeUpdate<S>) -> Self {
        Update::Merge(update)
    }
}

impl<S: Record> From<FieldAssignment<S>> for Update<S> {
    fn from(assignment: FieldAssignment<S>) -> Self {
        Update::Field(assignment)
    }
}
