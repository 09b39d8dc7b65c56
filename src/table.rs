//! In-memory table storage for ShelfDB
//!
//! A table owns its schema and record set, and enforces constraints on every
//! mutation. Callers only ever see defensive copies of stored records.

use crate::error::{Error, Result};
use crate::record::{Record, Value};
use crate::schema::Schema;
use std::cmp::Ordering as CmpOrdering;

/// Sort direction for [`Query::order_by`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// A query against a table: optional predicate, ordering, and limit.
///
/// Predicates are caller-supplied boolean functions over a record; they are
/// expected to be pure and total over any record conforming to the schema.
pub struct Query<'a> {
    predicate: Option<Box<dyn Fn(&Record) -> bool + 'a>>,
    order_by: Option<(String, Order)>,
    limit: Option<usize>,
}

impl<'a> Query<'a> {
    /// A query matching every record, in insertion order
    pub fn new() -> Self {
        Self {
            predicate: None,
            order_by: None,
            limit: None,
        }
    }

    /// Keep only records the predicate accepts
    pub fn filter(mut self, predicate: impl Fn(&Record) -> bool + 'a) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Sort by the named field. Ties keep insertion order.
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    /// Truncate the result to at most `limit` records
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for Query<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// One applied update: the record before and after the change
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub before: Record,
    pub after: Record,
}

/// Outcome of a batch update. Records whose changed values violate a
/// constraint are skipped and their violations collected; the rest are
/// applied.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Before/after pairs for every record the update was applied to
    pub changes: Vec<RecordChange>,
    /// One constraint error per skipped record
    pub violations: Vec<Error>,
}

impl UpdateReport {
    /// Number of records the update was applied to
    pub fn applied(&self) -> usize {
        self.changes.len()
    }
}

/// An in-memory table: ordered schema plus record set
#[derive(Debug)]
pub struct Table {
    name: String,
    schema: Schema,
    records: Vec<Record>,
    next_id: i64,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            records: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild a table from persisted records. The id counter resumes past
    /// the highest stored primary key, so replayed and future inserts can
    /// never collide.
    pub(crate) fn from_saved(name: impl Into<String>, schema: Schema, records: Vec<Record>) -> Self {
        let next_id = schema
            .primary_key()
            .and_then(|pk| {
                records
                    .iter()
                    .filter_map(|r| r.get(&pk.name).and_then(Value::as_integer))
                    .max()
            })
            .map_or(1, |max| max + 1);
        Self {
            name: name.into(),
            schema,
            records,
            next_id,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of records currently held
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Next value of the primary-key counter. Monotonic, never reused.
    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    pub(crate) fn records(&self) -> &[Record] {
        &self.records
    }

    /// Insert a record.
    ///
    /// Unspecified fields are filled from their default (or the id counter,
    /// for the primary key); then every resolved value is checked for
    /// nullability, type, and uniqueness, in that order. On success the
    /// stored record is returned as a defensive copy.
    pub fn insert(&mut self, values: Record) -> Result<Record> {
        for key in values.keys() {
            if !self.schema.has_field(key) {
                return Err(Error::FieldNotFound(key.clone(), self.name.clone()));
            }
        }

        let mut values = values;
        let mut record = Record::with_capacity(self.schema.field_count());
        for field in self.schema.fields() {
            let resolved = match values.swap_remove(&field.name) {
                Some(v) => v,
                None if field.primary_key => {
                    // An auto-filled id is consumed even if a later
                    // constraint check fails; gaps are harmless, reuse is not.
                    let id = self.next_id;
                    self.next_id += 1;
                    Value::Integer(id)
                }
                None => field.default.clone().unwrap_or(Value::Null),
            };
            record.insert(field.name.clone(), resolved);
        }

        for field in self.schema.fields() {
            if let Some(v) = record.get(&field.name) {
                if v.is_null() && !field.nullable {
                    return Err(Error::NotNullViolation(field.name.clone()));
                }
            }
        }

        for field in self.schema.fields() {
            if let Some(v) = record.get_mut(&field.name) {
                *v = field.coerce(v.clone())?;
            }
        }

        for field in self.schema.fields().filter(|f| f.unique) {
            if let Some(v) = record.get(&field.name) {
                if !v.is_null() && self.records.iter().any(|r| r.get(&field.name) == Some(v)) {
                    return Err(Error::UniqueViolation(field.name.clone()));
                }
            }
        }

        // An explicitly supplied primary key advances the counter past
        // itself, keeping ids monotonic.
        if let Some(pk) = self.schema.primary_key() {
            if let Some(Value::Integer(id)) = record.get(&pk.name) {
                if *id >= self.next_id {
                    self.next_id = id + 1;
                }
            }
        }

        self.records.push(record.clone());
        Ok(record)
    }

    /// Query records: filter, stable sort, truncate. Returns defensive
    /// copies. Full scan plus sort; there is no indexing.
    pub fn select(&self, query: &Query) -> Result<Vec<Record>> {
        let mut results: Vec<Record> = match &query.predicate {
            Some(predicate) => self
                .records
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
            None => self.records.clone(),
        };

        if let Some((field_name, order)) = &query.order_by {
            if !self.schema.has_field(field_name) {
                return Err(Error::FieldNotFound(field_name.clone(), self.name.clone()));
            }
            results.sort_by(|a, b| {
                let ordering = match (a.get(field_name), b.get(field_name)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(CmpOrdering::Equal),
                    _ => CmpOrdering::Equal,
                };
                match order {
                    Order::Ascending => ordering,
                    Order::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// Update every record matching the predicate.
    ///
    /// A request naming an unknown field or the primary key fails whole, with
    /// nothing applied. Per-record constraint violations skip that record
    /// only and are collected in the report alongside the applied changes.
    pub fn update<F>(&mut self, predicate: F, changes: &Record) -> Result<UpdateReport>
    where
        F: Fn(&Record) -> bool,
    {
        for key in changes.keys() {
            if !self.schema.has_field(key) {
                return Err(Error::FieldNotFound(key.clone(), self.name.clone()));
            }
        }
        if let Some(pk) = self.schema.primary_key() {
            if changes.contains_key(&pk.name) {
                return Err(Error::ImmutableField(pk.name.clone()));
            }
        }

        let mut report = UpdateReport::default();
        for index in 0..self.records.len() {
            if !predicate(&self.records[index]) {
                continue;
            }
            match self.apply_changes(index, changes) {
                Ok(candidate) => {
                    let before = std::mem::replace(&mut self.records[index], candidate.clone());
                    report.changes.push(RecordChange {
                        before,
                        after: candidate,
                    });
                }
                Err(e) => report.violations.push(e),
            }
        }
        Ok(report)
    }

    /// Validate `changes` against one record, in insert order: nullability,
    /// type, uniqueness (excluding the record itself). Returns the updated
    /// record without touching stored state.
    fn apply_changes(&self, index: usize, changes: &Record) -> Result<Record> {
        let mut candidate = self.records[index].clone();

        for (name, value) in changes {
            let Some(field) = self.schema.field(name) else {
                return Err(Error::FieldNotFound(name.clone(), self.name.clone()));
            };
            if value.is_null() && !field.nullable {
                return Err(Error::NotNullViolation(name.clone()));
            }
        }

        for (name, value) in changes {
            let Some(field) = self.schema.field(name) else {
                return Err(Error::FieldNotFound(name.clone(), self.name.clone()));
            };
            candidate.insert(name.clone(), field.coerce(value.clone())?);
        }

        for name in changes.keys() {
            let Some(field) = self.schema.field(name) else {
                return Err(Error::FieldNotFound(name.clone(), self.name.clone()));
            };
            if !field.unique {
                continue;
            }
            if let Some(v) = candidate.get(name) {
                if !v.is_null()
                    && self
                        .records
                        .iter()
                        .enumerate()
                        .any(|(j, r)| j != index && r.get(name) == Some(v))
                {
                    return Err(Error::UniqueViolation(name.clone()));
                }
            }
        }

        Ok(candidate)
    }

    /// Remove every record matching the predicate; the removed records are
    /// returned (their number is the delete count). The id counter is not
    /// reset.
    pub fn delete<F>(&mut self, predicate: F) -> Vec<Record>
    where
        F: Fn(&Record) -> bool,
    {
        let mut removed = Vec::new();
        self.records.retain(|record| {
            if predicate(record) {
                removed.push(record.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}
