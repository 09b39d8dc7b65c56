//! Schema definitions for ShelfDB
//!
//! This module defines field types, per-field constraint flags, and the
//! ordered table schema.

use crate::error::{Error, Result};
use crate::record::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 64-bit integer
    Integer,
    /// UTF-8 text
    Text,
    /// 64-bit float
    Real,
    /// Boolean
    Boolean,
}

impl FieldType {
    /// Check whether a non-null value inhabits this type. Integers are
    /// accepted for `Real` fields (widened on storage); everything else is
    /// strict.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldType::Integer, Value::Integer(_))
                | (FieldType::Text, Value::Text(_))
                | (FieldType::Real, Value::Real(_))
                | (FieldType::Real, Value::Integer(_))
                | (FieldType::Boolean, Value::Boolean(_))
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Text => write!(f, "TEXT"),
            FieldType::Real => write!(f, "REAL"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// Field definition: one column of a table schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Semantic type
    pub field_type: FieldType,
    /// Is this the primary key?
    pub primary_key: bool,
    /// Is this field nullable?
    pub nullable: bool,
    /// Is this field unique?
    pub unique: bool,
    /// Default value for unspecified inserts
    pub default: Option<Value>,
}

impl Field {
    /// Create a new field with minimal required flags
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// Set nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set default value
    pub fn default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set primary key flag. A primary key is implicitly non-nullable and
    /// unique.
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.primary_key = pk;
        if pk {
            self.nullable = false;
            self.unique = true;
        }
        self
    }

    /// Check nullability and type of a resolved value, widening integers into
    /// real fields. Returns the value as it should be stored.
    pub(crate) fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (self.field_type, value) {
            (FieldType::Real, Value::Integer(i)) => Ok(Value::Real(i as f64)),
            (ty, v) if ty.accepts(&v) => Ok(v),
            (ty, v) => Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: ty.to_string(),
                actual: v.type_name().to_string(),
            }),
        }
    }
}

/// Table schema: an ordered set of fields with name lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    fields: IndexMap<String, Field>,
}

impl Schema {
    /// Build a schema from an ordered list of fields.
    ///
    /// Fails when a field name repeats, when more than one field claims the
    /// primary key, when a default value does not inhabit its field's type,
    /// or when a primary-key field carries a default (the id counter fills
    /// absent primary keys, so a default there could never apply).
    pub fn from_fields(fields: Vec<Field>) -> Result<Self> {
        let mut map = IndexMap::with_capacity(fields.len());
        let mut primary: Option<String> = None;

        for field in fields {
            if map.contains_key(&field.name) {
                return Err(Error::DuplicateField(field.name));
            }
            if field.primary_key {
                if let Some(first) = &primary {
                    return Err(Error::MultiplePrimaryKeys(first.clone(), field.name));
                }
                if field.default.is_some() {
                    return Err(Error::DefaultOnPrimaryKey(field.name));
                }
                primary = Some(field.name.clone());
            }
            if let Some(default) = &field.default {
                if default.is_null() {
                    if !field.nullable {
                        return Err(Error::InvalidDefault {
                            field: field.name,
                            expected: field.field_type.to_string(),
                        });
                    }
                } else if !field.field_type.accepts(default) {
                    return Err(Error::InvalidDefault {
                        field: field.name,
                        expected: field.field_type.to_string(),
                    });
                }
            }
            map.insert(field.name.clone(), field);
        }

        Ok(Self { fields: map })
    }

    /// Get field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Check if a field exists
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// The primary-key field, if the schema declares one
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.values().find(|f| f.primary_key)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|n| n.as_str()).collect()
    }
}
