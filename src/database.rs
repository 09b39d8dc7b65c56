//! Database registry for ShelfDB
//!
//! A database owns named tables and orchestrates persistence across them:
//! CRUD requests route through it so every mutation lands in the WAL, and
//! save/load/checkpoint/export fan out to the storage engine.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{Field, Schema};
use crate::storage::{DiskStats, StorageEngine, WalEntry, WalOp, WalReplay};
use crate::table::{Query, Table, UpdateReport};

/// Configuration for opening a database. Persistence is opt-in; every table
/// registration names an explicit database instance, there is no implicit
/// process-wide default.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    name: String,
    base_path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Configure an in-memory database with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_path: None,
        }
    }

    /// Enable persistence under `<base_path>/<name>/`
    pub fn persist_to(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Open the database described by this configuration
    pub fn open(self) -> Database {
        let storage = self
            .base_path
            .map(|path| StorageEngine::new(self.name.clone(), path));
        Database {
            name: self.name,
            tables: IndexMap::new(),
            storage,
        }
    }
}

/// In-memory counts for one registered table
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub records: usize,
    pub schema_fields: usize,
}

/// Snapshot of database statistics: in-memory counts per table, plus on-disk
/// sizes when persistence is enabled
#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    pub name: String,
    pub persistent: bool,
    pub tables: IndexMap<String, TableStats>,
    pub disk: Option<DiskStats>,
}

/// Registry mapping table name to table, with optional persistence
#[derive(Debug)]
pub struct Database {
    name: String,
    tables: IndexMap<String, Table>,
    storage: Option<StorageEngine>,
}

impl Database {
    /// Open a database that lives only in memory
    pub fn in_memory(name: impl Into<String>) -> Self {
        DatabaseConfig::new(name).open()
    }

    /// Open a database persisted under `<base_path>/<name>/`
    pub fn persistent(name: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        DatabaseConfig::new(name).persist_to(base_path).open()
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this database writes through to disk
    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Add a table to the registry. With persistence enabled, the schema file
    /// is written immediately and a `CREATE_TABLE` entry logged.
    pub fn register(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(Error::TableAlreadyExists(table.name().to_string()));
        }
        if let Some(storage) = &mut self.storage {
            storage.write_schema(table.name(), table.schema())?;
            storage.append_wal(&WalEntry::new(WalOp::CreateTable, table.name()))?;
        }
        info!(db = %self.name, table = table.name(), "table registered");
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Build a schema from ordered field descriptors and register a new empty
    /// table under it
    pub fn create_table(&mut self, name: &str, fields: Vec<Field>) -> Result<()> {
        let schema = Schema::from_fields(fields)?;
        self.register(Table::new(name, schema))
    }

    /// Get a registered table by name
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// List all registered table names
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Remove a table from the registry and, with persistence, its files
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if self.tables.shift_remove(name).is_none() {
            return Err(Error::TableNotFound(name.to_string()));
        }
        if let Some(storage) = &mut self.storage {
            storage.drop_table(name)?;
        }
        Ok(())
    }

    /// Insert a record into a named table. The stored record (with filled
    /// defaults and primary key) is logged and returned.
    pub fn insert(&mut self, table: &str, values: Record) -> Result<Record> {
        let record = self.table_mut(table)?.insert(values)?;
        if let Some(storage) = &mut self.storage {
            storage.append_wal(&WalEntry::new(WalOp::Insert, table).with_record(record.clone()))?;
        }
        Ok(record)
    }

    /// Query a named table
    pub fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>> {
        self.table(table)?.select(query)
    }

    /// Number of records in a named table
    pub fn count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.count())
    }

    /// Update matching records in a named table; one `UPDATE` entry is logged
    /// per applied record, carrying both images
    pub fn update<F>(&mut self, table: &str, predicate: F, changes: &Record) -> Result<UpdateReport>
    where
        F: Fn(&Record) -> bool,
    {
        let report = self.table_mut(table)?.update(predicate, changes)?;
        if let Some(storage) = &mut self.storage {
            for change in &report.changes {
                storage.append_wal(
                    &WalEntry::new(WalOp::Update, table)
                        .with_record(change.after.clone())
                        .with_old_record(change.before.clone()),
                )?;
            }
        }
        Ok(report)
    }

    /// Delete matching records from a named table; one `DELETE` entry is
    /// logged per removed record. Returns the number removed.
    pub fn delete<F>(&mut self, table: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&Record) -> bool,
    {
        let removed = self.table_mut(table)?.delete(predicate);
        if let Some(storage) = &mut self.storage {
            for record in &removed {
                storage
                    .append_wal(&WalEntry::new(WalOp::Delete, table).with_old_record(record.clone()))?;
            }
        }
        Ok(removed.len())
    }

    fn storage(&self) -> Result<&StorageEngine> {
        self.storage
            .as_ref()
            .ok_or_else(|| Error::PersistenceDisabled(self.name.clone()))
    }

    fn storage_mut(&mut self) -> Result<&mut StorageEngine> {
        self.storage
            .as_mut()
            .ok_or_else(|| Error::PersistenceDisabled(self.name.clone()))
    }

    /// Materialize every table's record file. The WAL is untouched. Returns
    /// the number of tables written.
    pub fn save(&self) -> Result<usize> {
        let storage = self.storage()?;
        for table in self.tables.values() {
            storage.write_records(table.name(), table.records())?;
        }
        info!(db = %self.name, tables = self.tables.len(), "database saved");
        Ok(self.tables.len())
    }

    /// Replace the registry with the tables persisted on disk. Each table's
    /// id counter resumes past its highest stored primary key.
    pub fn load(&mut self) -> Result<usize> {
        let loaded = self.storage()?.load()?;
        let mut tables = IndexMap::with_capacity(loaded.len());
        for (name, schema, records) in loaded {
            tables.insert(name.clone(), Table::from_saved(name, schema, records));
        }
        self.tables = tables;
        info!(db = %self.name, tables = self.tables.len(), "database loaded");
        Ok(self.tables.len())
    }

    /// Save every table, then archive the current WAL segment and start a
    /// fresh one. Saving first means the archived segment never holds the
    /// only copy of an operation.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.save()?;
        self.storage_mut()?.checkpoint()
    }

    /// Read back the current WAL segment for recovery diagnostics
    pub fn replay_wal(&self) -> Result<WalReplay> {
        self.storage()?.replay_wal()
    }

    /// Export a table's in-memory record set as a single JSON document
    pub fn export_table(&self, table: &str, path: impl AsRef<Path>) -> Result<()> {
        let records = self.table(table)?.records();
        self.storage()?.export_table(table, records, path)
    }

    /// In-memory counts per table, plus on-disk sizes when persistence is
    /// enabled
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let mut tables = IndexMap::with_capacity(self.tables.len());
        for table in self.tables.values() {
            tables.insert(
                table.name().to_string(),
                TableStats {
                    records: table.count(),
                    schema_fields: table.schema().field_count(),
                },
            );
        }
        let disk = match &self.storage {
            Some(storage) => Some(storage.stats()?),
            None => None,
        };
        Ok(DatabaseStats {
            name: self.name.clone(),
            persistent: self.storage.is_some(),
            tables,
            disk,
        })
    }
}
