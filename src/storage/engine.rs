//! On-disk storage engine for ShelfDB
//!
//! Every persisted database occupies `<base_path>/<db_name>/` with three
//! subdirectories:
//!
//! - `schema/<table>.schema.json`: one JSON document per table schema
//! - `data/<table>.records`: newline-delimited JSON, one record per line
//! - `wal/transaction.log`: the current WAL segment, plus archived
//!   `transaction.<timestamp>.log` segments left behind by checkpoints
//!
//! The engine is stateless with respect to data: it holds only the database
//! path and an open handle to the current WAL segment. The handle is acquired
//! lazily on the first append and released by RAII.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::wal::{MalformedLine, WalEntry, WalOp, WalReplay};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{Field, FieldType, Schema};

/// Persisted schema document
#[derive(Debug, Serialize, Deserialize)]
struct SchemaFile {
    table_name: String,
    schema: IndexMap<String, FieldSpec>,
    created_at: DateTime<Utc>,
}

/// Per-field entry in a schema document. Defaults are not part of the file
/// format, so they exist only on schemas built in-process.
#[derive(Debug, Serialize, Deserialize)]
struct FieldSpec {
    #[serde(rename = "type")]
    field_type: FieldType,
    primary_key: bool,
    nullable: bool,
    unique: bool,
}

impl From<&Field> for FieldSpec {
    fn from(field: &Field) -> Self {
        Self {
            field_type: field.field_type,
            primary_key: field.primary_key,
            nullable: field.nullable,
            unique: field.unique,
        }
    }
}

impl FieldSpec {
    fn into_field(self, name: String) -> Field {
        Field {
            name,
            field_type: self.field_type,
            primary_key: self.primary_key,
            nullable: self.nullable,
            unique: self.unique,
            default: None,
        }
    }
}

/// Portability snapshot written by [`StorageEngine::export_table`]
#[derive(Debug, Serialize, Deserialize)]
struct ExportDocument {
    table: String,
    records: Vec<Record>,
    count: usize,
    exported_at: DateTime<Utc>,
}

/// On-disk sizes for one table
#[derive(Debug, Clone, Serialize)]
pub struct TableDiskStats {
    /// Lines in the records file
    pub records: usize,
    /// Records file size
    pub size_bytes: u64,
}

/// On-disk statistics for a whole database directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiskStats {
    pub tables: IndexMap<String, TableDiskStats>,
    pub total_size_bytes: u64,
    pub wal_size_bytes: u64,
    pub wal_entries: usize,
}

/// Translates table schemas and record sets to and from disk files, and
/// maintains the write-ahead log.
#[derive(Debug)]
pub struct StorageEngine {
    db_name: String,
    db_path: PathBuf,
    wal: Option<File>,
}

impl StorageEngine {
    /// Create an engine rooted at `<base_path>/<db_name>`. No directories are
    /// created until the first write, so a load from a never-written root can
    /// be detected.
    pub fn new(db_name: impl Into<String>, base_path: impl AsRef<Path>) -> Self {
        let db_name = db_name.into();
        let db_path = base_path.as_ref().join(&db_name);
        Self {
            db_name,
            db_path,
            wal: None,
        }
    }

    /// Name of the database this engine persists
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Root directory of the persisted database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn schema_dir(&self) -> PathBuf {
        self.db_path.join("schema")
    }

    fn data_dir(&self) -> PathBuf {
        self.db_path.join("data")
    }

    fn wal_dir(&self) -> PathBuf {
        self.db_path.join("wal")
    }

    fn schema_file(&self, table_name: &str) -> PathBuf {
        self.schema_dir().join(format!("{table_name}.schema.json"))
    }

    fn data_file(&self, table_name: &str) -> PathBuf {
        self.data_dir().join(format!("{table_name}.records"))
    }

    fn wal_file(&self) -> PathBuf {
        self.wal_dir().join("transaction.log")
    }

    fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.schema_dir())?;
        fs::create_dir_all(self.data_dir())?;
        fs::create_dir_all(self.wal_dir())?;
        Ok(())
    }

    /// Serialize and overwrite a table's schema file
    pub fn write_schema(&self, table_name: &str, schema: &Schema) -> Result<()> {
        self.ensure_layout()?;
        let document = SchemaFile {
            table_name: table_name.to_string(),
            schema: schema
                .fields()
                .map(|f| (f.name.clone(), FieldSpec::from(f)))
                .collect(),
            created_at: Utc::now(),
        };
        fs::write(
            self.schema_file(table_name),
            serde_json::to_string_pretty(&document)?,
        )?;
        debug!(table = table_name, "schema written");
        Ok(())
    }

    /// Serialize all records (one JSON line each) and overwrite the table's
    /// data file. Byte-identical output for an unchanged record set.
    pub fn write_records(&self, table_name: &str, records: &[Record]) -> Result<()> {
        self.ensure_layout()?;
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        fs::write(self.data_file(table_name), out)?;
        debug!(table = table_name, records = records.len(), "records rewritten");
        Ok(())
    }

    /// Read every record line of a table's data file. An absent file is an
    /// empty table, not an error.
    pub fn read_records(&self, table_name: &str) -> Result<Vec<Record>> {
        let path = self.data_file(table_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Append one record to the data file, WAL first. The append-optimized
    /// alternative to a full [`StorageEngine::write_records`] rewrite.
    pub fn append_record(&mut self, table_name: &str, record: &Record) -> Result<()> {
        self.append_wal(&WalEntry::new(WalOp::Insert, table_name).with_record(record.clone()))?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_file(table_name))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Append one entry to the current WAL segment and flush it. On failure
    /// the caller's in-memory mutation stands but is not durable.
    pub fn append_wal(&mut self, entry: &WalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let file = self.wal_handle()?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn wal_handle(&mut self) -> Result<&mut File> {
        if self.wal.is_none() {
            self.ensure_layout()?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.wal_file())?;
            self.wal = Some(file);
        }
        Ok(self.wal.as_mut().unwrap())
    }

    /// Read every line of the current WAL segment in file order. Lines that
    /// fail to parse are skipped and reported, never fatal.
    pub fn replay_wal(&self) -> Result<WalReplay> {
        let path = self.wal_file();
        if !path.exists() {
            return Ok(WalReplay::default());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut replay = WalReplay::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry>(&line) {
                Ok(entry) => replay.entries.push(entry),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "skipping malformed WAL line");
                    replay.malformed.push(MalformedLine {
                        line: index + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(replay)
    }

    /// Archive the current WAL segment under a timestamped name and open a
    /// fresh empty one. Callers must only checkpoint after confirming
    /// [`StorageEngine::write_records`] succeeded for every table, since the
    /// archived segment is no longer replayed.
    pub fn checkpoint(&mut self) -> Result<()> {
        // Drop the handle before renaming the segment under it.
        self.wal = None;

        let wal_file = self.wal_file();
        if wal_file.exists() {
            let archive = self
                .wal_dir()
                .join(format!("transaction.{}.log", Utc::now().format("%Y%m%d_%H%M%S")));
            fs::rename(&wal_file, &archive)?;
            info!(db = %self.db_name, archive = %archive.display(), "WAL segment archived");
        }
        self.ensure_layout()?;
        File::create(&wal_file)?;
        Ok(())
    }

    /// Discover every persisted table: schema plus records (absent data file
    /// means an empty record set). Fails when the storage root was never
    /// written.
    pub fn load(&self) -> Result<Vec<(String, Schema, Vec<Record>)>> {
        if !self.db_path.exists() {
            return Err(Error::StorageRootNotFound(
                self.db_path.display().to_string(),
            ));
        }

        let mut tables = Vec::new();
        for table_name in self.list_tables()? {
            let json = fs::read_to_string(self.schema_file(&table_name))?;
            let document: SchemaFile = serde_json::from_str(&json)?;
            let fields = document
                .schema
                .into_iter()
                .map(|(name, spec)| spec.into_field(name))
                .collect();
            let schema = Schema::from_fields(fields)?;
            let records = self.read_records(&document.table_name)?;
            debug!(table = %document.table_name, records = records.len(), "table loaded");
            tables.push((document.table_name, schema, records));
        }
        Ok(tables)
    }

    /// List persisted tables by scanning the schema directory
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let schema_dir = self.schema_dir();
        if !schema_dir.exists() {
            return Ok(Vec::new());
        }
        let mut tables = Vec::new();
        for entry in fs::read_dir(schema_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(table) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(".schema.json"))
            {
                tables.push(table.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Write `{table, records, count, exported_at}` as a single JSON document
    pub fn export_table(
        &self,
        table_name: &str,
        records: &[Record],
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let document = ExportDocument {
            table: table_name.to_string(),
            records: records.to_vec(),
            count: records.len(),
            exported_at: Utc::now(),
        };
        fs::write(path.as_ref(), serde_json::to_string_pretty(&document)?)?;
        info!(table = table_name, path = %path.as_ref().display(), "table exported");
        Ok(())
    }

    /// Read an export document and rewrite the table's records file from it.
    /// Returns the number of imported records.
    pub fn import_table(&self, table_name: &str, path: impl AsRef<Path>) -> Result<usize> {
        let json = fs::read_to_string(path)?;
        let document: ExportDocument = serde_json::from_str(&json)?;
        self.write_records(table_name, &document.records)?;
        Ok(document.records.len())
    }

    /// Rewrite a table's data file from its own contents. Useful after the
    /// append path has accumulated stale lines.
    pub fn compact(&self, table_name: &str) -> Result<()> {
        let records = self.read_records(table_name)?;
        self.write_records(table_name, &records)
    }

    /// Log the drop and remove the table's schema and data files
    pub fn drop_table(&mut self, table_name: &str) -> Result<()> {
        self.append_wal(&WalEntry::new(WalOp::DropTable, table_name))?;
        let schema = self.schema_file(table_name);
        if schema.exists() {
            fs::remove_file(schema)?;
        }
        let data = self.data_file(table_name);
        if data.exists() {
            fs::remove_file(data)?;
        }
        info!(table = table_name, "table files removed");
        Ok(())
    }

    /// On-disk byte sizes and line counts per table, plus WAL totals
    pub fn stats(&self) -> Result<DiskStats> {
        let mut stats = DiskStats::default();
        for table_name in self.list_tables()? {
            let data = self.data_file(&table_name);
            let (records, size_bytes) = if data.exists() {
                let size = fs::metadata(&data)?.len();
                let lines = BufReader::new(File::open(&data)?).lines().count();
                (lines, size)
            } else {
                (0, 0)
            };
            stats.total_size_bytes += size_bytes;
            stats.tables.insert(
                table_name,
                TableDiskStats {
                    records,
                    size_bytes,
                },
            );
        }

        let wal = self.wal_file();
        if wal.exists() {
            stats.wal_size_bytes = fs::metadata(&wal)?.len();
            stats.wal_entries = BufReader::new(File::open(&wal)?).lines().count();
        }
        Ok(stats)
    }
}
