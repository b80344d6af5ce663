//! Read-only access to the relational metadata store.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};

use crate::error::MetadataError;
use crate::models::{MetadataConfig, MetadataRecord};

/// Anything that can hand the pipeline its full record set.
pub trait RecordSource: Send + Sync {
    /// Load records in table order, at most `limit` when given.
    fn load(&self, limit: Option<usize>) -> Result<Vec<MetadataRecord>, MetadataError>;
}

/// A flat table of text columns in a SQLite database, one row per study.
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    path: PathBuf,
    table: String,
}

impl SqliteMetadataStore {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Result<Self, MetadataError> {
        let table = table.into();
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(MetadataError::InvalidTable(table));
        }

        Ok(Self {
            path: path.into(),
            table,
        })
    }

    pub fn from_config(config: &MetadataConfig) -> Result<Self, MetadataError> {
        Self::new(config.db_path.clone(), config.table.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn open(&self) -> Result<Connection, MetadataError> {
        if !self.path.exists() {
            return Err(MetadataError::NotFound(self.path.clone()));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Column names in table order.
    pub fn columns(&self) -> Result<Vec<String>, MetadataError> {
        let conn = self.open()?;
        let stmt = conn.prepare(&format!("SELECT * FROM \"{}\" LIMIT 0", self.table))?;
        Ok(stmt.column_names().into_iter().map(String::from).collect())
    }

    pub fn count(&self) -> Result<u64, MetadataError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl RecordSource for SqliteMetadataStore {
    fn load(&self, limit: Option<usize>) -> Result<Vec<MetadataRecord>, MetadataError> {
        let conn = self.open()?;
        let sql = match limit {
            Some(_) => format!("SELECT * FROM \"{}\" LIMIT ?1", self.table),
            None => format!("SELECT * FROM \"{}\"", self.table),
        };

        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        if columns.is_empty() {
            return Err(MetadataError::NoColumns(self.table.clone()));
        }

        let mut rows = match limit {
            Some(n) => stmt.query(params![n as i64])?,
            None => stmt.query([])?,
        };

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = MetadataRecord::new();
            for (i, name) in columns.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => String::new(),
                    ValueRef::Integer(n) => n.to_string(),
                    ValueRef::Real(f) => f.to_string(),
                    ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                    ValueRef::Blob(_) => continue,
                };
                record.push(name.clone(), value);
            }
            records.push(record);
        }

        Ok(records)
    }
}
