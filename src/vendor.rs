//! Persistent OUI vendor directory backed by SQLite.
//!
//! The directory maps a lowercase `xx:xx:xx` prefix to an organization name.
//! It has two modes that never run in the same process:
//!
//! - [`VendorDirectoryBuilder`] loads registry entries in batched
//!   transactions. Each batch commits or rolls back as a whole.
//! - [`VendorDirectory`] opens the database read-only for point lookups. A
//!   database that was never built answers [`UNKNOWN_ORGANIZATION`] for
//!   every prefix.
//!
//! SQLite's file locking gives single-writer/multiple-reader isolation when a
//! build and a report do overlap.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::oui::{RegistryEntries, VendorEntry};

/// Organization reported for prefixes missing from the directory.
pub const UNKNOWN_ORGANIZATION: &str = "UNKNOWN";

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS oui (oui TEXT PRIMARY KEY, organization TEXT NOT NULL)";
const INSERT_ENTRY: &str = "INSERT OR REPLACE INTO oui (oui, organization) VALUES (?1, ?2)";
const SELECT_ORGANIZATION: &str = "SELECT organization FROM oui WHERE oui = ?1";
const TABLE_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'oui')";

/// Read-only view of the vendor directory.
#[derive(Debug)]
pub struct VendorDirectory {
    conn: Option<Connection>,
}

impl VendorDirectory {
    /// A directory with no entries.
    pub fn empty() -> Self {
        Self { conn: None }
    }

    /// Opens the database at `path` for lookups.
    ///
    /// A missing file or a database without the `oui` table is treated as an
    /// empty directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the file exists but cannot be opened
    /// as a SQLite database.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Vendor database {} not found, organizations will be {}",
                path.display(),
                UNKNOWN_ORGANIZATION
            );
            return Ok(Self::empty());
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let has_table: bool = conn.query_row(TABLE_EXISTS, [], |row| row.get(0))?;
        if !has_table {
            warn!("Vendor database {} has no oui table", path.display());
            return Ok(Self::empty());
        }

        debug!("Opened vendor database {}", path.display());
        Ok(Self { conn: Some(conn) })
    }

    /// Returns the organization registered for `prefix`, or
    /// [`UNKNOWN_ORGANIZATION`].
    pub fn lookup(&self, prefix: &str) -> Result<String> {
        let Some(conn) = &self.conn else {
            return Ok(UNKNOWN_ORGANIZATION.to_string());
        };

        let mut statement = conn.prepare_cached(SELECT_ORGANIZATION)?;
        let organization = statement
            .query_row(params![prefix], |row| row.get::<_, String>(0))
            .optional()?;

        Ok(organization.unwrap_or_else(|| UNKNOWN_ORGANIZATION.to_string()))
    }

    /// Number of prefixes in the directory.
    pub fn len(&self) -> Result<usize> {
        match &self.conn {
            Some(conn) => {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM oui", [], |row| row.get(0))?;
                Ok(count as usize)
            }
            None => Ok(0),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Counters for a directory build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Registry lines read.
    pub lines: usize,
    /// Entries written, duplicates included.
    pub entries: usize,
    /// Transactions committed.
    pub batches: usize,
}

impl BuildStats {
    /// Lines that were not registry assignments.
    pub fn skipped(&self) -> usize {
        self.lines - self.entries
    }
}

/// Writer that loads entries into the directory in fixed-size transactions.
#[derive(Debug)]
pub struct VendorDirectoryBuilder {
    conn: Connection,
    batch_size: usize,
    pending: Vec<VendorEntry>,
    stats: BuildStats,
}

impl VendorDirectoryBuilder {
    /// Opens or creates the database at `path` and ensures the table exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero batch size and
    /// [`Error::Database`] if the database cannot be opened or created.
    pub fn create<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLE)?;

        Ok(Self {
            conn,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            stats: BuildStats::default(),
        })
    }

    /// Queues an entry, committing a batch once `batch_size` entries are queued.
    pub fn insert(&mut self, entry: VendorEntry) -> Result<()> {
        self.pending.push(entry);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Loads every assignment from a registry reader.
    pub fn load<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut entries = RegistryEntries::new(reader);
        for entry in entries.by_ref() {
            self.insert(entry?)?;
        }
        self.stats.lines += entries.lines();
        Ok(())
    }

    /// Commits the final partial batch.
    pub fn finish(mut self) -> Result<BuildStats> {
        self.flush()?;
        Ok(self.stats)
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let transaction = self.conn.transaction()?;
        {
            let mut statement = transaction.prepare_cached(INSERT_ENTRY)?;
            for entry in &self.pending {
                statement.execute(params![entry.prefix, entry.organization])?;
            }
        }
        transaction.commit()?;

        self.stats.entries += self.pending.len();
        self.stats.batches += 1;
        debug!(
            "Committed batch {} ({} entries)",
            self.stats.batches,
            self.pending.len()
        );
        self.pending.clear();
        Ok(())
    }
}

/// Builds the vendor directory at `config.oui_database` from `config.oui_file`.
pub fn create_vendor_database(config: &Config) -> Result<BuildStats> {
    let path: &Path = &config.oui_file;
    info!("Reading {}", path.display());

    let file = File::open(path).map_err(|source| Error::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut builder = VendorDirectoryBuilder::create(&config.oui_database, config.batch_size)?;
    builder.load(BufReader::new(file))?;
    let stats = builder.finish()?;

    info!(
        "Read {} lines from {}, wrote {} entries in {} batches to {}",
        stats.lines,
        path.display(),
        stats.entries,
        stats.batches,
        config.oui_database.display()
    );

    Ok(stats)
}
