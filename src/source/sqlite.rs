//! SQLite Archive Source
//!
//! Reads samples from an archive database laid out as a channel directory
//! plus one sample table per channel:
//!
//! ```text
//! channels(chan_id INTEGER, name TEXT, type INTEGER, size INTEGER,
//!          active INTEGER, host TEXT)
//! table_<chan_id>(time INTEGER, val1 REAL)
//! ```
//!
//! Channel descriptors are looked up once per name and remembered for the
//! lifetime of the source.
//!
//! An archive may be split in two databases at a cutover tick: windows that
//! start before the cutover are read entirely from the history database.

use super::{FetchError, FetchResult, Sample, SampleSource};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

/// Directory entry of an archived channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDescriptor {
    /// Channel id, selects the `table_<chan_id>` sample table
    pub chan_id: i64,
    /// Channel name as used in queries
    pub name: String,
    /// Archive data type code
    pub data_type: Option<i64>,
    /// Element count
    pub size: Option<i64>,
    /// Whether the channel is still archived
    pub active: Option<bool>,
    /// Host the channel is served from
    pub host: Option<String>,
}

impl ChannelDescriptor {
    /// Name of the table holding this channel's samples
    pub fn table(&self) -> String {
        format!("table_{}", self.chan_id)
    }
}

/// Sample source reading a SQLite archive database
pub struct SqliteSource {
    conn: Connection,
    descriptors: RefCell<HashMap<String, ChannelDescriptor>>,
    history: Option<(i64, Box<SqliteSource>)>,
}

impl SqliteSource {
    /// Open an archive database read-only
    pub fn open(path: &Path) -> FetchResult<Self> {
        if !path.exists() {
            return Err(FetchError::Unavailable(format!(
                "archive database {} does not exist",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        tracing::info!(path = %path.display(), "Opened archive database");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already open connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            descriptors: RefCell::new(HashMap::new()),
            history: None,
        }
    }

    /// Serve windows starting before `cutover` from `history`
    pub fn with_history(mut self, history: SqliteSource, cutover: i64) -> Self {
        tracing::info!(cutover, "Using history archive for earlier windows");
        self.history = Some((cutover, Box::new(history)));
        self
    }

    /// Database that holds the window starting at `t0`
    fn archive_for(&self, t0: i64) -> &SqliteSource {
        match &self.history {
            Some((cutover, history)) if t0 < *cutover => history.archive_for(t0),
            _ => self,
        }
    }

    /// Look up the directory entry of a channel
    pub fn lookup(&self, name: &str) -> FetchResult<ChannelDescriptor> {
        if let Some(descriptor) = self.descriptors.borrow().get(name) {
            return Ok(descriptor.clone());
        }

        let descriptor = self
            .conn
            .query_row(
                "SELECT chan_id, name, \"type\", size, active, host
                 FROM channels WHERE name = ?1",
                params![name],
                |row| {
                    Ok(ChannelDescriptor {
                        chan_id: row.get(0)?,
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                        size: row.get(3)?,
                        active: row.get(4)?,
                        host: row.get(5)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| FetchError::VariableNotFound(name.to_string()))?;

        tracing::debug!(name, chan_id = descriptor.chan_id, "Resolved channel");
        self.descriptors
            .borrow_mut()
            .insert(name.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    /// All channel names in the directory, sorted
    pub fn channels(&self) -> FetchResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM channels ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

impl SampleSource for SqliteSource {
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>> {
        let archive = self.archive_for(t0);
        if !std::ptr::eq(archive, self) {
            tracing::debug!(name, t0, "Reading from history archive");
        }
        let table = archive.lookup(name)?.table();

        let anchor = archive
            .conn
            .query_row(
                &format!(
                    "SELECT time, val1 FROM {table}
                     WHERE time <= ?1 ORDER BY time DESC, rowid DESC LIMIT 1"
                ),
                params![t0],
                |row| Ok(Sample::new(row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if anchor.is_none() {
            tracing::debug!(name, t0, "No sample at or before window start");
        }

        let mut stmt = archive.conn.prepare_cached(&format!(
            "SELECT time, val1 FROM {table}
             WHERE time > ?1 AND time < ?2 ORDER BY time, rowid"
        ))?;
        let rows = stmt.query_map(params![t0, t1], |row| {
            Ok(Sample::new(row.get(0)?, row.get(1)?))
        })?;

        let mut samples: Vec<Sample> = anchor.into_iter().collect();
        for sample in rows {
            samples.push(sample?);
        }

        tracing::debug!(name, t0, t1, count = samples.len(), "Fetched samples");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNELS: &str = "
        CREATE TABLE channels (
            chan_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            type INTEGER,
            size INTEGER,
            active INTEGER,
            host TEXT
        );";

    fn archive() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CHANNELS).unwrap();
        conn.execute_batch(
            "
            INSERT INTO channels VALUES (1, 'A', 6, 1, 1, 'ioc1');
            INSERT INTO channels VALUES (2, 'B', NULL, NULL, NULL, NULL);
            CREATE TABLE table_1 (time INTEGER, val1 REAL);
            INSERT INTO table_1 VALUES (0, 5.0), (10, 15.0), (20, 8.0);
            CREATE TABLE table_2 (time INTEGER, val1 REAL);
            INSERT INTO table_2 VALUES (15, 6.0), (0, 2.0);
            ",
        )
        .unwrap();
        SqliteSource::from_connection(conn)
    }

    #[test]
    fn test_lookup() {
        let source = archive();
        let descriptor = source.lookup("A").unwrap();
        assert_eq!(descriptor.chan_id, 1);
        assert_eq!(descriptor.table(), "table_1");
        assert_eq!(descriptor.active, Some(true));
        assert_eq!(descriptor.host.as_deref(), Some("ioc1"));

        let descriptor = source.lookup("B").unwrap();
        assert_eq!(descriptor.data_type, None);
    }

    #[test]
    fn test_lookup_missing() {
        let source = archive();
        assert!(matches!(
            source.lookup("C"),
            Err(FetchError::VariableNotFound(name)) if name == "C"
        ));
        assert!(matches!(
            source.fetch("C", 0, 10),
            Err(FetchError::VariableNotFound(_))
        ));
    }

    #[test]
    fn test_fetch_with_anchor() {
        let source = archive();
        let samples = source.fetch("A", 12, 30).unwrap();
        assert_eq!(samples, vec![Sample::new(10, 15.0), Sample::new(20, 8.0)]);

        let samples = source.fetch("A", 10, 20).unwrap();
        assert_eq!(samples, vec![Sample::new(10, 15.0)]);

        let samples = source.fetch("B", 0, 30).unwrap();
        assert_eq!(samples, vec![Sample::new(0, 2.0), Sample::new(15, 6.0)]);
    }

    #[test]
    fn test_fetch_before_first_sample() {
        let source = archive();
        let samples = source.fetch("A", -10, 5).unwrap();
        assert_eq!(samples, vec![Sample::new(0, 5.0)]);
    }

    #[test]
    fn test_channels() {
        let source = archive();
        assert_eq!(source.channels().unwrap(), vec!["A", "B"]);
    }

    fn history() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CHANNELS).unwrap();
        conn.execute_batch(
            "
            INSERT INTO channels VALUES (7, 'A', 6, 1, 0, 'old-ioc');
            CREATE TABLE table_7 (time INTEGER, val1 REAL);
            INSERT INTO table_7 VALUES (-20, 1.0), (-10, 2.0), (5, 3.0);
            ",
        )
        .unwrap();
        SqliteSource::from_connection(conn)
    }

    #[test]
    fn test_history_before_cutover() {
        let source = archive().with_history(history(), 0);

        // The whole window comes from the history database
        let samples = source.fetch("A", -15, 10).unwrap();
        assert_eq!(
            samples,
            vec![Sample::new(-20, 1.0), Sample::new(-10, 2.0), Sample::new(5, 3.0)]
        );

        let samples = source.fetch("A", 0, 15).unwrap();
        assert_eq!(samples, vec![Sample::new(0, 5.0), Sample::new(10, 15.0)]);

        // Channels missing from the history database are not found there
        assert!(matches!(
            source.fetch("B", -5, 5),
            Err(FetchError::VariableNotFound(name)) if name == "B"
        ));
        assert_eq!(source.fetch("B", 0, 5).unwrap(), vec![Sample::new(0, 2.0)]);
    }

    #[test]
    fn test_open_missing_database() {
        let result = SqliteSource::open(Path::new("/nonexistent/archive.db"));
        assert!(matches!(result, Err(FetchError::Unavailable(_))));
    }
}
