// 📒 Ledger Writer
// Aggregates approved weighings into monthly partitions.
//
// Store layout (one SQLite file, one table per month):
//
//   "March-2025"
//   DATE       | NAME | ID  | PET  | CARDBOARD | TOTAL
//   01/03/2025 | ACME | 900 | 15.8 | 0.0       | 15.8
//
// - One row per (DATE, NAME); later weighings add to the same row
// - A material seen for the first time becomes a new column right before TOTAL
// - Every successful record is also appended to the "_journal" table
//
// A record call loads the partition, changes it in memory and writes the
// whole partition back inside one SQLite transaction. Any error rolls the
// transaction back, so a failed call can be retried as-is.

use crate::error::LedgerError;
use crate::events::SessionEvents;
use chrono::{Month, Utc};
use log::{error, info, warn};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DATE_COLUMN: &str = "DATE";
pub const NAME_COLUMN: &str = "NAME";
pub const ID_COLUMN: &str = "ID";
pub const TOTAL_COLUMN: &str = "TOTAL";

/// Columns every partition starts with, in order
pub const LEADING_COLUMNS: [&str; 4] = [DATE_COLUMN, NAME_COLUMN, ID_COLUMN, TOTAL_COLUMN];

/// Partition used when the period is not a D/M/Y date
pub const FALLBACK_PARTITION: &str = "General_Logs";

const JOURNAL_TABLE: &str = "_journal";

// ============================================================================
// TRANSACTION
// ============================================================================

/// Transaction - one approved weighing, ready to be recorded
///
/// `net_weight` is computed by whoever builds the transaction; the ledger
/// adds it as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Device date string (D/M/Y), also the row key
    pub period: String,
    pub party_name: String,
    pub party_id: String,
    pub category: String,
    pub material_name: String,
    pub packaging_tare: f64,
    pub gross_weight: f64,
    pub net_weight: f64,
}

impl Transaction {
    /// Zero or negative net weight: the collaborator should ask before saving
    pub fn needs_confirmation(&self) -> bool {
        self.net_weight <= 0.0
    }
}

/// Partition name for a period: "01/03/2025" → "March-2025"
///
/// Anything that is not three '/'-separated parts with a month in 1..=12
/// goes to `FALLBACK_PARTITION`. The year part is kept verbatim.
pub fn partition_name(period: &str) -> String {
    let parts: Vec<&str> = period.split('/').collect();

    if let [_day, month, year] = parts.as_slice() {
        let month = month
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(|m| Month::try_from(m).ok());
        if let Some(month) = month {
            return format!("{}-{}", month.name(), year.trim());
        }
    }

    warn!(
        "cannot derive a month from period {:?}, using '{}'",
        period, FALLBACK_PARTITION
    );
    FALLBACK_PARTITION.to_string()
}

// ============================================================================
// IN-MEMORY PARTITION
// ============================================================================

/// Cell - one spreadsheet-style value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Numeric value; empty (and non-numeric) cells count as 0.0
    pub fn as_number(&self) -> f64 {
        match self {
            Cell::Empty => 0.0,
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null | ValueRef::Blob(_) => Cell::Empty,
            ValueRef::Integer(i) => Cell::Number(i as f64),
            ValueRef::Real(f) => Cell::Number(f),
            ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Empty => ToSqlOutput::Owned(Value::Null),
            Cell::Text(s) => ToSqlOutput::from(s.as_str()),
            Cell::Number(n) => ToSqlOutput::from(*n),
        })
    }
}

/// What applying a transaction changed in a partition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Applied {
    pub row_created: bool,
    pub columns_added: Vec<String>,
}

/// LedgerPartition - ordered columns plus rows of cells
///
/// Every row is exactly `columns.len()` cells wide; inserting a column
/// inserts a cell at the same position in every row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPartition {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl LedgerPartition {
    /// Fresh partition with the leading columns and no rows
    pub fn new(name: &str) -> Self {
        LedgerPartition {
            name: name.to_string(),
            columns: LEADING_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Column position. Exact match first, then case-insensitive: the store
    /// treats "PET" and "pet" as the same column name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Row for (date, party), compared exactly as stored
    pub fn find_row(&self, date: &str, party: &str) -> Option<&[Cell]> {
        self.find_row_index(date, party).map(|i| self.rows[i].as_slice())
    }

    /// Accumulated value of `column` in the (date, party) row
    pub fn amount(&self, date: &str, party: &str, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.find_row(date, party)
            .and_then(|row| row.get(col))
            .map(Cell::as_number)
    }

    /// Add a transaction: evolve the schema, find or create the row, add
    /// the net weight to the material column and to TOTAL.
    pub fn apply(&mut self, tx: &Transaction) -> Result<Applied, LedgerError> {
        check_material_name(&tx.material_name)?;

        let mut applied = Applied::default();
        for column in [
            DATE_COLUMN,
            NAME_COLUMN,
            ID_COLUMN,
            tx.material_name.as_str(),
            TOTAL_COLUMN,
        ] {
            if self.ensure_column(column) {
                applied.columns_added.push(column.to_string());
            }
        }

        if let Some(existing) = self.column_index(&tx.material_name) {
            if self.columns[existing] != tx.material_name {
                warn!(
                    "material '{}' recorded under existing column '{}' in {}",
                    tx.material_name, self.columns[existing], self.name
                );
            }
        }

        // Positions are looked up after all insertions so none of them is stale.
        let index = |name: &str| self.column_index(name).unwrap_or_default();
        let (date_idx, name_idx, id_idx) = (index(DATE_COLUMN), index(NAME_COLUMN), index(ID_COLUMN));
        let (material_idx, total_idx) = (index(&tx.material_name), index(TOTAL_COLUMN));

        let row_idx = match self.find_row_index(&tx.period, &tx.party_name) {
            Some(i) => i,
            None => {
                let mut row = vec![Cell::Number(0.0); self.columns.len()];
                row[date_idx] = Cell::Text(tx.period.clone());
                row[name_idx] = Cell::Text(tx.party_name.clone());
                row[id_idx] = Cell::Text(tx.party_id.clone());
                self.rows.push(row);
                applied.row_created = true;
                self.rows.len() - 1
            }
        };

        let row = &mut self.rows[row_idx];
        for col in [material_idx, total_idx] {
            row[col] = Cell::Number(row[col].as_number() + tx.net_weight);
        }

        Ok(applied)
    }

    /// Make sure `name` is a column. Returns true if it had to be added.
    ///
    /// New columns go right before TOTAL; TOTAL itself is appended at the
    /// end if it is missing.
    fn ensure_column(&mut self, name: &str) -> bool {
        if self.column_index(name).is_some() {
            return false;
        }

        if name == TOTAL_COLUMN {
            self.insert_column(self.columns.len(), name);
            return true;
        }

        let total_idx = match self.column_index(TOTAL_COLUMN) {
            Some(i) => i,
            None => {
                self.insert_column(self.columns.len(), TOTAL_COLUMN);
                self.columns.len() - 1
            }
        };
        self.insert_column(total_idx, name);
        true
    }

    fn insert_column(&mut self, at: usize, name: &str) {
        self.columns.insert(at, name.to_string());
        for row in &mut self.rows {
            row.insert(at, Cell::Empty);
        }
    }

    fn find_row_index(&self, date: &str, party: &str) -> Option<usize> {
        let date_idx = self.column_index(DATE_COLUMN)?;
        let name_idx = self.column_index(NAME_COLUMN)?;

        self.rows.iter().position(|row| {
            row.get(date_idx).and_then(Cell::as_text) == Some(date)
                && row.get(name_idx).and_then(Cell::as_text) == Some(party)
        })
    }
}

/// Materials become columns, so they cannot be blank or shadow a fixed column
fn check_material_name(material: &str) -> Result<(), LedgerError> {
    let conflict = |reason: &str| LedgerError::SchemaConflict {
        material: material.to_string(),
        reason: reason.to_string(),
    };

    if material.trim().is_empty() {
        return Err(conflict("material name is blank"));
    }
    if LEADING_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(material)) {
        return Err(conflict("name is reserved for a fixed column"));
    }
    Ok(())
}

// ============================================================================
// STORE
// ============================================================================

/// Outcome of a successful `LedgerWriter::record`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub partition: String,
    pub row_created: bool,
    pub columns_added: Vec<String>,
}

/// LedgerWriter - records transactions into the ledger store file
///
/// Holds only the path: every call opens the store, so nothing survives
/// between calls except what was committed.
#[derive(Debug, Clone)]
pub struct LedgerWriter {
    path: PathBuf,
}

impl LedgerWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LedgerWriter { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one transaction (open → evolve → resolve → accumulate → save)
    pub fn record(&self, tx: &Transaction) -> Result<RecordOutcome, LedgerError> {
        let partition_name = partition_name(&tx.period);
        check_material_name(&tx.material_name)?;

        let mut conn = self.open()?;
        let save_err = |source| LedgerError::SaveFailed {
            partition: partition_name.clone(),
            source,
        };

        let db_tx = conn.transaction().map_err(save_err)?;

        let stored = read_partition(&db_tx, &partition_name).map_err(save_err)?;
        let is_new = stored.is_none();
        let mut partition = stored.unwrap_or_else(|| {
            info!("creating ledger partition '{}'", partition_name);
            LedgerPartition::new(&partition_name)
        });
        if partition.name != partition_name {
            warn!(
                "period '{}' maps to '{}', recording into existing partition '{}'",
                tx.period, partition_name, partition.name
            );
        }

        let applied = partition.apply(tx)?;
        let recreate = is_new || !applied.columns_added.is_empty();

        write_partition(&db_tx, &partition, recreate).map_err(save_err)?;
        append_journal(&db_tx, &partition.name, tx).map_err(save_err)?;
        db_tx.commit().map_err(save_err)?;

        info!(
            "recorded {:.2} kg of {} for {} on {} in '{}'",
            tx.net_weight, tx.material_name, tx.party_name, tx.period, partition.name
        );

        Ok(RecordOutcome {
            partition: partition.name,
            row_created: applied.row_created,
            columns_added: applied.columns_added,
        })
    }

    /// Read a partition back, `None` if it was never created.
    /// Names match the way the store matches them, ignoring ASCII case.
    pub fn load_partition(&self, name: &str) -> Result<Option<LedgerPartition>, LedgerError> {
        let conn = self.open()?;
        read_partition(&conn, name).map_err(|source| LedgerError::SaveFailed {
            partition: name.to_string(),
            source,
        })
    }

    /// Number of journal entries (one per successful record)
    pub fn journal_len(&self) -> Result<i64, LedgerError> {
        let conn = self.open()?;
        let count = || -> rusqlite::Result<i64> {
            // The journal table only exists after the first record.
            if !table_exists(&conn, JOURNAL_TABLE)? {
                return Ok(0);
            }
            conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(JOURNAL_TABLE)),
                [],
                |row| row.get(0),
            )
        };

        count().map_err(|source| LedgerError::SaveFailed {
            partition: JOURNAL_TABLE.to_string(),
            source,
        })
    }

    fn open(&self) -> Result<Connection, LedgerError> {
        let open_err = |source| LedgerError::StoreOpenFailed {
            path: self.path.clone(),
            source,
        };

        let conn = Connection::open(&self.path).map_err(open_err)?;
        // WAL keeps the file consistent if the process dies mid-write
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(open_err)?;

        Ok(conn)
    }
}

/// Record, and tell the collaborator if it failed. The error is still returned.
pub fn record_and_notify(
    writer: &LedgerWriter,
    tx: &Transaction,
    events: &dyn SessionEvents,
) -> Result<RecordOutcome, LedgerError> {
    writer.record(tx).inspect_err(|err| {
        error!("{}", err);
        events.on_save_error(err);
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(name: &str) -> &'static str {
    match name {
        DATE_COLUMN | NAME_COLUMN | ID_COLUMN => "TEXT",
        _ => "REAL",
    }
}

/// Name of the table `name` refers to, as it was created. Table names are
/// case-insensitive, so "March-2025a" finds "March-2025A".
fn stored_table_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        [name],
        |row| row.get(0),
    )
    .optional()
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    Ok(stored_table_name(conn, name)?.is_some())
}

/// Load a partition under its stored name
fn read_partition(conn: &Connection, name: &str) -> rusqlite::Result<Option<LedgerPartition>> {
    let Some(name) = stored_table_name(conn, name)? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(&name)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(Cell::from))
                .collect::<rusqlite::Result<Vec<Cell>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(LedgerPartition {
        name,
        columns,
        rows,
    }))
}

/// Write every row of the partition. With `recreate` the table is rebuilt
/// with the partition's column order first.
fn write_partition(conn: &Connection, partition: &LedgerPartition, recreate: bool) -> rusqlite::Result<()> {
    let table = quote_ident(&partition.name);

    if recreate {
        let definitions: Vec<String> = partition
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c), column_type(c)))
            .collect();
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        conn.execute(
            &format!("CREATE TABLE {} ({})", table, definitions.join(", ")),
            [],
        )?;
    } else {
        conn.execute(&format!("DELETE FROM {}", table), [])?;
    }

    let placeholders: Vec<String> = (1..=partition.columns.len())
        .map(|i| format!("?{}", i))
        .collect();
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {} VALUES ({})",
        table,
        placeholders.join(", ")
    ))?;
    for row in &partition.rows {
        insert.execute(rusqlite::params_from_iter(row.iter()))?;
    }

    Ok(())
}

fn append_journal(conn: &Connection, partition: &str, tx: &Transaction) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id TEXT UNIQUE NOT NULL,
                recorded_at TEXT NOT NULL,
                partition TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
            quote_ident(JOURNAL_TABLE)
        ),
        [],
    )?;

    let payload = serde_json::to_string(tx)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        &format!(
            "INSERT INTO {} (entry_id, recorded_at, partition, payload) VALUES (?1, ?2, ?3, ?4)",
            quote_ident(JOURNAL_TABLE)
        ),
        params![
            uuid::Uuid::new_v4().to_string(),
            Utc::now().to_rfc3339(),
            partition,
            payload,
        ],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
