//! Lazy result reader.
//!
//! A [`ResultSet`] borrows its connection mutably for as long as it lives, so
//! no other command can be issued through the same handle while rows are
//! pending. Rows are decoded one packet at a time.

use std::sync::Arc;

use mywire_core::{ColumnInfo, Result, Row};

use crate::connection::{MySqlConnection, ResultHead, RowPacket};
use crate::protocol::OkPacket;
use crate::types::{ColumnDef, Format, decode_binary_row, decode_text_row};

/// Summary of a statement that returned no rows, or of the last result of a
/// drained response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    /// Server info string, e.g. "Rows matched: 1  Changed: 1  Warnings: 0"
    pub info: String,
}

impl From<&OkPacket> for QueryOutcome {
    fn from(ok: &OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            info: ok.info.clone(),
        }
    }
}

/// A forward-only stream of rows for one command.
///
/// Iterating yields the rows of the current result set. Statements that
/// produce several result sets are walked with [`ResultSet::next_result`].
///
/// Dropping a `ResultSet` before it is exhausted leaves the connection busy;
/// the next command fails with an out-of-sequence error until
/// [`MySqlConnection::drain_pending`] is called.
pub struct ResultSet<'c> {
    conn: &'c mut MySqlConnection,
    format: Format,
    columns: Vec<ColumnDef>,
    column_info: Arc<ColumnInfo>,
    outcome: QueryOutcome,
    in_rows: bool,
}

impl<'c> ResultSet<'c> {
    /// Read the head of the first result.
    pub(crate) fn start(conn: &'c mut MySqlConnection, format: Format) -> Result<Self> {
        let mut result = Self {
            conn,
            format,
            columns: Vec::new(),
            column_info: Arc::new(ColumnInfo::new(Vec::new())),
            outcome: QueryOutcome::default(),
            in_rows: false,
        };
        result.read_head()?;
        Ok(result)
    }

    fn read_head(&mut self) -> Result<()> {
        match self.conn.read_result_head()? {
            ResultHead::Ok(ok) => {
                self.columns.clear();
                self.column_info = Arc::new(ColumnInfo::new(Vec::new()));
                self.outcome = QueryOutcome::from(&ok);
                self.in_rows = false;
            }
            ResultHead::Columns(columns) => {
                let names = columns.iter().map(|c| c.name.clone()).collect();
                self.column_info = Arc::new(ColumnInfo::new(names));
                self.columns = columns;
                self.outcome = QueryOutcome::default();
                self.in_rows = true;
            }
        }
        Ok(())
    }

    /// Column descriptors of the current result set. Empty for OK results.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column names shared by every row of the current result set.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.column_info)
    }

    /// Does the current result carry rows (as opposed to a bare OK)?
    pub fn has_rows(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn affected_rows(&self) -> u64 {
        self.outcome.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.outcome.last_insert_id
    }

    /// Warning count. For row results it is known once the rows are consumed.
    pub fn warnings(&self) -> u16 {
        self.outcome.warnings
    }

    pub fn info(&self) -> &str {
        &self.outcome.info
    }

    /// Summary of the current result.
    pub fn outcome(&self) -> &QueryOutcome {
        &self.outcome
    }

    /// Does another result set follow the current one?
    pub fn more_results(&self) -> bool {
        self.conn.has_pending_result()
    }

    /// Skip the rest of the current result set and advance to the next one.
    ///
    /// Returns `Ok(false)` when no further result set exists.
    pub fn next_result(&mut self) -> Result<bool> {
        for row in self.by_ref() {
            row?;
        }
        if !self.conn.has_pending_result() {
            return Ok(false);
        }
        self.read_head()?;
        Ok(true)
    }

    /// Consume every remaining row and result set, returning the summary of
    /// the last one.
    pub fn drain(&mut self) -> Result<QueryOutcome> {
        while self.next_result()? {}
        Ok(self.outcome.clone())
    }

    /// Collect the rows of the current result set, discarding any result
    /// sets that follow.
    pub fn collect_rows(mut self) -> Result<Vec<Row>> {
        let rows = self.by_ref().collect::<Result<Vec<_>>>()?;
        self.drain()?;
        Ok(rows)
    }

    /// Collect every result set. OK-only results contribute an empty set.
    pub fn collect_all(mut self) -> Result<Vec<Vec<Row>>> {
        let mut sets = Vec::new();
        loop {
            sets.push(self.by_ref().collect::<Result<Vec<_>>>()?);
            if !self.next_result()? {
                return Ok(sets);
            }
        }
    }

    fn decode(&mut self, payload: &[u8]) -> Result<Row> {
        let values = match self.format {
            Format::Text => decode_text_row(payload, &self.columns),
            Format::Binary => decode_binary_row(payload, &self.columns),
        };
        match values {
            Ok(values) => Ok(Row::with_columns(Arc::clone(&self.column_info), values)),
            Err(err) => {
                self.in_rows = false;
                Err(self.conn.fail(err))
            }
        }
    }
}

impl Iterator for ResultSet<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.in_rows {
            return None;
        }
        match self.conn.read_row_packet() {
            Ok(RowPacket::Row(payload)) => Some(self.decode(&payload)),
            Ok(RowPacket::End(end)) => {
                self.in_rows = false;
                self.outcome.warnings = end.warnings;
                tracing::debug!(
                    columns = self.columns.len(),
                    warnings = end.warnings,
                    more = end.more_results(),
                    "result set complete"
                );
                None
            }
            Err(err) => {
                self.in_rows = false;
                Some(Err(err))
            }
        }
    }
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("format", &self.format)
            .field("columns", &self.column_info.names())
            .field("outcome", &self.outcome)
            .field("in_rows", &self.in_rows)
            .finish_non_exhaustive()
    }
}
