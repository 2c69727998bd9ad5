//! Pending-update telemetry model.
//!
//! The telemetry backend answers a fixed query with one tabular result:
//! one row per (machine, product) pair still needing a security or
//! critical update. Rows arrive already classification-filtered and
//! sorted upstream (classification weight desc, machine count desc,
//! product asc); that order is preserved here, never re-sorted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tabular result from the telemetry backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl LogsTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome status of a telemetry query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Success,
    /// The backend returned an error plus whatever rows it had gathered.
    Partial,
}

/// A telemetry query result: status plus rows, and the backend error when
/// the result is partial. Partial results are surfaced and then processed
/// as-is; they never abort the run.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub status: QueryStatus,
    pub error: Option<String>,
    pub table: LogsTable,
}

impl QueryOutcome {
    pub fn success(table: LogsTable) -> Self {
        Self {
            status: QueryStatus::Success,
            error: None,
            table,
        }
    }

    pub fn partial(table: LogsTable, error: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::Partial,
            error: Some(error.into()),
            table,
        }
    }
}

/// One pending-update record for one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRow {
    /// Full resource id of the machine the update applies to. May carry
    /// extra path segments beyond the machine's own id.
    pub resource_id: String,
    /// Machine hostname as reported to the workspace.
    pub computer: String,
    /// Stable source id, `<product>_<arch>` as emitted by the query.
    pub source_id: String,
    /// Product name; this is what lands in a schedule's update list.
    pub product: String,
    pub product_arch: String,
    /// Severity classification, e.g. "Security Updates" or "Critical Updates".
    pub classification: String,
    /// Bulletin reference, empty when the backend has none.
    pub bulletin_id: String,
    pub bulletin_url: String,
}

fn str_cell(row: &[Value], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Decode the pending-updates table into typed rows, in table order.
/// Cells are looked up by column name; missing columns decode as empty.
pub fn update_rows(table: &LogsTable) -> Vec<UpdateRow> {
    let resource_id = table.column_index("ResourceId");
    let computer = table.column_index("Computer");
    let source_id = table.column_index("id");
    let product = table.column_index("displayName");
    let product_arch = table.column_index("productArch");
    let classification = table.column_index("classification");
    let information_link = table.column_index("informationLink");

    table
        .rows
        .iter()
        .map(|row| {
            // informationLink is a {uri, text} object or an empty string.
            let link = information_link.and_then(|i| row.get(i));
            let bulletin_id = link
                .and_then(|v| v.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let bulletin_url = link
                .and_then(|v| v.get("uri"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            UpdateRow {
                resource_id: str_cell(row, resource_id),
                computer: str_cell(row, computer),
                source_id: str_cell(row, source_id),
                product: str_cell(row, product),
                product_arch: str_cell(row, product_arch),
                classification: str_cell(row, classification),
                bulletin_id,
                bulletin_url,
            }
        })
        .collect()
}

/// Per-run snapshot of every pending update across the fleet.
#[derive(Debug, Clone, Default)]
pub struct PendingUpdateSet {
    rows: Vec<UpdateRow>,
}

impl PendingUpdateSet {
    pub fn from_rows(rows: Vec<UpdateRow>) -> Self {
        Self { rows }
    }

    pub fn from_table(table: &LogsTable) -> Self {
        Self::from_rows(update_rows(table))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Ordered, distinct product names pending for the machine with the
    /// given resource identity. Empty means the machine needs no action.
    ///
    /// A row applies when its resource id, case-folded, contains the
    /// machine identity, case-folded. This is substring containment, not
    /// equality: telemetry ids may carry extra path segments, and a
    /// machine whose id is a prefix of another's will match both rows.
    /// That looseness is inherited behavior and is kept as-is.
    pub fn updates_for(&self, identity: &str) -> Vec<String> {
        let needle = identity.to_lowercase();
        let mut updates: Vec<String> = Vec::new();
        for row in &self.rows {
            if row.resource_id.to_lowercase().contains(&needle)
                && !updates.contains(&row.product)
            {
                updates.push(row.product.clone());
            }
        }
        updates
    }
}
