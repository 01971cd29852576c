//! Row-major tables with a fixed, ordered column set.
//!
//! Every listing and detail call ends up here: server records are projected
//! onto the entity's declared columns, extra fields are dropped and a missing
//! column is an error.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::util::parse_datetime;

/// Timestamp columns, rendered the way `DateTime<Utc>` serializes.
const DATETIME_COLS: &[&str] = &["created", "expiry"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Projects JSON objects onto `columns`, in that order.
    pub fn from_values(records: &[Value], columns: &[&str]) -> Result<Self> {
        let mut table = Self::new(columns);
        for record in records {
            let object = record
                .as_object()
                .ok_or_else(|| Error::Decode(format!("expected an object, got {}", record)))?;
            let row = columns
                .iter()
                .map(|c| {
                    object
                        .get(*c)
                        .cloned()
                        .ok_or_else(|| Error::MissingColumn(c.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;
            table.rows.push(row);
        }
        for column in DATETIME_COLS {
            table.map_column(column, normalize_datetime);
        }
        Ok(table)
    }

    /// Serializes `records` and projects them like [`Table::from_values`].
    pub fn from_records<T: Serialize>(records: &[T], columns: &[&str]) -> Result<Self> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_values(&values, columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.position(column)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.position(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Renames columns; names not present are ignored.
    pub fn rename(mut self, renames: &[(&str, &str)]) -> Self {
        for (from, to) in renames {
            if let Some(idx) = self.position(from) {
                self.columns[idx] = to.to_string();
            }
        }
        self
    }

    /// Replaces `completed_steps`/`total_steps` with a trailing `ready` column.
    pub fn with_ready_column(mut self) -> Result<Self> {
        let completed = self
            .position("completed_steps")
            .ok_or_else(|| Error::MissingColumn("completed_steps".into()))?;
        let total = self
            .position("total_steps")
            .ok_or_else(|| Error::MissingColumn("total_steps".into()))?;

        let (first, second) = if completed > total {
            (completed, total)
        } else {
            (total, completed)
        };

        for row in &mut self.rows {
            let ready = row[completed] == row[total];
            row.remove(first);
            row.remove(second);
            row.push(Value::Bool(ready));
        }
        self.columns.remove(first);
        self.columns.remove(second);
        self.columns.push("ready".to_string());
        Ok(self)
    }

    /// Rewrites every cell of `column` in place.
    pub fn map_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Value) -> Value,
    {
        if let Some(idx) = self.position(column) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }
}

fn normalize_datetime(value: &Value) -> Value {
    value
        .as_str()
        .and_then(parse_datetime)
        .and_then(|dt| serde_json::to_value(dt).ok())
        .unwrap_or_else(|| value.clone())
}

/// Deserializes server records into entities, failing with
/// [`Error::MissingColumn`] on the first record lacking one of `columns`.
pub(crate) fn typed_records<T: DeserializeOwned>(
    records: Vec<Value>,
    columns: &[&str],
) -> Result<Vec<T>> {
    records
        .into_iter()
        .map(|record| {
            if let Some(object) = record.as_object() {
                if let Some(missing) = columns.iter().find(|c| !object.contains_key(**c)) {
                    return Err(Error::MissingColumn(missing.to_string()));
                }
            }
            Ok(serde_json::from_value(record)?)
        })
        .collect()
}

/// Plain text rendering of a cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(c.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let write_line = |f: &mut fmt::Formatter<'_>, items: &[String]| -> fmt::Result {
            let line: Vec<String> = items
                .iter()
                .zip(&widths)
                .map(|(item, width)| format!("{:<width$}", item, width = width))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())
        };

        write_line(f, &self.columns)?;
        for row in &cells {
            write_line(f, row)?;
        }
        Ok(())
    }
}
