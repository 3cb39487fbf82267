use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single typed cell in a provider table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Render the cell the way it appears in prompt text.
    pub fn display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => format!("{v}"),
            Cell::Str(s) => s.clone(),
            Cell::Timestamp(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(v) => Value::from(*v),
            Cell::Float(v) => Value::from(*v),
            Cell::Str(s) => Value::from(s.clone()),
            Cell::Timestamp(t) => Value::from(t.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    pub fn from_json(v: &Value) -> Cell {
        match v {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Int(i)
                } else {
                    Cell::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Cell::Str(s.clone()),
            other => Cell::Str(other.to_string()),
        }
    }
}

/// Row-oriented table: the universal in-memory shape returned by every fetch
/// operation. An empty table is a valid, non-error result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Keep only the named columns, preserving the requested order. Names not
    /// present in the table are ignored.
    pub fn select_columns(&self, names: &[String]) -> Table {
        let picks: Vec<usize> = names
            .iter()
            .filter_map(|n| self.column_index(n))
            .collect();
        let columns = picks.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| picks.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Table { columns, rows }
    }

    /// Last `n` rows, like the original's tail-capped prompts.
    pub fn tail(&self, n: usize) -> Table {
        let skip = self.rows.len().saturating_sub(n);
        Table {
            columns: self.columns.clone(),
            rows: self.rows[skip..].to_vec(),
        }
    }

    /// Rename columns according to (from, to) pairs. Unknown names are skipped.
    pub fn rename_columns(&mut self, mapping: &[(&str, &str)]) {
        for col in self.columns.iter_mut() {
            if let Some((_, to)) = mapping.iter().find(|(from, _)| from == col) {
                *col = (*to).to_string();
            }
        }
    }

    /// Compact text rendering used as LLM prompt input: header row then one
    /// line per row, cells separated by two spaces.
    pub fn to_compact_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join("  "));
        for row in &self.rows {
            out.push('\n');
            let line: Vec<String> = row.iter().map(|c| c.display()).collect();
            out.push_str(&line.join("  "));
        }
        out
    }

    /// Convert to record-oriented JSON (one object per row).
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (col, cell) in self.columns.iter().zip(row.iter()) {
                    obj.insert(col.clone(), cell.to_json());
                }
                Value::Object(obj)
            })
            .collect()
    }

    /// Build a table from record-oriented JSON; column order follows first
    /// appearance.
    pub fn from_records(records: &[Value]) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for rec in records {
            if let Value::Object(map) = rec {
                for key in map.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
        let rows = records
            .iter()
            .map(|rec| {
                columns
                    .iter()
                    .map(|col| {
                        rec.get(col)
                            .map(Cell::from_json)
                            .unwrap_or(Cell::Null)
                    })
                    .collect()
            })
            .collect();
        Table { columns, rows }
    }

    /// Sort rows descending by a string/timestamp column, if present.
    pub fn sort_desc_by(&mut self, column: &str) {
        if let Some(idx) = self.column_index(column) {
            self.rows
                .sort_by(|a, b| b[idx].display().cmp(&a[idx].display()));
        }
    }

    /// Retain rows whose value in `column` falls inside [start, end]
    /// (lexicographic compare works for YYYYMMDD strings).
    pub fn filter_date_range(&self, column: &str, start: &str, end: &str) -> Table {
        let Some(idx) = self.column_index(column) else {
            return self.clone();
        };
        let rows = self
            .rows
            .iter()
            .filter(|r| {
                let v = r[idx].display();
                v.as_str() >= start && v.as_str() <= end
            })
            .cloned()
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }
}
