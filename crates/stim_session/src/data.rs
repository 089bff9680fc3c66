//! Collected experiment results.
//!
//! Rows accumulate one trial at a time: `add` stages key/value pairs for the
//! current trial, `next_entry` commits the row. Extra per-session fields
//! (participant info and the like) are merged into every committed row.
//! Serialization covers the upload contract only; reading tabular files back
//! is someone else's business.

use std::collections::HashMap;

use serde_json::Value;

/// Row-oriented store for collected trial data.
#[derive(Debug, Default)]
pub struct ExperimentData {
    extra: Vec<(String, Value)>,
    columns: Vec<String>,
    current: Vec<(String, Value)>,
    rows: Vec<HashMap<String, Value>>,
}

impl ExperimentData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every committed row carries the given extra fields.
    pub fn with_extra(extra: impl IntoIterator<Item = (String, Value)>) -> Self {
        let extra: Vec<(String, Value)> = extra.into_iter().collect();
        let columns = extra.iter().map(|(key, _)| key.clone()).collect();
        Self {
            extra,
            columns,
            current: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Stage a value for the current trial. Staging the same key twice in
    /// one trial overwrites.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if !self.columns.contains(&key) {
            self.columns.push(key.clone());
        }
        match self.current.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.current.push((key, value)),
        }
    }

    /// Commit the staged values (plus the extra fields) as one row.
    pub fn next_entry(&mut self) {
        let row = self
            .extra
            .iter()
            .cloned()
            .chain(self.current.drain(..))
            .collect();
        self.rows.push(row);
    }

    /// Number of committed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Columns in first-seen order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Serialize the committed rows as a JSON array of objects.
    #[must_use]
    pub fn to_json(&self) -> String {
        let rows: Vec<serde_json::Map<String, Value>> = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .filter_map(|column| {
                        row.get(column).map(|value| (column.clone(), value.clone()))
                    })
                    .collect()
            })
            .collect();
        Value::Array(rows.into_iter().map(Value::Object).collect()).to_string()
    }

    /// Serialize the committed rows as CSV, header first, columns in
    /// first-seen order. Absent cells are empty.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(
            &self
                .columns
                .iter()
                .map(|column| csv_cell(column))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
        for row in &self.rows {
            let line: Vec<String> = self
                .columns
                .iter()
                .map(|column| match row.get(column) {
                    Some(Value::String(text)) => csv_cell(text),
                    Some(value) => csv_cell(&value.to_string()),
                    None => String::new(),
                })
                .collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }
}

fn csv_cell(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rows_commit_in_order() {
        let mut data = ExperimentData::new();
        data.add("trial", 1);
        data.add("rt", 0.42);
        data.next_entry();
        data.add("trial", 2);
        data.add("rt", 0.39);
        data.next_entry();

        assert_eq!(data.len(), 2);
        assert_eq!(data.columns(), ["trial", "rt"]);
        let csv = data.to_csv();
        assert_eq!(csv, "trial,rt\n1,0.42\n2,0.39\n");
    }

    #[test]
    fn test_extra_fields_in_every_row() {
        let mut data =
            ExperimentData::with_extra([("participant".to_string(), json!("p01"))]);
        data.add("trial", 1);
        data.next_entry();
        assert_eq!(data.to_csv(), "participant,trial\np01,1\n");
    }

    #[test]
    fn test_restaging_overwrites_within_trial() {
        let mut data = ExperimentData::new();
        data.add("resp", "left");
        data.add("resp", "right");
        data.next_entry();
        assert_eq!(data.to_csv(), "resp\nright\n");
    }

    #[test]
    fn test_missing_cell_is_empty() {
        let mut data = ExperimentData::new();
        data.add("a", 1);
        data.next_entry();
        data.add("a", 2);
        data.add("b", 3);
        data.next_entry();
        assert_eq!(data.to_csv(), "a,b\n1,\n2,3\n");
    }

    #[test]
    fn test_csv_quoting() {
        let mut data = ExperimentData::new();
        data.add("text", "hello, \"world\"");
        data.next_entry();
        assert_eq!(data.to_csv(), "text\n\"hello, \"\"world\"\"\"\n");
    }

    #[test]
    fn test_json_serialization() {
        let mut data = ExperimentData::new();
        data.add("trial", 1);
        data.next_entry();
        assert_eq!(data.to_json(), r#"[{"trial":1}]"#);
    }
}
