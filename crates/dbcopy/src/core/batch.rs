//! Row sets shared by every dialect.

use std::sync::Arc;

use super::value::Value;

/// A bounded, table-shaped group of rows.
///
/// Column names are shared between batches of the same result set, so
/// cloning the header is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

impl RecordBatch {
    pub fn new(columns: impl Into<Arc<[String]>>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    /// An empty batch that still carries the result set's column names.
    pub fn empty(columns: impl Into<Arc<[String]>>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<[String]> {
        Arc::clone(&self.columns)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// First value of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }

    /// Append a column holding the same value on every row.
    pub fn push_constant_column(&mut self, name: impl Into<String>, value: Value) {
        let mut columns = self.columns.to_vec();
        columns.push(name.into());
        self.columns = columns.into();
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    /// Apply `f` to every value, with the value's column index.
    pub fn map_values<F>(&mut self, mut f: F) -> crate::error::Result<()>
    where
        F: FnMut(usize, Value) -> crate::error::Result<Value>,
    {
        for row in &mut self.rows {
            for (idx, slot) in row.iter_mut().enumerate() {
                let value = std::mem::replace(slot, Value::Null);
                *slot = f(idx, value)?;
            }
        }
        Ok(())
    }

    /// Iterate rows as name-addressable records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |values| Record {
            columns: &self.columns,
            values,
        })
    }
}

impl Default for RecordBatch {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), Vec::new())
    }
}

/// One row viewed as an ordered field-name to value mapping.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordBatch {
        RecordBatch::new(
            vec!["ID".to_string(), "Name".to_string()],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::Null],
            ],
        )
    }

    #[test]
    fn test_column_index_is_case_insensitive() {
        let batch = sample();
        assert_eq!(batch.column_index("name"), Some(1));
        assert_eq!(batch.column_index("ID"), Some(0));
        assert_eq!(batch.column_index("missing"), None);
    }

    #[test]
    fn test_push_constant_column() {
        let mut batch = sample();
        batch.push_constant_column("RUN", Value::Int(9));
        assert_eq!(batch.columns().len(), 3);
        assert!(batch.rows().iter().all(|r| r[2] == Value::Int(9)));
    }

    #[test]
    fn test_records_view() {
        let batch = sample();
        let names: Vec<_> = batch
            .records()
            .map(|r| r.get("name").cloned().unwrap_or(Value::Null))
            .collect();
        assert_eq!(names, vec![Value::from("a"), Value::Null]);
        let first = batch.records().next().unwrap();
        let fields: Vec<_> = first.fields().map(|(k, _)| k).collect();
        assert_eq!(fields, vec!["ID", "Name"]);
    }
}
