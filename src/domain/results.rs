//! Labelled numeric tables exchanged with the result store.

use crate::domain::error::AlphalabError;

/// A string-indexed table of floats. Missing values are NaN.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    pub index_name: String,
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ResultTable {
    pub fn new(index_name: &str, columns: Vec<String>) -> Self {
        Self {
            index_name: index_name.to_string(),
            index: Vec::new(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, index: impl Into<String>, values: Vec<f64>) -> Result<(), AlphalabError> {
        if values.len() != self.columns.len() {
            return Err(AlphalabError::store(format!(
                "row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.index.push(index.into());
        self.rows.push(values);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[j]).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let j = self.column_index(name)?;
        self.rows.get(row).map(|r| r[j])
    }
}

/// Format a parameter value the way it appears in store keys: integral
/// values without a fractional part, others in shortest form.
pub fn format_param(value: f64) -> String {
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_read_columns() {
        let mut t = ResultTable::new("date", vec!["10".into(), "25".into()]);
        t.push_row("2021-01-01", vec![0.1, 0.2]).unwrap();
        t.push_row("2021-01-02", vec![f64::NAN, 0.3]).unwrap();

        assert_eq!(t.len(), 2);
        assert_eq!(t.column("25"), Some(vec![0.2, 0.3]));
        assert!(t.value(1, "10").unwrap().is_nan());
        assert!(t.column("50").is_none());
        assert!(t.push_row("x", vec![1.0]).is_err());
    }

    #[test]
    fn params_format_like_keys() {
        assert_eq!(format_param(0.01), "0.01");
        assert_eq!(format_param(32.0), "32");
        assert_eq!(format_param(0.95), "0.95");
    }
}
