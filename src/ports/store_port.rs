//! Result store port for tuning output.

use crate::domain::error::AlphalabError;
use crate::domain::results::ResultTable;

/// Hierarchical key/value store of tables. Keys are `/`-separated paths
/// such as `metrics/21/252/63/0.1/8/0.6/150`.
pub trait ResultStore {
    fn put_table(&mut self, key: &str, table: &ResultTable) -> Result<(), AlphalabError>;

    fn get_table(&self, key: &str) -> Result<ResultTable, AlphalabError>;

    /// Every stored key starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, AlphalabError>;
}
