//! Directory-backed [`ResultStore`]: each key is one CSV file at
//! `<root>/<key>.csv`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::AlphalabError;
use crate::domain::results::ResultTable;
use crate::ports::store_port::ResultStore;

const EXTENSION: &str = ".csv";

pub struct CsvResultStore {
    root: PathBuf,
}

impl CsvResultStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AlphalabError> {
        let key = key.trim_matches('/');
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(AlphalabError::store(format!("invalid key {:?}", key)));
        }
        Ok(self.root.join(format!("{}{}", key, EXTENSION)))
    }

    fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), AlphalabError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            if entry.file_type()?.is_dir() {
                Self::collect_keys(&entry.path(), &key, out)?;
            } else if let Some(stripped) = key.strip_suffix(EXTENSION) {
                out.push(stripped.to_string());
            }
        }
        Ok(())
    }
}

fn parse_cell(raw: &str) -> Result<f64, AlphalabError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse()
        .map_err(|_| AlphalabError::store(format!("invalid number {:?}", raw)))
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

impl ResultStore for CsvResultStore {
    fn put_table(&mut self, key: &str, table: &ResultTable) -> Result<(), AlphalabError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let store_err = |e: csv::Error| AlphalabError::store(format!("{}: {}", key, e));
        let mut wtr = csv::Writer::from_path(&path).map_err(store_err)?;

        let mut header = vec![table.index_name.clone()];
        header.extend(table.columns.iter().cloned());
        wtr.write_record(&header).map_err(store_err)?;
        for (label, row) in table.index.iter().zip(&table.rows) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(label.clone());
            record.extend(row.iter().map(|&v| format_cell(v)));
            wtr.write_record(&record).map_err(store_err)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn get_table(&self, key: &str) -> Result<ResultTable, AlphalabError> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Err(AlphalabError::store(format!("no table under key {}", key)));
        }
        let store_err = |e: csv::Error| AlphalabError::store(format!("{}: {}", key, e));
        let mut rdr = csv::Reader::from_path(&path).map_err(store_err)?;
        let headers = rdr.headers().map_err(store_err)?.clone();
        let index_name = headers.get(0).unwrap_or("index").to_string();
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut table = ResultTable::new(&index_name, columns);
        for result in rdr.records() {
            let record = result.map_err(store_err)?;
            let label = record.get(0).unwrap_or("").to_string();
            let values = record
                .iter()
                .skip(1)
                .map(parse_cell)
                .collect::<Result<Vec<_>, _>>()?;
            table.push_row(label, values)?;
        }
        Ok(table)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, AlphalabError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
