//! Concrete adapter implementations for ports.

pub mod binance_adapter;
pub mod csv_adapter;
pub mod csv_store;
pub mod file_config_adapter;
pub mod model_store;
pub mod typst_report;
