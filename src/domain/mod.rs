//! Core domain types and logic: features, models, selection and factor analysis.

pub mod ohlcv;
pub mod indicator;
pub mod indicator_helpers;
pub mod stats;
pub mod features;
pub mod dataset;
pub mod cv;
pub mod linear;
pub mod gbm;
pub mod ic;
pub mod results;
pub mod tuning;
pub mod selection;
pub mod factor;
pub mod strategy;
pub mod config_validation;
pub mod error;
