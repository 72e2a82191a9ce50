//! alphalab — alpha factor research pipeline.
//!
//! Downloads OHLCV bars, derives technical features, tunes gradient-boosted
//! models with walk-forward cross-validation, evaluates them as a factor and
//! turns live bars into trading actions.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], stage orchestration in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
