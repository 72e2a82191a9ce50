//! Market data access port.

use crate::domain::error::AlphalabError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Bars for `symbol` at `interval` (e.g. `6h`, `1d`) opening within
    /// `[start, end]`, oldest first.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, AlphalabError>;
}
