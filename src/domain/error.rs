//! Domain error types.

/// Top-level error type for alphalab.
#[derive(Debug, thiserror::Error)]
pub enum AlphalabError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("malformed data in {source_name}: {reason}")]
    DataFormat { source_name: String, reason: String },

    #[error("result store error: {reason}")]
    Store { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {what}: have {have} rows, need {need}")]
    InsufficientData {
        what: String,
        have: usize,
        need: usize,
    },

    #[error("model error: {reason}")]
    Model { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlphalabError {
    pub(crate) fn model(reason: impl Into<String>) -> Self {
        AlphalabError::Model {
            reason: reason.into(),
        }
    }

    pub(crate) fn store(reason: impl Into<String>) -> Self {
        AlphalabError::Store {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        AlphalabError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl AlphalabError {
    /// Process exit status for this error family.
    pub fn exit_status(&self) -> u8 {
        match self {
            AlphalabError::Io(_) => 1,
            AlphalabError::ConfigParse { .. }
            | AlphalabError::ConfigMissing { .. }
            | AlphalabError::ConfigInvalid { .. } => 2,
            AlphalabError::DataSource { .. }
            | AlphalabError::DataFormat { .. }
            | AlphalabError::Store { .. } => 3,
            AlphalabError::Model { .. } => 4,
            AlphalabError::NoData { .. } | AlphalabError::InsufficientData { .. } => 5,
        }
    }
}

impl From<&AlphalabError> for std::process::ExitCode {
    fn from(err: &AlphalabError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = AlphalabError::invalid("tuning", "seed", "must be an integer");
        assert_eq!(
            err.to_string(),
            "invalid config value [tuning] seed: must be an integer"
        );

        let err = AlphalabError::InsufficientData {
            what: "walk-forward split".into(),
            have: 10,
            need: 300,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for walk-forward split: have 10 rows, need 300"
        );
    }

    #[test]
    fn exit_codes_group_by_family() {
        let io = AlphalabError::Io(std::io::Error::other("boom"));
        let cfg = AlphalabError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        };
        let model = AlphalabError::model("no trees");
        let no_data = AlphalabError::NoData {
            symbol: "BTCUSDT".into(),
        };

        assert_eq!(io.exit_status(), 1);
        assert_eq!(cfg.exit_status(), 2);
        assert_eq!(AlphalabError::store("x").exit_status(), 3);
        assert_eq!(model.exit_status(), 4);
        assert_eq!(no_data.exit_status(), 5);
    }
}
