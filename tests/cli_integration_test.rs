//! CLI-level tests: argument parsing, config validation and exit codes.

mod common;

use std::process::ExitCode;

use alphalab::adapters::file_config_adapter::FileConfigAdapter;
use alphalab::cli::{run, Cli, Command, TuneModel};
use alphalab::domain::config_validation::{
    load_evaluation_config, load_pipeline_config, load_strategy_config, load_tuning_config,
    validate_all,
};
use alphalab::domain::error::AlphalabError;
use alphalab::domain::tuning::ModelFamily;
use clap::Parser;
use common::*;
use tempfile::TempDir;

const MINIMAL_INI: &str = "[data]\nsymbol = ETHUSDT\nstart_date = 2020-01-01\nend_date = 2021-01-01\n";

mod argument_parsing {
    use super::*;

    #[test]
    fn tune_takes_model_family() {
        let cli = Cli::try_parse_from(["alphalab", "tune", "-c", "a.ini", "--model", "catboost"])
            .unwrap();
        match cli.command {
            Command::Tune { config, model } => {
                assert_eq!(config.to_str(), Some("a.ini"));
                assert_eq!(model, TuneModel::Catboost);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(Cli::try_parse_from(["alphalab", "tune", "-c", "a.ini", "--model", "xgb"]).is_err());
    }

    #[test]
    fn predict_requires_bars() {
        assert!(Cli::try_parse_from(["alphalab", "predict", "-c", "a.ini"]).is_err());
        let cli =
            Cli::try_parse_from(["alphalab", "predict", "-c", "a.ini", "--bars", "live.tsv"]).unwrap();
        assert!(matches!(cli.command, Command::Predict { .. }));
    }

    #[test]
    fn export_models_is_kebab_case() {
        let cli = Cli::try_parse_from(["alphalab", "export-models", "--config", "a.ini"]).unwrap();
        assert!(matches!(cli.command, Command::ExportModels { .. }));
    }
}

mod config_validation {
    use super::*;

    #[test]
    fn full_pipeline_config_is_valid() {
        let dir = TempDir::new().unwrap();
        let adapter = FileConfigAdapter::from_string(&pipeline_ini(dir.path())).unwrap();
        validate_all(&adapter).unwrap();

        let pipeline = load_pipeline_config(&adapter).unwrap();
        assert_eq!(pipeline.symbol, SYMBOL);
        assert_eq!(pipeline.models_dir, dir.path().join("models"));

        let tuning = load_tuning_config(&adapter).unwrap();
        assert_eq!(tuning.num_iterations, vec![5, 10]);
        assert_eq!(tuning.n_splits, Some(2));

        let eval = load_evaluation_config(&adapter).unwrap();
        assert_eq!(eval.family, ModelFamily::LightGbm);
        assert_eq!(eval.periods, vec![1, 5]);

        let strategy = load_strategy_config(&adapter).unwrap();
        assert_eq!(strategy.max_history, 400);
        assert_eq!(strategy.exit_threshold, strategy.enter_threshold);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string(MINIMAL_INI).unwrap();
        validate_all(&adapter).unwrap();
        let pipeline = load_pipeline_config(&adapter).unwrap();
        assert_eq!(pipeline.interval, "6h");
        assert_eq!(pipeline.ohlcv_path.to_str(), Some("data/ohlcv.tsv"));
    }

    #[test]
    fn missing_symbol_is_reported() {
        let adapter =
            FileConfigAdapter::from_string("[data]\nstart_date = 2020-01-01\nend_date = 2021-01-01\n")
                .unwrap();
        let err = validate_all(&adapter).unwrap_err();
        assert!(
            matches!(err, AlphalabError::ConfigMissing { ref section, ref key } if section == "data" && key == "symbol")
        );
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn bad_values_are_reported_by_key() {
        let cases = [
            ("[evaluation]\nquantiles = 1\n", "quantiles"),
            ("[evaluation]\ntop_n = 2\naverage_top = 3\n", "average_top"),
            ("[tuning]\nsample_fraction = 1.5\n", "sample_fraction"),
            ("[strategy]\nmodel = xgboost\n", "model"),
            ("[logging]\nlevel = loud\n", "level"),
        ];
        for (extra, expected) in cases {
            let ini = format!("{}{}", MINIMAL_INI, extra);
            let adapter = FileConfigAdapter::from_string(&ini).unwrap();
            match validate_all(&adapter) {
                Err(AlphalabError::ConfigInvalid { key, .. }) => assert_eq!(key, expected, "{}", extra),
                other => panic!("{}: expected ConfigInvalid, got {:?}", extra, other),
            }
        }

        let adapter = FileConfigAdapter::from_string(
            "[data]\nsymbol = X\ninterval = 6x\nstart_date = 2020-01-01\nend_date = 2021-01-01\n",
        )
        .unwrap();
        assert!(matches!(
            validate_all(&adapter),
            Err(AlphalabError::ConfigInvalid { key, .. }) if key == "interval"
        ));
    }
}

mod exit_codes {
    use super::*;

    // ExitCode has no PartialEq, so compare the debug form
    fn assert_exit(code: ExitCode, expected: ExitCode) {
        assert_eq!(format!("{:?}", code), format!("{:?}", expected));
    }

    fn write_config(dir: &TempDir, content: &str) -> String {
        let path = dir.path().join("alphalab.ini");
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    #[test]
    fn validate_succeeds_on_valid_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL_INI);
        let code = run(Cli::parse_from(["alphalab", "validate", "-c", path.as_str()]));
        assert_exit(code, ExitCode::SUCCESS);
    }

    #[test]
    fn missing_config_file_exits_with_config_code() {
        let code = run(Cli::parse_from(["alphalab", "validate", "-c", "/nonexistent/alphalab.ini"]));
        assert_exit(code, ExitCode::from(2));
    }

    #[test]
    fn invalid_config_exits_with_config_code() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[data]\nsymbol = X\n");
        let code = run(Cli::parse_from(["alphalab", "validate", "-c", path.as_str()]));
        assert_exit(code, ExitCode::from(2));
    }

    #[test]
    fn features_without_ohlcv_exits_with_io_code() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &pipeline_ini(dir.path()));
        let code = run(Cli::parse_from(["alphalab", "features", "-c", path.as_str()]));
        assert_exit(code, ExitCode::from(1));
    }

    #[test]
    fn evaluate_without_results_exits_with_no_data_code() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &pipeline_ini(dir.path()));
        let code = run(Cli::parse_from(["alphalab", "evaluate", "-c", path.as_str()]));
        assert_exit(code, ExitCode::from(5));
    }
}
