use crate::cli::Cli;
use crate::error::ConntopError;
use crate::matcher::AddressMatcher;
use crate::parallel::ParallelConfig;
use crate::record::RecordSchema;
use crate::report::ReportOptions;

/// Main configuration struct for conntop
#[derive(Debug, Clone)]
pub struct ConntopConfig {
    pub input: InputConfig,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    pub performance: ParallelConfig,
}

/// Input configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConfig {
    /// Path to read, or "-" for stdin.
    pub path: String,
    pub decompressor: Option<String>,
}

/// Processing configuration
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub schema: RecordSchema,
    pub match_filters: Vec<String>,
    pub matcher: AddressMatcher,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub report: ReportOptions,
    pub stats: bool,
    pub debug: bool,
}

impl ConntopConfig {
    /// Default configuration for `path` with the given address filters.
    pub fn new<S: AsRef<str>>(path: impl Into<String>, filters: &[S]) -> Result<Self, ConntopError> {
        let match_filters: Vec<String> = filters.iter().map(|f| f.as_ref().to_string()).collect();
        let matcher = AddressMatcher::parse(&match_filters)?;

        Ok(Self {
            input: InputConfig {
                path: path.into(),
                decompressor: None,
            },
            processing: ProcessingConfig {
                schema: RecordSchema::default(),
                match_filters,
                matcher,
            },
            output: OutputConfig {
                report: ReportOptions::default(),
                stats: false,
                debug: false,
            },
            performance: ParallelConfig::default(),
        })
    }

    /// Create configuration from CLI arguments, rejecting invalid combinations.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConntopError> {
        let mut config = Self::new(cli.file.clone(), &cli.matches)?;

        config.input.decompressor = cli
            .decompressor
            .as_ref()
            .map(|cmd| cmd.trim().to_string())
            .filter(|cmd| !cmd.is_empty());

        config.processing.schema = RecordSchema {
            delimiter: cli.delimiter,
            comment_marker: cli.comment_marker.clone(),
            origin_field: cli.origin_field,
            responder_field: cli.responder_field,
            bytes_fields: cli.bytes_fields.clone(),
        };

        config.output = OutputConfig {
            report: ReportOptions {
                format: cli.output_format,
                top_n: cli.top,
                show_totals: cli.show_totals,
            },
            stats: cli.stats,
            debug: cli.debug,
        };

        config.performance = ParallelConfig {
            block_size: cli.block_size,
            parser_pool_size: cli.parsers,
            aggregator_pool_size: cli.reducers,
            queue_capacity: cli.queue_capacity,
            progress_interval: cli.progress.then_some(cli.progress_interval),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConntopError> {
        if self.input.path.is_empty() {
            return Err(ConntopError::config("input path must not be empty"));
        }
        if self.output.report.top_n == 0 {
            return Err(ConntopError::config("--top must be positive"));
        }
        self.processing.schema.validate()?;
        self.performance.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config_from(args: &[&str]) -> Result<ConntopConfig, ConntopError> {
        let cli = Cli::try_parse_from(std::iter::once("conntop").chain(args.iter().copied()))
            .expect("arguments should parse");
        ConntopConfig::from_cli(&cli)
    }

    #[test]
    fn test_from_cli_defaults() {
        let config = config_from(&["-m", "128.252.", "conn.log"]).unwrap();
        assert_eq!(config.input.path, "conn.log");
        assert_eq!(config.input.decompressor, None);
        assert_eq!(config.processing.match_filters, vec!["128.252."]);
        assert_eq!(config.processing.schema, RecordSchema::default());
        assert_eq!(config.output.report, ReportOptions::default());
        assert_eq!(config.performance, ParallelConfig::default());
    }

    #[test]
    fn test_progress_interval_only_when_enabled() {
        let config = config_from(&["-m", "a", "-p", "--progress-interval", "1s", "f"]).unwrap();
        assert_eq!(
            config.performance.progress_interval,
            Some(std::time::Duration::from_secs(1))
        );

        let config = config_from(&["-m", "a", "--progress-interval", "1s", "f"]).unwrap();
        assert_eq!(config.performance.progress_interval, None);
    }

    #[test]
    fn test_zero_values_are_config_errors() {
        for flag in ["--top", "--block-size", "--parsers", "--reducers", "--queue-capacity"] {
            let err = config_from(&["-m", "a", flag, "0", "f"]).unwrap_err();
            assert!(err.is_usage_error(), "{} 0 should be a usage error", flag);
        }
    }

    #[test]
    fn test_bad_cidr_is_config_error() {
        let err = config_from(&["-m", "10.0.0.0/99", "f"]).unwrap_err();
        assert!(matches!(err, ConntopError::InvalidFilter { .. }));
    }

    #[test]
    fn test_same_origin_and_responder_rejected() {
        let err = config_from(&["-m", "a", "--origin-field", "4", "f"]).unwrap_err();
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_blank_decompressor_is_ignored() {
        let config = config_from(&["-m", "a", "--decompressor", "  ", "f.gz"]).unwrap();
        assert_eq!(config.input.decompressor, None);
    }
}
