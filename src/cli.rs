// Command-line interface definition
// Parsing only; validation happens when the Cli is turned into a ConntopConfig.

use clap::Parser;
use std::time::Duration;

use crate::parallel::{
    DEFAULT_AGGREGATOR_POOL_SIZE, DEFAULT_PARSER_POOL_SIZE, DEFAULT_QUEUE_CAPACITY,
};
use crate::record::{DEFAULT_BYTES_FIELDS, DEFAULT_ORIGIN_FIELD, DEFAULT_RESPONDER_FIELD};
use crate::report::{ReportFormat, DEFAULT_TOP_N};
use crate::source::DEFAULT_BLOCK_SIZE;

#[derive(Parser, Debug, Clone)]
#[command(name = "conntop")]
#[command(about = "Rank local hosts by bytes transferred in a network connection log")]
#[command(
    long_about = "Rank local hosts by bytes transferred in a network connection log\n\nReads a tab-separated connection log (plain, gzip or zstd), keeps the\naddresses that match --match, and prints the hosts with the largest byte\ntotals.\n\nCOMMON EXAMPLES:\n  conntop --match 128.252. conn.log.gz\n  conntop -m 10.0.0.0/8,192.168.0.0/16 --top 20 conn.log\n  zcat conn.log.gz | conntop -m 10.1. -F json -"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Connection log to read ("-" for stdin)
    pub file: String,

    /// Address prefix (e.g. 128.252.) or CIDR network (e.g. 10.0.0.0/8)
    #[arg(
        short = 'm',
        long = "match",
        value_name = "FILTER",
        value_delimiter = ',',
        required = true,
        help_heading = "Filtering Options"
    )]
    pub matches: Vec<String>,

    /// Number of hosts to print
    #[arg(
        short = 'n',
        long = "top",
        value_name = "N",
        default_value_t = DEFAULT_TOP_N,
        help_heading = "Output Options"
    )]
    pub top: usize,

    /// Report format
    #[arg(
        short = 'F',
        long = "output-format",
        value_enum,
        default_value_t = ReportFormat::Text,
        help_heading = "Output Options"
    )]
    pub output_format: ReportFormat,

    /// Append the raw byte total to each text line
    #[arg(long = "show-totals", help_heading = "Output Options")]
    pub show_totals: bool,

    /// Field delimiter ("tab" or a single character)
    #[arg(
        long = "delimiter",
        value_name = "CHAR",
        default_value = "tab",
        value_parser = parse_delimiter,
        help_heading = "Input Options"
    )]
    pub delimiter: char,

    /// Lines starting with this marker are skipped
    #[arg(
        long = "comment-marker",
        value_name = "STR",
        default_value = "#",
        help_heading = "Input Options"
    )]
    pub comment_marker: String,

    /// Zero-based position of the originating address
    #[arg(
        long = "origin-field",
        value_name = "IDX",
        default_value_t = DEFAULT_ORIGIN_FIELD,
        help_heading = "Input Options"
    )]
    pub origin_field: usize,

    /// Zero-based position of the responding address
    #[arg(
        long = "responder-field",
        value_name = "IDX",
        default_value_t = DEFAULT_RESPONDER_FIELD,
        help_heading = "Input Options"
    )]
    pub responder_field: usize,

    /// Zero-based positions of the byte counters that are summed per record
    #[arg(
        long = "bytes-fields",
        value_name = "IDX,IDX",
        value_delimiter = ',',
        default_values_t = DEFAULT_BYTES_FIELDS.to_vec(),
        help_heading = "Input Options"
    )]
    pub bytes_fields: Vec<usize>,

    /// External command for .gz input, run as `CMD -c FILE` (e.g. gzcat)
    #[arg(long = "decompressor", value_name = "CMD", help_heading = "Input Options")]
    pub decompressor: Option<String>,

    /// Read block size in bytes
    #[arg(
        short = 'b',
        long = "block-size",
        value_name = "BYTES",
        default_value_t = DEFAULT_BLOCK_SIZE,
        help_heading = "Performance Options"
    )]
    pub block_size: usize,

    /// Parser pool size
    #[arg(
        long = "parsers",
        value_name = "N",
        default_value_t = DEFAULT_PARSER_POOL_SIZE,
        help_heading = "Performance Options"
    )]
    pub parsers: usize,

    /// Aggregator pool size
    #[arg(
        long = "reducers",
        value_name = "N",
        default_value_t = DEFAULT_AGGREGATOR_POOL_SIZE,
        help_heading = "Performance Options"
    )]
    pub reducers: usize,

    /// Capacity of each inter-stage queue
    #[arg(
        long = "queue-capacity",
        value_name = "N",
        default_value_t = DEFAULT_QUEUE_CAPACITY,
        help_heading = "Performance Options"
    )]
    pub queue_capacity: usize,

    /// Print a progress line to stderr while running
    #[arg(short = 'p', long = "progress", help_heading = "Metrics and Stats")]
    pub progress: bool,

    /// How often the progress line is refreshed (e.g. 500ms, 2s)
    #[arg(
        long = "progress-interval",
        value_name = "DURATION",
        default_value = "500ms",
        value_parser = humantime::parse_duration,
        help_heading = "Metrics and Stats"
    )]
    pub progress_interval: Duration,

    /// Print processing statistics to stderr when done
    #[arg(short = 's', long = "stats", help_heading = "Metrics and Stats")]
    pub stats: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short = 'd', long = "debug", help_heading = "Metrics and Stats")]
    pub debug: bool,

    /// Specify custom configuration file path
    #[arg(long = "config-file", value_name = "PATH", help_heading = "Configuration Options")]
    pub config_file: Option<String>,

    /// Ignore configuration files
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Show configuration files and exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,

    /// Use alias from configuration file
    #[arg(short = 'a', long = "alias", value_name = "NAME", help_heading = "Configuration Options")]
    pub alias: Vec<String>,
}

fn parse_delimiter(value: &str) -> Result<char, String> {
    match value {
        "tab" | "\\t" => return Ok('\t'),
        "space" => return Ok(' '),
        _ => {}
    }

    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!(
            "delimiter must be a single character, 'tab' or 'space', got '{}'",
            value
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("conntop").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--match", "128.252.", "conn.log"]).unwrap();
        assert_eq!(cli.file, "conn.log");
        assert_eq!(cli.matches, vec!["128.252."]);
        assert_eq!(cli.top, 10);
        assert_eq!(cli.block_size, 64 * 1024);
        assert_eq!(cli.parsers, 6);
        assert_eq!(cli.reducers, 2);
        assert_eq!(cli.queue_capacity, 10_000);
        assert_eq!(cli.delimiter, '\t');
        assert_eq!(cli.comment_marker, "#");
        assert_eq!((cli.origin_field, cli.responder_field), (2, 4));
        assert_eq!(cli.bytes_fields, vec![16, 18]);
        assert_eq!(cli.output_format, ReportFormat::Text);
        assert_eq!(cli.progress_interval, Duration::from_millis(500));
        assert!(!cli.progress && !cli.stats && !cli.debug);
    }

    #[test]
    fn test_match_is_required() {
        assert!(parse(&["conn.log"]).is_err());
    }

    #[test]
    fn test_match_values_split_on_comma_and_repeat() {
        let cli = parse(&["-m", "10.0.0.0/8,192.168.", "-m", "172.16.", "-"]).unwrap();
        assert_eq!(cli.matches, vec!["10.0.0.0/8", "192.168.", "172.16."]);
        assert_eq!(cli.file, "-");
    }

    #[test]
    fn test_schema_and_output_flags() {
        let cli = parse(&[
            "-m",
            "a",
            "--delimiter",
            ",",
            "--bytes-fields",
            "3,5,7",
            "-F",
            "json",
            "--progress-interval",
            "2s",
            "x.csv",
        ])
        .unwrap();
        assert_eq!(cli.delimiter, ',');
        assert_eq!(cli.bytes_fields, vec![3, 5, 7]);
        assert_eq!(cli.output_format, ReportFormat::Json);
        assert_eq!(cli.progress_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("tab"), Ok('\t'));
        assert_eq!(parse_delimiter("\\t"), Ok('\t'));
        assert_eq!(parse_delimiter("space"), Ok(' '));
        assert_eq!(parse_delimiter("|"), Ok('|'));
        assert!(parse_delimiter("||").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn test_later_flag_overrides_earlier() {
        // config-file defaults come first on the command line
        let cli = parse(&["--top", "3", "-m", "a", "--top", "7", "f"]).unwrap();
        assert_eq!(cli.top, 7);
    }
}
