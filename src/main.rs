use clap::Parser;
use env_logger::Env;
use std::io;

use conntop::config_file::ConfigFile;
use conntop::platform::ExitCode;
use conntop::{runner, Cli, ConntopConfig};

fn main() {
    let cli = process_args_with_config();

    let default_filter = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let config = match ConntopConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("conntop: Error: {}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    let stdout = io::stdout();
    match runner::run_with_config(&config, stdout.lock()) {
        Ok(summary) => {
            if config.output.stats {
                eprintln!("{}", summary.stats.format_stats(summary.matched_keys));
            }
            ExitCode::Success.exit();
        }
        Err(e) => {
            eprintln!("conntop: Error: {:#}", e);
            ExitCode::for_error(&e).exit();
        }
    }
}

fn extract_config_file_arg(args: &[String]) -> Option<String> {
    args.iter().enumerate().find_map(|(i, arg)| {
        if arg == "--config-file" {
            args.get(i + 1).cloned()
        } else {
            arg.strip_prefix("--config-file=").map(str::to_string)
        }
    })
}

/// Apply config-file defaults and aliases, then parse with clap.
///
/// `--show-config` is handled here because it must work without an input file.
fn process_args_with_config() -> Cli {
    let raw_args: Vec<String> = std::env::args().collect();
    let config_file_path = extract_config_file_arg(&raw_args);
    let ignore_config = raw_args.iter().any(|arg| arg == "--ignore-config");

    let loaded = if ignore_config {
        Ok(ConfigFile::default())
    } else {
        ConfigFile::load_with_custom_path(config_file_path.as_deref())
    };
    let config_file = match loaded {
        Ok(config_file) => config_file,
        Err(e) => {
            eprintln!("conntop: Config file error: {:#}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    if raw_args.iter().any(|arg| arg == "--show-config") {
        if let Err(e) = config_file.show_config(io::stdout().lock()) {
            eprintln!("conntop: Error: {}", e);
            ExitCode::GeneralError.exit();
        }
        ExitCode::Success.exit();
    }

    let processed_args = match config_file.process_args(raw_args) {
        Ok(processed) => processed,
        Err(e) => {
            eprintln!("conntop: Config error: {}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    // clap exits with 2 on usage errors and 0 for --help/--version
    Cli::try_parse_from(processed_args).unwrap_or_else(|e| e.exit())
}
