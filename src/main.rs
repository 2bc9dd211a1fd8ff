use std::process::ExitCode;
use vault_scraper::config::Config;
use vault_scraper::error::{ConfigError, Result};
use vault_scraper::logging::{init_logging, LoggerConfig};
use vault_scraper::pipeline::{self, TargetKind};
use vault_scraper::{log_error, log_info, log_warn};

const USAGE: &str = "usage: vault-scraper [config.toml] <bundles|keys|summary <bundles|keys>|lessons>";

enum Command {
    Scrape(TargetKind),
    Summary(TargetKind),
    Lessons,
}

fn parse_args(args: &[String]) -> std::result::Result<(String, Command), String> {
    let (config_path, rest) = match args.first() {
        Some(first) if first.ends_with(".toml") => (first.clone(), &args[1..]),
        _ => ("config.toml".to_string(), args),
    };

    let target = |arg: Option<&String>| -> std::result::Result<TargetKind, String> {
        arg.ok_or_else(|| USAGE.to_string())?
            .parse()
            .map_err(|e: ConfigError| e.to_string())
    };

    let command = match rest.first().map(String::as_str) {
        Some("summary") => Command::Summary(target(rest.get(1))?),
        Some("lessons") => Command::Lessons,
        Some(_) => Command::Scrape(target(rest.first())?),
        None => return Err(USAGE.to_string()),
    };
    Ok((config_path, command))
}

async fn run(config: &Config, command: Command) -> Result<bool> {
    match command {
        Command::Scrape(kind) => {
            let report = pipeline::run_scrape(config, kind).await?;
            log_info!(
                "[main] {}: {} items over {} page(s) ({}), save took {} attempt(s)",
                report.target,
                report.items,
                report.pages,
                report.stop,
                report.save.attempts
            );
            if !report.mismatches.is_empty() {
                log_warn!("[main] {} verification mismatches", report.mismatches.len());
            }
            Ok(!report.is_failed())
        }
        Command::Summary(kind) => {
            pipeline::summary(config, kind)?;
            Ok(true)
        }
        Command::Lessons => {
            pipeline::run_lessons(config).await?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, command) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = LoggerConfig::from_config(&config.logging).and_then(init_logging) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    log_info!("[main] Starting with {}", config_path);
    match run(&config, command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            log_error!("[main] Run finished but the data only reached the emergency file");
            ExitCode::FAILURE
        }
        Err(e) => {
            log_error!(e => "[main] Run failed");
            ExitCode::FAILURE
        }
    }
}
