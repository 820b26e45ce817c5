use anyhow::{Context, Result};
use clap::{Arg, Command};
use locker_auth::{AuthResult, Authenticator, Config};
use std::io::BufRead;
use tracing::{error, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("locker-auth")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Checks a password read from stdin against PAM for the current user")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("locker-auth.yml"),
        )
        .arg(
            Arg::new("generate-config")
                .short('g')
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .conflicts_with("config"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .help("Enable verbose logging")
                .action(clap::ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .help("Suppress all output except errors")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .get_matches();

    if let Some(config_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(config_path)?;
        return Ok(());
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("locker-auth.yml");

    let (config, load_error) = if std::path::Path::new(config_path).exists() {
        match Config::load_from_file(config_path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    } else {
        (Config::default(), None)
    };

    setup_logging(&config, &matches)?;

    if let Some(e) = load_error {
        warn!("Failed to load configuration from {}: {:#}", config_path, e);
        warn!("Using default configuration. Run with --generate-config to create a template.");
    }

    let password = read_password().context("Failed to read password from stdin")?;
    let verdict = check(&config, &password).await;

    match verdict {
        AuthResult::AuthSucceeded => info!("Password accepted"),
        AuthResult::AuthFailed => info!("Password rejected"),
        AuthResult::InternalError => error!("Password could not be checked"),
    }

    std::process::exit(verdict.exit_code());
}

#[cfg(feature = "pam-auth")]
async fn check(config: &Config, password: &str) -> AuthResult {
    let checker = locker_auth::auth::pam::system_checker(config.auth.refresh_credentials);
    Authenticator::check_password(&checker, password).await
}

#[cfg(not(feature = "pam-auth"))]
async fn check(_config: &Config, _password: &str) -> AuthResult {
    error!("Built without the pam-auth feature; no authentication backend available");
    AuthResult::InternalError
}

/// Reads one line and strips the line terminator only.
fn read_password() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}

fn generate_default_config(path: &str) -> Result<()> {
    let config = Config::default();
    config.save_to_file(path)?;

    println!("Generated default configuration file: {}", path);
    println!("Edit this file to customize the password checker settings.");

    Ok(())
}

fn setup_logging(config: &Config, matches: &clap::ArgMatches) -> Result<()> {
    let log_level = if matches.get_flag("quiet") {
        Level::ERROR
    } else {
        match matches.get_count("verbose") {
            0 => match config.logging.level.as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            },
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let journald_layer = if config.logging.journald {
        Some(tracing_journald::layer().context("Failed to connect to journald")?)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(log_level))
        .with(fmt_layer)
        .with(journald_layer)
        .try_init()?;

    Ok(())
}
