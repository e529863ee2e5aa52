//! qos-policy-exchange: replay tool for the policy exchange
//!
//! Runs a JSON script of exchange events against a fresh exchange and
//! prints every emitted response and requested dump as one JSON line on
//! stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Replay a script with default settings
//! qos-policy-exchange -s session.json
//!
//! # Replay with a custom configuration
//! qos-policy-exchange -c /path/to/config.json -s session.json
//!
//! # Run with environment overrides
//! QOS_EXCHANGE_LOG_LEVEL=debug qos-policy-exchange -s session.json
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use qos_policy_exchange::config::{create_default_config, load_config_with_env, Config};
use qos_policy_exchange::replay::{load_script, run_script};

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Replay script path
    script_path: Option<PathBuf>,
    /// Generate default configuration
    generate_config: bool,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = None;
        let mut script_path = None;
        let mut generate_config = false;
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = Some(PathBuf::from(path));
                    }
                }
                "-s" | "--script" => {
                    if let Some(path) = args.next() {
                        script_path = Some(PathBuf::from(path));
                    }
                }
                "-g" | "--generate-config" => {
                    generate_config = true;
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("qos-policy-exchange v{}", qos_policy_exchange::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            script_path,
            generate_config,
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"qos-policy-exchange v{}

Replays a scripted QoS policy exchange session.

USAGE:
    qos-policy-exchange [OPTIONS] -s <SCRIPT>

OPTIONS:
    -c, --config <PATH>     Configuration file path [default: built-in defaults]
    -s, --script <PATH>     Replay script (JSON array of events)
    -g, --generate-config   Write a default configuration to --config and exit
    --check                 Check configuration (and script, if given) and exit
    -h, --help              Print help information
    -v, --version           Print version information

ENVIRONMENT:
    QOS_EXCHANGE_INTERFACE          Override the reset interface
    QOS_EXCHANGE_STALL_TIMEOUT_MS   Override the stall deadline
    QOS_EXCHANGE_LOG_LEVEL          Override log level (trace, debug, info, warn, error)

SCRIPT EVENTS:
    {{"type":"attach","consumer":"<name>"}}
    {{"type":"detach"}}
    {{"type":"submit","dialog_token":<i32>,"operations":[...]}}
    {{"type":"outcome","rule_id":<u8>,"status":"success"}}
    {{"type":"wait","ms":<u64>}}
    {{"type":"dump"}}
"#,
        qos_policy_exchange::VERSION
    );
}

/// Initialize logging on stderr
fn init_logging(config: &Config) {
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "tokio=warn".parse() {
        filter = filter.add_directive(directive);
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.log.target)
        .with_writer(std::io::stderr);

    match (config.log.format == "json", config.log.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.json().without_time().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    if args.generate_config {
        let path = args
            .config_path
            .context("--generate-config requires --config <PATH>")?;
        create_default_config(&path)?;
        println!("Generated default configuration at {path:?}");
        return Ok(());
    }

    let config = match &args.config_path {
        Some(path) => load_config_with_env(path)
            .with_context(|| format!("Failed to load configuration from {path:?}"))?,
        None => Config::default_config(),
    };

    let events = match &args.script_path {
        Some(path) => Some(
            load_script(path).with_context(|| format!("Failed to load script from {path:?}"))?,
        ),
        None => None,
    };

    if args.check_config {
        println!("Configuration is valid");
        if let Some(events) = &events {
            println!("Script is valid ({} events)", events.len());
        }
        return Ok(());
    }

    let Some(events) = events else {
        anyhow::bail!("No script given; use -s <PATH> (see --help)");
    };

    init_logging(&config);
    info!("qos-policy-exchange v{}", qos_policy_exchange::VERSION);

    let output = run_script(&config.exchange, events).await?;
    for line in &output {
        println!("{}", line.to_json()?);
    }

    info!(
        lines = output.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Replay finished"
    );
    Ok(())
}
