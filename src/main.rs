use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::error;
use patprobe::{
    config::{Config, DEFAULT_COOLDOWN_SECS, DEFAULT_TIMEOUT_SECS},
    probe::{self, ProbeResponse},
};
use serde_json::Value;

/// patprobe - GitHub token pool liveness probe
///
/// Tokens are read from PAT_1, PAT_2, ... in order, stopping at the first
/// unset variable. The probe prints the headers and the JSON body a
/// `/status/up` endpoint would serve: `true` while any token works, `false`
/// once every token is rate limited or rejected.
///
/// Examples:
///   PAT_1=ghp_xxx patprobe up              # Probe once
///   PAT_1=ghp_xxx patprobe up --watch 60   # Probe every minute
#[derive(Parser, Debug)]
#[command(author, version = env!("PATPROBE_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GitHub API URL (defaults to https://api.github.com; also via PATPROBE_API_URL)
    #[arg(
        long = "api-url",
        env = "PATPROBE_API_URL",
        value_name = "URL",
        global = true
    )]
    pub api_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout: u64,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check whether the token pool can still authenticate
    Up(UpArgs),
}

#[derive(clap::Args, Debug)]
pub struct UpArgs {
    /// Keep probing, pausing this many seconds between probes
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub watch: Option<u64>,

    /// Seconds before a rate-limited token is tried again (only matters with --watch)
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub cooldown: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = patprobe::runtime::RealRuntime;

    match cli.command {
        Commands::Up(args) => {
            let config = Config::new(
                &runtime,
                cli.api_url,
                Duration::from_secs(cli.timeout),
                Duration::from_secs(args.cooldown),
            )?;

            match args.watch {
                None => probe_once(&config).await?,
                Some(interval) => loop {
                    // Keep watching through upstream incidents; they are logged by the probe.
                    if let Err(e) = probe_once(&config).await {
                        error!("{:#}", e);
                    }
                    tokio::time::sleep(Duration::from_secs(interval)).await;
                },
            }
        }
    }
    Ok(())
}

async fn probe_once(config: &Config) -> Result<()> {
    let mut response = ProbeResponse::default();
    let result = probe::up(
        &mut response,
        &config.retryer,
        &config.github,
        &Value::Object(Default::default()),
    )
    .await;

    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    result?;

    if let Some(body) = response.body {
        println!();
        println!("{}", body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_up_parsing() {
        let cli = Cli::try_parse_from(["patprobe", "up"]).unwrap();
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.watch, None);
                assert_eq!(args.cooldown, DEFAULT_COOLDOWN_SECS);
            }
        }
        assert_eq!(cli.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_cli_watch_parsing() {
        let cli =
            Cli::try_parse_from(["patprobe", "up", "--watch", "60", "--cooldown", "120"]).unwrap();
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.watch, Some(60));
                assert_eq!(args.cooldown, 120);
            }
        }
    }

    #[test]
    fn test_cli_watch_rejects_zero_interval() {
        let result = Cli::try_parse_from(["patprobe", "up", "--watch", "0"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["patprobe", "up", "--watch", "1"]).unwrap();
        match cli.command {
            Commands::Up(args) => assert_eq!(args.watch, Some(1)),
        }
    }

    #[test]
    fn test_cli_cooldown_belongs_to_up() {
        let result = Cli::try_parse_from(["patprobe", "--cooldown", "10", "up"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_global_api_url_parsing() {
        let cli = Cli::try_parse_from([
            "patprobe",
            "--api-url",
            "http://localhost:1234",
            "up",
            "--timeout",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:1234"));
        assert_eq!(cli.timeout, 3);
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        let result = Cli::try_parse_from(["patprobe"]);
        assert!(result.is_err());
    }
}
