use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use shellyread::{BluestCentral, Config, NdjsonSink, Poller, Reading, RpcClient};
use tracing::info;

/// Monitor and control a Shelly device over Bluetooth Low Energy.
///
/// The device and data directories are configured through `SHELLY_*`
/// environment variables.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the device forever and append readings to daily NDJSON files (default)
    Monitor,
    /// Fetch the status once and print it as a reading
    Status,
    /// Print device information and configuration
    Info,
    /// Print the status of one switch, including any running auto-off timer
    SwitchStatus { id: u32 },
    /// Call an arbitrary RPC method and print its result
    Call {
        method: String,
        /// Parameters as a JSON object
        params: Option<String>,
    },
    /// Turn a switch on or off
    SwitchSet { id: u32, state: SwitchState },
    /// Enable the auto-off timer with a delay in seconds, or disable it with `off`
    AutoOff { id: u32, setting: AutoOff },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SwitchState {
    On,
    Off,
}

#[derive(Clone, Copy)]
enum AutoOff {
    Disabled,
    After(u32),
}

impl FromStr for AutoOff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(AutoOff::Disabled),
            secs => secs
                .parse()
                .map(AutoOff::After)
                .map_err(|_| format!("expected `off` or a number of seconds, got {s:?}")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    shellyread::logging::init(config.log_dir.as_deref()).context("failed to set up logging")?;

    let central = BluestCentral::new().await.context("bluetooth adapter unavailable")?;
    let client = Arc::new(RpcClient::new(central, config.address.clone()).with_connect_timeout(config.connect_timeout));
    let timeout = config.call_timeout;

    match cli.command.unwrap_or(Command::Monitor) {
        Command::Monitor => monitor(client.clone(), &config).await?,
        Command::Status => {
            let status = client.get_status(timeout).await?;
            let reading = Reading::from_status(client.address(), Utc::now(), &status);
            println!("{}", serde_json::to_string_pretty(&reading)?);
        }
        Command::Info => {
            let info = client.get_device_info(timeout).await?;
            let config = client.get_config(timeout).await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "info": info, "config": config }))?);
        }
        Command::SwitchStatus { id } => {
            let status = client.switch_get_status(id, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Call { method, params } => {
            let params = params
                .map(|p| serde_json::from_str::<Value>(&p))
                .transpose()
                .context("params must be JSON")?;
            let result = client.call(&method, params, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::SwitchSet { id, state } => {
            let result = client.switch_set(id, matches!(state, SwitchState::On), timeout).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::AutoOff { id, setting } => {
            let patch = match setting {
                AutoOff::Disabled => json!({ "auto_off": false }),
                AutoOff::After(delay) if delay > 0 => json!({ "auto_off": true, "auto_off_delay": delay }),
                AutoOff::After(_) => return Err(anyhow!("auto-off delay must be positive")),
            };
            client.switch_set_config(id, patch, timeout).await?;
            let current = client.switch_get_config(id, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
    }

    client.disconnect().await;
    Ok(())
}

async fn monitor(client: Arc<RpcClient<BluestCentral>>, config: &Config) -> anyhow::Result<()> {
    let sink = NdjsonSink::new(&config.data_dir);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.address,
        interval = ?config.interval,
        data_dir = %sink.dir().display(),
        "starting shelly monitoring service"
    );

    let mut poller = Poller::new(client, sink, config.poll_settings());
    tokio::select! {
        _ = poller.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupt received, shutting down");
        }
    }
    Ok(())
}
