//! Deployment servicer keeps a Service for every Deployment that asks for one.
#![deny(missing_docs)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use deployment_servicer::{
    labels::DEFAULT_SERVICED_LABEL,
    retry::RetryConfig,
    servicer,
    utils::Context,
    watch::WatchConfig,
    Config,
};
use kube::Client;
use servicer_common::telemetry::{self, Verbosity};
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Label key that opts a deployment in.
    #[arg(short = 'f', long = "flag", env = "SERVICER_LABEL", default_value = DEFAULT_SERVICED_LABEL)]
    label: String,

    /// Reserved service port override.
    #[arg(long, env = "SERVICER_PORT")]
    port: Option<i32>,

    /// Reserved target port override.
    #[arg(long, env = "SERVICER_TARGET_PORT")]
    target_port: Option<i32>,

    /// Log verbosity: 0 debug, 1 info, 2 warning, 3 error, 4 critical.
    #[arg(
        short,
        long,
        env = "SERVICER_VERBOSE",
        default_value_t = 2,
        value_parser = clap::value_parser!(u8).range(0..=4)
    )]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SERVICER_LOG_JSON")]
    log_json: bool,

    /// Attempts per event before it is dropped.
    #[arg(
        long,
        env = "SERVICER_RETRY_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    retry_attempts: u32,

    /// Seconds after which a restarted watch lists again instead of resuming.
    #[arg(long, env = "SERVICER_RESYNC_PERIOD", default_value_t = 300)]
    resync_period: u64,

    /// Server side timeout of a single watch request in seconds.
    #[arg(
        long,
        env = "SERVICER_WATCH_TIMEOUT",
        default_value_t = 290,
        value_parser = clap::value_parser!(u32).range(1..295)
    )]
    watch_timeout: u32,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            label_key: self.label.clone(),
            port: self.port,
            target_port: self.target_port,
            retry: RetryConfig {
                max_attempts: self.retry_attempts,
                ..Default::default()
            },
            watch: WatchConfig {
                timeout_secs: self.watch_timeout,
                resync_period: Duration::from_secs(self.resync_period),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let verbosity = Verbosity::try_from(args.verbose)?;
    telemetry::init(verbosity, args.log_json)?;

    let config = args.config();
    info!(
        label = %config.label_key,
        port = ?config.port,
        target_port = ?config.target_port,
        %verbosity,
        "starting deployment-servicer"
    );

    let k_client = Client::try_default().await?;
    let cx = Arc::new(Context::new(k_client, config)?);
    let cancel = CancellationToken::new();

    let mut servicer_handle = tokio::spawn(servicer::run(cx, cancel.child_token()));
    let mut shutdown_handle = tokio::spawn(shutdown_signal());
    tokio::select! {
        h = &mut servicer_handle => exit("servicer", h),
        s = &mut shutdown_handle => {
            if let Ok(Err(e)) = s {
                error!("signal handler failed: {e}");
            }
            cancel.cancel();
            exit("servicer", servicer_handle.await);
        }
    }
    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            info!("captured ctrl_c signal");
        }
        _ = terminate.recv() => info!("captured terminate signal"),
    }
    Ok(())
}

fn exit(task: &str, out: Result<(), JoinError>) {
    match out {
        Ok(()) => info!("{task} exited"),
        Err(e) => error!("{task} task failed to complete: {e}"),
    }
}
