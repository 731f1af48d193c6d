use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use guildtalk::{BotSettings, CoordinatorOptions, config::BASELINE_MODEL};
use std::path::PathBuf;

/// Runtime configuration for the `guildtalk-tonic-server` binary.
///
/// Every value can come from a CLI flag or from the environment (a `.env`
/// file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "guildtalk-tonic-server",
    version,
    about = "A gRPC service hosting per-guild text generation sessions"
)]
pub struct CliArgs {
    /// Directory holding one sub-directory per installed model.
    ///
    /// Environment variable: `MODELS_DIR`
    #[arg(long, env = "MODELS_DIR", default_value = "models")]
    pub models_dir: PathBuf,

    /// Upper bound on `nsamples * length` accepted by `setconfig`.
    ///
    /// `debugsetconfig` and `default` are not bound by it.
    ///
    /// Environment variable: `COST_CEILING`
    #[arg(long, env = "COST_CEILING", default_value_t = 1000)]
    pub cost_ceiling: u64,

    /// `nsamples * length` above which a successful reconfiguration warns
    /// that generation will be slow.
    ///
    /// Environment variable: `WARN_THRESHOLD`
    #[arg(long, env = "WARN_THRESHOLD", default_value_t = 100)]
    pub warn_threshold: u64,

    /// Model restored by the `default` command.
    ///
    /// Environment variable: `BASELINE_MODEL`
    #[arg(long, env = "BASELINE_MODEL", default_value_t = String::from(BASELINE_MODEL))]
    pub baseline_model: String,

    /// Capacity of the reply buffer between a running command and its gRPC
    /// stream.
    ///
    /// A command waits once this many replies are unread by the adapter.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Jobs that may queue for the generation worker thread.
    ///
    /// Environment variable: `WORKER_QUEUE`
    #[arg(long, env = "WORKER_QUEUE", default_value_t = 16)]
    pub worker_queue: usize,

    /// Seconds to wait for the generation worker to stop on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/guildtalk.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub models_dir: PathBuf,
    pub bot: BotSettings,
    pub coordinator: CoordinatorOptions,
    pub stream_buffer_size: usize,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.cost_ceiling == 0 {
            bail!("COST_CEILING must be greater than 0");
        }

        if args.baseline_model.trim().is_empty() {
            bail!("BASELINE_MODEL must name a model");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.worker_queue == 0 {
            bail!("WORKER_QUEUE must be greater than 0");
        }

        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be at least one second");
        }

        Ok(Self {
            models_dir: args.models_dir,
            bot: BotSettings {
                cost_ceiling: args.cost_ceiling,
                baseline_model: args.baseline_model,
            },
            coordinator: CoordinatorOptions {
                worker_queue: args.worker_queue,
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
                warn_threshold: args.warn_threshold,
            },
            stream_buffer_size: args.stream_buffer_size,
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}
