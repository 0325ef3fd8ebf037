//! Provisor CLI - staged remote provisioning for embedded network devices

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use provisor_core::application::{cancel_channel, Orchestrator, ServiceProber};
use provisor_core::domain::{Credentials, PipelineState, RunOutcome, Settings, Target};
use provisor_core::error::PipelineError;
use provisor_core::port::observer::ProgressObserver;
use provisor_core::port::prober::PortProber;
use provisor_core::port::time_provider::SystemTimeProvider;
use provisor_core::port::transport::Transport;
use provisor_core::port::{CredentialStore, DeviceGateway};
use provisor_infra_net::{HttpDeviceGateway, HttpTransport, TcpProber};
use provisor_infra_store::JsonFileCredentialStore;

const DEFAULT_CACHE_PATH: &str = ".provisor/credentials.json";

// Exit codes, one per failure cause so scripts can branch on them.
const EXIT_AUTH: i32 = 2;
const EXIT_BUILD: i32 = 3;
const EXIT_TRANSPORT: i32 = 4;
const EXIT_TIMEOUT: i32 = 5;
const EXIT_CANCELLED: i32 = 6;

#[derive(Parser)]
#[command(name = "provisor")]
#[command(about = "Staged remote provisioning pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug-level detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline against a target
    Run(RunArgs),

    /// Drop the cached credential for a target
    CacheClear {
        /// Target host address
        #[arg(long)]
        host: String,

        /// Account name the credential was cached under
        #[arg(long)]
        username: Option<String>,

        #[arg(long, env = "PROVISOR_CACHE_PATH", default_value = DEFAULT_CACHE_PATH)]
        cache_path: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Target host address
    #[arg(long)]
    host: String,

    /// Service ports that must come up, comma separated
    #[arg(long, value_delimiter = ',', default_value = "22,23,21")]
    ports: Vec<u16>,

    /// Device account name
    #[arg(long)]
    username: Option<String>,

    /// Device password
    #[arg(long, env = "PROVISOR_PASSWORD")]
    password: Option<String>,

    /// Payload file to include in the delivery artifact (repeatable)
    #[arg(long = "payload", required = true)]
    payloads: Vec<PathBuf>,

    /// Settings preset
    #[arg(long, value_enum, default_value_t = Preset::Standard)]
    preset: Preset,

    /// Transport retry attempts
    #[arg(long)]
    retries: Option<i64>,

    /// Delay between transport retries, ms
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Overall request / probe-round timeout, seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Connection timeout, seconds
    #[arg(long)]
    connect_timeout_secs: Option<u64>,

    /// Total time to wait for services, seconds
    #[arg(long)]
    max_service_wait_secs: Option<u64>,

    /// Simultaneous in-flight probe attempts
    #[arg(long)]
    max_concurrency: Option<usize>,

    #[arg(long, env = "PROVISOR_CACHE_PATH", default_value = DEFAULT_CACHE_PATH)]
    cache_path: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Standard,
    Aggressive,
    Conservative,
}

#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "PORT")]
    port: u16,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "LATENCY")]
    latency: String,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

/// Prints one line per pipeline transition with elapsed timing.
struct ConsoleObserver {
    quiet: bool,
}

impl ProgressObserver for ConsoleObserver {
    fn on_transition(&self, state: &PipelineState, elapsed: Duration) {
        if self.quiet {
            return;
        }
        println!(
            "{} {} (+{:.1}s)",
            "->".dimmed(),
            state.to_string().bold(),
            elapsed.as_secs_f64()
        );
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default = if quiet {
        "provisor=warn"
    } else if verbose {
        "provisor=debug"
    } else {
        "provisor=info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .expect("Failed to create env filter");
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().compact())
        .init();
}

fn build_settings(args: &RunArgs) -> Result<Settings> {
    let preset = match args.preset {
        Preset::Standard => Settings::standard(),
        Preset::Aggressive => Settings::aggressive(),
        Preset::Conservative => Settings::conservative(),
    };
    let mut builder = preset.builder();
    if let Some(retries) = args.retries {
        builder = builder.retries(retries);
    }
    if let Some(ms) = args.retry_delay_ms {
        builder = builder.retry_delay(Duration::from_millis(ms));
    }
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.connect_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.max_service_wait_secs {
        builder = builder.max_service_wait(Duration::from_secs(secs));
    }
    if let Some(n) = args.max_concurrency {
        builder = builder.max_concurrency(n);
    }
    builder.build().context("invalid settings")
}

async fn load_payload_files(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("payload path has no usable file name: {}", path.display()))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read payload file {}", path.display()))?;
        files.push((name, bytes));
    }
    Ok(files)
}

fn print_outcome(outcome: &RunOutcome, quiet: bool) {
    if !outcome.ports.is_empty() {
        let rows: Vec<PortRow> = outcome
            .ports
            .iter()
            .map(|r| PortRow {
                port: r.port,
                status: if r.reachable {
                    "open".green().to_string()
                } else {
                    "unreachable".red().to_string()
                },
                latency: format!("{:.0?}", r.latency),
                detail: r.error.clone().unwrap_or_default(),
            })
            .collect();
        println!("{}", Table::new(rows));
    }

    match &outcome.failure {
        None => {
            if !quiet {
                println!(
                    "{} in {:.1}s",
                    "Provisioning succeeded".green().bold(),
                    outcome.elapsed.as_secs_f64()
                );
            }
        }
        Some(failure) => {
            eprintln!(
                "{} in state {} after {:.1}s: {}",
                "Provisioning failed".red().bold(),
                failure.failed_in.to_string().bold(),
                outcome.elapsed.as_secs_f64(),
                failure.cause
            );
        }
    }
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match &outcome.failure {
        None => 0,
        Some(failure) => match failure.cause {
            PipelineError::Auth(_) => EXIT_AUTH,
            PipelineError::Build(_) => EXIT_BUILD,
            PipelineError::Transport(_) => EXIT_TRANSPORT,
            PipelineError::Timeout(_) => EXIT_TIMEOUT,
            PipelineError::Cancelled => EXIT_CANCELLED,
            PipelineError::Domain(_) => 1,
        },
    }
}

async fn run_pipeline(args: RunArgs, quiet: bool) -> Result<i32> {
    let settings = build_settings(&args)?;
    let credentials = match (&args.username, &args.password) {
        (Some(user), Some(pass)) => Some(Credentials::new(user, pass)),
        (None, None) => None,
        _ => anyhow::bail!("--username and --password must be supplied together"),
    };
    let target = Target::new(args.host.clone(), args.ports.iter().copied(), credentials)
        .context("invalid target")?;
    let payload_files = load_payload_files(&args.payloads).await?;

    let time_provider = Arc::new(SystemTimeProvider);
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(target.host(), settings.clone())
            .map_err(|e| anyhow::anyhow!("transport setup failed: {e}"))?,
    );
    let gateway: Arc<dyn DeviceGateway> = Arc::new(HttpDeviceGateway::new(transport));
    let store: Arc<dyn CredentialStore> = Arc::new(
        JsonFileCredentialStore::open(&args.cache_path, time_provider.clone()).await,
    );
    let prober = ServiceProber::new(
        Arc::new(TcpProber) as Arc<dyn PortProber>,
        settings.clone(),
    );
    let observer = Arc::new(ConsoleObserver { quiet });

    let orchestrator = Orchestrator::new(
        target,
        settings,
        gateway,
        store,
        prober,
        observer,
        time_provider,
    );

    let (cancel_handle, cancel_token) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling run...");
            cancel_handle.cancel();
        }
    });

    let outcome = orchestrator.run(payload_files, cancel_token).await;
    print_outcome(&outcome, quiet);
    Ok(exit_code(&outcome))
}

async fn clear_cache(
    host: String,
    username: Option<String>,
    cache_path: PathBuf,
    quiet: bool,
) -> Result<()> {
    let key = match username {
        Some(user) => format!("{user}@{host}"),
        None => host,
    };
    let store =
        JsonFileCredentialStore::open(&cache_path, Arc::new(SystemTimeProvider)).await;
    store
        .invalidate(&key)
        .await
        .map_err(|e| anyhow::anyhow!("cache clear failed: {e}"))?;
    if !quiet {
        println!("Cleared cached credential for {key}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let code = run_pipeline(args, cli.quiet).await?;
            std::process::exit(code);
        }
        Commands::CacheClear {
            host,
            username,
            cache_path,
        } => clear_cache(host, username, cache_path, cli.quiet).await,
    }
}
