use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gatesync_core::{ControllerResources, ResourceStatus};
use gatesync_ir::{GatewayIr, InfraIr, XdsIr};
use gatesync_runner::config::{Telemetry, DEFAULT_LOG_FILTER};
use gatesync_runner::{CacheSlot, Reconciler, Runner, RunnerConfig, ServerConfig, RUNNER_NAME};
use gatesync_store::{ErrorSink, Metadata, ProviderResources, Watchable};
use gatesync_translate::GatewayTranslator;
use metrics::counter;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gatesyncd", version, about = "gatesync gateway-api runner")]
struct Cli {
    /// Server configuration file (YAML)
    #[arg(long = "config", env = "GATESYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the runner, publishing each snapshot file as one generation
    Run {
        /// Snapshot files (YAML list of bundles), applied in order
        snapshots: Vec<PathBuf>,
        /// Pause between snapshots
        #[arg(long = "interval-ms", default_value_t = 0)]
        interval_ms: u64,
    },
    /// Reconcile one snapshot against empty stores and print the result
    Translate {
        snapshot: PathBuf,
    },
}

fn init_tracing(telemetry: &Telemetry) {
    let filter = tracing_subscriber::EnvFilter::from_str(&telemetry.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(telemetry: &Telemetry) {
    let Some(addr) = telemetry.metrics_addr else { return };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(%addr, "Prometheus metrics exporter listening"),
        Err(e) => warn!(error = %e, "failed to install metrics exporter"),
    }
}

fn read_snapshot(path: &Path) -> Result<ControllerResources> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parse snapshot {}", path.display()))
}

struct Stores {
    provider: Arc<ProviderResources>,
    xds: Arc<Watchable<String, XdsIr>>,
    infra: Arc<Watchable<String, InfraIr>>,
}

impl Stores {
    fn new() -> Self {
        Self {
            provider: Arc::new(ProviderResources::new()),
            xds: Arc::new(Watchable::new()),
            infra: Arc::new(Watchable::new()),
        }
    }
}

fn accepted_column(st: &ResourceStatus) -> &'static str {
    if st.is_true(gatesync_core::status::CONDITION_ACCEPTED) {
        "True"
    } else {
        "False"
    }
}

async fn run(server: ServerConfig, snapshots: Vec<PathBuf>, interval: Duration) -> Result<()> {
    let stores = Stores::new();
    let controller = server.gateway.controller_name.clone();
    let runner = Runner::new(RunnerConfig {
        server,
        provider_resources: Arc::clone(&stores.provider),
        xds_ir: Arc::clone(&stores.xds),
        infra_ir: Arc::clone(&stores.infra),
        translator: Arc::new(GatewayTranslator::new()),
        cache: CacheSlot::new(),
    });
    let cancel = CancellationToken::new();
    let tasks = runner.start(cancel.clone());

    let printer = tokio::spawn({
        let mut updates = stores.xds.subscribe();
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe = updates.recv() => match maybe {
                        Some(u) if u.is_delete() => println!("- {}", u.key),
                        Some(u) => println!("+ {}", u.key),
                        None => break,
                    },
                }
            }
        }
    });

    for path in &snapshots {
        let snap = read_snapshot(path)?;
        info!(runner = RUNNER_NAME, file = %path.display(), bundles = snap.len(), "publishing snapshot");
        stores.provider.gateway_api_resources.store(controller.clone(), snap);
        counter!("gatesync_snapshots_published_total", 1);
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("Ctrl-C received; shutting down");
    cancel.cancel();
    tasks.join().await;
    let _ = printer.await;
    Ok(())
}

fn translate(server: &ServerConfig, snapshot: &Path, output: Output) -> Result<()> {
    let snap = read_snapshot(snapshot)?;
    let stores = Stores::new();
    let reconciler = Reconciler::new(
        RUNNER_NAME,
        Arc::clone(&stores.provider),
        Arc::clone(&stores.xds),
        Arc::clone(&stores.infra),
        Arc::new(GatewayTranslator::new()),
    );
    let (sink, mut errors) = ErrorSink::channel(Metadata::new(RUNNER_NAME, "translate"), 1024);
    let summary = reconciler.apply_snapshot(&snap, &server.flags(), None, &sink);
    drop(sink);
    let mut error_lines = Vec::new();
    while let Ok(e) = errors.try_recv() {
        error_lines.push(format!("{e:#}"));
    }

    let mut keys = stores.xds.keys();
    keys.sort();
    let mut statuses: Vec<_> = stores
        .provider
        .statuses
        .iter()
        .flat_map(|(kind, store)| store.load_all().into_iter().map(move |(k, v)| (kind, k, v)))
        .collect();
    statuses.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    match output {
        Output::Human => {
            println!("IR ({} published, {} failed)", summary.ir_published, summary.ir_failed);
            for k in &keys {
                println!("  {k}");
            }
            println!("{:<22} {:<32} ACCEPTED", "KIND", "NAME");
            for (kind, key, st) in &statuses {
                println!("{:<22} {:<32} {}", kind.as_str(), key.to_string(), accepted_column(st));
            }
            for e in &error_lines {
                println!("error: {e}");
            }
        }
        Output::Json => {
            let mut ir = serde_json::Map::new();
            for k in &keys {
                let (Some(xds), Some(infra)) = (stores.xds.load(k), stores.infra.load(k)) else { continue };
                let entry = GatewayIr { infra: (*infra).clone(), xds: (*xds).clone() };
                ir.insert(k.clone(), serde_json::to_value(&entry)?);
            }
            let statuses: Vec<_> = statuses
                .iter()
                .map(|(kind, key, st)| serde_json::json!({ "kind": kind, "key": key.to_string(), "status": &**st }))
                .collect();
            let out = serde_json::json!({ "ir": ir, "statuses": statuses, "errors": error_lines });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let server = ServerConfig::load(cli.config.as_deref())?;
    init_tracing(&server.telemetry);
    init_metrics(&server.telemetry);
    info!(namespace = %server.namespace, controller = %server.gateway.controller_name, "loaded configuration");

    match cli.command {
        Commands::Run { snapshots, interval_ms } => run(server, snapshots, Duration::from_millis(interval_ms)).await,
        Commands::Translate { snapshot } => translate(&server, &snapshot, cli.output),
    }
}
