//! Sensor Relay CLI
//!
//! Reads `topic payload` lines (e.g. from `mosquitto_sub -v`) on stdin and
//! writes derived `topic payload` lines to stdout. Logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sensor_relay::{
    collector::{CollectorConfig, LineCollector},
    config::Config,
    dispatch::Dispatcher,
    publish::{drain_outbox, source_id, Sink, StdoutSink},
    stats::create_shared_stats_with_persistence,
    VERSION,
};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use sensor_relay::{BlockingGatewayClient, GatewayConfig, GatewaySink};

/// How often counters are written to disk while running.
const STATS_SAVE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "sensor-relay")]
#[command(version = VERSION)]
#[command(about = "Per-period values from cumulative home-sensor readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay readings from stdin until end of input or Ctrl+C
    Run {
        /// Configuration file (defaults to the user config location)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Do not read stdin; only useful together with --serve
        #[arg(long)]
        no_stdin: bool,

        /// Accept readings over HTTP (requires server feature)
        #[arg(long)]
        serve: bool,

        /// HTTP port for --serve
        #[arg(long, default_value = "8787")]
        port: u16,

        /// Post publications to this gateway instead of stdout (requires gateway feature)
        #[arg(long)]
        gateway_url: Option<String>,

        /// Bearer token for the gateway
        #[arg(long)]
        gateway_token: Option<String>,
    },

    /// Show configured streams and cumulative statistics
    Status {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Write the default configuration to the config location
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            no_stdin,
            serve,
            port,
            gateway_url,
            gateway_token,
        } => cmd_run(config, no_stdin, serve, port, gateway_url, gateway_token),
        Commands::Status { config } => cmd_status(config),
        Commands::Config { init } => cmd_config(init),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sensor_relay=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    config.validate()?;
    Ok(config)
}

#[allow(unused_variables)]
fn cmd_run(
    config_path: Option<PathBuf>,
    no_stdin: bool,
    serve: bool,
    port: u16,
    gateway_url: Option<String>,
    gateway_token: Option<String>,
) -> anyhow::Result<()> {
    check_inputs(no_stdin, serve)?;
    init_logging();

    let config = load_config(config_path)?;
    tracing::info!(
        "Sensor Relay v{VERSION}: {} counter, {} presence, {} conversion streams",
        config.counters.len(),
        config.presence.len(),
        config.conversions.len()
    );

    // Presence timers (and the HTTP server) run here
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("starting runtime")?;

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let source = source_id(stats.instance_id());
    tracing::info!("Instance: {source}");

    let (outbox, published) = crossbeam_channel::unbounded();
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        outbox,
        runtime.handle().clone(),
        Arc::clone(&stats),
    ));

    #[allow(unused_mut)]
    let mut sink: Box<dyn Sink> = Box::new(StdoutSink::new());

    #[cfg(feature = "gateway")]
    if let Some(url) = gateway_url {
        let token = gateway_token.unwrap_or_default();
        let client = BlockingGatewayClient::new(GatewayConfig::new(url, token), source.clone())?;
        match client.test_connection() {
            Ok(true) => tracing::info!("Gateway connection: OK"),
            Ok(false) => tracing::warn!("Gateway health check failed"),
            Err(e) => tracing::warn!("Could not connect to gateway: {e}"),
        }
        sink = Box::new(GatewaySink::new(client));
    }
    #[cfg(not(feature = "gateway"))]
    if gateway_url.is_some() {
        eprintln!("Warning: --gateway-url ignored (gateway feature not enabled at compile time)");
    }

    #[cfg(feature = "server")]
    let server_shutdown = if serve {
        let server_config = sensor_relay::server::ServerConfig::new(port);
        let (addr, shutdown) = runtime
            .block_on(sensor_relay::server::run(server_config, Arc::clone(&dispatcher)))?;
        tracing::info!("Accepting readings on http://{addr}/ingest");
        Some(shutdown)
    } else {
        None
    };
    #[cfg(not(feature = "server"))]
    if serve {
        eprintln!("Warning: --serve ignored (server feature not enabled at compile time)");
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let mut collector = if no_stdin {
        None
    } else {
        let mut collector = LineCollector::stdin(CollectorConfig::default());
        collector.start()?;
        Some(collector)
    };
    let receiver = collector.as_ref().map(|c| c.receiver().clone());

    let mut last_stats_save = Instant::now();

    // Main relay loop
    while running.load(Ordering::SeqCst) {
        match &receiver {
            Some(receiver) if collector.is_some() => {
                match receiver.recv_timeout(Duration::from_millis(100)) {
                    Ok(message) => {
                        // failures are logged by the dispatcher; keep going
                        let _ = dispatcher.on_reading(
                            &message.topic,
                            message.timestamp(),
                            &message.payload,
                        );
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::info!("End of input");
                        collector = None;
                        if !serve {
                            break;
                        }
                    }
                }
            }
            _ => std::thread::sleep(Duration::from_millis(100)),
        }

        drain_outbox(&published, sink.as_mut(), &stats);

        if last_stats_save.elapsed() >= STATS_SAVE_INTERVAL {
            if let Err(e) = stats.save() {
                tracing::warn!("Could not save stats: {e}");
            }
            last_stats_save = Instant::now();
        }
    }

    if let Some(ref mut collector) = collector {
        collector.stop();
    }

    #[cfg(feature = "server")]
    if let Some(shutdown) = server_shutdown {
        let _ = shutdown.send(());
    }

    // Anything derived before shutdown still goes out
    drain_outbox(&published, sink.as_mut(), &stats);

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save stats: {e}");
    }

    eprintln!();
    eprintln!("{}", stats.summary());
    Ok(())
}

/// Reject `run` invocations that would have nothing to read from.
fn check_inputs(no_stdin: bool, serve: bool) -> anyhow::Result<()> {
    if no_stdin && !(serve && cfg!(feature = "server")) {
        anyhow::bail!("--no-stdin needs --serve (and the server feature) as an input source");
    }
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Sensor Relay Status");
    println!("===================");
    println!();

    println!("Streams:");
    for counter in &config.counters {
        let windows: Vec<String> = counter
            .windows
            .iter()
            .map(|w| format!("{}s", w.seconds))
            .collect();
        println!(
            "  [counter]    {} <- {} (windows: {})",
            counter.name,
            counter.input,
            windows.join(", ")
        );
    }
    for presence in &config.presence {
        println!(
            "  [presence]   {} <- {} (delay: {}s)",
            presence.name,
            presence.input,
            presence.delay.as_secs()
        );
    }
    for conversion in &config.conversions {
        println!(
            "  [conversion] {} <- {} ({:?})",
            conversion.name, conversion.input, conversion.conversion
        );
    }
    println!();

    // Load and show persisted stats if available
    let stats_path = config.stats_path();
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)?;
        let stats: serde_json::Value = serde_json::from_str(&content)?;
        println!("Cumulative Statistics:");
        for key in [
            "received",
            "published",
            "duplicates",
            "malformed",
            "unrouted",
            "publish_failures",
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {key}: {value}");
            }
        }
    } else {
        println!("No previous run statistics found.");
    }
    Ok(())
}

fn cmd_config(init: bool) -> anyhow::Result<()> {
    if init {
        let path = Config::config_path();
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        Config::default().save()?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
