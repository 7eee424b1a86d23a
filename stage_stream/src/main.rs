//! # Stage Stream Binary
//!
//! Real-time MQTT streaming service for a piezo positioning stage.
//!
//! # Usage
//!
//! ```bash
//! # Run against the simulation backend (default)
//! stage_stream --config config/stage.toml --simulate
//!
//! # Run with a specific backend
//! stage_stream --config config/stage.toml --driver simulation
//!
//! # Verbose logging
//! stage_stream -s -v
//! ```

#![deny(warnings)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use stage_common::config::StreamConfig;
use stage_hal::controllers::ControllerTable;
use stage_hal::registry::BackendRegistry;
use stage_hal::sim::SimBackend;
use stage_hal::topology::TopologyMap;
use stage_stream::bus::BusClient;
use stage_stream::dispatcher::{CommandFifo, Dispatcher};
use stage_stream::publisher::Publisher;
use stage_stream::ring::sample_ring;
use stage_stream::sampler::Sampler;
use stage_stream::status::SharedState;

/// How long startup waits for the broker to acknowledge the connection.
const BROKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cadence of the performance stats log line.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Stage Stream - real-time position streaming and command dispatch
#[derive(Parser, Debug)]
#[command(name = "stage_stream")]
#[command(version)]
#[command(about = "MQTT streaming service for the piezo stage")]
#[command(long_about = None)]
struct Args {
    /// Path to the service configuration file (TOML). Defaults apply when
    /// the file is absent.
    #[arg(short, long, default_value = "config/stage.toml")]
    config: PathBuf,

    /// Force the simulation backend.
    #[arg(short = 's', long)]
    simulate: bool,

    /// Select a controller backend by name.
    #[arg(short, long, value_name = "NAME")]
    driver: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("startup failed: {e}");
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("stage_stream v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = StreamConfig::load_or_default(&args.config)?;
    info!(
        "config: broker {}:{}, rate {} Hz, batch {} @ {} ms, ring {}",
        config.broker.host,
        config.broker.port,
        config.sampling.rate_hz,
        config.publishing.batch_max,
        config.publishing.batch_interval_ms,
        config.queues.ring_capacity,
    );

    let backend_name = if args.simulate {
        "simulation".to_string()
    } else {
        args.driver.clone().unwrap_or_else(|| "simulation".to_string())
    };

    let shared = Arc::new(SharedState::new(config.sampling.rate_hz));
    let fifo = Arc::new(CommandFifo::new(config.queues.command_fifo_capacity));

    // Bus first: an unreachable broker is a fatal startup diagnostic.
    let (bus, bus_thread) =
        BusClient::start(&config.broker, Arc::clone(&shared), Arc::clone(&fifo))?;
    bus.wait_connected(BROKER_CONNECT_TIMEOUT)?;

    // Device layer next: enumerate, connect, probe.
    let mut registry = BackendRegistry::new();
    registry.register("simulation", || Box::new(SimBackend::default_stage()));
    let backend = registry.create(&backend_name)?;
    info!("using '{}' backend", backend.name());

    let table = Arc::new(ControllerTable::initialize(backend.as_ref())?);
    shared.set_controllers_connected(true);
    let topology = Arc::new(TopologyMap::build(
        &table,
        config.controllers.xyz_id,
        config.controllers.rot_id,
    ));

    let (producer, consumer) = sample_ring(config.queues.ring_capacity);
    let ring_depth = consumer.depth_gauge();

    {
        let shared = Arc::clone(&shared);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            shared.request_shutdown();
        })?;
    }

    let sampler = Sampler::new(
        Arc::clone(&shared),
        Arc::clone(&table),
        Arc::clone(&topology),
        producer,
        config.sampling.cpu_core,
        config.sampling.rt_priority,
    );
    let publisher = Publisher::new(
        Arc::clone(&shared),
        consumer,
        bus.clone(),
        config.publishing.batch_max,
        Duration::from_millis(config.publishing.batch_interval_ms),
    );
    let dispatcher = Dispatcher::new(
        Arc::clone(&shared),
        Arc::clone(&table),
        Arc::clone(&topology),
        Arc::clone(&fifo),
        ring_depth.clone(),
    );

    let sampler_thread = thread::Builder::new()
        .name("sampler".to_string())
        .spawn(move || sampler.run())?;
    let publisher_thread = thread::Builder::new()
        .name("publisher".to_string())
        .spawn(move || publisher.run())?;
    let dispatcher_bus = bus.clone();
    let dispatcher_thread = thread::Builder::new()
        .name("dispatcher".to_string())
        .spawn(move || dispatcher.run(dispatcher_bus))?;

    if let Err(e) = bus.publish_lifecycle("SYSTEM_READY") {
        warn!("failed to publish SYSTEM_READY: {e}");
    }
    info!("all threads started, system ready");

    // Performance stats until shutdown.
    let mut last_stats = Instant::now();
    let (mut last_captured, mut last_published, mut last_dropped) = (0u64, 0u64, 0u64);
    while shared.is_running() {
        thread::sleep(Duration::from_millis(200));

        if last_stats.elapsed() >= STATS_INTERVAL {
            let elapsed_s = last_stats.elapsed().as_secs().max(1);
            let (captured, published, dropped) =
                (shared.captured(), shared.published(), shared.dropped());
            info!(
                "stats: captured {} ({} Hz), published {}, dropped {}, ring {}/{}",
                captured - last_captured,
                (captured - last_captured) / elapsed_s,
                published - last_published,
                dropped - last_dropped,
                ring_depth.occupancy(),
                ring_depth.capacity(),
            );
            (last_captured, last_published, last_dropped) = (captured, published, dropped);
            last_stats = Instant::now();
        }
    }

    info!("shutting down...");
    shared.request_shutdown();

    for (name, handle) in [
        ("sampler", sampler_thread),
        ("publisher", publisher_thread),
        ("dispatcher", dispatcher_thread),
    ] {
        if handle.join().is_err() {
            warn!("{name} thread panicked");
        }
    }

    // Leave the hardware quiet before dropping handles.
    table.shutdown();

    if let Err(e) = bus.publish_lifecycle("SYSTEM_SHUTDOWN") {
        warn!("failed to publish SYSTEM_SHUTDOWN: {e}");
    }
    bus.disconnect();
    if bus_thread.join().is_err() {
        warn!("bus thread panicked");
    }

    info!("shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
