//! `arena-runtime-server` – process bootstrap for the agent-arena IPC server.
//!
//! Loads the layered [`config::Config`], initializes structured logging and
//! (optionally) OTLP tracing via `arena_runtime::telemetry`, and serves the
//! `arena-server` HTTP surface until interrupted.
//!
//! Agent registration itself is out of scope for this binary (host
//! integrations register their own [`arena_runtime::Behavior`]
//! implementations against a [`BehaviorRegistry`] programmatically); this
//! entry point boots with a single demonstration idle agent so the server is
//! immediately exercisable.

mod config;

use std::process::ExitCode;

use arena_memory::TraceStore;
use arena_runtime::{SimpleAdapter, SimpleBehavior, SimpleContext};
use arena_server::{ArenaServer, BehaviorRegistry};
use tracing::{error, info, warn};

struct IdleBehavior;

impl SimpleBehavior for IdleBehavior {
    fn decide_simple(&mut self, _ctx: &SimpleContext) -> String {
        "idle".to_string()
    }
}

fn main() -> ExitCode {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {e}; using defaults");
            config::Config::default()
        }
    };

    let _tracer_guard = arena_runtime::telemetry::init_tracing("agent-arena");
    info!(?cfg, "starting agent-arena server");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> ExitCode {
    let trace_store = TraceStore::new(
        cfg.traces_dir
            .clone()
            .unwrap_or_else(|| TraceStore::shared().traces_dir().to_path_buf()),
    );

    let registry = BehaviorRegistry::new();
    let mut demo_agent = SimpleAdapter::new("demo-agent", IdleBehavior)
        .with_trace_store(trace_store.clone())
        .with_spatial_config(cfg.spatial_stale_threshold, cfg.experience_cap);
    demo_agent.set_goal("await instructions");
    registry.register("demo-agent", Box::new(demo_agent)).await;

    let mut server = ArenaServer::new(registry)
        .with_host(cfg.host.clone())
        .with_port(cfg.port)
        .with_max_workers(cfg.max_workers);
    if cfg.enable_debug {
        server = server.with_debug(trace_store);
    }

    let host = server.host().to_string();
    let port = server.port();

    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Ctrl-C received, shutting down");
        std::process::exit(0);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    info!(%host, port, debug = cfg.enable_debug, "listening");
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with an error");
            ExitCode::FAILURE
        }
    }
}
