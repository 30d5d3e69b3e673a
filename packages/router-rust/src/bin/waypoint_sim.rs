//! Drives simulated calls through the load-balancing chain.
//!
//! ```bash
//! waypoint-sim --target orders \
//!     --instance orders=a@http://10.0.0.1:8080 \
//!     --instance orders=b@http://10.0.0.2:8080 \
//!     --calls 20 --failure-rate 0.3 --config router.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::Rng;
use waypoint_core::{CallContext, InvocationError, Response, ServiceInstance, LB_SESSION_ID};
use waypoint_router::config::{RouterConfig, SharedConfig};
use waypoint_router::selection::StaticInstanceRegistry;
use waypoint_router::telemetry::{init_tracing, LogFormat};
use waypoint_router::transport::{build_transport_pipeline, ProtocolRouter};
use waypoint_router::{Invoker, StrategyRegistry};

#[derive(Parser, Debug)]
#[command(name = "waypoint-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Router configuration file (JSON). Defaults apply when omitted.
    #[arg(short, long, env = "WAYPOINT_CONFIG")]
    config: Option<PathBuf>,

    /// Instance as `service=id@protocol://address`; repeatable
    #[arg(short, long = "instance", required = true)]
    instances: Vec<String>,

    /// Calling service
    #[arg(long, default_value = "sim")]
    source: String,

    /// Called service
    #[arg(short, long)]
    target: String,

    /// Strategy name; the configured default when omitted
    #[arg(long)]
    strategy: Option<String>,

    /// Session token sent as `lb-session-id` metadata
    #[arg(long)]
    session: Option<String>,

    /// Number of calls to issue
    #[arg(short = 'n', long, default_value_t = 10)]
    calls: u32,

    /// Probability in [0, 1] that a simulated transport call fails
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Simulated transport latency
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// Per-call transport timeout
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log filter (overridden by `RUST_LOG`)
    #[arg(long, default_value = "info", env = "WAYPOINT_LOG")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

/// Parses `service=id@protocol://address`.
fn parse_instance(spec: &str) -> Result<ServiceInstance> {
    let (service, rest) = spec
        .split_once('=')
        .with_context(|| format!("instance `{spec}`: expected service=id@protocol://address"))?;
    let (id, endpoint) = rest
        .split_once('@')
        .with_context(|| format!("instance `{spec}`: missing `@` after the id"))?;
    let (protocol, address) = endpoint
        .split_once("://")
        .with_context(|| format!("instance `{spec}`: endpoint must be protocol://address"))?;
    if service.is_empty() || id.is_empty() || protocol.is_empty() || address.is_empty() {
        bail!("instance `{spec}`: every part must be non-empty");
    }
    Ok(ServiceInstance::new(id, service).with_endpoint(protocol, address))
}

/// Transport client that sleeps for `latency` and then fails with
/// probability `failure_rate`.
fn simulated_router(protocols: &[String], latency: Duration, failure_rate: f64) -> ProtocolRouter {
    let mut router = ProtocolRouter::new();
    for protocol in protocols {
        router.register(
            protocol.clone(),
            tower::service_fn(move |ctx: CallContext| async move {
                tokio::time::sleep(latency).await;
                let failed = rand::rng().random_bool(failure_rate);
                if failed {
                    return Err(InvocationError::downstream(anyhow::anyhow!(
                        "simulated failure at {}",
                        ctx.endpoint
                    )));
                }
                let body = format!("{} handled by {}", ctx.operation, ctx.endpoint);
                Ok(Response::ok(body).with_status(200))
            }),
        );
    }
    router
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format)?;

    if !(0.0..=1.0).contains(&cli.failure_rate) {
        bail!("--failure-rate must be within [0, 1], got {}", cli.failure_rate);
    }

    let config = match &cli.config {
        Some(path) => RouterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RouterConfig::default(),
    };

    let registry = StaticInstanceRegistry::new();
    let mut protocols = Vec::new();
    for spec in &cli.instances {
        let instance = parse_instance(spec)?;
        protocols.extend(instance.supported_protocols());
        registry.register(instance);
    }
    protocols.sort();
    protocols.dedup();

    let transport = build_transport_pipeline(
        simulated_router(&protocols, Duration::from_millis(cli.latency_ms), cli.failure_rate),
        cli.timeout_ms.map(Duration::from_millis),
    );
    let strategies = Arc::new(StrategyRegistry::with_session_store(Arc::new(
        config.session_stickiness.store(),
    )));
    let config = Arc::new(SharedConfig::new(config));
    let invoker = Invoker::builder(config, Arc::new(registry), transport)
        .strategies(strategies)
        .build()
        .context("building handler chain")?;

    let mut succeeded = 0u32;
    for n in 0..cli.calls {
        let mut ctx =
            CallContext::new(&cli.source, &cli.target).with_operation(format!("call-{n}"));
        if let Some(strategy) = &cli.strategy {
            ctx = ctx.with_strategy(strategy);
        }
        if let Some(token) = &cli.session {
            ctx = ctx.with_metadata(LB_SESSION_ID, format!("{LB_SESSION_ID}={token}"));
        }

        let resp = invoker.invoke(&mut ctx).await;
        match resp.error() {
            None => {
                succeeded += 1;
                tracing::info!(
                    call = n,
                    endpoint = %ctx.endpoint,
                    body = %String::from_utf8_lossy(&resp.body),
                    "call succeeded"
                );
            }
            Some(err) => tracing::warn!(call = n, error = %err, "call failed"),
        }
    }

    tracing::info!(
        calls = cli.calls,
        succeeded,
        failed = cli.calls - succeeded,
        "simulation finished"
    );
    Ok(())
}
