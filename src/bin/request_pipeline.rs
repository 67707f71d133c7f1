//! request-pipeline — 演示请求服务与两条批处理流水线的命令行工具
//!
//! Usage:
//!   request-pipeline [--config <path>] [--requests <n>]
//!
//! Runs a short in-memory session: CRUD calls through the request service,
//! a burst of buffered saves, then a graceful close of both pipelines.

use anyhow::Context;
use request_pipeline::config::ServiceConfig;
use request_pipeline::events::{codec, EventProducer, InMemoryBroker};
use request_pipeline::saver::{DeadLetterQueue, Saver};
use request_pipeline::service::{CallContext, NewRequest, RequestService};
use request_pipeline::storage::{InMemoryRepo, Request};
use request_pipeline::telemetry::{InMemoryMetrics, Operation};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    requests: u64,
}

fn print_usage() {
    println!(
        r#"request-pipeline — 请求流水线演示

USAGE:
    request-pipeline [OPTIONS]

OPTIONS:
    --config <path>     YAML configuration file
    --requests <n>      Number of buffered saves to run (default 25)
    version             Show version information
    help                Show this help message

ENVIRONMENT:
    OCP_REQUEST_<SECTION>_<KEY>   Override a configuration value
    RUST_LOG                      Override the logging filter"#
    );
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = Args {
        config: None,
        requests: 25,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--requests" => {
                let n = iter.next().context("--requests needs a number")?;
                parsed.requests = n.parse().with_context(|| format!("invalid count: {n}"))?;
            }
            "version" | "--version" | "-V" => {
                println!("request-pipeline {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }
    Ok(Some(parsed))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServiceConfig> {
    let mut config = match path {
        Some(p) => ServiceConfig::from_file(p)
            .with_context(|| format!("failed to load {}", p.display()))?,
        None => ServiceConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };
    let config = load_config(args.config.as_ref())?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.filter))?,
        )
        .with_target(false)
        .try_init();

    let repo = Arc::new(InMemoryRepo::new());
    let broker = Arc::new(InMemoryBroker::new());
    let metrics = Arc::new(InMemoryMetrics::new());

    let producer = Arc::new(EventProducer::start(config.producer.clone(), broker.clone())?);
    let service = RequestService::new(
        repo.clone(),
        producer.clone(),
        metrics.clone(),
        config.general.write_batch_size,
    )?;

    let dead_letters: Arc<DeadLetterQueue<Request>> = Arc::new(DeadLetterQueue::new(1024));
    let saver = Saver::with_unflushed_handler(config.saver.clone(), repo.clone(), dead_letters.clone())?;
    saver.init()?;
    info!(topic = %config.producer.topic, "pipelines started");

    let ctx = CallContext::new().with_trace_header("uber-trace-id", "demo:1:0:1");

    let id = service.create(&ctx, 1, 1, "first request").await?;
    let batch = (2..=6).map(|u| NewRequest::new(u, 2, format!("bulk request {u}"))).collect();
    let ids = service.multi_create(&ctx, batch).await?;
    service
        .update(&ctx, Request::new(id, 1, 3, "first request, edited"))
        .await?;
    let described = service.describe(&ctx, id).await?;
    info!(request = %described, "described");

    if let Some(last) = ids.last() {
        service.remove(&ctx, *last).await?;
    }
    let page = service.list(&ctx, 100, 0).await?;
    info!(rows = page.len(), "listed");

    for n in 0..args.requests {
        saver
            .save(Request::new(0, 100 + n, 1, format!("buffered request {n}")))
            .await?;
    }

    saver.close().await?;
    producer.close().await?;

    let events = broker
        .messages()
        .iter()
        .filter_map(|m| codec::decode(&m.payload).ok())
        .count();

    println!("=== Summary ===");
    println!("rows stored:        {}", repo.len());
    println!("events delivered:   {}", events);
    println!("broker batches:     {}", broker.batches().len());
    println!("unsaved requests:   {}", dead_letters.len());
    println!("creates counted:    {}", metrics.total(Operation::Create));
    println!("reads counted:      {}", metrics.total(Operation::Read));
    Ok(())
}
