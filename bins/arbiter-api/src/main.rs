mod auth;
mod error;
mod handlers;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arbiter_common::config::{ExecutionBackendKind, StoreBackend};
use arbiter_common::Config;
use arbiter_engine::backend::judge0::Judge0Config;
use arbiter_engine::store::ProblemStore;
use arbiter_engine::{
    spawn_prune_task, EchoBackend, ExecutionBackend, Judge0Backend, LanguageRegistry, MemoryStore,
    RedisStore, Stores, SubmissionManager,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SubmissionManager>,
    pub start_time: Arc<std::time::Instant>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Arbiter API booting...");

    metrics::init_metrics();
    info!("Metrics registry initialized");

    let config = Config::from_env();

    let languages = load_languages(&config.language_config_path);
    info!("Loaded language configuration: {:?}", languages.ids());

    let stores = build_stores(&config).await?;
    let backend = build_backend(&config)?;

    let manager = Arc::new(SubmissionManager::new(languages, stores, backend, &config));

    // Idle rate-limit windows are dropped once per window
    let gate = manager.gate().clone();
    let prune_every = gate.window().max(Duration::from_secs(1));
    spawn_prune_task(gate, prune_every);

    let state = Arc::new(AppState {
        manager,
        start_time: Arc::new(std::time::Instant::now()),
    });

    let app = routes::app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for structured output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_languages(path: &str) -> LanguageRegistry {
    match LanguageRegistry::load_from_file(path) {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Could not load {} ({}), using built-in language map", path, e);
            LanguageRegistry::builtin()
        }
    }
}

async fn build_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.store_backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url)
                .await
                .with_context(|| format!("failed to connect to Redis at {}", config.redis_url))?;
            info!("Connected to Redis: {}", config.redis_url);

            if let Some(path) = &config.problem_seed_path {
                let problems = MemoryStore::load_problems(path)
                    .with_context(|| format!("failed to load problems from {}", path))?;
                for problem in &problems {
                    store
                        .put_problem(problem)
                        .await
                        .with_context(|| format!("failed to seed problem {}", problem.id))?;
                }
                info!("Seeded {} problems into Redis", problems.len());
            }
            Ok(Stores::redis(store))
        }
        StoreBackend::Memory => {
            let problems = match &config.problem_seed_path {
                Some(path) => MemoryStore::load_problems(path)
                    .with_context(|| format!("failed to load problems from {}", path))?,
                None => Vec::new(),
            };
            info!("Using in-memory stores with {} seeded problems", problems.len());
            Ok(Stores::memory(Arc::new(MemoryStore::with_problems(problems))))
        }
    }
}

fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn ExecutionBackend>> {
    match config.execution_backend {
        ExecutionBackendKind::Judge0 => {
            let backend = Judge0Backend::new(Judge0Config::from(config))
                .context("failed to build execution service client")?;
            info!("Execution service: {}", config.execution_api_url);
            Ok(Arc::new(backend))
        }
        ExecutionBackendKind::Echo => {
            warn!("Using echo execution backend; submitted code is never run");
            Ok(Arc::new(EchoBackend::new()))
        }
    }
}
