use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use beacon_core::{
    DiscoveryScope, ProxyHandle, RegistryHandle, RegistryId, RemoteService, RuntimeClock, ServiceDescriptor,
    ServiceId, StatusType,
};
use beacon_join::{JoinConfig, JoinManager, RegistrationTable};
use beacon_memory::{LocalDiscovery, LoopbackExporter, MemoryRegistry};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "beacon-server")]
#[command(about = "Announces a service to every discovered lookup registry", long_about = None)]
struct Cli {
    #[arg(long, env = "BEACON_NAME", default_value = "Test service")]
    name: String,

    #[arg(long, env = "BEACON_COMMENT", default_value = "Test service comment")]
    comment: String,

    /// Registry groups to join; all groups when empty
    #[arg(long, env = "BEACON_GROUPS", value_delimiter = ',')]
    groups: Vec<String>,

    /// Number of in-process lookup registries to start
    #[arg(long, env = "BEACON_REGISTRIES", default_value_t = 2)]
    registries: usize,

    /// Longest lease the in-process registries grant
    #[arg(long, env = "BEACON_LEASE_CAP_SECS", default_value_t = 30)]
    lease_cap_secs: u64,

    #[arg(long, env = "BEACON_RETRY_DELAY_MS", default_value_t = 100)]
    retry_delay_ms: u64,

    #[arg(long, env = "BEACON_SAFETY_MARGIN_MS", default_value_t = 1000)]
    safety_margin_ms: u64,

    #[arg(long, env = "BEACON_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Seconds to stay up before shutting down
    #[arg(long, env = "BEACON_LIFESPAN_SECS", default_value_t = 180)]
    lifespan_secs: u64,
}

impl Cli {
    fn join_config(&self) -> JoinConfig {
        JoinConfig {
            retry_delay_ms: self.retry_delay_ms,
            safety_margin_ms: self.safety_margin_ms,
            scope: if self.groups.is_empty() {
                DiscoveryScope::AllGroups
            } else {
                DiscoveryScope::Groups(self.groups.clone())
            },
        }
    }

    fn descriptor(&self) -> Result<ServiceDescriptor, beacon_core::DescriptorError> {
        ServiceDescriptor::builder(ServiceId::generate())
            .comment(&self.comment)
            .name(&self.name)
            .service_type(format!("{} (display name)", self.name), format!("{} (short description)", self.name))
            .status(StatusType::Normal)
            .location("floor", "room", "building")
            .address(
                "street",
                "organization",
                "organizationalUnit",
                "locality",
                "stateOrProvince",
                "postalCode",
                "country",
            )
            .service_info(
                env!("CARGO_PKG_NAME"),
                "beacon",
                "beacon",
                env!("CARGO_PKG_VERSION"),
                "beacon",
                "serial#",
            )
            .build()
    }
}

/// The advertised service. Remote calls only leave a trace in the log.
#[derive(Default)]
struct TestService {
    invocations: AtomicU64,
}

impl RemoteService for TestService {
    fn invoke(&self) {
        let n = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(invocations = n, "invoked");
    }
}

#[derive(Clone)]
struct AppState {
    table: Arc<RegistrationTable>,
    exporter: Arc<LoopbackExporter>,
    proxy: ProxyHandle,
    service_id: ServiceId,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok();

    let clock = Arc::new(RuntimeClock::new());
    let discovery = LocalDiscovery::new();
    let groups = if cli.groups.is_empty() { vec!["public".to_string()] } else { cli.groups.clone() };
    for i in 0..cli.registries {
        let group = &groups[i % groups.len()];
        let remote = MemoryRegistry::new(group.clone(), clock.clone(), Duration::from_secs(cli.lease_cap_secs));
        let registry = RegistryHandle::new(RegistryId::new(format!("lookup://local-{i}")), Arc::new(remote));
        discovery.announce(group, vec![registry]);
    }

    let descriptor = Arc::new(cli.descriptor()?);
    let exporter = Arc::new(LoopbackExporter::new(cli.bind.to_string()));
    tracing::info!(service = %descriptor.id(), "starting beacon server");

    let manager = JoinManager::builder(descriptor.clone(), Arc::new(TestService::default()), exporter.clone())
        .config(cli.join_config())
        .clock(clock)
        .start(&discovery)
        .await?;

    let state = AppState {
        table: manager.table().clone(),
        exporter,
        proxy: manager.proxy().clone(),
        service_id: descriptor.id(),
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(move || {
            let rendered = handle.render();
            async move { rendered }
        }))
        .route("/api/registrations", get(list_registrations))
        .route("/api/invoke", post(invoke_service))
        .with_state(state);

    tracing::info!("listening on {}", cli.bind);
    let server = axum::Server::bind(&cli.bind)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(Duration::from_secs(cli.lifespan_secs)));

    if let Err(e) = server.await {
        tracing::error!("server error: {}", e);
    }

    manager.shutdown();
    tracing::info!(service = %descriptor.id(), "server will die");
    Ok(())
}

async fn shutdown_signal(lifespan: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("signal received, starting graceful shutdown"),
        _ = terminate => tracing::info!("signal received, starting graceful shutdown"),
        _ = tokio::time::sleep(lifespan) => tracing::info!("lifespan elapsed, shutting down"),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    service_id: ServiceId,
    registered: usize,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let registered = state.table.registered_count();
    let status = if registered > 0 { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            service_id: state.service_id,
            registered,
        }),
    )
}

async fn list_registrations(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.table.snapshot()))
}

async fn invoke_service(State(state): State<AppState>) -> impl IntoResponse {
    match state.exporter.invoke(&state.proxy) {
        Ok(()) => (StatusCode::OK, "invoked").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
