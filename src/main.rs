use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use placement_ops::config::AppConfig;
use placement_ops::error::AppError;
use placement_ops::telemetry;
use placement_ops::workflows::placement::{
    compute_refund, placement_router, CancellationSetting, CancellationType, InMemoryPolicyStore,
    MemoryPlacementStore, PlacementError, PlacementRouterState, RefundInputs, SystemClock,
    TenantId,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Placement Lifecycle Service",
    about = "Run the placement application lifecycle and cancellation-refund service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Estimate a cancellation refund offline from explicit figures
    Estimate(EstimateArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct EstimateArgs {
    /// Cancellation type key, e.g. post_arrival_within_3_months
    #[arg(long)]
    cancellation_type: String,
    /// Total amount the client has paid
    #[arg(long)]
    total_paid: Decimal,
    /// Flat penalty fee from the tenant policy
    #[arg(long, default_value = "0")]
    penalty_fee: Decimal,
    /// Monthly service fee from the tenant policy
    #[arg(long, default_value = "0")]
    monthly_service_fee: Decimal,
    /// Whole months elapsed since arrival
    #[arg(long, default_value = "0")]
    months_since_arrival: u32,
    /// Refund percentage from the tenant policy (0-100)
    #[arg(long, default_value = "100")]
    refund_percentage: Decimal,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Estimate(args) => run_estimate(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let store = Arc::new(MemoryPlacementStore::default());
    let policies = Arc::new(InMemoryPolicyStore::default());
    let placement_state = Arc::new(PlacementRouterState::new(
        store,
        policies,
        Arc::new(SystemClock),
    ));

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(placement_router(placement_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement lifecycle service ready");
    axum::serve(listener, app).await?;
    Ok(())
}

fn run_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let cancellation_type = CancellationType::from_str(&args.cancellation_type)
        .map_err(|err| AppError::Workflow(PlacementError::Validation(err.to_string())))?;

    let setting = CancellationSetting {
        tenant_id: TenantId("cli".to_string()),
        cancellation_type,
        penalty_fee: args.penalty_fee,
        refund_percentage: args.refund_percentage,
        non_refundable_components: BTreeSet::new(),
        monthly_service_fee: args.monthly_service_fee,
        max_refund_amount: None,
        active: true,
    };

    let breakdown = compute_refund(&RefundInputs {
        cancellation_type,
        setting,
        components: Vec::new(),
        total_paid: args.total_paid,
        months_since_arrival: args.months_since_arrival,
        custom_refund_amount: None,
        penalty_fee_override: None,
        candidate_departed: false,
    });

    println!("{}", breakdown.description);
    println!(
        "calculated refund: {} / final refund: {}",
        breakdown.calculated_refund, breakdown.final_refund
    );
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
