use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use storefront_api::config::{init_tracing, load_config};
use storefront_api::db::{ensure_schema, establish_connection};
use storefront_api::events::{process_events, EventSender};
use storefront_api::gateway::momo::MomoClient;
use storefront_api::handlers::AppServices;
use storefront_api::{app_router, AppState};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(config.log_level(), config.log_json);

    info!(environment = %config.environment, "Starting storefront API");

    let db = establish_connection(&config.database_url).await?;
    if config.auto_migrate {
        ensure_schema(&db).await?;
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(process_events(event_rx));

    let gateway = Arc::new(MomoClient::new(config.gateway.clone()));
    let request_prefix = config
        .gateway
        .partner_code
        .clone()
        .unwrap_or_else(|| "PAY".to_string());

    let services = AppServices::new(
        db.clone(),
        gateway,
        event_sender.clone(),
        request_prefix,
    );

    let config = Arc::new(config);
    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };

    let cors = build_cors(config.cors_allowed_origins.as_deref());

    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn build_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match allowed_origins {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        error!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                })
                .collect();
            base.allow_origin(parsed)
        }
        None => base.allow_origin(Any),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl_c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
