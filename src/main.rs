use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use mandi_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);

    // Push notifier: HTTP-backed when configured, log-only otherwise
    let notifier: Arc<dyn api::services::push::PushNotifier> = match cfg.push_endpoint.clone() {
        Some(endpoint) => {
            info!("Push notifications enabled via {}", endpoint);
            Arc::new(api::services::push::HttpPushNotifier::new(
                endpoint,
                cfg.push_server_key.clone(),
            ))
        }
        None => {
            info!("Push endpoint not configured; notifications are log-only");
            Arc::new(api::services::push::LogPushNotifier)
        }
    };
    let push_service = Arc::new(api::services::push::PushService::new(
        db_arc.clone(),
        notifier,
    ));

    // Spawn the event processor with push fan-out
    tokio::spawn(api::events::process_events(event_rx, Some(push_service)));

    // Aggregate app services used by HTTP handlers
    let services =
        api::handlers::AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    };

    // Build CORS layer from config
    let cors_layer = match cfg.cors_allowed_origins.as_ref() {
        Some(raw) => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => {
            if cfg.is_development() {
                info!("Using permissive CORS (development environment)");
            }
            CorsLayer::permissive()
        }
    };

    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "mandi-api up" }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("mandi-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
