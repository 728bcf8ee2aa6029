pub mod config;
pub mod domain;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::Database;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Config,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let database = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        database.run_migrations().await?;

        services::init_metrics();

        let state = AppState {
            database,
            config: config.clone(),
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_handler))
            // Product catalog (tenant-scoped)
            .route("/products", post(handlers::products::create_product))
            .route("/products", get(handlers::products::list_products))
            .route("/products/:id", get(handlers::products::get_product))
            .route("/products/:id", patch(handlers::products::update_product))
            // Installment plan computation and persistence
            .route(
                "/products/plan/preview",
                post(handlers::products::preview_plan),
            )
            .route(
                "/products/plan/redistribute",
                post(handlers::products::redistribute_plan),
            )
            .route(
                "/products/:id/installments",
                put(handlers::products::replace_plan),
            )
            .route(
                "/products/:id/installments",
                get(handlers::products::list_plan),
            )
            // Boarding passes and realized installments
            .route("/passes", post(handlers::passes::issue_pass))
            .route("/passes", get(handlers::passes::list_passes))
            .route("/passes/:id", get(handlers::passes::get_pass))
            .route(
                "/passes/:id/installments",
                get(handlers::passes::list_pass_installments),
            )
            .route(
                "/passes/:id/installments",
                post(handlers::passes::add_installment),
            )
            .route(
                "/passes/:id/installments/:installment_id",
                delete(handlers::passes::remove_installment),
            )
            .layer(from_fn(security_headers_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        // Port 0 picks a random free port, used by the integration tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
