pub mod config;
pub mod error;
pub mod handlers;
pub mod upstream;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::get,
};
use tower::ServiceBuilder;

use audit::{AuditLogger, AuditSink, QueueSink, StdoutSink};
use auth_check::{HttpSessionFetcher, NoSessionFetcher, SessionFetcher, user_context_middleware};

use config::{ConfigError, ServiceConfig};
use upstream::ObjectsClient;

/// Everything a request handler needs. Immutable once built and shared by all requests.
#[derive(Clone)]
pub struct AppState {
    pub objects: ObjectsClient,
    pub audit: AuditLogger,
    pub session_fetcher: Arc<dyn SessionFetcher>,
    pub server_annotation: Option<String>,
}

impl AppState {
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::new();

        let objects = ObjectsClient::new(http_client.clone(), &config.objects_api_base_url)?;

        let session_fetcher: Arc<dyn SessionFetcher> = match &config.identity_service_url {
            Some(url) => Arc::new(HttpSessionFetcher::new(http_client, url.as_str())),
            None => {
                tracing::warn!("IDENTITY_SERVICE_URL not set, all requests will be treated as anonymous");
                Arc::new(NoSessionFetcher)
            }
        };

        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(StdoutSink)];
        if let Some(queue_url) = &config.audit_event_queue_url {
            tracing::info!("Forwarding audit events to {}", queue_url);
            sinks.push(Arc::new(QueueSink::from_env(queue_url.as_str()).await));
        }

        Ok(AppState {
            objects,
            audit: AuditLogger::with_sinks(config.audit_service_name.as_str(), sinks),
            session_fetcher,
            server_annotation: config.server_annotation.clone(),
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/objects",
            get(handlers::get_objects)
                .post(handlers::create_object)
                .put(handlers::update_object)
                .delete(handlers::delete_object),
        )
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.session_fetcher.clone(), user_context_middleware))
        )
        // added after the layer so health checks skip the session lookup
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state)
}
