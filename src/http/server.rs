//! Inbound HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router with webhook, OAuth redirect, health and status handlers
//! - Wire up middleware (tracing, timeout, request ID, webhook secret)
//! - Serve until the gateway's shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::ResponseCache;
use crate::gateway::IntegrationGateway;
use crate::http::auth::webhook_secret_middleware;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<IntegrationGateway>,
    /// OAuth `state` values issued by the authorize route, single use.
    pub oauth_states: ResponseCache<()>,
}

/// Webhook and status server.
pub struct WebhookServer {
    router: Router,
}

impl WebhookServer {
    pub fn new(gateway: Arc<IntegrationGateway>) -> Self {
        let timeout = Duration::from_secs(gateway.config().server.request_timeout_secs);
        let state = AppState {
            gateway,
            oauth_states: ResponseCache::new("oauth_state"),
        };
        let router = Self::build_router(state, timeout);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, timeout: Duration) -> Router {
        let webhooks = Router::new()
            .route("/webhooks/banking", post(handlers::post_banking_webhook))
            .route_layer(middleware::from_fn_with_state(state.clone(), webhook_secret_middleware));

        Router::new()
            .route("/health", get(handlers::get_health))
            .route("/status", get(handlers::get_status))
            .route("/oauth/groupware/authorize", get(handlers::get_groupware_authorize))
            .route("/oauth/groupware/callback", get(handlers::get_groupware_callback))
            .merge(webhooks)
            .with_state(state)
            .layer(TimeoutLayer::new(timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Webhook server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Webhook server received shutdown signal");
            })
            .await?;

        tracing::info!("Webhook server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::GatewayConfig;
    use crate::gateway::Collaborators;

    async fn server(config: GatewayConfig) -> WebhookServer {
        let collaborators = Collaborators::from_config(&config);
        let gateway = IntegrationGateway::new(config, collaborators).await.unwrap();
        WebhookServer::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_health_carries_request_id() {
        let response = server(GatewayConfig::default())
            .await
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_webhook_requires_secret_when_configured() {
        let mut config = GatewayConfig::default();
        config.server.webhook_secret = Some("hook-secret".into());
        let router = server(config).await.router();

        let body = r#"{"event":"item/deleted","itemId":"item-1"}"#;
        let response = router
            .clone()
            .oneshot(
                Request::post("/webhooks/banking")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Correct secret, but banking is disabled.
        let response = router
            .oneshot(
                Request::post("/webhooks/banking")
                    .header("content-type", "application/json")
                    .header("X-Webhook-Secret", "hook-secret")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oauth_routes_need_groupware() {
        let router = server(GatewayConfig::default()).await.router();
        for uri in ["/oauth/groupware/authorize", "/oauth/groupware/callback?code=c&state=s"] {
            let response = router
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_status_reports_disabled_integrations() {
        let response = server(GatewayConfig::default())
            .await
            .router()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["integrations"]["fiscal"], false);
        assert!(json["contingency"].is_null());
    }
}
