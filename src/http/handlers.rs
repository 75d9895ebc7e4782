use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::banking::{WebhookAction, WebhookEvent};
use crate::error::IntegrationError;
use crate::fiscal::ContingencyState;
use crate::http::request::request_id;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct IntegrationFlags {
    pub registry: bool,
    pub groupware: bool,
    pub banking: bool,
    pub fiscal: bool,
}

#[derive(Serialize)]
pub struct GatewayStatus {
    pub integrations: IntegrationFlags,
    /// `None` while fiscal is disabled.
    pub contingency: Option<ContingencyState>,
    /// `None` until the first probe.
    pub authority_online: Option<bool>,
    pub registry_cache_entries: Option<usize>,
}

pub async fn get_health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

pub async fn get_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let gateway = &state.gateway;
    Json(GatewayStatus {
        integrations: IntegrationFlags {
            registry: gateway.registry().is_some(),
            groupware: gateway.groupware().is_some(),
            banking: gateway.banking().is_some(),
            fiscal: gateway.fiscal().is_some(),
        },
        contingency: gateway.fiscal().map(|f| f.contingency().state()),
        authority_online: gateway.authority_health().online(),
        registry_cache_entries: gateway.registry().map(|r| r.cache().len()),
    })
}

fn action_name(action: WebhookAction) -> &'static str {
    match action {
        WebhookAction::Resync => "resync",
        WebhookAction::UpdateStatus(_) => "update_status",
        WebhookAction::Remove => "remove",
        WebhookAction::Ignore => "ignore",
    }
}

pub async fn post_banking_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Response {
    let Some(dispatcher) = state.gateway.webhooks() else {
        return (StatusCode::NOT_FOUND, "banking integration disabled").into_response();
    };

    tracing::debug!(
        request_id = %request_id(&headers),
        event = event.event.as_str(),
        item_id = %event.item_id,
        "Accepted banking webhook"
    );
    let action = dispatcher.spawn(event);
    (StatusCode::ACCEPTED, Json(json!({ "action": action_name(action) }))).into_response()
}

/// How long an issued OAuth `state` stays redeemable.
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Query of the provider's redirect back to us.
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Start the groupware authorization: remember a fresh `state` and redirect
/// the browser to the provider.
pub async fn get_groupware_authorize(State(state): State<AppState>) -> Response {
    let Some(credentials) = state.gateway.credentials() else {
        return (StatusCode::NOT_FOUND, "groupware integration disabled").into_response();
    };

    let nonce = Uuid::new_v4().to_string();
    match credentials.authorize_url(&nonce) {
        Ok(url) => {
            state.oauth_states.set(nonce, (), OAUTH_STATE_TTL);
            Redirect::to(url.as_str()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to build groupware authorize URL");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Complete the groupware authorization with the code the provider sent back.
pub async fn get_groupware_callback(State(state): State<AppState>, Query(callback): Query<OAuthCallback>) -> Response {
    let Some(credentials) = state.gateway.credentials() else {
        return (StatusCode::NOT_FOUND, "groupware integration disabled").into_response();
    };

    if let Some(error) = callback.error {
        tracing::warn!(error = %error, description = ?callback.error_description, "Groupware authorization denied");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": error, "description": callback.error_description })),
        )
            .into_response();
    }

    let (Some(code), Some(nonce)) = (callback.code, callback.state) else {
        return (StatusCode::BAD_REQUEST, "missing code or state").into_response();
    };
    if state.oauth_states.take(&nonce).is_none() {
        tracing::warn!("Groupware callback with unknown or expired state");
        return (StatusCode::BAD_REQUEST, "unknown or expired state").into_response();
    }

    match credentials.exchange_code(&code).await {
        Ok(credential) => Json(json!({
            "connected": true,
            "account": credential.account_id,
            "scopes": credential.scopes,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Groupware code exchange failed");
            let status = match e {
                IntegrationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                IntegrationError::AuthExpired { .. } => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, e.to_string()).into_response()
        }
    }
}
