use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use mealhub_order::WebhookOutcome;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// `applied`, `already_applied` or `ignored`
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

impl From<WebhookOutcome> for WebhookAck {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Applied(p) => WebhookAck {
                status: "applied",
                order_id: Some(p.order.id),
            },
            WebhookOutcome::AlreadyApplied(p) => WebhookAck {
                status: "already_applied",
                order_id: Some(p.order.id),
            },
            WebhookOutcome::Ignored { .. } => WebhookAck { status: "ignored", order_id: None },
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
///
/// The raw body is kept as bytes: the signature covers the exact payload the
/// provider sent, so it must be verified before any JSON decoding.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::ValidationError(format!("missing {} header", SIGNATURE_HEADER)))?;

    let outcome = state
        .orchestrator
        .handle_payment_confirmed(&body, signature)
        .await?;

    if let WebhookOutcome::Ignored { event_id, kind } = &outcome {
        tracing::debug!("Ignoring payment event {} ({:?})", event_id, kind);
    }

    Ok(Json(outcome.into()))
}
