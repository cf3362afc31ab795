//! Payment provider speaking the Stripe REST dialect: form-encoded requests,
//! bearer secret key, `Idempotency-Key` on refunds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mealhub_core::payment::AuthorizationStatus;
use mealhub_core::{
    PaymentAuthorization, PaymentError, PaymentEvent, PaymentGateway, Refund, WebhookVerifier,
};
use mealhub_shared::{Masked, MinorUnits};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::app_config::PaymentConfig;

pub struct StripePaymentGateway {
    client: Client,
    api_url: String,
    secret_key: Masked<String>,
    verifier: WebhookVerifier,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    amount: MinorUnits,
    currency: String,
    status: String,
    client_secret: Option<String>,
    created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: MinorUnits,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn intent_status(raw: &str) -> AuthorizationStatus {
    match raw {
        "requires_action" | "requires_confirmation" => AuthorizationStatus::RequiresAction,
        "processing" | "requires_capture" => AuthorizationStatus::Processing,
        "succeeded" => AuthorizationStatus::Succeeded,
        "canceled" => AuthorizationStatus::Canceled,
        _ => AuthorizationStatus::RequiresPaymentMethod,
    }
}

fn transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::Timeout
    } else {
        PaymentError::Transport(err.to_string())
    }
}

impl StripePaymentGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            verifier: WebhookVerifier::new(
                config.webhook_secret.expose().as_bytes().to_vec(),
                config.webhook_tolerance_seconds,
            ),
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(self.secret_key.expose())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PaymentError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<ErrorEnvelope>().await {
                Ok(envelope) => format!(
                    "{} ({})",
                    envelope.error.message.unwrap_or_default(),
                    envelope.error.kind.unwrap_or_else(|| status.to_string())
                ),
                Err(_) => status.to_string(),
            };
            return Err(PaymentError::Provider(message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::Provider(format!("unreadable response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn authorize(
        &self,
        amount: MinorUnits,
        currency: &str,
        customer_ref: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let request = self.post("/v1/payment_intents").form(&[
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("metadata[customer_ref]", customer_ref.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ]);
        let intent: IntentResponse = self.send(request).await?;
        tracing::debug!("Opened payment intent {} for {}", intent.id, amount);

        Ok(PaymentAuthorization {
            id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
            status: intent_status(&intent.status),
            client_secret: intent.client_secret.map(Masked::new),
            created_at: intent
                .created
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now),
        })
    }

    async fn update_authorization(
        &self,
        authorization_ref: &str,
        new_amount: MinorUnits,
    ) -> Result<(), PaymentError> {
        let request = self
            .post(&format!("/v1/payment_intents/{}", authorization_ref))
            .form(&[("amount", new_amount.to_string())]);
        let _: IntentResponse = self.send(request).await?;
        Ok(())
    }

    async fn void_authorization(&self, authorization_ref: &str) -> Result<(), PaymentError> {
        let request = self
            .post(&format!("/v1/payment_intents/{}/cancel", authorization_ref))
            .form(&[("cancellation_reason", "abandoned")]);
        let _: IntentResponse = self.send(request).await?;
        Ok(())
    }

    async fn refund(
        &self,
        authorization_ref: &str,
        amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<Refund, PaymentError> {
        let request = self
            .post("/v1/refunds")
            .header("Idempotency-Key", idempotency_key)
            .form(&[
                ("payment_intent", authorization_ref.to_string()),
                ("amount", amount.to_string()),
            ]);
        let refund: RefundResponse = self.send(request).await?;

        Ok(Refund {
            id: refund.id,
            authorization_ref: refund
                .payment_intent
                .unwrap_or_else(|| authorization_ref.to_string()),
            amount: refund.amount,
        })
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, PaymentError> {
        self.verifier.verify_event(payload, signature)
    }
}
