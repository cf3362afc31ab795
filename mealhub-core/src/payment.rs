use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mealhub_shared::{Masked, MinorUnits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::webhook::{SignatureError, WebhookVerifier};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    RequiresPaymentMethod,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
}

/// A hold on customer funds opened with the provider for an order total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub amount: MinorUnits,
    pub currency: String,
    pub status: AuthorizationStatus,
    pub client_secret: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Refund {
    pub id: String,
    pub authorization_ref: String,
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventKind {
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl PaymentEventKind {
    /// Maps a provider event type such as `payment_intent.succeeded`.
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => Self::Succeeded,
            "payment_intent.payment_failed" => Self::Failed,
            "payment_intent.canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A webhook event whose signature has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub id: String,
    pub kind: PaymentEventKind,
    pub authorization_ref: String,
    pub amount: Option<MinorUnits>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider timed out")]
    Timeout,

    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    #[error("Payment provider rejected the request: {0}")]
    Provider(String),

    #[error("Webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),
}

impl PaymentError {
    /// Signature and payload failures mean the event cannot be trusted at all.
    pub fn is_untrusted_event(&self) -> bool {
        matches!(self, PaymentError::Signature(_) | PaymentError::MalformedEvent(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an authorization for `amount` on behalf of a customer
    async fn authorize(
        &self,
        amount: MinorUnits,
        currency: &str,
        customer_ref: &str,
    ) -> Result<PaymentAuthorization, PaymentError>;

    /// Change the amount of an open authorization in place
    async fn update_authorization(
        &self,
        authorization_ref: &str,
        new_amount: MinorUnits,
    ) -> Result<(), PaymentError>;

    /// Release an authorization that will never be captured
    async fn void_authorization(&self, authorization_ref: &str) -> Result<(), PaymentError>;

    /// Refund part of a captured payment. Providers dedupe on `idempotency_key`.
    async fn refund(
        &self,
        authorization_ref: &str,
        amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<Refund, PaymentError>;

    /// Authenticate a webhook delivery and decode its event
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, PaymentError>;
}

#[derive(Default)]
struct MockLedger {
    authorizations: HashMap<String, PaymentAuthorization>,
    refunds: HashMap<String, Refund>,
    refund_log: Vec<Refund>,
    voided: Vec<String>,
}

/// In-process provider used by tests and local runs without provider credentials.
///
/// Every call is recorded; `set_failing(true)` makes all provider calls fail
/// with `PaymentError::Transport` until reset.
pub struct MockPaymentGateway {
    verifier: WebhookVerifier,
    ledger: Mutex<MockLedger>,
    failing: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            verifier: WebhookVerifier::new(webhook_secret.as_bytes().to_vec(), 300),
            ledger: Mutex::new(MockLedger::default()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn authorization(&self, authorization_ref: &str) -> Option<PaymentAuthorization> {
        self.ledger().authorizations.get(authorization_ref).cloned()
    }

    /// Distinct refunds issued (idempotent replays are not repeated here)
    pub fn refunds(&self) -> Vec<Refund> {
        self.ledger().refund_log.clone()
    }

    pub fn voided(&self) -> Vec<String> {
        self.ledger().voided.clone()
    }

    /// Build a signed `payment_intent.*` delivery as the provider would send it.
    /// Returns `(payload, signature_header)`.
    pub fn signed_event(&self, event_type: &str, authorization_ref: &str) -> (Vec<u8>, String) {
        let amount = self
            .authorization(authorization_ref)
            .map(|a| a.amount)
            .unwrap_or_default();
        let payload = serde_json::json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": event_type,
            "data": {
                "object": {
                    "id": authorization_ref,
                    "status": "succeeded",
                    "amount": amount,
                }
            }
        })
        .to_string()
        .into_bytes();
        let signature = self.verifier.sign(Utc::now().timestamp(), &payload);
        (payload, signature)
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, MockLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), PaymentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Transport("Simulated Payment Gateway Failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn authorize(
        &self,
        amount: MinorUnits,
        currency: &str,
        _customer_ref: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        self.check_available()?;
        let id = format!("mock_pi_{}", Uuid::new_v4().simple());
        let authorization = PaymentAuthorization {
            client_secret: Some(Masked::new(format!("{}_secret_mock", id))),
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            status: AuthorizationStatus::RequiresPaymentMethod,
            created_at: Utc::now(),
        };
        self.ledger().authorizations.insert(id, authorization.clone());
        Ok(authorization)
    }

    async fn update_authorization(
        &self,
        authorization_ref: &str,
        new_amount: MinorUnits,
    ) -> Result<(), PaymentError> {
        self.check_available()?;
        let mut ledger = self.ledger();
        let authorization = ledger
            .authorizations
            .get_mut(authorization_ref)
            .ok_or_else(|| {
                PaymentError::Provider(format!("No such payment_intent: {}", authorization_ref))
            })?;
        authorization.amount = new_amount;
        Ok(())
    }

    async fn void_authorization(&self, authorization_ref: &str) -> Result<(), PaymentError> {
        self.check_available()?;
        let mut ledger = self.ledger();
        if let Some(authorization) = ledger.authorizations.get_mut(authorization_ref) {
            authorization.status = AuthorizationStatus::Canceled;
        }
        ledger.voided.push(authorization_ref.to_string());
        Ok(())
    }

    async fn refund(
        &self,
        authorization_ref: &str,
        amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<Refund, PaymentError> {
        self.check_available()?;
        let mut ledger = self.ledger();
        if let Some(existing) = ledger.refunds.get(idempotency_key) {
            return Ok(existing.clone());
        }
        let refund = Refund {
            id: format!("mock_re_{}", Uuid::new_v4().simple()),
            authorization_ref: authorization_ref.to_string(),
            amount,
        };
        ledger.refunds.insert(idempotency_key.to_string(), refund.clone());
        ledger.refund_log.push(refund.clone());
        Ok(refund)
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, PaymentError> {
        self.verifier.verify_event(payload, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_refund_is_idempotent() {
        let gateway = MockPaymentGateway::new("whsec_test");
        let auth = gateway.authorize(2500, "eur", "customer-1").await.unwrap();

        let first = gateway.refund(&auth.id, 2000, "refund:order-1").await.unwrap();
        let second = gateway.refund(&auth.id, 2000, "refund:order-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.refunds().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_mode() {
        let gateway = MockPaymentGateway::new("whsec_test");
        gateway.set_failing(true);

        let result = gateway.authorize(1000, "eur", "customer-1").await;
        assert!(matches!(result, Err(PaymentError::Transport(_))));

        gateway.set_failing(false);
        assert!(gateway.authorize(1000, "eur", "customer-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_signed_event_round_trip() {
        let gateway = MockPaymentGateway::new("whsec_test");
        let auth = gateway.authorize(4200, "eur", "customer-1").await.unwrap();

        let (payload, signature) = gateway.signed_event("payment_intent.succeeded", &auth.id);
        let event = gateway.verify_webhook_signature(&payload, &signature).unwrap();

        assert_eq!(event.kind, PaymentEventKind::Succeeded);
        assert_eq!(event.authorization_ref, auth.id);
        assert_eq!(event.amount, Some(4200));
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            PaymentEventKind::from_event_type("payment_intent.succeeded"),
            PaymentEventKind::Succeeded
        );
        assert_eq!(
            PaymentEventKind::from_event_type("payment_intent.canceled"),
            PaymentEventKind::Canceled
        );
        assert_eq!(
            PaymentEventKind::from_event_type("charge.refunded"),
            PaymentEventKind::Other("charge.refunded".to_string())
        );
    }
}
