//! Payment webhook authentication.
//!
//! Deliveries carry a header of the form `t=<unix seconds>,v1=<hex>` where the
//! hex value is `HMAC-SHA256(secret, "<t>.<raw body>")`. Several `v1` entries
//! may be present while the provider rotates secrets; any match is accepted.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::payment::{PaymentError, PaymentEvent, PaymentEventKind};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window for signed deliveries (seconds).
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,

    #[error("no signature matched the payload")]
    Mismatch,

    #[error("signature timestamp outside tolerance ({age_seconds}s)")]
    OutsideTolerance { age_seconds: i64 },
}

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub status: Option<String>,
    pub amount: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: Vec<u8>, tolerance_seconds: i64) -> Self {
        Self { secret, tolerance_seconds }
    }

    /// Produce the header value a provider would send for `payload`
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        let mac = self.mac_for(timestamp, payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<Vec<u8>> = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(SignatureError::MalformedHeader)?;
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| SignatureError::MalformedHeader)?);
                }
                "v1" => {
                    // Undecodable entries simply never match
                    if let Ok(bytes) = hex::decode(value) {
                        candidates.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if candidates.is_empty() {
            return Err(SignatureError::Mismatch);
        }

        // `t` is unauthenticated at this point, so the age must not overflow
        let age_seconds = now
            .timestamp()
            .checked_sub(timestamp)
            .ok_or(SignatureError::OutsideTolerance { age_seconds: i64::MAX })?;
        if age_seconds.unsigned_abs() > self.tolerance_seconds.unsigned_abs() {
            return Err(SignatureError::OutsideTolerance { age_seconds });
        }

        let mac = self.mac_for(timestamp, payload);
        if candidates
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
        {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Verify against the current clock, then decode the event body.
    pub fn verify_event(&self, payload: &[u8], header: &str) -> Result<PaymentEvent, PaymentError> {
        self.verify(payload, header, Utc::now()).map_err(|e| {
            tracing::warn!("Rejected webhook delivery: {}", e);
            PaymentError::Signature(e)
        })?;
        parse_event(payload)
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

/// Decode a provider event body. Only call on authenticated payloads.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, PaymentError> {
    let envelope: WebhookEnvelope = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::MalformedEvent(e.to_string()))?;

    Ok(PaymentEvent {
        id: envelope.id,
        kind: PaymentEventKind::from_event_type(&envelope.type_),
        authorization_ref: envelope.data.object.id,
        amount: envelope.data.object.amount,
    })
}
