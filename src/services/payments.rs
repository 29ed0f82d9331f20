use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::Sha256;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Confirms that a client-submitted payment confirmation actually
/// originated from the payment provider for the exact provider order
/// reference. Pure computation, no I/O.
#[derive(Clone)]
pub struct PaymentVerifier {
    secret: String,
}

impl PaymentVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes the expected signature for a provider order/payment pair.
    /// The provider signs `"{order_ref}|{payment_ref}"` with HMAC-SHA256
    /// over the shared secret and hex-encodes the digest.
    pub fn expected_signature(&self, order_ref: &str, payment_ref: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{}|{}", order_ref, payment_ref).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies a provider signature; any mismatch is a hard rejection.
    pub fn verify(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<(), ServiceError> {
        let expected = self.expected_signature(order_ref, payment_ref);
        if !constant_time_eq(&expected, signature) {
            return Err(ServiceError::PaymentFailed(
                "Signature verification failed".to_string(),
            ));
        }
        Ok(())
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// A provider-side payment intent, handed back to the client so it can
/// drive the provider's payment flow before calling verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentIntent {
    pub provider_order_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub key_id: Option<String>,
}

/// Collaborator boundary to the payment gateway: creates a provider-side
/// intent for a given amount/currency. Implementations live outside the
/// core; a logging stub ships for development and tests.
#[async_trait]
pub trait PaymentProviderClient: Send + Sync {
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// Development stub: fabricates provider references locally and logs the
/// would-be gateway call.
pub struct LoggingPaymentProvider {
    key_id: Option<String>,
}

impl LoggingPaymentProvider {
    pub fn new(key_id: Option<String>) -> Self {
        Self { key_id }
    }
}

#[async_trait]
impl PaymentProviderClient for LoggingPaymentProvider {
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let provider_order_ref = format!("order_{}", Uuid::new_v4().simple());
        info!(%provider_order_ref, %amount, %currency, %receipt, "Created local payment intent");
        Ok(PaymentIntent {
            provider_order_ref,
            amount,
            currency: currency.to_string(),
            key_id: self.key_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genuine_signature_is_accepted() {
        let verifier = PaymentVerifier::new("test_payment_secret_key");
        let sig = verifier.expected_signature("order_abc", "pay_def");
        assert!(verifier.verify("order_abc", "pay_def", &sig).is_ok());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let verifier = PaymentVerifier::new("test_payment_secret_key");
        let mut sig = verifier.expected_signature("order_abc", "pay_def");
        // Flip the last hex digit
        let last = sig.pop().unwrap();
        sig.push(if last == '0' { '1' } else { '0' });
        assert!(verifier.verify("order_abc", "pay_def", &sig).is_err());
    }

    #[test]
    fn tampered_references_are_rejected() {
        let verifier = PaymentVerifier::new("test_payment_secret_key");
        let sig = verifier.expected_signature("order_abc", "pay_def");
        assert!(verifier.verify("order_abc", "pay_other", &sig).is_err());
        assert!(verifier.verify("order_other", "pay_def", &sig).is_err());
    }

    #[test]
    fn different_secrets_disagree() {
        let a = PaymentVerifier::new("secret_one_long_enough");
        let b = PaymentVerifier::new("secret_two_long_enough");
        let sig = a.expected_signature("order_abc", "pay_def");
        assert!(b.verify("order_abc", "pay_def", &sig).is_err());
    }

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq("abcd", "abcd"));
        assert!(!constant_time_eq("abcd", "abce"));
        assert!(!constant_time_eq("abcd", "abc"));
    }
}
