//! Payment gateway abstraction. The orchestrator talks to this trait; the
//! wallet implementation lives in [`momo`]. Tests substitute a fake.

pub mod momo;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::ServiceError;

/// A create-payment request handed to the gateway.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Gateway-scoped request id, unique per attempt.
    pub request_id: String,
    /// Merchant order number the gateway echoes back in the callback.
    pub order_id: String,
    /// Amount in the gateway's smallest currency unit (VND has no minor unit).
    pub amount: Decimal,
    /// Short human-readable description shown on the payment page.
    pub order_info: String,
    /// Opaque merchant payload echoed back unchanged.
    pub extra_data: String,
}

/// The gateway's answer to a create-payment request.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    /// URL the customer is sent to in order to complete payment.
    pub pay_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: &PaymentRequest)
        -> Result<PaymentSession, ServiceError>;
}
