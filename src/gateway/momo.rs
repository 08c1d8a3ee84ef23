//! MoMo wallet client. Builds the signed create-payment request, posts it to
//! the gateway and extracts the pay URL from the response.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{error, instrument};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

use super::{PaymentGateway, PaymentRequest, PaymentSession};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TYPE: &str = "captureWallet";

/// Response body of the create endpoint. Only the fields we act on.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "resultCode")]
    result_code: Option<i64>,
    message: Option<String>,
    #[serde(rename = "payUrl")]
    pay_url: Option<String>,
}

/// Resolved credentials. Pulled out of [`GatewayConfig`] per call so a client
/// can be constructed before credentials exist.
struct Credentials<'a> {
    partner_code: &'a str,
    access_key: &'a str,
    secret_key: &'a str,
}

#[derive(Clone)]
pub struct MomoClient {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl MomoClient {
    /// Always succeeds; missing credentials surface as a configuration error
    /// on the first create-payment call, not at startup.
    pub fn new(config: GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, http }
    }

    fn credentials(&self) -> Result<Credentials<'_>, ServiceError> {
        match (
            self.config.partner_code.as_deref(),
            self.config.access_key.as_deref(),
            self.config.secret_key.as_deref(),
        ) {
            (Some(partner_code), Some(access_key), Some(secret_key)) => Ok(Credentials {
                partner_code,
                access_key,
                secret_key,
            }),
            _ => Err(ServiceError::MissingConfiguration(
                "gateway partner_code, access_key and secret_key must be set".to_string(),
            )),
        }
    }

    fn urls(&self) -> Result<(&str, &str), ServiceError> {
        match (
            self.config.redirect_url.as_deref(),
            self.config.ipn_url.as_deref(),
        ) {
            (Some(redirect), Some(ipn)) => Ok((redirect, ipn)),
            _ => Err(ServiceError::MissingConfiguration(
                "gateway redirect_url and ipn_url must be set".to_string(),
            )),
        }
    }
}

/// Canonical raw-signature string. Field order is fixed by the gateway
/// contract; reordering produces a signature the gateway rejects.
fn raw_signature(
    access_key: &str,
    partner_code: &str,
    redirect_url: &str,
    ipn_url: &str,
    request: &PaymentRequest,
) -> String {
    format!(
        "accessKey={}&amount={}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
        access_key,
        request.amount,
        request.extra_data,
        ipn_url,
        request.order_id,
        request.order_info,
        partner_code,
        redirect_url,
        request.request_id,
        REQUEST_TYPE,
    )
}

/// HMAC-SHA256 over the raw string, hex-encoded lowercase.
fn sign(raw: &str, secret_key: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).expect("hmac key");
    mac.update(raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl PaymentGateway for MomoClient {
    #[instrument(skip(self), fields(order_id = %request.order_id))]
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let creds = self.credentials()?;
        let (redirect_url, ipn_url) = self.urls()?;

        let raw = raw_signature(
            creds.access_key,
            creds.partner_code,
            redirect_url,
            ipn_url,
            request,
        );
        let signature = sign(&raw, creds.secret_key);

        let body = json!({
            "partnerCode": creds.partner_code,
            "accessKey": creds.access_key,
            "requestId": request.request_id,
            "amount": request.amount.to_string(),
            "orderId": request.order_id,
            "orderInfo": request.order_info,
            "redirectUrl": redirect_url,
            "ipnUrl": ipn_url,
            "extraData": request.extra_data,
            "requestType": REQUEST_TYPE,
            "signature": signature,
            "lang": "vi",
        });

        let response = self
            .http
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gateway request failed: {}", e);
                ServiceError::ExternalServiceError(format!("payment gateway unreachable: {e}"))
            })?;

        let status = response.status();
        let parsed: CreateResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!(
                "payment gateway returned an unreadable body (HTTP {status}): {e}"
            ))
        })?;

        match parsed.pay_url {
            Some(pay_url) => Ok(PaymentSession { pay_url }),
            None => {
                let code = parsed.result_code.unwrap_or(-1);
                let message = parsed.message.unwrap_or_else(|| "no payUrl".to_string());
                error!(result_code = code, "Gateway refused payment: {}", message);
                Err(ServiceError::ExternalServiceError(format!(
                    "payment gateway refused the request (code {code}): {message}"
                )))
            }
        }
    }
}
