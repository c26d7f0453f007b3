//! Payment-session service client.
//!
//! The storefront never handles card data. It posts the cart snapshot to
//! `POST /api/payments/create-session` and gets back either a redirect URL
//! (hosted checkout) or a QR session (`BenefitPay`), which the shopper is sent
//! on to.

use std::future::Future;
use std::sync::Arc;

use aqs_core::{CartItem, CurrencyCode, ValidContact};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use crate::config::PaymentsConfig;

/// Path of the session endpoint under the payments base URL.
pub const CREATE_SESSION_PATH: &str = "/api/payments/create-session";

/// Errors that can occur when creating a payment session.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Payment session failed ({status}): {message}")]
    Status { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response was neither a redirect nor a QR session.
    #[error("Unexpected payment response")]
    UnexpectedResponse,
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PayMethod {
    #[serde(rename = "benefitpay")]
    BenefitPay,
    #[default]
    #[serde(rename = "paypal")]
    PayPal,
    #[serde(rename = "applepay")]
    ApplePay,
    #[serde(rename = "googlepay")]
    GooglePay,
}

/// A cart line as sent to the payment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionItem {
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    pub image_url: String,
}

impl From<&CartItem> for SessionItem {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.perfume.id.to_string(),
            name: item.perfume.name.clone(),
            price: item.perfume.price,
            quantity: item.quantity,
            image_url: item.perfume.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCustomer {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionShipping {
    pub address_text: String,
}

/// Body of a create-session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSessionRequest {
    pub method: PayMethod,
    pub items: Vec<SessionItem>,
    pub currency: CurrencyCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<SessionCustomer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<SessionShipping>,
}

impl CreateSessionRequest {
    /// Build a request from cart lines and validated contact details.
    #[must_use]
    pub fn new(
        method: PayMethod,
        items: &[CartItem],
        currency: CurrencyCode,
        contact: &ValidContact,
    ) -> Self {
        Self {
            method,
            items: items.iter().map(SessionItem::from).collect(),
            currency,
            customer: Some(SessionCustomer {
                email: contact.email.to_string(),
            }),
            shipping: Some(SessionShipping {
                address_text: contact.shipping_address.to_string(),
            }),
        }
    }
}

/// Where the shopper goes next.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PaymentSession {
    /// Full-page navigation to a hosted checkout.
    #[serde(rename_all = "camelCase")]
    Redirect { redirect_url: String },
    /// In-app QR confirmation view.
    #[serde(rename_all = "camelCase")]
    Qr {
        qr_url: String,
        session_id: String,
        /// Any other fields the service returned, passed through to the view.
        extra: Map<String, Value>,
    },
}

impl PaymentSession {
    /// Interpret a create-session response body.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::UnexpectedResponse`] unless the body carries a
    /// non-empty `redirectUrl`, or a non-empty `qrUrl` with a `sessionId`.
    pub fn from_response(body: Value) -> Result<Self, PaymentError> {
        let Value::Object(mut fields) = body else {
            return Err(PaymentError::UnexpectedResponse);
        };

        if let Some(url) = non_empty(&fields, "redirectUrl") {
            return Ok(Self::Redirect { redirect_url: url });
        }
        match (non_empty(&fields, "qrUrl"), non_empty(&fields, "sessionId")) {
            (Some(qr_url), Some(session_id)) => {
                fields.remove("qrUrl");
                fields.remove("sessionId");
                Ok(Self::Qr {
                    qr_url,
                    session_id,
                    extra: fields,
                })
            }
            _ => Err(PaymentError::UnexpectedResponse),
        }
    }

    /// Location to send the shopper to.
    #[must_use]
    pub fn next_location(&self) -> String {
        match self {
            Self::Redirect { redirect_url } => redirect_url.clone(),
            Self::Qr { session_id, .. } => {
                format!("/benefitpay/{}", urlencoding::encode(session_id))
            }
        }
    }
}

fn non_empty(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Creates payment sessions.
pub trait PaymentGateway: Send + Sync + 'static {
    fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> impl Future<Output = Result<PaymentSession, PaymentError>> + Send;
}

// =============================================================================
// PaymentClient
// =============================================================================

/// HTTP client for the payment-session service.
#[derive(Clone)]
pub struct PaymentClient {
    inner: Arc<PaymentClientInner>,
}

struct PaymentClientInner {
    client: reqwest::Client,
    endpoint: String,
}

impl PaymentClient {
    #[must_use]
    pub fn new(config: &PaymentsConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client sharing an existing connection pool.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &PaymentsConfig) -> Self {
        Self {
            inner: Arc::new(PaymentClientInner {
                client,
                endpoint: format!("{}{CREATE_SESSION_PATH}", config.base_url),
            }),
        }
    }
}

impl PaymentGateway for PaymentClient {
    #[instrument(skip(self, request), fields(method = ?request.method, items = request.items.len()))]
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| text.chars().take(200).collect());
            tracing::error!(status = %status, message = %message, "Payment session request failed");
            return Err(PaymentError::Status {
                status: status.as_u16(),
                message,
            });
        }

        PaymentSession::from_response(serde_json::from_str(&text)?)
    }
}
