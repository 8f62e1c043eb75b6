//! Payment adapter and gateway result handling
//!
//! `create_payment` opens a pending invoice and returns a signed redirect to
//! the gateway. `handle_result` verifies the callback and settles the invoice;
//! the store flips `pending -> completed` and credits the tokens in one unit,
//! so repeated deliveries of the same callback credit at most once.

pub mod signature;
pub mod webhook;

pub use signature::HashAlgorithm;
pub use webhook::{parse_amount, ResultNotification};

use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::store::{Settlement, Store, StoreError};

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway is not configured")]
    Configuration,

    #[error("Authentication required to create a payment")]
    Unauthorized,

    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Payment gateway is not configured")]
    Configuration,

    #[error("Malformed notification: {0}")]
    Malformed(String),

    #[error("Signature mismatch")]
    InvalidSignature,

    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: i64, received: String },

    #[error("Payment with invoice {0} not found")]
    PaymentNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Redirect target for the buyer
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLink {
    pub redirect_url: String,
    pub invoice_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub invoice_id: i64,
    /// False when this delivery was a duplicate of an already settled invoice
    pub credited: bool,
}

impl SettlementOutcome {
    /// Body the gateway expects on success
    pub fn acknowledgement(&self) -> String {
        format!("OK{}", self.invoice_id)
    }
}

/// Signed gateway redirect for an invoice
pub fn redirect_url(
    gateway: &GatewayConfig,
    amount: i64,
    invoice_id: i64,
    description: &str,
) -> Result<String, PaymentError> {
    let out_sum = amount.to_string();
    let inv_id = invoice_id.to_string();
    let signature = signature::sign(
        gateway.hash_algorithm,
        &[
            gateway.merchant_login.as_str(),
            out_sum.as_str(),
            inv_id.as_str(),
            gateway.password1.as_str(),
        ],
    );

    let mut params = vec![
        ("MerchantLogin", gateway.merchant_login.as_str()),
        ("OutSum", out_sum.as_str()),
        ("InvId", inv_id.as_str()),
        ("Description", description),
        ("SignatureValue", signature.as_str()),
    ];
    if gateway.is_test {
        params.push(("IsTest", "1"));
    }

    Url::parse_with_params(&gateway.base_url, &params)
        .map(String::from)
        .map_err(|e| PaymentError::InvalidRequest(format!("gateway URL: {}", e)))
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Option<GatewayConfig>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, gateway: Option<GatewayConfig>) -> Self {
        Self { store, gateway }
    }

    /// Open a pending invoice for `tokens` priced at `amount`
    pub async fn create_payment(
        &self,
        user_id: Option<Uuid>,
        amount: i64,
        tokens: i64,
    ) -> Result<PaymentLink, PaymentError> {
        let gateway = self.gateway.as_ref().ok_or(PaymentError::Configuration)?;
        let user_id = user_id.ok_or(PaymentError::Unauthorized)?;

        if amount <= 0 {
            return Err(PaymentError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }
        if tokens <= 0 {
            return Err(PaymentError::InvalidRequest(
                "tokens must be positive".to_string(),
            ));
        }

        let payment = self.store.create_pending(user_id, amount, tokens).await?;
        let description = format!("Покупка {} токенов", tokens);
        let redirect_url = redirect_url(gateway, amount, payment.invoice_id, &description)?;

        tracing::info!(
            user_id = %user_id,
            invoice_id = payment.invoice_id,
            amount,
            tokens,
            "Payment created"
        );

        Ok(PaymentLink {
            redirect_url,
            invoice_id: payment.invoice_id,
        })
    }

    /// Verify a gateway result callback and settle its invoice
    pub async fn handle_result(
        &self,
        notification: &ResultNotification,
    ) -> Result<SettlementOutcome, WebhookError> {
        let gateway = self.gateway.as_ref().ok_or(WebhookError::Configuration)?;

        let invoice_id: i64 = notification
            .inv_id
            .trim()
            .parse()
            .map_err(|_| WebhookError::Malformed(format!("InvId '{}'", notification.inv_id)))?;

        let signed = signature::verify(
            gateway.hash_algorithm,
            &[
                notification.out_sum.as_str(),
                notification.inv_id.as_str(),
                gateway.password2.as_str(),
            ],
            &notification.signature_value,
        );
        if !signed {
            tracing::warn!(invoice_id, "Rejected result callback with bad signature");
            return Err(WebhookError::InvalidSignature);
        }

        let received = parse_amount(&notification.out_sum).ok_or_else(|| {
            WebhookError::Malformed(format!("OutSum '{}'", notification.out_sum))
        })?;

        let payment = self
            .store
            .find_by_invoice(invoice_id)
            .await?
            .ok_or(WebhookError::PaymentNotFound(invoice_id))?;

        if payment.amount != received {
            tracing::warn!(invoice_id, expected = payment.amount, received, "Result callback amount mismatch");
            return Err(WebhookError::AmountMismatch {
                expected: payment.amount,
                received: notification.out_sum.clone(),
            });
        }

        let description = format!("Покупка {} токенов (счёт {})", payment.tokens, invoice_id);
        let credited = match self.store.settle(invoice_id, &description).await? {
            Settlement::Settled { transaction, .. } => {
                tracing::info!(
                    invoice_id,
                    user_id = %transaction.user_id,
                    tokens = transaction.amount,
                    balance_after = transaction.balance_after,
                    "Payment settled"
                );
                true
            }
            Settlement::AlreadyCompleted(_) => {
                tracing::info!(invoice_id, "Duplicate result callback, already settled");
                false
            }
            Settlement::NotFound => return Err(WebhookError::PaymentNotFound(invoice_id)),
        };

        Ok(SettlementOutcome {
            invoice_id,
            credited,
        })
    }
}
