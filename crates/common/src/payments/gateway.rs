//! Payment gateway abstraction
//!
//! Provides a unified interface for online checkout providers:
//! - Razorpay (orders API, HMAC-SHA256 receipts)
//! - Mock (deterministic, for tests and local runs)

use crate::config::GatewayConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type HmacSha256 = Hmac<Sha256>;

/// Order to open with the gateway
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: serde_json::Value,
}

/// Order as acknowledged by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Trait for online payment providers
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an order the client can pay against
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder>;

    /// Check the receipt signature for `order_id|payment_id`
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Public key handed to the checkout client
    fn key_id(&self) -> &str;

    fn provider(&self) -> &str;
}

/// Hex HMAC-SHA256 of `order_id|payment_id`
pub fn sign_order_payment(secret: &str, order_id: &str, payment_id: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AppError::Internal {
        message: format!("Invalid signing key: {}", e),
    })?;
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a hex signature against the expected MAC
pub fn verify_order_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

/// Razorpay orders client
pub struct RazorpayGateway {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
    api_base: String,
}

#[derive(Deserialize)]
struct RazorpayErrorBody {
    error: Option<RazorpayErrorDetail>,
}

#[derive(Deserialize)]
struct RazorpayErrorDetail {
    description: Option<String>,
    message: Option<String>,
}

impl RazorpayGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let (Some(key_id), Some(key_secret)) = (config.key_id.clone(), config.key_secret.clone())
        else {
            return Err(AppError::Configuration {
                message: "payments.gateway.key_id and key_secret are required for razorpay"
                    .to_string(),
            });
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            key_id,
            key_secret,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn make_request(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        let url = format!("{}/orders", self.api_base);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::UpstreamPaymentFailure {
                status: None,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<RazorpayErrorBody> = response.json().await.ok();
            let reason = body
                .and_then(|b| b.error)
                .and_then(|e| e.description.or(e.message))
                .unwrap_or_else(|| "Failed to create payment order".to_string());
            return Err(AppError::UpstreamPaymentFailure {
                status: Some(status.as_u16()),
                reason,
            });
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| AppError::UpstreamPaymentFailure {
                status: Some(status.as_u16()),
                reason: format!("Unreadable order response: {}", e),
            })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        let start = Instant::now();
        let result = self.make_request(request).await;
        metrics::record_gateway_call(start.elapsed().as_secs_f64(), "razorpay", result.is_ok());

        if let Err(ref e) = result {
            tracing::warn!(receipt = %request.receipt, error = %e, "Gateway order creation failed");
        }
        result
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_order_signature(&self.key_secret, order_id, payment_id, signature)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn provider(&self) -> &str {
        "razorpay"
    }
}

/// Mock gateway for testing
pub struct MockGateway {
    secret: String,
    failure: Option<String>,
    orders: AtomicU64,
}

impl MockGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            failure: None,
            orders: AtomicU64::new(0),
        }
    }

    /// Gateway whose order creation always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new("mock_secret")
        }
    }

    /// Sign a receipt the way the real checkout would
    pub fn sign(&self, order_id: &str, payment_id: &str) -> Result<String> {
        sign_order_payment(&self.secret, order_id, payment_id)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        if let Some(ref reason) = self.failure {
            return Err(AppError::UpstreamPaymentFailure {
                status: Some(400),
                reason: reason.clone(),
            });
        }

        let n = self.orders.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(GatewayOrder {
            id: format!("order_mock_{:06}", n),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_order_signature(&self.secret, order_id, payment_id, signature)
    }

    fn key_id(&self) -> &str {
        "mock_key"
    }

    fn provider(&self) -> &str {
        "mock"
    }
}

/// Create a gateway based on configuration
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn PaymentGateway>> {
    match config.provider.as_str() {
        "razorpay" => Ok(Arc::new(RazorpayGateway::new(config)?)),
        "mock" => {
            let secret = config.key_secret.clone().unwrap_or_else(|| "mock_secret".to_string());
            Ok(Arc::new(MockGateway::new(secret)))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown payment gateway provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let signature = sign_order_payment("secret", "order_1", "pay_1").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_order_signature("secret", "order_1", "pay_1", &signature));
    }

    #[test]
    fn test_tampered_signatures_rejected() {
        let signature = sign_order_payment("secret", "order_1", "pay_1").unwrap();

        assert!(!verify_order_signature("other", "order_1", "pay_1", &signature));
        assert!(!verify_order_signature("secret", "order_1", "pay_2", &signature));
        assert!(!verify_order_signature("secret", "order_1", "pay_1", "not-hex"));
        assert!(!verify_order_signature("secret", "order_1", "pay_1", &signature[..62]));
    }

    #[tokio::test]
    async fn test_mock_gateway_orders() {
        let gateway = MockGateway::new("secret");
        let request = OrderRequest {
            amount: 49_900,
            currency: "INR".to_string(),
            receipt: "rcpt".to_string(),
            notes: serde_json::json!({}),
        };

        let first = gateway.create_order(&request).await.unwrap();
        let second = gateway.create_order(&request).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.amount, 49_900);
    }

    #[tokio::test]
    async fn test_failing_gateway_keeps_reason() {
        let gateway = MockGateway::failing("Amount exceeds maximum amount allowed");
        let request = OrderRequest {
            amount: 1,
            currency: "INR".to_string(),
            receipt: "rcpt".to_string(),
            notes: serde_json::json!({}),
        };

        match gateway.create_order(&request).await {
            Err(AppError::UpstreamPaymentFailure { reason, .. }) => {
                assert_eq!(reason, "Amount exceeds maximum amount allowed");
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.id)),
        }
    }

    #[test]
    fn test_factory() {
        let mut config = GatewayConfig::default();
        config.provider = "mock".to_string();
        assert_eq!(create_gateway(&config).unwrap().provider(), "mock");

        config.provider = "razorpay".to_string();
        assert!(matches!(
            create_gateway(&config),
            Err(AppError::Configuration { .. })
        ));

        config.provider = "paypal".to_string();
        assert!(create_gateway(&config).is_err());
    }
}
