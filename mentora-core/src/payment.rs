use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the provider hands back when an intent is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentReceipt {
    pub gateway_ref: String,
    pub checkout_url: String,
}

/// Payment gateway collaborator. The engine only creates intents here;
/// confirmation and failure arrive later as asynchronous signals keyed by
/// `gateway_ref`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: i32,
        currency: &str,
        metadata: serde_json::Value,
    ) -> Result<IntentReceipt, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct MockPaymentGateway;

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_intent(
        &self,
        _amount: i32,
        _currency: &str,
        metadata: serde_json::Value,
    ) -> Result<IntentReceipt, Box<dyn std::error::Error + Send + Sync>> {
        // Trigger for testing gateway outages
        if metadata.get("fail_intent").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Err("Simulated Payment Gateway Failure".into());
        }

        let ref_id = Uuid::new_v4().simple().to_string();
        Ok(IntentReceipt {
            gateway_ref: format!("mock_pi_{}", ref_id),
            checkout_url: format!("https://checkout.mock.test/{}", ref_id),
        })
    }
}
