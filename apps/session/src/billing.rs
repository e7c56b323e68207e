//! Checkout and customer-portal sessions brokered by backend functions.
//!
//! The client never sees card data: it asks a backend function for a hosted
//! checkout or portal URL and hands that URL to the user.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::errors::{BackendError, ErrorKind};
use crate::models::{Subscription, UserType};

pub const CREATE_CHECKOUT_SESSION: &str = "create-checkout-session";
pub const CREATE_PORTAL_SESSION: &str = "create-portal-session";
pub const CHECK_SESSION_STATUS: &str = "check-session-status";
pub const LIST_INVOICES: &str = "list-invoices";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutStatus {
    /// Processor-side status, e.g. `complete`, `open` or `expired`.
    pub status: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
}

impl CheckoutStatus {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

/// Invoice as listed by the payment processor. Amounts are in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub number: Option<String>,
    pub amount_paid: i64,
    pub currency: String,
    pub status: String,
    /// Unix timestamp, seconds.
    pub created: i64,
    pub hosted_invoice_url: Option<String>,
    pub pdf: Option<String>,
}

impl Invoice {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.created, 0).single()
    }
}

#[derive(Clone)]
pub struct BillingService {
    backend: Arc<dyn BackendClient>,
}

impl BillingService {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        user_id: Uuid,
        user_type: UserType,
    ) -> Result<CheckoutSession, BackendError> {
        let response = self
            .backend
            .invoke_function(
                CREATE_CHECKOUT_SESSION,
                json!({
                    "priceId": price_id,
                    "userId": user_id,
                    "userType": user_type.as_str(),
                }),
            )
            .await?;
        let session: CheckoutSession = serde_json::from_value(response)?;
        info!("Created checkout session {} for {user_id}", session.session_id);
        Ok(session)
    }

    /// Portal session for the subscription's billing customer.
    pub async fn create_portal_session(
        &self,
        subscription: &Subscription,
    ) -> Result<PortalSession, BackendError> {
        let customer_id = subscription.stripe_customer_id.as_deref().ok_or_else(|| {
            BackendError::new(ErrorKind::NotFound, "Subscription has no billing customer")
        })?;

        let response = self
            .backend
            .invoke_function(CREATE_PORTAL_SESSION, json!({ "customerId": customer_id }))
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Invoices billed to the user, newest first as returned by the processor.
    /// An empty body means no invoices.
    pub async fn list_invoices(&self, user_id: Uuid) -> Result<Vec<Invoice>, BackendError> {
        let response = self
            .backend
            .invoke_function(LIST_INVOICES, json!({ "userId": user_id }))
            .await?;
        if response.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(response)?)
    }

    pub async fn check_session_status(
        &self,
        session_id: &str,
    ) -> Result<CheckoutStatus, BackendError> {
        let response = self
            .backend
            .invoke_function(CHECK_SESSION_STATUS, json!({ "sessionId": session_id }))
            .await?;
        Ok(serde_json::from_value(response)?)
    }
}
