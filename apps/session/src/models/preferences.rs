use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row of the `user_preferences` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub job_types: Vec<String>,
    #[serde(default)]
    pub preferred_locations: Vec<String>,
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
    pub preferred_currency: Option<String>,
    pub remote_preference: Option<String>,
    #[serde(default)]
    pub gdpr_consent: Option<bool>,
    #[serde(default)]
    pub marketing_consent: Option<bool>,
    #[serde(default)]
    pub data_retention_accepted: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
