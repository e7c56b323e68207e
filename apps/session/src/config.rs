use std::time::Duration;

use anyhow::{Context, Result};

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Only needed to delete an orphaned identity after a failed sign-up.
    pub service_role_key: Option<String>,
    /// Base URL used to build email redirect links.
    pub site_url: String,
    pub http_timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            supabase_url: require_env("SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            supabase_anon_key: require_env("SUPABASE_ANON_KEY")?,
            service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            site_url: std::env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            http_timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse::<u64>()
                    .context("HTTP_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Builds a config pointing at an explicit backend, with defaults for the rest.
    pub fn new(supabase_url: impl Into<String>, supabase_anon_key: impl Into<String>) -> Self {
        Config {
            supabase_url: supabase_url.into().trim_end_matches('/').to_string(),
            supabase_anon_key: supabase_anon_key.into(),
            service_role_key: None,
            site_url: "http://localhost:5173".to_string(),
            http_timeout: Duration::from_secs(30),
            rust_log: "info".to_string(),
        }
    }

    pub fn signup_redirect(&self) -> String {
        format!("{}/auth/callback", self.site_url.trim_end_matches('/'))
    }

    pub fn reset_password_redirect(&self) -> String {
        format!("{}/auth/reset-password", self.site_url.trim_end_matches('/'))
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
