use thiserror::Error;
use uuid::Uuid;

/// Closed set of failure categories at the backend boundary.
/// Callers branch on this instead of matching message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CredentialRejected,
    NetworkUnavailable,
    NotFound,
    Conflict,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CredentialRejected => "credential_rejected",
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// A failed backend call. `message` is the backend's own text, untranslated.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    /// Backend-specific code such as `PGRST116` or `invalid_credentials`.
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Classifies an HTTP error response by status and backend code.
    pub fn from_response(status: u16, code: Option<String>, message: String) -> Self {
        let kind = classify(status, code.as_deref(), &message);
        Self {
            kind,
            status: Some(status),
            code,
            message,
        }
    }
}

fn classify(status: u16, code: Option<&str>, message: &str) -> ErrorKind {
    match code {
        Some("PGRST116") | Some("user_not_found") => return ErrorKind::NotFound,
        Some("invalid_credentials") | Some("invalid_grant") | Some("email_not_confirmed")
        | Some("bad_jwt") | Some("session_not_found") | Some("PGRST301") => {
            return ErrorKind::CredentialRejected
        }
        Some("user_already_exists") | Some("email_exists") | Some("23505") => {
            return ErrorKind::Conflict
        }
        _ => {}
    }

    let lowered = message.to_lowercase();
    if lowered.contains("already registered") || lowered.contains("already exists") {
        return ErrorKind::Conflict;
    }
    if lowered.contains("invalid login credentials") || lowered.contains("jwt expired") {
        return ErrorKind::CredentialRejected;
    }

    match status {
        401 | 403 => ErrorKind::CredentialRejected,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        502..=504 => ErrorKind::NetworkUnavailable,
        _ => ErrorKind::Unknown,
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_connect() || e.is_timeout() || e.is_request() {
            ErrorKind::NetworkUnavailable
        } else {
            ErrorKind::Unknown
        };
        let mut err = BackendError::new(kind, e.to_string());
        err.status = e.status().map(|s| s.as_u16());
        err
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::new(ErrorKind::Unknown, format!("Malformed backend response: {e}"))
    }
}

/// Errors surfaced by `SessionStore` operations.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Password must be at least 9 characters and contain an uppercase letter, a lowercase letter, a digit and a special character")]
    WeakPassword,

    #[error("This email address is already registered")]
    EmailInUse,

    #[error("No authenticated user")]
    NotAuthenticated,

    #[error("Authenticated user {0} has no profile row")]
    MissingProfile(Uuid),
}

impl SessionError {
    /// The backend error kind, or the closest match for store-level failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Backend(e) => e.kind,
            SessionError::WeakPassword => ErrorKind::Unknown,
            SessionError::EmailInUse => ErrorKind::Conflict,
            SessionError::NotAuthenticated => ErrorKind::CredentialRejected,
            SessionError::MissingProfile(_) => ErrorKind::NotFound,
        }
    }
}
