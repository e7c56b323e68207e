use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the marketplace the account belongs to.
///
/// `Admin` is only ever assigned on the backend. Tags this client does not
/// know decode as `Other` instead of failing the whole row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Candidate,
    Freelancer,
    Recruiter,
    Admin,
    #[serde(other)]
    Other,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Candidate => "candidate",
            UserType::Freelancer => "freelancer",
            UserType::Recruiter => "recruiter",
            UserType::Admin => "admin",
            UserType::Other => "other",
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    /// Parses the self-service types only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "candidate" => Ok(UserType::Candidate),
            "freelancer" => Ok(UserType::Freelancer),
            "recruiter" => Ok(UserType::Recruiter),
            other => Err(format!("unknown user type '{other}'")),
        }
    }
}

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_used_trial: Option<bool>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn user_type(&self) -> UserType {
        self.user_type.unwrap_or_default()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false) || self.user_type == Some(UserType::Admin)
    }
}

/// Insert payload written right after an auth identity is created.
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub user_type: UserType,
    pub trial_ends_at: DateTime<Utc>,
}

/// Partial update for the `profiles` row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ProfileUpdate::default()
    }

    /// Applies the set fields onto a profile row.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(email) = &self.email {
            profile.email = email.clone();
        }
        if let Some(full_name) = &self.full_name {
            profile.full_name = Some(full_name.clone());
        }
        if let Some(user_type) = self.user_type {
            profile.user_type = Some(user_type);
        }
        if let Some(title) = &self.title {
            profile.title = Some(title.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(location) = &self.location {
            profile.location = Some(location.clone());
        }
        if let Some(linkedin) = &self.linkedin {
            profile.linkedin = Some(linkedin.clone());
        }
        if let Some(website) = &self.website {
            profile.website = Some(website.clone());
        }
    }
}
