use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Image reference used when a listing is created without one.
pub const DEFAULT_SERVICE_IMAGE: &str = "default-image.png";

/// Public profile fields of a user. Identity itself belongs to the auth
/// subsystem; this is only what gets joined into listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "help-wanted")]
    HelpWanted,
    #[serde(rename = "offering-help")]
    OfferingHelp,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HelpWanted => "help-wanted",
            Self::OfferingHelp => "offering-help",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown service type '{0}'")]
pub struct UnknownServiceType(pub String);

impl FromStr for ServiceType {
    type Err = UnknownServiceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "help-wanted" => Ok(Self::HelpWanted),
            "offering-help" => Ok(Self::OfferingHelp),
            other => Err(UnknownServiceType(other.to_string())),
        }
    }
}

/// A help-wanted or offering-help listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub category: String,
    pub image: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    /// `true` while the listing is active.
    pub status: bool,
    pub service_type: ServiceType,
    /// Denormalized from the owner at creation time.
    pub username: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A listing with its owner's profile joined in. `owner` is `None` when the
/// owner never published a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceWithOwner {
    #[serde(flatten)]
    pub service: Service,
    pub owner: Option<UserProfile>,
}

/// A single chat message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
