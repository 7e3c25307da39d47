use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ApplicationId, Error, RequirementId, UserId};

/// A user's bid to fill a [`Requirement`](crate::Requirement).
///
/// Everything except `status` is fixed at creation. `status` moves from
/// pending to accepted or rejected exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub(crate) id: ApplicationId,
    pub(crate) requirement_id: RequirementId,
    pub(crate) applicant_id: UserId,
    pub(crate) applicant_name: String,
    pub(crate) message: String,
    pub(crate) status: ApplicationStatus,
    pub(crate) applied_at: DateTime<Utc>,
}

/// Where an application is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    /// Awaiting the creator's decision.
    Pending,
    /// Accepted; occupies a slot.
    Accepted,
    /// Rejected. The applicant may apply again.
    Rejected,
}

impl ApplicationStatus {
    /// Pending and accepted applications block the applicant from applying
    /// again to the same requirement.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        })
    }
}

/// The creator's verdict on a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Give the applicant a slot.
    Accept,
    /// Turn the applicant down.
    Reject,
}

impl Decision {
    /// The status an application ends up in after this decision.
    #[must_use]
    pub const fn outcome(self) -> ApplicationStatus {
        match self {
            Self::Accept => ApplicationStatus::Accepted,
            Self::Reject => ApplicationStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        })
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown decision '{other}' (expected accept or reject)")),
        }
    }
}

impl Application {
    pub(crate) fn new(
        requirement_id: RequirementId,
        applicant_id: UserId,
        applicant_name: String,
        message: String,
    ) -> Self {
        Self {
            id: ApplicationId::new(),
            requirement_id,
            applicant_id,
            applicant_name,
            message,
            status: ApplicationStatus::Pending,
            applied_at: Utc::now(),
        }
    }

    /// The application's identifier.
    #[must_use]
    pub const fn id(&self) -> ApplicationId {
        self.id
    }

    /// The requirement applied to.
    #[must_use]
    pub const fn requirement_id(&self) -> RequirementId {
        self.requirement_id
    }

    /// Who applied.
    #[must_use]
    pub const fn applicant_id(&self) -> &UserId {
        &self.applicant_id
    }

    /// The applicant's display name at the time of applying.
    #[must_use]
    pub fn applicant_name(&self) -> &str {
        &self.applicant_name
    }

    /// The applicant's pitch.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ApplicationStatus {
        self.status
    }

    /// When the application was submitted.
    #[must_use]
    pub const fn applied_at(&self) -> DateTime<Utc> {
        self.applied_at
    }

    /// Whether the application is still awaiting a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }
}

/// Trims an application message and checks it against the length limit.
///
/// # Errors
///
/// [`Error::EmptyMessage`] if nothing is left after trimming, or
/// [`Error::Validation`] if it is longer than `max_len` characters.
pub fn normalize_message(message: &str, max_len: usize) -> Result<String, Error> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyMessage);
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(Error::validation(
            "message",
            format!("{len} characters exceeds the limit of {max_len}"),
        ));
    }
    Ok(trimmed.to_string())
}
