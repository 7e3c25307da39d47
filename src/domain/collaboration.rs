//! The collaboration aggregate.
//!
//! A [`Collaboration`] owns its [`Requirement`]s outright; removing a
//! collaboration removes them with it. Status reads here are derived and
//! informational. Nothing in this module moves a collaboration to
//! `completed` on its own.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CollaborationId, Error, Requirement, RequirementId, RequirementSpec, UserId};

/// A creative project looking for collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaboration {
    pub(crate) id: CollaborationId,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) creator_id: UserId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) status: CollaborationStatus,
    /// Requirements in display order.
    #[serde(default)]
    pub(crate) requirements: Vec<Requirement>,
}

/// Lifecycle of a collaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationStatus {
    /// Open for business.
    Active,
    /// Marked done by the creator.
    Completed,
    /// Called off by the creator.
    Cancelled,
}

impl fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Input for creating a collaboration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCollaboration {
    /// Project title.
    pub title: String,
    /// Project description.
    #[serde(default)]
    pub description: String,
    /// Roles needed from the outset.
    #[serde(default)]
    pub requirements: Vec<RequirementSpec>,
}

impl Collaboration {
    /// Builds an active collaboration and its requirements.
    ///
    /// Nothing is built unless every requirement spec is valid.
    pub(crate) fn create(creator_id: UserId, new: NewCollaboration) -> Result<Self, Error> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::validation("title", "title must not be empty"));
        }

        let id = CollaborationId::new();
        let requirements = new
            .requirements
            .into_iter()
            .map(|spec| Requirement::from_spec(id, spec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            title: title.to_string(),
            description: new.description.trim().to_string(),
            creator_id,
            created_at: Utc::now(),
            status: CollaborationStatus::Active,
            requirements,
        })
    }

    /// The collaboration's identifier.
    #[must_use]
    pub const fn id(&self) -> CollaborationId {
        self.id
    }

    /// Project title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Project description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The user who created the project and decides on its applications.
    #[must_use]
    pub const fn creator_id(&self) -> &UserId {
        &self.creator_id
    }

    /// When the project was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> CollaborationStatus {
        self.status
    }

    /// Whether the project is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == CollaborationStatus::Active
    }

    /// Whether `user` created this project.
    #[must_use]
    pub fn is_creator(&self, user: &UserId) -> bool {
        &self.creator_id == user
    }

    /// The project's requirements, in display order.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Looks up one of this project's requirements.
    #[must_use]
    pub fn requirement(&self, id: RequirementId) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    pub(crate) fn requirement_mut(&mut self, id: RequirementId) -> Option<&mut Requirement> {
        self.requirements.iter_mut().find(|r| r.id == id)
    }

    /// Fails with [`Error::CollaborationInactive`] unless the project is
    /// active.
    pub(crate) fn ensure_active(&self) -> Result<(), Error> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::CollaborationInactive {
                collaboration: self.id,
                status: self.status,
            })
        }
    }

    /// Total slots filled and needed across every requirement.
    ///
    /// Counted in `u64` so that any number of `u32` quantities fits.
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        self.requirements.iter().fold((0, 0), |(filled, needed), r| {
            (
                filled + u64::from(r.quantity_filled),
                needed + u64::from(r.quantity_needed),
            )
        })
    }

    /// Overall fill percentage across every requirement.
    ///
    /// A project with no requirements reports 0.
    #[must_use]
    pub fn progress(&self) -> u8 {
        let (filled, needed) = self.totals();
        percentage(filled, needed)
    }
}

/// Fill percentage of a requirement, rounded to the nearest integer.
///
/// For display only; status transitions never consult it.
#[must_use]
pub fn derive_progress(requirement: &Requirement) -> u8 {
    percentage(
        u64::from(requirement.quantity_filled),
        u64::from(requirement.quantity_needed),
    )
}

/// Whether every requirement of the collaboration is closed.
///
/// This is informational. A fully staffed project may still be mid-way
/// through its work, so the collaboration's own status is left alone.
#[must_use]
pub fn is_fully_staffed(collaboration: &Collaboration) -> bool {
    collaboration
        .requirements
        .iter()
        .all(|r| !r.is_open())
}

fn percentage(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = u128::from(part.min(whole));
    let whole = u128::from(whole);
    // round half up
    let pct = (part * 200 + whole) / (whole * 2);
    u8::try_from(pct).unwrap_or(100)
}
