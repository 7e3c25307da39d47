use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{CollaborationId, Error, RequirementId};

/// A role slot that a collaboration needs filled.
///
/// `quantity_filled` never exceeds `quantity_needed`, and the requirement is
/// closed whenever the two are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub(crate) id: RequirementId,
    pub(crate) collaboration_id: CollaborationId,
    pub(crate) role: String,
    pub(crate) quantity_needed: u32,
    pub(crate) quantity_filled: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) timing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) status: RequirementStatus,
}

/// Whether a requirement is accepting applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementStatus {
    /// Accepting applications.
    Open,
    /// Full, or closed by the creator.
    Closed,
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// The caller-supplied description of a new requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    /// The role to fill, e.g. "Cinematographer".
    pub role: String,
    /// How many people are needed in this role.
    pub quantity_needed: u32,
    /// Free-form budget, e.g. "$500/day".
    #[serde(default)]
    pub budget: Option<String>,
    /// Free-form timing, e.g. "March 2025".
    #[serde(default)]
    pub timing: Option<String>,
    /// Free-form location, e.g. "Remote".
    #[serde(default)]
    pub location: Option<String>,
    /// Skills the role calls for.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Longer description of the role.
    #[serde(default)]
    pub description: Option<String>,
}

impl RequirementSpec {
    /// A spec with just a role and a quantity.
    #[must_use]
    pub fn new(role: impl Into<String>, quantity_needed: u32) -> Self {
        Self {
            role: role.into(),
            quantity_needed,
            ..Self::default()
        }
    }

    /// Checks the spec without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the quantity is zero or the role is
    /// blank.
    pub fn validate(&self) -> Result<(), Error> {
        if self.quantity_needed < 1 {
            return Err(Error::validation(
                "quantity_needed",
                "at least one person must be needed",
            ));
        }
        if self.role.trim().is_empty() {
            return Err(Error::validation("role", "role must not be empty"));
        }
        Ok(())
    }
}

impl Requirement {
    /// Builds an open, unfilled requirement from a validated spec.
    pub(crate) fn from_spec(
        collaboration_id: CollaborationId,
        spec: RequirementSpec,
    ) -> Result<Self, Error> {
        spec.validate()?;

        Ok(Self {
            id: RequirementId::new(),
            collaboration_id,
            role: spec.role.trim().to_string(),
            quantity_needed: spec.quantity_needed,
            quantity_filled: 0,
            budget: non_blank(spec.budget),
            timing: non_blank(spec.timing),
            location: non_blank(spec.location),
            skills: spec
                .skills
                .into_iter()
                .map(|skill| skill.trim().to_string())
                .filter(|skill| !skill.is_empty())
                .collect(),
            description: non_blank(spec.description),
            status: RequirementStatus::Open,
        })
    }

    /// The requirement's identifier.
    #[must_use]
    pub const fn id(&self) -> RequirementId {
        self.id
    }

    /// The collaboration that owns this requirement.
    #[must_use]
    pub const fn collaboration_id(&self) -> CollaborationId {
        self.collaboration_id
    }

    /// The role to be filled.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// How many people are needed.
    #[must_use]
    pub const fn quantity_needed(&self) -> u32 {
        self.quantity_needed
    }

    /// How many slots have been filled by accepted applications.
    #[must_use]
    pub const fn quantity_filled(&self) -> u32 {
        self.quantity_filled
    }

    /// Slots still open.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.quantity_needed.saturating_sub(self.quantity_filled)
    }

    /// Budget, if given.
    #[must_use]
    pub fn budget(&self) -> Option<&str> {
        self.budget.as_deref()
    }

    /// Timing, if given.
    #[must_use]
    pub fn timing(&self) -> Option<&str> {
        self.timing.as_deref()
    }

    /// Location, if given.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Skills the role calls for.
    #[must_use]
    pub fn skills(&self) -> &[String] {
        &self.skills
    }

    /// Description, if given.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> RequirementStatus {
        self.status
    }

    /// Whether the requirement is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == RequirementStatus::Open
    }

    /// Whether every slot has been filled.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.quantity_filled >= self.quantity_needed
    }

    /// Fills one slot, closing the requirement when it reaches capacity.
    ///
    /// This is the only place `quantity_filled` changes. Holding `&mut self`
    /// makes the compare and the increment a single step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the requirement is already full.
    /// The requirement is unchanged in that case.
    pub(crate) fn increment_filled(&mut self) -> Result<(), Error> {
        if self.is_full() {
            return Err(Error::CapacityExceeded {
                requirement: self.id,
                quantity_needed: self.quantity_needed,
            });
        }

        self.quantity_filled += 1;
        if self.quantity_filled == self.quantity_needed {
            self.status = RequirementStatus::Closed;
        }
        Ok(())
    }

    /// Closes the requirement regardless of fill level.
    ///
    /// Returns `false` if it was already closed.
    pub(crate) fn close(&mut self) -> bool {
        let was_open = self.is_open();
        self.status = RequirementStatus::Closed;
        was_open
    }

    /// What, if anything, breaks the fill invariants.
    pub(crate) const fn inconsistency(&self) -> Option<&'static str> {
        if self.quantity_needed == 0 {
            Some("needs no one")
        } else if self.quantity_filled > self.quantity_needed {
            Some("is filled beyond capacity")
        } else if self.is_full() && matches!(self.status, RequirementStatus::Open) {
            Some("is full but still open")
        } else {
            None
        }
    }

    /// Whether the stored counters satisfy the fill invariants.
    #[cfg(test)]
    pub(crate) const fn is_consistent(&self) -> bool {
        self.inconsistency().is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::ErrorKind;

    fn requirement(needed: u32) -> Requirement {
        Requirement::from_spec(CollaborationId::new(), RequirementSpec::new("Editor", needed))
            .unwrap()
    }

    #[test]
    fn new_requirement_is_open_and_unfilled() {
        let req = requirement(3);
        assert_eq!(req.quantity_filled(), 0);
        assert_eq!(req.status(), RequirementStatus::Open);
        assert_eq!(req.remaining(), 3);
    }

    #[test]
    fn zero_quantity_is_a_validation_error() {
        let err = Requirement::from_spec(CollaborationId::new(), RequirementSpec::new("Editor", 0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn blank_role_is_a_validation_error() {
        let err = Requirement::from_spec(CollaborationId::new(), RequirementSpec::new("  ", 1))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "role", .. }));
    }

    #[test]
    fn optional_fields_are_normalised() {
        let spec = RequirementSpec {
            budget: Some("  ".to_string()),
            location: Some(" Remote ".to_string()),
            skills: vec!["Premiere".to_string(), " ".to_string()],
            ..RequirementSpec::new(" Editor ", 1)
        };
        let req = Requirement::from_spec(CollaborationId::new(), spec).unwrap();
        assert_eq!(req.role(), "Editor");
        assert_eq!(req.budget(), None);
        assert_eq!(req.location(), Some("Remote"));
        assert_eq!(req.skills(), ["Premiere".to_string()]);
    }

    #[test_case(1; "single slot")]
    #[test_case(2; "two slots")]
    #[test_case(5; "five slots")]
    fn filling_every_slot_closes(needed: u32) {
        let mut req = requirement(needed);
        for filled in 1..=needed {
            req.increment_filled().unwrap();
            assert_eq!(req.quantity_filled(), filled);
            assert_eq!(req.is_open(), filled < needed);
            assert!(req.is_consistent());
        }
    }

    #[test]
    fn increment_past_capacity_fails_without_change() {
        let mut req = requirement(1);
        req.increment_filled().unwrap();
        let before = req.clone();

        let err = req.increment_filled().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(req, before);
    }

    #[test]
    fn close_is_idempotent() {
        let mut req = requirement(2);
        assert!(req.close());
        let once = req.clone();
        assert!(!req.close());
        assert_eq!(req, once);
        assert_eq!(req.status(), RequirementStatus::Closed);
        assert_eq!(req.quantity_filled(), 0);
    }
}
