use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{
    Application, ApplicationId, ApplicationStatus, Collaboration, RequirementId, UserId,
};

/// The unit of persistence: one collaboration, its requirements, and every
/// application made against them.
///
/// Every mutation in the marketplace touches exactly one collaboration, so
/// saving one record is enough to persist it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct CollaborationRecord {
    /// How many times the record has been saved.
    ///
    /// A store only accepts a record whose revision is one past the version
    /// it holds, so a writer working from a stale copy is refused.
    pub revision: u64,
    /// The collaboration, including its requirements.
    pub collaboration: Collaboration,
    /// Applications against any of the collaboration's requirements.
    pub applications: Vec<Application>,
}

impl CollaborationRecord {
    /// Parses a record from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or doesn't describe a record.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Renders the record as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Checks that the record describes a state the marketplace could have
    /// produced.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        let collaboration = self.collaboration.id();
        let mut accepted: HashMap<RequirementId, u64> = HashMap::new();

        for requirement in self.collaboration.requirements() {
            if requirement.collaboration_id() != collaboration {
                return Err(InvalidRecord::Requirement {
                    requirement: requirement.id(),
                    reason: "belongs to another collaboration",
                });
            }
            if let Some(reason) = requirement.inconsistency() {
                return Err(InvalidRecord::Requirement {
                    requirement: requirement.id(),
                    reason,
                });
            }
            if accepted.insert(requirement.id(), 0).is_some() {
                return Err(InvalidRecord::Requirement {
                    requirement: requirement.id(),
                    reason: "appears twice",
                });
            }
        }

        let mut ids: HashSet<ApplicationId> = HashSet::new();
        let mut active: HashSet<(RequirementId, &UserId)> = HashSet::new();
        for app in &self.applications {
            let Some(count) = accepted.get_mut(&app.requirement_id()) else {
                return Err(InvalidRecord::UnknownRequirement {
                    application: app.id(),
                });
            };
            if !ids.insert(app.id()) {
                return Err(InvalidRecord::DuplicateApplication {
                    application: app.id(),
                });
            }
            if app.status().is_active()
                && !active.insert((app.requirement_id(), app.applicant_id()))
            {
                return Err(InvalidRecord::DuplicateActive {
                    requirement: app.requirement_id(),
                    applicant: app.applicant_id().clone(),
                });
            }
            if app.status() == ApplicationStatus::Accepted {
                *count += 1;
            }
        }

        for requirement in self.collaboration.requirements() {
            let accepted = accepted.get(&requirement.id()).copied().unwrap_or_default();
            if accepted != u64::from(requirement.quantity_filled()) {
                return Err(InvalidRecord::FillMismatch {
                    requirement: requirement.id(),
                    accepted,
                    filled: requirement.quantity_filled(),
                });
            }
        }
        Ok(())
    }
}

/// Why a record fails [`CollaborationRecord::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecord {
    /// A requirement's own counters or status don't add up.
    #[error("requirement {requirement} {reason}")]
    Requirement {
        /// The offending requirement.
        requirement: RequirementId,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// An application points at a requirement outside the record.
    #[error("application {application} is for a requirement not in this collaboration")]
    UnknownRequirement {
        /// The orphaned application.
        application: ApplicationId,
    },
    /// The same application id appears twice.
    #[error("application {application} appears twice")]
    DuplicateApplication {
        /// The repeated id.
        application: ApplicationId,
    },
    /// An applicant holds more than one pending or accepted application for
    /// a requirement.
    #[error("{applicant} has more than one active application for requirement {requirement}")]
    DuplicateActive {
        /// The requirement applied to.
        requirement: RequirementId,
        /// The applicant.
        applicant: UserId,
    },
    /// The number of accepted applications differs from the fill count.
    #[error("requirement {requirement} has {accepted} accepted applications but {filled} filled slots")]
    FillMismatch {
        /// The requirement.
        requirement: RequirementId,
        /// Accepted applications found.
        accepted: u64,
        /// Slots the requirement claims are filled.
        filled: u32,
    },
}

/// The serialized versions of a record.
///
/// Tagged with `_version` so the on-disk format can change without breaking
/// existing files.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        revision: u64,
        collaboration: Collaboration,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        applications: Vec<Application>,
    },
}

impl From<Versions> for CollaborationRecord {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                revision,
                collaboration,
                applications,
            } => Self {
                revision,
                collaboration,
                applications,
            },
        }
    }
}

impl From<CollaborationRecord> for Versions {
    fn from(record: CollaborationRecord) -> Self {
        Self::V1 {
            revision: record.revision,
            collaboration: record.collaboration,
            applications: record.applications,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::{
        CollaborationStatus, Decision, Ledger, NewCollaboration, RequirementSpec,
        RequirementStatus,
    };

    const V1: &str = r#"_version: '1'
collaboration:
  id: 2f1c5a0e-3c1b-4f7e-9d4a-5b8e2f0c1a11
  title: Indie game soundtrack
  description: Eight tracks, chiptune
  creator_id: studio-nine
  created_at: 2025-01-05T10:00:00Z
  status: active
  requirements:
  - id: 7d2e9b44-0a6f-4c55-8f3e-1e2d3c4b5a69
    collaboration_id: 2f1c5a0e-3c1b-4f7e-9d4a-5b8e2f0c1a11
    role: Composer
    quantity_needed: 2
    quantity_filled: 1
    skills:
    - FamiTracker
    status: open
applications:
- id: 0b6d2c1e-9f8a-4e3d-b2c1-a09f8e7d6c5b
  requirement_id: 7d2e9b44-0a6f-4c55-8f3e-1e2d3c4b5a69
  applicant_id: mika
  applicant_name: Mika
  message: I scored two jams last year
  status: accepted
  applied_at: 2025-01-06T09:30:00Z
"#;

    #[test]
    fn reads_version_one() {
        let record = CollaborationRecord::from_yaml(V1).unwrap();

        let collab = &record.collaboration;
        assert_eq!(collab.title(), "Indie game soundtrack");
        assert_eq!(collab.status(), CollaborationStatus::Active);
        assert_eq!(collab.creator_id().as_str(), "studio-nine");

        let req = &collab.requirements()[0];
        assert_eq!(req.role(), "Composer");
        assert_eq!(req.quantity_filled(), 1);
        assert_eq!(req.status(), RequirementStatus::Open);
        assert_eq!(req.skills(), ["FamiTracker".to_string()]);
        assert_eq!(req.budget(), None);

        assert_eq!(record.applications.len(), 1);
        assert_eq!(record.applications[0].status(), ApplicationStatus::Accepted);
        assert_eq!(record.revision, 0);
        record.validate().unwrap();
    }

    const SECOND_FROM_MIKA: &str = "- id: 5c4b3a29-1807-4f6e-9d5c-4b3a29180716
  requirement_id: 7d2e9b44-0a6f-4c55-8f3e-1e2d3c4b5a69
  applicant_id: mika
  applicant_name: Mika
  message: Asking again
  status: pending
  applied_at: 2025-01-07T09:30:00Z
";

    fn corrupt(from: &str, to: &str) -> CollaborationRecord {
        assert!(V1.contains(from));
        CollaborationRecord::from_yaml(&V1.replacen(from, to, 1)).unwrap()
    }

    #[test_case("quantity_filled: 1", "quantity_filled: 3"; "overfilled")]
    #[test_case("quantity_needed: 2", "quantity_needed: 0"; "needs nobody")]
    #[test_case("quantity_needed: 2", "quantity_needed: 1"; "full but open")]
    #[test_case(
        "  collaboration_id: 2f1c5a0e-3c1b-4f7e-9d4a-5b8e2f0c1a11",
        "  collaboration_id: 00000000-0000-4000-8000-000000000000";
        "foreign requirement"
    )]
    fn broken_requirements_are_invalid(from: &str, to: &str) {
        let err = corrupt(from, to).validate().unwrap_err();
        assert!(matches!(err, InvalidRecord::Requirement { .. }), "{err}");
    }

    #[test]
    fn accepted_count_must_match_fill() {
        let err = corrupt("status: accepted", "status: rejected")
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            InvalidRecord::FillMismatch {
                accepted: 0,
                filled: 1,
                ..
            }
        ));
    }

    #[test]
    fn orphaned_applications_are_invalid() {
        let err = corrupt(
            "  requirement_id: 7d2e9b44-0a6f-4c55-8f3e-1e2d3c4b5a69",
            "  requirement_id: 00000000-0000-4000-8000-000000000000",
        )
        .validate()
        .unwrap_err();
        assert!(matches!(err, InvalidRecord::UnknownRequirement { .. }));
    }

    #[test]
    fn two_active_applications_from_one_applicant_are_invalid() {
        let yaml = format!("{V1}{SECOND_FROM_MIKA}");
        let err = CollaborationRecord::from_yaml(&yaml)
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            InvalidRecord::DuplicateActive {
                requirement: "7d2e9b44-0a6f-4c55-8f3e-1e2d3c4b5a69".parse().unwrap(),
                applicant: UserId::new("mika").unwrap(),
            }
        );

        // a rejected earlier attempt doesn't count
        let yaml = yaml.replacen("status: pending", "status: rejected", 1);
        CollaborationRecord::from_yaml(&yaml)
            .unwrap()
            .validate()
            .unwrap();
    }

    #[test]
    fn revision_is_read_when_present() {
        let yaml = V1.replacen("_version: '1'\n", "_version: '1'\nrevision: 7\n", 1);
        assert_eq!(CollaborationRecord::from_yaml(&yaml).unwrap().revision, 7);
    }

    #[test]
    fn missing_version_is_rejected() {
        let without_tag = V1.replacen("_version: '1'\n", "", 1);
        assert!(CollaborationRecord::from_yaml(&without_tag).is_err());
    }

    #[test]
    fn blank_creator_is_rejected() {
        let blank = V1.replacen("creator_id: studio-nine", "creator_id: ''", 1);
        assert!(CollaborationRecord::from_yaml(&blank).is_err());
    }

    #[test]
    fn written_records_read_back() {
        let creator = UserId::new("creator").unwrap();
        let mut ledger = Ledger::default();
        let collab = ledger
            .create_collaboration(
                creator.clone(),
                NewCollaboration {
                    title: "Mural".to_string(),
                    description: "Community wall".to_string(),
                    requirements: vec![RequirementSpec::new("Painter", 3)],
                },
            )
            .unwrap();
        let (id, req) = (collab.id(), collab.requirements()[0].id());
        let app = ledger
            .submit_application(req, UserId::new("ines").unwrap(), "Ines", "hi")
            .unwrap()
            .id();
        ledger.decide(app, Decision::Accept, &creator).unwrap();
        let record = ledger.record(id).unwrap();
        record.validate().unwrap();

        let yaml = record.to_yaml().unwrap();
        assert!(yaml.starts_with("_version: '1'"));
        assert_eq!(CollaborationRecord::from_yaml(&yaml).unwrap(), record);
    }
}
