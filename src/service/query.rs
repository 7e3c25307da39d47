use serde::Serialize;

use crate::domain::{is_fully_staffed, Collaboration, CollaborationStatus, Ledger, UserId};

/// Criteria for browsing collaborations.
///
/// Every field that is set must match. The default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollaborationFilter {
    /// Only collaborations in this status.
    pub status: Option<CollaborationStatus>,
    /// Only collaborations by this creator.
    pub creator: Option<UserId>,
    /// Only collaborations with a requirement for this role
    /// (case-insensitive).
    pub role: Option<String>,
    /// Only collaborations with a requirement calling for this skill
    /// (case-insensitive).
    pub skill: Option<String>,
    /// Only collaborations with at least one open requirement.
    pub open_only: bool,
    /// Case-insensitive text to look for in the title or description.
    pub query: Option<String>,
}

impl CollaborationFilter {
    /// Active collaborations only.
    #[must_use]
    pub fn active() -> Self {
        Self {
            status: Some(CollaborationStatus::Active),
            ..Self::default()
        }
    }

    /// Whether `collaboration` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, collaboration: &Collaboration) -> bool {
        if self.status.is_some_and(|s| s != collaboration.status()) {
            return false;
        }
        if self
            .creator
            .as_ref()
            .is_some_and(|c| c != collaboration.creator_id())
        {
            return false;
        }
        if let Some(role) = non_empty(self.role.as_deref()) {
            if !collaboration
                .requirements()
                .iter()
                .any(|r| same_text(r.role(), role))
            {
                return false;
            }
        }
        if let Some(skill) = non_empty(self.skill.as_deref()) {
            if !collaboration
                .requirements()
                .iter()
                .flat_map(|r| r.skills())
                .any(|s| same_text(s, skill))
            {
                return false;
            }
        }
        if self.open_only && !collaboration.requirements().iter().any(|r| r.is_open()) {
            return false;
        }
        if let Some(query) = non_empty(self.query.as_deref()) {
            let query = query.to_lowercase();
            if !collaboration.title().to_lowercase().contains(&query)
                && !collaboration.description().to_lowercase().contains(&query)
            {
                return false;
            }
        }
        true
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Case-insensitive equality, for any script.
fn same_text(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Which slice of a listing to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Items to skip.
    pub offset: usize,
    /// Items to return; the configured default when `None`.
    pub limit: Option<usize>,
}

/// One slice of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Matching items across all pages.
    pub total: usize,
    /// Items skipped before this page.
    pub offset: usize,
    /// The page size that was applied.
    pub limit: usize,
}

impl<T> Page<T> {
    /// Whether more items follow this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

/// A collaboration together with its derived, display-only figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollaborationSummary {
    /// The collaboration, including its requirements.
    pub collaboration: Collaboration,
    /// Overall fill percentage across all requirements.
    pub progress: u8,
    /// Whether every requirement is closed.
    pub fully_staffed: bool,
    /// Slots still to be filled across all requirements.
    pub open_slots: u64,
    /// Applications awaiting a decision.
    pub pending_applications: usize,
}

impl CollaborationSummary {
    pub(crate) fn new(ledger: &Ledger, collaboration: &Collaboration) -> Self {
        let pending_applications = collaboration
            .requirements()
            .iter()
            .flat_map(|r| ledger.applications_for(r.id()))
            .filter(|app| app.is_pending())
            .count();
        let open_slots = collaboration
            .requirements()
            .iter()
            .filter(|r| r.is_open())
            .map(|r| u64::from(r.remaining()))
            .sum();

        Self {
            collaboration: collaboration.clone(),
            progress: collaboration.progress(),
            fully_staffed: is_fully_staffed(collaboration),
            open_slots,
            pending_applications,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::{NewCollaboration, RequirementSpec};

    fn collaboration() -> Collaboration {
        let mut ledger = Ledger::default();
        ledger
            .create_collaboration(
                UserId::new("ava").unwrap(),
                NewCollaboration {
                    title: "Fashion Lookbook".to_string(),
                    description: "Spring collection shoot in Lisbon".to_string(),
                    requirements: vec![
                        RequirementSpec {
                            skills: vec!["Lightroom".to_string()],
                            ..RequirementSpec::new("Photographer", 1)
                        },
                        RequirementSpec {
                            skills: vec!["étalonnage".to_string()],
                            ..RequirementSpec::new("éclairagiste", 1)
                        },
                    ],
                },
            )
            .unwrap()
            .clone()
    }

    #[test_case(CollaborationFilter::default(), true; "empty filter")]
    #[test_case(CollaborationFilter::active(), true; "active")]
    #[test_case(CollaborationFilter { status: Some(CollaborationStatus::Cancelled), ..Default::default() }, false; "other status")]
    #[test_case(CollaborationFilter { role: Some("photographer".into()), ..Default::default() }, true; "role ignores case")]
    #[test_case(CollaborationFilter { role: Some("Model".into()), ..Default::default() }, false; "missing role")]
    #[test_case(CollaborationFilter { role: Some("ÉCLAIRAGISTE".into()), ..Default::default() }, true; "role ignores accented case")]
    #[test_case(CollaborationFilter { skill: Some("LIGHTROOM".into()), ..Default::default() }, true; "skill ignores case")]
    #[test_case(CollaborationFilter { skill: Some("ÉTALONNAGE".into()), ..Default::default() }, true; "skill ignores accented case")]
    #[test_case(CollaborationFilter { query: Some("lisbon".into()), ..Default::default() }, true; "query in description")]
    #[test_case(CollaborationFilter { query: Some("lookbook".into()), ..Default::default() }, true; "query in title")]
    #[test_case(CollaborationFilter { query: Some("berlin".into()), ..Default::default() }, false; "query missing")]
    #[test_case(CollaborationFilter { query: Some("  ".into()), ..Default::default() }, true; "blank query ignored")]
    #[test_case(CollaborationFilter { creator: Some(UserId::new("bo").unwrap()), ..Default::default() }, false; "other creator")]
    #[test_case(CollaborationFilter { open_only: true, ..Default::default() }, true; "open only")]
    fn filter_matches(filter: CollaborationFilter, expected: bool) {
        assert_eq!(filter.matches(&collaboration()), expected);
    }

    #[test]
    fn open_only_excludes_closed_requirements() {
        let mut collab = collaboration();
        for requirement in &mut collab.requirements {
            requirement.close();
        }
        let filter = CollaborationFilter {
            open_only: true,
            ..CollaborationFilter::default()
        };
        assert!(!filter.matches(&collab));
    }

    #[test]
    fn page_reports_remaining_items() {
        let page = Page {
            items: vec![1, 2],
            total: 5,
            offset: 2,
            limit: 2,
        };
        assert!(page.has_more());

        let last = Page {
            items: vec![5],
            total: 5,
            offset: 4,
            limit: 2,
        };
        assert!(!last.has_more());
    }
}
