//! In-memory ledger of collaborations, requirements and applications.
//!
//! The [`Ledger`] knows nothing about persistence or concurrency. Every
//! mutating method either applies completely or returns an error and leaves
//! the ledger untouched. Callers that share a ledger between threads wrap it
//! in a lock and treat each method call as one transaction.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::{
    domain::{
        application::normalize_message,
        matching::{check_accepting, check_decide, check_no_active_application},
        Application, ApplicationId, ApplicationStatus, Collaboration, CollaborationId,
        CollaborationStatus, Config, Decision, Entity, Error, NewCollaboration, PendingPolicy,
        Requirement, RequirementId, RequirementSpec, UserId,
    },
    storage::CollaborationRecord,
};

/// An in-memory store of collaborations and the applications made to them.
///
/// Data is stored as:
/// - Collaborations (which own their requirements): `HashMap<CollaborationId,
///   Collaboration>`
/// - Requirement ownership: `HashMap<RequirementId, CollaborationId>`
/// - Applications: `HashMap<ApplicationId, Application>`
/// - Applications per requirement, in submission order: `HashMap<RequirementId,
///   Vec<ApplicationId>>`
/// - The last saved revision of each collaboration: `HashMap<CollaborationId,
///   u64>`
#[derive(Debug, Clone)]
pub struct Ledger {
    collaborations: HashMap<CollaborationId, Collaboration>,

    /// Which collaboration owns each requirement.
    requirement_owner: HashMap<RequirementId, CollaborationId>,

    applications: HashMap<ApplicationId, Application>,

    /// Submission-ordered application ids for each requirement.
    by_requirement: HashMap<RequirementId, Vec<ApplicationId>>,

    revisions: HashMap<CollaborationId, u64>,

    max_message_length: usize,
    pending_on_close: PendingPolicy,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// What a creator-initiated close changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Whether anything was open before the call.
    pub changed: bool,
    /// Pending applications that were rejected as a result.
    pub rejected: Vec<Application>,
}

impl Ledger {
    /// Creates an empty ledger governed by `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            collaborations: HashMap::new(),
            requirement_owner: HashMap::new(),
            applications: HashMap::new(),
            by_requirement: HashMap::new(),
            revisions: HashMap::new(),
            max_message_length: config.max_message_length(),
            pending_on_close: config.pending_on_close,
        }
    }

    /// Builds a ledger from persisted records.
    #[must_use]
    pub fn from_records(
        config: &Config,
        records: impl IntoIterator<Item = CollaborationRecord>,
    ) -> Self {
        let mut ledger = Self::new(config);
        for record in records {
            ledger.insert(record);
        }
        ledger
    }

    /// Inserts a collaboration with its applications, replacing any existing
    /// collaboration with the same id.
    pub fn insert(&mut self, record: CollaborationRecord) {
        let CollaborationRecord {
            revision,
            collaboration,
            mut applications,
        } = record;
        let id = collaboration.id;

        self.remove(id);
        self.revisions.insert(id, revision);

        for requirement in &collaboration.requirements {
            self.requirement_owner.insert(requirement.id, id);
            self.by_requirement.entry(requirement.id).or_default();
        }

        applications.sort_by_key(|app| app.applied_at);
        for app in applications {
            if !self.requirement_owner.contains_key(&app.requirement_id) {
                debug!(application = %app.id, "dropping application for unknown requirement");
                continue;
            }
            self.by_requirement
                .entry(app.requirement_id)
                .or_default()
                .push(app.id);
            self.applications.insert(app.id, app);
        }

        self.collaborations.insert(id, collaboration);
    }

    /// Removes a collaboration together with its requirements and their
    /// applications.
    pub fn remove(&mut self, id: CollaborationId) -> Option<CollaborationRecord> {
        let record = self.record(id)?;
        self.collaborations.remove(&id);
        self.revisions.remove(&id);
        for requirement in &record.collaboration.requirements {
            self.requirement_owner.remove(&requirement.id);
            for app_id in self.by_requirement.remove(&requirement.id).unwrap_or_default() {
                self.applications.remove(&app_id);
            }
        }
        Some(record)
    }

    /// A snapshot of a collaboration and every application against it.
    #[must_use]
    pub fn record(&self, id: CollaborationId) -> Option<CollaborationRecord> {
        let collaboration = self.collaborations.get(&id)?.clone();
        let applications = collaboration
            .requirements
            .iter()
            .flat_map(|r| self.applications_for(r.id))
            .cloned()
            .collect();
        Some(CollaborationRecord {
            revision: self.revision(id),
            collaboration,
            applications,
        })
    }

    /// The revision a collaboration was last loaded or saved at; zero if it
    /// has never been saved.
    #[must_use]
    pub fn revision(&self, id: CollaborationId) -> u64 {
        self.revisions.get(&id).copied().unwrap_or_default()
    }

    /// Notes that a collaboration has been saved as `revision`.
    pub(crate) fn set_revision(&mut self, id: CollaborationId, revision: u64) {
        if self.collaborations.contains_key(&id) {
            self.revisions.insert(id, revision);
        }
    }

    /// Looks up a collaboration.
    #[must_use]
    pub fn collaboration(&self, id: CollaborationId) -> Option<&Collaboration> {
        self.collaborations.get(&id)
    }

    /// Iterates over every collaboration, in no particular order.
    pub fn collaborations(&self) -> impl Iterator<Item = &Collaboration> {
        self.collaborations.values()
    }

    /// The collaboration that owns a requirement.
    #[must_use]
    pub fn owner_of(&self, requirement: RequirementId) -> Option<&Collaboration> {
        self.requirement_owner
            .get(&requirement)
            .and_then(|id| self.collaborations.get(id))
    }

    /// Looks up a requirement.
    #[must_use]
    pub fn requirement(&self, id: RequirementId) -> Option<&Requirement> {
        self.owner_of(id)?.requirement(id)
    }

    /// Looks up an application.
    #[must_use]
    pub fn application(&self, id: ApplicationId) -> Option<&Application> {
        self.applications.get(&id)
    }

    /// Applications against a requirement, oldest first.
    pub fn applications_for(
        &self,
        requirement: RequirementId,
    ) -> impl Iterator<Item = &Application> {
        self.by_requirement
            .get(&requirement)
            .into_iter()
            .flatten()
            .filter_map(|id| self.applications.get(id))
    }

    /// Every application made by `applicant`, in no particular order.
    pub fn applications_by<'a>(
        &'a self,
        applicant: &'a UserId,
    ) -> impl Iterator<Item = &'a Application> + 'a {
        self.applications
            .values()
            .filter(move |app| &app.applicant_id == applicant)
    }

    /// Whether `user` may apply to a requirement, judged from stored state.
    ///
    /// Unknown requirements and anonymous users yield `false`.
    #[must_use]
    pub fn can_apply(&self, requirement: RequirementId, user: Option<&UserId>) -> bool {
        let (Some(req), Some(user)) = (self.requirement(requirement), user) else {
            return false;
        };
        check_accepting(req).is_ok()
            && check_no_active_application(req, user, self.applications_for(requirement)).is_ok()
    }

    /// Creates an active collaboration with its initial requirements.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the title is blank or any requirement spec is
    /// invalid. Nothing is created in that case.
    #[instrument(level = "debug", skip(self, new), fields(title = %new.title))]
    pub fn create_collaboration(
        &mut self,
        creator: UserId,
        new: NewCollaboration,
    ) -> Result<&Collaboration, Error> {
        let collaboration = Collaboration::create(creator, new)?;
        let id = collaboration.id;
        self.insert(CollaborationRecord {
            revision: 0,
            collaboration,
            applications: Vec::new(),
        });
        self.collaboration(id)
            .ok_or(Error::NotFound(Entity::Collaboration(id)))
    }

    /// Adds an open, unfilled requirement to an active collaboration.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the collaboration doesn't exist
    /// - [`Error::CollaborationInactive`] if it is completed or cancelled
    /// - [`Error::Validation`] if `quantity_needed` is zero or the role is
    ///   blank
    #[instrument(level = "debug", skip(self, spec), fields(role = %spec.role))]
    pub fn create_requirement(
        &mut self,
        collaboration: CollaborationId,
        spec: RequirementSpec,
    ) -> Result<&Requirement, Error> {
        let collab = self
            .collaborations
            .get_mut(&collaboration)
            .ok_or(Error::NotFound(Entity::Collaboration(collaboration)))?;
        collab.ensure_active()?;

        let requirement = Requirement::from_spec(collaboration, spec)?;
        let id = requirement.id;
        collab.requirements.push(requirement);
        self.requirement_owner.insert(id, collaboration);
        self.by_requirement.entry(id).or_default();

        self.requirement(id)
            .ok_or(Error::NotFound(Entity::Requirement(id)))
    }

    /// Fills one slot of a requirement, closing it when it reaches capacity.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the requirement doesn't exist
    /// - [`Error::CapacityExceeded`] if it is already full
    pub fn increment_filled(&mut self, requirement: RequirementId) -> Result<&Requirement, Error> {
        let req = self.requirement_mut(requirement)?;
        req.increment_filled()?;
        debug!(
            %requirement,
            filled = req.quantity_filled,
            needed = req.quantity_needed,
            status = %req.status,
            "slot filled"
        );
        Ok(&*req)
    }

    /// Closes a requirement regardless of how many slots are filled.
    ///
    /// Calling this on a closed requirement changes nothing. Depending on
    /// [`PendingPolicy`], pending applications against a requirement that
    /// this call closes are rejected.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the requirement doesn't exist.
    pub fn close_requirement(&mut self, requirement: RequirementId) -> Result<CloseOutcome, Error> {
        let changed = self.requirement_mut(requirement)?.close();
        if !changed {
            debug!(%requirement, "requirement already closed");
            return Ok(CloseOutcome::default());
        }
        Ok(CloseOutcome {
            changed,
            rejected: self.reject_pending(&[requirement]),
        })
    }

    /// Moves an active collaboration to `completed` or `cancelled`, closing
    /// all of its requirements.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the collaboration doesn't exist
    /// - [`Error::CollaborationInactive`] if it isn't active
    /// - [`Error::Validation`] if `to` is `active`
    pub fn finish_collaboration(
        &mut self,
        collaboration: CollaborationId,
        to: CollaborationStatus,
    ) -> Result<CloseOutcome, Error> {
        if to == CollaborationStatus::Active {
            return Err(Error::validation(
                "status",
                "a collaboration can only be completed or cancelled",
            ));
        }
        let collab = self
            .collaborations
            .get_mut(&collaboration)
            .ok_or(Error::NotFound(Entity::Collaboration(collaboration)))?;
        collab.ensure_active()?;

        collab.status = to;
        let closed: Vec<RequirementId> = collab
            .requirements
            .iter_mut()
            .filter_map(|r| r.close().then_some(r.id))
            .collect();

        Ok(CloseOutcome {
            changed: true,
            rejected: self.reject_pending(&closed),
        })
    }

    /// Records a new pending application.
    ///
    /// Preconditions are checked in this order, and the first failure is
    /// returned:
    ///
    /// 1. [`Error::NotFound`]: the requirement exists
    /// 2. [`Error::RequirementClosed`]: it is open
    /// 3. [`Error::CapacityExceeded`]: it has a free slot
    /// 4. [`Error::EmptyMessage`] / [`Error::Validation`]: the message is
    ///    non-blank and within the length limit
    /// 5. [`Error::DuplicateApplication`]: the applicant has no pending or
    ///    accepted application for it
    ///
    /// # Errors
    ///
    /// See above. No application is recorded on failure.
    #[instrument(level = "debug", skip(self, applicant_name, message))]
    pub fn submit_application(
        &mut self,
        requirement: RequirementId,
        applicant: UserId,
        applicant_name: &str,
        message: &str,
    ) -> Result<&Application, Error> {
        let req = self
            .requirement(requirement)
            .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;
        check_accepting(req)?;
        let message = normalize_message(message, self.max_message_length)?;
        check_no_active_application(req, &applicant, self.applications_for(requirement))?;

        let name = match applicant_name.trim() {
            "" => applicant.to_string(),
            name => name.to_string(),
        };
        let application = Application::new(requirement, applicant, name, message);
        let id = application.id;

        self.by_requirement.entry(requirement).or_default().push(id);
        self.applications.insert(id, application);

        self.application(id)
            .ok_or(Error::NotFound(Entity::Application(id)))
    }

    /// Accepts or rejects a pending application.
    ///
    /// Only the collaboration's creator may decide, and only once. Accepting
    /// fills a slot; if the requirement is already full the application stays
    /// pending and [`Error::CapacityExceeded`] is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the application doesn't exist
    /// - [`Error::Unauthorized`] if `acting_user` isn't the creator
    /// - [`Error::AlreadyDecided`] if the application isn't pending
    /// - [`Error::CollaborationInactive`] when accepting into a completed or
    ///   cancelled collaboration
    /// - [`Error::CapacityExceeded`] when accepting into a full requirement
    #[instrument(level = "debug", skip(self))]
    pub fn decide(
        &mut self,
        application: ApplicationId,
        decision: Decision,
        acting_user: &UserId,
    ) -> Result<&Application, Error> {
        let app = self
            .applications
            .get_mut(&application)
            .ok_or(Error::NotFound(Entity::Application(application)))?;
        let requirement = app.requirement_id;
        let collab = self
            .requirement_owner
            .get(&requirement)
            .and_then(|id| self.collaborations.get_mut(id))
            .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;

        check_decide(app, acting_user, collab)?;
        if decision == Decision::Accept {
            collab.ensure_active()?;
        }

        app.status = decision.outcome();

        if decision == Decision::Accept {
            let req = collab
                .requirement_mut(requirement)
                .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;
            if let Err(e) = req.increment_filled() {
                app.status = ApplicationStatus::Pending;
                return Err(e);
            }
        }

        Ok(&*app)
    }

    fn requirement_mut(&mut self, id: RequirementId) -> Result<&mut Requirement, Error> {
        self.requirement_owner
            .get(&id)
            .and_then(|owner| self.collaborations.get_mut(owner))
            .and_then(|collab| collab.requirement_mut(id))
            .ok_or(Error::NotFound(Entity::Requirement(id)))
    }

    fn reject_pending(&mut self, requirements: &[RequirementId]) -> Vec<Application> {
        if self.pending_on_close == PendingPolicy::Keep {
            return Vec::new();
        }

        let mut rejected = Vec::new();
        for requirement in requirements {
            for id in self.by_requirement.get(requirement).into_iter().flatten() {
                if let Some(app) = self.applications.get_mut(id) {
                    if app.is_pending() {
                        app.status = ApplicationStatus::Rejected;
                        rejected.push(app.clone());
                    }
                }
            }
        }
        if !rejected.is_empty() {
            debug!(count = rejected.len(), "rejected pending applications on close");
        }
        rejected
    }

    /// Checks the fill and uniqueness invariants across the whole ledger.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.collaborations
            .keys()
            .filter_map(|id| self.record(*id))
            .all(|record| record.validate().is_ok())
    }
}
