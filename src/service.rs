//! The request/response surface of the marketplace.
//!
//! A [`Marketplace`] owns the in-memory [`Ledger`], a [`Store`] that every
//! change is written through, and a [`Notifier`] for outbound messages. Each
//! mutating call runs as a single transaction under a write lock: the ledger
//! is changed, the affected collaboration is saved, and if the save fails the
//! ledger is restored to its previous state before the error is returned.
//! Notifications go out after the lock is released and never undo a change.
//!
//! The lock only covers one process. Other marketplaces may share the same
//! store, so every save carries the next revision of the record; when the
//! store refuses it, the collaboration is reloaded and the change is run
//! again against what is actually stored.

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::{
    domain::{
        Application, ApplicationId, Collaboration, CollaborationId, CollaborationStatus, Config,
        Decision, Entity, Error, Ledger, NewCollaboration, Requirement, RequirementId,
        RequirementSpec, UserId,
    },
    storage::{CollaborationRecord, Store, StoreError},
};

mod actor;
mod notifier;
mod query;

pub use actor::Actor;
pub use notifier::{DecidedBy, LogNotifier, NoopNotifier, Notification, Notifier, NotifyError};
pub use query::{CollaborationFilter, CollaborationSummary, Page, PageRequest};

/// How many times a transaction is re-run after losing a race with another
/// writer.
const CONFLICT_RETRIES: usize = 3;

/// The collaboration marketplace.
#[derive(Debug)]
pub struct Marketplace<S, N = NoopNotifier> {
    ledger: RwLock<Ledger>,
    store: S,
    notifier: N,
    config: Config,
}

impl<S: Store, N: Notifier> Marketplace<S, N> {
    /// Opens a marketplace over everything `store` holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store can't be loaded.
    pub fn open(store: S, notifier: N, config: Config) -> Result<Self, StoreError> {
        let records = store.load()?;
        info!(collaborations = records.len(), "marketplace opened");
        Ok(Self {
            ledger: RwLock::new(Ledger::from_records(&config, records)),
            store,
            notifier,
            config,
        })
    }

    /// The configuration in effect.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The notifier.
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Browses collaborations, newest first.
    ///
    /// The page size defaults to, and is capped at, the configured limits.
    #[instrument(level = "debug", skip(self))]
    pub fn list_collaborations(
        &self,
        filter: &CollaborationFilter,
        page: PageRequest,
    ) -> Page<CollaborationSummary> {
        let limit = self.config.page_size(page.limit);
        let ledger = self.ledger.read();

        let mut matching: Vec<&Collaboration> = ledger
            .collaborations()
            .filter(|c| filter.matches(c))
            .collect();
        sort_newest_first(&mut matching);

        let items = matching
            .iter()
            .skip(page.offset)
            .take(limit)
            .map(|c| CollaborationSummary::new(&ledger, c))
            .collect();

        Page {
            items,
            total: matching.len(),
            offset: page.offset,
            limit,
        }
    }

    /// Every collaboration `creator` has started, newest first, whatever its
    /// status.
    #[instrument(level = "debug", skip(self))]
    pub fn list_user_collaborations(&self, creator: &UserId) -> Vec<CollaborationSummary> {
        let ledger = self.ledger.read();
        let mut owned: Vec<&Collaboration> = ledger
            .collaborations()
            .filter(|c| c.is_creator(creator))
            .collect();
        sort_newest_first(&mut owned);
        owned
            .into_iter()
            .map(|c| CollaborationSummary::new(&ledger, c))
            .collect()
    }

    /// One collaboration with its derived figures.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if it doesn't exist.
    pub fn collaboration(&self, id: CollaborationId) -> Result<CollaborationSummary, Error> {
        let ledger = self.ledger.read();
        let collab = ledger
            .collaboration(id)
            .ok_or(Error::NotFound(Entity::Collaboration(id)))?;
        Ok(CollaborationSummary::new(&ledger, collab))
    }

    /// One requirement.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if it doesn't exist.
    pub fn requirement(&self, id: RequirementId) -> Result<Requirement, Error> {
        self.ledger
            .read()
            .requirement(id)
            .cloned()
            .ok_or(Error::NotFound(Entity::Requirement(id)))
    }

    /// Whether `actor` could apply to a requirement right now.
    ///
    /// Used to decide whether to show an "apply" control; the answer may be
    /// stale by the time an application is submitted.
    pub fn can_apply(&self, actor: &Actor, requirement: RequirementId) -> bool {
        self.ledger
            .read()
            .can_apply(requirement, actor.user_id())
    }

    /// Applications against a requirement, oldest first.
    ///
    /// The creator sees every application; anyone else sees only their own.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] for anonymous callers
    /// - [`Error::NotFound`] if the requirement doesn't exist
    pub fn applications_for_requirement(
        &self,
        actor: &Actor,
        requirement: RequirementId,
    ) -> Result<Vec<Application>, Error> {
        let user = actor.require("view applications")?;
        let ledger = self.ledger.read();
        let owner = ledger
            .owner_of(requirement)
            .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;
        let is_creator = owner.is_creator(user);

        Ok(ledger
            .applications_for(requirement)
            .filter(|app| is_creator || app.applicant_id() == user)
            .cloned()
            .collect())
    }

    /// The caller's own applications, newest first.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] for anonymous callers.
    pub fn user_applications(&self, actor: &Actor) -> Result<Vec<Application>, Error> {
        let user = actor.require("view applications")?;
        let mut apps: Vec<Application> = self
            .ledger
            .read()
            .applications_by(user)
            .cloned()
            .collect();
        apps.sort_by(|a, b| {
            b.applied_at()
                .cmp(&a.applied_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(apps)
    }

    /// Starts a new collaboration owned by the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] for anonymous callers
    /// - [`Error::Validation`] if the title or any requirement is invalid
    /// - [`Error::Storage`] if it could not be saved
    #[instrument(skip(self, new), fields(title = %new.title))]
    pub fn create_collaboration(
        &self,
        actor: &Actor,
        new: NewCollaboration,
    ) -> Result<Collaboration, Error> {
        let creator = actor.require("create a collaboration")?.clone();

        let mut ledger = self.ledger.write();
        let collab = ledger.create_collaboration(creator, new)?.clone();
        self.persist(&mut ledger, collab.id(), None)?;
        drop(ledger);

        info!(
            collaboration = %collab.id(),
            requirements = collab.requirements().len(),
            "collaboration created"
        );
        Ok(collab)
    }

    /// Adds a requirement to one of the caller's active collaborations.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] unless the caller is the creator
    /// - [`Error::NotFound`] if the collaboration doesn't exist
    /// - [`Error::CollaborationInactive`] if it is completed or cancelled
    /// - [`Error::Validation`] if the requirement is invalid
    /// - [`Error::Storage`] if it could not be saved
    #[instrument(skip(self, spec), fields(role = %spec.role))]
    pub fn add_requirement(
        &self,
        actor: &Actor,
        collaboration: CollaborationId,
        spec: RequirementSpec,
    ) -> Result<Requirement, Error> {
        const ACTION: &str = "add requirements";
        let user = actor.require(ACTION)?;

        let requirement = self.transact(
            |_| Some(collaboration),
            |ledger| {
                ensure_creator(ledger, collaboration, user, ACTION)?;
                ledger
                    .create_requirement(collaboration, spec.clone())
                    .cloned()
            },
        )?;

        info!(requirement = %requirement.id(), "requirement added");
        Ok(requirement)
    }

    /// Closes a requirement early. Closing a closed requirement is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the requirement doesn't exist
    /// - [`Error::Unauthorized`] unless the caller is the creator
    /// - [`Error::Storage`] if the change could not be saved
    #[instrument(skip(self))]
    pub fn close_requirement(
        &self,
        actor: &Actor,
        requirement: RequirementId,
    ) -> Result<Requirement, Error> {
        const ACTION: &str = "close requirements";
        let user = actor.require(ACTION)?;

        let (requirement, outcome) = self.transact(
            |ledger| ledger.owner_of(requirement).map(Collaboration::id),
            |ledger| {
                let owner = ledger
                    .owner_of(requirement)
                    .map(Collaboration::id)
                    .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;
                ensure_creator(ledger, owner, user, ACTION)?;
                let outcome = ledger.close_requirement(requirement)?;
                let closed = ledger
                    .requirement(requirement)
                    .cloned()
                    .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;
                Ok((closed, outcome))
            },
        )?;

        if outcome.changed {
            info!(
                requirement = %requirement.id(),
                rejected = outcome.rejected.len(),
                "requirement closed"
            );
        }
        self.notify_closure(outcome.rejected);
        Ok(requirement)
    }

    /// Cancels one of the caller's active collaborations.
    ///
    /// # Errors
    ///
    /// As [`Marketplace::complete_collaboration`].
    pub fn cancel_collaboration(
        &self,
        actor: &Actor,
        collaboration: CollaborationId,
    ) -> Result<Collaboration, Error> {
        self.finish(actor, collaboration, CollaborationStatus::Cancelled)
    }

    /// Marks one of the caller's active collaborations completed.
    ///
    /// Every requirement is closed. Completing is always a creator decision;
    /// it never happens automatically when the last slot is filled.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] unless the caller is the creator
    /// - [`Error::NotFound`] if the collaboration doesn't exist
    /// - [`Error::CollaborationInactive`] if it is not active
    /// - [`Error::Storage`] if the change could not be saved
    pub fn complete_collaboration(
        &self,
        actor: &Actor,
        collaboration: CollaborationId,
    ) -> Result<Collaboration, Error> {
        self.finish(actor, collaboration, CollaborationStatus::Completed)
    }

    #[instrument(skip(self))]
    fn finish(
        &self,
        actor: &Actor,
        collaboration: CollaborationId,
        to: CollaborationStatus,
    ) -> Result<Collaboration, Error> {
        const ACTION: &str = "finish collaborations";
        let user = actor.require(ACTION)?;

        let (collab, outcome) = self.transact(
            |_| Some(collaboration),
            |ledger| {
                ensure_creator(ledger, collaboration, user, ACTION)?;
                let outcome = ledger.finish_collaboration(collaboration, to)?;
                let collab = ledger
                    .collaboration(collaboration)
                    .cloned()
                    .ok_or(Error::NotFound(Entity::Collaboration(collaboration)))?;
                Ok((collab, outcome))
            },
        )?;

        info!(
            %collaboration,
            status = %collab.status(),
            rejected = outcome.rejected.len(),
            "collaboration finished"
        );
        self.notify_closure(outcome.rejected);
        Ok(collab)
    }

    /// Applies to a requirement.
    ///
    /// On success the collaboration's creator is notified.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] for anonymous callers
    /// - [`Error::NotFound`] if the requirement doesn't exist
    /// - [`Error::RequirementClosed`] if it is closed
    /// - [`Error::CapacityExceeded`] if it is full
    /// - [`Error::EmptyMessage`] if the message is blank
    /// - [`Error::Validation`] if the message is too long
    /// - [`Error::DuplicateApplication`] if the caller already has a pending
    ///   or accepted application for it
    /// - [`Error::Storage`] if it could not be saved
    #[instrument(skip(self, message))]
    pub fn submit_application(
        &self,
        actor: &Actor,
        requirement: RequirementId,
        message: &str,
    ) -> Result<Application, Error> {
        let applicant = actor.require("apply")?.clone();
        let name = actor.display_name().unwrap_or_default();

        let (application, creator) = self.transact(
            |ledger| ledger.owner_of(requirement).map(Collaboration::id),
            |ledger| {
                let app = ledger
                    .submit_application(requirement, applicant.clone(), name, message)?
                    .clone();
                let creator = ledger
                    .owner_of(requirement)
                    .map(|c| c.creator_id().clone())
                    .ok_or(Error::NotFound(Entity::Requirement(requirement)))?;
                Ok((app, creator))
            },
        )?;

        info!(application = %application.id(), "application submitted");
        self.send(&Notification::ApplicationReceived {
            creator,
            application: application.clone(),
        });
        Ok(application)
    }

    /// Accepts or rejects an application.
    ///
    /// Accepting fills one slot of the requirement and closes it when it
    /// reaches capacity. Two sessions racing for the last slot cannot both
    /// succeed, even from separate marketplaces sharing one store: the loser
    /// gets [`Error::CapacityExceeded`] and its application stays pending. On
    /// success the applicant is notified.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] unless the caller is the creator
    /// - [`Error::NotFound`] if the application doesn't exist
    /// - [`Error::AlreadyDecided`] if it isn't pending
    /// - [`Error::CollaborationInactive`] when accepting into a finished
    ///   collaboration
    /// - [`Error::CapacityExceeded`] when accepting into a full requirement
    /// - [`Error::Storage`] if the decision could not be saved
    #[instrument(skip(self))]
    pub fn decide_application(
        &self,
        actor: &Actor,
        application: ApplicationId,
        decision: Decision,
    ) -> Result<Application, Error> {
        let user = actor.require("decide applications")?;

        let decided = self.transact(
            |ledger| {
                ledger
                    .application(application)
                    .and_then(|app| ledger.owner_of(app.requirement_id()))
                    .map(Collaboration::id)
            },
            |ledger| ledger.decide(application, decision, user).cloned(),
        )?;

        info!(%application, status = %decided.status(), "application decided");
        self.send(&Notification::ApplicationDecided {
            application: decided.clone(),
            by: DecidedBy::Creator,
        });
        Ok(decided)
    }

    /// Runs `op` as one transaction against the collaboration `locate` picks.
    ///
    /// The collaboration is snapshotted before `op` runs and saved after it
    /// succeeds. A failed save restores the snapshot. If the store reports
    /// that someone else saved the collaboration first, it is reloaded and
    /// `op` runs again.
    fn transact<T>(
        &self,
        locate: impl Fn(&Ledger) -> Option<CollaborationId>,
        mut op: impl FnMut(&mut Ledger) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut ledger = self.ledger.write();
        let mut retries = 0;
        loop {
            let target = locate(&*ledger);
            let before = target.and_then(|id| ledger.record(id));

            let value = op(&mut *ledger)?;

            let Some(id) = target else {
                return Ok(value);
            };
            match self.persist(&mut ledger, id, before) {
                Err(Error::Storage(StoreError::Conflict { .. })) if retries < CONFLICT_RETRIES => {
                    retries += 1;
                    debug!(collaboration = %id, retries, "stale copy, reloading");
                    self.refresh(&mut ledger, id)?;
                }
                result => return result.map(|()| value),
            }
        }
    }

    fn persist(
        &self,
        ledger: &mut Ledger,
        id: CollaborationId,
        before: Option<CollaborationRecord>,
    ) -> Result<(), Error> {
        let Some(mut after) = ledger.record(id) else {
            return Ok(());
        };
        if before.as_ref() == Some(&after) {
            return Ok(());
        }
        after.revision += 1;

        if let Err(e) = self.store.save(&after) {
            warn!(collaboration = %id, error = %e, "save failed, rolling back");
            match before {
                Some(record) => ledger.insert(record),
                None => {
                    ledger.remove(id);
                }
            }
            return Err(Error::Storage(e));
        }
        ledger.set_revision(id, after.revision);
        Ok(())
    }

    /// Replaces the ledger's copy of a collaboration with the stored one.
    fn refresh(&self, ledger: &mut Ledger, id: CollaborationId) -> Result<(), Error> {
        match self.store.load_one(id)? {
            Some(record) => ledger.insert(record),
            None => {
                ledger.remove(id);
            }
        }
        Ok(())
    }

    fn notify_closure(&self, rejected: Vec<Application>) {
        for application in rejected {
            self.send(&Notification::ApplicationDecided {
                application,
                by: DecidedBy::Closure,
            });
        }
    }

    fn send(&self, notification: &Notification) {
        if let Err(e) = self.notifier.notify(notification) {
            warn!(recipient = %notification.recipient(), error = %e, "notification dropped");
        }
    }
}

fn ensure_creator(
    ledger: &Ledger,
    collaboration: CollaborationId,
    user: &UserId,
    action: &'static str,
) -> Result<(), Error> {
    let collab = ledger
        .collaboration(collaboration)
        .ok_or(Error::NotFound(Entity::Collaboration(collaboration)))?;
    if collab.is_creator(user) {
        Ok(())
    } else {
        Err(Error::Unauthorized { action })
    }
}

fn sort_newest_first(collaborations: &mut [&Collaboration]) {
    collaborations.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}
