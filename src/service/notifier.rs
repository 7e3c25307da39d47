//! Outbound notifications.
//!
//! Delivery is fire-and-forget: the marketplace hands each [`Notification`]
//! to a [`Notifier`] after the change has been committed, logs any failure,
//! and carries on.

use serde::Serialize;

use crate::domain::{Application, UserId};

/// Something a user should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A new application arrived for one of the creator's requirements.
    ApplicationReceived {
        /// The collaboration's creator.
        creator: UserId,
        /// The new application.
        application: Application,
    },
    /// An application was accepted or rejected.
    ApplicationDecided {
        /// The application, in its decided state.
        application: Application,
        /// Why it was decided.
        by: DecidedBy,
    },
}

impl Notification {
    /// The user this notification is addressed to.
    #[must_use]
    pub const fn recipient(&self) -> &UserId {
        match self {
            Self::ApplicationReceived { creator, .. } => creator,
            Self::ApplicationDecided { application, .. } => application.applicant_id(),
        }
    }
}

/// What caused an application to be decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    /// The creator decided it.
    Creator,
    /// The requirement or collaboration was closed while it was pending.
    Closure,
}

/// Delivers notifications to users.
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed. The marketplace logs it and does
    /// not retry.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// A failed delivery.
#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Emits each notification as a tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::ApplicationReceived {
                creator,
                application,
            } => tracing::info!(
                %creator,
                application = %application.id(),
                applicant = %application.applicant_id(),
                "application received"
            ),
            Notification::ApplicationDecided { application, by } => tracing::info!(
                applicant = %application.applicant_id(),
                application = %application.id(),
                status = %application.status(),
                ?by,
                "application decided"
            ),
        }
        Ok(())
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
