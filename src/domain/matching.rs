//! Eligibility rules for applying and deciding.
//!
//! These are pure functions of stored state. UI layers call [`can_apply`] and
//! [`can_decide`] to decide which actions to offer; the ledger calls the
//! `check_*` variants when the action is actually taken, so the two can never
//! disagree.

use crate::domain::{Application, Collaboration, Error, Requirement, UserId};

/// Whether `user` may apply to `requirement` right now.
///
/// `None` means the caller is not authenticated. `existing` is every
/// application on record for the requirement; applications for other
/// requirements are ignored.
#[must_use]
pub fn can_apply(
    requirement: &Requirement,
    user: Option<&UserId>,
    existing: &[Application],
) -> bool {
    user.is_some_and(|user| {
        check_accepting(requirement).is_ok()
            && check_no_active_application(requirement, user, existing.iter()).is_ok()
    })
}

/// Whether `acting_user` may accept or reject `application`.
#[must_use]
pub fn can_decide(
    application: &Application,
    acting_user: &UserId,
    collaboration: &Collaboration,
) -> bool {
    check_decide(application, acting_user, collaboration).is_ok()
}

/// Fails unless the requirement is open and has a free slot.
///
/// # Errors
///
/// [`Error::RequirementClosed`] if closed, otherwise
/// [`Error::CapacityExceeded`] if full.
pub fn check_accepting(requirement: &Requirement) -> Result<(), Error> {
    if !requirement.is_open() {
        return Err(Error::RequirementClosed(requirement.id()));
    }
    if requirement.is_full() {
        return Err(Error::CapacityExceeded {
            requirement: requirement.id(),
            quantity_needed: requirement.quantity_needed(),
        });
    }
    Ok(())
}

/// Fails if `user` already holds a pending or accepted application for the
/// requirement.
///
/// # Errors
///
/// [`Error::DuplicateApplication`] naming the blocking application.
pub fn check_no_active_application<'a>(
    requirement: &Requirement,
    user: &UserId,
    existing: impl IntoIterator<Item = &'a Application>,
) -> Result<(), Error> {
    match existing.into_iter().find(|app| {
        app.requirement_id == requirement.id()
            && &app.applicant_id == user
            && app.status.is_active()
    }) {
        Some(app) => Err(Error::DuplicateApplication {
            requirement: requirement.id(),
            existing: app.id,
            status: app.status,
        }),
        None => Ok(()),
    }
}

/// Fails unless `acting_user` created the collaboration and the application
/// is still pending.
///
/// Authorization is checked first, so a stranger probing a decided
/// application learns nothing about its status.
///
/// # Errors
///
/// [`Error::Unauthorized`] or [`Error::AlreadyDecided`].
pub fn check_decide(
    application: &Application,
    acting_user: &UserId,
    collaboration: &Collaboration,
) -> Result<(), Error> {
    if !collaboration.is_creator(acting_user) {
        return Err(Error::Unauthorized {
            action: "decide on applications for this collaboration",
        });
    }
    if !application.is_pending() {
        return Err(Error::AlreadyDecided {
            application: application.id,
            status: application.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApplicationStatus, ErrorKind, NewCollaboration, RequirementSpec};

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn collaboration(needed: u32) -> Collaboration {
        Collaboration::create(
            user("creator"),
            NewCollaboration {
                title: "Music video".to_string(),
                description: String::new(),
                requirements: vec![RequirementSpec::new("Dancer", needed)],
            },
        )
        .unwrap()
    }

    fn application(req: &Requirement, applicant: &str) -> Application {
        Application::new(
            req.id(),
            user(applicant),
            applicant.to_string(),
            "pick me".to_string(),
        )
    }

    #[test]
    fn half_filled_requirement_admits_new_users_only() {
        let mut collab = collaboration(2);
        collab.requirements[0].increment_filled().unwrap();
        let req = &collab.requirements[0];
        let existing = vec![application(req, "dana")];

        assert!(can_apply(req, Some(&user("erin")), &existing));
        assert!(!can_apply(req, Some(&user("dana")), &existing));
    }

    #[test]
    fn anonymous_users_cannot_apply() {
        let collab = collaboration(1);
        assert!(!can_apply(&collab.requirements[0], None, &[]));
    }

    #[test]
    fn closed_requirement_rejects_applications() {
        let mut collab = collaboration(3);
        collab.requirements[0].close();
        let req = &collab.requirements[0];

        assert!(!can_apply(req, Some(&user("erin")), &[]));
        assert_eq!(
            check_accepting(req).unwrap_err().kind(),
            ErrorKind::RequirementClosed
        );
    }

    #[test]
    fn rejected_applicants_may_reapply() {
        let collab = collaboration(1);
        let req = &collab.requirements[0];
        let mut previous = application(req, "dana");
        previous.status = ApplicationStatus::Rejected;

        assert!(can_apply(req, Some(&user("dana")), &[previous]));
    }

    #[test]
    fn accepted_applicants_may_not_reapply() {
        let collab = collaboration(3);
        let req = &collab.requirements[0];
        let mut previous = application(req, "dana");
        previous.status = ApplicationStatus::Accepted;

        let err = check_no_active_application(req, &user("dana"), [&previous]).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateApplication {
                status: ApplicationStatus::Accepted,
                ..
            }
        ));
    }

    #[test]
    fn applications_to_other_requirements_do_not_block() {
        let collab = collaboration(1);
        let other = collaboration(1);
        let elsewhere = application(&other.requirements[0], "dana");

        assert!(can_apply(
            &collab.requirements[0],
            Some(&user("dana")),
            &[elsewhere]
        ));
    }

    #[test]
    fn only_the_creator_decides_pending_applications() {
        let collab = collaboration(1);
        let mut app = application(&collab.requirements[0], "dana");

        assert!(can_decide(&app, &user("creator"), &collab));
        assert!(!can_decide(&app, &user("dana"), &collab));

        app.status = ApplicationStatus::Rejected;
        assert!(!can_decide(&app, &user("creator"), &collab));
        assert_eq!(
            check_decide(&app, &user("creator"), &collab)
                .unwrap_err()
                .kind(),
            ErrorKind::AlreadyDecided
        );
    }

    #[test]
    fn authorization_is_checked_before_status() {
        let collab = collaboration(1);
        let mut app = application(&collab.requirements[0], "dana");
        app.status = ApplicationStatus::Accepted;

        assert_eq!(
            check_decide(&app, &user("mallory"), &collab)
                .unwrap_err()
                .kind(),
            ErrorKind::Unauthorized
        );
    }
}
