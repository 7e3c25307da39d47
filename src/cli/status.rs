use std::collections::BTreeMap;

use clap::Parser;
use collab::{
    service::{CollaborationFilter, PageRequest},
    ApplicationStatus, CollaborationStatus, UserId,
};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use super::{
    explain,
    terminal::{application_status, collaboration_status, is_narrow, progress_bar, Colorize},
    Context,
};

#[derive(Debug, Parser, Default)]
#[command(about = "Summarize your collaborations and applications")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Headline figures for the acting user.
#[derive(Debug, Default)]
struct Overview {
    /// Active collaborations open to everyone.
    active: usize,
    /// Open slots across active collaborations.
    open_slots: u64,
    /// The user's own collaborations.
    mine: Vec<Owned>,
    /// The user's applications by status.
    applications: BTreeMap<ApplicationStatus, usize>,
}

#[derive(Debug, Serialize)]
struct Owned {
    title: String,
    status: CollaborationStatus,
    progress: u8,
    pending_applications: usize,
}

impl Status {
    #[instrument(level = "debug", skip(self, context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let overview = Self::collect(context)?;
        let user = context.actor().user_id();

        match self.output {
            OutputFormat::Json => Self::output_json(&overview)?,
            OutputFormat::Table if self.quiet => Self::output_quiet(&overview),
            OutputFormat::Table => Self::output_table(&overview, user),
        }
        Ok(())
    }

    fn collect(context: &Context) -> anyhow::Result<Overview> {
        let market = context.marketplace()?;
        let active = market.list_collaborations(
            &CollaborationFilter::active(),
            PageRequest {
                offset: 0,
                limit: Some(market.config().max_page_size()),
            },
        );

        let mut overview = Overview {
            active: active.total,
            open_slots: active
                .items
                .iter()
                .fold(0_u64, |total, s| total.saturating_add(s.open_slots)),
            ..Overview::default()
        };

        let Some(user) = context.actor().user_id() else {
            return Ok(overview);
        };

        overview.mine = market
            .list_user_collaborations(user)
            .into_iter()
            .map(|s| Owned {
                title: s.collaboration.title().to_string(),
                status: s.collaboration.status(),
                progress: s.progress,
                pending_applications: s.pending_applications,
            })
            .collect();
        for app in market.user_applications(context.actor()).map_err(explain)? {
            *overview.applications.entry(app.status()).or_insert(0) += 1;
        }
        Ok(overview)
    }

    fn output_json(overview: &Overview) -> anyhow::Result<()> {
        let output = json!({
            "active_collaborations": overview.active,
            "open_slots": overview.open_slots,
            "collaborations": overview.mine,
            "applications": overview.applications,
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_quiet(overview: &Overview) {
        let pending: usize = overview.mine.iter().map(|m| m.pending_applications).sum();
        println!(
            "active={} open_slots={} mine={} pending={}",
            overview.active,
            overview.open_slots,
            overview.mine.len(),
            pending
        );
    }

    fn output_table(overview: &Overview, user: Option<&UserId>) {
        println!("Marketplace");
        println!("{}", "───────────".dim());
        println!("  Active collaborations: {}", overview.active);
        println!("  Open slots:            {}", overview.open_slots.to_string().success());
        println!();

        let Some(user) = user else {
            println!(
                "{}",
                "Pass --user (or set COLLAB_USER) to see your own activity.".dim()
            );
            return;
        };

        println!("Your collaborations ({user})");
        println!("{}", "───────────────────".dim());
        if overview.mine.is_empty() {
            println!("  None yet. Start one with 'collab create'.");
        }
        for owned in &overview.mine {
            if is_narrow() {
                println!("  {}: {}%", owned.title, owned.progress);
            } else {
                println!(
                    "  {:<32} {} {}",
                    owned.title,
                    progress_bar(owned.progress),
                    collaboration_status(owned.status)
                );
            }
            if owned.pending_applications > 0 {
                println!(
                    "    {} pending",
                    owned.pending_applications.to_string().warning()
                );
            }
        }
        println!();

        println!("Your applications");
        println!("{}", "─────────────────".dim());
        if overview.applications.is_empty() {
            println!("  None yet. Browse with 'collab list --open'.");
        }
        for (status, count) in &overview.applications {
            println!("  {count:>3} {}", application_status(*status));
        }
    }
}

#[cfg(test)]
mod tests {
    use collab::{Actor, Decision, NewCollaboration, RequirementSpec};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn overview_counts_the_users_activity() {
        let tmp = tempdir().unwrap();
        let ava = Context::new(tmp.path().to_path_buf(), Some("ava".to_string()), None).unwrap();
        let bo = Context::new(tmp.path().to_path_buf(), Some("bo".to_string()), None).unwrap();

        let market = ava.marketplace().unwrap();
        let collab = market
            .create_collaboration(
                ava.actor(),
                NewCollaboration {
                    title: "Zine".to_string(),
                    description: String::new(),
                    requirements: vec![
                        RequirementSpec::new("Illustrator", 2),
                        RequirementSpec::new("Editor", 1),
                    ],
                },
            )
            .unwrap();
        let app = market
            .submit_application(bo.actor(), collab.requirements()[0].id(), "Hi")
            .unwrap();
        market
            .submit_application(bo.actor(), collab.requirements()[1].id(), "Also me")
            .unwrap();
        market
            .decide_application(ava.actor(), app.id(), Decision::Accept)
            .unwrap();

        let overview = Status::collect(&ava).unwrap();
        assert_eq!(overview.active, 1);
        assert_eq!(overview.open_slots, 2);
        assert_eq!(overview.mine.len(), 1);
        assert_eq!(overview.mine[0].progress, 33);
        assert_eq!(overview.mine[0].pending_applications, 1);

        let overview = Status::collect(&bo).unwrap();
        assert!(overview.mine.is_empty());
        assert_eq!(overview.applications[&ApplicationStatus::Accepted], 1);
        assert_eq!(overview.applications[&ApplicationStatus::Pending], 1);
    }

    #[test]
    fn huge_roles_fit_in_the_overview() {
        let tmp = tempdir().unwrap();
        let ava = Context::new(tmp.path().to_path_buf(), Some("ava".to_string()), None).unwrap();
        let market = ava.marketplace().unwrap();
        for title in ["Marathon", "Festival"] {
            market
                .create_collaboration(
                    ava.actor(),
                    NewCollaboration {
                        title: title.to_string(),
                        description: String::new(),
                        requirements: vec![
                            RequirementSpec::new("Volunteer", u32::MAX),
                            RequirementSpec::new("Medic", u32::MAX),
                        ],
                    },
                )
                .unwrap();
        }

        let overview = Status::collect(&ava).unwrap();
        assert_eq!(overview.open_slots, 4 * u64::from(u32::MAX));
        assert!(overview.mine.iter().all(|owned| owned.progress == 0));
    }

    #[test]
    fn anonymous_overview_skips_personal_sections() {
        let tmp = tempdir().unwrap();
        let context = Context::new(tmp.path().to_path_buf(), None, None).unwrap();
        assert!(matches!(context.actor(), Actor::Anonymous));

        let overview = Status::collect(&context).unwrap();
        assert!(overview.mine.is_empty());
        assert!(overview.applications.is_empty());
    }
}
