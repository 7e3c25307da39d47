use anyhow::Context as _;
use clap::Parser;
use collab::{domain::CollaborationId, service::CollaborationSummary, Requirement};
use serde::Serialize;
use tracing::instrument;

use super::{
    explain,
    terminal::{collaboration_status, progress_bar, Colorize},
    Context,
};

#[derive(Debug, Parser)]
#[command(about = "Display a collaboration and its roles")]
pub struct Show {
    /// The collaboration to display
    collaboration: CollaborationId,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

/// A role as shown to the acting user.
#[derive(Debug, Serialize)]
struct RoleView<'a> {
    #[serde(flatten)]
    requirement: &'a Requirement,
    progress: u8,
    can_apply: bool,
}

impl Show {
    #[instrument(level = "debug", skip(self, context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let summary = market.collaboration(self.collaboration).map_err(explain)?;

        let roles: Vec<RoleView> = summary
            .collaboration
            .requirements()
            .iter()
            .map(|requirement| RoleView {
                requirement,
                progress: collab::domain::derive_progress(requirement),
                can_apply: market.can_apply(context.actor(), requirement.id()),
            })
            .collect();

        match self.output {
            OutputFormat::Pretty => output_pretty(&summary, &roles),
            OutputFormat::Json => output_json(&summary, &roles)?,
        }
        Ok(())
    }
}

fn output_pretty(summary: &CollaborationSummary, roles: &[RoleView]) {
    let collab = &summary.collaboration;

    println!("# {}", collab.title());
    if !collab.description().is_empty() {
        println!("{}", collab.description());
    }
    println!();

    println!("{}", "Metadata".dim());
    println!("  ID:       {}", collab.id());
    println!("  Creator:  {}", collab.creator_id());
    println!("  Created:  {}", collab.created_at().format("%Y-%m-%d %H:%M UTC"));
    println!("  Status:   {}", collaboration_status(collab.status()));
    println!("  Staffed:  {}", progress_bar(summary.progress));
    if summary.fully_staffed && collab.is_active() {
        println!(
            "  {}",
            "Every role is filled. Run 'collab complete' when you're done.".dim()
        );
    }
    if summary.pending_applications > 0 {
        println!(
            "  Pending:  {}",
            summary.pending_applications.to_string().warning()
        );
    }
    println!();

    if roles.is_empty() {
        println!("{}", "No roles yet.".dim());
        return;
    }

    println!("{}", "Roles".dim());
    for role in roles {
        let req = role.requirement;
        let state = if req.is_open() {
            format!("{} open", req.remaining()).success()
        } else {
            "closed".dim()
        };
        println!(
            "  {} {}/{} filled, {state}",
            req.role(),
            req.quantity_filled(),
            req.quantity_needed()
        );
        println!("    {}", req.id().to_string().dim());
        for (label, value) in [
            ("Budget", req.budget()),
            ("When", req.timing()),
            ("Where", req.location()),
            ("About", req.description()),
        ] {
            if let Some(value) = value {
                println!("    {label}: {value}");
            }
        }
        if !req.skills().is_empty() {
            println!("    Skills: {}", req.skills().join(", "));
        }
        if role.can_apply {
            println!(
                "    {}",
                format!("collab apply {} \"<message>\"", req.id()).info()
            );
        }
    }
}

fn output_json(summary: &CollaborationSummary, roles: &[RoleView]) -> anyhow::Result<()> {
    use serde_json::json;

    let collab = &summary.collaboration;
    let output = json!({
        "id": collab.id(),
        "title": collab.title(),
        "description": collab.description(),
        "creator_id": collab.creator_id(),
        "created_at": collab.created_at(),
        "status": collab.status(),
        "progress": summary.progress,
        "fully_staffed": summary.fully_staffed,
        "open_slots": summary.open_slots,
        "pending_applications": summary.pending_applications,
        "roles": roles,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to render json output")?
    );
    Ok(())
}
