use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use collab::{
    service::{CollaborationFilter, CollaborationSummary, PageRequest},
    CollaborationStatus, UserId,
};
use tracing::instrument;

use super::{
    terminal::{is_narrow, Colorize},
    Context,
};

/// Command arguments for `collab list`.
#[derive(Debug, Parser)]
#[command(about = "Browse collaborations, newest first")]
pub struct List {
    /// Collaboration status to show (default: active).
    #[arg(long, value_enum, default_value_t)]
    status: StatusFilter,

    /// Show only collaborations by this creator.
    #[arg(long, value_name = "USER", conflicts_with = "mine")]
    creator: Option<UserId>,

    /// Show only your own collaborations.
    #[arg(long)]
    mine: bool,

    /// Show only collaborations looking for this role (case-insensitive).
    #[arg(long)]
    role: Option<String>,

    /// Show only collaborations calling for this skill (case-insensitive).
    #[arg(long)]
    skill: Option<String>,

    /// Show only collaborations with at least one open role.
    #[arg(long)]
    open: bool,

    /// Case-insensitive substring match against title/description.
    #[arg(long)]
    contains: Option<String>,

    /// Skip this many collaborations.
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Page size (default and cap come from the configuration).
    #[arg(long)]
    limit: Option<usize>,

    /// Output format (default: table).
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Print only collaboration ids.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum StatusFilter {
    #[default]
    Active,
    Completed,
    Cancelled,
    Any,
}

impl StatusFilter {
    const fn status(self) -> Option<CollaborationStatus> {
        match self {
            Self::Active => Some(CollaborationStatus::Active),
            Self::Completed => Some(CollaborationStatus::Completed),
            Self::Cancelled => Some(CollaborationStatus::Cancelled),
            Self::Any => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl List {
    #[instrument(level = "debug", skip(self, context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let filter = self.filter(context)?;
        let market = context.marketplace()?;
        let page = market.list_collaborations(
            &filter,
            PageRequest {
                offset: self.offset,
                limit: self.limit,
            },
        );

        match self.output {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(std::io::stdout(), &page)
                    .context("failed to render json output")?;
                println!();
            }
            OutputFormat::Table if self.quiet => {
                for summary in &page.items {
                    println!("{}", summary.collaboration.id());
                }
            }
            OutputFormat::Table => {
                if page.items.is_empty() {
                    println!("No collaborations found.");
                    return Ok(());
                }
                render_table(&page.items);
                if page.has_more() {
                    println!(
                        "{}",
                        format!(
                            "Showing {}-{} of {}. Use --offset {} for more.",
                            page.offset + 1,
                            page.offset + page.items.len(),
                            page.total,
                            page.offset + page.items.len()
                        )
                        .dim()
                    );
                }
            }
        }
        Ok(())
    }

    fn filter(&self, context: &Context) -> anyhow::Result<CollaborationFilter> {
        let creator = if self.mine {
            let Some(user) = context.actor().user_id() else {
                anyhow::bail!("--mine needs a user; pass --user or set COLLAB_USER");
            };
            Some(user.clone())
        } else {
            self.creator.clone()
        };

        Ok(CollaborationFilter {
            status: self.status.status(),
            creator,
            role: self.role.clone(),
            skill: self.skill.clone(),
            open_only: self.open,
            query: self.contains.clone(),
        })
    }
}

fn render_table(items: &[CollaborationSummary]) {
    if is_narrow() {
        for summary in items {
            let collab = &summary.collaboration;
            println!("{} {}", collab.title(), collab.id().to_string().dim());
            println!(
                "  {}% staffed, {} open slots",
                summary.progress, summary.open_slots
            );
        }
        return;
    }

    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|summary| {
            let collab = &summary.collaboration;
            let roles = collab
                .requirements()
                .iter()
                .map(|r| format!("{} {}/{}", r.role(), r.quantity_filled(), r.quantity_needed()))
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                collab.id().to_string(),
                collab.title().to_string(),
                collab.creator_id().to_string(),
                collab.status().to_string(),
                format!("{}%", summary.progress),
                roles,
            ]
        })
        .collect();

    super::terminal::print_table(
        &["ID", "Title", "Creator", "Status", "Staffed", "Roles"],
        &rows,
    );
}
