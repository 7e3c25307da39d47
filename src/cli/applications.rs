use anyhow::Context as _;
use clap::Parser;
use collab::{domain::RequirementId, Application};
use tracing::instrument;

use super::{
    explain,
    terminal::{print_table, Colorize},
    Context,
};

#[derive(Debug, Parser)]
#[command(about = "List applications for a role, or your own")]
pub struct Applications {
    /// Show applications for this role. Creators see every application;
    /// anyone else sees only their own.
    #[arg(long)]
    requirement: Option<RequirementId>,

    /// Show only pending applications
    #[arg(long)]
    pending: bool,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Applications {
    #[instrument(level = "debug", skip(self, context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let mut applications = match self.requirement {
            Some(requirement) => market
                .applications_for_requirement(context.actor(), requirement)
                .map_err(explain)?,
            None => market.user_applications(context.actor()).map_err(explain)?,
        };
        if self.pending {
            applications.retain(Application::is_pending);
        }

        match self.output {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&applications)
                        .context("failed to render json output")?
                );
            }
            OutputFormat::Table => {
                if applications.is_empty() {
                    println!("No applications found.");
                    return Ok(());
                }
                output_table(&applications);
            }
        }
        Ok(())
    }
}

fn output_table(applications: &[Application]) {
    let rows: Vec<Vec<String>> = applications
        .iter()
        .map(|app| {
            vec![
                app.id().to_string(),
                app.applicant_name().to_string(),
                app.status().to_string(),
                app.applied_at().format("%Y-%m-%d").to_string(),
                first_line(app.message()),
            ]
        })
        .collect();
    print_table(&["ID", "Applicant", "Status", "Applied", "Message"], &rows);

    let pending = applications.iter().filter(|a| a.is_pending()).count();
    if pending > 0 {
        println!();
        println!(
            "{} {}",
            pending.to_string().warning(),
            "awaiting a decision. Use 'collab decide <ID> accept|reject'.".dim()
        );
    }
}

fn first_line(message: &str) -> String {
    const MAX: usize = 48;
    let line = message.lines().next().unwrap_or_default();
    if line.chars().count() > MAX || message.lines().nth(1).is_some() {
        let short: String = line.chars().take(MAX).collect();
        format!("{short}…")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("Hello", "Hello"; "short")]
    #[test_case("First\nSecond", "First…"; "multi-line")]
    fn messages_are_shortened(message: &str, expected: &str) {
        assert_eq!(first_line(message), expected);
    }

    #[test]
    fn long_lines_are_cut() {
        let shortened = first_line(&"x".repeat(100));
        assert_eq!(shortened.chars().count(), 49);
    }

    #[test]
    fn anonymous_users_have_no_applications() {
        let tmp = tempfile::tempdir().unwrap();
        let context = Context::new(tmp.path().to_path_buf(), None, None).unwrap();
        let err = Applications {
            requirement: None,
            pending: false,
            output: OutputFormat::Table,
        }
        .run(&context)
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<collab::Error>().unwrap().kind(),
            collab::ErrorKind::Unauthorized
        );
    }
}
