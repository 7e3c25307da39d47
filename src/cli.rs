use std::path::{Path, PathBuf};

mod applications;
mod list;
mod show;
mod status;
mod terminal;

use applications::Applications;
use clap::ArgAction;
use collab::{
    domain::{ApplicationId, CollaborationId, PendingPolicy, RequirementId},
    service::LogNotifier,
    storage::InitError,
    Actor, Decision, Directory, Marketplace, NewCollaboration, RequirementSpec, UserId,
};
use list::List;
use show::Show;
use status::Status;
use terminal::Colorize;
use tracing::instrument;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the root of the marketplace directory
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// The user to act as
    #[arg(short, long, env = "COLLAB_USER", global = true)]
    user: Option<String>,

    /// Display name shown to creators when applying
    #[arg(long, env = "COLLAB_NAME", global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let context = Context::new(self.root, self.user, self.name)?;
        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(&context)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

/// Where the marketplace lives and who is using it.
#[derive(Debug)]
pub struct Context {
    root: PathBuf,
    actor: Actor,
}

impl Context {
    fn new(root: PathBuf, user: Option<String>, name: Option<String>) -> anyhow::Result<Self> {
        let actor = match user {
            None => Actor::Anonymous,
            Some(user) => Actor::user(UserId::new(user)?, name.unwrap_or_default()),
        };
        Ok(Self { root, actor })
    }

    fn root(&self) -> &Path {
        &self.root
    }

    const fn actor(&self) -> &Actor {
        &self.actor
    }

    fn marketplace(&self) -> anyhow::Result<Marketplace<Directory, LogNotifier>> {
        let directory = Directory::open(self.root.clone());
        let config = directory.config().clone();
        Ok(Marketplace::open(directory, LogNotifier, config)?)
    }
}

/// Wraps a marketplace error with the message an end user should see.
fn explain(error: collab::Error) -> anyhow::Error {
    let hint = error.kind().user_message();
    anyhow::Error::new(error).context(hint)
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Summarize your collaborations and applications (default)
    Status(Status),

    /// Initialize a new marketplace directory
    Init,

    /// Start a new collaboration
    Create(Create),

    /// Add a role to one of your collaborations
    AddRole(AddRole),

    /// Browse collaborations
    List(List),

    /// Show a collaboration and its roles
    Show(Show),

    /// Apply for a role
    Apply(Apply),

    /// List applications, for a role or your own
    Applications(Applications),

    /// Accept or reject an application
    Decide(Decide),

    /// Stop taking applications for a role
    Close(Close),

    /// Cancel one of your collaborations
    Cancel(Finish),

    /// Mark one of your collaborations completed
    Complete(Finish),

    /// Show or modify configuration settings
    Config(Config),
}

impl Command {
    fn run(self, context: &Context) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(context)?,
            Self::Init => Init::run(context.root())?,
            Self::Create(command) => command.run(context)?,
            Self::AddRole(command) => command.run(context)?,
            Self::List(command) => command.run(context)?,
            Self::Show(command) => command.run(context)?,
            Self::Apply(command) => command.run(context)?,
            Self::Applications(command) => command.run(context)?,
            Self::Decide(command) => command.run(context)?,
            Self::Close(command) => command.run(context)?,
            Self::Cancel(command) => command.cancel(context)?,
            Self::Complete(command) => command.complete(context)?,
            Self::Config(command) => command.run(context.root())?,
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Init {}

impl Init {
    #[instrument]
    fn run(root: &Path) -> anyhow::Result<()> {
        match Directory::init(root.to_path_buf()) {
            Ok(_) => {}
            Err(InitError::AlreadyInitialized(path)) => {
                anyhow::bail!("Marketplace already initialized in {}", path.display())
            }
            Err(e) => return Err(e.into()),
        }

        println!("Initialized marketplace in {}", root.display());
        println!("  Created: config.toml");
        println!("  Created: collaborations/");
        println!();
        println!("Next steps:");
        println!("  collab --user <you> create \"Your First Project\" --role Photographer:2");
        Ok(())
    }
}

/// Parse a role of the form `ROLE` or `ROLE:QUANTITY`.
fn parse_role(s: &str) -> Result<RequirementSpec, String> {
    let (role, quantity) = match s.rsplit_once(':') {
        Some((role, quantity)) => {
            let quantity = quantity
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid quantity '{quantity}': {e}"))?;
            (role, quantity)
        }
        None => (s, 1),
    };
    let spec = RequirementSpec::new(role.trim(), quantity);
    spec.validate().map_err(|e| e.to_string())?;
    Ok(spec)
}

#[derive(Debug, clap::Parser)]
pub struct Create {
    /// Title of the collaboration
    title: String,

    /// What the collaboration is about
    #[arg(short, long, default_value = "")]
    description: String,

    /// A role to fill, as ROLE or ROLE:QUANTITY (repeatable)
    #[arg(long = "role", value_parser = parse_role)]
    roles: Vec<RequirementSpec>,
}

impl Create {
    #[instrument(level = "debug", skip(self, context))]
    fn run(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let collab = market
            .create_collaboration(
                context.actor(),
                NewCollaboration {
                    title: self.title,
                    description: self.description,
                    requirements: self.roles,
                },
            )
            .map_err(explain)?;

        println!(
            "{}",
            format!("Created collaboration {}", collab.id()).success()
        );
        for requirement in collab.requirements() {
            println!(
                "  {} {} ×{}",
                requirement.id().to_string().dim(),
                requirement.role(),
                requirement.quantity_needed()
            );
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct AddRole {
    /// The collaboration to add the role to
    collaboration: CollaborationId,

    /// The role to fill
    role: String,

    /// How many people are needed
    #[arg(short, long, default_value_t = 1)]
    quantity: u32,

    /// Budget, e.g. "€200/day"
    #[arg(long)]
    budget: Option<String>,

    /// When the work happens
    #[arg(long)]
    timing: Option<String>,

    /// Where the work happens
    #[arg(long)]
    location: Option<String>,

    /// A skill the role calls for (repeatable)
    #[arg(long = "skill")]
    skills: Vec<String>,

    /// More detail on the role
    #[arg(short, long)]
    description: Option<String>,
}

impl AddRole {
    #[instrument(level = "debug", skip(self, context))]
    fn run(self, context: &Context) -> anyhow::Result<()> {
        let spec = RequirementSpec {
            budget: self.budget,
            timing: self.timing,
            location: self.location,
            skills: self.skills,
            description: self.description,
            ..RequirementSpec::new(self.role, self.quantity)
        };

        let market = context.marketplace()?;
        let requirement = market
            .add_requirement(context.actor(), self.collaboration, spec)
            .map_err(explain)?;

        println!(
            "{}",
            format!(
                "Added {} ×{} as {}",
                requirement.role(),
                requirement.quantity_needed(),
                requirement.id()
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Apply {
    /// The role to apply for
    requirement: RequirementId,

    /// A note to the creator
    message: String,
}

impl Apply {
    #[instrument(level = "debug", skip(self, context))]
    fn run(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let application = market
            .submit_application(context.actor(), self.requirement, &self.message)
            .map_err(explain)?;

        println!(
            "{}",
            format!("Applied ({})", application.id()).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Decide {
    /// The application to decide
    application: ApplicationId,

    /// accept or reject
    decision: Decision,
}

impl Decide {
    #[instrument(level = "debug", skip(self, context))]
    fn run(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let application = market
            .decide_application(context.actor(), self.application, self.decision)
            .map_err(explain)?;
        let requirement = market
            .requirement(application.requirement_id())
            .map_err(explain)?;

        println!(
            "{}",
            format!(
                "Application from {} {}",
                application.applicant_name(),
                application.status()
            )
            .success()
        );
        println!(
            "  {}: {}/{} filled{}",
            requirement.role(),
            requirement.quantity_filled(),
            requirement.quantity_needed(),
            if requirement.is_open() {
                String::new()
            } else {
                format!(" {}", "(closed)".dim())
            }
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Close {
    /// The role to close
    requirement: RequirementId,
}

impl Close {
    #[instrument(level = "debug", skip(self, context))]
    fn run(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let requirement = market
            .close_requirement(context.actor(), self.requirement)
            .map_err(explain)?;

        println!(
            "{}",
            format!(
                "{} closed with {}/{} filled",
                requirement.role(),
                requirement.quantity_filled(),
                requirement.quantity_needed()
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Finish {
    /// The collaboration
    collaboration: CollaborationId,
}

impl Finish {
    fn cancel(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let collab = market
            .cancel_collaboration(context.actor(), self.collaboration)
            .map_err(explain)?;
        println!("{}", format!("'{}' cancelled", collab.title()).warning());
        Ok(())
    }

    fn complete(self, context: &Context) -> anyhow::Result<()> {
        let market = context.marketplace()?;
        let collab = market
            .complete_collaboration(context.actor(), self.collaboration)
            .map_err(explain)?;
        println!("{}", format!("'{}' completed", collab.title()).success());
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Config {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, clap::Parser)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,

        /// Value to set
        value: String,
    },
}

impl Config {
    #[instrument]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let directory = Directory::open(root.to_path_buf());
        let config_path = directory.config_path();
        let mut config = directory.config().clone();

        match self.command {
            ConfigCommand::Show => {
                println!("Configuration:");
                println!("  default_page_size: {}", config.default_page_size());
                println!("  max_page_size: {}", config.max_page_size());
                println!("  max_message_length: {}", config.max_message_length());
                println!(
                    "  pending_on_close: {} ({})",
                    policy_name(config.pending_on_close),
                    match config.pending_on_close {
                        PendingPolicy::Reject => "pending applications are rejected".dim(),
                        PendingPolicy::Keep => "pending applications stay pending".dim(),
                    }
                );
            }
            ConfigCommand::Set { key, value } => {
                match key.as_str() {
                    "default_page_size" => config.set_default_page_size(parse_size(&value)?),
                    "max_page_size" => config.set_max_page_size(parse_size(&value)?),
                    "max_message_length" => config.set_max_message_length(parse_size(&value)?),
                    "pending_on_close" => {
                        config.pending_on_close = match value.as_str() {
                            "reject" => PendingPolicy::Reject,
                            "keep" => PendingPolicy::Keep,
                            _ => anyhow::bail!("Value must be 'reject' or 'keep'"),
                        };
                    }
                    _ => anyhow::bail!(
                        "Unknown configuration key: {key}\nSupported keys: default_page_size, \
                         max_page_size, max_message_length, pending_on_close"
                    ),
                }

                config
                    .save(&config_path)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                println!("{}", format!("Set {key} = {value}").success());
            }
        }
        Ok(())
    }
}

const fn policy_name(policy: PendingPolicy) -> &'static str {
    match policy {
        PendingPolicy::Reject => "reject",
        PendingPolicy::Keep => "keep",
    }
}

fn parse_size(value: &str) -> anyhow::Result<usize> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Value must be a positive integer"))
}

#[cfg(test)]
mod tests {
    use collab::{
        domain::{ApplicationStatus, ErrorKind, RequirementStatus},
        service::CollaborationFilter,
        storage::Store,
    };
    use tempfile::{tempdir, TempDir};
    use test_case::test_case;

    use super::*;

    fn context(root: &Path, user: Option<&str>) -> Context {
        Context::new(root.to_path_buf(), user.map(str::to_string), None).unwrap()
    }

    fn initialized() -> TempDir {
        let tmp = tempdir().unwrap();
        Init::run(tmp.path()).unwrap();
        tmp
    }

    fn only_collaboration(root: &Path) -> collab::Collaboration {
        let records = Directory::open(root.to_path_buf()).load().unwrap();
        assert_eq!(records.len(), 1);
        records[0].collaboration.clone()
    }

    #[test_case("Photographer", "Photographer", 1; "bare role")]
    #[test_case("Makeup Artist:3", "Makeup Artist", 3; "with quantity")]
    #[test_case(" Model : 2 ", "Model", 2; "padded")]
    fn roles_parse(input: &str, role: &str, quantity: u32) {
        let spec = parse_role(input).unwrap();
        assert_eq!(spec.role, role);
        assert_eq!(spec.quantity_needed, quantity);
    }

    #[test_case("Model:0"; "zero quantity")]
    #[test_case("Model:many"; "not a number")]
    #[test_case(":2"; "blank role")]
    fn bad_roles_are_refused(input: &str) {
        assert!(parse_role(input).is_err());
    }

    #[test]
    fn init_twice_fails() {
        let tmp = initialized();
        assert!(Init::run(tmp.path()).is_err());
    }

    #[test]
    fn create_then_staff_a_role() {
        let tmp = initialized();
        let creator = context(tmp.path(), Some("ava"));

        Create {
            title: "Editorial".to_string(),
            description: "Autumn issue".to_string(),
            roles: vec![parse_role("Stylist:1").unwrap()],
        }
        .run(&creator)
        .unwrap();

        let collab = only_collaboration(tmp.path());
        let requirement = collab.requirements()[0].id();

        Apply {
            requirement,
            message: "I styled the spring issue".to_string(),
        }
        .run(&context(tmp.path(), Some("bo")))
        .unwrap();

        let market = creator.marketplace().unwrap();
        let application = market
            .applications_for_requirement(creator.actor(), requirement)
            .unwrap()[0]
            .id();

        Decide {
            application,
            decision: Decision::Accept,
        }
        .run(&creator)
        .unwrap();

        let market = creator.marketplace().unwrap();
        let requirement = market.requirement(requirement).unwrap();
        assert_eq!(requirement.quantity_filled(), 1);
        assert_eq!(requirement.status(), RequirementStatus::Closed);
        assert_eq!(
            market.user_applications(&context(tmp.path(), Some("bo")).actor)
                .unwrap()[0]
                .status(),
            ApplicationStatus::Accepted
        );
    }

    #[test]
    fn anonymous_users_cannot_create() {
        let tmp = initialized();
        let err = Create {
            title: "Editorial".to_string(),
            description: String::new(),
            roles: Vec::new(),
        }
        .run(&context(tmp.path(), None))
        .unwrap_err();

        let cause = err.downcast_ref::<collab::Error>().unwrap();
        assert_eq!(cause.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.to_string(), ErrorKind::Unauthorized.user_message());
    }

    #[test]
    fn add_role_and_cancel() {
        let tmp = initialized();
        let creator = context(tmp.path(), Some("ava"));
        Create {
            title: "Short film".to_string(),
            description: String::new(),
            roles: Vec::new(),
        }
        .run(&creator)
        .unwrap();
        let id = only_collaboration(tmp.path()).id();

        AddRole {
            collaboration: id,
            role: "Gaffer".to_string(),
            quantity: 2,
            budget: Some("€250/day".to_string()),
            timing: None,
            location: Some("Leeds".to_string()),
            skills: vec!["lighting".to_string()],
            description: None,
        }
        .run(&creator)
        .unwrap();

        Finish { collaboration: id }.cancel(&creator).unwrap();

        let collab = only_collaboration(tmp.path());
        assert_eq!(collab.status(), collab::CollaborationStatus::Cancelled);
        assert_eq!(collab.requirements()[0].budget(), Some("€250/day"));
        assert!(!collab.requirements()[0].is_open());

        let market = creator.marketplace().unwrap();
        let listed = market.list_collaborations(
            &CollaborationFilter::active(),
            collab::service::PageRequest::default(),
        );
        assert_eq!(listed.total, 0);
    }

    #[test]
    fn config_set_round_trips() {
        let tmp = initialized();
        Config {
            command: ConfigCommand::Set {
                key: "pending_on_close".to_string(),
                value: "keep".to_string(),
            },
        }
        .run(tmp.path())
        .unwrap();

        let directory = Directory::open(tmp.path().to_path_buf());
        assert_eq!(directory.config().pending_on_close, PendingPolicy::Keep);

        let err = Config {
            command: ConfigCommand::Set {
                key: "colour".to_string(),
                value: "blue".to_string(),
            },
        }
        .run(tmp.path())
        .unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }
}
