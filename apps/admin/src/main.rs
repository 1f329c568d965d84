mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::ReviewTarget;
use shared::domain::{CertificateId, DegreeId, ProgramStatus, ReviewStatus};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "portal-admin", about = "Training portal administration")]
struct Cli {
    /// Overrides `api_url` from portal.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Overrides the draft cache location.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Programs {
        #[command(subcommand)]
        command: ProgramCommand,
    },
    Lecturers {
        #[command(subcommand)]
        command: LecturerCommand,
    },
    Partners {
        #[command(subcommand)]
        command: PartnerCommand,
    },
    Requests {
        #[command(subcommand)]
        command: RequestCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ProgramCommand {
    /// Every program, optionally filtered and sorted.
    List {
        #[command(flatten)]
        filter: ProgramFilterArgs,
    },
    /// Catalogue search; without a query or tag shows a small sample.
    Search {
        #[command(flatten)]
        filter: ProgramFilterArgs,
    },
    /// Debounced lookup used when linking to a program.
    Pick { query: String },
    Show { id: i64 },
    Create {
        #[command(flatten)]
        form: ProgramFormArgs,
    },
    Update {
        id: i64,
        #[command(flatten)]
        form: ProgramFormArgs,
    },
    /// Moves unit FROM to the position currently held by unit TO.
    MoveUnit { program_id: i64, from: i64, to: i64 },
    SetLead {
        program_id: i64,
        unit_id: i64,
        #[arg(long)]
        off: bool,
    },
}

#[derive(clap::Args, Debug)]
struct ProgramFilterArgs {
    #[arg(long, short)]
    query: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long = "status", value_parser = parse_program_status)]
    statuses: Vec<ProgramStatus>,
    #[arg(long, value_enum)]
    sort: Option<SortArg>,
    #[arg(long)]
    desc: bool,
    /// Read the public catalogue instead of the admin list.
    #[arg(long)]
    public: bool,
}

#[derive(clap::Args, Debug)]
struct ProgramFormArgs {
    /// `name=value`, repeatable.
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,
    #[arg(long)]
    banner: Option<PathBuf>,
    #[arg(long)]
    syllabus: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Title,
    Price,
    StartDate,
    Status,
}

#[derive(Subcommand, Debug)]
enum LecturerCommand {
    List {
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long = "status", value_parser = parse_review_status)]
        statuses: Vec<ReviewStatus>,
    },
    /// Review state, including unsaved decisions.
    Show { id: i64 },
    Approve {
        id: i64,
        #[arg(value_parser = parse_target)]
        target: ReviewTarget,
        #[arg(long, default_value = "")]
        note: String,
    },
    Reject {
        id: i64,
        #[arg(value_parser = parse_target)]
        target: ReviewTarget,
        #[arg(long)]
        note: String,
    },
    /// Puts one item back to pending.
    Reset {
        id: i64,
        #[arg(value_parser = parse_target)]
        target: ReviewTarget,
    },
    /// Commits every decision for the lecturer.
    Save {
        id: i64,
        #[arg(long)]
        notify: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PartnerCommand {
    List {
        #[arg(long, short)]
        query: Option<String>,
    },
    Update {
        id: i64,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

#[derive(Subcommand, Debug)]
enum RequestCommand {
    List {
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long = "status", value_parser = parse_review_status)]
        statuses: Vec<ReviewStatus>,
    },
    Create {
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        #[arg(long)]
        attachment: Option<PathBuf>,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

fn parse_program_status(raw: &str) -> Result<ProgramStatus, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

fn parse_review_status(raw: &str) -> Result<ReviewStatus, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

/// `lecturer`, `degree:<id>` or `certificate:<id>`.
fn parse_target(raw: &str) -> Result<ReviewTarget, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("lecturer") {
        return Ok(ReviewTarget::Lecturer);
    }
    let (kind, id) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected lecturer, degree:<id> or certificate:<id>, got '{raw}'"))?;
    let id: i64 = id.parse().map_err(|_| format!("invalid id in '{raw}'"))?;
    match kind.to_ascii_lowercase().as_str() {
        "degree" => Ok(ReviewTarget::Degree(DegreeId(id))),
        "certificate" => Ok(ReviewTarget::Certificate(CertificateId(id))),
        other => Err(format!("unknown review target '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = config::load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    let ctx = commands::Context::connect(settings)?;
    match cli.command {
        Command::Programs { command } => commands::programs(&ctx, command).await,
        Command::Lecturers { command } => commands::lecturers(&ctx, command).await,
        Command::Partners { command } => commands::partners(&ctx, command).await,
        Command::Requests { command } => commands::requests(&ctx, command).await,
    }
}
