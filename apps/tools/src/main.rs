use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::DraftKey;
use shared::domain::LecturerId;
use storage::Storage;

/// Inspects and prunes the local cache of unsaved review decisions.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/portal.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    List {
        #[arg(long)]
        prefix: Option<String>,
    },
    Show {
        key: String,
    },
    /// Drops the cached decisions of one lecturer, or everything with `--all`.
    Clear {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        lecturer: Option<i64>,
        #[arg(long)]
        all: bool,
    },
}

fn lecturer_keys(lecturer_id: i64) -> Vec<String> {
    DraftKey::all_for(LecturerId(lecturer_id))
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Health => {
            storage.health_check().await?;
            println!("draft cache ok: {}", cli.database_url);
        }
        Command::List { prefix } => {
            let drafts = storage.list_drafts(prefix.as_deref()).await?;
            for draft in &drafts {
                println!(
                    "{:<24} {}  {} bytes",
                    draft.key,
                    draft.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    draft.value_json.len()
                );
            }
            println!("{} draft(s)", drafts.len());
        }
        Command::Show { key } => match storage.load_draft(&key).await? {
            Some(draft) => println!("{}", draft.value_json),
            None => println!("no draft stored under {key}"),
        },
        Command::Clear { lecturer, all } => {
            let removed = if all {
                storage.clear_all_drafts().await?
            } else {
                let keys = lecturer.map(lecturer_keys).unwrap_or_default();
                storage.remove_drafts(&keys).await?
            };
            println!("removed {removed} draft(s)");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lecturer_keys_cover_every_section() {
        assert_eq!(
            lecturer_keys(5),
            vec!["Lecturer5", "Degrees5", "Certification5"]
        );
    }

    #[test]
    fn clear_needs_a_scope() {
        assert!(Cli::try_parse_from(["draft-cache", "clear"]).is_err());
        assert!(Cli::try_parse_from(["draft-cache", "clear", "--lecturer", "3", "--all"]).is_err());
        assert!(Cli::try_parse_from(["draft-cache", "clear", "--all"]).is_ok());
    }
}
