//! Roster inspection and maintenance.

use clap::{Args, Subcommand};
use serde::Serialize;

use rollcall_roster::EmbeddingStore;

use super::{SessionArgs, open_store, output_result};
use crate::Cli;
use crate::config::Config;

/// List or remove enrolled identities of a session.
#[derive(Args)]
pub struct RosterCommand {
    #[command(subcommand)]
    command: RosterSubcommand,
}

#[derive(Subcommand)]
enum RosterSubcommand {
    /// List enrolled identities
    List {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Remove an identity from the session
    Remove {
        #[command(flatten)]
        session: SessionArgs,
        /// Identity ID
        #[arg(long)]
        id: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RosterLine {
    identity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RosterCommand {
    pub async fn run(&self, cli: &Cli, cfg: &Config) -> anyhow::Result<()> {
        let store = open_store(cfg)?;
        match &self.command {
            RosterSubcommand::List { session } => {
                let lines: Vec<RosterLine> = store
                    .list_embeddings(&session.namespace())?
                    .into_iter()
                    .map(|item| match item {
                        Ok(entry) => RosterLine {
                            identity_id: entry.id,
                            dimension: entry.embedding.map(|e| e.len()),
                            error: None,
                        },
                        Err(e) => RosterLine {
                            identity_id: String::new(),
                            dimension: None,
                            error: Some(e.to_string()),
                        },
                    })
                    .collect();
                output_result(&lines, cli)
            }
            RosterSubcommand::Remove { session, id } => {
                store.delete_embedding(&session.namespace(), id)?;
                eprintln!("removed {id} from {}", session.namespace());
                Ok(())
            }
        }
    }
}
