//! `ontic`: operator CLI for an Ontic store.
//!
//! Reads `ontic.toml` (or `--config`) plus `ONTIC_*` environment variables,
//! opens the SQLite store and prints results as JSON.
//!
//! # Usage
//!
//! ```
//! ontic stale
//! ontic questions next --workflow 6f0c…
//! ontic questions answer 1b2e… "net of refunds" --state 9a41…
//! ontic changes review 3c7d… approve
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ontic_core::{
  RequestContext,
  change::{ChangeStatus, ChangeType},
  store::{OntologyStore, PendingChangeStore, QuestionStore, WorkflowStateStore},
  workflow::{QuestionStatus, WorkflowAnswer},
};
use ontic_store_sqlite::SqliteStore;
use serde::Serialize;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ontic", version, about = "Inspect and steer an Ontic ontology store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ontic.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// List entities and relationships left stale by the last refresh.
  Stale {
    /// Ontology to inspect (default: the active one).
    #[arg(long)]
    ontology: Option<Uuid>,
  },

  /// Clarification questions.
  #[command(subcommand)]
  Questions(QuestionCommand),

  /// Pending schema changes.
  #[command(subcommand)]
  Changes(ChangeCommand),
}

#[derive(Subcommand)]
enum QuestionCommand {
  /// The most urgent pending question.
  Next {
    /// Read a workflow's embedded queue instead of the ontology queue.
    #[arg(long)]
    workflow: Option<Uuid>,
  },

  /// Pending questions split into required and optional.
  Counts {
    #[arg(long)]
    workflow: Option<Uuid>,
  },

  /// Answer a question.
  Answer {
    question_id: Uuid,
    answer:      String,
    /// Owning workflow entity state, for workflow questions.
    #[arg(long)]
    state:       Option<Uuid>,
  },
}

#[derive(Subcommand)]
enum ChangeCommand {
  List {
    #[arg(long)]
    status: Option<ChangeStatus>,
    #[arg(long = "type")]
    change_type: Option<ChangeType>,
    #[arg(long)]
    limit: Option<usize>,
  },

  Review {
    change_id: Uuid,
    decision:  Decision,
    /// Reviewer name (default: the configured user id).
    #[arg(long)]
    by:        Option<String>,
  },

  Counts,
}

#[derive(Clone, Copy, ValueEnum)]
enum Decision {
  Approve,
  Reject,
}

impl From<Decision> for ChangeStatus {
  fn from(d: Decision) -> Self {
    match d {
      Decision::Approve => ChangeStatus::Approved,
      Decision::Reject => ChangeStatus::Rejected,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let ctx = settings.context();

  match cli.command {
    Command::Stale { ontology } => stale(&store, &ctx, ontology).await,
    Command::Questions(cmd) => questions(&store, &ctx, cmd).await,
    Command::Changes(cmd) => changes(&store, &ctx, &settings, cmd).await,
  }
}

fn print_json(value: &impl Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

async fn active_ontology(store: &SqliteStore, ctx: &RequestContext) -> Result<Uuid> {
  let ontology = store
    .get_active_ontology(ctx)
    .await?
    .context("project has no active ontology")?;
  Ok(ontology.ontology_id)
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn stale(store: &SqliteStore, ctx: &RequestContext, ontology: Option<Uuid>) -> Result<()> {
  let ontology_id = match ontology {
    Some(id) => id,
    None => active_ontology(store, ctx).await?,
  };
  let stale = store.get_stale(ctx, ontology_id).await?;
  tracing::info!(
    entities = stale.entities.len(),
    relationships = stale.relationships.len(),
    "stale rows"
  );
  print_json(&serde_json::json!({
    "ontology_id": ontology_id,
    "entities": stale.entities,
    "relationships": stale.relationships,
  }))
}

async fn questions(store: &SqliteStore, ctx: &RequestContext, cmd: QuestionCommand) -> Result<()> {
  match cmd {
    QuestionCommand::Next { workflow: Some(workflow_id) } => {
      print_json(&store.get_next_pending_question(ctx, workflow_id).await?)
    }
    QuestionCommand::Next { workflow: None } => {
      let ontology_id = active_ontology(store, ctx).await?;
      print_json(&store.next_pending_question(ctx, ontology_id).await?)
    }
    QuestionCommand::Counts { workflow: Some(workflow_id) } => {
      let counts = store.get_pending_questions_count(ctx, workflow_id).await?;
      print_json(&serde_json::json!({
        "required": counts.required,
        "optional": counts.optional,
        "can_proceed": counts.can_proceed(),
      }))
    }
    QuestionCommand::Counts { workflow: None } => {
      let ontology_id = active_ontology(store, ctx).await?;
      print_json(&store.pending_question_counts(ctx, ontology_id).await?)
    }
    QuestionCommand::Answer { question_id, answer, state: Some(state_id) } => {
      let user_id = ctx.provenance()?.user_id;
      store
        .update_question_in_entity(
          ctx,
          state_id,
          question_id,
          QuestionStatus::Answered,
          Some(answer.clone()),
        )
        .await?;
      store
        .record_answer_in_entity(ctx, state_id, WorkflowAnswer::new(question_id, answer, user_id))
        .await?;
      print_json(&store.get_state(ctx, state_id).await?)
    }
    QuestionCommand::Answer { question_id, answer, state: None } => {
      print_json(&store.answer_question(ctx, question_id, answer).await?)
    }
  }
}

async fn changes(
  store: &SqliteStore,
  ctx: &RequestContext,
  settings: &Settings,
  cmd: ChangeCommand,
) -> Result<()> {
  match cmd {
    ChangeCommand::List { status, change_type: Some(change_type), limit } => {
      let mut listed = store.list_changes_by_type(ctx, change_type, limit).await?;
      if let Some(status) = status {
        listed.retain(|c| c.status == status);
      }
      print_json(&listed)
    }
    ChangeCommand::List { status, change_type: None, limit } => {
      print_json(&store.list_changes(ctx, status, limit).await?)
    }
    ChangeCommand::Review { change_id, decision, by } => {
      let reviewer = by
        .or_else(|| settings.user_id.map(|u| u.to_string()))
        .context("--by is required when no user_id is configured")?;
      print_json(&store.review_change(ctx, change_id, decision.into(), reviewer).await?)
    }
    ChangeCommand::Counts => print_json(&store.count_changes_by_status(ctx).await?),
  }
}
