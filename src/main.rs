use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;
use url::Url;

use shelter::config::Config;
use shelter::http::{Destination, Request};
use shelter::push::{resolve_action, NotificationAction, PushPayload};
use shelter::queue::{EntityType, OfflineAction, Operation};
use shelter::sync::{SubmitOutcome, SyncOutcome};
use shelter::{db, logging, Shelter};

#[derive(Parser, Debug)]
#[command(name = "shelter")]
#[command(about = "Offline cache and mutation queue for a web client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shelter/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Keep caches and queue in memory only
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the configured cache version and activate it
  Install,
  /// List cache generations
  Generations,
  /// Send a request through the interception engine
  Fetch {
    url: Url,
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,
    /// Request destination (document, script, style, image, font, manifest)
    #[arg(long, conflicts_with = "document")]
    destination: Option<Destination>,
    /// Shorthand for --destination document
    #[arg(long)]
    document: bool,
    /// Request header as `name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Queue a mutation for the next sync without trying the remote
  Enqueue {
    entity: EntityType,
    operation: Operation,
    /// JSON payload
    payload: String,
  },
  /// Apply a mutation now, or queue it when the remote is unreachable
  Submit {
    entity: EntityType,
    operation: Operation,
    /// JSON payload
    payload: String,
  },
  /// Show pending offline actions
  Queue,
  /// Replay the offline queue now
  Sync,
  /// Track connectivity and sync on every reconnect
  Watch,
  /// Show the notification for a push message
  Push {
    /// Raw push data
    data: String,
    /// Print where choosing this action navigates (open, dismiss)
    #[arg(long)]
    action: Option<NotificationAction>,
  },
}

fn parse_payload(payload: &str) -> Result<Value> {
  serde_json::from_str(payload).map_err(|e| eyre!("Invalid JSON payload: {}", e))
}

async fn start_or_passthrough(shelter: &Shelter) {
  if let Err(e) = shelter.start().await {
    warn!(error = %e, "Could not activate a cache generation, requests pass through");
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&db::data_dir()?.join("logs"), args.verbose)?;

  let ephemeral = args.ephemeral;
  let open = || Shelter::open(&config, ephemeral);

  match args.command {
    Command::Install => {
      let shelter = open().await?;
      let report = shelter.start().await?;
      println!(
        "Active: {} ({} old generations deleted, {} failed)",
        shelter.lifecycle().generations().version(),
        report.deleted.len(),
        report.failed.len()
      );
    }
    Command::Generations => {
      let shelter = open().await?;
      let current = shelter.lifecycle().generations();
      for name in shelter.cache_generations()? {
        let marker = if current.is_current(&name) { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, shelter.cache_entries(&name)?);
      }
    }
    Command::Fetch {
      url,
      method,
      destination,
      document,
      headers,
      data,
    } => {
      let shelter = open().await?;
      start_or_passthrough(&shelter).await;

      let destination = if document {
        Destination::Document
      } else {
        destination.unwrap_or_default()
      };
      let mut request = Request::new(method, url).with_destination(destination);
      for header in &headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Invalid header '{}', expected 'name: value'", header))?;
        request = request.with_header(name.trim(), value.trim());
      }
      if let Some(data) = data {
        request = request.with_body(data);
      }

      let response = shelter.fetch(&request).await?;
      println!("{}", response.status);
      for (name, value) in &response.headers {
        println!("{}: {}", name, value);
      }
      println!();
      println!("{}", response.text());
    }
    Command::Enqueue {
      entity,
      operation,
      payload,
    } => {
      let shelter = open().await?;
      let action = OfflineAction::new(entity, operation, parse_payload(&payload)?);
      println!("Queued {}", action.id);
      shelter.queue().append(action);
    }
    Command::Submit {
      entity,
      operation,
      payload,
    } => {
      let shelter = open().await?;
      match shelter
        .submit(entity, operation, parse_payload(&payload)?)
        .await?
      {
        SubmitOutcome::Applied => println!("Applied"),
        SubmitOutcome::Queued(action) => println!("Remote unavailable, queued {}", action.id),
      }
    }
    Command::Queue => {
      let shelter = open().await?;
      for action in shelter.queue().snapshot() {
        println!(
          "{}  {}  {:<8} {:<6} {}",
          action.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          action.id,
          action.entity_type,
          action.operation,
          action.payload
        );
      }
    }
    Command::Sync => {
      let shelter = open().await?;
      match shelter.force_sync().await {
        SyncOutcome::Completed(report) => println!(
          "Synced {} of {} ({} failed, {} remaining)",
          report.succeeded,
          report.attempted,
          report.failed,
          shelter.queue().len()
        ),
        SyncOutcome::AlreadyRunning => println!("A sync is already running"),
        SyncOutcome::Offline => println!("Offline, nothing synced"),
      }
    }
    Command::Watch => {
      let shelter = open().await?;
      start_or_passthrough(&shelter).await;
      println!("Watching connectivity (Ctrl-C to stop)");
      shelter
        .run_until(async {
          if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
          }
        })
        .await;
    }
    Command::Push { data, action } => {
      let notification = PushPayload::parse(data.as_bytes()).into_notification();
      println!("{}\n{}", notification.title, notification.body);
      for choice in notification.actions {
        println!("  [{}]", choice.label());
      }

      if let Some(action) = action {
        let root = config
          .app
          .origin
          .join("/")
          .map_err(|e| eyre!("Invalid origin: {}", e))?;
        match resolve_action(action, &root) {
          Some(url) => println!("{} -> {}", action.label(), url),
          None => println!("{} -> closed", action.label()),
        }
      }
    }
  }

  Ok(())
}
