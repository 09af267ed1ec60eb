use std::sync::Arc;

use clap::{Parser, Subcommand};
use cse_config::CseConfig;
use cse_core::{AcmeNotificationTransport, Cse, InMemoryRemoteCse};
use cse_model::{CseTime, Patch, Resource, ResourceType};
use cse_storage::memory::InMemoryStorage;
use cse_storage::Storage;

#[derive(Parser)]
#[command(name = "cse", version, about = "oneM2M Common Services Entity")]
struct Cli {
    /// Configuration profile (looks for cse.yaml / cse-{profile}.yaml)
    #[arg(long, default_value = "dev")]
    profile: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the CSE and run the expiration monitor until interrupted.
    Serve,
    /// Create a resource under `parent` and print the result.
    Create {
        parent: String,
        #[arg(long)]
        originator: String,
        /// Resource type: ae, container, contentinstance, subscription, acp, node, mgmtobj, remotecse
        #[arg(long)]
        ty: String,
        #[arg(long)]
        rn: Option<String>,
        /// JSON object of attributes, e.g. '{"api":"NMyApp1Id","rr":false}'
        #[arg(long)]
        attrs: Option<String>,
    },
    /// Retrieve a resource by `ri` or structured path and print it.
    Retrieve {
        id: String,
        #[arg(long)]
        originator: String,
    },
    /// Apply a JSON patch to a resource and print the result.
    Update {
        id: String,
        #[arg(long)]
        originator: String,
        /// JSON object; a `null` value removes the attribute.
        #[arg(long)]
        attrs: String,
    },
    /// Delete a resource (and its descendants).
    Delete {
        id: String,
        #[arg(long)]
        originator: String,
    },
}

fn parse_resource_type(raw: &str) -> Result<ResourceType, String> {
    match raw.to_lowercase().as_str() {
        "ae" => Ok(ResourceType::Ae),
        "container" | "cnt" => Ok(ResourceType::Container),
        "contentinstance" | "cin" => Ok(ResourceType::ContentInstance),
        "subscription" | "sub" => Ok(ResourceType::Subscription),
        "acp" | "accesscontrolpolicy" => Ok(ResourceType::AccessControlPolicy),
        "node" => Ok(ResourceType::Node),
        "mgmtobj" => Ok(ResourceType::MgmtObj),
        "remotecse" | "csr" => Ok(ResourceType::RemoteCse),
        other => Err(format!("unknown resource type: {other}")),
    }
}

/// Builds a fresh, in-memory-backed CSE for the duration of this invocation.
/// Persistent storage is a collaborator this engine leaves to its caller
/// (`cse-storage`'s reference backend is in-memory only); `serve` is the
/// mode meant to stay up across many requests, while the one-shot CRUD
/// subcommands here exist to exercise the engine end-to-end.
async fn build_cse(profile: &str) -> Result<Cse, Box<dyn std::error::Error>> {
    let config = CseConfig::load(profile)?.with_settings()?;
    let settings = config.typed().clone();

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let transport = Arc::new(AcmeNotificationTransport::new());
    let remote = Arc::new(InMemoryRemoteCse::new());
    let cse = Cse::bootstrap(settings, storage, transport, remote).await?;
    Ok(cse)
}

#[tokio::main]
async fn main() {
    cse_init_tracing();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cse = build_cse(&cli.profile).await?;

    match cli.command {
        Commands::Serve => {
            cse.start();
            tracing::info!(rn = %cse.settings().cse_rn, "CSE started, awaiting shutdown signal");
            tokio::signal::ctrl_c().await?;
            cse.shutdown();
            Ok(())
        }
        Commands::Create { parent, originator, ty, rn, attrs } => {
            let ty = parse_resource_type(&ty)?;
            let mut resource = Resource::new(
                String::new(),
                rn.unwrap_or_default(),
                None,
                ty,
                CseTime::now_plus(chrono::Duration::days(365)),
            );
            if let Some(attrs) = attrs {
                let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&attrs)?;
                resource.attrs = parsed;
            }
            let created = cse.dispatcher.create(&parent, resource, &originator).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
            Ok(())
        }
        Commands::Retrieve { id, originator } => {
            let resource = cse.dispatcher.retrieve(&id, &originator).await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
            Ok(())
        }
        Commands::Update { id, originator, attrs } => {
            let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&attrs)?;
            let updated = cse.dispatcher.update(&id, Patch(parsed), &originator).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
            Ok(())
        }
        Commands::Delete { id, originator } => {
            let deleted = cse.dispatcher.delete(&id, &originator, true).await?;
            println!("{}", serde_json::to_string_pretty(&deleted)?);
            Ok(())
        }
    }
}

fn cse_init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()))
        .init();
}
