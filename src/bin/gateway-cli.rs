use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use integration_gateway::config::loader::{load_config, load_default_config};
use integration_gateway::credentials::{CredentialManager, HttpTokenBroker, MemoryCredentialStore, OAuthSettings};
use integration_gateway::fiscal::{
    ContingencyStateMachine, ContingencyStore, ContingencyType, FileContingencyStore, FiscalClient,
    MemoryContingencyStore,
};
use integration_gateway::registry::RegistryLookup;
use integration_gateway::resilience::RetryPolicy;
use integration_gateway::transport::HttpTransport;
use integration_gateway::GatewayConfig;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the integration gateway", long_about = None)]
struct Cli {
    /// Gateway config file. Defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up product registration numbers
    Lookup {
        #[arg(required = true)]
        identifiers: Vec<String>,
    },
    /// Probe the fiscal authority once
    FiscalStatus,
    /// Inspect or change the fiscal contingency flag
    Contingency {
        /// Contingency history file (overrides the configured path)
        #[arg(long)]
        state: Option<PathBuf>,

        #[command(subcommand)]
        action: ContingencyAction,
    },
    /// Print the groupware authorization URL
    AuthorizeUrl {
        #[arg(long, default_value = "gateway-cli")]
        state: String,
    },
}

#[derive(Subcommand)]
enum ContingencyAction {
    /// Show the current state and history
    Status,
    /// Enter contingency (SVC-AN, SVC-RS, EPEC, FS-DA, OFFLINE)
    Enable { kind: ContingencyType, reason: String },
    /// Leave contingency
    Disable,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_default_config()?,
    };

    let transport = HttpTransport::new(&config.transport)?;
    let retry = RetryPolicy::from_config(&config.retries);

    match cli.command {
        Commands::Lookup { identifiers } => {
            let lookup = RegistryLookup::from_config(&config, transport);
            let outcome = lookup.lookup_many(identifiers.iter()).await;

            let mut report = serde_json::Map::new();
            for identifier in &identifiers {
                let entry = match outcome.get(identifier) {
                    Some(Ok(result)) => serde_json::to_value(result)?,
                    Some(Err(e)) => serde_json::json!({ "error": e.to_string() }),
                    None => continue,
                };
                report.insert(identifier.clone(), entry);
            }
            print_json(&report)?;
        }
        Commands::FiscalStatus => {
            let contingency = load_contingency(&config, None).await?;
            let client = FiscalClient::new(&config.fiscal, transport, retry, Arc::new(contingency));
            print_json(&client.service_status().await?)?;
        }
        Commands::Contingency { state, action } => {
            let machine = load_contingency(&config, state).await?;
            match action {
                ContingencyAction::Status => {}
                ContingencyAction::Enable { kind, reason } => {
                    let transition = machine.enable(kind, &reason).await?;
                    eprintln!("{:?}", transition);
                }
                ContingencyAction::Disable => {
                    let transition = machine.disable().await?;
                    eprintln!("{:?}", transition);
                }
            }
            print_json(&serde_json::json!({
                "owner": machine.owner(),
                "state": machine.state(),
                "history": machine.history().await,
            }))?;
        }
        Commands::AuthorizeUrl { state } => {
            let broker = Arc::new(HttpTokenBroker::new(
                transport,
                retry,
                config.credentials.broker_url.clone(),
                config.credentials.broker_secret.clone(),
            ));
            let manager = CredentialManager::new(
                OAuthSettings::from_groupware(&config.groupware),
                &config.credentials,
                broker,
                Arc::new(MemoryCredentialStore::new()),
            );
            println!("{}", manager.authorize_url(&state)?);
        }
    }

    Ok(())
}

async fn load_contingency(
    config: &GatewayConfig,
    state: Option<PathBuf>,
) -> Result<ContingencyStateMachine, Box<dyn std::error::Error>> {
    let path = state.or_else(|| config.fiscal.contingency_state_path.as_ref().map(PathBuf::from));
    let store: Arc<dyn ContingencyStore> = match path {
        Some(path) => Arc::new(FileContingencyStore::new(path)),
        None => {
            eprintln!("Warning: no contingency state file configured, changes will not persist");
            Arc::new(MemoryContingencyStore::new())
        }
    };
    Ok(ContingencyStateMachine::load(config.fiscal.owner.clone(), store).await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
