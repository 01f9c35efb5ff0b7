//! Operator CLI for the gatepass daemon.
//!
//! Every lifecycle operation is a subcommand; receipts print as JSON. An
//! HTTP front end in production calls the same service methods.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gatepass_core::{AdminContext, RequestId};
use gatepass_daemon::config::DaemonConfig;
use gatepass_daemon::notify::LogNotifier;
use gatepass_daemon::otp::RandomOtpSource;
use gatepass_daemon::services::{LifecycleOptions, LifecycleService, StatusService};
use gatepass_daemon::store::RequestStore;
use gatepass_daemon::{db, services::LifecycleError};

#[derive(Parser)]
#[command(name = "gatepass", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new guest access request
    Submit {
        /// Device identifier (e.g., "alice-laptop")
        #[arg(long)]
        device_label: String,

        /// Guest contact address for the passcode
        #[arg(long)]
        contact: String,
    },

    /// Approve a pending request and issue its passcode
    Approve { id: i64 },

    /// Deny a pending request
    Deny { id: i64 },

    /// Redeem a passcode and set the network credential
    SetCredential {
        #[arg(long)]
        contact: String,

        /// The six-digit passcode the guest received
        #[arg(long)]
        otp: String,

        #[arg(long)]
        credential: String,
    },

    /// Show a request's lifecycle state
    Status { id: i64 },

    /// List every request (privileged)
    List {
        #[arg(long)]
        admin_secret: String,

        /// Include stored passcode and credential values
        #[arg(long)]
        show_secrets: bool,
    },

    /// Remove a request in any state (privileged)
    Remove {
        id: i64,

        #[arg(long)]
        admin_secret: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig::from_env()?;

    let pool = db::open(&config.db_path).await?;
    let store = RequestStore::new(pool);

    let lifecycle = LifecycleService::new(
        store.clone(),
        Arc::new(RandomOtpSource),
        Arc::new(LogNotifier),
        LifecycleOptions {
            base_url: config.base_url.clone(),
            otp_validity: config.otp_validity,
            hash_secrets: config.hash_secrets,
            admin_secret: config.admin_secret.clone(),
        },
    );
    let status = StatusService::new(store, config.admin_secret.clone());

    match cli.command {
        Commands::Submit {
            device_label,
            contact,
        } => {
            let receipt = lifecycle.submit(&device_label, &contact).await?;
            print_json(&receipt)?;
        }
        Commands::Approve { id } => {
            let receipt = lifecycle.approve(RequestId::new(id)).await?;
            print_json(&receipt)?;
        }
        Commands::Deny { id } => {
            let receipt = lifecycle.deny(RequestId::new(id)).await?;
            print_json(&receipt)?;
        }
        Commands::SetCredential {
            contact,
            otp,
            credential,
        } => {
            let receipt = lifecycle.set_credential(&contact, &otp, &credential).await?;
            print_json(&receipt)?;
            if !receipt.success {
                std::process::exit(1);
            }
        }
        Commands::Status { id } => match status.status(RequestId::new(id)).await? {
            Some(view) => print_json(&view)?,
            None => anyhow::bail!("request {} not found", id),
        },
        Commands::List {
            admin_secret,
            show_secrets,
        } => {
            let ctx = AdminContext::presenting(admin_secret);
            let views = status.list(&ctx).await?;
            if show_secrets {
                print_json(&views)?;
            } else {
                let redacted: Vec<_> = views.into_iter().map(|v| v.redacted()).collect();
                print_json(&redacted)?;
            }
        }
        Commands::Remove { id, admin_secret } => {
            let ctx = AdminContext::presenting(admin_secret);
            match lifecycle.remove(&ctx, RequestId::new(id)).await {
                Ok(true) => println!("removed request {}", id),
                Ok(false) => println!("request {} not found", id),
                Err(LifecycleError::Unauthorized(reason)) => {
                    anyhow::bail!("unauthorized: {}", reason)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
