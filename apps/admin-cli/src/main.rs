use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use auth_cell::AuthService;
use schedule_cell::ScheduleService;
use shared_config::AppConfig;
use shared_http::{ApiClient, FileSessionStore, Session};

#[derive(Parser)]
#[command(name = "clinic-admin")]
#[command(about = "Clinic administration client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        /// Account email
        email: String,
        /// Account password
        #[arg(long)]
        password: String,
    },
    /// Sign out and drop stored credentials
    Logout,
    /// Show the stored session
    Whoami {
        /// Ask the backend instead of reading the stored token
        #[arg(long)]
        verify: bool,
    },
    /// Show a doctor's weekly schedule
    Schedules {
        /// Doctor identifier
        doctor_id: String,
        /// Print the week as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check an HH:MM time, optionally against another
    CheckTime {
        /// Time to check
        time: String,
        /// Time to compare with
        #[arg(long)]
        against: Option<String>,
    },
    /// Validate a weekly schedule file and submit it
    SubmitWeek {
        /// Doctor identifier
        doctor_id: String,
        /// JSON file with the seven days
        file: PathBuf,
    },
}

/// Whether a dropped session should prompt the user to log in again. Not
/// while logging in or out, where it is expected.
fn prompts_relogin(command: &Commands) -> bool {
    !matches!(command, Commands::Login { .. } | Commands::Logout)
}

fn open_session(config: &AppConfig) -> Result<Session> {
    match &config.session_file {
        Some(path) => {
            let store = FileSessionStore::open(path)
                .with_context(|| format!("opening session file {}", path.display()))?;
            Ok(Session::new(Arc::new(store)))
        }
        None => {
            warn!("SESSION_FILE not set, the session will not outlive this command");
            Ok(Session::in_memory())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,clinic_admin=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env();
    info!("Using API at {}", config.api_base_url);

    let session = open_session(&config)?;
    let prompt = prompts_relogin(&cli.command);
    let client = ApiClient::builder(&config, session)
        .on_auth_failure(move |reason| {
            if prompt {
                eprintln!("Session ended ({}). Run `clinic-admin login` again.", reason);
            }
        })
        .build()?;
    let client = Arc::new(client);

    let auth = AuthService::new(client.clone());
    let schedules = ScheduleService::new(client);

    match cli.command {
        Commands::Login { email, password } => commands::login(&auth, &email, &password).await,
        Commands::Logout => {
            auth.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Commands::Whoami { verify } => commands::whoami(&auth, verify).await,
        Commands::Schedules { doctor_id, json } => commands::show_week(&schedules, &doctor_id, json).await,
        Commands::CheckTime { time, against } => commands::check_time(&time, against.as_deref()),
        Commands::SubmitWeek { doctor_id, file } => commands::submit_week(&schedules, &doctor_id, &file).await,
    }
}
