mod render;

use chrono::Utc;
use clap::{Parser, Subcommand};
use render::render_state;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trial_match_core::{
    ClientConfig, HttpTrialMatcher, SearchContext, SearchController, SearchPhase, SearchState,
    SubmitError, DEFAULT_BASE_URL,
};

#[derive(Parser)]
#[command(name = "trial-match", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Matching service base URL
    #[arg(long, env = "TRIAL_MATCH_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Request timeout in seconds (0 waits indefinitely)
    #[arg(long, env = "TRIAL_MATCH_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Clinician on whose behalf searches are made
    #[arg(long, env = "TRIAL_MATCH_CLINICIAN_ID")]
    clinician_id: Option<String>,

    /// Restrict trial sites to this radius around the patient
    #[arg(long, env = "TRIAL_MATCH_SEARCH_RADIUS_KM")]
    search_radius_km: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Find candidate trials for one patient.
    Search {
        /// Patient identifier
        #[arg(long)]
        patient_id: String,
        /// Print the final search state as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Read patient identifiers from stdin, one search per line.
    Interactive {
        /// Print each final search state as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check that the matching service is reachable.
    Health,
}

impl Cli {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        let config = ClientConfig::new(&self.api_url, timeout)?.with_context(SearchContext {
            requesting_clinician_id: self.clinician_id.clone(),
            search_radius_km: self.search_radius_km,
        });
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    let matcher = HttpTrialMatcher::new(&config)?;

    info!(
        version = app_version,
        api_url = %config.base_url(),
        timeout_secs = cli.timeout_secs,
        started_at = %Utc::now().to_rfc3339(),
        "trial-match boot"
    );

    match cli.command {
        Command::Search { patient_id, json } => {
            let controller = SearchController::new(matcher);
            let phase = controller.submit(&patient_id).await?;

            print_state(&controller.state(), json)?;
            if phase == SearchPhase::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Interactive { json } => {
            let controller = SearchController::new(matcher);
            run_interactive(&controller, json).await?;
        }
        Command::Health => match matcher.health().await {
            Ok(health) if health.is_ok() => println!("ok: {}", config.base_url()),
            Ok(health) => {
                println!("unhealthy: status={}", health.status);
                return Ok(ExitCode::FAILURE);
            }
            Err(error) => {
                println!("unreachable: {error}");
                return Ok(ExitCode::FAILURE);
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_interactive(
    controller: &SearchController<HttpTrialMatcher>,
    json: bool,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("patient id> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        tokio::select! {
            result = controller.submit(&line) => match result {
                Ok(_) => print_state(&controller.state(), json)?,
                Err(SubmitError::Busy) => println!("a search is already running"),
                Err(SubmitError::Cancelled) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("search interrupted");
                println!("search interrupted");
            }
        }
    }

    controller.shutdown();
    println!();
    Ok(())
}

fn print_state(state: &SearchState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        print!("{}", render_state(state));
    }
    Ok(())
}
