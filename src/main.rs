use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use colloquy_core::config::AppConfig;
use colloquy_core::error::{ColloquyError, Disposition};
use colloquy_core::event::{EventBus, WorkflowEvent};
use colloquy_core::state::StageId;
use colloquy_core::traits::{LlmClient, SessionStore};
use colloquy_core::types::{SessionId, SourceConfig};

use colloquy_llm::LlmGenerator;
use colloquy_store::SqliteSessionStore;
use colloquy_tools::ToolRegistry;
use colloquy_workflow::{review_prompt, review_summary, WorkflowEngine};

#[derive(Parser)]
#[command(name = "colloquy", version, about = "Human-reviewed research interviews and reports")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "colloquy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// Research topic
    #[arg(short, long)]
    topic: String,
    /// Maximum number of analysts to generate (default: research.max_analysts)
    #[arg(short = 'n', long)]
    max_analysts: Option<usize>,
    /// Comma-separated sources to enable (default: those enabled in config)
    #[arg(long, value_delimiter = ',')]
    sources: Option<Vec<String>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a research session and review each stage interactively
    Run(SessionArgs),
    /// Start a research session and stop at the first review
    Start(SessionArgs),
    /// Continue a stored session
    Resume {
        /// Session ID
        session: String,
        /// Feedback for the stage under review (omit to continue)
        #[arg(long, short)]
        feedback: Option<String>,
        /// Keep reviewing interactively after this step
        #[arg(long, short)]
        interactive: bool,
    },
    /// Show what a session is waiting on
    Inspect {
        /// Session ID
        session: String,
        /// Print the full session state as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored sessions
    Sessions,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("colloquy=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = load_config(&cli.config)?;

    if let Commands::Config = command {
        let mut shown = config.clone();
        if shown.model.api_key.is_some() {
            shown.model.api_key = Some("********".into());
        }
        if let Some(ws) = shown.web_search.as_mut() {
            ws.api_key = "********".into();
        }
        println!("{}", toml::to_string_pretty(&shown)?);
        return Ok(());
    }

    let workspace = config.workspace_dir();
    std::fs::create_dir_all(&workspace)?;
    let db_path = workspace.join("sessions.db");
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(&db_path)?);
    info!(path = %db_path.display(), "Session store opened");

    if let Commands::Sessions = command {
        return list_sessions(store.as_ref()).await;
    }

    let llm: Arc<dyn LlmClient> = Arc::from(colloquy_llm::build_client(&config.model));
    let generator = Arc::new(LlmGenerator::new(llm, config.model.clone()));
    let tools = ToolRegistry::from_config(&config);
    info!(tools = ?tools.list(), "Research tools registered");

    let event_bus = Arc::new(EventBus::default());
    spawn_progress(&event_bus);

    let engine = WorkflowEngine::new(generator, tools)?
        .with_store(store)
        .with_event_bus(event_bus)
        .with_stage_timeout(Duration::from_secs(config.research.stage_timeout_secs));

    let outcome = match command {
        Commands::Run(args) => match start(&engine, &config, args).await {
            Ok(sid) => review_loop(&engine, &sid).await,
            Err(e) => Err(e),
        },
        Commands::Start(args) => match start(&engine, &config, args).await {
            Ok(sid) => show(&engine, &sid).await,
            Err(e) => Err(e),
        },
        Commands::Resume {
            session,
            feedback,
            interactive,
        } => {
            let sid = SessionId::from_str(&session);
            match engine.resume(&sid, feedback).await {
                Ok(_) if interactive => review_loop(&engine, &sid).await,
                Ok(_) => show(&engine, &sid).await,
                Err(e) => Err(e),
            }
        }
        Commands::Inspect { session, json } => {
            let sid = SessionId::from_str(&session);
            if json {
                match engine.inspect(&sid).await {
                    Ok(state) => {
                        println!("{}", serde_json::to_string_pretty(&state)?);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            } else {
                show(&engine, &sid).await
            }
        }
        Commands::Sessions | Commands::Config => Ok(()),
    };

    if let Err(e) = outcome {
        report_error(&e);
        std::process::exit(1);
    }
    Ok(())
}

/// Config file given on the command line, then ~/.colloquy/config.toml,
/// then the environment.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home) = AppConfig::home_config_path() {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }
    warn!("No config file found, reading OPENAI_API_KEY and TAVILY_API_KEY from the environment");
    eprintln!("See colloquy.toml.example for reference.");
    Ok(AppConfig::from_env()?)
}

/// The configured sources, with only `requested` enabled when given.
/// Requested names missing from the config are added so the engine can
/// reject them by name.
fn select_sources(configured: &[SourceConfig], requested: Option<Vec<String>>) -> Vec<SourceConfig> {
    let Some(requested) = requested else {
        return configured.to_vec();
    };
    let mut sources: Vec<SourceConfig> = configured
        .iter()
        .map(|s| SourceConfig {
            enabled: requested.iter().any(|r| r == &s.name),
            ..s.clone()
        })
        .collect();
    for name in requested {
        if !sources.iter().any(|s| s.name == name) {
            sources.push(SourceConfig::new(name, "", true));
        }
    }
    sources
}

async fn start(
    engine: &WorkflowEngine,
    config: &AppConfig,
    args: SessionArgs,
) -> Result<SessionId, ColloquyError> {
    let max = args.max_analysts.unwrap_or(config.research.max_analysts);
    let sources = select_sources(&config.sources, args.sources);

    let handle = engine.start(&args.topic, max, sources).await?;
    println!("Session: {} (at {})", handle.session_id, handle.suspended_at);
    Ok(handle.session_id)
}

/// Print the output under review and what the session is waiting for.
async fn show(engine: &WorkflowEngine, sid: &SessionId) -> Result<(), ColloquyError> {
    let state = engine.inspect(sid).await?;
    println!("\n{}", review_summary(&state).trim_end());
    match review_prompt(state.position) {
        Some(prompt) => {
            println!("\n[{}] {}", state.position, prompt);
            println!(
                "Continue with `colloquy resume {}` or add --feedback \"...\".",
                sid
            );
        }
        None if state.is_terminal() => println!("\nSession complete."),
        None => println!("\nSession is at {}.", state.position),
    }
    Ok(())
}

/// Review each gate in turn: an empty line continues, any other text is
/// sent back as feedback, `/quit` leaves the session stored for later.
async fn review_loop(engine: &WorkflowEngine, sid: &SessionId) -> Result<(), ColloquyError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut fresh = true;

    loop {
        let state = engine.inspect(sid).await?;
        if fresh {
            println!("\n{}", review_summary(&state).trim_end());
        }
        if state.is_terminal() {
            println!("\nSession complete.");
            return Ok(());
        }
        let Some(prompt) = review_prompt(state.position) else {
            return Ok(());
        };

        println!("\n{}", prompt);
        print!("feedback (enter to continue, /quit to stop)> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!();
            return Ok(());
        }
        let input = input.trim();
        if matches!(input, "/quit" | "/exit" | "/q") {
            println!("Session saved. Resume with: colloquy resume {} -i", sid);
            return Ok(());
        }

        let feedback = (!input.is_empty()).then(|| input.to_string());
        match engine.resume(sid, feedback).await {
            Ok(_) => fresh = true,
            Err(e) if e.is_recoverable() => {
                report_error(&e);
                fresh = false;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn list_sessions(store: &dyn SessionStore) -> anyhow::Result<()> {
    let sessions = store.list().await?;
    if sessions.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {:<18} {}  {}",
            s.session_id,
            s.position,
            s.updated_at.format("%Y-%m-%d %H:%M"),
            s.topic
        );
    }
    Ok(())
}

fn spawn_progress(event_bus: &Arc<EventBus>) {
    let rx = event_bus.subscribe();
    tokio::spawn(drain_progress(rx, |line| eprintln!("{}", line)));
}

/// Print progress until the bus closes. A lagging receiver skips what it
/// missed and keeps going.
async fn drain_progress(mut rx: broadcast::Receiver<WorkflowEvent>, mut out: impl FnMut(String)) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = progress_line(&event) {
                    out(line);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress display fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn progress_line(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::StageStarted { stage, feedback, .. } => {
            let verb = match stage {
                StageId::GenerateAnalysts => "Generating analysts",
                StageId::PlanResearch => "Planning research questions",
                StageId::ConductInterviews => "Conducting interviews",
                StageId::GenerateReport => "Writing the report",
            };
            Some(if feedback.is_some() {
                format!("{} (with feedback)...", verb)
            } else {
                format!("{}...", verb)
            })
        }
        WorkflowEvent::StageCommitted { elapsed_ms, .. } => {
            Some(format!("  done in {:.1}s", *elapsed_ms as f64 / 1000.0))
        }
        WorkflowEvent::StageFailed { stage, .. } => Some(format!("  {} failed", stage)),
        _ => None,
    }
}

fn report_error(e: &ColloquyError) {
    match e.disposition() {
        Disposition::Recoverable => {
            eprintln!("Error: {}", e);
            eprintln!("The session is unchanged; resume to try again.");
        }
        Disposition::Fatal => eprintln!("Fatal: {}", e),
    }
}
