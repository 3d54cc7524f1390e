mod hands;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use gui_pilot::error::FatalError;
use gui_pilot::events::{self, AgentEvent};
use gui_pilot::{Agent, AgentConfig, AnthropicClient, InputSurface, Resolution, TaskOutcome};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SurfaceKind {
    Browser,
    Desktop,
}

#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(about = "Let a model drive a browser or the desktop to complete a task")]
#[command(version)]
struct Cli {
    /// What the model acts on
    #[arg(long, value_enum, default_value = "browser")]
    surface: SurfaceKind,

    /// Page to open before the task starts (browser only)
    #[arg(long, value_name = "URL")]
    start_url: Option<String>,

    /// Launch Chrome without a window (ignored when attaching)
    #[arg(long)]
    headless: bool,

    /// Action budget per task
    #[arg(long)]
    max_steps: Option<usize>,

    /// History size the conversation is pruned to
    #[arg(long)]
    max_turns: Option<usize>,

    /// Display width; with --height, overrides the detected size
    #[arg(long, requires = "height")]
    width: Option<u32>,

    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Task to run. Without it, tasks are read from stdin, one per line.
    task: Option<String>,
}

fn initialize_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [format!("gui_pilot={}", level), format!("agent={}", level)] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

async fn print_events(mut rx: broadcast::Receiver<AgentEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => eprintln!("[Agent] {}", line),
                Err(e) => warn!("Unprintable event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {} progress events", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn open_surface(cli: &Cli, config: &AgentConfig) -> Result<Box<dyn InputSurface>> {
    match cli.surface {
        SurfaceKind::Browser => {
            hands::open_browser(hands::BrowserOptions {
                headless: cli.headless,
                start_url: cli.start_url.clone(),
                window: config.display_override,
            })
            .await
        }
        SurfaceKind::Desktop => hands::open_desktop(config.display_override).await,
    }
}

async fn run_task(
    agent: &Agent<AnthropicClient>,
    cli: &Cli,
    task: &str,
    cancel: &CancellationToken,
) -> Result<TaskOutcome> {
    let outcome = match open_surface(cli, agent.config()).await {
        Ok(surface) => agent.run(task, surface, cancel).await,
        Err(e) => {
            error!("Could not open the {:?} surface: {:#}", cli.surface, e);
            TaskOutcome::Failed {
                error: FatalError::SurfaceUnavailable {
                    message: format!("{:#}", e),
                },
                steps: 0,
            }
        }
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(cli.verbose);

    let mut config = AgentConfig::from_env()?;
    if let Some(n) = cli.max_steps {
        config.max_steps = n;
    }
    if let Some(n) = cli.max_turns {
        config.max_turns = n;
    }
    if let (Some(w), Some(h)) = (cli.width, cli.height) {
        config.display_override = Some(Resolution::new(w, h));
    }

    let model = AnthropicClient::new(config.model.clone())?;
    let (event_tx, event_rx) = events::channel(64);
    tokio::spawn(print_events(event_rx));
    let agent = Agent::new(model, config).with_events(event_tx);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    if let Some(task) = cli.task.clone() {
        let outcome = run_task(&agent, &cli, &task, &cancel).await?;
        if !outcome.is_completed() {
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Reading tasks from stdin, one per line");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if cancel.is_cancelled() {
            break;
        }
        let task = line.trim();
        if task.is_empty() {
            continue;
        }
        run_task(&agent, &cli, task, &cancel).await?;
    }

    Ok(())
}
