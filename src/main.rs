//! agent-terminal - PTY sessions and state detection for agent CLIs.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_terminal::classifier::StateClassifier;
use agent_terminal::config::{AppConfig, ConfigError, ConfigLoader};
use agent_terminal::display;
use agent_terminal::preflight::{
    AuthPreflight, CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
use agent_terminal::provider::{resolve_binary, ProviderCatalog, ProviderId};
use agent_terminal::terminal::{
    CreateRequest, HostEnvironment, LifecycleEvent, LifecycleSupervisor, SessionCommand,
    SessionEvent, SessionRegistry, SurfaceId, SurfaceRouter, TerminalError, TerminalSize,
};

/// Surface that owns sessions started from the command line.
const CLI_SURFACE: &str = "cli";

/// Exit status used when a session is interrupted with Ctrl-C.
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(
    name = "agent-terminal",
    about = "Run agent CLIs in pseudo-terminals and infer their state",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported providers and where their binaries are.
    Providers,
    /// Check whether a provider is ready to start.
    Check {
        /// Provider id (claude, codex).
        provider: ProviderId,
    },
    /// Classify terminal output read from a file or stdin.
    Classify {
        /// Provider whose patterns to apply.
        provider: ProviderId,
        /// Read output from this file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Run a shell, provider or command in a pseudo-terminal.
    Run {
        /// Start this provider's CLI after a readiness check.
        #[arg(short, long)]
        provider: Option<ProviderId>,
        /// Terminal width.
        #[arg(long, default_value_t = 0)]
        cols: u16,
        /// Terminal height.
        #[arg(long, default_value_t = 0)]
        rows: u16,
        /// Command and arguments. Defaults to the configured shell.
        #[arg(last = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error("{binary} not found; install with `{install}`")]
    BinaryNotFound {
        binary: &'static str,
        install: &'static str,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Shared services built from configuration.
struct App {
    config: AppConfig,
    host: HostEnvironment,
    catalog: Arc<ProviderCatalog>,
}

impl App {
    fn load(path: Option<PathBuf>) -> Result<Self, CliError> {
        let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
        let config = loader.load()?;
        let catalog = Arc::new(ProviderCatalog::with_overrides(&config.providers));
        Ok(Self {
            config,
            host: HostEnvironment::capture(),
            catalog,
        })
    }

    fn preflight(&self) -> Result<AuthPreflight, CliError> {
        let credentials: Arc<dyn CredentialStore> = match self
            .config
            .preflight
            .credentials_file
            .clone()
            .or_else(FileCredentialStore::default_path)
        {
            Some(path) => Arc::new(FileCredentialStore::load(path)?),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Ok(AuthPreflight::new(Arc::clone(&self.catalog), credentials, self.host.clone())
            .with_timeout(self.config.preflight.timeout()))
    }
}

fn list_providers(app: &App) -> ExitCode {
    for provider in app.catalog.iter() {
        let binary = resolve_binary(provider, &app.host);
        display::print_provider(provider, binary.as_deref(), app.host.home());
    }
    ExitCode::SUCCESS
}

async fn check(app: &App, id: ProviderId) -> Result<ExitCode, CliError> {
    let readiness = app.preflight()?.check(id).await;
    display::print_readiness(app.catalog.get(id), &readiness);
    Ok(if readiness.ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn classify(app: &App, id: ProviderId, file: Option<PathBuf>) -> Result<ExitCode, CliError> {
    let text = match file {
        Some(path) => String::from_utf8_lossy(&std::fs::read(path)?).into_owned(),
        None => std::io::read_to_string(std::io::stdin())?,
    };
    let classifier = StateClassifier::new(Arc::clone(&app.catalog));
    display::print_classification(&classifier.classify_detailed(id, &text));
    Ok(ExitCode::SUCCESS)
}

async fn run(
    app: &App,
    provider: Option<ProviderId>,
    cols: u16,
    rows: u16,
    command: Vec<String>,
) -> Result<ExitCode, CliError> {
    let surface = SurfaceId::from(CLI_SURFACE);
    let mut request = CreateRequest::new(surface.clone()).size(cols, rows);

    if let Some(id) = provider {
        let preflight = app.preflight()?;
        let readiness = preflight.check(id).await;
        let config = app.catalog.get(id);
        if !readiness.ready {
            display::print_readiness(config, &readiness);
            return Ok(ExitCode::FAILURE);
        }
        let binary = resolve_binary(config, &app.host).ok_or(CliError::BinaryNotFound {
            binary: config.binary_name,
            install: config.install_command,
        })?;
        request = request
            .provider(id)
            .env(preflight.provider_env(id))
            .command(SessionCommand::new(binary.to_string_lossy()).args(command));
    } else if let Some((program, args)) = command.split_first() {
        request = request.command(SessionCommand::new(program.as_str()).args(args));
    }

    let router = Arc::new(SurfaceRouter::new());
    let mut events = router.register(surface.clone());
    let registry = SessionRegistry::new(app.config.terminal.clone(), app.host.clone(), router);
    let id = registry.create(request).await?;

    if let Some(info) = registry.list().into_iter().find(|s| s.id == id) {
        let size = TerminalSize {
            cols: info.cols,
            rows: info.rows,
        };
        display::print_session_start(&id, size);
    }

    let (lifecycle_tx, lifecycle_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let supervisor = LifecycleSupervisor::new(registry.clone()).spawn(lifecycle_rx, cancel.clone());

    // Stdin is read on a plain thread so a pending read never holds up exit.
    {
        let registry = registry.clone();
        let id = id.clone();
        std::thread::Builder::new()
            .name("stdin-forward".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    registry.send_line(&id, &line);
                }
            })?;
    }

    let mut stdout = std::io::stdout();
    let code = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Data { data, .. }) => {
                    stdout.write_all(data.as_bytes())?;
                    stdout.flush()?;
                }
                Some(SessionEvent::Exit { session_id, exit_code }) => {
                    display::print_session_exit(&session_id, exit_code);
                    break u8::try_from(exit_code).unwrap_or(1);
                }
                None => break 1,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(session_id = %id, "Interrupted");
                let _ = lifecycle_tx.send(LifecycleEvent::AppQuitting).await;
                break INTERRUPTED_EXIT;
            }
        }
    };

    cancel.cancel();
    if let Err(e) = supervisor.await {
        tracing::warn!(error = %e, "Lifecycle supervisor task failed");
    }
    Ok(ExitCode::from(code))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app = match App::load(cli.config) {
        Ok(app) => app,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Providers => Ok(list_providers(&app)),
        Commands::Check { provider } => check(&app, provider).await,
        Commands::Classify { provider, file } => classify(&app, provider, file),
        Commands::Run {
            provider,
            cols,
            rows,
            command,
        } => run(&app, provider, cols, rows, command).await,
    };

    result.unwrap_or_else(|e| {
        display::print_error(&e.to_string());
        ExitCode::FAILURE
    })
}
