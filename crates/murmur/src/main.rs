use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info, warn};
use tokio::net::TcpListener;

use murmur::api::{AppState, create_router};
use murmur::auth::AuthState;
use murmur::bot::{HttpMarketData, MarketData};
use murmur::config::{
    APP_NAME, AppConfig, default_config_dir, default_data_dir, expand_str_path,
    write_default_config,
};
use murmur::db::Database;
use murmur::history::{MessageLog, SqliteMessageLog};
use murmur::user::{UserRepository, validate_username};
use murmur::ws::Hub;

/// How long shutdown waits for sessions to say goodbye.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

#[tokio::main]
async fn async_token(ctx: RuntimeContext, cmd: TokenCommand) -> Result<()> {
    handle_token(&ctx, cmd).await
}

#[tokio::main]
async fn async_users(ctx: RuntimeContext, cmd: UsersCommand) -> Result<()> {
    handle_users(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        return handle_completions(shell);
    }
    if let Command::Config {
        command: ConfigCommand::Init { force },
    } = cli.command
    {
        let paths = AppPaths::discover(cli.common.config.clone())?;
        return handle_config_init(&paths, force);
    }

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Token { command } => async_token(ctx, command),
        Command::Users { command } => async_users(ctx, command),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { .. } => Ok(()),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Murmur - real-time messaging relay.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the relay server
    Serve(ServeCommand),
    /// Issue bearer tokens
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Manage the user directory
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum TokenCommand {
    /// Issue a token for a user
    Issue {
        /// User identity
        user: String,
        /// Issue even if the user is not in the directory
        #[arg(long)]
        allow_unknown: bool,
    },
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    /// Add a user
    Add {
        user: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Delete a user and purge their messages
    Delete { user: String },
    /// List users
    List,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration (secrets redacted)
    Show,
    /// Print the resolved config file path
    Path,
    /// Write a default configuration file with a fresh signing secret
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = load_or_init_config(&paths)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("murmur={level},tower_http={level}")));

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_ansi(!disable_color))
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    /// CLI flags win; otherwise `logging.level` from the config.
    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    async fn open_database(&self) -> Result<Database> {
        let path = self
            .config
            .storage
            .resolve_database_path(&self.paths.data_dir)?;
        debug!("Opening database {}", path.display());
        Database::new(&path).await
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = match path.to_str() {
                    Some(text) => expand_str_path(text)?,
                    None => path,
                };
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        Ok(Self {
            config_file,
            data_dir: default_data_dir()?,
        })
    }
}

fn load_or_init_config(paths: &AppPaths) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        write_default_config(&paths.config_file)?;
        eprintln!(
            "Created default config with a new signing secret at {}",
            paths.config_file.display()
        );
    }

    AppConfig::load(&paths.config_file)
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let db = ctx.open_database().await?;
    let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::new(&db));

    let market: Option<Arc<dyn MarketData>> = if config.bot.enabled {
        info!("Bot enabled, market data at {}", config.bot.market_data_url);
        let client = HttpMarketData::new(&config.bot.market_data_url, config.bot.timeout())
            .context("creating market data client")?;
        Some(Arc::new(client))
    } else {
        info!("Bot disabled");
        None
    };

    let state = AppState::new(&config, log, market).context("invalid auth configuration")?;
    let hub = state.hub.clone();
    let app = create_router(state);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "binding to {}:{}",
                config.server.host, config.server.port
            )
        })?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, after closing every live session.
async fn shutdown_signal(hub: Arc<Hub>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, closing connections...");
    let closed = hub.close_all();
    if closed > 0 {
        info!("Closing {} live connection(s)", closed);
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while hub.total_connections() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

async fn handle_token(ctx: &RuntimeContext, cmd: TokenCommand) -> Result<()> {
    match cmd {
        TokenCommand::Issue {
            user,
            allow_unknown,
        } => {
            validate_username(&user)?;
            let auth = AuthState::new(ctx.config.auth.clone()).context("invalid auth configuration")?;

            if !allow_unknown {
                let db = ctx.open_database().await?;
                let users = UserRepository::new(db.pool().clone());
                if users.find_user_by_identity(&user).await?.is_none() {
                    bail!(
                        "User '{user}' not found. Add it with `{APP_NAME} users add {user}` or pass --allow-unknown."
                    );
                }
            }

            let issued = auth.issue_token(&user)?;
            info!(
                "Issued token {} for {} (expires {})",
                issued.token_id, user, issued.expires_at
            );
            println!("{}", issued.token);
            Ok(())
        }
    }
}

async fn handle_users(ctx: &RuntimeContext, cmd: UsersCommand) -> Result<()> {
    let db = ctx.open_database().await?;
    let users = UserRepository::new(db.pool().clone());

    match cmd {
        UsersCommand::Add { user, email } => {
            let created = users.create_user(&user, email.as_deref()).await?;
            println!("Created user {}", created.username);
        }
        UsersCommand::Delete { user } => {
            let log = SqliteMessageLog::new(&db);
            let existed = users.delete_user(&user).await?;
            let purged = log.delete_user_messages(&user).await?;
            if !existed && purged == 0 {
                bail!("User '{user}' not found.");
            }
            println!("Deleted user {user} and {purged} message(s)");
        }
        UsersCommand::List => {
            for user in users.list_users().await? {
                match user.email {
                    Some(email) => println!("{}\t{}", user.username, email),
                    None => println!("{}", user.username),
                }
            }
        }
    }
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut config = ctx.config.clone();
            if config.auth.jwt_secret.is_some() {
                config.auth.jwt_secret = Some("<redacted>".to_string());
            }
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Init { force } => handle_config_init(&ctx.paths, force),
    }
}

fn handle_config_init(paths: &AppPaths, force: bool) -> Result<()> {
    if paths.config_file.exists() && !force {
        bail!(
            "config file already exists at {} (use --force to overwrite)",
            paths.config_file.display()
        );
    }
    if force && paths.config_file.exists() {
        fs::remove_file(&paths.config_file).with_context(|| {
            format!("removing existing config {}", paths.config_file.display())
        })?;
    }
    write_default_config(&paths.config_file)?;
    println!("Wrote {}", paths.config_file.display());
    Ok(())
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
