//! Taskdeck
//!
//! Runs the task API server, or acts as a command-line client of one.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskdeck::api::{AppState, start_server};
use taskdeck::cli::tasks::ListArgs;
use taskdeck::cli::{Cli, Command, SESSION_FILE, ServeArgs};
use taskdeck::client::{
    ApiClient, AuthService, RemoteTaskService, SessionCookies, TaskFilter, TaskSession,
};
use taskdeck::config::{Config, ConfigLoader};
use taskdeck::db::Database;
use taskdeck::format::{OutputFormat, format_page, format_task, format_user};
use taskdeck::logging::{self, LogTarget};
use taskdeck::types::{TaskPatch, TaskStatus};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut loader = ConfigLoader::load(cli.config.as_deref())?;
    if let Some(path) = loader.config_path() {
        debug!(path = %path.display(), "Using config file");
    }
    let session_path = loader
        .paths
        .user_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(".taskdeck"))
        .join(SESSION_FILE);

    // CLI flags override every config tier
    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.clone();
    }
    if let Some(url) = &cli.api_url {
        config.client.base_url = url.clone();
    }
    let config = loader.into_config();

    match cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    {
        Command::Serve(args) => run_server(config, args).await,
        command => run_client(config, &session_path, command, cli.format).await,
    }
}

async fn run_server(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if config.auth.uses_dev_secrets() {
        warn!(
            "Using built-in development token secrets; set TASKDECK_ACCESS_SECRET and \
             TASKDECK_REFRESH_SECRET before exposing this server"
        );
    }

    config.ensure_db_dir()?;
    let db = Arc::new(
        Database::open(&config.server.db_path).with_context(|| {
            format!("Failed to open database {}", config.server.db_path.display())
        })?,
    );
    info!(path = %config.server.db_path.display(), "Database ready");

    let state = AppState::from_config(&config, db);
    let handle = start_server(state, &config.bind_addr(), &config.server.cors_origin).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt");
    handle.shutdown().await;
    Ok(())
}

/// Run one client command, persisting session cookies afterwards.
async fn run_client(
    config: Config,
    session_path: &Path,
    command: Command,
    format: OutputFormat,
) -> Result<()> {
    let cookies = SessionCookies::load(session_path)?;
    let api = Arc::new(ApiClient::new(&config.client.base_url)?.with_cookies(cookies));
    debug!(base_url = %api.base_url(), "Using API server");

    let result = run_command(&config, &api, command, format).await;

    // Tokens may have rotated even when the command itself failed.
    api.cookies().save(session_path)?;
    result
}

async fn run_command(
    config: &Config,
    api: &Arc<ApiClient>,
    command: Command,
    format: OutputFormat,
) -> Result<()> {
    let default_filter = TaskFilter::with_limit(config.client.default_limit);
    let remote: Arc<dyn RemoteTaskService> = Arc::clone(api) as Arc<dyn RemoteTaskService>;
    let session = || TaskSession::new(Arc::clone(&remote), default_filter.clone());

    match command {
        Command::Serve(_) => bail!("serve is not a client command"),
        Command::Register(args) => {
            let user = api.register(&args.name, &args.email, &args.password).await?;
            println!("{}", format_user(&user, format));
        }
        Command::Login(args) => {
            let user = api.login(&args.email, &args.password).await?;
            println!("{}", format_user(&user, format));
        }
        Command::Logout => {
            api.logout().await?;
            println!("Logged out.");
        }
        Command::Whoami => {
            let user = api.me().await?;
            println!("{}", format_user(&user, format));
        }
        Command::List(args) => list(api, &args, config.client.default_limit, format).await?,
        Command::Add { title } => {
            let task = session().create_task(&title.join(" ")).await?;
            println!("{}", format_task(&task, format));
        }
        Command::Edit(args) => {
            let task = session().update_task(args.id, args.to_patch()).await?;
            println!("{}", format_task(&task, format));
        }
        Command::Done { id } => {
            let task = session()
                .update_task(id, TaskPatch::status(TaskStatus::Done))
                .await?;
            println!("{}", format_task(&task, format));
        }
        Command::Toggle { id } => {
            let task = session().toggle_task(id).await?;
            println!("{}", format_task(&task, format));
        }
        Command::Rm { id } => {
            session().delete_task(id).await?;
            println!("Deleted task #{}.", id);
        }
    }
    Ok(())
}

async fn list(
    api: &Arc<ApiClient>,
    args: &ListArgs,
    default_limit: u32,
    format: OutputFormat,
) -> Result<()> {
    let remote: Arc<dyn RemoteTaskService> = Arc::clone(api) as Arc<dyn RemoteTaskService>;
    let session = TaskSession::new(remote, args.to_filter(default_limit));
    let page = session.load().await?;
    print!("{}", format_page(&page, format));
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}
