//! docs-mcp-bridge: stdio MCP bridge to a hosted documentation service
//!
//! Run without a command (or with `serve`) from an MCP client configuration.
//! The other commands manage the stored session and default workspace from
//! a terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use docs_mcp_bridge::auth::device::{copy_to_clipboard, open_browser};
use docs_mcp_bridge::auth::{AuthApi, DeviceFlow, TokenResolver, TokenStrategy};
use docs_mcp_bridge::backend::BackendClient;
use docs_mcp_bridge::config::{self, Config, Environment};
use docs_mcp_bridge::mcp::{Dispatcher, McpServer};
use docs_mcp_bridge::store::{ConfigStore, CredentialStore};
use docs_mcp_bridge::workspace::WorkspaceResolver;

/// MCP stdio bridge to a hosted documentation service.
///
/// Forwards MCP tool calls to the documentation API, attaching the signed-in
/// session token and the selected workspace.
#[derive(Parser, Debug)]
#[command(name = "docs-mcp-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Serve MCP over stdin/stdout (the default)
    Serve,
    /// Sign in through the browser and store the session
    Login {
        /// Print the link without trying to open a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Delete the stored session
    Logout,
    /// Show where the token and workspace would come from
    Status,
    /// Show or change the default workspace
    Workspace {
        /// Alias to make the default
        alias: Option<String>,
        /// Clear the default instead
        #[arg(long, conflicts_with = "alias")]
        clear: bool,
    },
}

/// Determines the log level from CLI arguments.
///
/// `configured_level` is the environment value if set, else the config file.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, configured_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match configured_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// stdout carries protocol messages, so logs always go to stderr.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything the commands need, resolved once at startup.
struct Context {
    env: Environment,
    http: reqwest::Client,
    api_base_url: String,
    frontend_url: Option<String>,
    config_path: PathBuf,
    credentials_path: PathBuf,
}

impl Context {
    fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.credentials_path)
    }

    fn config_store(&self) -> ConfigStore {
        ConfigStore::new(&self.config_path)
    }

    fn auth_api(&self) -> AuthApi {
        AuthApi::new(self.http.clone(), &self.api_base_url)
    }

    fn token_resolver(&self) -> TokenResolver {
        TokenResolver::new(
            TokenStrategy::chain(&self.env),
            self.credential_store(),
            self.auth_api(),
        )
    }

    fn workspace_resolver(&self) -> WorkspaceResolver {
        let cwd = std::env::current_dir().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cannot read working directory, project binding disabled");
            PathBuf::new()
        });
        WorkspaceResolver::new(self.config_store(), cwd)
    }
}

fn build_context(args: &Args, cfg: &Config, env: Environment) -> Result<Context, String> {
    let config_path = args
        .config
        .clone()
        .or_else(config::default_config_path)
        .ok_or("Could not determine the home directory")?;
    let credentials_path =
        config::default_credentials_path().ok_or("Could not determine the home directory")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

    Ok(Context {
        api_base_url: cfg.resolved_api_base_url(env.api_url.as_deref()),
        frontend_url: cfg.frontend_url.clone(),
        env,
        http,
        config_path,
        credentials_path,
    })
}

async fn serve(ctx: &Context) -> ExitCode {
    let dispatcher = Dispatcher::new(
        ctx.token_resolver(),
        ctx.workspace_resolver(),
        BackendClient::new(ctx.http.clone(), &ctx.api_base_url),
    );
    let server = McpServer::new(dispatcher);

    info!(api_base_url = %ctx.api_base_url, "MCP bridge ready, waiting for client messages...");

    match server.run().await {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

async fn login(ctx: &Context, no_browser: bool) -> ExitCode {
    let flow = DeviceFlow::new(ctx.auth_api(), ctx.credential_store());

    let authorization = match flow.start().await {
        Ok(authorization) => authorization,
        Err(e) => {
            eprintln!("Could not start sign-in: {e}");
            return ExitCode::FAILURE;
        }
    };

    let url = authorization.display_url(ctx.frontend_url.as_deref());
    eprintln!("To sign in, open this link and approve the request:");
    eprintln!();
    eprintln!("    {url}");
    eprintln!();
    eprintln!("Confirmation code: {}", authorization.user_code);
    if !no_browser && open_browser(&url) {
        eprintln!("Opened the link in your browser.");
    }
    if copy_to_clipboard(&authorization.user_code) {
        eprintln!("The code has been copied to the clipboard.");
    }
    eprintln!("Waiting for approval...");

    tokio::select! {
        result = flow.wait(&authorization) => match result {
            Ok(credentials) => {
                eprintln!(
                    "Signed in as {}.",
                    credentials.user_email().unwrap_or("unknown user")
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Sign-in failed: {e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Sign-in cancelled.");
            ExitCode::FAILURE
        }
    }
}

fn logout(ctx: &Context) -> ExitCode {
    match ctx.credential_store().clear() {
        Ok(true) => {
            eprintln!("Signed out.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("No stored session.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to delete credentials: {e}");
            ExitCode::FAILURE
        }
    }
}

fn status(ctx: &Context) -> ExitCode {
    let auth = ctx.token_resolver().status();
    let workspace = ctx.workspace_resolver();
    let resolved = workspace.resolve(None);
    let binding = workspace.project_binding();

    let report = json!({
        "apiBaseUrl": ctx.api_base_url,
        "auth": auth,
        "workspace": {
            "alias": resolved.as_ref().map(|r| r.alias.as_str()),
            "source": resolved.as_ref().map(|r| r.source),
            "projectFile": binding.map(|b| b.path.display().to_string()),
        },
        "credentialsFile": ctx.credentials_path.display().to_string(),
        "configFile": ctx.config_path.display().to_string(),
    });

    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render status: {e}");
            ExitCode::FAILURE
        }
    }
}

fn workspace(ctx: &Context, alias: Option<&str>, clear: bool) -> ExitCode {
    let resolver = ctx.workspace_resolver();

    if alias.is_none() && !clear {
        match resolver.global_default() {
            Some(alias) => println!("{alias}"),
            None => eprintln!("No default workspace set."),
        }
        return ExitCode::SUCCESS;
    }

    if let Err(e) = resolver.set_global_default(alias) {
        eprintln!("Failed to save default workspace: {e}");
        return ExitCode::FAILURE;
    }

    match alias {
        Some(alias) => eprintln!("Default workspace set to '{alias}'."),
        None => eprintln!("Default workspace cleared."),
    }
    if let Some(binding) = resolver.project_binding() {
        eprintln!(
            "Note: {} pins workspace '{}' inside this project.",
            binding.path.display(),
            binding.alias
        );
    }
    ExitCode::SUCCESS
}

/// Entry point for the docs-mcp-bridge binary.
fn main() -> ExitCode {
    let args = Args::parse();
    let env = Environment::from_process();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig file: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let configured_level = env.log_level.clone().unwrap_or_else(|| cfg.logging.level.clone());
    let log_level = get_log_level(args.verbose, args.quiet, &configured_level);
    init_tracing(log_level);

    let ctx = match build_context(&args, &cfg, env) {
        Ok(ctx) => ctx,
        Err(message) => {
            error!("{message}");
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting docs-mcp-bridge");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime.block_on(serve(&ctx)),
        Command::Login { no_browser } => runtime.block_on(login(&ctx, no_browser)),
        Command::Logout => logout(&ctx),
        Command::Status => status(&ctx),
        Command::Workspace { alias, clear } => {
            workspace(&ctx, if clear { None } else { alias.as_deref() }, clear)
        }
    }
}
