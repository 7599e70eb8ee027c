//! Conjur CLI - log in to a Conjur server and manage the stored credentials
//!
//! This binary can:
//! - Log in with a password and store the returned API key
//! - Log out, erasing the stored credentials
//! - Rotate API keys and change the user password
//! - Print a session token for scripting

mod prompt;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use conjur_core::auth::{self, CredentialStore};
use conjur_core::client::token_authorization_header;
use conjur_core::flows::{LoginFlow, LogoutFlow, PasswordFlow, RotateFlow, WhoamiFlow};
use conjur_core::{HttpAuthClient, LoadedConfig, RoleId, StoreKind, TrustOptions, TrustResolver, config};
use prompt::ConsolePrompter;
use secrecy::{ExposeSecret, SecretString};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "conjur")]
#[command(author = "Conjur CLI Maintainers")]
#[command(version)]
#[command(about = "Command-line client for Conjur secrets management")]
#[command(long_about = "
The Conjur CLI logs in to a Conjur server, keeps your API key in the
platform keystore (or a credentials file) and manages its lifecycle.

Quick start:
  1. Configure:       ~/.config/conjur/config.toml (see: conjur config)
  2. Log in:          conjur login -i alice
  3. Check identity:  conjur whoami
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Skip server certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Accept a self-signed server certificate
    #[arg(long, global = true)]
    pub self_signed: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the API key
    Login {
        /// Login name (prompted if omitted)
        #[arg(short, long)]
        id: Option<String>,

        /// Password or API key (prompted if omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Erase the stored credentials
    Logout,

    /// Show the logged in identity
    Whoami,

    /// Print a short-lived session token
    Authenticate {
        /// Print as an HTTP Authorization header
        #[arg(short = 'H', long)]
        header: bool,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Manage hosts
    #[command(subcommand)]
    Host(HostCommands),

    /// Show configuration paths and settings
    Config,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Rotate the API key of a user (yourself if omitted)
    RotateApiKey(TargetArgs),

    /// Change your own password
    ChangePassword {
        /// New password (prompted if omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum HostCommands {
    /// Rotate the API key of a host
    RotateApiKey {
        /// Host id
        #[arg(short, long)]
        id: String,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Role id, e.g. "alice" or "user:alice"
    #[arg(short, long)]
    id: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("conjur={},conjur_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Login { id, password } => cmd_login(&cli, id.clone(), password.clone()),
        Commands::Logout => cmd_logout(&cli),
        Commands::Whoami => cmd_whoami(&cli),
        Commands::Authenticate { header } => cmd_authenticate(&cli, *header),
        Commands::User(UserCommands::RotateApiKey(target)) => {
            cmd_rotate(&cli, target.id.as_deref().map(RoleId::parse))
        }
        Commands::User(UserCommands::ChangePassword { password }) => {
            cmd_change_password(&cli, password.clone())
        }
        Commands::Host(HostCommands::RotateApiKey { id }) => {
            cmd_rotate(&cli, Some(RoleId::host(id)))
        }
        Commands::Config => cmd_config(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Everything a command needs, built once per invocation.
struct Invocation {
    loaded: LoadedConfig,
    store: Box<dyn CredentialStore>,
    resolver: TrustResolver,
    trust: TrustOptions,
}

impl Invocation {
    fn open(cli: &Cli) -> Result<Self> {
        let loaded = config::load_config()?;
        if loaded.store.kind == StoreKind::Keyring {
            install_keyring_backend()?;
        }
        let store = auth::build_store(&loaded.store)?;
        tracing::debug!(
            "Server {} (from {}), credentials in {}",
            loaded.connection.base_url(),
            loaded.source,
            store.store_location()
        );
        Ok(Self {
            loaded,
            store,
            resolver: TrustResolver::new(),
            trust: TrustOptions {
                self_signed: cli.self_signed,
                insecure: cli.insecure,
            },
        })
    }

    fn client(&self) -> Result<HttpAuthClient> {
        let trust = self.trust.resolve(&self.resolver, &self.loaded.connection)?;
        Ok(HttpAuthClient::new(self.loaded.connection.clone(), trust))
    }

    /// Client carrying the stored credentials, for calls that need a
    /// session token.
    fn authenticated_client(&self) -> Result<HttpAuthClient> {
        let identity = WhoamiFlow::new(&self.loaded.connection, self.store.as_ref()).whoami()?;
        let record = self
            .store
            .load(&identity.machine)
            .context("Failed to load credentials")?;
        Ok(self.client()?.with_credentials(record))
    }
}

#[cfg(feature = "keyring-storage")]
fn install_keyring_backend() -> Result<()> {
    conjur_core::auth::store::KeyringBackend::select()?.install()?;
    Ok(())
}

#[cfg(not(feature = "keyring-storage"))]
fn install_keyring_backend() -> Result<()> {
    Ok(())
}

fn cmd_login(cli: &Cli, id: Option<String>, password: Option<String>) -> Result<()> {
    let ctx = Invocation::open(cli)?;
    let client = ctx.client()?;
    let flow = LoginFlow::new(
        &ctx.loaded.connection,
        ctx.trust,
        &ctx.resolver,
        ctx.store.as_ref(),
        &client,
        &ConsolePrompter,
    );
    let record = flow.login(id, password.map(SecretString::from))?;

    match cli.format {
        OutputFormat::Text => println!("Successfully logged in to Conjur as '{}'", record.login),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "logged_in",
                "login": record.login,
                "machine": record.machine,
                "storage": ctx.store.store_location(),
            }));
        }
    }
    Ok(())
}

fn cmd_logout(cli: &Cli) -> Result<()> {
    let ctx = Invocation::open(cli)?;
    LogoutFlow::new(&ctx.loaded.connection, ctx.store.as_ref()).remove_credentials()?;

    match cli.format {
        OutputFormat::Text => println!("Successfully logged out from Conjur"),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "logged_out",
                "machine": ctx.loaded.connection.machine(),
            }));
        }
    }
    Ok(())
}

fn cmd_whoami(cli: &Cli) -> Result<()> {
    let ctx = Invocation::open(cli)?;
    let identity = WhoamiFlow::new(&ctx.loaded.connection, ctx.store.as_ref()).whoami()?;

    match cli.format {
        OutputFormat::Text => {
            println!("Login:   {}", identity.login);
            println!("Account: {}", identity.account);
            println!("Server:  {}", identity.machine);
            println!("Storage: {}", identity.store_location);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&identity)?),
    }
    Ok(())
}

fn cmd_authenticate(cli: &Cli, header: bool) -> Result<()> {
    let ctx = Invocation::open(cli)?;
    let token = ctx.authenticated_client()?.access_token()?;

    match cli.format {
        OutputFormat::Text if header => {
            println!("Authorization: {}", token_authorization_header(&token))
        }
        OutputFormat::Text => println!("{}", token),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "token": token,
                "authorization": token_authorization_header(&token),
            }));
        }
    }
    Ok(())
}

fn cmd_rotate(cli: &Cli, target: Option<RoleId>) -> Result<()> {
    let ctx = Invocation::open(cli)?;
    let client = ctx.authenticated_client()?;
    let rotation = RotateFlow::new(&ctx.loaded.connection, ctx.store.as_ref(), &client)
        .rotate(target.as_ref())?;

    match cli.format {
        OutputFormat::Text => {
            println!("Successfully rotated API key for '{}'", rotation.identity);
            println!("New API key: {}", rotation.api_key.expose_secret());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "identity": rotation.identity,
                "api_key": rotation.api_key.expose_secret(),
                "stored_locally": rotation.self_rotation,
            }));
        }
    }
    Ok(())
}

fn cmd_change_password(cli: &Cli, password: Option<String>) -> Result<()> {
    let ctx = Invocation::open(cli)?;
    let client = ctx.client()?;
    let login = PasswordFlow::new(
        &ctx.loaded.connection,
        ctx.store.as_ref(),
        &client,
        &ConsolePrompter,
    )
    .change_password(None, password.map(SecretString::from))?;

    match cli.format {
        OutputFormat::Text => println!("Successfully changed password for '{}'", login),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "password_changed",
                "login": login,
            }));
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let config_path = config::get_config_file_path_string();
    let loaded = config::load_config();
    let storage = loaded
        .as_ref()
        .ok()
        .and_then(|l| auth::build_store(&l.store).ok())
        .map(|s| s.store_location());

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            match &loaded {
                Ok(l) => {
                    let c = &l.connection;
                    println!("Server URL:       {} (from {})", c.base_url(), l.source);
                    println!("Account:          {}", c.account);
                    println!(
                        "CA certificate:   {}",
                        c.cert_file
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "platform trust store".to_string())
                    );
                    println!("Authenticator:    {}", c.authn_type);
                    println!("Credential store: {} ({})", l.store.kind, storage.unwrap_or_default());
                }
                Err(e) => println!("Not configured:   {}", e),
            }
            println!();
            println!("Environment variables:");
            println!("  CONJUR_APPLIANCE_URL    - Server URL");
            println!("  CONJUR_ACCOUNT          - Account name");
            println!("  CONJUR_CERT_FILE        - CA certificate file");
            println!("  CONJUR_AUTHN_TYPE       - token or ldap");
            println!("  CONJUR_SERVICE_ID       - LDAP authenticator service id");
            println!("  CONJUR_CREDENTIAL_STORE - file or keyring");
            println!("  CONJUR_KEYRING_BACKEND  - secret-service, keyutils, keychain, windows or mock");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => match &loaded {
            Ok(l) => {
                let c = &l.connection;
                println!("{}", serde_json::json!({
                    "config_file": config_path,
                    "url": c.base_url(),
                    "url_source": l.source.to_string(),
                    "account": c.account,
                    "cert_file": c.cert_file,
                    "authn_type": c.authn_type.to_string(),
                    "service_id": c.service_id,
                    "credential_store": l.store.kind.to_string(),
                    "credential_storage": storage,
                }));
            }
            Err(e) => {
                println!("{}", serde_json::json!({
                    "config_file": config_path,
                    "error": e.to_string(),
                }));
            }
        },
    }
    Ok(())
}
