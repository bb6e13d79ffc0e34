//! Concord CLI - Command line interface.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use concord_auth::{
    AuthenticationPlugin, Credential, GithubConfiguration, GithubPlugin, LoginFlow,
    OidcConfiguration, OidcPlugin,
};
use concord_claims::{ClaimsPayload, ClaimsProcessor};
use concord_storage::{MembershipRepository, UserId};
use concord_storage_sqlite::SqliteRepository;

use crate::config::ConcordConfig;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "Nubster Concord - Reconcile organization and team memberships from IdP claims")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/concord.toml", env = "CONCORD_CONFIG")]
    config: PathBuf,

    /// Directory holding tenant databases (overrides the config file)
    #[arg(long, env = "CONCORD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Tenant database (overrides the config file)
    #[arg(long, env = "CONCORD_TENANT")]
    tenant: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a claims payload (JSON file) for a user
    Reconcile {
        /// Local user id
        #[arg(long)]
        user: String,
        /// Path to the claims payload
        #[arg(long)]
        claims: PathBuf,
    },
    /// Authenticate with a configured provider and reconcile memberships
    Login {
        #[command(subcommand)]
        provider: LoginCommands,
    },
    /// Show a user's membership grants
    Show {
        /// Local user id
        #[arg(long)]
        user: String,
    },
    /// List the configuration fields of the built-in plugins
    Plugins,
}

#[derive(Subcommand)]
enum LoginCommands {
    /// OIDC ID token
    Oidc {
        /// Signed ID token
        #[arg(long, env = "CONCORD_ID_TOKEN")]
        id_token: String,
    },
    /// GitHub profile document (JSON file)
    Github {
        /// Path to the profile document
        #[arg(long)]
        profile: PathBuf,
    },
}

// ============================================================================
// Helpers
// ============================================================================

async fn open_repository(cli: &Cli, config: &ConcordConfig) -> Result<SqliteRepository> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.database.path.clone());
    let tenant = cli
        .tenant
        .clone()
        .unwrap_or_else(|| config.database.tenant.clone());

    SqliteRepository::open(&data_dir, &tenant)
        .await
        .with_context(|| format!("Failed to open database in {}", data_dir.display()))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_reconcile(repository: SqliteRepository, user: &str, claims: &Path) -> Result<()> {
    let claims: ClaimsPayload = serde_json::from_value(read_json(claims)?)
        .context("Claims file is not a valid claims payload")?;
    let processor = ClaimsProcessor::new(Arc::new(repository.with_actor("cli")));

    let report = processor
        .process_organization_and_team_memberships(&claims, &UserId::new(user))
        .await?;

    println!("Memberships reconciled for {}:", user);
    println!(
        "  Organizations: {} existing, {} created",
        report.organizations_existing, report.organizations_created
    );
    println!(
        "  Teams:         {} existing, {} created",
        report.teams_existing, report.teams_created
    );
    println!("  Grants:        {}", report.grants_applied);

    Ok(())
}

async fn cmd_login(
    repository: SqliteRepository,
    config: &ConcordConfig,
    provider: &LoginCommands,
) -> Result<()> {
    let (plugin, credential): (Arc<dyn AuthenticationPlugin>, Credential) = match provider {
        LoginCommands::Oidc { id_token } => {
            let oidc = config
                .oidc
                .clone()
                .context("No [oidc] section in the configuration file")?;
            let plugin: Arc<dyn AuthenticationPlugin> = Arc::new(OidcPlugin::new(oidc)?);
            (plugin, Credential::IdToken(id_token.clone()))
        },
        LoginCommands::Github { profile } => {
            let github = config
                .github
                .clone()
                .context("No [github] section in the configuration file")?;
            let plugin: Arc<dyn AuthenticationPlugin> = Arc::new(GithubPlugin::new(github));
            (plugin, Credential::Profile(read_json(profile)?))
        },
    };

    let actor = format!("plugin:{}", plugin.plugin_type());
    let flow = LoginFlow::new(
        plugin,
        ClaimsProcessor::new(Arc::new(repository.with_actor(actor))),
    );
    let ctx = flow.login(&credential).await?;

    println!("Logged in as {}", ctx.user_id);
    if let Some(username) = &ctx.username {
        println!("  Username: {}", username);
    }
    if let Some(email) = &ctx.email {
        println!("  Email:    {}", email);
    }

    Ok(())
}

async fn cmd_show(repository: &SqliteRepository, user: &str) -> Result<()> {
    let grants = repository.grants_of(&UserId::new(user)).await?;

    if grants.is_empty() {
        println!("No memberships found for {}", user);
    } else {
        println!("{}", serde_json::to_string_pretty(&grants)?);
    }

    Ok(())
}

fn cmd_plugins() -> Result<()> {
    let plugins = serde_json::json!({
        "open_id_connect": OidcConfiguration::schema(),
        "github": GithubConfiguration::schema(),
    });
    println!("{}", serde_json::to_string_pretty(&plugins)?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConcordConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .context("Invalid log filter")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match &cli.command {
        Commands::Plugins => cmd_plugins(),
        Commands::Reconcile { user, claims } => {
            if user.is_empty() {
                bail!("User id cannot be empty");
            }
            let repository = open_repository(&cli, &config).await?;
            cmd_reconcile(repository, user, claims).await
        },
        Commands::Login { provider } => {
            let repository = open_repository(&cli, &config).await?;
            cmd_login(repository, &config, provider).await
        },
        Commands::Show { user } => {
            let repository = open_repository(&cli, &config).await?;
            cmd_show(&repository, user).await
        },
    }
}
