use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use strata_remote::{RepoClient, RepoError};
use strata_snapshot::ZfsStore;
use strata_template::{
    AgentConfig, GpgKeyring, ImportOutcome, ImportRequest, ImportService, LxcRuntime,
    TarGzExtractor, TemplateError,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Strata resource-host agent")]
struct Cli {
    /// Template repository base URL
    #[arg(long, global = true, default_value = "https://cdn.strata-hub.io/rest")]
    repo_url: String,

    /// Mount prefix for template datasets
    #[arg(long, global = true, default_value = "/var/lib/strata")]
    prefix: PathBuf,

    /// ZFS pool backing the snapshot store
    #[arg(long, global = true, default_value = "strata")]
    pool: String,

    /// Install prefix for shipped LXC include files
    #[arg(long, global = true, default_value = "/usr/lib/strata")]
    app_prefix: PathBuf,

    /// Directory for import lock files
    #[arg(long, global = true, default_value = "/var/run/lock")]
    lock_dir: PathBuf,

    /// Trust directory holding owner public keys
    #[arg(long, global = true, default_value = "/var/lib/strata/keys")]
    keys_dir: PathBuf,

    /// GPG home directory
    #[arg(long, global = true, default_value = "/var/lib/strata/gnupg")]
    gpg_home: PathBuf,

    /// Template registry state file
    #[arg(long, global = true, default_value = "/var/lib/strata/registry.json")]
    registry: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a template and deploy it on this host
    Import {
        /// Template selector: `id:<id>`, `owner/name`, or a bare name
        template: String,

        /// Template version to import (latest when omitted)
        #[arg(short = 'v', long)]
        version: Option<String>,

        /// Repository access token for private templates
        #[arg(short, long, default_value = "")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = AgentConfig {
        repo_url: cli.repo_url,
        prefix: cli.prefix,
        pool: cli.pool,
        app_prefix: cli.app_prefix,
        lock_dir: cli.lock_dir,
        keys_dir: cli.keys_dir,
        gpg_home: cli.gpg_home,
        registry_path: cli.registry,
        ..AgentConfig::default()
    };

    match cli.command {
        Commands::Import {
            template,
            version,
            token,
        } => import(config, template, version, token).await,
    }
}

async fn import(
    config: AgentConfig,
    template: String,
    version: Option<String>,
    token: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = match RepoClient::new(config.repo_url.clone()) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!("Repository client unavailable: {}", e);
            None
        }
    };

    let service = ImportService::new(
        config.clone(),
        client,
        Arc::new(ZfsStore::new(config.pool.clone())),
        Arc::new(GpgKeyring::new(config.gpg_home.clone(), config.keys_dir.clone())),
        Arc::new(LxcRuntime::new(config.prefix.clone())),
        Arc::new(TarGzExtractor),
    );

    let mut request = ImportRequest {
        name: template,
        version,
        token,
        accept_unverified: false,
    };

    loop {
        match service.import(request.clone()).await {
            Ok(ImportOutcome::NeedsConfirmation { file, .. }) => {
                if confirm(&format!(
                    "Cannot verify local template {}. Trust anyway? (y/n) ",
                    file
                ))? {
                    request.accept_unverified = true;
                    continue;
                }
                tracing::error!("Local template {} rejected", file);
                std::process::exit(1);
            }
            Ok(ImportOutcome::Deployed { name, id }) => {
                tracing::info!("Template {} ({}) deployed", name, id);
                return Ok(());
            }
            Ok(_) => return Ok(()),
            Err(TemplateError::Repo(RepoError::Ambiguous { name, candidates })) => {
                println!("There are multiple templates named {} in repository", name);
                println!("Please run `strata import id:<id>` with an id from the list:");
                for candidate in candidates {
                    println!("{} (owner: {})", candidate.id, candidate.owner.join(","));
                }
                return Ok(());
            }
            Err(e) => {
                tracing::error!("Import failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn confirm(prompt: &str) -> Result<bool, std::io::Error> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
