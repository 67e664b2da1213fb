mod admin;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use twiga_config::{AppConfig, ConfigLoader};
use twiga_db::TwigaStore;

#[derive(Parser)]
#[command(
    name = "twiga",
    version,
    about = "Twiga - WhatsApp teaching assistant for teachers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Start {
        /// Host to bind to (overrides gateway.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides gateway.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Query a running server's status
    Status,

    /// Create the config directory and a starter config.yml
    Init,

    /// Manage classes
    Class {
        #[command(subcommand)]
        action: ClassCommands,
    },

    /// Manage curriculum resources
    Resource {
        #[command(subcommand)]
        action: ResourceCommands,
    },

    /// Inspect and moderate users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage searchable content chunks
    Chunks {
        #[command(subcommand)]
        action: ChunkCommands,
    },
}

#[derive(Subcommand)]
enum ClassCommands {
    /// Create a class (e.g. `class add geography os2`)
    Add { subject: String, grade: String },
    /// List all classes
    List,
}

#[derive(Subcommand)]
enum ResourceCommands {
    /// Create a resource and link it to a class
    Add {
        name: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        grade: String,
        #[arg(long, default_value = "textbook")]
        resource_type: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Show a user by WhatsApp id
    Show { wa_id: String },
    /// Force a user's state (e.g. `blocked`, `active`)
    SetState { wa_id: String, state: String },
}

#[derive(Subcommand)]
enum ChunkCommands {
    /// Import chunks from a JSON Lines file, embedding those without a vector
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    ConfigLoader::load_dotenv();
    let config_loader = ConfigLoader::new()?;
    let config = config_loader.load()?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    logging::init_tracing(&level);

    match cli.command {
        Commands::Start { host, port } => {
            config_loader.ensure_dirs()?;
            let mut config = config;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let server = twiga_gateway::GatewayServer::new(config);
            server.run().await?;
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            let mut request = client.get(format!(
                "http://{}:{}/api/status",
                config.gateway.host, config.gateway.port
            ));
            if let Some(api_key) = &config.gateway.api_key {
                request = request.bearer_auth(api_key);
            }

            let resp = request.send().await.map_err(|_| {
                anyhow::anyhow!(
                    "Twiga is not running at {}:{}",
                    config.gateway.host,
                    config.gateway.port
                )
            })?;

            if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                anyhow::bail!("Unauthorized. Please check gateway.api_key in config.yml.");
            }

            let body = resp.json::<serde_json::Value>().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Init => {
            config_loader.ensure_dirs()?;
            let path = config_loader.config_dir().join("config.yml");
            if config_loader.config_file_exists() {
                println!("Config already exists in {}", config_loader.config_dir().display());
            } else {
                std::fs::write(&path, serde_yaml::to_string(&AppConfig::default())?)?;
                println!("Wrote starter config to {}", path.display());
            }
            println!("Fill in the whatsapp and llm sections, then run `twiga start`.");
        }
        Commands::Class { action } => {
            let store = open_store(&config)?;
            match action {
                ClassCommands::Add { subject, grade } => {
                    let class = admin::add_class(&store, &subject, &grade).await?;
                    println!("{}", admin::format_class(&class));
                }
                ClassCommands::List => {
                    let classes = store.list_classes().await?;
                    if classes.is_empty() {
                        println!("  (no classes - add one with `twiga class add`)");
                    }
                    for class in &classes {
                        println!("{}", admin::format_class(class));
                    }
                }
            }
        }
        Commands::Resource { action } => {
            let store = open_store(&config)?;
            match action {
                ResourceCommands::Add {
                    name,
                    subject,
                    grade,
                    resource_type,
                } => {
                    let resource =
                        admin::add_resource(&store, &name, &resource_type, &subject, &grade)
                            .await?;
                    println!("created resource {} ({})", resource.id, resource.name);
                }
            }
        }
        Commands::User { action } => {
            let store = open_store(&config)?;
            match action {
                UserCommands::Show { wa_id } => {
                    let user = admin::find_user(&store, &wa_id).await?;
                    println!("{}", admin::format_user(&user));
                }
                UserCommands::SetState { wa_id, state } => {
                    let user = admin::set_user_state(&store, &wa_id, &state).await?;
                    info!("user {} set to {}", user.wa_id, user.state);
                    println!("{}: {}", user.wa_id, user.state);
                }
            }
        }
        Commands::Chunks { action } => {
            let store = open_store(&config)?;
            match action {
                ChunkCommands::Import { path } => {
                    let embedder = twiga_gateway::bootstrap::build_embedder(&config)?;
                    let stored = admin::import_chunks_file(&store, &embedder, &path).await?;
                    println!("imported {stored} chunks from {}", path.display());
                }
            }
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<TwigaStore> {
    let path = config.database_path();
    ensure_parent(&path)?;
    Ok(TwigaStore::open(&path)?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
