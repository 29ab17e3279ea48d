mod bot_cmd;
mod config;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use fiesta_core::relay::{
    InMemoryConversationStore, OpenAiAssistant, OpenAiClient, Relay, ToolRegistry,
};
use fiesta_db::config::DbConfig;
use fiesta_db::pool;

use config::FiestaConfig;

/// Connections held by `fiesta serve`; one per in-flight request.
const SERVE_MAX_CONNECTIONS: u32 = 10;

#[derive(Parser)]
#[command(name = "fiesta", about = "Holiday planning backend and Telegram assistant relay")]
struct Cli {
    /// Database URL (overrides FIESTA_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a fiesta config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Telegram bot token
        #[arg(long)]
        bot_token: Option<String>,
        /// OpenAI API key
        #[arg(long)]
        openai_api_key: Option<String>,
        /// Id of an existing OpenAI assistant
        #[arg(long)]
        assistant_id: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides [server] port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the Telegram bot that relays chats to the assistant
    Bot,
    /// Manage the hosted assistant
    Assistant {
        #[command(subcommand)]
        command: AssistantCommands,
    },
}

#[derive(Subcommand)]
enum AssistantCommands {
    /// Create an assistant and print its id
    Create {
        /// Assistant name
        #[arg(long)]
        name: String,
        /// JSON file with an array of tool declarations
        #[arg(long)]
        tools: Option<PathBuf>,
        /// Model (overrides [openai] model)
        #[arg(long)]
        model: Option<String>,
    },
}

/// Execute the `fiesta init` command: write config file.
fn cmd_init(
    db_url: &str,
    bot_token: Option<String>,
    openai_api_key: Option<String>,
    assistant_id: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    cfg.database.url = db_url.to_owned();
    cfg.telegram.bot_token = bot_token;
    cfg.openai.api_key = openai_api_key;
    cfg.openai.assistant_id = assistant_id;

    config::save_config_to(&cfg, &path)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  server = {}:{}", cfg.server.bind, cfg.server.port);
    if let Some(token) = &cfg.telegram.bot_token {
        println!("  telegram.bot_token = {}", config::mask_secret(token));
    }
    if let Some(key) = &cfg.openai.api_key {
        println!("  openai.api_key = {}", config::mask_secret(key));
    }
    if let Some(id) = &cfg.openai.assistant_id {
        println!("  openai.assistant_id = {id}");
    }
    println!();
    println!("Next: run `fiesta db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `fiesta db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &FiestaConfig) -> anyhow::Result<()> {
    println!("Initializing fiesta database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config, 2).await?;
    let result = migrate_and_count(&db_pool).await;
    db_pool.close().await;
    result?;

    println!("fiesta db-init complete.");
    Ok(())
}

async fn migrate_and_count(db_pool: &sqlx::PgPool) -> anyhow::Result<()> {
    pool::run_migrations(db_pool).await?;

    let counts = pool::table_counts(db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }
    Ok(())
}

async fn cmd_bot(resolved: &FiestaConfig) -> anyhow::Result<()> {
    let token = resolved.require_bot_token()?;
    let api_key = resolved.require_openai_api_key()?;
    let assistant_id = resolved.require_assistant_id()?;

    let tools = ToolRegistry::load(&resolved.function_prompts)?;
    let client = OpenAiClient::new(api_key)?;
    let backend = OpenAiAssistant::new(client, assistant_id, tools);
    let relay = Relay::new(
        Arc::new(backend),
        Arc::new(InMemoryConversationStore::default()),
    );

    bot_cmd::run_bot(token, Arc::new(relay)).await
}

fn load_tool_declarations(path: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tool declarations {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} must contain a JSON array of tools", path.display()))
}

async fn cmd_assistant_create(
    resolved: &FiestaConfig,
    name: &str,
    tools: Option<&Path>,
    model: Option<&str>,
) -> anyhow::Result<()> {
    let api_key = resolved.require_openai_api_key()?;
    let tools = match tools {
        Some(path) => load_tool_declarations(path)?,
        None => Vec::new(),
    };
    let model = model.unwrap_or(&resolved.model);

    let client = OpenAiClient::new(api_key)?;
    let id = client.create_assistant(name, model, "", &tools).await?;

    println!("{id}");
    eprintln!("Set ASSISTANT_ID={id} or add it as [openai] assistant_id to use it with `fiesta bot`.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            bot_token,
            openai_api_key,
            assistant_id,
            force,
        } => {
            cmd_init(&db_url, bot_token, openai_api_key, assistant_id, force)?;
        }
        Commands::DbInit => {
            let resolved = FiestaConfig::resolve(cli.database_url.as_deref())?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = FiestaConfig::resolve(cli.database_url.as_deref())?;
            let bind = bind.unwrap_or_else(|| resolved.bind.clone());
            let port = port.unwrap_or(resolved.port);
            let db_pool = pool::create_pool(&resolved.db_config, SERVE_MAX_CONNECTIONS).await?;
            let result = serve_cmd::run_serve(db_pool.clone(), &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Bot => {
            let resolved = FiestaConfig::resolve(cli.database_url.as_deref())?;
            cmd_bot(&resolved).await?;
        }
        Commands::Assistant { command } => {
            let resolved = FiestaConfig::resolve(cli.database_url.as_deref())?;
            match command {
                AssistantCommands::Create { name, tools, model } => {
                    cmd_assistant_create(&resolved, &name, tools.as_deref(), model.as_deref())
                        .await?;
                }
            }
        }
    }

    Ok(())
}
