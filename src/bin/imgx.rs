//! CLI for imgx - AI image generation and editing.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use imgx::config::{mask_api_key, ConfigKey, ConfigResolver, PROJECT_FILE_NAME};
use imgx::image::ImageFormat;
use imgx::mcp::McpServer;
use imgx::{ImageRequest, InputSource, Orchestrator};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "IMGX_LOG";

#[derive(Parser)]
#[command(name = "imgx")]
#[command(about = "Generate and edit images via AI APIs (Gemini, OpenAI)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a text prompt
    Generate(GenerateArgs),

    /// Edit an existing image with text instructions
    Edit(EditArgs),

    /// List configured providers
    Providers,

    /// Show the capabilities of a provider
    Capabilities {
        /// Provider (default: configured provider, then gemini)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Read and write the user configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Write a .imgxrc template in the current directory
    Init,

    /// Run as MCP server (for AI agent integration)
    Mcp,
}

#[derive(Args)]
struct CommonArgs {
    /// Image description or edit instruction
    #[arg(short, long)]
    prompt: String,

    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,

    /// Aspect ratio (e.g., 16:9, 1:1)
    #[arg(short, long)]
    aspect_ratio: Option<String>,

    /// Resolution: 1K, 2K, 4K
    #[arg(short, long)]
    resolution: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Output format: png, jpeg, webp
    #[arg(short = 'f', long = "format")]
    format: Option<ImageFormat>,

    /// Provider (default: configured provider, then gemini)
    #[arg(long)]
    provider: Option<String>,
}

impl CommonArgs {
    fn into_request(self, count: Option<u32>) -> ImageRequest {
        ImageRequest {
            prompt: self.prompt,
            output: self.output,
            output_dir: self.output_dir,
            aspect_ratio: self.aspect_ratio,
            resolution: self.resolution,
            count,
            model: self.model,
            provider: self.provider,
            output_format: self.format,
        }
    }
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of images to generate
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    count: Option<u32>,
}

#[derive(Args)]
struct EditArgs {
    /// Input image to edit
    #[arg(short, long, required_unless_present = "last", conflicts_with = "last")]
    input: Option<PathBuf>,

    /// Edit the output of the previous generate or edit
    #[arg(long)]
    last: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the config path, stored API keys and defaults
    List,

    /// Set a value (api-key, provider, model, output-dir, aspect-ratio, resolution)
    Set {
        /// Key to set
        key: String,
        /// New value
        value: String,
        /// Provider the API key belongs to
        #[arg(long, default_value = "gemini")]
        provider: String,
    },

    /// Print a value. API keys are masked
    Get {
        /// Key to read
        key: String,
        /// Provider the API key belongs to
        #[arg(long, default_value = "gemini")]
        provider: String,
    },

    /// Print the path of the user config file
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            println!("{}", json!({ "success": false, "error": format!("{e:#}") }));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries JSON results and the MCP stream.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Generate(args) => {
            let orchestrator = Orchestrator::from_env()?;
            let request = args.common.into_request(args.count);
            let outcome = orchestrator.generate(&request).await?;
            success(&outcome)
        }
        Commands::Edit(args) => {
            let orchestrator = Orchestrator::from_env()?;
            let source = match args.input {
                Some(path) => InputSource::Path(path),
                None => InputSource::LastOutput,
            };
            let request = args.common.into_request(None);
            let outcome = orchestrator.edit(&request, source).await?;
            success(&outcome)
        }
        Commands::Providers => list_providers(),
        Commands::Capabilities { provider } => show_capabilities(provider.as_deref()),
        Commands::Config(command) => run_config(command),
        Commands::Init => init_project_file(),
        Commands::Mcp => run_mcp_server().await,
    }
}

/// Prints `{"success":true, ...data}` on one line.
fn success(data: &impl Serialize) -> anyhow::Result<()> {
    let mut body = serde_json::Map::new();
    body.insert("success".into(), Value::Bool(true));
    if let Value::Object(fields) = serde_json::to_value(data)? {
        body.extend(fields);
    }
    println!("{}", Value::Object(body));
    Ok(())
}

fn list_providers() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_env()?;
    let registry = orchestrator.registry();
    if registry.is_empty() {
        anyhow::bail!(
            "No providers configured. Set GEMINI_API_KEY or OPENAI_API_KEY, or run `imgx config set api-key <key> --provider <name>`."
        );
    }

    let providers: Vec<Value> = registry
        .list()
        .iter()
        .map(|p| {
            let info = p.info();
            json!({
                "name": info.name,
                "models": info.models,
                "defaultModel": info.default_model,
                "capabilities": info.capabilities,
            })
        })
        .collect();
    success(&json!({ "providers": providers }))
}

fn show_capabilities(provider: Option<&str>) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_env()?;
    let provider = orchestrator.provider(provider)?;
    let info = provider.info();
    success(&json!({
        "provider": info.name,
        "models": info.models,
        "defaultModel": info.default_model,
        "capabilities": info.capabilities,
        "aspectRatios": info.aspect_ratios,
        "resolutions": info.resolutions.unwrap_or_default(),
    }))
}

fn run_config(command: ConfigCommand) -> anyhow::Result<()> {
    let resolver = ConfigResolver::from_env()?;
    let config_path = resolver.paths().user_file();

    match command {
        ConfigCommand::List => {
            let config = resolver.user_config();
            let keys: serde_json::Map<String, Value> = config
                .providers
                .keys()
                .filter(|name| config.api_key(name).is_some())
                .map(|name| (name.clone(), json!("(set)")))
                .collect();
            let api_keys = if keys.is_empty() {
                json!("(none set)")
            } else {
                Value::Object(keys)
            };
            success(&json!({
                "configPath": config_path,
                "apiKeys": api_keys,
                "defaults": config.defaults,
            }))
        }
        ConfigCommand::Set {
            key,
            value,
            provider,
        } => {
            match key.parse::<ConfigKey>()? {
                ConfigKey::ApiKey => resolver.set_api_key(&provider, &value)?,
                ConfigKey::Default(default) => resolver.set_default(default, &value)?,
            }
            success(&json!({ "key": key, "status": "saved" }))
        }
        ConfigCommand::Get { key, provider } => {
            let config = resolver.user_config();
            match key.parse::<ConfigKey>()? {
                ConfigKey::ApiKey => {
                    let value = config.api_key(&provider).map(mask_api_key);
                    success(&json!({ "key": key, "provider": provider, "value": value }))
                }
                ConfigKey::Default(default) => {
                    let value = config.defaults.get(default);
                    success(&json!({ "key": key, "value": value }))
                }
            }
        }
        ConfigCommand::Path => success(&json!({ "path": config_path })),
    }
}

fn init_project_file() -> anyhow::Result<()> {
    let path = std::env::current_dir()?.join(PROJECT_FILE_NAME);
    if path.exists() {
        anyhow::bail!("{PROJECT_FILE_NAME} already exists in current directory");
    }

    let template = json!({
        "defaults": {
            "model": "gemini-3-pro-image-preview",
            "outputDir": "./generated-images",
            "aspectRatio": "1:1"
        }
    });
    let contents = serde_json::to_string_pretty(&template)? + "\n";
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    success(&json!({ "created": path }))
}

async fn run_mcp_server() -> anyhow::Result<()> {
    tracing::info!("starting MCP server");
    let mut server = McpServer::new(Orchestrator::from_env()?);
    server.run().await?;
    Ok(())
}
