use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

pub mod bridge;
pub mod schema;
pub mod url_cmd;

use bridge::BridgeArgs;
use schema::SchemaArgs;
use url_cmd::UrlArgs;

use viewhost::config::{
    self, ConfigManager, HostConfig, API_TOKEN, DOCUMENT_SET_ID, PLUGIN_URL, SERVER_URL, VIEW_ID,
};

#[derive(Parser, Debug)]
#[command(
    name = "viewhost",
    about = "Host bridge for document-set view plugins",
    version = "0.1.0"
)]
pub struct Cli {
    /// `.env` file loaded before reading `VIEWHOST_*` variables
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the URL a plugin frame is loaded with
    Url(UrlArgs),

    /// Emit JSON‐Schema for the bridge vocabulary
    Schema(SchemaArgs),

    /// Run one view with its main frame on stdin/stdout
    Bridge(BridgeArgs),
}

/// Per-invocation overrides of the `VIEWHOST_*` settings.
#[derive(Args, Debug, Default)]
pub struct ViewArgs {
    /// Document-set server base URL
    #[arg(long)]
    pub server: Option<Url>,

    #[arg(long)]
    pub api_token: Option<String>,

    #[arg(long)]
    pub document_set_id: Option<i64>,

    #[arg(long)]
    pub view_id: Option<i64>,

    /// The plugin's main page
    #[arg(long)]
    pub plugin_url: Option<Url>,

    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ViewArgs {
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(v) = &self.server {
            out.push((SERVER_URL, v.to_string()));
        }
        if let Some(v) = &self.api_token {
            out.push((API_TOKEN, v.clone()));
        }
        if let Some(v) = self.document_set_id {
            out.push((DOCUMENT_SET_ID, v.to_string()));
        }
        if let Some(v) = self.view_id {
            out.push((VIEW_ID, v.to_string()));
        }
        if let Some(v) = &self.plugin_url {
            out.push((PLUGIN_URL, v.to_string()));
        }
        if let Some(v) = &self.log_level {
            out.push((config::LOG_LEVEL, v.clone()));
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct CliContext {
    pub config_manager: ConfigManager,
}

impl CliContext {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    pub async fn host_config(&self, args: &ViewArgs) -> anyhow::Result<HostConfig> {
        let layered = self.config_manager.with_overrides(&args.overrides()).await;
        Ok(HostConfig::from_config(&layered).await?)
    }
}

pub async fn execute(context: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Url(args) => url_cmd::execute(args, context).await,
        Commands::Schema(args) => schema::execute(args).await,
        Commands::Bridge(args) => bridge::execute(args, context).await,
    }
}
