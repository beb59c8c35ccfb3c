use clap::Parser;
use tracing::error;

use viewhost::config::{ConfigManager, EnvConfigManager};

mod cli;

use cli::{Cli, CliContext};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_manager = ConfigManager(EnvConfigManager::new(cli.env_file.clone()));
    let context = CliContext::new(config_manager);

    let result = cli::execute(&context, cli.command).await;
    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}
