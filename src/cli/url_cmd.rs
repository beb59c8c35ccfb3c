use clap::{Args, ValueEnum};

use viewhost::bridge::{ContextInjector, Placement};
use viewhost::logger::init_tracing;

use super::{CliContext, ViewArgs};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PlacementArg {
    RightPane,
    ModalDialog,
}

impl From<PlacementArg> for Placement {
    fn from(arg: PlacementArg) -> Placement {
        match arg {
            PlacementArg::RightPane => Placement::RightPane,
            PlacementArg::ModalDialog => Placement::ModalDialog,
        }
    }
}

#[derive(Args, Debug)]
pub struct UrlArgs {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Page to load instead of the main one; relative to the plugin URL
    #[arg(long)]
    pub target: Option<String>,

    /// Surface the page is shown in
    #[arg(long, value_enum)]
    pub placement: Option<PlacementArg>,
}

pub async fn execute(args: UrlArgs, context: &CliContext) -> anyhow::Result<()> {
    init_tracing(args.view.log_level.as_deref().unwrap_or("warn"), None)?;
    let host = context.host_config(&args.view).await?;
    let target = match &args.target {
        Some(target) => host.view.plugin_url.join(target)?,
        None => host.view.plugin_url.clone(),
    };
    let injector = ContextInjector::new(host.view.context());
    println!("{}", injector.load_url(&target, args.placement.map(Placement::from)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use viewhost::config::{ConfigManager, MapConfigManager};

    fn args(view: ViewArgs) -> UrlArgs {
        UrlArgs { view, target: Some("pane".into()), placement: Some(PlacementArg::RightPane) }
    }

    #[tokio::test]
    async fn logger_comes_before_config() {
        let context = CliContext::new(ConfigManager(MapConfigManager::new()));
        let view = ViewArgs { log_level: Some("viewhost=loud".into()), ..ViewArgs::default() };

        let err = execute(args(view), &context).await.unwrap_err();
        assert!(!err.to_string().contains("is not set"), "{err}");
    }

    #[tokio::test]
    async fn prints_with_overrides_only() {
        let context = CliContext::new(ConfigManager(MapConfigManager::new()));
        let view = ViewArgs {
            server: Some(Url::parse("http://localhost:9000").unwrap()),
            api_token: Some("tok".into()),
            document_set_id: Some(1),
            view_id: Some(2),
            plugin_url: Some(Url::parse("http://plugin.test/show").unwrap()),
            log_level: Some("warn".into()),
        };
        execute(args(view), &context).await.unwrap();
    }
}
