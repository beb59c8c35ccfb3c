use clap::Args;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::signal;
use tracing::{debug, info, warn};

use view_plugin::message::SurfaceKind;
use view_plugin::FramePort;
use viewhost::bridge::Services;
use viewhost::logger::init_tracing;
use viewhost::view::{ChannelLoader, LoaderEvent, ViewHost};

use super::{CliContext, ViewArgs};

#[derive(Args, Debug)]
pub struct BridgeArgs {
    #[command(flatten)]
    pub view: ViewArgs,
}

/// One JSON message per stdin line goes to the host as if the main frame had
/// posted it. Stdout gets one JSON object per line: frame loads and unloads,
/// and every message the host delivers to the main frame.
pub async fn execute(args: BridgeArgs, context: &CliContext) -> anyhow::Result<()> {
    let host = context.host_config(&args.view).await?;
    init_tracing(&host.log_level, host.log_dir.as_deref())?;
    info!(plugin = %host.view.plugin_url, view = host.view.view_id, "bridge starting");

    let services = Services::http(&host.view);
    let (loader, mut events) = ChannelLoader::new();
    let handle = ViewHost::spawn(host.view.clone(), services, loader);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut main: Option<FramePort> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(LoaderEvent::Loaded(surface, port)) => {
                    emit(&mut stdout, json!({ "event": "loaded", "surface": surface })).await?;
                    if surface.kind == SurfaceKind::Main {
                        main = Some(port);
                    }
                }
                Some(LoaderEvent::Unloaded(surface)) => {
                    emit(&mut stdout, json!({ "event": "unloaded", "surface": surface })).await?;
                }
                None => break,
            },
            message = recv_main(&mut main) => match message {
                Some(payload) => emit(&mut stdout, json!({ "event": "message", "payload": payload })).await?,
                None => main = None,
            },
            line = stdin.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match &main {
                    Some(port) => port.post_raw(line)?,
                    None => warn!("main frame is not loaded; dropping input"),
                },
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
            _ = signal::ctrl_c() => break,
        }
    }

    if let Err(err) = handle.shutdown().await {
        debug!("{err}");
    }
    info!("bridge stopped");
    Ok(())
}

async fn recv_main(port: &mut Option<FramePort>) -> Option<Value> {
    match port {
        Some(port) => port.recv().await,
        None => std::future::pending().await,
    }
}

async fn emit(stdout: &mut Stdout, value: Value) -> anyhow::Result<()> {
    stdout.write_all(format!("{value}\n").as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
