use std::sync::Arc;

use anyhow::Result;
use gemini_bridge::Bridge;

use crate::settings::BridgeArgs;

pub fn run(args: &BridgeArgs, host: &str, port: u16) -> Result<()> {
    let config = args.resolve()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        // The interactive strategy spawns its session task here.
        let bridge = Arc::new(Bridge::new(config)?);
        let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
        gemini_server::serve_on(listener, bridge).await
    })
}
