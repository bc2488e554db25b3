use anyhow::Result;
use gemini_bridge::Bridge;

use crate::settings::BridgeArgs;

pub fn run(args: &BridgeArgs, question: &str, model: Option<&str>) -> Result<()> {
    let config = args.resolve()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let bridge = Bridge::new(config)?;
        let result = bridge.ask(question, model).await;
        bridge.shutdown().await;

        let answer = result?;
        if let Some(status) = &answer.status {
            eprintln!(
                "warning: upstream reported {} ({}): {}",
                status.http_status, status.code, status.message
            );
        }
        println!("{}", answer.text);
        Ok(())
    })
}
