//! `vcassist call`: invoke one tool through the dispatch layer, no model
//! involved.

use anyhow::Context;
use vcassist_core::tool::ToolCall;

use crate::runtime::{Options, Runtime};

pub async fn run(options: Options, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).with_context(|| format!("--args is not valid JSON: {args}"))?;

    let runtime = Runtime::build(options).await?;
    let call = ToolCall {
        id: "cli".into(),
        name: tool.to_string(),
        arguments,
    };

    let result = runtime.tools.invoke(&call).await.with_context(|| {
        format!("available tools: {}", runtime.tools.names().join(", "))
    })?;

    println!("{}", result.output);
    if !result.is_success() {
        eprintln!("  (tool reported an error)");
    }
    Ok(())
}
