//! `vcassist ask`: one question, one answer.

use vcassist_core::message::Conversation;

use crate::runtime::{Options, Runtime};

pub async fn run(options: Options, message: &str) -> anyhow::Result<()> {
    let runtime = Runtime::build(options).await?;
    let assistant = runtime.assistant()?;

    eprint!("  Thinking...");
    let answer = assistant.respond(&Conversation::new(), message).await;
    eprint!("\r              \r");
    println!("{answer}");
    Ok(())
}
