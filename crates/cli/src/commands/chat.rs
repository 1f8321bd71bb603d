//! `vcassist chat`: interactive conversation.
//!
//! The conversation lives here, in the front end: each exchange is
//! recorded after the assistant answers, and only the configured window of
//! it is sent with the next message.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use vcassist_core::message::Conversation;

use crate::runtime::{Options, Runtime};

pub async fn run(options: Options) -> anyhow::Result<()> {
    let runtime = Runtime::build(options).await?;
    let assistant = runtime.assistant()?;

    println!();
    println!("  vcassist — vCenter operations assistant");
    println!();
    println!("  Provider:  {}", runtime.config.default_provider);
    println!("  Model:     {}", runtime.config.default_model);
    if runtime.simulated {
        println!("  vCenter:   simulated lab (--simulate)");
    } else {
        println!("  vCenter:   {}", runtime.connector.endpoint());
    }
    println!(
        "  Runbooks:  {}",
        runtime.index.as_ref().map_or("not configured", |i| i.name())
    );
    println!("  Tools:     {}", runtime.tools.len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/clear' starts a new conversation, 'exit' quits.");
    println!();

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                conversation.clear();
                println!("  (conversation cleared)");
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let answer = assistant.respond_and_record(&mut conversation, input).await;
        eprint!("\r     \r");

        println!();
        for line in answer.lines() {
            println!("  Assistant > {line}");
        }
        println!();
    }

    println!();
    Ok(())
}
