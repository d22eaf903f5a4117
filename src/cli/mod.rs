//! Command-line interface
//!
//! One-shot runner: parse arguments, apply config overrides, run the task,
//! print streaming progress and the final answer.

use clap::Parser;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::agent::{Agent, TurnUpdate};
use crate::core::Config;

/// webswarm - self-cloning web automation agents
#[derive(Parser, Debug)]
#[command(name = "webswarm")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The task to perform
    pub task: String,

    /// Model driving the reason/act loop
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Run the browser without a visible window
    #[arg(long)]
    pub headless: bool,

    /// Group-chat room to coordinate in
    #[arg(long, short = 'r')]
    pub room: Option<String>,

    /// Agent name (generated when omitted)
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Print only the final answer, no streaming progress
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Enable per-action summarization
    #[arg(long)]
    pub summarize: bool,
}

/// Run the CLI with parsed arguments
pub async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load();

    let mut agent = Agent::with_config(&args.task, config);
    if let Some(model) = args.model {
        agent = agent.model(model);
    }
    if args.headless {
        agent = agent.headless(true);
    }
    if let Some(room) = args.room {
        agent = agent.room(room);
    }
    if let Some(name) = args.name {
        agent = agent.name(name);
    }
    agent = agent.summarization(args.summarize);

    let answer = if args.quiet {
        agent.run().await?
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_updates(UnboundedReceiverStream::new(rx)));
        let answer = agent.run_streamed(tx).await?;
        let _ = printer.await;
        answer
    };

    println!("\n=== FINAL ANSWER ===\n{}", answer);
    Ok(())
}

/// Render streaming turn updates to stdout
async fn print_updates(mut updates: UnboundedReceiverStream<TurnUpdate>) {
    while let Some(update) = updates.next().await {
        match update {
            TurnUpdate::Assistant {
                content,
                tool_calls,
            } => {
                if !content.trim().is_empty() {
                    println!("[agent] {}", content.trim());
                }
                for call in tool_calls {
                    println!("[tool]  {}({})", call.name, call.arguments);
                }
            }
            TurnUpdate::ToolResult(outcome) => {
                let mut output = outcome.output.replace('\n', " ");
                if output.chars().count() > 200 {
                    output = output.chars().take(197).collect::<String>() + "...";
                }
                println!("[result] {} -> {}", outcome.tool_name, output);
            }
        }
    }
}
