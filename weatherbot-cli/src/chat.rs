use anyhow::{Context, Result};
use std::{io::Write, sync::Arc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use weatherbot_core::{
    Agent, AgentEvent, Config, GeminiModel, InMemorySessionService,
    session::{APP_NAME, DEFAULT_USER_ID},
};

pub const EXIT_COMMAND: &str = "exit";

/// Run the interactive chat on stdin/stdout until `exit` or end of input.
pub async fn run(config: &Config) -> Result<()> {
    let model = GeminiModel::from_config(config)?;
    let agent = Agent::weatherbot(config, Arc::new(model))?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    ChatConsole::new(&agent).run(stdin, &mut stdout).await
}

pub struct ChatConsole<'a> {
    agent: &'a Agent,
    sessions: InMemorySessionService,
}

impl<'a> ChatConsole<'a> {
    pub fn new(agent: &'a Agent) -> Self {
        Self { agent, sessions: InMemorySessionService::new() }
    }

    /// Failed turns are reported and the loop goes on; only I/O errors end it early.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let key = self.sessions.create_session(APP_NAME, DEFAULT_USER_ID);
        tracing::debug!(
            session = %key.id,
            agent = self.agent.name(),
            description = self.agent.description(),
            model = self.agent.model_name(),
            "Chat started"
        );
        writeln!(out, "{} is ready! Type '{EXIT_COMMAND}' to quit.", self.agent.name())?;

        let mut lines = input.lines();
        loop {
            write!(out, "\nYou: ")?;
            out.flush()?;

            let Some(line) = lines.next_line().await.context("Failed to read input")? else {
                writeln!(out)?;
                break;
            };

            let line = line.trim();
            if line.eq_ignore_ascii_case(EXIT_COMMAND) {
                break;
            }
            if line.is_empty() {
                continue;
            }

            let session = self.sessions.get_mut(&key).context("Chat session is gone")?;
            let (tx, mut rx) = mpsc::unbounded_channel();

            let turn = self.agent.run_turn(session, line, tx);
            let render = async {
                while let Some(event) = rx.recv().await {
                    render_event(out, &event)?;
                }
                Ok::<_, std::io::Error>(())
            };
            let (turn, rendered) = tokio::join!(turn, render);
            rendered?;

            match turn {
                Ok(()) => writeln!(out)?,
                Err(err) => writeln!(out, "\nError: {err}")?,
            }
        }

        Ok(())
    }
}

fn render_event<W: Write>(out: &mut W, event: &AgentEvent) -> std::io::Result<()> {
    match event {
        AgentEvent::TextChunk(text) => {
            write!(out, "{text}")?;
            out.flush()
        }
        AgentEvent::ToolCall { name, args } => {
            writeln!(out, "  [System: Calling {name} with {args}...]")
        }
        AgentEvent::ToolResult { name, .. } => {
            writeln!(out, "  [System: Tool {name} returned data.]")
        }
    }
}
