// Interactive question loop

#[cfg(test)]
mod tests;

use std::io::Write;

use async_trait::async_trait;
use console::style;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::Result;
use crate::agent::Agent;

pub const PROMPT: &str = "Input Question: ";
pub const EXIT_COMMAND: &str = "exit";
pub const CLEAR_COMMAND: &str = "clear";

/// Something that answers questions and can forget what it was told
#[async_trait]
pub trait Conversation: Send {
    async fn respond(&mut self, message: &str) -> Result<String>;

    fn reset(&mut self);
}

#[async_trait]
impl Conversation for Agent {
    #[inline]
    async fn respond(&mut self, message: &str) -> Result<String> {
        Ok(self.chat(message).await?.response)
    }

    #[inline]
    fn reset(&mut self) {
        Agent::reset(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Clear,
    Skip,
    Ask(&'a str),
}

/// Sentinels must match exactly once the line ending is stripped
#[inline]
pub fn parse_command(line: &str) -> Command<'_> {
    match line.trim_end_matches(['\r', '\n']) {
        EXIT_COMMAND => Command::Exit,
        CLEAR_COMMAND => Command::Clear,
        blank if blank.trim().is_empty() => Command::Skip,
        question => Command::Ask(question.trim()),
    }
}

/// Counts of what happened during a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplSummary {
    pub questions: usize,
    pub clears: usize,
}

/// Read questions from `input` until `exit` or end of input.
///
/// Errors from the conversation end the loop and are returned.
#[inline]
pub async fn run_repl<C, R, W>(conversation: &mut C, input: R, output: &mut W) -> Result<ReplSummary>
where
    C: Conversation + ?Sized,
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    let mut summary = ReplSummary::default();
    let mut lines = input.lines();

    loop {
        write!(output, "{}", style(PROMPT).cyan().bold())?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            debug!("End of input, leaving the question loop");
            break;
        };

        match parse_command(&line) {
            Command::Exit => break,
            Command::Clear => {
                conversation.reset();
                summary.clears += 1;
                writeln!(output, "{}", style("Conversation history cleared.").dim())?;
            }
            Command::Skip => {}
            Command::Ask(question) => {
                summary.questions += 1;
                let answer = conversation.respond(question).await?;
                writeln!(output, "{}", answer)?;
            }
        }
    }

    Ok(summary)
}
