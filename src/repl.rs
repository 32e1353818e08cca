//! Line-oriented chat loop over any async reader/writer pair.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::agent::{Agent, Session};
use crate::error::ParleyError;

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Whether a line of input ends the chat.
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word))
}

/// Read one line per turn until an exit word or end of input.
///
/// Failed turns are reported on `writer` and the loop keeps going; only I/O
/// errors on the reader or writer end it early.
pub async fn run_repl<R, W>(
    agent: &Agent,
    session: &mut Session,
    mut reader: R,
    mut writer: W,
) -> Result<(), ParleyError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(b"Agent Chat - Type 'quit', 'exit', or 'q' to end\n")
        .await?;
    writer.write_all(format!("{}\n", "-".repeat(50)).as_bytes()).await?;

    let mut line = String::new();
    loop {
        writer.write_all(b"User: ").await?;
        writer.flush().await?;

        line.clear();
        if reader.read_line(&mut line).await? == 0 || is_exit_command(&line) {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let reply = match agent.send(session, input).await {
            Ok(outcome) => format!("Assistant: {}\n", outcome.text()),
            Err(err) => format!("Error: {err}\n"),
        };
        writer.write_all(reply.as_bytes()).await?;
    }

    writer.write_all(b"Goodbye!\n").await?;
    writer.flush().await?;
    Ok(())
}
