use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::command::{CommandDispatcher, HELP_TEXT};

const PROMPT: &str = "> ";

/// Interactive session: reads one command per line from `input` and writes
/// every resulting message to `output`.
///
/// Returns on `end`/`quit` or at end of input.
pub async fn run<R, W>(
    dispatcher: &mut CommandDispatcher,
    input: R,
    output: &mut W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(format!("{HELP_TEXT}\n{PROMPT}").as_bytes()).await?;
    output.flush().await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let mut messages = Vec::new();
        let mut sink = |message: String| messages.push(message);
        let ended = dispatcher.dispatch(&line, &mut sink).await.is_err();

        for message in messages {
            output.write_all(message.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
        if ended {
            tracing::debug!("Console session ended");
            break;
        }
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;
    }
    output.flush().await
}
