//! Interactive calculator loop.
//!
//! Lines are evaluated by a background task that owns the session; replies
//! come back over a channel while the loop keeps reading input. A slow engine
//! call therefore never blocks typing, and the only way to cut one short is
//! the engine's own process timeout.

use crate::error::{HarnessError, HarnessResult};
use crate::session::{CalculatorSession, CommandResult};
use engine::Engine;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const PROMPT: &str = "axiom> ";
const QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ShellReply {
    pub line: String,
    pub result: CommandResult,
}

/// Handle to the background evaluator.
pub struct ShellWorker<E: Engine + 'static> {
    requests: mpsc::Sender<String>,
    replies: mpsc::Receiver<ShellReply>,
    handle: JoinHandle<CalculatorSession<E>>,
}

impl<E: Engine + 'static> ShellWorker<E> {
    pub fn spawn(mut session: CalculatorSession<E>) -> Self {
        let (requests, mut inbox) = mpsc::channel::<String>(QUEUE_DEPTH);
        let (outbox, replies) = mpsc::channel::<ShellReply>(QUEUE_DEPTH);

        let handle = tokio::spawn(async move {
            while let Some(line) = inbox.recv().await {
                debug!("Worker evaluating '{}'", line);
                let result = session.execute(&line).await;
                if outbox.send(ShellReply { line, result }).await.is_err() {
                    break;
                }
            }
            session
        });

        Self {
            requests,
            replies,
            handle,
        }
    }

    pub async fn submit(&self, line: String) -> HarnessResult<()> {
        self.requests
            .send(line)
            .await
            .map_err(|e| HarnessError::Worker(e.to_string()))
    }

    pub async fn next_reply(&mut self) -> Option<ShellReply> {
        self.replies.recv().await
    }

    /// Stop accepting lines, drain outstanding replies, and hand the session back.
    pub async fn finish(self) -> HarnessResult<(CalculatorSession<E>, Vec<ShellReply>)> {
        let Self {
            requests,
            mut replies,
            handle,
        } = self;
        drop(requests);

        let mut remaining = Vec::new();
        while let Some(reply) = replies.recv().await {
            remaining.push(reply);
        }
        let session = handle
            .await
            .map_err(|e| HarnessError::Worker(e.to_string()))?;
        Ok((session, remaining))
    }
}

fn is_quit(line: &str) -> bool {
    matches!(line, "quit" | "exit" | "quit()" | "exit()")
}

/// Run the shell over arbitrary async input/output until `quit` or end of input.
pub async fn run_shell<E, R, W>(
    session: CalculatorSession<E>,
    input: R,
    mut output: W,
) -> HarnessResult<CalculatorSession<E>>
where
    E: Engine + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let engine_note = if session.has_engine() {
        "engine connected"
    } else {
        "engine unavailable, using local evaluator"
    };
    output
        .write_all(
            format!(
                "AXIOM calculator ({})\nType 'help' for commands, 'quit' or 'exit' to leave.\n{}",
                engine_note, PROMPT
            )
            .as_bytes(),
        )
        .await?;
    output.flush().await?;

    let mut worker = ShellWorker::spawn(session);
    let requests = worker.requests.clone();
    let mut lines = input.lines();
    let mut reading = true;
    // Lines read but not yet handed to the worker. Sends only happen through a
    // reserved permit so a full request channel never stops reply draining.
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut pending = 0usize;

    while reading || pending > 0 {
        tokio::select! {
            line = lines.next_line(), if reading && queued.len() < QUEUE_DEPTH => {
                match line? {
                    Some(line) => {
                        let line = line.trim().to_string();
                        if is_quit(&line) {
                            reading = false;
                        } else if line.is_empty() {
                            output.write_all(PROMPT.as_bytes()).await?;
                            output.flush().await?;
                        } else {
                            queued.push_back(line);
                            pending += 1;
                        }
                    }
                    None => reading = false,
                }
            }
            permit = requests.reserve(), if !queued.is_empty() => {
                let permit = permit.map_err(|e| HarnessError::Worker(e.to_string()))?;
                if let Some(line) = queued.pop_front() {
                    permit.send(line);
                }
            }
            reply = worker.next_reply(), if pending > 0 => {
                let Some(reply) = reply else {
                    return Err(HarnessError::Worker("evaluator task exited".to_string()));
                };
                pending -= 1;
                let mut text = reply.result.render();
                text.push('\n');
                if reading {
                    text.push_str(PROMPT);
                }
                output.write_all(text.as_bytes()).await?;
                output.flush().await?;
            }
        }
    }

    drop(requests);
    let (session, _) = worker.finish().await?;
    output.write_all(b"Goodbye!\n").await?;
    output.flush().await?;
    info!("Shell closed after {} history entries", session.history().len());
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::ProcessEngine;

    #[tokio::test]
    async fn test_shell_round_trip_without_engine() {
        let session = CalculatorSession::<ProcessEngine>::new(None);
        let input: &[u8] = b"2 + 3\n\nx = 4\nx * 2\nmode stats\nquit\nnever evaluated\n";
        let mut output = Vec::new();

        let session = run_shell(session, input, &mut output).await.unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("5 (fast local)"));
        assert!(text.contains("x = 4 (fast local)"));
        assert!(text.contains("8 (local fallback)"));
        assert!(text.contains("Switched to STATISTICS mode"));
        assert!(text.ends_with("Goodbye!\n"));
        assert!(!text.contains("never evaluated"));
        assert_eq!(session.evaluator().get("x").map(|v| v.to_string()), Some("4".to_string()));
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_the_shell() {
        let session = CalculatorSession::<ProcessEngine>::new(None);
        let input: &[u8] = b"1/0\nhgfdjhgf\n2**10\n";
        let mut output = Vec::new();

        run_shell(session, input, &mut output).await.unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("Error: division by zero"));
        assert!(text.contains("Error: name 'hgfdjhgf' is not defined"));
        assert!(text.contains("1024 (fast local)"));
    }

    #[tokio::test]
    async fn test_piped_input_larger_than_both_queues() {
        let session = CalculatorSession::<ProcessEngine>::new(None);
        let count = QUEUE_DEPTH * 4;
        let mut input = String::new();
        for i in 0..count {
            input.push_str(&format!("{} + 1\n", i));
        }
        let mut output = Vec::new();

        let session = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_shell(session, input.as_bytes(), &mut output),
        )
        .await
        .expect("shell stalled on piped input")
        .unwrap();
        let text = String::from_utf8(output).unwrap();

        assert_eq!(text.matches("(fast local)").count(), count);
        assert!(text.contains(&format!("{} (fast local)", count)));
        assert!(text.ends_with("Goodbye!\n"));
        assert_eq!(session.history().len(), count * 2);
    }

    #[tokio::test]
    async fn test_worker_preserves_order() {
        let session = CalculatorSession::<ProcessEngine>::new(None);
        let mut worker = ShellWorker::spawn(session);
        for i in 1..=5 {
            worker.submit(format!("{} * 10", i)).await.unwrap();
        }
        for i in 1..=5 {
            let reply = worker.next_reply().await.unwrap();
            assert_eq!(reply.line, format!("{} * 10", i));
            assert_eq!(reply.result.render(), format!("{} (fast local)", i * 10));
        }
        let (session, remaining) = worker.finish().await.unwrap();
        assert!(remaining.is_empty());
        assert_eq!(session.history().len(), 10);
    }
}
