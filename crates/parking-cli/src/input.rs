//! Operator input as a stream of lines.

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Line-oriented operator input. Line terminators are already stripped.
pub trait LineSource {
    /// Block until the next line. `None` at end of input.
    fn next_line(&mut self) -> Option<String>;

    /// Return a line only if one is already waiting.
    fn poll_line(&mut self) -> Option<String>;
}

/// Stdin read on a helper thread, so the presence check can poll for the
/// quit key without blocking on the terminal.
pub struct StdinLines {
    rx: Receiver<String>,
}

impl StdinLines {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-pump".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                tracing::debug!("stdin closed");
            })?;
        Ok(Self { rx })
    }
}

impl LineSource for StdinLines {
    fn next_line(&mut self) -> Option<String> {
        self.rx.recv().ok()
    }

    fn poll_line(&mut self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Fixed script of lines, for tests and piped sessions.
#[derive(Default)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for ScriptedLines {
    fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    fn poll_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_lines_in_order() {
        let mut input = ScriptedLines::new(["entrar", "q"]);
        assert_eq!(input.next_line().as_deref(), Some("entrar"));
        assert_eq!(input.poll_line().as_deref(), Some("q"));
        assert_eq!(input.next_line(), None);
        assert_eq!(input.poll_line(), None);
    }
}
