//! CLI channel — interactive terminal-based chat.
//!
//! Reads one message per line, writes replies to stdout.
//! Used for `hearth chat` interactive mode.

use async_trait::async_trait;
use hearth_core::channel::{Channel, InboundMessage, OutboundReply};
use hearth_core::error::ChannelError;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const CHANNEL_NAME: &str = "cli";

/// Lines that end the session.
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    sender_id: String,
}

impl CliChannel {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Turn `reader` into a stream of inbound messages, one per non-empty
    /// line, until EOF or an exit command.
    pub fn listen<R>(&self, reader: R) -> mpsc::Receiver<Result<InboundMessage, ChannelError>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let sender_id = self.sender_id.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if EXIT_COMMANDS.contains(&line) {
                            break;
                        }

                        let msg = InboundMessage::new(CHANNEL_NAME, sender_id.clone(), line);
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        rx
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new("local_user")
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<InboundMessage, ChannelError>>, ChannelError> {
        Ok(self.listen(BufReader::new(io::stdin())))
    }

    async fn send(&self, _chat_id: &str, reply: &OutboundReply) -> Result<(), ChannelError> {
        println!("{}", reply.text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_properties() {
        let ch = CliChannel::default();
        assert_eq!(ch.name(), "cli");
        assert_eq!(ch.sender_id(), "local_user");
    }

    #[tokio::test]
    async fn lines_become_messages_until_exit() {
        let ch = CliChannel::new("alice");
        let input: &[u8] = b"Kupil hleb\n\n   \nhello there\nquit\nnever read\n";
        let mut rx = ch.listen(BufReader::new(input));

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.text, "Kupil hleb");
        assert_eq!(first.sender_id, "alice");
        assert_eq!(first.channel, "cli");

        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.text, "hello there");

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn eof_closes_the_stream() {
        let ch = CliChannel::default();
        let mut rx = ch.listen(BufReader::new(&b"one"[..]));
        assert_eq!(rx.recv().await.unwrap().unwrap().text, "one");
        assert!(rx.recv().await.is_none());
    }
}
