//! Outbound side of the chat transport.
//!
//! Replies travel over a bounded channel in the order they are sent. The
//! receiving half belongs to the transport, which delivers each
//! [`Reply::Text`] as one chat message and shows a typing indicator for
//! [`Reply::Typing`].

use crate::{Error, Result};
use tokio::sync::mpsc;

/// One outbound event for the invoking channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A message to post.
    Text(String),
    /// Signal that the bot is working on a response.
    Typing,
}

/// Order-preserving sender for [`Reply`]s.
#[derive(Debug, Clone)]
pub struct ReplySink {
    tx: mpsc::Sender<Reply>,
}

impl ReplySink {
    pub const fn new(tx: mpsc::Sender<Reply>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver the transport drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Reply>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    /// Posts a message.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelError`] if the transport stopped listening.
    pub async fn text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Reply::Text(text.into())).await
    }

    /// Shows the typing indicator.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelError`] if the transport stopped listening.
    pub async fn typing(&self) -> Result<()> {
        self.send(Reply::Typing).await
    }

    async fn send(&self, reply: Reply) -> Result<()> {
        self.tx.send(reply).await.map_err(|e| Error::ChannelError {
            context: format!("Failed to forward reply: {e}"),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
