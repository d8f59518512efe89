use crate::protocol::Message;

/// A bidirectional, ordered message stream to one peer.
///
/// `recv` must be cancel-safe: the connection worker races it against its
/// outbox in `tokio::select!`, and a cancelled `recv` must not lose bytes.
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()>;
    async fn recv(&mut self) -> anyhow::Result<Message>;
}

pub mod in_memory;
pub mod tcp;
