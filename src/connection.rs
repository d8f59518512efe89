use std::sync::Arc;

use tokio::sync::mpsc;

use crate::game::PlayerId;
use crate::protocol::Message;
use crate::registry::Registry;
use crate::transport::Transport;

enum Activity {
    Inbound(anyhow::Result<Message>),
    Outbound(Option<Message>),
}

/// Drives one client: forwards inbound messages to the registry and writes
/// the player's outbox to the transport.
pub struct Connection {
    player: PlayerId,
    transport: Box<dyn Transport>,
    outbox: mpsc::UnboundedReceiver<Message>,
    registry: Arc<Registry>,
}

impl Connection {
    pub fn new(
        player: PlayerId,
        transport: Box<dyn Transport>,
        outbox: mpsc::UnboundedReceiver<Message>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            player,
            transport,
            outbox,
            registry,
        }
    }

    /// Run until the peer goes away, a frame is malformed, or the registry
    /// drops the outbox. The player is always disconnected afterwards.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let result = self.pump().await;
        match &result {
            Ok(()) => tracing::debug!(player = %self.player, "connection closed"),
            Err(e) => tracing::info!(player = %self.player, error = %e, "connection ended"),
        }
        self.registry.disconnect(self.player).await;
        result
    }

    async fn pump(&mut self) -> anyhow::Result<()> {
        loop {
            let activity = tokio::select! {
                inbound = self.transport.recv() => Activity::Inbound(inbound),
                outbound = self.outbox.recv() => Activity::Outbound(outbound),
            };
            match activity {
                Activity::Inbound(msg) => {
                    let msg = msg?;
                    tracing::trace!(player = %self.player, ?msg, "received");
                    self.registry.handle_message(self.player, msg).await?;
                }
                Activity::Outbound(Some(msg)) => self.transport.send(msg).await?,
                Activity::Outbound(None) => return Ok(()),
            }
        }
    }
}
