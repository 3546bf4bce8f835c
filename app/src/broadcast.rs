use async_trait::async_trait;
use models::schemas::events::TournamentEvent;
use socketioxide::SocketIo;
use tracing::{debug, warn};

/// Fan-out of tournament events to socket rooms.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn emit(&self, room: &str, event: &TournamentEvent);
}

#[derive(Clone)]
pub struct SocketIoBroadcaster {
    io: SocketIo,
}

impl SocketIoBroadcaster {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }
}

#[async_trait]
impl Broadcaster for SocketIoBroadcaster {
    async fn emit(&self, room: &str, event: &TournamentEvent) {
        debug!(room, event = event.name(), "broadcasting");
        if let Err(e) = self.io.to(room.to_owned()).emit(event.name(), event).await {
            warn!("Failed to emit {} to {}: {}", event.name(), room, e);
        }
    }
}
