use crate::cache::Cache;

/// Connected sockets per player in this process.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    sockets: Cache<usize>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, player_id: &str) {
        self.sockets.upsert(player_id, || 0, |count| *count += 1);
    }

    pub fn disconnect(&self, player_id: &str) {
        self.sockets.update_data(player_id, |count| *count = count.saturating_sub(1));
        self.sockets.delete_if(player_id, |count| *count == 0);
    }

    pub fn is_connected(&self, player_id: &str) -> bool {
        self.sockets.contains_key(player_id)
    }
}
