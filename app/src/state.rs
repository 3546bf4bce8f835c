use crate::{core::TournamentManager, presence::PresenceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub manager: TournamentManager,
    pub presence: PresenceRegistry,
}
