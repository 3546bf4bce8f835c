use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::sea_orm_active_enums::TournamentStatus;

/// A game awaiting its result in the current round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveGame {
    pub player_1: String,
    pub player_2: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActiveGame {
    pub fn involves(&self, player_id: &str) -> bool {
        self.player_1 == player_id || self.player_2.as_deref() == Some(player_id)
    }

    /// The other side of the game, `None` for a bye or a stranger.
    pub fn opponent_of(&self, player_id: &str) -> Option<&str> {
        if self.player_1 == player_id {
            self.player_2.as_deref()
        } else if self.player_2.as_deref() == Some(player_id) {
            Some(self.player_1.as_str())
        } else {
            None
        }
    }
}

/// Live state of one tournament as held in the shared store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentState {
    pub tournament_id: String,
    pub name: String,
    pub max_players: usize,
    pub creator_id: String,
    pub players: Vec<String>,
    pub status: TournamentStatus,
    pub initialized: bool,
    pub is_complete: bool,
    pub current_round: u32,
    /// Participants of the current round, in pairing order.
    pub participants: Vec<String>,
    /// Survivors of the current round, filled as results arrive.
    pub next_round: Vec<String>,
    /// The player sitting out the current round.
    #[serde(default)]
    pub bye: Option<String>,
    pub brackets: BTreeMap<u32, Vec<String>>,
    pub active_games: BTreeMap<String, ActiveGame>,
    pub winner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub round_start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

impl TournamentState {
    pub fn new(
        tournament_id: String,
        name: String,
        max_players: usize,
        creator_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tournament_id,
            name,
            max_players,
            creator_id,
            players: Vec::new(),
            status: TournamentStatus::Pending,
            initialized: false,
            is_complete: false,
            current_round: 0,
            participants: Vec::new(),
            next_round: Vec::new(),
            bye: None,
            brackets: BTreeMap::new(),
            active_games: BTreeMap::new(),
            winner: None,
            created_at,
            round_start_time: None,
            completion_time: None,
        }
    }

    pub fn nbr_player(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn round_active(&self) -> bool {
        !self.active_games.is_empty()
    }
}

/// Compact status answer for the query surface.
#[derive(Clone, Debug, Serialize)]
pub struct TournamentSummary {
    pub tournament_id: String,
    pub name: String,
    pub creator_id: String,
    pub status: TournamentStatus,
    pub max_players: usize,
    pub nbr_player: usize,
    pub players: Vec<String>,
    pub current_round: u32,
    pub is_complete: bool,
    pub winner: Option<String>,
}

impl From<&TournamentState> for TournamentSummary {
    fn from(state: &TournamentState) -> Self {
        Self {
            tournament_id: state.tournament_id.clone(),
            name: state.name.clone(),
            creator_id: state.creator_id.clone(),
            status: state.status,
            max_players: state.max_players,
            nbr_player: state.nbr_player(),
            players: state.players.clone(),
            current_round: state.current_round,
            is_complete: state.is_complete,
            winner: state.winner.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BracketView {
    pub tournament_id: String,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub brackets: BTreeMap<u32, Vec<String>>,
    pub active_games: BTreeMap<String, ActiveGame>,
    pub next_round: Vec<String>,
    pub winner: Option<String>,
}

impl From<&TournamentState> for BracketView {
    fn from(state: &TournamentState) -> Self {
        Self {
            tournament_id: state.tournament_id.clone(),
            status: state.status,
            current_round: state.current_round,
            brackets: state.brackets.clone(),
            active_games: state.active_games.clone(),
            next_round: state.next_round.clone(),
            winner: state.winner.clone(),
        }
    }
}
