use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePairing {
    pub game_id: String,
    pub player_1: String,
    pub player_2: Option<String>,
}

/// Events fanned out to the tournament and player rooms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TournamentEvent {
    CreateGame {
        game_id: String,
        player_1: String,
        player_2: Option<String>,
    },
    TournamentStartRound {
        round_number: u32,
        games_count: usize,
        games: Vec<GamePairing>,
    },
    TournamentRoundEnd {
        round_number: u32,
        winners: Vec<String>,
        players_advancing: usize,
    },
    TournamentComplete {
        winner: String,
        total_rounds: u32,
        total_players: usize,
    },
}

impl TournamentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateGame { .. } => "create_game",
            Self::TournamentStartRound { .. } => "tournament_start_round",
            Self::TournamentRoundEnd { .. } => "tournament_round_end",
            Self::TournamentComplete { .. } => "tournament_complete",
        }
    }
}

pub fn tournament_room(tournament_id: &str) -> String {
    format!("tournament_{tournament_id}")
}

pub fn player_room(player_id: &str) -> String {
    format!("player_{player_id}")
}
