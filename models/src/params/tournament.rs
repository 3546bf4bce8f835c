use serde::Deserialize;
use validator::Validate;

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct CreateTournamentParams {
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 1024))]
    pub name: String,
    #[validate(range(min = 2, max = 256))]
    pub max_players: usize,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct TournamentRefParams {
    #[validate(length(min = 1, max = 64))]
    pub tournament_id: String,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct ReportResultParams {
    #[validate(length(min = 1, max = 64))]
    pub tournament_id: String,
    #[validate(length(min = 1))]
    pub game_id: String,
    #[validate(length(min = 1))]
    pub winner: String,
    pub loser: Option<String>,
    #[validate(range(min = 0))]
    pub score_1: Option<i32>,
    #[validate(range(min = 0))]
    pub score_2: Option<i32>,
}
