use chrono::{DateTime, Utc};
use models::domains::games;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct NewGame<'a> {
    pub id: &'a str,
    pub tournament_id: &'a str,
    pub round: u32,
    pub player_1: &'a str,
    pub player_2: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

pub async fn create_game(conn: &DbConn, game: NewGame<'_>) -> Result<games::Model, DbErr> {
    games::ActiveModel {
        id: Set(game.id.to_owned()),
        tournament_id: Set(Some(game.tournament_id.to_owned())),
        round: Set(game.round as i32),
        player_1: Set(game.player_1.to_owned()),
        player_2: Set(game.player_2.map(str::to_owned)),
        score_1: Set(0),
        score_2: Set(0),
        winner_id: Set(None),
        created_at: Set(game.created_at.fixed_offset()),
        ended_at: Set(None),
    }
    .insert(conn)
    .await
}

/// Stores the decided winner. A game that is already decided is left untouched.
pub async fn record_result(
    conn: &DbConn,
    game_id: &str,
    winner_id: &str,
    scores: Option<(i32, i32)>,
) -> Result<Option<games::Model>, DbErr> {
    let Some(game) = games::Entity::find_by_id(game_id.to_owned()).one(conn).await? else {
        return Ok(None);
    };
    if game.winner_id.is_some() {
        return Ok(Some(game));
    }

    let mut game: games::ActiveModel = game.into();
    game.winner_id = Set(Some(winner_id.to_owned()));
    if let Some((score_1, score_2)) = scores {
        game.score_1 = Set(score_1);
        game.score_2 = Set(score_2);
    }
    game.ended_at = Set(Some(Utc::now().fixed_offset()));
    game.update(conn).await.map(Some)
}

pub async fn list_games(conn: &DbConn, tournament_id: &str) -> Result<Vec<games::Model>, DbErr> {
    games::Entity::find()
        .filter(games::Column::TournamentId.eq(tournament_id))
        .order_by_asc(games::Column::Round)
        .order_by_asc(games::Column::CreatedAt)
        .all(conn)
        .await
}
