use chrono::{DateTime, Utc};
use models::domains::sea_orm_active_enums::TournamentStatus;
use models::domains::{tournament_players, tournaments};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::OnConflict,
};

pub struct NewTournament<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub max_participants: i32,
    pub creator_id: &'a str,
    pub created_at: DateTime<Utc>,
}

pub async fn create_tournament(
    conn: &DbConn,
    params: NewTournament<'_>,
) -> Result<tournaments::Model, DbErr> {
    let created_at = params.created_at.fixed_offset();
    tournaments::ActiveModel {
        id: Set(params.id.to_owned()),
        name: Set(params.name.to_owned()),
        max_participants: Set(params.max_participants),
        status: Set(TournamentStatus::Pending),
        creator_id: Set(params.creator_id.to_owned()),
        winner_id: Set(None),
        created_at: Set(created_at),
        updated_at: Set(created_at),
    }
    .insert(conn)
    .await
}

pub async fn get_tournament(conn: &DbConn, id: &str) -> Result<Option<tournaments::Model>, DbErr> {
    tournaments::Entity::find_by_id(id.to_owned()).one(conn).await
}

/// Records a membership. A player already on the roster is left as is.
pub async fn add_player(conn: &DbConn, tournament_id: &str, player_id: &str) -> Result<(), DbErr> {
    let row = tournament_players::ActiveModel {
        tournament_id: Set(tournament_id.to_owned()),
        player_id: Set(player_id.to_owned()),
        joined_at: Set(Utc::now().fixed_offset()),
    };
    let inserted = tournament_players::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([
                tournament_players::Column::TournamentId,
                tournament_players::Column::PlayerId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await;
    match inserted {
        Ok(_) | Err(DbErr::RecordNotInserted) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Players in join order.
pub async fn list_players(conn: &DbConn, tournament_id: &str) -> Result<Vec<String>, DbErr> {
    let rows = tournament_players::Entity::find()
        .filter(tournament_players::Column::TournamentId.eq(tournament_id))
        .order_by_asc(tournament_players::Column::JoinedAt)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(|row| row.player_id).collect())
}

pub async fn update_status(
    conn: &DbConn,
    id: &str,
    status: TournamentStatus,
    winner_id: Option<&str>,
) -> Result<tournaments::Model, DbErr> {
    let tournament = get_tournament(conn, id)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("tournament {id}")))?;

    let mut tournament: tournaments::ActiveModel = tournament.into();
    tournament.status = Set(status);
    if let Some(winner_id) = winner_id {
        tournament.winner_id = Set(Some(winner_id.to_owned()));
    }
    tournament.updated_at = Set(Utc::now().fixed_offset());
    tournament.update(conn).await
}
