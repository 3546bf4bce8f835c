use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "games")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tournament_id: Option<String>,
    pub round: i32,
    pub player_1: String,
    pub player_2: Option<String>,
    pub score_1: i32,
    pub score_2: i32,
    pub winner_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub ended_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// The player who lost this game, if it has been decided and had an opponent.
    pub fn loser_id(&self) -> Option<&str> {
        let winner = self.winner_id.as_deref()?;
        if winner == self.player_1 {
            self.player_2.as_deref()
        } else {
            Some(self.player_1.as_str())
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tournaments::Entity",
        from = "Column::TournamentId",
        to = "super::tournaments::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Tournaments,
}

impl Related<super::tournaments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tournaments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
