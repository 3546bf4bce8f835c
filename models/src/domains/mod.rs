pub mod games;
pub mod sea_orm_active_enums;
pub mod tournament_players;
pub mod tournaments;
