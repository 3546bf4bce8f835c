use models::domains::{games, tournament_players, tournaments};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(tournaments::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(tournaments::Column::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(tournaments::Column::Name)
                            .string()
                            .char_len(1024)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(tournaments::Column::MaxParticipants)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(tournaments::Column::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(tournaments::Column::CreatorId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(tournaments::Column::WinnerId).string().null())
                    .col(
                        ColumnDef::new(tournaments::Column::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(tournaments::Column::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(tournament_players::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(tournament_players::Column::TournamentId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(tournament_players::Column::PlayerId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(tournament_players::Column::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(tournament_players::Column::TournamentId)
                            .col(tournament_players::Column::PlayerId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-tournament_players-tournament_id")
                            .from(
                                tournament_players::Entity,
                                tournament_players::Column::TournamentId,
                            )
                            .to(tournaments::Entity, tournaments::Column::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(games::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(games::Column::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(games::Column::TournamentId).string().null())
                    .col(
                        ColumnDef::new(games::Column::Round)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(games::Column::Player1).string().not_null())
                    .col(ColumnDef::new(games::Column::Player2).string().null())
                    .col(
                        ColumnDef::new(games::Column::Score1)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(games::Column::Score2)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(games::Column::WinnerId).string().null())
                    .col(
                        ColumnDef::new(games::Column::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(games::Column::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-games-tournament_id")
                            .from(games::Entity, games::Column::TournamentId)
                            .to(tournaments::Entity, tournaments::Column::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(games::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(tournament_players::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(tournaments::Entity).to_owned())
            .await?;

        Ok(())
    }
}
