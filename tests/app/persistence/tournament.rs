use chrono::Utc;
use sea_orm::DatabaseConnection;

use app::persistence::tournaments::{
    NewTournament, add_player, create_tournament, get_tournament, list_players, update_status,
};
use models::domains::sea_orm_active_enums::TournamentStatus;

pub(super) async fn test_tournament(db: &DatabaseConnection) {
    let tournament = create_tournament(
        db,
        NewTournament {
            id: "cup",
            name: "Sunday cup",
            max_participants: 4,
            creator_id: "alice",
            created_at: Utc::now(),
        },
    )
    .await
    .expect("Create tournament failed!");
    assert_eq!(tournament.status, TournamentStatus::Pending);
    assert_eq!(tournament.winner_id, None);

    for player in ["alice", "bob", "carol"] {
        add_player(db, "cup", player)
            .await
            .expect("Add player failed!");
    }
    // a second insert for the same player is a no-op
    add_player(db, "cup", "bob")
        .await
        .expect("Re-adding a player failed!");

    let players = list_players(db, "cup").await.expect("List players failed!");
    assert_eq!(players.len(), 3);
    assert!(players.contains(&"carol".to_string()));

    update_status(db, "cup", TournamentStatus::Active, None)
        .await
        .expect("Update status failed!");
    let done = update_status(db, "cup", TournamentStatus::Completed, Some("carol"))
        .await
        .expect("Update status failed!");
    assert_eq!(done.status, TournamentStatus::Completed);
    assert_eq!(done.winner_id.as_deref(), Some("carol"));

    let stored = get_tournament(db, "cup")
        .await
        .expect("Get tournament failed!")
        .expect("tournament should exist");
    assert_eq!(stored.winner_id.as_deref(), Some("carol"));

    assert!(get_tournament(db, "missing").await.unwrap().is_none());
    assert!(
        update_status(db, "missing", TournamentStatus::Active, None)
            .await
            .is_err()
    );
}
