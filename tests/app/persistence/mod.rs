use utils::testing::setup_test_db;

mod tournament;

#[tokio::test]
async fn tournament_rows() {
    let conn = setup_test_db("sqlite::memory:")
        .await
        .expect("Set up db failed!");

    tournament::test_tournament(&conn).await;
}

#[tokio::test]
async fn game_rows() {
    let conn = setup_test_db("sqlite::memory:")
        .await
        .expect("Set up db failed!");

    games::test_games(&conn).await;
}
