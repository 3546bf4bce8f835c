use std::{collections::HashSet, sync::Arc, time::Duration};

use app::{
    config::{TimeoutPolicy, TournamentSettings},
    error::TournamentError,
    lock::DistributedLock,
    persistence::{
        games::list_games,
        tournaments::{get_tournament, list_players},
    },
};
use models::{
    domains::sea_orm_active_enums::TournamentStatus,
    params::tournament::{CreateTournamentParams, ReportResultParams},
    schemas::{
        events::{TournamentEvent, player_room, tournament_room},
        tournament::{BracketView, TournamentState},
    },
};

use crate::common::{Harness, eventually, fast_settings, harness};

const WAIT: Duration = Duration::from_secs(5);

fn player(i: usize) -> String {
    format!("p{i}")
}

async fn open_tournament(h: &Harness, id: &str, max_players: usize, joining: usize) -> Vec<String> {
    h.manager
        .create_tournament(
            CreateTournamentParams {
                id: Some(id.to_owned()),
                name: format!("{id} cup"),
                max_players,
            },
            &player(1),
        )
        .await
        .expect("Create tournament failed!");

    let players: Vec<String> = (1..=joining).map(player).collect();
    for p in &players {
        h.manager
            .join_tournament(id, p)
            .await
            .expect("Join tournament failed!");
    }
    players
}

async fn report(h: &Harness, id: &str, game_id: &str, winner: &str) -> TournamentState {
    h.manager
        .report_result(ReportResultParams {
            tournament_id: id.to_owned(),
            game_id: game_id.to_owned(),
            winner: winner.to_owned(),
            loser: None,
            score_1: Some(11),
            score_2: Some(7),
        })
        .await
        .expect("Report result failed!")
}

/// Waits until `round` is open with games awaiting results.
async fn open_round(h: &Harness, id: &str, round: u32) -> BracketView {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let view = h.manager.brackets(id).await.unwrap();
        if view.current_round == round && !view.active_games.is_empty() {
            return view;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "round {round} never opened: {view:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Reports every game as won by its first player until a winner emerges.
async fn play_out(h: &Harness, id: &str) -> BracketView {
    let mut round = 1;
    loop {
        let view = open_round(h, id, round).await;
        let mut last = None;
        for (game_id, game) in &view.active_games {
            last = Some(report(h, id, game_id, &game.player_1).await);
        }
        if let Some(state) = last.filter(|s| s.is_complete) {
            return h
                .manager
                .brackets(&state.tournament_id)
                .await
                .expect("brackets of a finished tournament");
        }
        round += 1;
    }
}

#[tokio::test]
async fn four_players_play_two_rounds() {
    let h = harness(fast_settings()).await;
    let players = open_tournament(&h, "four", 4, 4).await;

    let started = h.manager.start_tournament("four", "p1").await.unwrap();
    assert_eq!(started.brackets[&0], players);
    assert_eq!(started.status, TournamentStatus::Active);

    let round_1 = open_round(&h, "four", 1).await;
    assert_eq!(round_1.active_games.len(), 2);

    let mut after = None;
    for (game_id, game) in &round_1.active_games {
        after = Some(report(&h, "four", game_id, &game.player_1).await);
    }
    let after = after.unwrap();
    assert_eq!(after.next_round.len(), 2);
    assert!(after.active_games.is_empty());

    let round_2 = open_round(&h, "four", 2).await;
    assert_eq!(round_2.active_games.len(), 1);
    let (game_id, game) = round_2.active_games.iter().next().unwrap();
    let finalist = game.player_2.clone().unwrap();

    let done = report(&h, "four", game_id, &finalist).await;
    assert!(done.is_complete);
    assert_eq!(done.winner.as_deref(), Some(finalist.as_str()));

    let row = get_tournament(&h.conn, "four").await.unwrap().unwrap();
    assert_eq!(row.status, TournamentStatus::Completed);
    assert_eq!(row.winner_id.as_deref(), Some(finalist.as_str()));
    let games = list_games(&h.conn, "four").await.unwrap();
    assert_eq!(games.len(), 3);
    assert!(games.iter().all(|g| g.winner_id.is_some()));

    let events = h.broadcaster.in_room(&tournament_room("four")).await;
    assert!(events.contains(&TournamentEvent::TournamentComplete {
        winner: finalist.clone(),
        total_rounds: 2,
        total_players: 4,
    }));
    let round_starts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            TournamentEvent::TournamentStartRound {
                round_number,
                games_count,
                ..
            } => {
                assert_eq!(*games_count, if *round_number == 1 { 2 } else { 1 });
                Some(*round_number)
            }
            _ => None,
        })
        .collect();
    assert_eq!(round_starts, vec![1, 2]);
    assert!(events.iter().any(|e| matches!(
        e,
        TournamentEvent::TournamentRoundEnd { round_number: 1, players_advancing: 2, .. }
    )));

    for p in &players {
        let personal = h.broadcaster.in_room(&player_room(p)).await;
        assert!(
            personal
                .iter()
                .any(|e| matches!(e, TournamentEvent::CreateGame { .. })),
            "{p} was never told about a game"
        );
    }

    let manager = &h.manager;
    assert!(eventually(WAIT, move || async move { manager.tracked_count() == 0 }).await);
}

#[tokio::test]
async fn odd_field_gives_exactly_one_bye() {
    let h = harness(fast_settings()).await;
    let players = open_tournament(&h, "five", 8, 5).await;
    h.manager.start_tournament("five", "p1").await.unwrap();

    let round_1 = open_round(&h, "five", 1).await;
    assert_eq!(round_1.active_games.len(), 2);
    assert_eq!(round_1.brackets[&1].len(), 5);

    let paired: HashSet<&str> = round_1
        .active_games
        .values()
        .flat_map(|g| [Some(g.player_1.as_str()), g.player_2.as_deref()])
        .flatten()
        .collect();
    let byes: Vec<&String> = players
        .iter()
        .filter(|p| !paired.contains(p.as_str()))
        .collect();
    assert_eq!(byes.len(), 1);
    // advanced without any result being reported
    assert_eq!(round_1.next_round, vec![byes[0].clone()]);
}

#[tokio::test]
async fn brackets_shrink_until_one_winner_remains() {
    for n in [2usize, 3, 6, 7] {
        let h = harness(fast_settings()).await;
        let id = format!("field{n}");
        let players = open_tournament(&h, &id, n, n).await;
        h.manager.start_tournament(&id, "p1").await.unwrap();

        let view = play_out(&h, &id).await;
        let winner = view.winner.clone().expect("a winner");
        assert!(players.contains(&winner));
        assert_eq!(view.status, TournamentStatus::Completed);

        let mut previous = usize::MAX;
        for round in view.brackets.values() {
            let distinct: HashSet<&String> = round.iter().collect();
            assert!(distinct.len() <= previous);
            previous = distinct.len();
        }
    }
}

#[tokio::test]
async fn racing_joins_for_the_last_seat() {
    let h = harness(fast_settings()).await;
    open_tournament(&h, "race", 3, 2).await;

    let (a, b) = tokio::join!(
        h.manager.join_tournament("race", "p3"),
        h.manager.join_tournament("race", "p4"),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let rejection = outcomes
        .into_iter()
        .find_map(Result::err)
        .expect("one join must lose");
    assert!(matches!(&rejection, TournamentError::InvalidState(m) if m == "Tournament is full"));

    let status = h.manager.status("race").await.unwrap();
    assert_eq!(status.nbr_player, 3);
}

#[tokio::test]
async fn join_and_start_rules() {
    let h = harness(fast_settings()).await;
    open_tournament(&h, "rules", 4, 1).await;

    let early = h.manager.start_tournament("rules", "p1").await.unwrap_err();
    assert!(matches!(early, TournamentError::InvalidState(_)));

    let again = h.manager.join_tournament("rules", "p1").await.unwrap_err();
    assert_eq!(again.to_string(), "Player already joined");

    h.manager.join_tournament("rules", "p2").await.unwrap();
    let stranger = h.manager.start_tournament("rules", "p2").await.unwrap_err();
    assert_eq!(stranger.to_string(), "Only the creator can start the tournament");

    h.manager.start_tournament("rules", "p1").await.unwrap();
    let late = h.manager.join_tournament("rules", "p3").await.unwrap_err();
    assert_eq!(late.to_string(), "Tournament has already started");
    assert!(!late.is_retryable());

    let twice = h.manager.start_tournament("rules", "p1").await.unwrap_err();
    assert!(matches!(twice, TournamentError::InvalidState(_)));

    let duplicate = h
        .manager
        .create_tournament(
            CreateTournamentParams {
                id: Some("rules".into()),
                name: "again".into(),
                max_players: 4,
            },
            "p9",
        )
        .await
        .unwrap_err();
    assert!(matches!(duplicate, TournamentError::InvalidState(_)));
}

#[tokio::test]
async fn bad_results_are_rejected_and_replays_do_not_duplicate() {
    let h = harness(fast_settings()).await;
    open_tournament(&h, "results", 4, 4).await;
    h.manager.start_tournament("results", "p1").await.unwrap();
    let round_1 = open_round(&h, "results", 1).await;

    let unknown = h
        .manager
        .report_result(ReportResultParams {
            tournament_id: "results".into(),
            game_id: "no-such-game".into(),
            winner: "p1".into(),
            loser: None,
            score_1: None,
            score_2: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown, TournamentError::InvalidState(_)));
    assert_eq!(unknown.code(), 1002);

    let (game_id, game) = round_1.active_games.iter().next().unwrap();
    let state = report(&h, "results", game_id, &game.player_1).await;
    assert_eq!(state.next_round, vec![game.player_1.clone()]);

    let replay = h
        .manager
        .report_result(ReportResultParams {
            tournament_id: "results".into(),
            game_id: game_id.clone(),
            winner: game.player_1.clone(),
            loser: game.player_2.clone(),
            score_1: None,
            score_2: None,
        })
        .await;
    assert!(replay.is_err());

    let view = h.manager.brackets("results").await.unwrap();
    assert_eq!(
        view.next_round
            .iter()
            .filter(|p| **p == game.player_1)
            .count(),
        1
    );
}

#[tokio::test]
async fn held_lock_reports_busy() {
    let settings = TournamentSettings {
        lock_retry_attempts: 2,
        ..fast_settings()
    };
    let h = harness(settings).await;
    open_tournament(&h, "busy", 4, 1).await;

    let lock = DistributedLock::new(Arc::new(h.backend.clone()));
    assert!(lock.acquire("busy", Duration::from_secs(5)).await.unwrap());

    let err = h.manager.join_tournament("busy", "p2").await.unwrap_err();
    assert!(matches!(err, TournamentError::Busy));
    assert!(err.is_retryable());

    lock.release("busy").await.unwrap();
    h.manager.join_tournament("busy", "p2").await.unwrap();
}

#[tokio::test]
async fn timed_out_round_advances_the_connected_player() {
    let settings = TournamentSettings {
        round_timeout: Duration::from_millis(150),
        ..fast_settings()
    };
    let h = harness(settings).await;
    open_tournament(&h, "timeout", 2, 2).await;
    h.presence.connect("p2");
    h.manager.start_tournament("timeout", "p1").await.unwrap();

    let manager = &h.manager;
    let finished = eventually(WAIT, move || async move {
        manager.status("timeout").await.unwrap().is_complete
    })
    .await;
    assert!(finished);

    let status = h.manager.status("timeout").await.unwrap();
    assert_eq!(status.winner.as_deref(), Some("p2"));

    let games = list_games(&h.conn, "timeout").await.unwrap();
    assert_eq!(games[0].winner_id.as_deref(), Some("p2"));
    assert!(
        h.broadcaster
            .in_room(&tournament_room("timeout"))
            .await
            .contains(&TournamentEvent::TournamentComplete {
                winner: "p2".into(),
                total_rounds: 1,
                total_players: 2,
            })
    );
}

#[tokio::test]
async fn timed_out_round_without_connectivity_still_finishes() {
    let settings = TournamentSettings {
        round_timeout: Duration::from_millis(100),
        timeout_policy: TimeoutPolicy::Random,
        ..fast_settings()
    };
    let h = harness(settings).await;
    let players = open_tournament(&h, "coin", 4, 3).await;
    h.manager.start_tournament("coin", "p1").await.unwrap();

    let manager = &h.manager;
    let finished = eventually(WAIT, move || async move {
        manager.status("coin").await.unwrap().is_complete
    })
    .await;
    assert!(finished);
    let winner = h.manager.status("coin").await.unwrap().winner.unwrap();
    assert!(players.contains(&winner));
}

#[tokio::test]
async fn removed_tournament_is_rebuilt_and_resumed() {
    let h = harness(fast_settings()).await;
    open_tournament(&h, "phoenix", 2, 2).await;
    h.manager.start_tournament("phoenix", "p1").await.unwrap();
    let round_1 = open_round(&h, "phoenix", 1).await;
    let (game_id, game) = round_1.active_games.iter().next().unwrap();

    h.manager.remove_tournament("phoenix").await.unwrap();
    assert!(!h.manager.is_tracked("phoenix"));
    assert!(h.backend.is_empty().await);

    let state = h.manager.get_tournament("phoenix").await.unwrap();
    assert!(state.initialized);
    assert_eq!(state.current_round, 1);
    assert!(state.active_games.contains_key(game_id));
    assert!(h.manager.is_tracked("phoenix"));

    let done = report(&h, "phoenix", game_id, &game.player_1).await;
    assert!(done.is_complete);
    assert_eq!(done.winner.as_deref(), Some(game.player_1.as_str()));
}

#[tokio::test]
async fn unknown_tournament_is_not_found() {
    let h = harness(fast_settings()).await;
    let err = h.manager.get_tournament("ghost").await.unwrap_err();
    assert!(matches!(err, TournamentError::NotFound(_)));
    assert!(matches!(
        h.manager.join_tournament("ghost", "p1").await,
        Err(TournamentError::NotFound(_))
    ));
    assert_eq!(h.manager.tracked_count(), 0);
}

#[tokio::test]
async fn join_can_be_retried_after_a_failed_save() {
    let h = harness(fast_settings()).await;
    open_tournament(&h, "retry", 4, 1).await;

    h.flaky.fail_batch_after(0);
    let first = h.manager.join_tournament("retry", "p2").await.unwrap_err();
    assert!(matches!(first, TournamentError::StoreUnavailable(_)));
    assert!(first.is_retryable());
    assert_eq!(h.manager.status("retry").await.unwrap().nbr_player, 1);

    let state = h.manager.join_tournament("retry", "p2").await.unwrap();
    assert_eq!(state.players, vec![player(1), player(2)]);
    assert_eq!(
        list_players(&h.conn, "retry").await.unwrap(),
        vec![player(1), player(2)]
    );
}

#[tokio::test]
async fn create_can_be_retried_after_a_failed_save() {
    let h = harness(fast_settings()).await;
    let params = CreateTournamentParams {
        id: Some("again".into()),
        name: "again cup".into(),
        max_players: 4,
    };

    h.flaky.fail_batch_after(0);
    let first = h
        .manager
        .create_tournament(params.clone(), "p1")
        .await
        .unwrap_err();
    assert!(matches!(first, TournamentError::StoreUnavailable(_)));
    assert!(get_tournament(&h.conn, "again").await.unwrap().is_none());

    let state = h.manager.create_tournament(params, "p1").await.unwrap();
    assert_eq!(state.creator_id, "p1");
    assert!(get_tournament(&h.conn, "again").await.unwrap().is_some());
}

#[tokio::test]
async fn failed_round_save_leaves_no_orphaned_games() {
    let h = harness(fast_settings()).await;
    let players = open_tournament(&h, "flaky", 4, 4).await;

    // start's own save goes through, the coordinator's round save does not
    h.flaky.fail_batch_after(1);
    h.manager.start_tournament("flaky", "p1").await.unwrap();

    let (manager, conn) = (&h.manager, &h.conn);
    let settled = eventually(WAIT, move || async move {
        // status revives a coordinator that gave up
        let status = manager.status("flaky").await.unwrap();
        let rows = list_games(conn, "flaky").await.unwrap();
        status.current_round == 1 && rows.len() == 2
    })
    .await;
    assert!(settled);
    assert!(!h.flaky.armed());

    let view = h.manager.brackets("flaky").await.unwrap();
    let rows = list_games(&h.conn, "flaky").await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.round, 1);
        assert!(view.active_games.contains_key(&row.id));
    }

    h.manager.remove_tournament("flaky").await.unwrap();
    let rebuilt = h.manager.get_tournament("flaky").await.unwrap();
    assert_eq!(rebuilt.active_games.len(), 2);
    let mut seated: Vec<String> = rebuilt
        .active_games
        .values()
        .flat_map(|g| [Some(g.player_1.clone()), g.player_2.clone()])
        .flatten()
        .collect();
    seated.sort();
    assert_eq!(seated, players);
}
