mod backend;
mod memory;
mod redis;

pub use backend::{KvBackend, KvOp};
pub use memory::MemoryBackend;
pub use redis::RedisBackend;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use models::{
    domains::{games, sea_orm_active_enums::TournamentStatus},
    schemas::tournament::{ActiveGame, TournamentState},
};
use sea_orm::DbConn;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    cache::Cache,
    config::TournamentSettings,
    error::{TournamentError, TournamentResult},
    persistence::{games as game_rows, tournaments as tournament_rows},
};

const ACTIVE_GAMES: &str = "active_games";
const NEXT_ROUND: &str = "next_round";
const BRACKETS: &str = "brackets";

pub fn root_key(tournament_id: &str) -> String {
    format!("tournament:{tournament_id}")
}

pub fn active_games_key(tournament_id: &str) -> String {
    format!("tournament:{tournament_id}:{ACTIVE_GAMES}")
}

pub fn next_round_key(tournament_id: &str) -> String {
    format!("tournament:{tournament_id}:{NEXT_ROUND}")
}

pub fn brackets_key(tournament_id: &str) -> String {
    format!("tournament:{tournament_id}:{BRACKETS}")
}

fn all_keys(tournament_id: &str) -> [String; 4] {
    [
        root_key(tournament_id),
        active_games_key(tournament_id),
        next_round_key(tournament_id),
        brackets_key(tournament_id),
    ]
}

#[derive(Clone)]
struct CachedState {
    loaded_at: Instant,
    state: TournamentState,
}

/// Tournament state in the shared store, split over a root hash and three
/// collection keys, with a short per-process read cache in front of it.
///
/// A tournament missing from the store is rebuilt from the durable tables.
#[derive(Clone)]
pub struct TournamentStore {
    backend: Arc<dyn KvBackend>,
    conn: DbConn,
    settings: TournamentSettings,
    cache: Cache<CachedState>,
}

impl TournamentStore {
    pub fn new(backend: Arc<dyn KvBackend>, conn: DbConn, settings: TournamentSettings) -> Self {
        Self {
            backend,
            conn,
            settings,
            cache: Cache::new(),
        }
    }

    /// Possibly stale read, served from the local cache when recent enough.
    pub async fn load(&self, tournament_id: &str) -> TournamentResult<TournamentState> {
        let ttl = self.settings.read_cache_ttl;
        let cached = self
            .cache
            .get_data(tournament_id)
            .filter(|c| c.loaded_at.elapsed() < ttl);
        if let Some(cached) = cached {
            return Ok(cached.state);
        }
        self.load_fresh(tournament_id).await
    }

    /// Reads straight from the store, rebuilding from the database on a miss.
    pub async fn load_fresh(&self, tournament_id: &str) -> TournamentResult<TournamentState> {
        let state = match self.read(tournament_id).await? {
            Some(state) => state,
            None => {
                let state = self.rehydrate(tournament_id).await?;
                self.save(&state).await?;
                state
            }
        };
        self.remember(&state);
        Ok(state)
    }

    /// Rewrites every key of the tournament in one atomic batch.
    pub async fn save(&self, state: &TournamentState) -> TournamentResult<()> {
        let id = state.tournament_id.as_str();
        let (root_ttl, games_ttl, round_ttl) = if state.is_complete {
            let ttl = self.settings.completed_ttl;
            (ttl, ttl, ttl)
        } else {
            (
                self.settings.root_ttl,
                self.settings.active_games_ttl,
                self.settings.round_ttl,
            )
        };

        let root = root_fields(state)?;
        let active_games = state
            .active_games
            .iter()
            .map(|(game_id, game)| Ok((game_id.clone(), serde_json::to_string(game)?)))
            .collect::<TournamentResult<Vec<_>>>()?;
        let next_round = state
            .next_round
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let brackets = state
            .brackets
            .iter()
            .map(|(round, players)| Ok((round.to_string(), serde_json::to_string(players)?)))
            .collect::<TournamentResult<Vec<_>>>()?;

        let mut ops = Vec::with_capacity(12);
        push_replace(&mut ops, root_key(id), root_ttl, |key| KvOp::HSet {
            key,
            fields: root,
        });
        push_replace(&mut ops, active_games_key(id), games_ttl, |key| KvOp::HSet {
            key,
            fields: active_games,
        });
        push_replace(&mut ops, next_round_key(id), round_ttl, |key| KvOp::RPush {
            key,
            values: next_round,
        });
        push_replace(&mut ops, brackets_key(id), round_ttl, |key| KvOp::HSet {
            key,
            fields: brackets,
        });

        self.backend.apply(ops).await?;
        self.remember(state);
        Ok(())
    }

    pub async fn delete(&self, tournament_id: &str) -> TournamentResult<()> {
        self.cache.delete_data(tournament_id);
        self.backend.del(&all_keys(tournament_id)).await
    }

    /// Pushes the active-games expiry out again while a coordinator watches it.
    pub async fn touch_active_games(&self, tournament_id: &str) -> TournamentResult<()> {
        self.backend
            .apply(vec![KvOp::Expire {
                key: active_games_key(tournament_id),
                ttl: self.settings.active_games_ttl,
            }])
            .await
    }

    pub async fn expire(&self, tournament_id: &str, ttl: Duration) -> TournamentResult<()> {
        let ops = all_keys(tournament_id)
            .into_iter()
            .map(|key| KvOp::Expire { key, ttl })
            .collect();
        self.backend.apply(ops).await
    }

    pub fn invalidate(&self, tournament_id: &str) {
        self.cache.delete_data(tournament_id);
    }

    fn remember(&self, state: &TournamentState) {
        self.cache.set_data(
            &state.tournament_id,
            CachedState {
                loaded_at: Instant::now(),
                state: state.clone(),
            },
        );
    }

    async fn read(&self, tournament_id: &str) -> TournamentResult<Option<TournamentState>> {
        let root = self.backend.hgetall(&root_key(tournament_id)).await?;
        if root.is_empty() {
            return Ok(None);
        }

        let mut object = Map::new();
        for (field, raw) in root {
            object.insert(field, serde_json::from_str(&raw)?);
        }

        let mut active_games = Map::new();
        for (game_id, raw) in self.backend.hgetall(&active_games_key(tournament_id)).await? {
            active_games.insert(game_id, serde_json::from_str(&raw)?);
        }

        let next_round = self
            .backend
            .lrange(&next_round_key(tournament_id))
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect::<Result<Vec<Value>, _>>()?;

        let mut brackets = Map::new();
        for (round, raw) in self.backend.hgetall(&brackets_key(tournament_id)).await? {
            brackets.insert(round, serde_json::from_str(&raw)?);
        }

        object.insert(ACTIVE_GAMES.into(), Value::Object(active_games));
        object.insert(NEXT_ROUND.into(), Value::Array(next_round));
        object.insert(BRACKETS.into(), Value::Object(brackets));

        Ok(Some(serde_json::from_value(Value::Object(object))?))
    }

    async fn rehydrate(&self, tournament_id: &str) -> TournamentResult<TournamentState> {
        let tournament = tournament_rows::get_tournament(&self.conn, tournament_id)
            .await?
            .ok_or_else(|| TournamentError::not_found(format!("Tournament {tournament_id}")))?;
        let players = tournament_rows::list_players(&self.conn, tournament_id).await?;
        let games = game_rows::list_games(&self.conn, tournament_id).await?;

        info!(
            tournament_id,
            players = players.len(),
            games = games.len(),
            "Rebuilding tournament state from the database"
        );

        let mut state = TournamentState::new(
            tournament.id,
            tournament.name,
            tournament.max_participants.max(0) as usize,
            tournament.creator_id,
            tournament.created_at.to_utc(),
        );
        state.players = players;
        state.status = tournament.status;
        if state.status == TournamentStatus::Pending {
            return Ok(state);
        }

        rebuild_rounds(&mut state, &games);
        if state.status == TournamentStatus::Completed {
            state.is_complete = true;
            state.winner = tournament.winner_id.or_else(|| {
                (state.next_round.len() == 1).then(|| state.next_round[0].clone())
            });
            state.active_games.clear();
            state.completion_time = Some(tournament.updated_at.to_utc());
        }
        debug!(
            tournament_id,
            round = state.current_round,
            "Rebuilt tournament state"
        );
        Ok(state)
    }
}

fn push_replace(
    ops: &mut Vec<KvOp>,
    key: String,
    ttl: Duration,
    write: impl FnOnce(String) -> KvOp,
) {
    ops.push(KvOp::Del { key: key.clone() });
    ops.push(write(key.clone()));
    ops.push(KvOp::Expire { key, ttl });
}

/// Scalar fields of the root hash, each JSON-encoded.
fn root_fields(state: &TournamentState) -> TournamentResult<Vec<(String, String)>> {
    let Value::Object(object) = serde_json::to_value(state)? else {
        return Err(TournamentError::StoreUnavailable(
            "tournament state did not encode to an object".into(),
        ));
    };
    object
        .into_iter()
        .filter(|(field, _)| ![ACTIVE_GAMES, NEXT_ROUND, BRACKETS].contains(&field.as_str()))
        .map(|(field, value)| Ok((field, serde_json::to_string(&value)?)))
        .collect()
}

/// Rebuilds rounds from the recorded games of a started tournament.
///
/// A player is in round `r` when no decided game before `r` eliminated them,
/// which also brings back byes that never had a game row.
fn rebuild_rounds(state: &mut TournamentState, games: &[games::Model]) {
    state.initialized = true;
    state.brackets.insert(0, state.players.clone());

    let mut by_round: BTreeMap<u32, Vec<&games::Model>> = BTreeMap::new();
    for game in games {
        by_round
            .entry(game.round.max(0) as u32)
            .or_default()
            .push(game);
    }

    let current_round = by_round.keys().next_back().copied().unwrap_or(0);
    state.current_round = current_round;
    if current_round == 0 {
        state.next_round = state.players.clone();
        return;
    }

    let mut eliminated: HashSet<String> = HashSet::new();
    for round in 1..=current_round {
        let entrants: Vec<String> = state
            .players
            .iter()
            .filter(|p| !eliminated.contains(*p))
            .cloned()
            .collect();
        state.brackets.insert(round, entrants);

        for game in by_round.get(&round).into_iter().flatten() {
            if let Some(loser) = game.loser_id() {
                eliminated.insert(loser.to_owned());
            }
        }
    }

    let current_games = by_round.get(&current_round).cloned().unwrap_or_default();
    let entrants = state.brackets.get(&current_round).cloned().unwrap_or_default();
    let mut played: HashMap<&str, &games::Model> = HashMap::new();
    for game in &current_games {
        played.insert(game.player_1.as_str(), game);
        if let Some(p2) = game.player_2.as_deref() {
            played.insert(p2, game);
        }
    }

    state.participants = entrants.clone();
    state.bye = entrants
        .iter()
        .find(|p| !played.contains_key(p.as_str()))
        .cloned();
    state.next_round = entrants
        .iter()
        .filter(|p| match played.get(p.as_str()) {
            None => true,
            Some(game) => game.winner_id.as_deref() == Some(p.as_str()),
        })
        .cloned()
        .collect();
    state.active_games = current_games
        .iter()
        .filter(|g| g.winner_id.is_none())
        .map(|g| {
            (
                g.id.clone(),
                ActiveGame {
                    player_1: g.player_1.clone(),
                    player_2: g.player_2.clone(),
                    created_at: g.created_at.to_utc(),
                },
            )
        })
        .collect();
    state.round_start_time = Some(
        current_games
            .iter()
            .map(|g| g.created_at.to_utc())
            .min()
            .unwrap_or_else(Utc::now),
    );
}
