use rand::Rng;
use uuid::Uuid;

use super::constants::{
    FOOD_VALUE, INITIAL_FOOD_COUNT, INITIAL_WEAPON_COUNT, MAX_SPAWN_ATTEMPTS,
    MIN_PLAYERS_TO_START, SPAWN_MARGIN, STARTING_SNAKE_LENGTH,
};
use super::types::{
    Direction, FoodItem, GameSettings, GameState, Player, Players, Position, WeaponPickup,
};
use super::weapons;
use crate::protocol::{GameStats, LobbyDetail, LobbyInfo, RankingEntry, ServerEvent, SessionFrame};

mod engine;

/// A room of 2-8 players running at most one game at a time. All mutation
/// happens under the session manager's lock; the `epoch` counter is bumped on
/// every lifecycle transition so that scheduled work (countdown steps, tick
/// loop, post-game reset) can detect it has been superseded and stand down.
#[derive(Debug)]
pub struct Lobby {
    pub id: String,
    pub name: String,
    pub max_players: usize,
    pub is_private: bool,
    pub password: Option<String>,
    pub created_by: String,
    pub created_at: i64,
    pub game_state: GameState,
    pub settings: GameSettings,
    /// Member player ids in join order; this is the iteration order for
    /// collision resolution, kill credit and ownership transfer.
    pub members: Vec<String>,
    pub food: Vec<FoodItem>,
    pub weapons: Vec<WeaponPickup>,
    pub game_start_time: Option<i64>,
    pub epoch: u64,
}

impl Lobby {
    pub fn new(
        id: String,
        name: String,
        created_by: String,
        max_players: usize,
        is_private: bool,
        password: Option<String>,
        settings: GameSettings,
        now: i64,
    ) -> Self {
        Self {
            id,
            name,
            max_players,
            is_private,
            password,
            created_by,
            created_at: now,
            game_state: GameState::Waiting,
            settings,
            members: Vec::new(),
            food: Vec::new(),
            weapons: Vec::new(),
            game_start_time: None,
            epoch: 0,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn alive_count(&self, players: &Players) -> usize {
        self.members
            .iter()
            .filter_map(|id| players.get(id))
            .filter(|player| player.is_alive)
            .count()
    }

    pub fn add_player(&mut self, players: &mut Players, player_id: &str) -> Result<(), &'static str> {
        if self.members.len() >= self.max_players {
            return Err("Lobby is full");
        }
        if self.game_state == GameState::Playing {
            return Err("Game already in progress");
        }
        let Some(player) = players.get_mut(player_id) else {
            return Err("Unknown player");
        };
        player.reset_for_game();
        player.lobby_id = Some(self.id.clone());
        let public = player.public_info();
        if self.members.is_empty() {
            self.created_by = player_id.to_string();
        }
        self.members.push(player_id.to_string());
        self.broadcast(
            players,
            &ServerEvent::PlayerJoined {
                player: public,
                player_count: self.members.len(),
            },
            Some(player_id),
        );
        Ok(())
    }

    /// Detaches a member. Returns true when the departure ended a running
    /// game (alive count fell to one or below), so the caller can schedule
    /// the post-game reset.
    pub fn remove_player(&mut self, players: &mut Players, player_id: &str, now: i64) -> bool {
        let Some(index) = self.members.iter().position(|id| id == player_id) else {
            return false;
        };
        self.members.remove(index);
        let name = match players.get_mut(player_id) {
            Some(player) => {
                player.lobby_id = None;
                player.is_ready = false;
                player.snake.clear();
                player.name.clone()
            }
            None => String::new(),
        };
        let mut new_creator = None;
        if self.created_by == player_id {
            if let Some(next) = self.members.first() {
                self.created_by = next.clone();
                new_creator = Some(next.clone());
            }
        }
        self.broadcast(
            players,
            &ServerEvent::PlayerLeft {
                player_id: player_id.to_string(),
                name,
                new_creator,
            },
            None,
        );
        if self.game_state == GameState::Playing && self.alive_count(players) <= 1 {
            self.end_game(players, now);
            return true;
        }
        false
    }

    pub fn set_ready(&mut self, players: &mut Players, player_id: &str, ready: bool) {
        if let Some(player) = players.get_mut(player_id) {
            player.is_ready = ready;
        }
        let ready_count = self
            .members
            .iter()
            .filter(|id| players.get(*id).is_some_and(|player| player.is_ready))
            .count();
        self.broadcast(
            players,
            &ServerEvent::PlayerReadyChanged {
                player_id: player_id.to_string(),
                ready,
                ready_count,
                total_count: self.members.len(),
            },
            None,
        );
    }

    pub fn can_start_game(&self, players: &Players) -> bool {
        self.game_state == GameState::Waiting
            && self.members.len() >= MIN_PLAYERS_TO_START
            && self
                .members
                .iter()
                .all(|id| players.get(id).is_some_and(|player| player.is_ready))
    }

    /// Freezes the roster into a fresh game: snakes placed, board seeded,
    /// countdown announced. The per-second countdown steps and the final
    /// transition to `Playing` are driven by the session manager's timer.
    pub fn begin_countdown(&mut self, players: &mut Players, now: i64, rng: &mut impl Rng) {
        self.game_state = GameState::Starting;
        self.epoch += 1;
        self.game_start_time = Some(now);
        self.food.clear();
        self.weapons.clear();
        for id in self.members.clone() {
            if let Some(player) = players.get_mut(&id) {
                player.reset_for_game();
                player.games_played += 1;
            }
        }
        for id in self.members.clone() {
            self.spawn_snake_for(players, &id, rng);
        }
        self.seed_items(players, rng);
        self.broadcast(
            players,
            &ServerEvent::GameStarting {
                countdown: super::constants::COUNTDOWN_FROM,
            },
            None,
        );
    }

    pub fn begin_play(&mut self, players: &mut Players, rng: &mut impl Rng) {
        self.game_state = GameState::Playing;
        self.epoch += 1;
        // Anyone who slipped in during the countdown still needs a snake.
        for id in self.members.clone() {
            if players.get(&id).is_some_and(|player| player.snake.is_empty()) {
                self.spawn_snake_for(players, &id, rng);
            }
        }
        self.broadcast(players, &ServerEvent::GameStarted, None);
    }

    pub fn end_game(&mut self, players: &mut Players, now: i64) {
        self.game_state = GameState::Finished;
        self.epoch += 1;
        let rankings = self.rankings(players);
        let winner_id = rankings
            .first()
            .filter(|entry| entry.alive)
            .map(|entry| entry.id.clone());
        if let Some(id) = &winner_id {
            if let Some(player) = players.get_mut(id) {
                player.games_won += 1;
            }
        }
        let winner = winner_id
            .as_deref()
            .and_then(|id| players.get(id))
            .map(Player::public_info);
        let total_kills = self
            .members
            .iter()
            .filter_map(|id| players.get(id))
            .map(|player| player.kills)
            .sum();
        let duration = self.game_start_time.map(|start| now - start).unwrap_or(0);
        tracing::info!(lobby_id = %self.id, duration, "game ended");
        self.broadcast(
            players,
            &ServerEvent::GameEnded {
                winner,
                rankings,
                game_stats: GameStats {
                    duration,
                    total_kills,
                },
            },
            None,
        );
    }

    pub fn reset(&mut self, players: &mut Players) {
        self.food.clear();
        self.weapons.clear();
        self.game_start_time = None;
        self.game_state = GameState::Waiting;
        self.epoch += 1;
        for id in self.members.clone() {
            if let Some(player) = players.get_mut(&id) {
                player.reset_for_game();
            }
        }
        let detail = self.detail(players);
        self.broadcast(players, &ServerEvent::LobbyReset { lobby: detail }, None);
    }

    /// Alive before dead, then score, then kills; ties keep join order.
    pub fn rankings(&self, players: &Players) -> Vec<RankingEntry> {
        let mut ordered: Vec<&Player> = self
            .members
            .iter()
            .filter_map(|id| players.get(id))
            .collect();
        ordered.sort_by(|a, b| {
            b.is_alive
                .cmp(&a.is_alive)
                .then(b.score.cmp(&a.score))
                .then(b.kills.cmp(&a.kills))
        });
        ordered
            .iter()
            .enumerate()
            .map(|(index, player)| RankingEntry {
                rank: index + 1,
                id: player.id.clone(),
                name: player.name.clone(),
                score: player.score,
                kills: player.kills,
                alive: player.is_alive,
            })
            .collect()
    }

    /// Serializes once and fans out with `try_send`; a full or closed sink
    /// loses the frame and the session is left for the idle sweeper.
    pub fn broadcast(&self, players: &Players, event: &ServerEvent, exclude: Option<&str>) {
        let payload = event.to_json();
        for id in &self.members {
            if exclude == Some(id.as_str()) {
                continue;
            }
            let Some(player) = players.get(id) else {
                continue;
            };
            if player
                .sink
                .try_send(SessionFrame::Text(payload.clone()))
                .is_err()
            {
                tracing::debug!(player_id = %id, lobby_id = %self.id, "broadcast send failed");
            }
        }
    }

    pub fn send_to(players: &Players, player_id: &str, event: &ServerEvent) {
        if let Some(player) = players.get(player_id) {
            if player
                .sink
                .try_send(SessionFrame::Text(event.to_json()))
                .is_err()
            {
                tracing::debug!(player_id, "send failed");
            }
        }
    }

    pub fn info(&self) -> LobbyInfo {
        LobbyInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.members.len(),
            max_players: self.max_players,
            game_state: self.game_state,
            created_at: self.created_at,
        }
    }

    pub fn detail(&self, players: &Players) -> LobbyDetail {
        LobbyDetail {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self
                .members
                .iter()
                .filter_map(|id| players.get(id))
                .map(Player::public_info)
                .collect(),
            max_players: self.max_players,
            is_private: self.is_private,
            created_by: self.created_by.clone(),
            game_state: self.game_state,
            settings: self.settings.clone(),
        }
    }

    /// Head placed so the whole starting body sits inside the spawn margin;
    /// the body extends left of the head, matching the initial direction.
    fn spawn_snake_for(&self, players: &mut Players, player_id: &str, rng: &mut impl Rng) {
        let board = self.settings.board_size;
        let tail_span = STARTING_SNAKE_LENGTH as i32 - 1;
        let x_low = SPAWN_MARGIN + tail_span;
        let high = board - SPAWN_MARGIN - 1;
        let mut head = Position::new(x_low, SPAWN_MARGIN);
        for attempt in 0..MAX_SPAWN_ATTEMPTS {
            let candidate = Position::new(
                rng.gen_range(x_low..=high),
                rng.gen_range(SPAWN_MARGIN..=high),
            );
            let cells: Vec<Position> = (0..=tail_span)
                .map(|i| Position::new(candidate.x - i, candidate.y))
                .collect();
            let clash = self
                .members
                .iter()
                .filter(|id| id.as_str() != player_id)
                .filter_map(|id| players.get(id))
                .any(|other| other.snake.iter().any(|segment| cells.contains(segment)));
            head = candidate;
            if !clash || attempt == MAX_SPAWN_ATTEMPTS - 1 {
                break;
            }
        }
        if let Some(player) = players.get_mut(player_id) {
            player.snake = (0..=tail_span)
                .map(|i| Position::new(head.x - i, head.y))
                .collect();
            player.direction = Direction::RIGHT;
            player.is_alive = true;
        }
    }

    fn seed_items(&mut self, players: &Players, rng: &mut impl Rng) {
        for _ in 0..INITIAL_FOOD_COUNT {
            self.try_spawn_food(players, rng);
        }
        if self.settings.weapons_enabled {
            for _ in 0..INITIAL_WEAPON_COUNT {
                self.try_spawn_weapon(players, rng);
            }
        }
    }

    pub(crate) fn try_spawn_food(&mut self, players: &Players, rng: &mut impl Rng) {
        if let Some(cell) = self.random_free_cell(players, rng) {
            self.food.push(FoodItem {
                id: Uuid::new_v4().to_string(),
                x: cell.x,
                y: cell.y,
                kind: "normal".to_string(),
                value: FOOD_VALUE,
            });
        }
    }

    pub(crate) fn try_spawn_weapon(&mut self, players: &Players, rng: &mut impl Rng) {
        if let Some(cell) = self.random_free_cell(players, rng) {
            self.weapons.push(WeaponPickup {
                id: Uuid::new_v4().to_string(),
                x: cell.x,
                y: cell.y,
                kind: weapons::random_weapon(rng),
            });
        }
    }

    pub(crate) fn cell_occupied(&self, players: &Players, cell: Position) -> bool {
        let snake_hit = self
            .members
            .iter()
            .filter_map(|id| players.get(id))
            .filter(|player| player.is_alive)
            .any(|player| player.snake.contains(&cell));
        snake_hit
            || self.food.iter().any(|item| item.x == cell.x && item.y == cell.y)
            || self
                .weapons
                .iter()
                .any(|item| item.x == cell.x && item.y == cell.y)
    }

    /// Uniform rejection sample over the board; None after 100 misses, in
    /// which case the caller skips the spawn.
    pub(crate) fn random_free_cell(&self, players: &Players, rng: &mut impl Rng) -> Option<Position> {
        let board = self.settings.board_size;
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let cell = Position::new(rng.gen_range(0..board), rng.gen_range(0..board));
            if !self.cell_occupied(players, cell) {
                return Some(cell);
            }
        }
        None
    }
}
