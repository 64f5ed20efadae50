use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

use super::constants::{
    BOARD_SIZE_MAX, BOARD_SIZE_MIN, DEFAULT_BOARD_SIZE, DEFAULT_GAME_SPEED_MS,
    DEFAULT_MAX_GAME_TIME_MS, GAME_SPEED_MAX_MS, GAME_SPEED_MIN_MS,
};
use super::weapons::WeaponType;
use crate::protocol::{PlayerPublic, SessionFrame};

pub type Players = HashMap<String, Player>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn in_bounds(self, board_size: i32) -> bool {
        self.x >= 0 && self.x < board_size && self.y >= 0 && self.y < board_size
    }

    pub fn stepped(self, direction: Direction) -> Self {
        Self {
            x: self.x + direction.x,
            y: self.y + direction.y,
        }
    }
}

/// One of the four axis unit vectors; anything else is rejected at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Direction {
    pub x: i32,
    pub y: i32,
}

impl Direction {
    pub const RIGHT: Direction = Direction { x: 1, y: 0 };

    pub fn is_unit_axis(self) -> bool {
        matches!((self.x, self.y), (1, 0) | (-1, 0) | (0, 1) | (0, -1))
    }

    pub fn reverses(self, other: Direction) -> bool {
        self.x == -other.x && self.y == -other.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Waiting,
    Starting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinCondition {
    LastStanding,
    TimeLimit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub board_size: i32,
    pub game_speed: u64,
    pub weapons_enabled: bool,
    pub max_game_time: i64,
    pub win_condition: WinCondition,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            game_speed: DEFAULT_GAME_SPEED_MS,
            weapons_enabled: true,
            max_game_time: DEFAULT_MAX_GAME_TIME_MS,
            win_condition: WinCondition::LastStanding,
        }
    }
}

impl GameSettings {
    /// Merges a client-supplied patch, clamping numeric fields into range.
    pub fn apply(&mut self, patch: &GameSettingsPatch) {
        if let Some(board_size) = patch.board_size {
            self.board_size = board_size.clamp(BOARD_SIZE_MIN, BOARD_SIZE_MAX);
        }
        if let Some(game_speed) = patch.game_speed {
            self.game_speed = game_speed.clamp(GAME_SPEED_MIN_MS, GAME_SPEED_MAX_MS);
        }
        if let Some(weapons_enabled) = patch.weapons_enabled {
            self.weapons_enabled = weapons_enabled;
        }
        if let Some(max_game_time) = patch.max_game_time {
            self.max_game_time = max_game_time.max(0);
        }
        if let Some(win_condition) = patch.win_condition {
            self.win_condition = win_condition;
        }
    }

    pub fn with_patch(patch: Option<&GameSettingsPatch>) -> Self {
        let mut settings = Self::default();
        if let Some(patch) = patch {
            settings.apply(patch);
        }
        settings
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettingsPatch {
    pub board_size: Option<i32>,
    pub game_speed: Option<u64>,
    pub weapons_enabled: Option<bool>,
    pub max_game_time: Option<i64>,
    pub win_condition: Option<WinCondition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoodItem {
    pub id: String,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeaponPickup {
    pub id: String,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: WeaponType,
}

/// Timed modifiers applied by weapon activation. Deadlines are absolute
/// wall-clock ms and are swept at the start of every tick.
#[derive(Debug, Clone)]
pub struct ActiveEffects {
    pub speed_multiplier: f64,
    pub is_invincible: bool,
    pub can_phase_through: bool,
    pub score_multiplier: u32,
    pub speed_expires_at: Option<i64>,
    pub shield_expires_at: Option<i64>,
    pub ghost_expires_at: Option<i64>,
    pub double_score_expires_at: Option<i64>,
}

impl Default for ActiveEffects {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            is_invincible: false,
            can_phase_through: false,
            score_multiplier: 1,
            speed_expires_at: None,
            shield_expires_at: None,
            ghost_expires_at: None,
            double_score_expires_at: None,
        }
    }
}

impl ActiveEffects {
    pub fn expire(&mut self, now: i64) {
        if self.speed_expires_at.is_some_and(|at| now >= at) {
            self.speed_multiplier = 1.0;
            self.speed_expires_at = None;
        }
        if self.shield_expires_at.is_some_and(|at| now >= at) {
            self.is_invincible = false;
            self.shield_expires_at = None;
        }
        if self.ghost_expires_at.is_some_and(|at| now >= at) {
            self.can_phase_through = false;
            self.ghost_expires_at = None;
        }
        if self.double_score_expires_at.is_some_and(|at| now >= at) {
            self.score_multiplier = 1;
            self.double_score_expires_at = None;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One connected session and its gameplay state. The session id is the
/// player id; a reconnecting client gets a fresh identity.
#[derive(Debug)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub color: String,
    pub sink: mpsc::Sender<SessionFrame>,
    pub last_activity: i64,
    pub connected_at: i64,
    pub lobby_id: Option<String>,

    pub snake: Vec<Position>,
    pub direction: Direction,
    pub is_alive: bool,
    pub is_ready: bool,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub weapon: Option<WeaponType>,
    pub effects: ActiveEffects,
    /// Fractional movement budget; whole steps are consumed each tick so a
    /// 1.5x speed boost alternates one- and two-cell advances.
    pub move_budget: f64,

    pub games_played: u32,
    pub games_won: u32,
}

impl Player {
    pub fn new(id: String, name: String, color: String, sink: mpsc::Sender<SessionFrame>, now: i64) -> Self {
        Self {
            id,
            name,
            color,
            sink,
            last_activity: now,
            connected_at: now,
            lobby_id: None,
            snake: Vec::new(),
            direction: Direction::RIGHT,
            is_alive: true,
            is_ready: false,
            score: 0,
            kills: 0,
            deaths: 0,
            weapon: None,
            effects: ActiveEffects::default(),
            move_budget: 0.0,
            games_played: 0,
            games_won: 0,
        }
    }

    pub fn touch(&mut self, now: i64) {
        self.last_activity = now;
    }

    /// Back to a clean pre-game slate. Cumulative counters survive.
    pub fn reset_for_game(&mut self) {
        self.snake.clear();
        self.direction = Direction::RIGHT;
        self.is_alive = true;
        self.is_ready = false;
        self.score = 0;
        self.kills = 0;
        self.deaths = 0;
        self.weapon = None;
        self.effects.clear();
        self.move_budget = 0.0;
    }

    pub fn head(&self) -> Option<Position> {
        self.snake.first().copied()
    }

    pub fn public_info(&self) -> PlayerPublic {
        PlayerPublic {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            score: self.score,
            kills: self.kills,
            deaths: self.deaths,
            is_alive: self.is_alive,
            is_ready: self.is_ready,
            weapon: self.weapon,
            games_played: self.games_played,
            games_won: self.games_won,
        }
    }
}
