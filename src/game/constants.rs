pub const DEFAULT_BOARD_SIZE: i32 = 20;
pub const BOARD_SIZE_MIN: i32 = 10;
pub const BOARD_SIZE_MAX: i32 = 40;

pub const DEFAULT_GAME_SPEED_MS: u64 = 150;
pub const GAME_SPEED_MIN_MS: u64 = 50;
pub const GAME_SPEED_MAX_MS: u64 = 500;

pub const DEFAULT_MAX_GAME_TIME_MS: i64 = 300_000;

pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const MAX_PLAYERS_MIN: usize = 2;
pub const MAX_PLAYERS_MAX: usize = 8;
pub const MIN_PLAYERS_TO_START: usize = 2;

pub const STARTING_SNAKE_LENGTH: usize = 3;
pub const SPAWN_MARGIN: i32 = 3;

pub const INITIAL_FOOD_COUNT: usize = 5;
pub const INITIAL_WEAPON_COUNT: usize = 3;
pub const FOOD_VALUE: u32 = 10;
pub const KILL_SCORE: u32 = 50;
pub const FOOD_SPAWN_CHANCE: f64 = 0.10;
pub const WEAPON_SPAWN_CHANCE: f64 = 0.05;
pub const MAX_SPAWN_ATTEMPTS: usize = 100;

pub const FOOD_BOMB_COUNT: usize = 5;
pub const FOOD_BOMB_RADIUS: f64 = 2.0;

pub const AUTO_START_DELAY_MS: u64 = 2_000;
pub const COUNTDOWN_FROM: u32 = 3;
pub const COUNTDOWN_STEP_MS: u64 = 1_000;
pub const LOBBY_RESET_DELAY_MS: u64 = 10_000;

pub const IDLE_TIMEOUT_MS: i64 = 300_000;
pub const SWEEP_INTERVAL_MS: u64 = 30_000;

pub const MAX_CHAT_LENGTH: usize = 200;
pub const OUTBOUND_CAPACITY: usize = 64;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_REASON_INACTIVE: &str = "Inactive";
pub const CLOSE_REASON_MANUAL: &str = "Manual disconnect";

pub const COLOR_POOL: [&str; 8] = [
    "#ff6b6b",
    "#ffd166",
    "#06d6a0",
    "#4dabf7",
    "#f06595",
    "#845ef7",
    "#20c997",
    "#fcc419",
];
