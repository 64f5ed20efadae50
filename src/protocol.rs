//! JSON wire protocol. Inbound frames are `{type, data?}` envelopes; outbound
//! frames are flat `{type, ...fields}` objects. Both sides use tagged serde
//! enums so unknown inbound types are rejected with an `error` naming the
//! offending type instead of closing the connection.

use serde::{Deserialize, Serialize};

use crate::game::types::{
    Direction, FoodItem, GameSettings, GameSettingsPatch, GameState, Position, WeaponPickup,
};
use crate::game::weapons::WeaponType;

/// What a session task writes to the socket: either a JSON text frame or a
/// close frame with the spec'd code and reason.
#[derive(Debug, Clone)]
pub enum SessionFrame {
    Text(String),
    Close { code: u16, reason: &'static str },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    ConnectPlayer {
        name: Option<String>,
    },
    UpdatePlayerName {
        name: String,
    },
    CreateLobby {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "maxPlayers")]
        max_players: Option<usize>,
        #[serde(default, rename = "isPrivate")]
        is_private: Option<bool>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default, rename = "gameSettings")]
        game_settings: Option<GameSettingsPatch>,
    },
    JoinLobby {
        #[serde(rename = "lobbyId")]
        lobby_id: String,
        #[serde(default)]
        password: Option<String>,
    },
    LeaveLobby,
    SetReady {
        ready: bool,
    },
    PlayerInput(PlayerInput),
    ChatMessage {
        message: String,
    },
    GetLobbies,
    GetPlayerStats,
    UpdateLobbySettings {
        settings: GameSettingsPatch,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerInput {
    Direction { direction: Direction },
    UseWeapon,
}

const KNOWN_COMMANDS: [&str; 11] = [
    "connect_player",
    "update_player_name",
    "create_lobby",
    "join_lobby",
    "leave_lobby",
    "set_ready",
    "player_input",
    "chat_message",
    "get_lobbies",
    "get_player_stats",
    "update_lobby_settings",
];

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame is not a JSON object with a string `type`.
    InvalidFormat,
    /// Recognized command whose payload did not deserialize.
    BadPayload(String),
    /// Well-formed envelope with a type we do not serve.
    UnknownType(String),
}

pub fn decode_client_command(text: &str) -> Result<ClientCommand, DecodeError> {
    if let Ok(command) = serde_json::from_str::<ClientCommand>(text) {
        return Ok(command);
    }
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| DecodeError::InvalidFormat)?;
    let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
        return Err(DecodeError::InvalidFormat);
    };
    if KNOWN_COMMANDS.contains(&kind) {
        Err(DecodeError::BadPayload(kind.to_string()))
    } else {
        Err(DecodeError::UnknownType(kind.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPublic {
    pub id: String,
    pub name: String,
    pub color: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub is_alive: bool,
    pub is_ready: bool,
    pub weapon: Option<WeaponType>,
    pub games_played: u32,
    pub games_won: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGameView {
    pub id: String,
    pub name: String,
    pub color: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub is_alive: bool,
    pub weapon: Option<WeaponType>,
    pub snake: Vec<Position>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: Vec<PlayerGameView>,
    pub food: Vec<FoodItem>,
    pub weapons: Vec<WeaponPickup>,
    pub game_time: i64,
    pub board_size: i32,
}

/// Row in the public lobby browser; only `waiting` public lobbies appear.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    pub id: String,
    pub name: String,
    pub players: usize,
    pub max_players: usize,
    pub game_state: GameState,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyDetail {
    pub id: String,
    pub name: String,
    pub players: Vec<PlayerPublic>,
    pub max_players: usize,
    pub is_private: bool,
    pub created_by: String,
    pub game_state: GameState,
    pub settings: GameSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub score: u32,
    pub kills: u32,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub duration: i64,
    pub total_kills: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsView {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub games_played: u32,
    pub games_won: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatsView {
    pub total_players: usize,
    pub total_lobbies: usize,
    pub active_games: usize,
    pub uptime: u64,
    pub memory_usage: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Welcome {
        message: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    PlayerInfo {
        player: PlayerPublic,
    },
    ConnectionConfirmed {
        #[serde(rename = "playerId")]
        player_id: String,
        name: String,
    },
    LobbiesList {
        lobbies: Vec<LobbyInfo>,
    },
    LobbyCreated {
        lobby: LobbyDetail,
    },
    LobbyJoined {
        lobby: LobbyDetail,
    },
    LobbyLeft {
        #[serde(rename = "lobbyId")]
        lobby_id: String,
    },
    LobbyReset {
        lobby: LobbyDetail,
    },
    LobbySettingsUpdated {
        settings: GameSettings,
    },
    PlayerJoined {
        player: PlayerPublic,
        #[serde(rename = "playerCount")]
        player_count: usize,
    },
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: String,
        name: String,
        #[serde(rename = "newCreator")]
        new_creator: Option<String>,
    },
    PlayerReadyChanged {
        #[serde(rename = "playerId")]
        player_id: String,
        ready: bool,
        #[serde(rename = "readyCount")]
        ready_count: usize,
        #[serde(rename = "totalCount")]
        total_count: usize,
    },
    PlayerNameChanged {
        #[serde(rename = "playerId")]
        player_id: String,
        name: String,
    },
    GameStarting {
        countdown: u32,
    },
    Countdown {
        count: u32,
    },
    GameStarted,
    GameUpdate {
        #[serde(rename = "gameState")]
        game_state: GameSnapshot,
    },
    GameEnded {
        winner: Option<PlayerPublic>,
        rankings: Vec<RankingEntry>,
        #[serde(rename = "gameStats")]
        game_stats: GameStats,
    },
    Killed {
        by: Option<String>,
    },
    KillAwarded {
        victim: String,
        points: u32,
    },
    WeaponAcquired {
        weapon: WeaponType,
        name: &'static str,
    },
    ChatMessage {
        #[serde(rename = "playerId")]
        player_id: String,
        name: String,
        message: String,
        timestamp: i64,
    },
    NameUpdated {
        name: String,
    },
    PlayerStats {
        player: PlayerStatsView,
        server: ServerStatsView,
    },
    ServerShutdown {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|error| {
            tracing::error!(?error, "outbound event serialization failed");
            "{\"type\":\"error\",\"message\":\"Internal error\"}".to_string()
        })
    }
}
