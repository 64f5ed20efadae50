//! Process-wide session registry and command router. All player and lobby
//! state lives behind one mutex; timer-driven work (auto-start, countdown,
//! tick loops, post-game reset, idle sweep) is expressed as [`Followup`]
//! values that the manager turns into spawned tasks, each of which
//! re-validates its lobby's epoch and state before acting.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::app::time::now_millis;
use crate::game::constants::{
    AUTO_START_DELAY_MS, CLOSE_NORMAL, CLOSE_REASON_INACTIVE, CLOSE_REASON_MANUAL, COLOR_POOL,
    COUNTDOWN_FROM, COUNTDOWN_STEP_MS, DEFAULT_MAX_PLAYERS, IDLE_TIMEOUT_MS,
    LOBBY_RESET_DELAY_MS, MAX_CHAT_LENGTH, MAX_PLAYERS_MAX, MAX_PLAYERS_MIN, OUTBOUND_CAPACITY,
    SWEEP_INTERVAL_MS,
};
use crate::game::lobby::Lobby;
use crate::game::types::{GameSettings, GameSettingsPatch, GameState, Player, Players};
use crate::protocol::{
    decode_client_command, ClientCommand, DecodeError, LobbyInfo, PlayerInput, PlayerStatsView,
    ServerEvent, ServerStatsView, SessionFrame,
};
use crate::shared::names::{is_valid_player_name, sanitize_player_name};

#[cfg(test)]
mod tests;

/// Deferred work produced by a state mutation, scheduled outside the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    /// Re-check `can_start_game` after the 2 s grace delay.
    AutoStart { lobby_id: String },
    /// Drive the per-second countdown for the game started at `epoch`.
    Countdown { lobby_id: String, epoch: u64 },
    /// Run the simulation at `period_ms` while the epoch stays current.
    TickLoop {
        lobby_id: String,
        epoch: u64,
        period_ms: u64,
    },
    /// Return the lobby to `waiting` 10 s after the game ended.
    Reset { lobby_id: String, epoch: u64 },
}

#[derive(Debug)]
pub enum TickStatus {
    Continue,
    Ended(Followup),
    Stopped,
}

/// Handed to the transport task for a freshly opened socket.
pub struct SessionIo {
    pub player_id: String,
    pub outbound: mpsc::Receiver<SessionFrame>,
}

pub struct SessionManager {
    state: Mutex<ServerState>,
    started_at: Instant,
}

pub struct ServerState {
    pub players: Players,
    pub lobbies: HashMap<String, Lobby>,
    next_color: usize,
    started_at_ms: i64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::new(now_millis())),
            started_at: Instant::now(),
        }
    }

    pub async fn open_session(&self) -> SessionIo {
        let mut state = self.state.lock().await;
        let mut rng = rand::thread_rng();
        state.add_session(now_millis(), &mut rng)
    }

    pub async fn close_session(self: &Arc<Self>, player_id: &str) {
        let followups = {
            let mut state = self.state.lock().await;
            state.drop_session(player_id, now_millis())
        };
        for followup in followups {
            self.schedule(followup);
        }
    }

    /// One inbound text frame: bump activity, decode, dispatch.
    pub async fn handle_frame(self: &Arc<Self>, player_id: &str, text: &str) {
        let uptime = self.started_at.elapsed().as_secs();
        let followups = {
            let mut state = self.state.lock().await;
            let now = now_millis();
            if let Some(player) = state.players.get_mut(player_id) {
                player.touch(now);
            }
            match decode_client_command(text) {
                Ok(command) => {
                    let mut rng = rand::thread_rng();
                    state.handle_command(player_id, command, now, uptime, &mut rng)
                }
                Err(DecodeError::InvalidFormat) => {
                    state.reply_error(player_id, "Invalid message format");
                    Vec::new()
                }
                Err(DecodeError::BadPayload(kind)) => {
                    state.reply_error(player_id, &format!("Invalid payload for {kind}"));
                    Vec::new()
                }
                Err(DecodeError::UnknownType(kind)) => {
                    state.reply_error(player_id, &format!("Unknown message type: {kind}"));
                    Vec::new()
                }
            }
        };
        for followup in followups {
            self.schedule(followup);
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let followups = {
                    let mut state = manager.state.lock().await;
                    state.sweep(now_millis())
                };
                for followup in followups {
                    manager.schedule(followup);
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shutdown_all();
        tracing::info!("server shutdown broadcast sent");
    }

    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.players.len(), state.lobbies.len())
    }

    fn schedule(self: &Arc<Self>, followup: Followup) {
        let manager = Arc::clone(self);
        match followup {
            Followup::AutoStart { lobby_id } => {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(AUTO_START_DELAY_MS)).await;
                    let next = {
                        let mut state = manager.state.lock().await;
                        let mut rng = rand::thread_rng();
                        state.try_auto_start(&lobby_id, now_millis(), &mut rng)
                    };
                    for followup in next {
                        manager.schedule(followup);
                    }
                });
            }
            Followup::Countdown { lobby_id, epoch } => {
                tokio::spawn(async move {
                    for count in (1..COUNTDOWN_FROM).rev() {
                        tokio::time::sleep(Duration::from_millis(COUNTDOWN_STEP_MS)).await;
                        let live = {
                            let mut state = manager.state.lock().await;
                            state.countdown_step(&lobby_id, epoch, count)
                        };
                        if !live {
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(COUNTDOWN_STEP_MS)).await;
                    let next = {
                        let mut state = manager.state.lock().await;
                        let mut rng = rand::thread_rng();
                        state.begin_play(&lobby_id, epoch, &mut rng)
                    };
                    if let Some(followup) = next {
                        manager.schedule(followup);
                    }
                });
            }
            Followup::TickLoop {
                lobby_id,
                epoch,
                period_ms,
            } => {
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    // The first interval tick completes immediately.
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        let status = {
                            let mut state = manager.state.lock().await;
                            let mut rng = rand::thread_rng();
                            state.tick_lobby(&lobby_id, epoch, now_millis(), &mut rng)
                        };
                        match status {
                            TickStatus::Continue => {}
                            TickStatus::Ended(followup) => {
                                manager.schedule(followup);
                                return;
                            }
                            TickStatus::Stopped => return,
                        }
                    }
                });
            }
            Followup::Reset { lobby_id, epoch } => {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(LOBBY_RESET_DELAY_MS)).await;
                    let mut state = manager.state.lock().await;
                    state.reset_lobby(&lobby_id, epoch);
                });
            }
        }
    }
}

impl ServerState {
    pub fn new(now: i64) -> Self {
        Self {
            players: HashMap::new(),
            lobbies: HashMap::new(),
            next_color: 0,
            started_at_ms: now,
        }
    }

    pub fn add_session(&mut self, now: i64, rng: &mut impl Rng) -> SessionIo {
        let player_id = Uuid::new_v4().to_string();
        let name = format!("Player{}", rng.gen_range(1000..10000));
        let color = COLOR_POOL[self.next_color % COLOR_POOL.len()].to_string();
        self.next_color = self.next_color.wrapping_add(1);
        let (sink, outbound) = mpsc::channel(OUTBOUND_CAPACITY);
        let player = Player::new(player_id.clone(), name, color, sink, now);
        let welcome = ServerEvent::Welcome {
            message: "Connected to snake-arena server".to_string(),
            player_id: player_id.clone(),
        };
        let _ = player.sink.try_send(SessionFrame::Text(welcome.to_json()));
        let info = ServerEvent::PlayerInfo {
            player: player.public_info(),
        };
        let _ = player.sink.try_send(SessionFrame::Text(info.to_json()));
        self.players.insert(player_id.clone(), player);
        tracing::info!(player_id = %player_id, "session opened");
        SessionIo { player_id, outbound }
    }

    /// Removes a session entirely: lobby membership first (with the usual
    /// departure broadcasts and possible game end), then the registry entry.
    pub fn drop_session(&mut self, player_id: &str, now: i64) -> Vec<Followup> {
        let mut followups = Vec::new();
        if let Some(lobby_id) = self
            .players
            .get(player_id)
            .and_then(|player| player.lobby_id.clone())
        {
            if let Some(lobby) = self.lobbies.get_mut(&lobby_id) {
                if lobby.remove_player(&mut self.players, player_id, now) {
                    followups.push(Followup::Reset {
                        lobby_id: lobby_id.clone(),
                        epoch: lobby.epoch,
                    });
                }
                if lobby.members.is_empty() {
                    self.lobbies.remove(&lobby_id);
                    tracing::info!(lobby_id = %lobby_id, "empty lobby removed");
                }
            }
        }
        if self.players.remove(player_id).is_some() {
            tracing::info!(player_id, "session closed");
        }
        followups
    }

    pub fn handle_command(
        &mut self,
        player_id: &str,
        command: ClientCommand,
        now: i64,
        uptime_secs: u64,
        rng: &mut impl Rng,
    ) -> Vec<Followup> {
        match command {
            ClientCommand::ConnectPlayer { name } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    // An out-of-range name keeps the current one.
                    if let Some(requested) = name {
                        if is_valid_player_name(&requested) {
                            player.name = requested;
                        }
                    }
                    let event = ServerEvent::ConnectionConfirmed {
                        player_id: player.id.clone(),
                        name: player.name.clone(),
                    };
                    let _ = player.sink.try_send(SessionFrame::Text(event.to_json()));
                }
                Vec::new()
            }
            ClientCommand::UpdatePlayerName { name } => {
                self.update_player_name(player_id, &name);
                Vec::new()
            }
            ClientCommand::CreateLobby {
                name,
                max_players,
                is_private,
                password,
                game_settings,
            } => {
                self.create_lobby(player_id, name, max_players, is_private, password, game_settings, now);
                Vec::new()
            }
            ClientCommand::JoinLobby { lobby_id, password } => {
                self.join_lobby(player_id, &lobby_id, password.as_deref());
                Vec::new()
            }
            ClientCommand::LeaveLobby => self.leave_lobby(player_id, now),
            ClientCommand::SetReady { ready } => self.set_ready(player_id, ready),
            ClientCommand::PlayerInput(input) => {
                self.player_input(player_id, input, now, rng);
                Vec::new()
            }
            ClientCommand::ChatMessage { message } => {
                self.chat_message(player_id, &message, now);
                Vec::new()
            }
            ClientCommand::GetLobbies => {
                let mut lobbies: Vec<LobbyInfo> = self
                    .lobbies
                    .values()
                    .filter(|lobby| !lobby.is_private && lobby.game_state == GameState::Waiting)
                    .map(Lobby::info)
                    .collect();
                lobbies.sort_by_key(|info| info.created_at);
                Lobby::send_to(&self.players, player_id, &ServerEvent::LobbiesList { lobbies });
                Vec::new()
            }
            ClientCommand::GetPlayerStats => {
                self.send_player_stats(player_id, now, uptime_secs);
                Vec::new()
            }
            ClientCommand::UpdateLobbySettings { settings } => {
                self.update_lobby_settings(player_id, &settings);
                Vec::new()
            }
        }
    }

    fn update_player_name(&mut self, player_id: &str, requested: &str) {
        if !is_valid_player_name(requested) {
            self.reply_error(player_id, "Invalid name");
            return;
        }
        let cleaned = requested.to_string();
        let lobby_id = match self.players.get_mut(player_id) {
            Some(player) => {
                player.name = cleaned.clone();
                player.lobby_id.clone()
            }
            None => return,
        };
        Lobby::send_to(
            &self.players,
            player_id,
            &ServerEvent::NameUpdated { name: cleaned.clone() },
        );
        if let Some(lobby_id) = lobby_id {
            if let Some((lobby, players)) = self.lobby_and_players(&lobby_id) {
                lobby.broadcast(
                    players,
                    &ServerEvent::PlayerNameChanged {
                        player_id: player_id.to_string(),
                        name: cleaned,
                    },
                    Some(player_id),
                );
            }
        }
    }

    fn create_lobby(
        &mut self,
        player_id: &str,
        name: Option<String>,
        max_players: Option<usize>,
        is_private: Option<bool>,
        password: Option<String>,
        patch: Option<GameSettingsPatch>,
        now: i64,
    ) {
        let Some(player) = self.players.get(player_id) else {
            return;
        };
        if player.lobby_id.is_some() {
            self.reply_error(player_id, "Already in a lobby");
            return;
        }
        let lobby_name = name
            .map(|value| sanitize_player_name(&value, ""))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("{}'s game", player.name));
        let max_players = max_players
            .unwrap_or(DEFAULT_MAX_PLAYERS)
            .clamp(MAX_PLAYERS_MIN, MAX_PLAYERS_MAX);
        let lobby_id = Uuid::new_v4().to_string();
        let mut lobby = Lobby::new(
            lobby_id.clone(),
            lobby_name,
            player_id.to_string(),
            max_players,
            is_private.unwrap_or(false),
            password.filter(|value| !value.is_empty()),
            GameSettings::with_patch(patch.as_ref()),
            now,
        );
        if let Err(message) = lobby.add_player(&mut self.players, player_id) {
            self.reply_error(player_id, message);
            return;
        }
        let detail = lobby.detail(&self.players);
        tracing::info!(lobby_id = %lobby_id, created_by = player_id, "lobby created");
        self.lobbies.insert(lobby_id, lobby);
        Lobby::send_to(&self.players, player_id, &ServerEvent::LobbyCreated { lobby: detail });
    }

    fn join_lobby(&mut self, player_id: &str, lobby_id: &str, password: Option<&str>) {
        match self.players.get(player_id) {
            Some(player) if player.lobby_id.is_some() => {
                self.reply_error(player_id, "Already in a lobby");
                return;
            }
            Some(_) => {}
            None => return,
        }
        let Some(lobby) = self.lobbies.get(lobby_id) else {
            self.reply_error(player_id, "Lobby not found");
            return;
        };
        if lobby.is_private && lobby.password.as_deref() != password {
            self.reply_error(player_id, "Invalid password");
            return;
        }
        let Some((lobby, players)) = self.lobby_and_players(lobby_id) else {
            return;
        };
        match lobby.add_player(players, player_id) {
            Ok(()) => {
                let detail = lobby.detail(players);
                Lobby::send_to(players, player_id, &ServerEvent::LobbyJoined { lobby: detail });
            }
            Err(message) => {
                Lobby::send_to(
                    players,
                    player_id,
                    &ServerEvent::Error {
                        message: message.to_string(),
                    },
                );
            }
        }
    }

    fn leave_lobby(&mut self, player_id: &str, now: i64) -> Vec<Followup> {
        let Some(lobby_id) = self
            .players
            .get(player_id)
            .and_then(|player| player.lobby_id.clone())
        else {
            self.reply_error(player_id, "Not in a lobby");
            return Vec::new();
        };
        let mut followups = Vec::new();
        if let Some(lobby) = self.lobbies.get_mut(&lobby_id) {
            if lobby.remove_player(&mut self.players, player_id, now) {
                followups.push(Followup::Reset {
                    lobby_id: lobby_id.clone(),
                    epoch: lobby.epoch,
                });
            }
            if lobby.members.is_empty() {
                self.lobbies.remove(&lobby_id);
                tracing::info!(lobby_id = %lobby_id, "empty lobby removed");
            }
        }
        Lobby::send_to(
            &self.players,
            player_id,
            &ServerEvent::LobbyLeft { lobby_id },
        );
        followups
    }

    fn set_ready(&mut self, player_id: &str, ready: bool) -> Vec<Followup> {
        let Some(lobby_id) = self
            .players
            .get(player_id)
            .and_then(|player| player.lobby_id.clone())
        else {
            self.reply_error(player_id, "Not in a lobby");
            return Vec::new();
        };
        let Some((lobby, players)) = self.lobby_and_players(&lobby_id) else {
            return Vec::new();
        };
        lobby.set_ready(players, player_id, ready);
        if lobby.can_start_game(players) {
            vec![Followup::AutoStart { lobby_id }]
        } else {
            Vec::new()
        }
    }

    fn player_input(&mut self, player_id: &str, input: PlayerInput, now: i64, rng: &mut impl Rng) {
        let Some(lobby_id) = self
            .players
            .get(player_id)
            .and_then(|player| player.lobby_id.clone())
        else {
            self.reply_error(player_id, "Not in a lobby");
            return;
        };
        let Some((lobby, players)) = self.lobby_and_players(&lobby_id) else {
            return;
        };
        if lobby.game_state != GameState::Playing {
            // Input raced the countdown or the game end; not worth an error.
            return;
        }
        match input {
            PlayerInput::Direction { direction } => {
                lobby.handle_direction(players, player_id, direction);
            }
            PlayerInput::UseWeapon => {
                lobby.use_weapon(players, player_id, now, rng);
            }
        }
    }

    fn chat_message(&mut self, player_id: &str, message: &str, now: i64) {
        let Some(lobby_id) = self
            .players
            .get(player_id)
            .and_then(|player| player.lobby_id.clone())
        else {
            self.reply_error(player_id, "Not in a lobby");
            return;
        };
        let trimmed: String = message.trim().chars().take(MAX_CHAT_LENGTH).collect();
        if trimmed.is_empty() {
            return;
        }
        let name = self
            .players
            .get(player_id)
            .map(|player| player.name.clone())
            .unwrap_or_default();
        if let Some((lobby, players)) = self.lobby_and_players(&lobby_id) {
            lobby.broadcast(
                players,
                &ServerEvent::ChatMessage {
                    player_id: player_id.to_string(),
                    name,
                    message: trimmed,
                    timestamp: now,
                },
                None,
            );
        }
    }

    fn update_lobby_settings(&mut self, player_id: &str, patch: &GameSettingsPatch) {
        let Some(lobby_id) = self
            .players
            .get(player_id)
            .and_then(|player| player.lobby_id.clone())
        else {
            self.reply_error(player_id, "Not in a lobby");
            return;
        };
        let Some((lobby, players)) = self.lobby_and_players(&lobby_id) else {
            return;
        };
        if lobby.created_by != player_id {
            Lobby::send_to(
                players,
                player_id,
                &ServerEvent::Error {
                    message: "Only the lobby creator can change settings".to_string(),
                },
            );
            return;
        }
        if lobby.game_state != GameState::Waiting {
            Lobby::send_to(
                players,
                player_id,
                &ServerEvent::Error {
                    message: "Settings are locked once a game has started".to_string(),
                },
            );
            return;
        }
        lobby.settings.apply(patch);
        let settings = lobby.settings.clone();
        lobby.broadcast(players, &ServerEvent::LobbySettingsUpdated { settings }, None);
    }

    fn send_player_stats(&self, player_id: &str, now: i64, uptime_secs: u64) {
        let Some(player) = self.players.get(player_id) else {
            return;
        };
        let event = ServerEvent::PlayerStats {
            player: PlayerStatsView {
                id: player.id.clone(),
                name: player.name.clone(),
                score: player.score,
                kills: player.kills,
                deaths: player.deaths,
                games_played: player.games_played,
                games_won: player.games_won,
            },
            server: self.server_stats(now, uptime_secs),
        };
        Lobby::send_to(&self.players, player_id, &event);
    }

    pub fn server_stats(&self, now: i64, uptime_secs: u64) -> ServerStatsView {
        // Fall back to wall-clock uptime for callers without an Instant.
        let uptime = if uptime_secs > 0 {
            uptime_secs
        } else {
            ((now - self.started_at_ms).max(0) / 1000) as u64
        };
        ServerStatsView {
            total_players: self.players.len(),
            total_lobbies: self.lobbies.len(),
            active_games: self
                .lobbies
                .values()
                .filter(|lobby| lobby.game_state == GameState::Playing)
                .count(),
            uptime,
            memory_usage: memory_usage_bytes(),
        }
    }

    /// The 2 s auto-start grace period elapsed; start only if the lobby is
    /// still ready to go.
    pub fn try_auto_start(&mut self, lobby_id: &str, now: i64, rng: &mut impl Rng) -> Vec<Followup> {
        let Some((lobby, players)) = self.lobby_and_players(lobby_id) else {
            return Vec::new();
        };
        if !lobby.can_start_game(players) {
            return Vec::new();
        }
        lobby.begin_countdown(players, now, rng);
        tracing::info!(lobby_id, "game countdown started");
        vec![Followup::Countdown {
            lobby_id: lobby_id.to_string(),
            epoch: lobby.epoch,
        }]
    }

    /// One per-second countdown announcement. Returns false when the lobby is
    /// gone or the countdown was superseded, telling the driver to stop.
    pub fn countdown_step(&mut self, lobby_id: &str, epoch: u64, count: u32) -> bool {
        let Some((lobby, players)) = self.lobby_and_players(lobby_id) else {
            return false;
        };
        if lobby.epoch != epoch || lobby.game_state != GameState::Starting {
            return false;
        }
        lobby.broadcast(players, &ServerEvent::Countdown { count }, None);
        true
    }

    pub fn begin_play(&mut self, lobby_id: &str, epoch: u64, rng: &mut impl Rng) -> Option<Followup> {
        let Some((lobby, players)) = self.lobby_and_players(lobby_id) else {
            return None;
        };
        if lobby.epoch != epoch || lobby.game_state != GameState::Starting {
            return None;
        }
        lobby.begin_play(players, rng);
        tracing::info!(lobby_id, "game started");
        Some(Followup::TickLoop {
            lobby_id: lobby_id.to_string(),
            epoch: lobby.epoch,
            period_ms: lobby.settings.game_speed,
        })
    }

    pub fn tick_lobby(&mut self, lobby_id: &str, epoch: u64, now: i64, rng: &mut impl Rng) -> TickStatus {
        let Some((lobby, players)) = self.lobby_and_players(lobby_id) else {
            return TickStatus::Stopped;
        };
        if lobby.epoch != epoch || lobby.game_state != GameState::Playing {
            return TickStatus::Stopped;
        }
        if lobby.tick(players, now, rng) {
            TickStatus::Ended(Followup::Reset {
                lobby_id: lobby_id.to_string(),
                epoch: lobby.epoch,
            })
        } else {
            TickStatus::Continue
        }
    }

    pub fn reset_lobby(&mut self, lobby_id: &str, epoch: u64) {
        let Some((lobby, players)) = self.lobby_and_players(lobby_id) else {
            return;
        };
        if lobby.epoch != epoch || lobby.game_state != GameState::Finished {
            return;
        }
        lobby.reset(players);
        tracing::info!(lobby_id, "lobby reset to waiting");
    }

    /// Periodic cleanup: evict sessions idle past the timeout and drop any
    /// lobbies left empty.
    pub fn sweep(&mut self, now: i64) -> Vec<Followup> {
        let idle: Vec<String> = self
            .players
            .iter()
            .filter(|(_, player)| now - player.last_activity > IDLE_TIMEOUT_MS)
            .map(|(id, _)| id.clone())
            .collect();
        let mut followups = Vec::new();
        for player_id in idle {
            if let Some(player) = self.players.get(&player_id) {
                let _ = player.sink.try_send(SessionFrame::Close {
                    code: CLOSE_NORMAL,
                    reason: CLOSE_REASON_INACTIVE,
                });
            }
            tracing::info!(player_id = %player_id, "evicting idle session");
            followups.extend(self.drop_session(&player_id, now));
        }
        let empty: Vec<String> = self
            .lobbies
            .iter()
            .filter(|(_, lobby)| lobby.members.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for lobby_id in empty {
            self.lobbies.remove(&lobby_id);
            tracing::info!(lobby_id = %lobby_id, "empty lobby swept");
        }
        followups
    }

    /// Announces shutdown to every session, closes them and halts every
    /// running game so no tick task survives validation.
    pub fn shutdown_all(&mut self) {
        let payload = ServerEvent::ServerShutdown {
            message: "Server shutting down".to_string(),
        }
        .to_json();
        for player in self.players.values() {
            let _ = player.sink.try_send(SessionFrame::Text(payload.clone()));
            let _ = player.sink.try_send(SessionFrame::Close {
                code: CLOSE_NORMAL,
                reason: CLOSE_REASON_MANUAL,
            });
        }
        for lobby in self.lobbies.values_mut() {
            if lobby.game_state == GameState::Playing {
                lobby.game_state = GameState::Finished;
                lobby.epoch += 1;
            }
        }
    }

    fn lobby_and_players(&mut self, lobby_id: &str) -> Option<(&mut Lobby, &mut Players)> {
        let lobby = self.lobbies.get_mut(lobby_id)?;
        Some((lobby, &mut self.players))
    }

    fn reply_error(&self, player_id: &str, message: &str) {
        Lobby::send_to(
            &self.players,
            player_id,
            &ServerEvent::Error {
                message: message.to_string(),
            },
        );
    }
}

fn memory_usage_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|contents| contents.split_whitespace().nth(1)?.parse::<u64>().ok())
        .map(|pages| pages * 4096)
        .unwrap_or(0)
}
