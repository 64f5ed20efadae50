use super::*;
use crate::game::types::Position;
use crate::protocol::SessionFrame;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn setup() -> (ServerState, StdRng) {
    (ServerState::new(0), StdRng::seed_from_u64(7))
}

fn open(state: &mut ServerState, rng: &mut StdRng) -> (String, mpsc::Receiver<SessionFrame>) {
    let io = state.add_session(0, rng);
    (io.player_id, io.outbound)
}

fn drain(rx: &mut mpsc::Receiver<SessionFrame>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let SessionFrame::Text(text) = frame {
            events.push(serde_json::from_str(&text).unwrap());
        }
    }
    events
}

fn close_reason(rx: &mut mpsc::Receiver<SessionFrame>) -> Option<&'static str> {
    while let Ok(frame) = rx.try_recv() {
        if let SessionFrame::Close { reason, .. } = frame {
            return Some(reason);
        }
    }
    None
}

fn event_of<'a>(events: &'a [serde_json::Value], kind: &str) -> Option<&'a serde_json::Value> {
    events.iter().find(|event| event["type"] == kind)
}

fn command(state: &mut ServerState, rng: &mut StdRng, player_id: &str, command: ClientCommand) -> Vec<Followup> {
    state.handle_command(player_id, command, 0, 1, rng)
}

fn create_default_lobby(state: &mut ServerState, rng: &mut StdRng, player_id: &str) -> String {
    command(
        state,
        rng,
        player_id,
        ClientCommand::CreateLobby {
            name: None,
            max_players: None,
            is_private: None,
            password: None,
            game_settings: None,
        },
    );
    state
        .players
        .get(player_id)
        .and_then(|player| player.lobby_id.clone())
        .expect("creator joined their lobby")
}

fn start_game(state: &mut ServerState, rng: &mut StdRng, lobby_id: &str, member_ids: &[&str]) -> Followup {
    for id in member_ids {
        command(state, rng, id, ClientCommand::SetReady { ready: true });
    }
    let followups = state.try_auto_start(lobby_id, 0, rng);
    let Some(Followup::Countdown { epoch, .. }) = followups.first().cloned() else {
        panic!("countdown expected, got {followups:?}");
    };
    assert!(state.countdown_step(lobby_id, epoch, 2));
    assert!(state.countdown_step(lobby_id, epoch, 1));
    state
        .begin_play(lobby_id, epoch, rng)
        .expect("tick loop follows countdown")
}

#[test]
fn open_session_greets_with_welcome_and_player_info() {
    let (mut state, mut rng) = setup();
    let (id, mut rx) = open(&mut state, &mut rng);
    let events = drain(&mut rx);
    let welcome = event_of(&events, "welcome").expect("welcome frame");
    assert_eq!(welcome["playerId"], id.as_str());
    let info = event_of(&events, "player_info").expect("player_info frame");
    assert_eq!(info["player"]["id"], id.as_str());
    assert!(info["player"]["name"].as_str().unwrap().starts_with("Player"));
}

#[test]
fn connect_player_sets_name_or_keeps_default() {
    let (mut state, mut rng) = setup();
    let (id, mut rx) = open(&mut state, &mut rng);
    drain(&mut rx);

    command(
        &mut state,
        &mut rng,
        &id,
        ClientCommand::ConnectPlayer {
            name: Some("Ada".to_string()),
        },
    );
    let events = drain(&mut rx);
    assert_eq!(
        event_of(&events, "connection_confirmed").unwrap()["name"],
        "Ada"
    );

    // An out-of-range name is not coerced; the previous one stays.
    command(
        &mut state,
        &mut rng,
        &id,
        ClientCommand::ConnectPlayer {
            name: Some("x".repeat(25)),
        },
    );
    let events = drain(&mut rx);
    assert_eq!(
        event_of(&events, "connection_confirmed").unwrap()["name"],
        "Ada"
    );
}

#[test]
fn name_update_notifies_lobby_peers() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    let (b, mut rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id,
            password: None,
        },
    );
    drain(&mut rx_a);
    drain(&mut rx_b);

    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::UpdatePlayerName {
            name: "Grace".to_string(),
        },
    );
    let own = drain(&mut rx_b);
    assert_eq!(event_of(&own, "name_updated").unwrap()["name"], "Grace");
    let peer = drain(&mut rx_a);
    let changed = event_of(&peer, "player_name_changed").unwrap();
    assert_eq!(changed["playerId"], b.as_str());
    assert_eq!(changed["name"], "Grace");
}

#[test]
fn create_join_leave_lifecycle() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    let (b, mut rx_b) = open(&mut state, &mut rng);
    drain(&mut rx_a);
    drain(&mut rx_b);

    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    let events = drain(&mut rx_a);
    let created = event_of(&events, "lobby_created").expect("lobby_created");
    assert_eq!(created["lobby"]["createdBy"], a.as_str());

    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    let events = drain(&mut rx_b);
    assert_eq!(
        event_of(&events, "lobby_joined").unwrap()["lobby"]["players"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    let events = drain(&mut rx_a);
    assert!(event_of(&events, "player_joined").is_some());

    command(&mut state, &mut rng, &b, ClientCommand::LeaveLobby);
    let events = drain(&mut rx_b);
    assert_eq!(
        event_of(&events, "lobby_left").unwrap()["lobbyId"],
        lobby_id.as_str()
    );
    let events = drain(&mut rx_a);
    assert!(event_of(&events, "player_left").is_some());
    assert_eq!(state.lobbies.get(&lobby_id).unwrap().member_count(), 1);

    // Last member leaving removes the lobby immediately.
    command(&mut state, &mut rng, &a, ClientCommand::LeaveLobby);
    assert!(state.lobbies.is_empty());
}

#[test]
fn join_rejections_surface_as_errors() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    let (b, mut rx_b) = open(&mut state, &mut rng);
    drain(&mut rx_a);
    drain(&mut rx_b);

    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: "nope".to_string(),
            password: None,
        },
    );
    let events = drain(&mut rx_b);
    assert_eq!(event_of(&events, "error").unwrap()["message"], "Lobby not found");

    command(
        &mut state,
        &mut rng,
        &a,
        ClientCommand::CreateLobby {
            name: Some("secret".to_string()),
            max_players: None,
            is_private: Some(true),
            password: Some("hunter2".to_string()),
            game_settings: None,
        },
    );
    let lobby_id = state.players.get(&a).unwrap().lobby_id.clone().unwrap();

    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: Some("wrong".to_string()),
        },
    );
    let events = drain(&mut rx_b);
    assert_eq!(event_of(&events, "error").unwrap()["message"], "Invalid password");

    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: Some("hunter2".to_string()),
        },
    );
    assert_eq!(state.lobbies.get(&lobby_id).unwrap().member_count(), 2);

    // Double membership is refused.
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id,
            password: Some("hunter2".to_string()),
        },
    );
    let events = drain(&mut rx_b);
    assert_eq!(
        event_of(&events, "error").unwrap()["message"],
        "Already in a lobby"
    );
}

#[test]
fn lobby_listing_is_public_waiting_only() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let (c, _rx_c) = open(&mut state, &mut rng);
    let (d, mut rx_d) = open(&mut state, &mut rng);

    let public_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::CreateLobby {
            name: Some("hidden".to_string()),
            max_players: None,
            is_private: Some(true),
            password: None,
            game_settings: None,
        },
    );
    let busy_id = create_default_lobby(&mut state, &mut rng, &c);
    state.lobbies.get_mut(&busy_id).unwrap().game_state = GameState::Playing;

    drain(&mut rx_d);
    command(&mut state, &mut rng, &d, ClientCommand::GetLobbies);
    let events = drain(&mut rx_d);
    let listing = event_of(&events, "lobbies_list").unwrap();
    let rows = listing["lobbies"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], public_id.as_str());
}

#[test]
fn ready_flow_schedules_auto_start_and_recheck_cancels() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );

    command(&mut state, &mut rng, &a, ClientCommand::SetReady { ready: true });
    let followups = command(&mut state, &mut rng, &b, ClientCommand::SetReady { ready: true });
    assert_eq!(
        followups,
        vec![Followup::AutoStart {
            lobby_id: lobby_id.clone()
        }]
    );

    // Someone backs out before the 2 s timer fires; the re-check declines.
    command(&mut state, &mut rng, &b, ClientCommand::SetReady { ready: false });
    assert!(state.try_auto_start(&lobby_id, 0, &mut rng).is_empty());
    assert_eq!(
        state.lobbies.get(&lobby_id).unwrap().game_state,
        GameState::Waiting
    );

    // Ready again: the countdown begins and hands off to the tick loop.
    command(&mut state, &mut rng, &b, ClientCommand::SetReady { ready: true });
    let tick_loop = start_game(&mut state, &mut rng, &lobby_id, &[]);
    let Followup::TickLoop { period_ms, .. } = tick_loop else {
        panic!("expected tick loop");
    };
    assert_eq!(period_ms, 150);
    assert_eq!(
        state.lobbies.get(&lobby_id).unwrap().game_state,
        GameState::Playing
    );
}

#[test]
fn countdown_is_abandoned_when_superseded() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    command(&mut state, &mut rng, &a, ClientCommand::SetReady { ready: true });
    command(&mut state, &mut rng, &b, ClientCommand::SetReady { ready: true });
    let followups = state.try_auto_start(&lobby_id, 0, &mut rng);
    let Some(Followup::Countdown { epoch, .. }) = followups.first().cloned() else {
        panic!("countdown expected");
    };

    // The lobby empties mid-countdown; every later step is a no-op.
    state.drop_session(&a, 0);
    state.drop_session(&b, 0);
    assert!(!state.countdown_step(&lobby_id, epoch, 2));
    assert!(state.begin_play(&lobby_id, epoch, &mut rng).is_none());
}

#[test]
fn game_tick_runs_until_end_then_resets() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    let Followup::TickLoop { epoch, .. } = start_game(&mut state, &mut rng, &lobby_id, &[a.as_str(), b.as_str()])
    else {
        panic!("expected tick loop");
    };

    // Pin the snakes apart so the outcome below is input-driven.
    state.players.get_mut(&a).unwrap().snake =
        vec![Position::new(5, 5), Position::new(4, 5), Position::new(3, 5)];
    state.players.get_mut(&b).unwrap().snake = vec![
        Position::new(5, 15),
        Position::new(4, 15),
        Position::new(3, 15),
    ];

    assert!(matches!(
        state.tick_lobby(&lobby_id, epoch, 150, &mut rng),
        TickStatus::Continue
    ));

    // Kill one snake; the next tick ends the game and schedules the reset.
    state.players.get_mut(&a).unwrap().is_alive = false;
    let TickStatus::Ended(Followup::Reset {
        epoch: reset_epoch, ..
    }) = state.tick_lobby(&lobby_id, epoch, 300, &mut rng)
    else {
        panic!("expected game end");
    };
    assert_eq!(
        state.lobbies.get(&lobby_id).unwrap().game_state,
        GameState::Finished
    );

    // The now-stale tick epoch stops cleanly; the reset restores waiting.
    assert!(matches!(
        state.tick_lobby(&lobby_id, epoch, 450, &mut rng),
        TickStatus::Stopped
    ));
    state.reset_lobby(&lobby_id, reset_epoch);
    let lobby = state.lobbies.get(&lobby_id).unwrap();
    assert_eq!(lobby.game_state, GameState::Waiting);
    assert!(state.players.get(&b).unwrap().snake.is_empty());
    assert!(!state.players.get(&b).unwrap().is_ready);
}

#[test]
fn stale_reset_epoch_is_ignored() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    let stale_epoch = state.lobbies.get(&lobby_id).unwrap().epoch;
    start_game(&mut state, &mut rng, &lobby_id, &[a.as_str(), b.as_str()]);
    state.reset_lobby(&lobby_id, stale_epoch);
    assert_eq!(
        state.lobbies.get(&lobby_id).unwrap().game_state,
        GameState::Playing
    );
}

#[test]
fn idle_sessions_are_swept_with_inactive_close() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    let (b, mut rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    drain(&mut rx_a);
    drain(&mut rx_b);

    state.players.get_mut(&a).unwrap().last_activity = 0;
    state.players.get_mut(&b).unwrap().last_activity = IDLE_TIMEOUT_MS;
    state.sweep(IDLE_TIMEOUT_MS + 1);

    assert!(!state.players.contains_key(&a));
    assert!(state.players.contains_key(&b));
    assert_eq!(close_reason(&mut rx_a), Some(CLOSE_REASON_INACTIVE));

    let lobby = state.lobbies.get(&lobby_id).unwrap();
    assert_eq!(lobby.members, vec![b.clone()]);
    assert_eq!(lobby.created_by, b);
    let events = drain(&mut rx_b);
    assert_eq!(
        event_of(&events, "player_left").unwrap()["playerId"],
        a.as_str()
    );
}

#[test]
fn sweep_removes_empty_lobbies() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    // Simulate an emptied-but-not-removed room.
    state.lobbies.get_mut(&lobby_id).unwrap().members.clear();
    state.players.get_mut(&a).unwrap().lobby_id = None;

    state.sweep(1);
    assert!(state.lobbies.is_empty());
}

#[test]
fn disconnect_mid_game_ends_it_and_schedules_reset() {
    let (mut state, mut rng) = setup();
    let (a, _rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    start_game(&mut state, &mut rng, &lobby_id, &[a.as_str(), b.as_str()]);

    let followups = state.drop_session(&a, 1_000);
    assert!(matches!(followups.first(), Some(Followup::Reset { .. })));
    assert_eq!(
        state.lobbies.get(&lobby_id).unwrap().game_state,
        GameState::Finished
    );
    assert!(!state.players.contains_key(&a));
}

#[test]
fn settings_update_is_creator_only_and_waiting_only() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    let (b, mut rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    drain(&mut rx_a);
    drain(&mut rx_b);

    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::UpdateLobbySettings {
            settings: GameSettingsPatch {
                board_size: Some(30),
                ..Default::default()
            },
        },
    );
    let events = drain(&mut rx_b);
    assert!(event_of(&events, "error").is_some());
    assert_eq!(state.lobbies.get(&lobby_id).unwrap().settings.board_size, 20);

    command(
        &mut state,
        &mut rng,
        &a,
        ClientCommand::UpdateLobbySettings {
            settings: GameSettingsPatch {
                board_size: Some(30),
                game_speed: Some(9_999),
                ..Default::default()
            },
        },
    );
    let lobby = state.lobbies.get(&lobby_id).unwrap();
    assert_eq!(lobby.settings.board_size, 30);
    assert_eq!(lobby.settings.game_speed, 500, "clamped to the maximum");
    let events = drain(&mut rx_b);
    assert!(event_of(&events, "lobby_settings_updated").is_some());
}

#[test]
fn player_stats_include_server_totals() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    create_default_lobby(&mut state, &mut rng, &a);
    drain(&mut rx_a);

    command(&mut state, &mut rng, &a, ClientCommand::GetPlayerStats);
    let events = drain(&mut rx_a);
    let stats = event_of(&events, "player_stats").unwrap();
    assert_eq!(stats["player"]["id"], a.as_str());
    assert_eq!(stats["server"]["totalPlayers"], 1);
    assert_eq!(stats["server"]["totalLobbies"], 1);
    assert_eq!(stats["server"]["activeGames"], 0);
}

#[test]
fn shutdown_broadcasts_and_stops_games() {
    let (mut state, mut rng) = setup();
    let (a, mut rx_a) = open(&mut state, &mut rng);
    let (b, _rx_b) = open(&mut state, &mut rng);
    let lobby_id = create_default_lobby(&mut state, &mut rng, &a);
    command(
        &mut state,
        &mut rng,
        &b,
        ClientCommand::JoinLobby {
            lobby_id: lobby_id.clone(),
            password: None,
        },
    );
    start_game(&mut state, &mut rng, &lobby_id, &[a.as_str(), b.as_str()]);
    drain(&mut rx_a);

    state.shutdown_all();
    let mut saw_shutdown = false;
    let mut close = None;
    while let Ok(frame) = rx_a.try_recv() {
        match frame {
            SessionFrame::Text(text) => {
                let event: serde_json::Value = serde_json::from_str(&text).unwrap();
                if event["type"] == "server_shutdown" {
                    saw_shutdown = true;
                }
            }
            SessionFrame::Close { reason, .. } => close = Some(reason),
        }
    }
    assert!(saw_shutdown);
    assert_eq!(close, Some(CLOSE_REASON_MANUAL));
    assert_ne!(
        state.lobbies.get(&lobby_id).unwrap().game_state,
        GameState::Playing
    );
}

#[tokio::test]
async fn malformed_frames_get_an_error_and_stay_connected() {
    let manager = Arc::new(SessionManager::new());
    let session = manager.open_session().await;
    let player_id = session.player_id.clone();
    let mut rx = session.outbound;
    drain(&mut rx);

    manager.handle_frame(&player_id, "{{nope").await;
    let events = drain(&mut rx);
    assert_eq!(
        event_of(&events, "error").unwrap()["message"],
        "Invalid message format"
    );

    manager
        .handle_frame(&player_id, r#"{"type":"warp_drive"}"#)
        .await;
    let events = drain(&mut rx);
    assert_eq!(
        event_of(&events, "error").unwrap()["message"],
        "Unknown message type: warp_drive"
    );

    // The session is still registered and serviceable.
    manager.handle_frame(&player_id, r#"{"type":"get_lobbies"}"#).await;
    let events = drain(&mut rx);
    assert!(event_of(&events, "lobbies_list").is_some());
}
