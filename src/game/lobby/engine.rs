//! Per-lobby simulation step: movement, collision resolution, item spawning
//! and the win check, in a fixed order. Runs under the session manager's
//! lock, once per `game_speed` interval while the lobby is playing.

use rand::Rng;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::Lobby;
use crate::game::constants::{
    FOOD_BOMB_COUNT, FOOD_BOMB_RADIUS, FOOD_SPAWN_CHANCE, FOOD_VALUE, KILL_SCORE,
    WEAPON_SPAWN_CHANCE,
};
use crate::game::types::{Direction, FoodItem, Players, Position, WinCondition};
use crate::game::weapons::{self, WeaponType};
use crate::protocol::{GameSnapshot, PlayerGameView, ServerEvent};

impl Lobby {
    /// One simulation step. Returns true when the win condition fired and the
    /// game ended; the end-of-game broadcast replaces this tick's snapshot.
    pub fn tick(&mut self, players: &mut Players, now: i64, rng: &mut impl Rng) -> bool {
        for id in &self.members {
            if let Some(player) = players.get_mut(id) {
                player.effects.expire(now);
            }
        }

        self.run_movement(players);

        if rng.gen_bool(FOOD_SPAWN_CHANCE) {
            self.try_spawn_food(players, rng);
        }
        if self.settings.weapons_enabled && rng.gen_bool(WEAPON_SPAWN_CHANCE) {
            self.try_spawn_weapon(players, rng);
        }

        let won = match self.settings.win_condition {
            WinCondition::LastStanding => self.alive_count(players) <= 1,
            WinCondition::TimeLimit => self
                .game_start_time
                .is_some_and(|start| now - start >= self.settings.max_game_time),
        };
        if won {
            self.end_game(players, now);
            return true;
        }

        let snapshot = self.game_snapshot(players, now);
        self.broadcast(players, &ServerEvent::GameUpdate { game_state: snapshot }, None);
        false
    }

    /// Applied on receipt, not deferred to the next tick. A later accepted
    /// update overwrites an earlier one, so at most one net change per tick.
    pub fn handle_direction(&self, players: &mut Players, player_id: &str, direction: Direction) {
        if !direction.is_unit_axis() {
            return;
        }
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        if !player.is_alive || direction.reverses(player.direction) {
            return;
        }
        player.direction = direction;
    }

    pub fn use_weapon(&mut self, players: &mut Players, player_id: &str, now: i64, rng: &mut impl Rng) {
        let kind = match players.get_mut(player_id) {
            Some(player) if !player.is_alive => return,
            Some(player) => match player.weapon.take() {
                Some(kind) => {
                    if weapons::apply_timed_effect(player, kind, now) {
                        return;
                    }
                    kind
                }
                None => return,
            },
            None => return,
        };
        match kind {
            WeaponType::FoodBomb => self.detonate_food_bomb(players, player_id),
            WeaponType::Teleport => self.teleport_player(players, player_id, rng),
            // Reserved kinds: activation consumes the weapon, nothing else.
            _ => {}
        }
    }

    /// Each player banks `speed_multiplier` into a fractional budget and
    /// spends the whole steps this tick, so a 1.5x boost alternates one- and
    /// two-cell advances while everyone else moves once.
    fn run_movement(&mut self, players: &mut Players) {
        let member_ids = self.members.clone();
        let mut steps: HashMap<String, u32> = HashMap::new();
        let mut max_steps = 0;
        for id in &member_ids {
            let Some(player) = players.get_mut(id) else {
                continue;
            };
            if !player.is_alive || player.snake.is_empty() {
                continue;
            }
            player.move_budget += player.effects.speed_multiplier;
            let whole = player.move_budget.floor() as u32;
            player.move_budget -= whole as f64;
            steps.insert(id.clone(), whole);
            max_steps = max_steps.max(whole);
        }
        for step in 0..max_steps {
            self.movement_step(players, &member_ids, &steps, step);
        }
    }

    /// One advance-and-resolve pass: every participating head moves, then
    /// collisions are settled per player in join order.
    fn movement_step(
        &mut self,
        players: &mut Players,
        member_ids: &[String],
        steps: &HashMap<String, u32>,
        step: u32,
    ) {
        let board = self.settings.board_size;
        let mut movers: Vec<String> = Vec::new();
        let mut advanced: HashSet<String> = HashSet::new();
        let mut wall_dead: HashSet<String> = HashSet::new();

        for id in member_ids {
            if steps.get(id).copied().unwrap_or(0) <= step {
                continue;
            }
            let Some(player) = players.get_mut(id) else {
                continue;
            };
            if !player.is_alive {
                continue;
            }
            let Some(head) = player.head() else {
                continue;
            };
            movers.push(id.clone());
            let new_head = head.stepped(player.direction);
            if !new_head.in_bounds(board) {
                // The snake is left as it stood for the post-mortem snapshot;
                // a shielded player simply loses the move.
                if !player.effects.is_invincible {
                    wall_dead.insert(id.clone());
                }
                continue;
            }
            player.snake.insert(0, new_head);
            advanced.insert(id.clone());
        }

        for id in &movers {
            if wall_dead.contains(id) {
                self.kill_player(players, id, None);
                continue;
            }
            if !advanced.contains(id) {
                continue;
            }
            let Some(player) = players.get(id) else {
                continue;
            };
            if !player.is_alive {
                // Already fell in a head-on earlier in this pass.
                continue;
            }
            let head = player.snake[0];
            let invincible = player.effects.is_invincible;
            let phasing = player.effects.can_phase_through;

            if player.snake[1..].contains(&head) {
                if invincible {
                    // Undo the advance rather than let one snake stack cells.
                    if let Some(player) = players.get_mut(id) {
                        player.snake.remove(0);
                    }
                } else {
                    self.kill_player(players, id, None);
                }
                continue;
            }

            if !invincible && !phasing {
                let mut hit: Option<(String, bool)> = None;
                for other_id in member_ids {
                    if other_id == id {
                        continue;
                    }
                    let Some(other) = players.get(other_id) else {
                        continue;
                    };
                    if !other.is_alive {
                        continue;
                    }
                    if let Some(segment) = other.snake.iter().position(|&cell| cell == head) {
                        let head_on = segment == 0 && advanced.contains(other_id);
                        hit = Some((other_id.clone(), head_on));
                        break;
                    }
                }
                if let Some((owner, head_on)) = hit {
                    if head_on {
                        self.kill_player(players, id, None);
                        self.kill_player(players, &owner, None);
                    } else {
                        self.kill_player(players, id, Some(&owner));
                    }
                    continue;
                }
            }

            if let Some(index) = self
                .food
                .iter()
                .position(|item| item.x == head.x && item.y == head.y)
            {
                let item = self.food.remove(index);
                if let Some(player) = players.get_mut(id) {
                    player.score += item.value * player.effects.score_multiplier;
                }
                continue;
            }

            if let Some(index) = self
                .weapons
                .iter()
                .position(|item| item.x == head.x && item.y == head.y)
            {
                let item = self.weapons.remove(index);
                if let Some(player) = players.get_mut(id) {
                    player.weapon = Some(item.kind);
                }
                Lobby::send_to(
                    players,
                    id,
                    &ServerEvent::WeaponAcquired {
                        weapon: item.kind,
                        name: weapons::spec_for(item.kind).name,
                    },
                );
                continue;
            }

            if let Some(player) = players.get_mut(id) {
                player.snake.pop();
            }
        }
    }

    fn kill_player(&self, players: &mut Players, victim_id: &str, killer_id: Option<&str>) {
        let killer_name = killer_id
            .and_then(|id| players.get(id))
            .map(|player| player.name.clone());
        match players.get_mut(victim_id) {
            Some(victim) if victim.is_alive => {
                victim.is_alive = false;
                victim.deaths += 1;
            }
            _ => return,
        }
        tracing::debug!(lobby_id = %self.id, player_id = victim_id, killer = ?killer_id, "player died");
        Lobby::send_to(players, victim_id, &ServerEvent::Killed { by: killer_name });
        if let Some(killer) = killer_id {
            let victim_name = players
                .get(victim_id)
                .map(|player| player.name.clone())
                .unwrap_or_default();
            if let Some(player) = players.get_mut(killer) {
                player.score += KILL_SCORE;
                player.kills += 1;
            }
            Lobby::send_to(
                players,
                killer,
                &ServerEvent::KillAwarded {
                    victim: victim_name,
                    points: KILL_SCORE,
                },
            );
        }
    }

    /// Ring of food around the head at angles 2πi/5, rounded to the grid.
    /// Cells off the board or already occupied are skipped.
    fn detonate_food_bomb(&mut self, players: &mut Players, player_id: &str) {
        let Some(head) = players.get(player_id).and_then(|player| player.head()) else {
            return;
        };
        let board = self.settings.board_size;
        for i in 0..FOOD_BOMB_COUNT {
            let angle = std::f64::consts::TAU * i as f64 / FOOD_BOMB_COUNT as f64;
            let cell = Position::new(
                head.x + (FOOD_BOMB_RADIUS * angle.cos()).round() as i32,
                head.y + (FOOD_BOMB_RADIUS * angle.sin()).round() as i32,
            );
            if !cell.in_bounds(board) || self.cell_occupied(players, cell) {
                continue;
            }
            self.food.push(FoodItem {
                id: Uuid::new_v4().to_string(),
                x: cell.x,
                y: cell.y,
                kind: "normal".to_string(),
                value: FOOD_VALUE,
            });
        }
    }

    fn teleport_player(&mut self, players: &mut Players, player_id: &str, rng: &mut impl Rng) {
        let Some(cell) = self.random_free_cell(players, rng) else {
            return;
        };
        if let Some(player) = players.get_mut(player_id) {
            if let Some(head) = player.snake.first_mut() {
                *head = cell;
            }
        }
    }

    pub fn game_snapshot(&self, players: &Players, now: i64) -> GameSnapshot {
        GameSnapshot {
            players: self
                .members
                .iter()
                .filter_map(|id| players.get(id))
                .map(|player| PlayerGameView {
                    id: player.id.clone(),
                    name: player.name.clone(),
                    color: player.color.clone(),
                    score: player.score,
                    kills: player.kills,
                    deaths: player.deaths,
                    is_alive: player.is_alive,
                    weapon: player.weapon,
                    snake: player.snake.clone(),
                    direction: player.direction,
                })
                .collect(),
            food: self.food.clone(),
            weapons: self.weapons.clone(),
            game_time: self.game_start_time.map(|start| now - start).unwrap_or(0),
            board_size: self.settings.board_size,
        }
    }
}
