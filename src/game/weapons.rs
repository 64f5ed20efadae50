use rand::Rng;
use serde::{Deserialize, Serialize};

use super::types::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    SpeedBoost,
    Shield,
    Ghost,
    DoubleScore,
    FoodBomb,
    Teleport,
    Laser,
    Shrink,
    Freeze,
    Magnet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl Rarity {
    pub fn weight(self) -> u32 {
        match self {
            Rarity::Common => 50,
            Rarity::Uncommon => 30,
            Rarity::Rare => 15,
            Rarity::Legendary => 5,
        }
    }
}

const RARITIES: [Rarity; 4] = [Rarity::Common, Rarity::Uncommon, Rarity::Rare, Rarity::Legendary];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WeaponSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: WeaponType,
    pub description: &'static str,
    pub duration_ms: i64,
    pub effect: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pub rarity: Rarity,
}

pub const CATALOG: [WeaponSpec; 10] = [
    WeaponSpec {
        name: "Speed Boost",
        kind: WeaponType::SpeedBoost,
        description: "Move half again as fast for a short while",
        duration_ms: 5_000,
        effect: "speed",
        color: "#ffd166",
        icon: "⚡",
        rarity: Rarity::Common,
    },
    WeaponSpec {
        name: "Food Bomb",
        kind: WeaponType::FoodBomb,
        description: "Scatter a ring of food around your head",
        duration_ms: 0,
        effect: "food_ring",
        color: "#f06595",
        icon: "💣",
        rarity: Rarity::Common,
    },
    WeaponSpec {
        name: "Shrink",
        kind: WeaponType::Shrink,
        description: "Trim your tail down to size",
        duration_ms: 0,
        effect: "shrink",
        color: "#20c997",
        icon: "✂",
        rarity: Rarity::Common,
    },
    WeaponSpec {
        name: "Shield",
        kind: WeaponType::Shield,
        description: "Collisions cannot kill you for a short while",
        duration_ms: 5_000,
        effect: "invincible",
        color: "#4dabf7",
        icon: "🛡",
        rarity: Rarity::Uncommon,
    },
    WeaponSpec {
        name: "Double Score",
        kind: WeaponType::DoubleScore,
        description: "Food is worth twice as much for a while",
        duration_ms: 10_000,
        effect: "score_multiplier",
        color: "#fcc419",
        icon: "✦",
        rarity: Rarity::Uncommon,
    },
    WeaponSpec {
        name: "Freeze",
        kind: WeaponType::Freeze,
        description: "Stop rival snakes in their tracks",
        duration_ms: 3_000,
        effect: "freeze",
        color: "#74c0fc",
        icon: "❄",
        rarity: Rarity::Uncommon,
    },
    WeaponSpec {
        name: "Ghost",
        kind: WeaponType::Ghost,
        description: "Phase through other snakes for a short while",
        duration_ms: 5_000,
        effect: "phase",
        color: "#845ef7",
        icon: "👻",
        rarity: Rarity::Rare,
    },
    WeaponSpec {
        name: "Teleport",
        kind: WeaponType::Teleport,
        description: "Jump to a random free cell",
        duration_ms: 0,
        effect: "teleport",
        color: "#06d6a0",
        icon: "✈",
        rarity: Rarity::Rare,
    },
    WeaponSpec {
        name: "Laser",
        kind: WeaponType::Laser,
        description: "Burn a line across the board",
        duration_ms: 0,
        effect: "laser",
        color: "#ff6b6b",
        icon: "☄",
        rarity: Rarity::Legendary,
    },
    WeaponSpec {
        name: "Magnet",
        kind: WeaponType::Magnet,
        description: "Pull nearby food toward you",
        duration_ms: 8_000,
        effect: "magnet",
        color: "#e599f7",
        icon: "🧲",
        rarity: Rarity::Legendary,
    },
];

pub fn spec_for(kind: WeaponType) -> &'static WeaponSpec {
    CATALOG
        .iter()
        .find(|spec| spec.kind == kind)
        .unwrap_or(&CATALOG[0])
}

/// Draws a rarity by weight (50/30/15/5), then a weapon uniformly within it.
pub fn random_weapon(rng: &mut impl Rng) -> WeaponType {
    let total: u32 = RARITIES.iter().map(|rarity| rarity.weight()).sum();
    let mut roll = rng.gen_range(0..total);
    let mut picked = Rarity::Common;
    for rarity in RARITIES {
        if roll < rarity.weight() {
            picked = rarity;
            break;
        }
        roll -= rarity.weight();
    }
    let pool: Vec<&WeaponSpec> = CATALOG.iter().filter(|spec| spec.rarity == picked).collect();
    pool[rng.gen_range(0..pool.len())].kind
}

/// Flips the timed effect flags for the flag-based weapons. Board-coupled
/// weapons (food bomb, teleport) are handled by the lobby engine, which owns
/// item placement. Returns false when the weapon has no timed effect.
pub fn apply_timed_effect(player: &mut Player, kind: WeaponType, now: i64) -> bool {
    let duration = spec_for(kind).duration_ms;
    match kind {
        WeaponType::SpeedBoost => {
            player.effects.speed_multiplier = 1.5;
            player.effects.speed_expires_at = Some(now + duration);
            true
        }
        WeaponType::Shield => {
            player.effects.is_invincible = true;
            player.effects.shield_expires_at = Some(now + duration);
            true
        }
        WeaponType::Ghost => {
            player.effects.can_phase_through = true;
            player.effects.ghost_expires_at = Some(now + duration);
            true
        }
        WeaponType::DoubleScore => {
            player.effects.score_multiplier = 2;
            player.effects.double_score_expires_at = Some(now + duration);
            true
        }
        _ => false,
    }
}
