//! Run state and core simulation types
//!
//! All per-run mutable state lives in [`RunState`] and is rebuilt from scratch
//! when a run starts.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::Rect;
use crate::consts::*;

/// Phase of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Not started yet
    Idle,
    /// Active gameplay
    Running,
    /// Collided without protection
    Ended,
}

/// The player's runner
#[derive(Debug, Clone)]
pub struct Runner {
    /// Top-left corner (canvas coordinates, y grows downward)
    pub pos: Vec2,
    pub size: Vec2,
    pub vel_y: f32,
    pub jumping: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            pos: Vec2::new(RUNNER_X, FLOOR_Y - RUNNER_HEIGHT),
            size: Vec2::new(RUNNER_WIDTH, RUNNER_HEIGHT),
            vel_y: 0.0,
            jumping: false,
        }
    }
}

impl Runner {
    pub fn rect(&self) -> Rect {
        Rect::new(self.pos, self.size)
    }

    /// Forgiving hitbox used for every collision test
    pub fn hitbox(&self) -> Rect {
        self.rect().inset(HITBOX_INSET_X, HITBOX_INSET_Y)
    }

    pub fn center(&self) -> Vec2 {
        self.pos + self.size * 0.5
    }

    /// Gravity step with floor clamp
    pub fn integrate(&mut self) {
        self.vel_y += GRAVITY;
        self.pos.y += self.vel_y;

        let floor_top = FLOOR_Y - self.size.y;
        if self.pos.y >= floor_top {
            self.pos.y = floor_top;
            self.vel_y = 0.0;
            self.jumping = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleKind {
    /// Red candle, 30x60
    Candle,
    /// Chain link, 40x40
    Link,
    /// Trading halt sign, 40x80
    Halt,
}

impl ObstacleKind {
    pub fn size(&self) -> Vec2 {
        match self {
            ObstacleKind::Candle => Vec2::new(30.0, 60.0),
            ObstacleKind::Link => Vec2::new(40.0, 40.0),
            ObstacleKind::Halt => Vec2::new(40.0, 80.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    pub pos: Vec2,
    pub size: Vec2,
}

impl Obstacle {
    /// Obstacle standing on the floor at `x`
    pub fn on_floor(kind: ObstacleKind, x: f32) -> Self {
        let size = kind.size();
        Self {
            kind,
            pos: Vec2::new(x, FLOOR_Y - size.y),
            size,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.pos, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinKind {
    Green,
    Red,
}

/// A coin worth `value` dollars (negative for red coins)
#[derive(Debug, Clone)]
pub struct Collectible {
    pub kind: CoinKind,
    pub pos: Vec2,
    pub value: f64,
}

impl Collectible {
    pub fn new(kind: CoinKind, pos: Vec2) -> Self {
        let value = match kind {
            CoinKind::Green => COIN_VALUE_USD,
            CoinKind::Red => -COIN_VALUE_USD,
        };
        Self { kind, pos, value }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.pos, Vec2::splat(COIN_SIZE))
    }
}

/// A particle for visual effects
#[derive(Debug, Clone)]
pub struct Particle {
    pub pos: Vec2,
    pub vel: Vec2,
    /// 0xRRGGBB
    pub color: u32,
    /// 0-1, decreases over time
    pub life: f32,
    pub size: f32,
}

/// Equippable power-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillKind {
    /// Passive: jump 1.4x higher
    MoonBoots,
    /// 2x speed
    RocketFuel,
    /// 0.5x speed
    MatrixMode,
    /// Passive, once per run: survive one collision
    SecondChance,
    /// Phase through obstacles
    GhostWalk,
    /// Pull nearby coins, once per run
    CoinMagnet,
}

impl SkillKind {
    pub const ALL: [SkillKind; 6] = [
        SkillKind::MoonBoots,
        SkillKind::RocketFuel,
        SkillKind::MatrixMode,
        SkillKind::SecondChance,
        SkillKind::GhostWalk,
        SkillKind::CoinMagnet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SkillKind::MoonBoots => "Moon Boots",
            SkillKind::RocketFuel => "Rocket Fuel",
            SkillKind::MatrixMode => "Matrix Mode",
            SkillKind::SecondChance => "Second Chance",
            SkillKind::GhostWalk => "Ghost Walk",
            SkillKind::CoinMagnet => "Coin Magnet",
        }
    }

    /// Key that triggers an activatable skill
    pub fn trigger_key(&self) -> Option<char> {
        match self {
            SkillKind::RocketFuel => Some('S'),
            SkillKind::MatrixMode => Some('Z'),
            SkillKind::GhostWalk => Some('I'),
            SkillKind::CoinMagnet => Some('M'),
            SkillKind::MoonBoots | SkillKind::SecondChance => None,
        }
    }

    pub fn from_key(key: char) -> Option<Self> {
        let key = key.to_ascii_uppercase();
        Self::ALL.into_iter().find(|s| s.trigger_key() == Some(key))
    }

    pub fn is_passive(&self) -> bool {
        self.trigger_key().is_none()
    }

    /// May fire at most once per run
    pub fn is_one_shot(&self) -> bool {
        matches!(self, SkillKind::SecondChance | SkillKind::CoinMagnet)
    }

    pub fn duration_ms(&self) -> f32 {
        match self {
            SkillKind::RocketFuel | SkillKind::MatrixMode | SkillKind::CoinMagnet => 10_000.0,
            SkillKind::GhostWalk => 7_000.0,
            SkillKind::SecondChance => SHIELD_RECOVERY_MS,
            SkillKind::MoonBoots => 0.0,
        }
    }

    pub fn cooldown_ms(&self) -> f32 {
        match self {
            SkillKind::RocketFuel | SkillKind::MatrixMode => 20_000.0,
            SkillKind::GhostWalk => 50_000.0,
            _ => 0.0,
        }
    }

    /// Frame speed factor while active
    pub fn speed_factor(&self) -> f32 {
        match self {
            SkillKind::RocketFuel => 2.0,
            SkillKind::MatrixMode => 0.5,
            _ => 1.0,
        }
    }
}

/// Timers for one equipped skill
#[derive(Debug, Clone, Default)]
pub struct SkillTimer {
    pub active_ms: f32,
    pub cooldown_ms: f32,
    /// One-shot skills flip this on first use
    pub spent: bool,
}

impl SkillTimer {
    pub fn is_active(&self) -> bool {
        self.active_ms > 0.0
    }
}

/// Equipped skills and their timers
#[derive(Debug, Clone, Default)]
pub struct PowerUps {
    slots: Vec<(SkillKind, SkillTimer)>,
    /// Post-collision invulnerability left from Second Chance
    pub recovery_ms: f32,
}

impl PowerUps {
    pub fn new(equipped: &[SkillKind]) -> Self {
        let mut slots: Vec<(SkillKind, SkillTimer)> = Vec::with_capacity(equipped.len());
        for &kind in equipped {
            if !slots.iter().any(|(k, _)| *k == kind) {
                slots.push((kind, SkillTimer::default()));
            }
        }
        Self {
            slots,
            recovery_ms: 0.0,
        }
    }

    pub fn has(&self, kind: SkillKind) -> bool {
        self.slots.iter().any(|(k, _)| *k == kind)
    }

    pub fn timer(&self, kind: SkillKind) -> Option<&SkillTimer> {
        self.slots.iter().find(|(k, _)| *k == kind).map(|(_, t)| t)
    }

    pub fn is_active(&self, kind: SkillKind) -> bool {
        self.timer(kind).is_some_and(SkillTimer::is_active)
    }

    pub fn slots(&self) -> impl Iterator<Item = (SkillKind, &SkillTimer)> {
        self.slots.iter().map(|(k, t)| (*k, t))
    }

    /// Try to trigger an activatable skill; returns true if it fired
    pub fn activate(&mut self, kind: SkillKind) -> bool {
        if kind.is_passive() {
            return false;
        }
        let Some((_, timer)) = self.slots.iter_mut().find(|(k, _)| *k == kind) else {
            return false;
        };
        if timer.spent || timer.is_active() || timer.cooldown_ms > 0.0 {
            return false;
        }
        timer.active_ms = kind.duration_ms();
        if kind.is_one_shot() {
            timer.spent = true;
        }
        true
    }

    /// Spend Second Chance if it is equipped and unused
    pub fn consume_shield(&mut self) -> bool {
        let Some((_, timer)) = self
            .slots
            .iter_mut()
            .find(|(k, _)| *k == SkillKind::SecondChance)
        else {
            return false;
        };
        if timer.spent {
            return false;
        }
        timer.spent = true;
        self.recovery_ms = SkillKind::SecondChance.duration_ms();
        true
    }

    pub fn recovering(&self) -> bool {
        self.recovery_ms > 0.0
    }

    /// Advance every timer by `dt_ms`; expired skills enter cooldown
    pub fn advance(&mut self, dt_ms: f32) {
        self.recovery_ms = (self.recovery_ms - dt_ms).max(0.0);
        for (kind, timer) in &mut self.slots {
            if timer.active_ms > 0.0 {
                timer.active_ms -= dt_ms;
                if timer.active_ms <= 0.0 {
                    timer.active_ms = 0.0;
                    timer.cooldown_ms = kind.cooldown_ms();
                }
            } else if timer.cooldown_ms > 0.0 {
                timer.cooldown_ms = (timer.cooldown_ms - dt_ms).max(0.0);
            }
        }
    }

    /// Combined speed factor of all active speed skills
    pub fn speed_factor(&self) -> f32 {
        self.slots
            .iter()
            .filter(|(_, t)| t.is_active())
            .map(|(k, _)| k.speed_factor())
            .product()
    }
}

/// Something that happened during a frame, for HUD/audio hooks
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    CoinCollected { kind: CoinKind, credited: f64 },
    SkillActivated(SkillKind),
    ShieldConsumed,
    RunEnded { final_score: f64 },
}

/// Result of a finished run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub final_score: f64,
    pub distance: f32,
    pub frames: u64,
}

/// Complete per-run state
#[derive(Debug, Clone)]
pub struct RunState {
    pub seed: u64,
    pub rng: Pcg32,
    pub phase: RunPhase,
    pub runner: Runner,
    pub obstacles: Vec<Obstacle>,
    pub collectibles: Vec<Collectible>,
    /// Visual particles (not gameplay-affecting)
    pub particles: Vec<Particle>,
    /// Ramped speed before power-up factors
    pub base_speed: f32,
    /// Speed applied this frame
    pub frame_speed: f32,
    pub distance: f32,
    pub frame_count: u64,
    pub elapsed_ms: f32,
    /// Dollars earned this run, never negative
    pub score: f64,
    pub power_ups: PowerUps,
    /// Events produced by the most recent frame
    pub events: Vec<RunEvent>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(0, &[])
    }
}

impl RunState {
    /// Fresh state in `Idle`
    pub fn new(seed: u64, equipped: &[SkillKind]) -> Self {
        Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            phase: RunPhase::Idle,
            runner: Runner::default(),
            obstacles: Vec::new(),
            collectibles: Vec::new(),
            particles: Vec::new(),
            base_speed: GAME_SPEED_INITIAL,
            frame_speed: GAME_SPEED_INITIAL,
            distance: 0.0,
            frame_count: 0,
            elapsed_ms: 0.0,
            score: 0.0,
            power_ups: PowerUps::new(equipped),
            events: Vec::new(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            final_score: self.score,
            distance: self.distance,
            frames: self.frame_count,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }
}
