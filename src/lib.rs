//! Degen Runner - an endless runner scored against a live market cap
//!
//! Core modules:
//! - `market`: Price feed, multiplier, per-token session state and polling
//! - `sim`: Per-frame runner simulation (physics, spawning, collisions, power-ups)
//! - `lifecycle`: Menu/selection/playing/game-over orchestration
//! - `driver`: Async glue that performs feed fetches for the lifecycle
//! - `platform`: Clock, timers and storage for browser/native hosts
//! - `persistence`: Saved token list and balance

pub mod driver;
pub mod highscores;
pub mod lifecycle;
pub mod market;
pub mod persistence;
pub mod platform;
pub mod settings;
pub mod sim;

pub use highscores::HighScores;
pub use lifecycle::{LifecycleError, Screen, SessionLifecycle};
pub use settings::{GameConfig, Settings};

/// Game configuration constants
///
/// Distances are canvas pixels, speeds are pixels per frame.
pub mod consts {
    /// Nominal frame duration (one 60 Hz display refresh)
    pub const FRAME_MS: f32 = 1000.0 / 60.0;

    /// Playfield dimensions
    pub const CANVAS_WIDTH: f32 = 800.0;
    pub const CANVAS_HEIGHT: f32 = 400.0;
    pub const FLOOR_HEIGHT: f32 = 50.0;
    pub const FLOOR_Y: f32 = CANVAS_HEIGHT - FLOOR_HEIGHT;

    /// Runner
    pub const RUNNER_X: f32 = 60.0;
    pub const RUNNER_WIDTH: f32 = 40.0;
    pub const RUNNER_HEIGHT: f32 = 60.0;
    pub const GRAVITY: f32 = 0.6;
    pub const JUMP_FORCE: f32 = -13.0;
    /// Jump multiplier with Moon Boots equipped
    pub const LONG_JUMP_FACTOR: f32 = 1.4;

    /// Speed ramp
    pub const GAME_SPEED_INITIAL: f32 = 6.0;
    pub const MAX_GAME_SPEED: f32 = 12.0;
    pub const SPEED_INCREMENT: f32 = 0.001;

    /// Obstacle spawning
    pub const MIN_OBSTACLE_GAP: f32 = 300.0;
    /// Extra gap per unit of frame speed
    pub const GAP_PER_SPEED: f32 = 15.0;
    pub const OBSTACLE_SPAWN_CHANCE: f64 = 0.02;

    /// Collectibles
    pub const COIN_SIZE: f32 = 20.0;
    pub const COIN_SPAWN_CHANCE: f64 = 0.03;
    /// Coins closer than this to an obstacle (x distance) are not spawned
    pub const COIN_OBSTACLE_CLEARANCE: f32 = 60.0;
    pub const COIN_VALUE_USD: f64 = 0.02;
    pub const RED_COIN_SHARE: f64 = 0.15;

    /// Hitbox inset applied to the runner for every collision test
    pub const HITBOX_INSET_X: f32 = 10.0;
    pub const HITBOX_INSET_Y: f32 = 5.0;

    /// Power-ups
    pub const MAGNET_RADIUS: f32 = 250.0;
    pub const MAGNET_PULL: f32 = 15.0;
    pub const SHIELD_RECOVERY_MS: f32 = 3000.0;
    pub const SHIELD_BOUNCE: f32 = -5.0;

    /// Particles
    pub const MAX_PARTICLES: usize = 256;
    pub const PARTICLE_DECAY: f32 = 0.05;
}
