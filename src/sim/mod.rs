//! Runner simulation module
//!
//! All per-frame gameplay lives here:
//! - One step per display frame, no fixed timestep
//! - Seeded RNG only, so a run replays from its seed and inputs
//! - The market multiplier is an input, never fetched from here
//! - No rendering or platform dependencies

pub mod collision;
pub mod state;
pub mod tick;

pub use collision::{Rect, magnet_pull};
pub use state::{
    CoinKind, Collectible, Obstacle, ObstacleKind, Particle, PowerUps, RunEvent, RunPhase,
    RunState, RunSummary, Runner, SkillKind, SkillTimer,
};
pub use tick::{FrameInput, start, step};
