//! Per-frame simulation step
//!
//! One call to [`step`] advances the run by one display frame. The order is
//! fixed: timers and speed, runner physics, spawning, obstacle collisions,
//! coin magnet then coin pickup, particles.

use glam::Vec2;
use rand::Rng;

use super::collision::magnet_pull;
use super::state::{
    CoinKind, Collectible, Obstacle, ObstacleKind, Particle, RunEvent, RunPhase, RunState,
    RunSummary, SkillKind,
};
use crate::consts::*;

/// Input for a single frame
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// Jump pressed this frame
    pub jump: bool,
    /// Skill key pressed this frame
    pub activate: Option<SkillKind>,
    /// Wall time covered by this frame, drives skill timers
    pub frame_ms: f32,
}

impl Default for FrameInput {
    fn default() -> Self {
        Self {
            jump: false,
            activate: None,
            frame_ms: FRAME_MS,
        }
    }
}

/// Reset all per-run state and enter `Running`
pub fn start(state: &mut RunState, seed: u64, equipped: &[SkillKind]) {
    *state = RunState::new(seed, equipped);
    state.phase = RunPhase::Running;
}

/// Advance one frame
///
/// `multiplier` is the session's current value, read at the moment coins are
/// collected. Returns the summary on the frame the run ends.
pub fn step(state: &mut RunState, input: &FrameInput, multiplier: f64) -> Option<RunSummary> {
    state.events.clear();

    if state.phase != RunPhase::Running {
        update_particles(state);
        return None;
    }

    state.frame_count += 1;
    state.elapsed_ms += input.frame_ms;

    // Timers first so a skill that just expired no longer counts
    state.power_ups.advance(input.frame_ms);
    if let Some(kind) = input.activate {
        if state.power_ups.activate(kind) {
            log::debug!("Activated {}", kind.name());
            state.events.push(RunEvent::SkillActivated(kind));
        }
    }

    state.base_speed = (state.base_speed + SPEED_INCREMENT).min(MAX_GAME_SPEED);
    state.frame_speed = state.base_speed * state.power_ups.speed_factor();
    state.distance += state.frame_speed;

    if input.jump && !state.runner.jumping {
        let boost = if state.power_ups.has(SkillKind::MoonBoots) {
            LONG_JUMP_FACTOR
        } else {
            1.0
        };
        state.runner.vel_y = JUMP_FORCE * boost;
        state.runner.jumping = true;
    }
    state.runner.integrate();

    spawn_obstacle(state);
    spawn_coin(state);

    let speed = state.frame_speed;
    for obstacle in &mut state.obstacles {
        obstacle.pos.x -= speed;
    }
    state.obstacles.retain(|o| o.pos.x + o.size.x > 0.0);

    if let Some(summary) = check_obstacle_hits(state) {
        update_particles(state);
        return Some(summary);
    }

    collect_coins(state, multiplier);
    update_particles(state);
    None
}

fn spawn_obstacle(state: &mut RunState) {
    let gap = MIN_OBSTACLE_GAP + state.frame_speed * GAP_PER_SPEED;
    let clear = state
        .obstacles
        .last()
        .is_none_or(|last| CANVAS_WIDTH - last.pos.x > gap);
    if !clear || !state.rng.random_bool(OBSTACLE_SPAWN_CHANCE) {
        return;
    }

    let kind = obstacle_kind_for_roll(state.rng.random::<f64>());
    state.obstacles.push(Obstacle::on_floor(kind, CANVAS_WIDTH));
}

/// Candles are half of all obstacles; links and halts split the rest
fn obstacle_kind_for_roll(roll: f64) -> ObstacleKind {
    if roll < 0.5 {
        ObstacleKind::Candle
    } else if roll < 0.75 {
        ObstacleKind::Link
    } else {
        ObstacleKind::Halt
    }
}

/// A coin at `x` would not sit on top of any obstacle
fn coin_clear_of_obstacles(obstacles: &[Obstacle], x: f32) -> bool {
    obstacles
        .iter()
        .all(|o| (o.pos.x - x).abs() >= COIN_OBSTACLE_CLEARANCE)
}

fn spawn_coin(state: &mut RunState) {
    if !state.rng.random_bool(COIN_SPAWN_CHANCE) {
        return;
    }
    let x = CANVAS_WIDTH + 50.0;
    if !coin_clear_of_obstacles(&state.obstacles, x) {
        return;
    }

    let y = if state.rng.random_bool(0.5) {
        FLOOR_Y - 130.0
    } else {
        FLOOR_Y - 50.0
    };
    let kind = if state.rng.random_bool(RED_COIN_SHARE) {
        CoinKind::Red
    } else {
        CoinKind::Green
    };
    state.collectibles.push(Collectible::new(kind, Vec2::new(x, y)));
}

fn check_obstacle_hits(state: &mut RunState) -> Option<RunSummary> {
    let immune =
        state.power_ups.is_active(SkillKind::GhostWalk) || state.power_ups.recovering();
    if immune {
        return None;
    }

    let hitbox = state.runner.hitbox();
    let hit = state.obstacles.iter().any(|o| hitbox.overlaps(&o.rect()));
    if !hit {
        return None;
    }

    let center = state.runner.center();
    if state.power_ups.consume_shield() {
        state.runner.vel_y = SHIELD_BOUNCE;
        state.runner.jumping = true;
        state.events.push(RunEvent::ShieldConsumed);
        spawn_burst(state, center, 0x00BFFF, 20);
        log::info!("Second Chance absorbed a collision");
        return None;
    }

    state.phase = RunPhase::Ended;
    state.events.push(RunEvent::RunEnded {
        final_score: state.score,
    });
    spawn_burst(state, center, 0xFF3B30, 30);
    log::info!(
        "Run ended after {} frames with ${:.2}",
        state.frame_count,
        state.score
    );
    Some(state.summary())
}

fn collect_coins(state: &mut RunState, multiplier: f64) {
    let hitbox = state.runner.hitbox();
    let magnet = state.power_ups.is_active(SkillKind::CoinMagnet);
    let doubled = state.power_ups.recovering();
    let target = state.runner.center() - Vec2::splat(COIN_SIZE * 0.5);
    let speed = state.frame_speed;

    let mut collected: Vec<(CoinKind, f64, Vec2)> = Vec::new();
    state.collectibles.retain_mut(|coin| {
        coin.pos.x -= speed;
        if magnet {
            magnet_pull(&mut coin.pos, target, MAGNET_RADIUS, MAGNET_PULL);
        }
        if hitbox.overlaps(&coin.rect()) {
            let credited = if coin.value > 0.0 {
                let bonus = if doubled { 2.0 } else { 1.0 };
                coin.value * multiplier * bonus
            } else {
                coin.value
            };
            collected.push((coin.kind, credited, coin.rect().center()));
            return false;
        }
        coin.pos.x + COIN_SIZE > 0.0
    });

    for (kind, credited, at) in collected {
        state.score = (state.score + credited).max(0.0);
        state.events.push(RunEvent::CoinCollected { kind, credited });
        let color = match kind {
            CoinKind::Green => 0x14F195,
            CoinKind::Red => 0xFF3B30,
        };
        spawn_burst(state, at, color, 8);
    }
}

fn spawn_burst(state: &mut RunState, at: Vec2, color: u32, count: usize) {
    let room = MAX_PARTICLES.saturating_sub(state.particles.len());
    for _ in 0..count.min(room) {
        let angle = state.rng.random_range(0.0..std::f32::consts::TAU);
        let speed: f32 = state.rng.random_range(1.0..4.0);
        state.particles.push(Particle {
            pos: at,
            vel: Vec2::from_angle(angle) * speed,
            color,
            life: 1.0,
            size: state.rng.random_range(2.0..5.0),
        });
    }
}

fn update_particles(state: &mut RunState) {
    for p in &mut state.particles {
        p.pos += p.vel;
        p.vel.y += GRAVITY * 0.25;
        p.life -= PARTICLE_DECAY;
    }
    state.particles.retain(|p| p.life > 0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Obstacle that the next frame's movement puts on top of the runner
    fn obstacle_on_runner() -> Obstacle {
        Obstacle::on_floor(ObstacleKind::Candle, RUNNER_X + 20.0)
    }

    fn running(equipped: &[SkillKind]) -> RunState {
        let mut state = RunState::default();
        start(&mut state, 42, equipped);
        state
    }

    /// Step with no spawns interfering
    fn clean_step(state: &mut RunState, input: &FrameInput, multiplier: f64) -> Option<RunSummary> {
        let result = step(state, input, multiplier);
        if result.is_none() {
            state.obstacles.retain(|o| o.pos.x < CANVAS_WIDTH - 100.0);
            state.collectibles.retain(|c| c.pos.x < CANVAS_WIDTH - 100.0);
        }
        result
    }

    #[test]
    fn test_start_resets_state() {
        let mut state = running(&[SkillKind::CoinMagnet]);
        state.score = 12.0;
        state.distance = 5000.0;
        state.obstacles.push(obstacle_on_runner());
        state.power_ups.activate(SkillKind::CoinMagnet);
        state.phase = RunPhase::Ended;

        start(&mut state, 7, &[SkillKind::CoinMagnet]);
        assert_eq!(state.phase, RunPhase::Running);
        assert_eq!(state.score, 0.0);
        assert_eq!(state.distance, 0.0);
        assert_eq!(state.frame_count, 0);
        assert_eq!(state.base_speed, GAME_SPEED_INITIAL);
        assert!(state.obstacles.is_empty());
        assert!(!state.power_ups.timer(SkillKind::CoinMagnet).unwrap().spent);
    }

    #[test]
    fn test_idle_and_ended_do_not_advance() {
        let mut state = RunState::default();
        assert_eq!(step(&mut state, &FrameInput::default(), 1.0), None);
        assert_eq!(state.frame_count, 0);

        let mut state = running(&[]);
        state.phase = RunPhase::Ended;
        step(&mut state, &FrameInput::default(), 1.0);
        assert_eq!(state.frame_count, 0);
    }

    #[test]
    fn test_speed_ramp_is_capped() {
        let mut state = running(&[]);
        let mut last = state.base_speed;
        for _ in 0..200 {
            clean_step(&mut state, &FrameInput::default(), 1.0);
            assert!(state.base_speed >= last);
            last = state.base_speed;
        }
        state.base_speed = MAX_GAME_SPEED;
        clean_step(&mut state, &FrameInput::default(), 1.0);
        assert_eq!(state.base_speed, MAX_GAME_SPEED);
    }

    #[test]
    fn test_rocket_fuel_doubles_frame_speed() {
        let mut state = running(&[SkillKind::RocketFuel]);
        let input = FrameInput {
            activate: Some(SkillKind::RocketFuel),
            ..Default::default()
        };
        clean_step(&mut state, &input, 1.0);
        assert!(state.events.contains(&RunEvent::SkillActivated(SkillKind::RocketFuel)));
        assert!((state.frame_speed - state.base_speed * 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_moon_boots_jump_higher() {
        let peak = |equipped: &[SkillKind]| {
            let mut state = running(equipped);
            let jump = FrameInput {
                jump: true,
                ..Default::default()
            };
            clean_step(&mut state, &jump, 1.0);
            let mut top = state.runner.pos.y;
            for _ in 0..60 {
                clean_step(&mut state, &FrameInput::default(), 1.0);
                top = top.min(state.runner.pos.y);
            }
            top
        };
        assert!(peak(&[SkillKind::MoonBoots]) < peak(&[]));
    }

    #[test]
    fn test_collision_ends_run() {
        let mut state = running(&[]);
        state.obstacles.push(obstacle_on_runner());
        let summary = step(&mut state, &FrameInput::default(), 1.0);
        assert!(summary.is_some());
        assert_eq!(state.phase, RunPhase::Ended);
        assert!(matches!(state.events.last(), Some(RunEvent::RunEnded { .. })));
    }

    #[test]
    fn test_second_chance_survives_exactly_one_collision() {
        let mut state = running(&[SkillKind::SecondChance]);
        state.score = 1.0;

        state.obstacles.push(obstacle_on_runner());
        assert_eq!(clean_step(&mut state, &FrameInput::default(), 1.0), None);
        assert_eq!(state.phase, RunPhase::Running);
        assert!(state.events.contains(&RunEvent::ShieldConsumed));
        assert_eq!(state.score, 1.0);

        // Play through the invulnerability window
        state.obstacles.clear();
        while state.power_ups.recovering() {
            clean_step(&mut state, &FrameInput::default(), 1.0);
            state.obstacles.clear();
        }
        assert!(!state.runner.jumping);

        state.obstacles.push(obstacle_on_runner());
        let summary = step(&mut state, &FrameInput::default(), 1.0);
        assert_eq!(state.phase, RunPhase::Ended);
        assert_eq!(summary.map(|s| s.final_score), Some(1.0));
    }

    #[test]
    fn test_recovery_window_is_invulnerable() {
        let mut state = running(&[SkillKind::SecondChance]);
        state.obstacles.push(obstacle_on_runner());
        clean_step(&mut state, &FrameInput::default(), 1.0);
        state.obstacles.push(obstacle_on_runner());
        clean_step(&mut state, &FrameInput::default(), 1.0);
        assert_eq!(state.phase, RunPhase::Running);
    }

    #[test]
    fn test_ghost_walk_phases_through() {
        let mut state = running(&[SkillKind::GhostWalk]);
        let input = FrameInput {
            activate: Some(SkillKind::GhostWalk),
            ..Default::default()
        };
        state.obstacles.push(obstacle_on_runner());
        clean_step(&mut state, &input, 1.0);
        assert_eq!(state.phase, RunPhase::Running);
    }

    fn coin_on_runner(kind: CoinKind) -> Collectible {
        Collectible::new(kind, Vec2::new(RUNNER_X + 20.0, FLOOR_Y - 50.0))
    }

    #[test]
    fn test_coin_uses_current_multiplier() {
        let mut state = running(&[]);
        state.collectibles.push(coin_on_runner(CoinKind::Green));
        clean_step(&mut state, &FrameInput::default(), 2.5);
        assert!((state.score - COIN_VALUE_USD * 2.5).abs() < 1e-12);

        state.collectibles.push(coin_on_runner(CoinKind::Green));
        clean_step(&mut state, &FrameInput::default(), 0.1);
        assert!((state.score - COIN_VALUE_USD * 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_red_coin_score_floor() {
        let mut state = running(&[]);
        state.collectibles.push(coin_on_runner(CoinKind::Red));
        clean_step(&mut state, &FrameInput::default(), 10.0);
        assert_eq!(state.score, 0.0);
        assert!(matches!(
            state.events.last(),
            Some(RunEvent::CoinCollected {
                kind: CoinKind::Red,
                ..
            })
        ));
    }

    #[test]
    fn test_recovery_doubles_coin_value() {
        let mut state = running(&[SkillKind::SecondChance]);
        state.obstacles.push(obstacle_on_runner());
        clean_step(&mut state, &FrameInput::default(), 1.0);
        state.obstacles.clear();
        assert!(state.power_ups.recovering());

        // Wait for the bounce to land so the coin lines up with the runner
        while state.runner.jumping {
            clean_step(&mut state, &FrameInput::default(), 1.0);
            state.obstacles.clear();
        }
        assert!(state.power_ups.recovering());

        state.collectibles.push(coin_on_runner(CoinKind::Green));
        clean_step(&mut state, &FrameInput::default(), 1.5);
        assert!((state.score - COIN_VALUE_USD * 1.5 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnet_pulls_coins_in() {
        let far_coin = || Collectible::new(CoinKind::Green, Vec2::new(RUNNER_X + 150.0, FLOOR_Y - 130.0));

        let mut plain = running(&[]);
        plain.collectibles.push(far_coin());
        for _ in 0..20 {
            clean_step(&mut plain, &FrameInput::default(), 1.0);
            plain.obstacles.clear();
        }
        assert_eq!(plain.score, 0.0);

        let mut magnet = running(&[SkillKind::CoinMagnet]);
        magnet.collectibles.push(far_coin());
        let activate = FrameInput {
            activate: Some(SkillKind::CoinMagnet),
            ..Default::default()
        };
        clean_step(&mut magnet, &activate, 1.0);
        for _ in 0..20 {
            clean_step(&mut magnet, &FrameInput::default(), 1.0);
            magnet.obstacles.clear();
        }
        assert!(magnet.score > 0.0);
    }

    #[test]
    fn test_obstacle_spacing_respects_gap() {
        let mut state = running(&[]);
        for _ in 0..5000 {
            state.power_ups.recovery_ms = 1.0e9;
            step(&mut state, &FrameInput::default(), 1.0);
            for pair in state.obstacles.windows(2) {
                assert!(pair[1].pos.x - pair[0].pos.x > MIN_OBSTACLE_GAP);
            }
        }
        assert_eq!(state.phase, RunPhase::Running);
    }

    #[test]
    fn test_obstacle_kind_weights() {
        assert_eq!(obstacle_kind_for_roll(0.0), ObstacleKind::Candle);
        assert_eq!(obstacle_kind_for_roll(0.49), ObstacleKind::Candle);
        assert_eq!(obstacle_kind_for_roll(0.5), ObstacleKind::Link);
        assert_eq!(obstacle_kind_for_roll(0.74), ObstacleKind::Link);
        assert_eq!(obstacle_kind_for_roll(0.75), ObstacleKind::Halt);
        assert_eq!(obstacle_kind_for_roll(0.999), ObstacleKind::Halt);

        use rand::SeedableRng;
        let mut rng = rand_pcg::Pcg32::seed_from_u64(11);
        let candles = (0..4000)
            .filter(|_| obstacle_kind_for_roll(rng.random::<f64>()) == ObstacleKind::Candle)
            .count();
        assert!((1800..2200).contains(&candles), "candles: {}", candles);
    }

    #[test]
    fn test_coin_clearance() {
        let obstacles = vec![Obstacle::on_floor(ObstacleKind::Link, 800.0)];
        assert!(!coin_clear_of_obstacles(&obstacles, 850.0));
        assert!(coin_clear_of_obstacles(&obstacles, 860.0));
        assert!(coin_clear_of_obstacles(&[], 850.0));
    }

    #[test]
    fn test_determinism() {
        let inputs = [
            FrameInput::default(),
            FrameInput {
                jump: true,
                ..Default::default()
            },
            FrameInput::default(),
        ];
        let mut a = running(&[SkillKind::SecondChance]);
        let mut b = running(&[SkillKind::SecondChance]);
        for i in 0..600 {
            let input = &inputs[i % inputs.len()];
            step(&mut a, input, 1.3);
            step(&mut b, input, 1.3);
        }
        assert_eq!(a.frame_count, b.frame_count);
        assert_eq!(a.obstacles.len(), b.obstacles.len());
        assert_eq!(a.collectibles.len(), b.collectibles.len());
        assert_eq!(a.score, b.score);
        assert_eq!(a.phase, b.phase);
    }
}
