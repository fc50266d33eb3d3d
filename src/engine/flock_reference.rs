// CPU model of the two flock compute passes.
// Operates on the same texel layout as the GPU textures so the state
// invariants (finite, wrapped, speed-limited) can be checked headless.
// Must stay in step with shaders/flock_velocity.wgsl and flock_position.wgsl.

use std::f32::consts::TAU;

use glam::Vec3;

use super::flock::{FlockSnapshot, SimUniforms};

const SPEED_LIMIT: f32 = 9.0;
const PREY_RADIUS: f32 = 150.0;
const MIN_DISTANCE: f32 = 0.0001;
const STEP_SCALE: f32 = 15.0;

fn safe_normalize(v: Vec3) -> Vec3 {
    let len = v.length();
    if len < MIN_DISTANCE { Vec3::ZERO } else { v / len }
}

/// Velocity of one bird after the velocity pass.
pub fn bird_velocity(state: &FlockSnapshot, bird: usize, u: &SimUniforms) -> Vec3 {
    let delta = u.delta;
    let zone_radius = (u.separation + u.alignment + u.cohesion).max(MIN_DISTANCE);
    let zone_radius_sq = zone_radius * zone_radius;
    let separation_thresh = u.separation / zone_radius;
    let alignment_thresh = (u.separation + u.alignment) / zone_radius;

    let self_position = state.position(bird);
    let mut velocity = state.velocity(bird);
    let mut limit = SPEED_LIMIT;

    let mut dir = Vec3::from(u.predator) * u.bounds - self_position;
    dir.z = 0.0;
    let predator_dist = dir.length();
    if predator_dist < PREY_RADIUS {
        let f = (predator_dist * predator_dist / (PREY_RADIUS * PREY_RADIUS) - 1.0) * delta * 100.0;
        velocity += safe_normalize(dir) * f;
        limit += 5.0;
    }

    let mut central = self_position;
    central.y *= 2.5;
    velocity -= safe_normalize(central) * delta * 5.0;

    let mut steer = Vec3::ZERO;
    for other in 0..state.positions.len() {
        let offset = state.position(other) - self_position;
        let dist = offset.length();
        if dist < MIN_DISTANCE {
            continue;
        }
        let dist_sq = dist * dist;
        if dist_sq > zone_radius_sq {
            continue;
        }
        let heading = offset / dist;
        let percent = dist_sq / zone_radius_sq;

        if percent < separation_thresh {
            let f = (separation_thresh / percent - 1.0) * delta;
            steer -= heading * f;
        } else if percent < alignment_thresh {
            let adjusted = (percent - separation_thresh) / (alignment_thresh - separation_thresh);
            let f = (0.5 - (adjusted * TAU).cos() * 0.5 + 0.5) * delta;
            steer += safe_normalize(state.velocity(other)) * f;
        } else {
            let band = 1.0 - alignment_thresh;
            let adjusted = if band > 0.0 { (percent - alignment_thresh) / band } else { 1.0 };
            let f = (0.5 - ((adjusted * TAU).cos() * -0.5 + 0.5)) * delta;
            steer += heading * f;
        }
    }
    velocity += steer * (1.0 - 0.5 * u.freedom);

    let speed = velocity.length();
    if speed > limit {
        velocity *= limit / speed;
    }
    velocity
}

/// Integrate one position and wrap it into [-bounds/2, bounds/2].
pub fn wrap_step(position: Vec3, velocity: Vec3, delta: f32, bounds: f32) -> Vec3 {
    let moved = position + velocity * delta * STEP_SCALE;
    let half = bounds * 0.5;
    let wrapped = moved - bounds * ((moved + half) / bounds).floor();
    wrapped.clamp(Vec3::splat(-half), Vec3::splat(half))
}

/// One full frame: velocity pass over the old state, then position pass
/// using the new velocities.
pub fn step(state: &FlockSnapshot, u: &SimUniforms) -> FlockSnapshot {
    let velocities: Vec<[f32; 4]> = (0..state.velocities.len())
        .map(|bird| bird_velocity(state, bird, u).extend(1.0).to_array())
        .collect();
    let positions = state
        .positions
        .iter()
        .zip(&velocities)
        .map(|(p, v)| {
            wrap_step(Vec3::from_slice(&p[..3]), Vec3::from_slice(&v[..3]), u.delta, u.bounds)
                .extend(1.0)
                .to_array()
        })
        .collect();
    FlockSnapshot { positions, velocities }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::FlockConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn uniforms(config: &FlockConfig, delta: f32) -> SimUniforms {
        SimUniforms::new(&config.initial_params(), config.bounds, config.width, delta, 0.0)
    }

    #[test]
    fn random_flock_stays_finite_and_bounded() {
        let config = FlockConfig { width: 8, initial_count: 64, ..Default::default() }
            .validate()
            .unwrap();
        let mut state = FlockSnapshot::random(&config, &mut StdRng::seed_from_u64(42));
        let u = uniforms(&config, 1.0 / 60.0);
        let half = config.half_bounds();

        for _ in 0..120 {
            state = step(&state, &u);
            for bird in 0..state.positions.len() {
                let p = state.position(bird);
                let v = state.velocity(bird);
                assert!(p.is_finite() && v.is_finite());
                assert!(p.abs().max_element() <= half, "bird {bird} escaped: {p}");
                assert!(v.length() <= SPEED_LIMIT + 5.0 + 1e-3);
            }
        }
    }

    #[test]
    fn capped_one_second_step_stays_bounded() {
        let config = FlockConfig { width: 4, initial_count: 16, ..Default::default() };
        let mut state = FlockSnapshot::random(&config, &mut StdRng::seed_from_u64(5));
        let u = uniforms(&config, 1.0);
        for _ in 0..30 {
            state = step(&state, &u);
        }
        assert!(state.positions.iter().flatten().all(|c| c.is_finite() && c.abs() <= 400.0));
    }

    #[test]
    fn isolated_bird_gets_no_neighbor_contribution() {
        let config = FlockConfig::default();
        let state = FlockSnapshot {
            positions: vec![[100.0, 0.0, 0.0, 1.0]],
            velocities: vec![[1.0, 0.0, 0.0, 1.0]],
        };
        let u = uniforms(&config, 0.1);
        let v = bird_velocity(&state, 0, &u);
        // Only the centre pull applies: -x * delta * 5.
        assert!((v - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn bird_at_origin_with_coincident_neighbor_stays_finite() {
        let config = FlockConfig::default();
        let state = FlockSnapshot {
            positions: vec![[0.0, 0.0, 0.0, 1.0]; 2],
            velocities: vec![[0.0, 0.0, 0.0, 1.0]; 2],
        };
        let mut u = uniforms(&config, 0.016);
        u.predator = [0.0, 0.0, 0.0];
        let v = bird_velocity(&state, 0, &u);
        assert!(v.is_finite());
    }

    #[test]
    fn close_neighbors_push_apart() {
        let config = FlockConfig::default();
        let state = FlockSnapshot {
            positions: vec![[10.0, 0.0, 0.0, 1.0], [11.0, 0.0, 0.0, 1.0]],
            velocities: vec![[0.0, 0.0, 0.0, 1.0]; 2],
        };
        let u = uniforms(&config, 0.016);
        let v = bird_velocity(&state, 0, &u);
        assert!(v.x < 0.0);
    }

    #[test]
    fn predator_repels_nearby_bird() {
        let config = FlockConfig::default();
        let state = FlockSnapshot {
            positions: vec![[10.0, 0.0, 0.0, 1.0]],
            velocities: vec![[0.0, 0.0, 0.0, 1.0]],
        };
        let mut u = uniforms(&config, 0.016);
        u.predator = [0.0, 0.0, 0.0];
        let v = bird_velocity(&state, 0, &u);
        // Predator at the origin pushes the bird further along +x
        // harder than the centre pull draws it back.
        assert!(v.x > 0.0);
    }

    #[test]
    fn wrap_step_just_inside_face_stays_in_bounds() {
        // 400 - 1 ulp: `moved + half` rounds up to exactly `bounds`.
        let edge = 400.0 - 3.0517578e-5;
        for p in [Vec3::new(edge, 0.0, 0.0), Vec3::new(0.0, -edge, edge), Vec3::splat(edge)] {
            let wrapped = wrap_step(p, Vec3::ZERO, 0.0, 800.0);
            assert!(wrapped.abs().max_element() <= 400.0, "escaped bounds: {wrapped}");
        }
    }

    #[test]
    fn wrap_step_reenters_opposite_face() {
        let p = wrap_step(Vec3::new(399.0, 0.0, -399.0), Vec3::new(1.0, 0.0, -1.0), 1.0 / 7.5, 800.0);
        assert!((p.x - -399.0).abs() < 1e-3);
        assert!((p.z - 399.0).abs() < 1e-3);
    }
}
