//! Probe Baker Integration Tests
//!
//! Tests for:
//! - Full bake of the Cornell box on a small lattice: interior probes end
//!   active with lit faces, buried probes end inactive
//! - Blur reading exclusively from the shadow copy
//! - Bounds safety of `process_cube` at lattice corners
//! - The `async_process_full` schedule draining through fences

use std::sync::Arc;
use std::time::Duration;

use glam::{Vec3, Vec4};

use ember::CpuAccelerationStructure;
use ember::Scene;
use ember::TaskCoordinator;
use ember::assets::cornell::create_cornell_box;
use ember::gi::accel::TraceContext;
use ember::gi::baker::{BakeEnvironment, CubeProc, process_cube};
use ember::gi::bvh::Bvh;
use ember::gi::packing::{WangRng, pack_rgb10a2, unpack_rgb10a2};
use ember::gi::probe::{CubeGrid, GridConfig, INFO_ACTIVE, INFO_BLURRED, INFO_MATERIAL};

/// Near lattice covering the Cornell room (`[-1,1] x [0,2] x [-1,1]`) with
/// margin, at the production cell size.
fn test_near_grid() -> GridConfig {
    GridConfig {
        size_xy: 24,
        size_z: 12,
        unit: 0.25,
        offset: Vec3::new(-3.0, -0.375, -3.0),
    }
}

fn test_far_grid() -> GridConfig {
    GridConfig {
        size_xy: 16,
        size_z: 4,
        unit: 1.0,
        offset: Vec3::new(-8.0, -1.5, -8.0),
    }
}

fn cornell_scene() -> Scene {
    let (content, environment) = create_cornell_box();
    let mut scene = Scene::new();
    scene.set_environment(environment);
    scene.reload(content);
    scene.tick(0.0);
    scene
}

fn empty_trace_context() -> TraceContext {
    TraceContext {
        blas: Arc::new(Vec::new()),
        instances: Vec::new(),
        tlas: Bvh::build(&[]),
    }
}

/// Drives the bake schedule until the group queue and worker pool drain.
fn drain_bake(
    accel: &mut CpuAccelerationStructure,
    scene: &Scene,
    coordinator: &TaskCoordinator,
) {
    for _ in 0..100_000 {
        let _ = accel.tick(scene, coordinator);
        coordinator.tick();
        if accel.queued_groups() == 0 && coordinator.is_idle() {
            // One more tick cycle lets the final fence and flush settle.
            let _ = accel.tick(scene, coordinator);
            if accel.queued_groups() == 0 && coordinator.is_idle() {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("bake schedule failed to drain");
}

fn nonzero_bounce_faces(grid: &CubeGrid, idx: usize) -> usize {
    (0..6)
        .filter(|&face| {
            let color = unpack_rgb10a2(grid.bounce(idx, face));
            color.x + color.y + color.z > 0.0
        })
        .count()
}

// ============================================================================
// Full Cornell bake
// ============================================================================

#[test]
fn cornell_interior_probes_bake_active_and_lit() {
    let scene = cornell_scene();
    let coordinator = TaskCoordinator::new();
    let mut accel = CpuAccelerationStructure::with_grids(test_near_grid(), test_far_grid());

    accel.init_bvh(&scene);
    accel.async_process_full(&coordinator);
    drain_bake(&mut accel, &scene, &coordinator);

    let grid = accel.near_baker().grid();
    let config = *grid.config();

    // Probes well inside the room, away from walls and the two boxes.
    let mut checked = 0;
    for (x, y, z) in [(12, 5, 12), (12, 7, 12), (12, 8, 12), (14, 6, 12)] {
        let position = config.probe_position(x, y, z);
        assert!(position.x.abs() < 0.7 && position.z.abs() < 0.7);

        let idx = config.index(x, y, z);
        assert_eq!(grid.info(idx, INFO_ACTIVE), 1, "interior probe stays active");
        assert!(
            nonzero_bounce_faces(grid, idx) >= 3,
            "interior probe at {position} should catch bounced light on >=3 faces"
        );
        checked += 1;
    }
    assert_eq!(checked, 4);
}

#[test]
fn probe_buried_in_geometry_goes_inactive() {
    let scene = cornell_scene();
    let coordinator = TaskCoordinator::new();
    let mut accel = CpuAccelerationStructure::with_grids(test_near_grid(), test_far_grid());

    accel.init_bvh(&scene);
    accel.async_process_full(&coordinator);
    drain_bake(&mut accel, &scene, &coordinator);

    // Just below the floor: the short upward ray hits the floor's back
    // face, so the probe is inside geometry.
    let grid = accel.near_baker().grid();
    let config = *grid.config();
    let idx = config.index(12, 1, 12);
    assert!(config.probe_position(12, 1, 12).y < 0.0);
    assert_eq!(grid.info(idx, INFO_ACTIVE), 0);
    assert_eq!(grid.info(idx, INFO_MATERIAL), 0, "floor material recorded");
}

#[test]
fn bake_marks_blurred_probes() {
    let scene = cornell_scene();
    let coordinator = TaskCoordinator::new();
    let mut accel = CpuAccelerationStructure::with_grids(test_near_grid(), test_far_grid());

    accel.init_bvh(&scene);
    accel.async_process_full(&coordinator);
    drain_bake(&mut accel, &scene, &coordinator);

    let grid = accel.near_baker().grid();
    let config = *grid.config();
    let idx = config.index(12, 5, 12);
    assert_eq!(grid.info(idx, INFO_BLURRED), 1);
}

// ============================================================================
// Blur isolation
// ============================================================================

#[test]
fn blur_reads_only_the_shadow_copy() {
    let config = GridConfig {
        size_xy: 4,
        size_z: 4,
        unit: 0.25,
        offset: Vec3::ZERO,
    };
    let grid = CubeGrid::new(config);
    let shadow = CubeGrid::new(config);
    let ctx = empty_trace_context();
    let env = BakeEnvironment::default();
    let mut rng = WangRng::new(1);

    let red = pack_rgb10a2(Vec4::new(1.0, 0.0, 0.0, 1.0));
    for idx in 0..config.cube_count() {
        for face in 0..6 {
            grid.set_bounce(idx, face, red);
        }
    }

    // Snapshot, then corrupt the live lattice. Blur must ignore the
    // corruption because it reads the snapshot.
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..4 {
                process_cube(&grid, &shadow, x, y, z, CubeProc::Copy, &ctx, &env, &mut rng);
            }
        }
    }
    let green = pack_rgb10a2(Vec4::new(0.0, 1.0, 0.0, 1.0));
    for idx in 0..config.cube_count() {
        for face in 0..6 {
            grid.set_bounce(idx, face, green);
        }
    }

    process_cube(&grid, &shadow, 1, 1, 1, CubeProc::Blur, &ctx, &env, &mut rng);

    let idx = config.index(1, 1, 1);
    let blurred = unpack_rgb10a2(grid.bounce(idx, 0));
    assert!(blurred.x > 0.9, "blur output comes from the red snapshot");
    assert!(blurred.y < 0.1, "live-lattice corruption must not leak in");
    assert_eq!(grid.info(idx, INFO_BLURRED), 1);
}

#[test]
fn blur_skips_inactive_neighbours() {
    let config = GridConfig {
        size_xy: 4,
        size_z: 4,
        unit: 0.25,
        offset: Vec3::ZERO,
    };
    let grid = CubeGrid::new(config);
    let shadow = CubeGrid::new(config);
    let ctx = empty_trace_context();
    let env = BakeEnvironment::default();
    let mut rng = WangRng::new(1);

    let white = pack_rgb10a2(Vec4::ONE);
    for idx in 0..config.cube_count() {
        for face in 0..6 {
            grid.set_bounce(idx, face, white);
        }
    }
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..4 {
                process_cube(&grid, &shadow, x, y, z, CubeProc::Copy, &ctx, &env, &mut rng);
            }
        }
    }

    // Deactivate every neighbour in the snapshot except the centre itself.
    for z in 0..4usize {
        for y in 0..4usize {
            for x in 0..4usize {
                if (x, y, z) != (1, 1, 1) {
                    shadow.set_info(config.index(x, y, z), INFO_ACTIVE, 0);
                }
            }
        }
    }

    process_cube(&grid, &shadow, 1, 1, 1, CubeProc::Blur, &ctx, &env, &mut rng);

    let blurred = unpack_rgb10a2(grid.bounce(config.index(1, 1, 1), 0));
    assert!(
        blurred.x > 0.99,
        "with only the centre active the blur is the identity"
    );
}

// ============================================================================
// Bounds
// ============================================================================

#[test]
fn process_cube_is_safe_at_lattice_corners() {
    let config = GridConfig {
        size_xy: 4,
        size_z: 4,
        unit: 0.25,
        offset: Vec3::ZERO,
    };
    let grid = CubeGrid::new(config);
    let shadow = CubeGrid::new(config);
    let ctx = empty_trace_context();
    let env = BakeEnvironment::default();
    let mut rng = WangRng::new(9);

    for proc in [CubeProc::Copy, CubeProc::Blur] {
        for (x, y, z) in [(0, 0, 0), (3, 3, 3), (0, 3, 0), (3, 0, 3)] {
            process_cube(&grid, &shadow, x, y, z, proc, &ctx, &env, &mut rng);
        }
    }
    // Out-of-range coordinates are rejected, not wrapped.
    process_cube(&grid, &shadow, 4, 0, 0, CubeProc::Copy, &ctx, &env, &mut rng);
    process_cube(&grid, &shadow, 0, 9, 0, CubeProc::Blur, &ctx, &env, &mut rng);
}
