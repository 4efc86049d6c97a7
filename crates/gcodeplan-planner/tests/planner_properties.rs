//! Property tests for trapezoids, look-ahead passes and queue timing

use gcodeplan_core::{AxisCoords, ExtrusionRole, MoveType, TimeMode};
use gcodeplan_planner::passes::plan;
use gcodeplan_planner::{FeedrateProfile, MovePath, MoveRequest, TimeBlock, TimeMachine};
use gcodeplan_settings::{AxisLimits, ModeLimits};
use proptest::prelude::*;

fn block_strategy() -> impl Strategy<Value = TimeBlock> {
    (0.01f32..200.0, 10.0f32..5000.0, 0.0f32..300.0, 0.0f32..300.0, 0.0f32..300.0).prop_map(
        |(distance, acceleration, a, b, c)| {
            let cruise = a.max(b).max(c);
            let mut block = TimeBlock {
                distance,
                acceleration,
                max_entry_speed: a,
                safe_feedrate: c,
                feedrate_profile: FeedrateProfile {
                    entry: a.min(cruise),
                    cruise,
                    exit: c.min(cruise),
                },
                ..TimeBlock::default()
            };
            block.calculate_trapezoid();
            block
        },
    )
}

fn moves_strategy() -> impl Strategy<Value = Vec<(f32, f32, f32)>> {
    prop::collection::vec((-50.0f32..50.0, -50.0f32..50.0, 5.0f32..200.0), 2..40)
}

fn limits() -> ModeLimits {
    ModeLimits {
        max_jerk: AxisLimits::new(8.0, 8.0, 0.4, 2.5),
        ..ModeLimits::default()
    }
}

fn request(move_id: usize, dx: f32, dy: f32, feedrate: f32) -> MoveRequest {
    let delta = AxisCoords([dx, dy, 0.0, 0.0]);
    MoveRequest {
        move_type: MoveType::Travel,
        role: ExtrusionRole::None,
        skippable: false,
        move_id,
        g1_line_id: move_id as u32 + 1,
        layer_id: 1,
        prepare_stage: false,
        delta,
        distance: delta.xyz_length(),
        feedrate,
        path: MovePath::Line,
        extruder_id: 0,
    }
}

proptest! {
    #[test]
    fn trapezoid_stays_within_block(block in block_strategy()) {
        let t = block.trapezoid;
        prop_assert!(t.accelerate_until >= 0.0);
        prop_assert!(t.accelerate_until <= t.decelerate_after + 1e-3);
        prop_assert!(t.decelerate_after <= block.distance + 1e-3);
        prop_assert!(block.time() >= 0.0);
        prop_assert!(block.time().is_finite());
    }

    #[test]
    fn passes_are_idempotent(moves in moves_strategy()) {
        let limits = limits();
        let mut machine = TimeMachine::new(TimeMode::Normal, &limits);
        machine.set_enabled(true);
        for (i, (dx, dy, f)) in moves.iter().enumerate() {
            if dx.abs() + dy.abs() < 0.01 {
                continue;
            }
            machine.plan_move(&request(i, *dx, *dy, *f), &limits);
        }
        let mut blocks: Vec<TimeBlock> = machine.blocks().to_vec();
        plan(&mut blocks);
        let first: Vec<f32> = blocks.iter().map(|b| b.time()).collect();
        plan(&mut blocks);
        let second: Vec<f32> = blocks.iter().map(|b| b.time()).collect();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_unlimited_machine_is_pure_cruise() {
    let limits = ModeLimits {
        max_feedrate: AxisLimits::new(0.0, 0.0, 0.0, 0.0),
        max_acceleration: AxisLimits::new(0.0, 0.0, 0.0, 0.0),
        max_jerk: AxisLimits::new(f32::INFINITY, f32::INFINITY, f32::INFINITY, f32::INFINITY),
        print_acceleration: 1e9,
        retract_acceleration: 1e9,
        travel_acceleration: 1e9,
        max_print_acceleration: 0.0,
        max_retract_acceleration: 0.0,
        max_travel_acceleration: 0.0,
        ..ModeLimits::default()
    };
    let mut machine = TimeMachine::new(TimeMode::Normal, &limits);
    machine.set_enabled(true);

    let moves = [(10.0, 0.0, 10.0), (0.0, 5.0, 20.0), (-3.0, 4.0, 50.0)];
    let mut expected = 0.0;
    for (i, (dx, dy, f)) in moves.iter().enumerate() {
        let r = request(i, *dx, *dy, *f);
        expected += r.distance / f;
        machine.plan_move(&r, &limits);
    }
    machine.finalize();
    assert!((machine.time() - expected).abs() < 1e-4);
}

#[test]
fn test_two_collinear_travel_moves() {
    let limits = ModeLimits {
        max_jerk: AxisLimits::new(1000.0, 1000.0, 1000.0, 1000.0),
        print_acceleration: 1000.0,
        travel_acceleration: 1000.0,
        ..ModeLimits::default()
    };
    let mut machine = TimeMachine::new(TimeMode::Normal, &limits);
    machine.set_enabled(true);
    machine.plan_move(&request(0, 10.0, 0.0, 10.0), &limits);
    machine.plan_move(&request(1, 10.0, 0.0, 10.0), &limits);
    let moves = machine.finalize();
    assert_eq!(moves.len(), 2);
    assert!((machine.time() - 2.0).abs() < 1e-4);
    let travel = machine.moves_time()[MoveType::Travel.index()];
    assert!((travel - 2.0).abs() < 1e-4);
}
