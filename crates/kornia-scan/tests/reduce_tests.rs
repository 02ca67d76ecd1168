//! Reduction tests over every tile size, lane-group width and reducer variant.

use kornia_scan::reference::{kahan_sum, sequential_sum};
use kornia_scan::*;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TOLERANCE: f32 = 1e-4;

fn relative_error(computed: f32, reference: f32) -> f32 {
    (computed - reference).abs() / reference.abs().max(1.0)
}

fn random_u32(len: usize, seed: u64) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..=1000)).collect()
}

fn random_f32(len: usize, seed: u64) -> Vec<f32> {
    let rng = StdRng::seed_from_u64(seed);
    rng.sample_iter(Uniform::new(0.0f32, 1.0)).take(len).collect()
}

/// Contexts forcing `tile_size` across lane-group widths, shuffle support and
/// every reducer: cooperative, per-tile throughput, per-tile latency with a
/// capped grid so lanes walk several items.
fn contexts(tile_size: u32) -> Vec<(String, RuntimeContext)> {
    let mut contexts = Vec::new();
    for width in [8, 16, 32, 64] {
        for shuffle in [true, false] {
            let caps = Capabilities::host()
                .with_lane_group_width(width)
                .with_lane_shuffle(shuffle)
                .with_max_concurrent_tiles(4);
            let base = EngineConfig::default().with_tile_size(tile_size);
            let configs = [
                ("cooperative", base.clone()),
                (
                    "throughput",
                    base.clone()
                        .with_prefer_cooperative(false)
                        .with_stride_policy(StridePolicy::Throughput),
                ),
                (
                    "latency",
                    base.with_prefer_cooperative(false)
                        .with_stride_policy(StridePolicy::Latency)
                        .with_max_tiles(3),
                ),
            ];
            for (name, config) in configs {
                let device = Device::with_capabilities("host", caps).unwrap();
                let label = format!("width {width} shuffle {shuffle} {name}");
                contexts.push((label, RuntimeContext::with_config(&device, config).unwrap()));
            }
        }
    }
    contexts
}

macro_rules! testgen_reduce {
    ($($tile:literal),*) => {
        ::paste::paste! {
            $(
                mod [<tile_ $tile>] {
                    use super::*;

                    const TILE: u32 = $tile;

                    #[test]
                    fn test_u32_sum_is_exact() {
                        let data = random_u32(3 * TILE as usize + 7, 42);
                        let expected: u32 = data.iter().sum();
                        for (label, ctx) in contexts(TILE) {
                            assert_eq!(sum(&ctx, &data).unwrap(), expected, "{label}");
                        }
                    }

                    #[test]
                    fn test_f32_sum_within_tolerance() {
                        let data = random_f32(10_000, 7);
                        let reference = kahan_sum(&data);
                        for (label, ctx) in contexts(TILE) {
                            let computed = sum(&ctx, &data).unwrap();
                            let error = relative_error(computed, reference);
                            assert!(error < TOLERANCE, "{label}: {computed} vs {reference}");
                        }
                    }

                    #[test]
                    fn test_exactly_one_tile() {
                        let data = random_u32(TILE as usize, 3);
                        for (label, ctx) in contexts(TILE) {
                            assert_eq!(sum(&ctx, &data).unwrap(), sequential_sum(&data), "{label}");
                        }
                    }
                }
            )*
        }
    };
}

testgen_reduce!(32, 64, 128, 256, 512, 1024);

#[test]
fn test_concrete_scenario() {
    let ctx = RuntimeContext::new(&Device::new::<HostRuntime>(0).unwrap()).unwrap();
    assert_eq!(sum(&ctx, &[4u32, 1, 5, 3, 4, 2, 7, 9, 1, 2, 3, 4]).unwrap(), 45);
}

#[test]
fn test_boundary_counts() {
    for (_, ctx) in contexts(32) {
        assert_eq!(sum::<u32>(&ctx, &[]).unwrap(), 0);
        assert_eq!(sum::<f32>(&ctx, &[]).unwrap(), 0.0);
        assert_eq!(sum(&ctx, &[17u32]).unwrap(), 17);
        assert_eq!(sum(&ctx, &[2.5f64]).unwrap(), 2.5);
    }
}

#[test]
fn test_all_element_types() {
    let ctx = RuntimeContext::new(&Device::new::<HostRuntime>(0).unwrap()).unwrap();
    let data = random_u32(5000, 11);
    let expected: u64 = data.iter().map(|&v| v as u64).sum();

    let wide: Vec<u64> = data.iter().map(|&v| v as u64).collect();
    assert_eq!(sum(&ctx, &wide).unwrap(), expected);

    // integers up to 2^53 are exact in f64
    let doubles: Vec<f64> = data.iter().map(|&v| v as f64).collect();
    assert_eq!(sum(&ctx, &doubles).unwrap(), expected as f64);

    let mean_value = mean(&ctx, &doubles).unwrap();
    assert!((mean_value - expected as f64 / 5000.0).abs() < 1e-9);
}

#[test]
fn test_redispatch_is_idempotent() {
    let data = random_f32(50_000, 99);
    for (label, ctx) in contexts(256) {
        let acc = Accumulator::zeroed();
        reduce_add(&ctx, &data, &acc).unwrap();
        let first = acc.load();

        acc.reset();
        reduce_add(&ctx, &data, &acc).unwrap();
        let second = acc.load();

        assert!(relative_error(first, second) < TOLERANCE, "{label}");
    }
}

#[test]
fn test_accumulator_is_only_added_to() {
    let ctx = RuntimeContext::new(&Device::new::<HostRuntime>(0).unwrap()).unwrap();
    let acc = Accumulator::zeroed();
    acc.fetch_add(100u32);
    reduce_add(&ctx, &[1u32, 2, 3], &acc).unwrap();
    assert_eq!(acc.load(), 106);
}

#[test]
fn test_execution_strategies_agree() {
    let data = random_u32(100_000, 5);
    let expected: u32 = data.iter().sum();
    for execution in [
        ExecutionStrategy::Serial,
        ExecutionStrategy::Parallel,
        ExecutionStrategy::Fixed(2),
    ] {
        for prefer_cooperative in [true, false] {
            let config = EngineConfig::default()
                .with_execution(execution)
                .with_prefer_cooperative(prefer_cooperative);
            let device = Device::new::<HostRuntime>(0).unwrap();
            let ctx = RuntimeContext::with_config(&device, config).unwrap();
            assert_eq!(sum(&ctx, &data).unwrap(), expected, "{execution:?}");
        }
    }
}

#[test]
fn test_missing_64bit_atomics_is_fatal() {
    let caps = Capabilities::host().with_atomic_add_64(false);
    let ctx = RuntimeContext::new(&Device::with_capabilities("narrow", caps).unwrap()).unwrap();
    let acc = Accumulator::zeroed();
    let result = reduce_add(&ctx, &[1u64, 2, 3], &acc);
    assert!(matches!(
        result,
        Err(ScanError::NoUsableTileSize {
            op: OperationKind::Reduce,
            elem: ElemType::U64,
            ..
        })
    ));
    assert_eq!(acc.load(), 0);
    assert_eq!(sum(&ctx, &[1u32, 2, 3]).unwrap(), 6);
}
