use kornia_scan::device::{MAX_TILE_SIZE, MIN_TILE_SIZE};
use kornia_scan::*;

fn dispatcher(caps: Capabilities, config: EngineConfig) -> Dispatcher {
    Dispatcher::new(caps, config)
}

#[test]
fn test_scratch_tree_fits_shared_memory() {
    let caps = Capabilities::host()
        .with_lane_shuffle(false)
        .with_max_shared_memory(1024);
    let dispatcher = dispatcher(caps, EngineConfig::default());

    let cases = [
        (Operation::Reduce, ElemType::F32, 256),
        (Operation::Reduce, ElemType::U64, 128),
        (Operation::Scan(ScanMode::Inclusive), ElemType::U32, 256),
        (Operation::Scan(ScanMode::Exclusive), ElemType::F64, 128),
    ];
    for (op, elem, tile_size) in cases {
        let selection = dispatcher.select(op, elem, 1 << 20).unwrap();
        assert_eq!(selection.tile_size, tile_size, "{op:?} {elem:?}");
        assert_eq!(selection.variant.combine(), CombineStrategy::Scratch);
        assert!(selection.scratch_bytes <= 1024);
        assert!(selection.scratch_bytes <= selection.tile_size as usize * elem.size());
    }
}

#[test]
fn test_lane_groups_use_the_largest_tile() {
    let dispatcher = dispatcher(Capabilities::host(), EngineConfig::default());
    for elem in [ElemType::F32, ElemType::U32, ElemType::F64, ElemType::U64] {
        let selection = dispatcher.select(Operation::Reduce, elem, 100_000).unwrap();
        assert_eq!(selection.tile_size, MAX_TILE_SIZE);
        assert_eq!(selection.variant.combine(), CombineStrategy::LaneGroup);
    }
}

#[test]
fn test_max_tile_size_bounds_the_walk() {
    let config = EngineConfig::default().with_max_tile_size(128);
    let dispatcher = dispatcher(Capabilities::host(), config);
    let selection = dispatcher
        .select(Operation::Scan(ScanMode::Inclusive), ElemType::U32, 10)
        .unwrap();
    assert_eq!(selection.tile_size, 128);

    let device_limited = Capabilities::host().with_max_tile_size(64);
    let dispatcher = self::dispatcher(device_limited, EngineConfig::default());
    let selection = dispatcher
        .select(Operation::Reduce, ElemType::F32, 10)
        .unwrap();
    assert_eq!(selection.tile_size, 64);
}

#[test]
fn test_no_usable_tile_size() {
    let caps = Capabilities::host().with_max_tile_size(MIN_TILE_SIZE / 2);
    let dispatcher = dispatcher(caps, EngineConfig::default());
    assert!(dispatcher.table().is_empty());

    let result = dispatcher.select(Operation::Scan(ScanMode::Exclusive), ElemType::F32, 100);
    assert!(matches!(
        result,
        Err(ScanError::NoUsableTileSize {
            op: OperationKind::Scan,
            elem: ElemType::F32,
            max_tile_size: MAX_TILE_SIZE,
        })
    ));

    // the error reaches the operation before anything runs
    let ctx = RuntimeContext::new(&Device::with_capabilities("tiny", caps).unwrap()).unwrap();
    assert!(matches!(
        sum(&ctx, &[1u32, 2]),
        Err(ScanError::NoUsableTileSize { .. })
    ));
}

#[test]
fn test_forced_tile_size_must_be_in_the_table() {
    let caps = Capabilities::host().with_max_tile_size(256);
    let dispatcher = dispatcher(caps, EngineConfig::default().with_tile_size(512));
    assert!(matches!(
        dispatcher.select(Operation::Reduce, ElemType::U32, 4096),
        Err(ScanError::NoUsableTileSize {
            max_tile_size: 512,
            ..
        })
    ));
}

#[test]
fn test_reducer_selection() {
    let dispatcher = self::dispatcher(Capabilities::host(), EngineConfig::default());
    let selection = dispatcher.select(Operation::Reduce, ElemType::U32, 1 << 16).unwrap();
    assert!(matches!(
        selection.variant,
        KernelVariant::Reduce {
            reducer: Reducer::Cooperative,
            ..
        }
    ));

    // a single tile never needs a cooperative launch
    let selection = dispatcher.select(Operation::Reduce, ElemType::U32, 100).unwrap();
    assert!(matches!(
        selection.variant,
        KernelVariant::Reduce {
            reducer: Reducer::PerTile {
                stride: StridePolicy::Latency
            },
            ..
        }
    ));

    let caps = Capabilities::host()
        .with_cooperative_launch(false)
        .with_stride_policy(StridePolicy::Throughput);
    let dispatcher = self::dispatcher(caps, EngineConfig::default());
    let selection = dispatcher.select(Operation::Reduce, ElemType::F32, 1 << 16).unwrap();
    assert!(matches!(
        selection.variant,
        KernelVariant::Reduce {
            reducer: Reducer::PerTile {
                stride: StridePolicy::Throughput
            },
            ..
        }
    ));
}

#[test]
fn test_config_from_toml() {
    let config = EngineConfig::from_toml_str(
        r#"
        tile_size = 64
        prefer_cooperative = false
        stride_policy = "throughput"
        execution = { fixed = 2 }
        "#,
    )
    .unwrap();
    assert_eq!(config.tile_size, Some(64));
    assert_eq!(config.execution, ExecutionStrategy::Fixed(2));

    let ctx = RuntimeContext::with_config(&Device::new::<HostRuntime>(0).unwrap(), config).unwrap();
    let selection = ctx
        .dispatcher()
        .select(Operation::Reduce, ElemType::U32, 1 << 16)
        .unwrap();
    assert_eq!(selection.tile_size, 64);
    assert!(matches!(
        selection.variant,
        KernelVariant::Reduce {
            reducer: Reducer::PerTile {
                stride: StridePolicy::Throughput
            },
            ..
        }
    ));
    let data: Vec<u32> = (0..1u32 << 16).map(|v| v % 7).collect();
    assert_eq!(sum(&ctx, &data).unwrap(), data.iter().sum::<u32>());
}

#[test]
fn test_invalid_config_is_rejected() {
    for text in ["tile_size = 48", "max_tile_size = 4096", "unknown = 1"] {
        assert!(
            matches!(EngineConfig::from_toml_str(text), Err(ScanError::Config(_))),
            "{text}"
        );
    }
}
