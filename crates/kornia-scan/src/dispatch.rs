//! Kernel selection.
//!
//! A [`StrategyTable`] lists, for one device, every `(operation, tile size,
//! element type)` combination the device can run and how. The [`Dispatcher`]
//! walks tile sizes from the largest allowed down to the smallest and picks the
//! first one present in the table.

use std::collections::HashMap;
use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::device::{Capabilities, MAX_TILE_SIZE, MIN_TILE_SIZE};
use crate::element::ElemType;
use crate::error::{Result, ScanError};
use crate::kernels::reduction::Reducer;
use crate::kernels::scan::ScanMode;
use crate::kernels::strategy::CombineStrategy;
use crate::runtime::TileShape;

/// Operation family, the first key of the strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Sum reduction into an accumulator.
    Reduce,
    /// Two-pass prefix sum.
    Scan,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Reduce => f.write_str("reduce"),
            OperationKind::Scan => f.write_str("scan"),
        }
    }
}

/// A concrete operation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Sum reduction.
    Reduce,
    /// Prefix sum of the given kind.
    Scan(ScanMode),
}

impl Operation {
    /// Table key of the operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Reduce => OperationKind::Reduce,
            Operation::Scan(_) => OperationKind::Scan,
        }
    }
}

/// Key of the strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyKey {
    /// Operation family.
    pub op: OperationKind,
    /// Lanes per tile.
    pub tile_size: u32,
    /// Element type.
    pub elem: ElemType,
}

/// How a structurally present variant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyEntry {
    /// Tile combine.
    pub combine: CombineStrategy,
    /// Scratch bytes a tile needs.
    pub scratch_bytes: usize,
}

/// Every variant a device can run, resolved once per [`Capabilities`].
#[derive(Debug, Clone)]
pub struct StrategyTable {
    entries: HashMap<StrategyKey, StrategyEntry>,
}

impl StrategyTable {
    /// Build the table for `caps`.
    pub fn build(caps: &Capabilities) -> Self {
        let combine = CombineStrategy::for_capabilities(caps);
        let mut entries = HashMap::new();

        for op in [OperationKind::Reduce, OperationKind::Scan] {
            for tile_size in tile_sizes(MAX_TILE_SIZE) {
                if tile_size > caps.max_tile_size {
                    continue;
                }
                let shape = TileShape::new(tile_size, caps.lane_group_width);
                for elem in ElemType::ALL {
                    if op == OperationKind::Reduce && elem.is_64bit() && !caps.atomic_add_64 {
                        continue;
                    }
                    let scratch_bytes = combine.scratch_bytes(op, shape, elem.size());
                    if scratch_bytes > caps.max_shared_memory {
                        continue;
                    }
                    entries.insert(
                        StrategyKey {
                            op,
                            tile_size,
                            elem,
                        },
                        StrategyEntry {
                            combine,
                            scratch_bytes,
                        },
                    );
                }
            }
        }

        log::debug!(
            "strategy table: {} variants ({:?} combine)",
            entries.len(),
            combine
        );
        Self { entries }
    }

    /// Look up one variant.
    pub fn get(&self, key: &StrategyKey) -> Option<&StrategyEntry> {
        self.entries.get(key)
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the device can run nothing at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Kernel variant chosen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelVariant {
    /// Reduction kernel.
    Reduce {
        /// Grid shape.
        reducer: Reducer,
        /// Tile combine.
        combine: CombineStrategy,
    },
    /// Scan kernels.
    Scan {
        /// Tile combine.
        combine: CombineStrategy,
    },
}

impl KernelVariant {
    /// Tile combine of the variant.
    pub fn combine(&self) -> CombineStrategy {
        match self {
            KernelVariant::Reduce { combine, .. } | KernelVariant::Scan { combine } => *combine,
        }
    }
}

/// Result of a dispatch: what to launch and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct KernelSelection {
    /// Lanes per tile.
    pub tile_size: u32,
    /// Kernel variant.
    pub variant: KernelVariant,
    /// Scratch bytes a tile needs.
    pub scratch_bytes: usize,
}

/// Picks a tile size and kernel variant for an operation.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    caps: Capabilities,
    config: EngineConfig,
    table: StrategyTable,
}

impl Dispatcher {
    /// Build a dispatcher for a device.
    pub fn new(caps: Capabilities, config: EngineConfig) -> Self {
        if config.max_tile_size > caps.max_tile_size {
            log::warn!(
                "max_tile_size {} exceeds the device limit of {} lanes; larger tiles are skipped",
                config.max_tile_size,
                caps.max_tile_size
            );
        }
        if config.prefer_cooperative && !caps.cooperative_launch {
            log::debug!("cooperative reduction preferred but not supported by the device");
        }
        Self {
            table: StrategyTable::build(&caps),
            caps,
            config,
        }
    }

    /// The strategy table.
    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    /// Select the kernel for `op` over `count` items of `elem`.
    ///
    /// # Errors
    ///
    /// [`ScanError::NoUsableTileSize`] when no candidate tile size is present in
    /// the strategy table; nothing must be launched then.
    pub fn select(&self, op: Operation, elem: ElemType, count: usize) -> Result<KernelSelection> {
        let kind = op.kind();
        let first = self.config.tile_size.unwrap_or(self.config.max_tile_size);
        let candidates = match self.config.tile_size {
            Some(tile_size) => vec![tile_size],
            None => tile_sizes(first).collect(),
        };

        for tile_size in candidates {
            let key = StrategyKey {
                op: kind,
                tile_size,
                elem,
            };
            let Some(entry) = self.table.get(&key) else {
                log::debug!("{kind} on {elem}: tile size {tile_size} unusable");
                continue;
            };

            let variant = match op {
                Operation::Reduce => KernelVariant::Reduce {
                    reducer: self.reducer(tile_size, count),
                    combine: entry.combine,
                },
                Operation::Scan(_) => KernelVariant::Scan {
                    combine: entry.combine,
                },
            };
            let selection = KernelSelection::new(tile_size, variant, entry.scratch_bytes);
            log::debug!("{kind} on {count} x {elem}: {selection:?}");
            return Ok(selection);
        }

        Err(ScanError::NoUsableTileSize {
            op: kind,
            elem,
            max_tile_size: first,
        })
    }

    fn reducer(&self, tile_size: u32, count: usize) -> Reducer {
        if self.caps.cooperative_launch
            && self.config.prefer_cooperative
            && count > tile_size as usize
        {
            Reducer::Cooperative
        } else {
            Reducer::PerTile {
                stride: self.config.stride_policy.unwrap_or(self.caps.stride_policy),
            }
        }
    }
}

/// Power-of-two tile sizes from `first` down to the smallest candidate.
fn tile_sizes(first: u32) -> impl Iterator<Item = u32> {
    std::iter::successors(Some(first), |&size| Some(size / 2))
        .take_while(|&size| size >= MIN_TILE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StridePolicy;

    fn dispatcher(caps: Capabilities) -> Dispatcher {
        Dispatcher::new(caps, EngineConfig::default())
    }

    #[test]
    fn test_largest_tile_wins() {
        let d = dispatcher(Capabilities::host());
        let selection = d.select(Operation::Reduce, ElemType::F32, 1 << 20).unwrap();
        assert_eq!(selection.tile_size, 1024);
        assert_eq!(
            selection.variant,
            KernelVariant::Reduce {
                reducer: Reducer::Cooperative,
                combine: CombineStrategy::LaneGroup
            }
        );
        assert_eq!(selection.scratch_bytes, 32 * 4);
    }

    #[test]
    fn test_shared_memory_limit_shrinks_tile() {
        // tree scan of f64 needs 8 bytes per lane: 4 KiB fits 512 lanes
        let caps = Capabilities::host()
            .with_lane_shuffle(false)
            .with_max_shared_memory(4096);
        let d = dispatcher(caps);
        let selection = d
            .select(Operation::Scan(ScanMode::Inclusive), ElemType::F64, 10_000)
            .unwrap();
        assert_eq!(selection.tile_size, 512);
        assert_eq!(selection.scratch_bytes, 4096);

        let selection = d
            .select(Operation::Scan(ScanMode::Exclusive), ElemType::U32, 10_000)
            .unwrap();
        assert_eq!(selection.tile_size, 1024);
        assert_eq!(selection.scratch_bytes, 4096);
    }

    #[test]
    fn test_missing_64bit_atomics() {
        let d = dispatcher(Capabilities::host().with_atomic_add_64(false));
        for elem in [ElemType::F64, ElemType::U64] {
            assert!(matches!(
                d.select(Operation::Reduce, elem, 100),
                Err(ScanError::NoUsableTileSize {
                    op: OperationKind::Reduce,
                    max_tile_size: 1024,
                    ..
                })
            ));
            // scans need no atomics
            assert!(d.select(Operation::Scan(ScanMode::Inclusive), elem, 100).is_ok());
        }
        assert!(d.select(Operation::Reduce, ElemType::U32, 100).is_ok());
    }

    #[test]
    fn test_small_device_falls_back_to_min_tile() {
        let d = dispatcher(Capabilities::host().with_max_tile_size(48));
        let selection = d.select(Operation::Reduce, ElemType::U32, 100).unwrap();
        assert_eq!(selection.tile_size, 32);

        let d = dispatcher(Capabilities::host().with_max_tile_size(16));
        assert!(d.select(Operation::Reduce, ElemType::U32, 100).is_err());
    }

    #[test]
    fn test_forced_tile_size() {
        let config = EngineConfig::default().with_tile_size(64);
        let d = Dispatcher::new(Capabilities::host(), config);
        let selection = d.select(Operation::Reduce, ElemType::U32, 10).unwrap();
        assert_eq!(selection.tile_size, 64);

        let caps = Capabilities::host().with_max_tile_size(32);
        let d = Dispatcher::new(caps, EngineConfig::default().with_tile_size(64));
        assert!(matches!(
            d.select(Operation::Reduce, ElemType::U32, 10),
            Err(ScanError::NoUsableTileSize { max_tile_size: 64, .. })
        ));
    }

    #[test]
    fn test_reducer_choice() {
        let config = EngineConfig::default().with_max_tile_size(256);
        let d = Dispatcher::new(Capabilities::host(), config.clone());

        // fits in one tile: nothing to cooperate on
        let selection = d.select(Operation::Reduce, ElemType::U32, 256).unwrap();
        assert_eq!(
            selection.variant,
            KernelVariant::Reduce {
                reducer: Reducer::PerTile {
                    stride: StridePolicy::Latency
                },
                combine: CombineStrategy::LaneGroup
            }
        );

        let d = Dispatcher::new(
            Capabilities::host(),
            config
                .with_prefer_cooperative(false)
                .with_stride_policy(StridePolicy::Throughput),
        );
        let selection = d.select(Operation::Reduce, ElemType::U32, 1 << 16).unwrap();
        assert_eq!(
            selection.variant,
            KernelVariant::Reduce {
                reducer: Reducer::PerTile {
                    stride: StridePolicy::Throughput
                },
                combine: CombineStrategy::LaneGroup
            }
        );
    }

    #[test]
    fn test_table_size() {
        let table = StrategyTable::build(&Capabilities::host());
        // 2 operations x 6 tile sizes x 4 element types
        assert_eq!(table.len(), 48);
        let table = StrategyTable::build(&Capabilities::host().with_atomic_add_64(false));
        assert_eq!(table.len(), 48 - 12);
        assert!(!table.is_empty());
    }
}
