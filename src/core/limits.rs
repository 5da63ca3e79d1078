/*!
 * Engine Limits and Constants
 *
 * Centralized location for engine-wide limits, thresholds, and magic numbers.
 * Organized by domain for maintainability and discoverability.
 */

// =============================================================================
// GROUP-BY LAYOUT LIMITS
// =============================================================================

/// Maximum entry count for a perfect-hash group-by layout.
/// Above this a dense key range no longer pays for itself and baseline
/// hashing is preferred.
pub const BIG_GROUP_THRESHOLD: usize = 20_000;

/// Default upper bound on baseline hash entry count before cardinality
/// estimation is required.
pub const BASELINE_MAX_GROUPS: usize = 2_000_000;

/// Fill fraction target for baseline hash tables.
/// Entry count = estimated groups / this factor, so probes stay short.
pub const BASELINE_FILL_RATE: f64 = 0.5;

/// Maximum limit + offset for the streaming top-N layout.
/// Above this the bounded per-thread heap is worse than a full sort.
pub const STREAMING_TOP_N_MAX: usize = 100_000;

// =============================================================================
// COUNT DISTINCT
// =============================================================================

/// Maximum key range (max - min + 1) for the bitmap count-distinct
/// representation. One bit per potential value.
pub const COUNT_DISTINCT_BITMAP_MAX_RANGE: i64 = 8 * 1024 * 1024;

/// HLL precision parameter b: 2^b registers.
/// Standard error = 1.04 / sqrt(2^b), ~1.6% at 12.
pub const HLL_PRECISION_DEFAULT: u8 = 12;

// =============================================================================
// JOIN HASH TABLES
// =============================================================================

/// Hard cap on join hash table entries (~2B); larger inner sides must be
/// rejected before build.
pub const MAX_HASH_ENTRIES: usize = 2_000_000_000;

/// Sentinel stored in empty OneToOne hash slots
pub const JOIN_EMPTY_SLOT: i32 = -1;

// =============================================================================
// BUFFER POOL
// =============================================================================

/// Page size for pool slabs (512B). Chunk sizes are rounded up to pages.
pub const POOL_PAGE_SIZE: usize = 512;

/// Default slab size per tier (256MB CPU tier)
pub const DEFAULT_SLAB_SIZE: usize = 256 * 1024 * 1024;

/// Minimum slab size when halving on OOM (4MB)
pub const MIN_SLAB_SIZE: usize = 4 * 1024 * 1024;

/// Default GPU tier slab size (128MB)
pub const DEFAULT_GPU_SLAB_SIZE: usize = 128 * 1024 * 1024;

/// Fraction of device memory usable for query input buffers
pub const DEFAULT_GPU_INPUT_MEM_LIMIT_PERCENT: f64 = 0.9;

// =============================================================================
// WATCHDOG / INTERRUPT
// =============================================================================

/// Row interval between interrupt-flag polls in the row function.
/// Polling is a relaxed atomic load; the interval keeps it off the
/// per-row critical path.
pub const WATCHDOG_ROW_INTERVAL: usize = 4096;

/// Probe interval between interrupt-flag polls during group-value probing
pub const WATCHDOG_PROBE_INTERVAL: usize = 4096;

// =============================================================================
// GPU MODEL
// =============================================================================

/// Maximum perfect-hash entry count that fits the shared-memory
/// aggregation path on the GPU model
pub const GPU_SHARED_MEM_MAX_ENTRIES: usize = 4096;

/// Warps per block assumed when shared-memory aggregation is on
pub const GPU_SHARED_MEM_WARP_COUNT: usize = 4;

// =============================================================================
// CODE CACHE
// =============================================================================

/// Maximum resident compiled kernels before LRU eviction
pub const CODE_CACHE_MAX_ENTRIES: usize = 128;

// =============================================================================
// OUTPUT
// =============================================================================

/// Key sentinel marking an unoccupied group-by entry
pub const EMPTY_KEY_64: i64 = i64::MAX - 1;

/// Key sentinel for 32-bit key columns
pub const EMPTY_KEY_32: i32 = i32::MAX - 1;
