/*!
 * Shared helpers for engine integration tests
 */

use helios_engine::core::types::{TypeDesc, TypeKind};
use helios_engine::result::TargetValue;
use helios_engine::storage::{ColumnBuffer, MemTableProvider};
use helios_engine::{Engine, EngineConfig};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber once; RUST_LOG filters kernel traces
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn make_engine(provider: Arc<MemTableProvider>) -> Engine {
    init_tracing();
    Engine::new(provider, EngineConfig::default())
}

pub fn make_engine_with_config(provider: Arc<MemTableProvider>, config: EngineConfig) -> Engine {
    Engine::with_devices(
        provider,
        config,
        vec![helios_engine::DeviceMemoryInfo::new(
            helios_engine::DeviceKind::Cpu,
            0,
            usize::MAX / 2,
        )],
    )
}

pub fn bigint_ty() -> TypeDesc {
    TypeDesc::new(TypeKind::BigInt, false)
}

pub fn int_ty(nullable: bool) -> TypeDesc {
    TypeDesc::new(TypeKind::Int, nullable)
}

/// Register a one-column BigInt table as a single fragment
pub fn single_bigint_table(provider: &MemTableProvider, table: u32, values: &[i64]) {
    provider.add_table(table, vec![bigint_ty()]);
    provider.add_fragment(table, vec![ColumnBuffer::from_i64_slice(values, 8)]);
}

/// Extract (i64, i64) pairs from two-target rows
pub fn int_pairs(rows: &[Vec<TargetValue>]) -> Vec<(i64, i64)> {
    rows.iter()
        .map(|r| {
            (
                r[0].as_i64().expect("first target is an integer"),
                r[1].as_i64().expect("second target is an integer"),
            )
        })
        .collect()
}

/// Extract single-target integer rows
pub fn int_rows(rows: &[Vec<TargetValue>]) -> Vec<i64> {
    rows.iter()
        .map(|r| r[0].as_i64().expect("target is an integer"))
        .collect()
}
