/*!
 * Runtime Error Codes and Interrupt Flag
 *
 * Per-row failures never cross the kernel boundary as exceptions; they
 * are int32 codes written into the kernel's error-code buffer. Codes > 0
 * are persistent: once recorded for a slot they are never overwritten.
 */

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// No error
pub const ERR_NONE: i32 = 0;
/// Integer or floating-point division by zero
pub const ERR_DIV_BY_ZERO: i32 = 1;
/// Arithmetic overflow (including decimal rescale)
pub const ERR_OVERFLOW: i32 = 2;
/// Group-by output buffer ran out of slots
pub const ERR_OUT_OF_SLOTS: i32 = 3;
/// Watchdog interrupt tripped
pub const ERR_INTERRUPTED: i32 = 4;
/// SINGLE_VALUE aggregate saw more than one distinct value
pub const ERR_SINGLE_VALUE_MULTIPLE_VALUES: i32 = 15;

/// Process-wide interrupt flag polled by row functions
static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(false);

/// Record an error code into a kernel slot. The first nonzero code wins;
/// later codes of any kind never overwrite it.
#[inline(always)]
pub fn record_error_code(code: i32, slot: &mut i32) {
    if *slot == ERR_NONE {
        *slot = code;
    }
}

/// Shared-memory (GPU model) form of [`record_error_code`]: the first
/// writer wins the slot.
#[inline(always)]
pub fn record_error_code_shared(code: i32, slot: &AtomicI32) {
    let _ = slot.compare_exchange(ERR_NONE, code, Ordering::Relaxed, Ordering::Relaxed);
}

/// Read the process-wide interrupt flag
#[inline(always)]
#[must_use]
pub fn check_interrupt() -> bool {
    INTERRUPT_FLAG.load(Ordering::Relaxed)
}

/// Arm or clear the process-wide interrupt flag
pub fn set_interrupt(value: bool) {
    INTERRUPT_FLAG.store(value, Ordering::SeqCst);
}

/// Human-readable description of a runtime error code
#[must_use]
pub fn error_message(code: i32) -> &'static str {
    match code {
        ERR_NONE => "no error",
        ERR_DIV_BY_ZERO => "division by zero",
        ERR_OVERFLOW => "arithmetic overflow",
        ERR_OUT_OF_SLOTS => "group-by buffer out of slots",
        ERR_INTERRUPTED => "query interrupted",
        ERR_SINGLE_VALUE_MULTIPLE_VALUES => "more than one value for SINGLE_VALUE aggregate",
        _ => "unknown runtime error",
    }
}
