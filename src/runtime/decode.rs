/*!
 * Column Decoders
 * Pure reads from fixed-width column chunks into the slot domain
 */

/// Decode a little-endian signed integer of `byte_width` bytes at row
/// `pos`, widened to i64. Null sentinels widen without remapping.
#[inline(always)]
#[must_use]
pub fn decode_fixed_width_int(buffer: &[u8], byte_width: usize, pos: usize) -> i64 {
    let off = pos * byte_width;
    debug_assert!(off + byte_width <= buffer.len(), "decode out of bounds");
    match byte_width {
        1 => buffer[off] as i8 as i64,
        2 => i16::from_le_bytes([buffer[off], buffer[off + 1]]) as i64,
        4 => i32::from_le_bytes([
            buffer[off],
            buffer[off + 1],
            buffer[off + 2],
            buffer[off + 3],
        ]) as i64,
        8 => i64::from_le_bytes([
            buffer[off],
            buffer[off + 1],
            buffer[off + 2],
            buffer[off + 3],
            buffer[off + 4],
            buffer[off + 5],
            buffer[off + 6],
            buffer[off + 7],
        ]),
        _ => unreachable!("unsupported byte width {byte_width}"),
    }
}

/// Decode a 4-byte float at row `pos`
#[inline(always)]
#[must_use]
pub fn decode_float(buffer: &[u8], pos: usize) -> f32 {
    let off = pos * 4;
    debug_assert!(off + 4 <= buffer.len(), "decode out of bounds");
    f32::from_le_bytes([
        buffer[off],
        buffer[off + 1],
        buffer[off + 2],
        buffer[off + 3],
    ])
}

/// Decode an 8-byte float at row `pos`
#[inline(always)]
#[must_use]
pub fn decode_double(buffer: &[u8], pos: usize) -> f64 {
    let off = pos * 8;
    debug_assert!(off + 8 <= buffer.len(), "decode out of bounds");
    f64::from_le_bytes([
        buffer[off],
        buffer[off + 1],
        buffer[off + 2],
        buffer[off + 3],
        buffer[off + 4],
        buffer[off + 5],
        buffer[off + 6],
        buffer[off + 7],
    ])
}

/// Decode a difference-encoded value: stored delta plus baseline
#[inline(always)]
#[must_use]
pub fn decode_diff(buffer: &[u8], byte_width: usize, baseline: i64, pos: usize) -> i64 {
    baseline + decode_fixed_width_int(buffer, byte_width, pos)
}
