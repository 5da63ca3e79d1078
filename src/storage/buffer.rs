/*!
 * Column Buffers
 * Contiguous byte regions with an encoding descriptor
 */

use crate::core::types::DictId;
use std::sync::Arc;

/// Physical encoding of a column chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Little-endian fixed-width values
    FixedWidth { byte_width: usize },
    /// Fixed-width deltas against a baseline value
    DiffFixedWidth { byte_width: usize, baseline: i64 },
    /// Dictionary-encoded text: i32 ids into a dictionary
    Dictionary { byte_width: usize, dict_id: DictId },
}

impl Encoding {
    #[inline]
    #[must_use]
    pub const fn byte_width(&self) -> usize {
        match self {
            Encoding::FixedWidth { byte_width }
            | Encoding::DiffFixedWidth { byte_width, .. }
            | Encoding::Dictionary { byte_width, .. } => *byte_width,
        }
    }
}

/// An immutable column chunk: raw bytes plus their encoding.
///
/// Payloads are shared (`Arc`) so pinned views, pool residents, and
/// zero-copy wrappers all alias one allocation.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    data: Arc<[u8]>,
    encoding: Encoding,
}

impl ColumnBuffer {
    #[must_use]
    pub fn new(data: Arc<[u8]>, encoding: Encoding) -> Self {
        Self { data, encoding }
    }

    /// Build a fixed-width buffer from i64 values, narrowing to the given
    /// byte width.
    #[must_use]
    pub fn from_i64_slice(values: &[i64], byte_width: usize) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * byte_width);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes()[..byte_width]);
        }
        Self {
            data: bytes.into(),
            encoding: Encoding::FixedWidth { byte_width },
        }
    }

    /// Build a dictionary-encoded buffer from i32 ids
    #[must_use]
    pub fn from_dict_ids(ids: &[i32], dict_id: DictId) -> Self {
        let mut bytes = Vec::with_capacity(ids.len() * 4);
        for id in ids {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        Self {
            data: bytes.into(),
            encoding: Encoding::Dictionary {
                byte_width: 4,
                dict_id,
            },
        }
    }

    /// Build an 8-byte float buffer
    #[must_use]
    pub fn from_f64_slice(values: &[f64]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            data: bytes.into(),
            encoding: Encoding::FixedWidth { byte_width: 8 },
        }
    }

    /// Build a 4-byte float buffer
    #[must_use]
    pub fn from_f32_slice(values: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            data: bytes.into(),
            encoding: Encoding::FixedWidth { byte_width: 4 },
        }
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    #[inline]
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[inline]
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// Number of encoded values
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.len() / self.encoding.byte_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::decode::decode_fixed_width_int;

    #[test]
    fn test_narrowing_round_trip() {
        let buf = ColumnBuffer::from_i64_slice(&[1, -2, 300], 2);
        assert_eq!(buf.row_count(), 3);
        assert_eq!(decode_fixed_width_int(buf.bytes(), 2, 0), 1);
        assert_eq!(decode_fixed_width_int(buf.bytes(), 2, 1), -2);
        assert_eq!(decode_fixed_width_int(buf.bytes(), 2, 2), 300);
    }

    #[test]
    fn test_dict_buffer_width() {
        let buf = ColumnBuffer::from_dict_ids(&[0, 1, 0], 7);
        assert_eq!(buf.encoding().byte_width(), 4);
        assert_eq!(buf.row_count(), 3);
    }
}
