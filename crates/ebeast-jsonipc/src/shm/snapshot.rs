//! Immutable SHM snapshot with typed views.
//!
//! A snapshot is replaced wholesale on every delivery; readers hold an
//! `Arc<ShmSnapshot>` for at most one frame.

use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct ShmSnapshot {
    bytes: Bytes,
    active: bool,
}

impl ShmSnapshot {
    /// All-zero placeholder used while no valid delivery is available
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: Bytes::from(vec![0u8; size]),
            active: false,
        }
    }

    pub(crate) fn delivered(bytes: Bytes) -> Self {
        Self {
            bytes,
            active: true,
        }
    }

    /// Whether the content came from the engine
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn array<const N: usize>(&self, pos: usize) -> Option<[u8; N]> {
        let end = pos.checked_add(N)?;
        self.bytes.get(pos..end)?.try_into().ok()
    }

    pub fn i32_at(&self, pos: usize) -> Option<i32> {
        self.array(pos).map(i32::from_le_bytes)
    }

    pub fn f32_at(&self, pos: usize) -> Option<f32> {
        self.array(pos).map(f32::from_le_bytes)
    }

    pub fn f64_at(&self, pos: usize) -> Option<f64> {
        self.array(pos).map(f64::from_le_bytes)
    }

    /// Element `index` of the 32-bit integer view
    pub fn int32(&self, index: usize) -> Option<i32> {
        self.i32_at(index.checked_mul(4)?)
    }

    /// Element `index` of the 32-bit float view
    pub fn float32(&self, index: usize) -> Option<f32> {
        self.f32_at(index.checked_mul(4)?)
    }

    /// Element `index` of the 64-bit float view
    pub fn float64(&self, index: usize) -> Option<f64> {
        self.f64_at(index.checked_mul(8)?)
    }
}
