//! Buffer Dtype Registry.
//!
//! Maps a buffer identity to its current semantic element type. Pure
//! metadata — no buffer content is copied or inspected.

use std::collections::{HashMap, HashSet};

use crate::buffer::BufferId;

/// Semantic element type of a buffer's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    F32,
    F16,
    Bf16,
    U8QuantizedQ4K,
    U8QuantizedMxfp4,
    U32,
}

impl Dtype {
    /// Size in bytes of one element, for validation purposes.
    /// Block-quantized formats report the packed byte stride of their
    /// smallest addressable unit (one block), not a per-element size —
    /// callers validating quantized buffers must size by block count,
    /// not element count.
    pub const fn bytes_per_element(self) -> u32 {
        match self {
            Dtype::F32 | Dtype::U32 => 4,
            Dtype::F16 | Dtype::Bf16 => 2,
            Dtype::U8QuantizedQ4K => 1,
            Dtype::U8QuantizedMxfp4 => 1,
        }
    }

    pub fn is_half(self) -> bool {
        matches!(self, Dtype::F16 | Dtype::Bf16)
    }
}

impl Default for Dtype {
    fn default() -> Self {
        Dtype::F32
    }
}

/// Buffer identity → current semantic element type.
///
/// Invariants:
/// - after any operator writes a buffer, that buffer's entry equals
///   the variant's declared output type;
/// - reading an unset entry yields [`Dtype::F32`], with a one-time
///   diagnostic per buffer;
/// - rewriting a buffer with a different element type reclassifies it
///   (no aliasing across types — subsequent reads see the new type).
#[derive(Default)]
pub struct BufferDtypeRegistry {
    entries: HashMap<BufferId, Dtype>,
    warned_unset: HashSet<BufferId>,
}

impl BufferDtypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer's current dtype, defaulting to `f32` (with a
    /// one-time warning per buffer) if never set.
    pub fn get_dtype(&mut self, buffer: BufferId) -> Dtype {
        match self.entries.get(&buffer) {
            Some(dtype) => *dtype,
            None => {
                if self.warned_unset.insert(buffer) {
                    log::warn!(
                        "buffer {:?} has no dtype entry; defaulting to f32",
                        buffer
                    );
                }
                Dtype::F32
            }
        }
    }

    /// Sets (or reclassifies) a buffer's dtype.
    pub fn set_dtype(&mut self, buffer: BufferId, dtype: Dtype) {
        self.entries.insert(buffer, dtype);
    }

    /// Whether a buffer has an explicit entry (as opposed to the f32
    /// default).
    pub fn has_entry(&self, buffer: BufferId) -> bool {
        self.entries.contains_key(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut reg = BufferDtypeRegistry::new();
        let id = BufferId::fresh();
        reg.set_dtype(id, Dtype::F16);
        assert_eq!(reg.get_dtype(id), Dtype::F16);
    }

    #[test]
    fn unset_entry_defaults_to_f32() {
        let mut reg = BufferDtypeRegistry::new();
        let id = BufferId::fresh();
        assert_eq!(reg.get_dtype(id), Dtype::F32);
        assert!(!reg.has_entry(id));
    }

    #[test]
    fn reclassification_overwrites_previous_type() {
        let mut reg = BufferDtypeRegistry::new();
        let id = BufferId::fresh();
        reg.set_dtype(id, Dtype::F32);
        reg.set_dtype(id, Dtype::Bf16);
        assert_eq!(reg.get_dtype(id), Dtype::Bf16);
    }

    #[test]
    fn bytes_per_element_matches_spec_table() {
        assert_eq!(Dtype::F32.bytes_per_element(), 4);
        assert_eq!(Dtype::U32.bytes_per_element(), 4);
        assert_eq!(Dtype::F16.bytes_per_element(), 2);
        assert_eq!(Dtype::Bf16.bytes_per_element(), 2);
        assert_eq!(Dtype::U8QuantizedQ4K.bytes_per_element(), 1);
        assert_eq!(Dtype::U8QuantizedMxfp4.bytes_per_element(), 1);
    }
}
