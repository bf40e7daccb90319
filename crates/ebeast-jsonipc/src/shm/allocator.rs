//! SHM slot allocator.
//!
//! Maps engine shared-memory byte ranges onto positions in the locally
//! mirrored snapshot buffer. Slots are never moved, split or merged, so a
//! [`ShmHandle`] stays valid for as long as its subscription lives.

use serde::Serialize;
use tracing::error;

/// Every slot length is a multiple of this
pub const SLOT_ALIGNMENT: usize = 4;
/// Slots longer than [`SLOT_ALIGNMENT`] start at a multiple of this
pub const WIDE_ALIGNMENT: usize = 8;

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// One `(local position, engine offset, length)` entry of a broadcast request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShmFragment {
    pub bpos: usize,
    pub blength: usize,
    pub shmoffset: u64,
}

/// A subscription: byte position inside the snapshot plus the slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmHandle {
    pub position: usize,
    pub index: usize,
}

#[derive(Debug, Clone)]
struct ShmSlot {
    bpos: usize,
    blength: usize,
    /// `None` while free
    shmoffset: Option<u64>,
    usecount: u32,
}

impl ShmSlot {
    fn contains(&self, offset: u64, length: usize) -> bool {
        match self.shmoffset {
            // widened so ranges ending past u64::MAX compare exactly
            Some(start) if self.usecount > 0 => {
                start <= offset
                    && u128::from(start) + self.blength as u128
                        >= u128::from(offset) + length as u128
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShmAllocator {
    slots: Vec<ShmSlot>,
    binary_size: usize,
}

impl ShmAllocator {
    /// `initial_size` bytes at the start of the buffer stay unassigned
    pub fn new(initial_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            binary_size: initial_size,
        }
    }

    /// Subscribe to `length` bytes at engine offset `offset`.
    ///
    /// Returns the handle and whether the broadcast request must be resent.
    /// A range inside an active slot shares that slot and needs no resync.
    pub fn subscribe(&mut self, offset: u64, length: usize) -> (ShmHandle, bool) {
        let length = align_up(length, SLOT_ALIGNMENT);

        if let Some((index, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.contains(offset, length))
        {
            slot.usecount += 1;
            let start = slot.shmoffset.unwrap_or(offset);
            let position = slot.bpos + (offset - start) as usize;
            return (ShmHandle { position, index }, false);
        }

        if let Some((index, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.usecount == 0 && slot.blength == length)
        {
            slot.shmoffset = Some(offset);
            slot.usecount = 1;
            let handle = ShmHandle {
                position: slot.bpos,
                index,
            };
            return (handle, true);
        }

        let bpos = if length > SLOT_ALIGNMENT {
            align_up(self.binary_size, WIDE_ALIGNMENT)
        } else {
            self.binary_size
        };
        self.binary_size = bpos + length;
        self.slots.push(ShmSlot {
            bpos,
            blength: length,
            shmoffset: Some(offset),
            usecount: 1,
        });
        let handle = ShmHandle {
            position: bpos,
            index: self.slots.len() - 1,
        };
        (handle, true)
    }

    /// Drop one reference of the handle's slot. Returns whether the slot was
    /// freed, in which case the broadcast request must be resent.
    ///
    /// # Panics
    ///
    /// If the handle does not name a slot or the slot is not referenced.
    pub fn unsubscribe(&mut self, handle: ShmHandle) -> bool {
        if handle.index >= self.slots.len() {
            error!(
                index = handle.index,
                position = handle.position,
                slots = self.slots.len(),
                "SHM unsubscribe of unknown slot"
            );
        }
        assert!(
            handle.index < self.slots.len(),
            "SHM handle index {} out of range ({} slots)",
            handle.index,
            self.slots.len()
        );
        let slot = &mut self.slots[handle.index];
        if slot.usecount == 0 {
            error!(
                index = handle.index,
                position = handle.position,
                "SHM unsubscribe of unreferenced slot"
            );
        }
        assert!(
            slot.usecount > 0,
            "SHM slot {} unsubscribed without a reference",
            handle.index
        );

        slot.usecount -= 1;
        if slot.usecount == 0 {
            slot.shmoffset = None;
            return true;
        }
        false
    }

    /// Active slots, in index order
    pub fn fragments(&self) -> Vec<ShmFragment> {
        self.slots
            .iter()
            .filter(|slot| slot.usecount > 0)
            .filter_map(|slot| {
                slot.shmoffset.map(|shmoffset| ShmFragment {
                    bpos: slot.bpos,
                    blength: slot.blength,
                    shmoffset,
                })
            })
            .collect()
    }

    /// Bytes a snapshot must hold to cover every slot ever allocated
    pub fn binary_size(&self) -> usize {
        self.binary_size
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn usecount(&self, index: usize) -> Option<u32> {
        self.slots.get(index).map(|slot| slot.usecount)
    }
}
