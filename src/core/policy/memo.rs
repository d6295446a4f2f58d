use crate::common::constants::{NATIVE_ADJ, UNKNOWN_ADJ};
use std::sync::atomic::{AtomicI32, Ordering};

const EMPTY: i32 = i32::MIN;
/// Raw values the host produces: NATIVE_ADJ up to UNKNOWN_ADJ.
const SLOTS: usize = (UNKNOWN_ADJ - NATIVE_ADJ + 1) as usize;

/// Lock-free cache of `raw -> score`, one slot per possible raw value.
pub struct AdjMemo {
    slots: Box<[AtomicI32]>,
}

impl AdjMemo {
    pub fn new() -> Self {
        Self {
            slots: (0..SLOTS).map(|_| AtomicI32::new(EMPTY)).collect(),
        }
    }

    #[inline]
    fn slot(&self, raw: i32) -> Option<&AtomicI32> {
        let idx = usize::try_from(raw.checked_sub(NATIVE_ADJ)?).ok()?;
        self.slots.get(idx)
    }

    pub fn get_or_compute<F>(&self, raw: i32, f: F) -> i32
    where
        F: FnOnce() -> i32,
    {
        let Some(slot) = self.slot(raw) else {
            return f();
        };
        let cached = slot.load(Ordering::Acquire);
        if cached != EMPTY {
            return cached;
        }
        let v = f();
        slot.store(v, Ordering::Release);
        v
    }

    pub fn clear(&self) {
        for s in self.slots.iter() {
            s.store(EMPTY, Ordering::Release);
        }
    }
}

impl Default for AdjMemo {
    fn default() -> Self {
        Self::new()
    }
}
