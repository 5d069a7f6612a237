use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

// A key that has never been written.
pub const EMPTY_KEY: i32 = 0;

// A key-value pair in a generation.
//
// The key is claimed once and never changes afterwards. The value word carries
// both the payload and the migration state of the slot, see `Value`.
#[repr(C)]
#[derive(Default)]
pub struct Slot {
    pub key: AtomicI32,
    pub value: AtomicU64,
}

// The state of a slot's value word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value {
    /// The slot holds no value for its key.
    ///
    /// This is the zeroed state of a freshly allocated generation.
    Empty,

    /// A live value.
    Live(i32),

    /// The key was removed.
    Tombstone,

    /// The live value is being copied to the next generation.
    ///
    /// Readers may still return the value, as no write to the key can complete
    /// until the copy does. Writers must help finish the copy and then retry in
    /// the next generation.
    Moving(i32),

    /// The slot was retired. The latest state of the key lives in the next
    /// generation.
    Moved,

    /// The slot held a tombstone when it was retired.
    ///
    /// Readers and writers treat this like `Moved`, but a late copy of the key
    /// from an older generation must stop here, as the key was removed after
    /// the copy being replayed.
    MovedTombstone,
}

impl Value {
    const TAG_SHIFT: u32 = 32;
    const PAYLOAD: u64 = u32::MAX as u64;

    const EMPTY: u64 = 0;
    const LIVE: u64 = 1;
    const TOMBSTONE: u64 = 2;
    const MOVING: u64 = 3;
    const MOVED: u64 = 4;
    const MOVED_TOMBSTONE: u64 = 5;

    // Packs this value into a single word.
    #[inline]
    pub fn pack(self) -> u64 {
        let (tag, payload) = match self {
            Value::Empty => (Value::EMPTY, 0),
            Value::Live(value) => (Value::LIVE, value as u32),
            Value::Tombstone => (Value::TOMBSTONE, 0),
            Value::Moving(value) => (Value::MOVING, value as u32),
            Value::Moved => (Value::MOVED, 0),
            Value::MovedTombstone => (Value::MOVED_TOMBSTONE, 0),
        };

        (tag << Value::TAG_SHIFT) | payload as u64
    }

    // Unpacks a word written by `pack`.
    #[inline]
    pub fn unpack(word: u64) -> Value {
        let payload = (word & Value::PAYLOAD) as u32 as i32;

        match word >> Value::TAG_SHIFT {
            Value::EMPTY => Value::Empty,
            Value::LIVE => Value::Live(payload),
            Value::TOMBSTONE => Value::Tombstone,
            Value::MOVING => Value::Moving(payload),
            Value::MOVED => Value::Moved,
            Value::MOVED_TOMBSTONE => Value::MovedTombstone,
            tag => unreachable!("corrupted slot value tag: {tag}"),
        }
    }

    // Returns the value a reader of this slot observes, if it is not forwarded.
    #[inline]
    pub fn live(self) -> Option<i32> {
        match self {
            Value::Live(value) | Value::Moving(value) => Some(value),
            _ => None,
        }
    }

    // Returns `true` if operations on this slot must continue in the next generation.
    #[inline]
    pub fn is_forwarded(self) -> bool {
        matches!(self, Value::Moving(_) | Value::Moved | Value::MovedTombstone)
    }

    // Returns `true` if this slot was retired.
    #[inline]
    pub fn is_retired(self) -> bool {
        matches!(self, Value::Moved | Value::MovedTombstone)
    }
}

impl Slot {
    // Loads the current value.
    #[inline]
    pub fn load(&self, ordering: Ordering) -> Value {
        Value::unpack(self.value.load(ordering))
    }

    // Performs `CAS(current, new)` on the value word, returning the value found on failure.
    #[inline]
    pub fn compare_exchange(&self, current: Value, new: Value) -> Result<Value, Value> {
        self.value
            .compare_exchange(
                current.pack(),
                new.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(Value::unpack)
            .map_err(Value::unpack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_slot_is_empty() {
        let slot = Slot::default();
        assert_eq!(slot.key.load(Ordering::Relaxed), EMPTY_KEY);
        assert_eq!(slot.load(Ordering::Relaxed), Value::Empty);
    }

    #[test]
    fn extreme_payloads() {
        // Every positive value is representable, including those the tags would
        // otherwise have to reserve.
        for value in [1, i32::MAX] {
            assert_eq!(Value::unpack(Value::Live(value).pack()), Value::Live(value));
            assert_eq!(
                Value::unpack(Value::Moving(value).pack()),
                Value::Moving(value)
            );
        }

        assert_ne!(Value::Moved.pack(), Value::MovedTombstone.pack());
        assert_ne!(Value::Live(i32::MAX).pack(), Value::Tombstone.pack());
    }

    #[test]
    fn forwarding_states() {
        assert_eq!(Value::Moving(7).live(), Some(7));
        assert!(Value::Moving(7).is_forwarded());
        assert!(!Value::Moving(7).is_retired());

        assert!(Value::Moved.is_retired());
        assert!(Value::MovedTombstone.is_retired());
        assert_eq!(Value::MovedTombstone.live(), None);

        assert!(!Value::Tombstone.is_forwarded());
        assert!(!Value::Empty.is_forwarded());
    }

    #[test]
    fn compare_exchange_reports_current() {
        let slot = Slot::default();
        assert_eq!(
            slot.compare_exchange(Value::Empty, Value::Live(3)),
            Ok(Value::Empty)
        );
        assert_eq!(
            slot.compare_exchange(Value::Empty, Value::Live(4)),
            Err(Value::Live(3))
        );
    }
}
