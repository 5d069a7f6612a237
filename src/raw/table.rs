use std::sync::atomic::Ordering;

use super::alloc::Table;
use super::probe::Probe;
use super::slot::{Value, EMPTY_KEY};

// The result of a lookup in a single generation.
pub enum Lookup {
    // The latest state of the key, which may be absent.
    Found(Option<i32>),

    // The key must be looked up in the next generation.
    Forward,
}

// The result of a write in a single generation.
pub enum Update {
    // The write took effect, replacing the given value.
    Done(Option<i32>),

    // The write must be retried in the next generation.
    //
    // Holds the index of the slot if it is still being copied, in which case the
    // copy must complete before the write can proceed.
    Forward(Option<usize>),

    // The probe limit was exceeded and the generation must be resized.
    Full,
}

// The result of copying a value into a generation.
pub enum CopyStatus {
    // The value was copied, or a newer state of the key was already present.
    Done,

    // The slot was retired, the copy must continue in the next generation.
    Forward,

    // The probe limit was exceeded and the generation must be resized.
    Full,
}

// The position of a key in the probe sequence.
enum Position {
    // The slot holding the key.
    Occupied(usize),

    // An unclaimed slot where the key would be inserted.
    Vacant(usize),

    // The key is not within the probe limit, and no slot could be claimed.
    Exhausted,
}

/// Generation operations.
impl Table {
    /// Returns the value for a key, or whether the lookup must continue in the next generation.
    ///
    /// Never initiates or helps a migration.
    pub fn get(&self, key: i32) -> Lookup {
        match self.probe(key, false) {
            Position::Occupied(i) => {
                // Safety: `probe` only returns in-bounds indices.
                let value = unsafe { self.slot(i) }.load(Ordering::Acquire);

                // The slot was retired, the key's latest state is in the next generation.
                //
                // A value that is still being copied is the latest value, as any writer
                // must complete the copy before making progress.
                if value.is_retired() {
                    return Lookup::Forward;
                }

                Lookup::Found(value.live())
            }

            Position::Vacant(i) => {
                // Safety: `probe` only returns in-bounds indices.
                let value = unsafe { self.slot(i) }.load(Ordering::Acquire);

                // An unclaimed slot is only ever retired after the resize started. The
                // table may have been promoted past since, in which case new keys
                // are written directly to the next generation.
                if value.is_retired() {
                    return Lookup::Forward;
                }

                // The key is not in this generation, nor any later one.
                Lookup::Found(None)
            }

            // Went over the probe limit, the key can only have been inserted
            // into the next generation, if there is one.
            Position::Exhausted => match self.next_table() {
                Some(_) => Lookup::Forward,
                None => Lookup::Found(None),
            },
        }
    }

    /// Writes a live value or a tombstone for a key.
    ///
    /// Live values claim a slot for the key if necessary, while a tombstone is
    /// only written over an existing key.
    pub fn update(&self, key: i32, new: Value) -> Update {
        debug_assert!(matches!(new, Value::Live(_) | Value::Tombstone));

        let i = match self.probe(key, new != Value::Tombstone) {
            Position::Occupied(i) => i,

            Position::Vacant(i) => {
                // Safety: `probe` only returns in-bounds indices.
                let value = unsafe { self.slot(i) }.load(Ordering::Acquire);

                if value.is_retired() {
                    return Update::Forward(None);
                }

                // Nothing to remove.
                return Update::Done(None);
            }

            // Removing a key never requires space. If there is no next generation
            // the key cannot exist anywhere.
            Position::Exhausted if new == Value::Tombstone => {
                return match self.next_table() {
                    Some(_) => Update::Forward(None),
                    None => Update::Done(None),
                };
            }

            Position::Exhausted => return Update::Full,
        };

        // Safety: `probe` only returns in-bounds indices.
        let slot = unsafe { self.slot(i) };
        let mut current = slot.load(Ordering::Acquire);

        loop {
            match current {
                // The slot is being copied, the copy has to complete before we
                // can write to the next generation.
                Value::Moving(_) => return Update::Forward(Some(i)),

                // The slot was retired, retry in the next generation.
                Value::Moved | Value::MovedTombstone => return Update::Forward(None),

                // The key is already absent.
                Value::Empty | Value::Tombstone if new == Value::Tombstone => {
                    return Update::Done(None)
                }

                _ => {}
            }

            match slot.compare_exchange(current, new) {
                // Successful update.
                Ok(_) => return Update::Done(current.live()),

                // Lost to a concurrent update or copy, retry.
                Err(found) => current = found,
            }
        }
    }

    /// Copies a value into this generation, unless the key already has a newer state.
    ///
    /// This is the insert-if-absent used by migration, it never overwrites a value a
    /// writer has already placed in this generation.
    pub fn insert_copy(&self, key: i32, value: i32) -> CopyStatus {
        let Position::Occupied(i) = self.probe(key, true) else {
            return CopyStatus::Full;
        };

        // Safety: `probe` only returns in-bounds indices.
        let slot = unsafe { self.slot(i) };

        match slot.compare_exchange(Value::Empty, Value::Live(value)) {
            Ok(_) => CopyStatus::Done,

            // The slot was retired before receiving a value, so the copy belongs in
            // the next generation.
            Err(Value::Moved) => CopyStatus::Forward,

            // The key was written, removed, or copied from here already. Either
            // way the copy is stale.
            Err(_) => CopyStatus::Done,
        }
    }

    /// Marks the slot at the given index for migration.
    ///
    /// Returns the value that has to be copied to the next generation, or `None`
    /// if the slot was retired without a copy.
    ///
    /// # Safety
    ///
    /// The index must be in-bounds for the table.
    pub unsafe fn mark_moving(&self, i: usize) -> Option<i32> {
        // Safety: Guaranteed by the caller.
        let slot = unsafe { self.slot(i) };
        let mut current = slot.load(Ordering::Acquire);

        loop {
            let new = match current {
                // Already retired.
                Value::Moved | Value::MovedTombstone => return None,

                // Someone else marked the slot, join the copy.
                Value::Moving(value) => return Some(value),

                // Nothing to copy.
                Value::Empty => Value::Moved,
                Value::Tombstone => Value::MovedTombstone,

                Value::Live(value) => Value::Moving(value),
            };

            match slot.compare_exchange(current, new) {
                Ok(_) => return new.live(),

                // Lost to a concurrent update or copy, retry.
                Err(found) => current = found,
            }
        }
    }

    /// Retires a slot whose value has been copied to the next generation.
    ///
    /// # Safety
    ///
    /// The index must be in-bounds for the table.
    pub unsafe fn retire(&self, i: usize, value: i32) {
        // Safety: Guaranteed by the caller.
        let slot = unsafe { self.slot(i) };

        match slot.compare_exchange(Value::Moving(value), Value::Moved) {
            Ok(_) => {}

            // Someone else finished the copy.
            Err(Value::Moved) => {}

            Err(found) => panic!("slot changed while being copied: {found:?}"),
        }
    }

    /// Returns the key stored at the given index.
    ///
    /// # Safety
    ///
    /// The index must be in-bounds for the table.
    pub unsafe fn key(&self, i: usize) -> i32 {
        // Safety: Guaranteed by the caller.
        unsafe { self.slot(i) }.key.load(Ordering::Acquire)
    }

    // Probe for the slot of a key, optionally claiming the first unclaimed slot.
    #[inline]
    fn probe(&self, key: i32, claim: bool) -> Position {
        debug_assert!(key > 0);

        let mut probe = Probe::start(key, self.shift, self.mask);

        while !probe.exhausted() {
            // Safety: `probe.i` is always in-bounds for the table length.
            let slot = unsafe { self.slot(probe.i) };

            let found = slot.key.load(Ordering::Acquire);

            if found == key {
                return Position::Occupied(probe.i);
            }

            // Keys are claimed in probe order and never released, so an unclaimed
            // slot ends the search.
            if found == EMPTY_KEY {
                if !claim {
                    return Position::Vacant(probe.i);
                }

                match slot
                    .key
                    .compare_exchange(EMPTY_KEY, key, Ordering::AcqRel, Ordering::Acquire)
                {
                    // Successfully claimed the slot.
                    Ok(_) => return Position::Occupied(probe.i),

                    // Lost to a concurrent insert of the same key.
                    Err(found) if found == key => return Position::Occupied(probe.i),

                    // Lost to another key, keep probing.
                    Err(_) => {}
                }
            }

            probe.next();
        }

        Position::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_table(len: usize, test: impl FnOnce(Table)) {
        let table = Table::alloc(len);
        test(table);
        // Safety: The table was never shared.
        unsafe { Table::dealloc(table) };
    }

    #[test]
    fn update_and_get() {
        with_table(4, |table| {
            assert!(matches!(table.get(5), Lookup::Found(None)));
            assert!(matches!(table.update(5, Value::Live(1)), Update::Done(None)));
            assert!(matches!(table.get(5), Lookup::Found(Some(1))));
            assert!(matches!(
                table.update(5, Value::Live(2)),
                Update::Done(Some(1))
            ));
            assert!(matches!(
                table.update(5, Value::Tombstone),
                Update::Done(Some(2))
            ));
            assert!(matches!(table.get(5), Lookup::Found(None)));
            assert!(matches!(table.update(5, Value::Tombstone), Update::Done(None)));
        });
    }

    #[test]
    fn full_generation() {
        with_table(2, |table| {
            assert!(matches!(table.update(1, Value::Live(1)), Update::Done(None)));
            assert!(matches!(table.update(2, Value::Live(2)), Update::Done(None)));

            // Both slots are claimed by other keys.
            assert!(matches!(table.update(3, Value::Live(3)), Update::Full));
            assert!(matches!(table.insert_copy(3, 3), CopyStatus::Full));

            // Lookups and removals of missing keys do not need space.
            assert!(matches!(table.get(3), Lookup::Found(None)));
            assert!(matches!(table.update(3, Value::Tombstone), Update::Done(None)));
        });
    }

    #[test]
    fn removal_does_not_claim() {
        with_table(2, |table| {
            assert!(matches!(table.update(1, Value::Tombstone), Update::Done(None)));
            assert!(matches!(table.update(2, Value::Live(2)), Update::Done(None)));
            assert!(matches!(table.update(3, Value::Live(3)), Update::Done(None)));
        });
    }

    #[test]
    fn migration_states() {
        with_table(4, |table| {
            table.update(1, Value::Live(10));
            table.update(2, Value::Live(20));
            table.update(2, Value::Tombstone);

            let index = |key| match table.probe(key, false) {
                Position::Occupied(i) => i,
                _ => unreachable!(),
            };

            unsafe {
                // A live value is marked and must be copied.
                assert_eq!(table.mark_moving(index(1)), Some(10));
                assert_eq!(table.key(index(1)), 1);

                // Readers still see the value while it is being copied.
                assert!(matches!(table.get(1), Lookup::Found(Some(10))));

                // Writers have to help the copy.
                assert!(matches!(
                    table.update(1, Value::Live(11)),
                    Update::Forward(Some(_))
                ));

                // Marking again joins the same copy.
                assert_eq!(table.mark_moving(index(1)), Some(10));

                table.retire(index(1), 10);
                assert!(matches!(table.get(1), Lookup::Forward));
                assert!(matches!(
                    table.update(1, Value::Live(11)),
                    Update::Forward(None)
                ));

                // Retiring twice is harmless.
                table.retire(index(1), 10);

                // Tombstones are retired without a copy.
                assert_eq!(table.mark_moving(index(2)), None);
                assert!(matches!(table.get(2), Lookup::Forward));
            }
        });
    }

    #[test]
    fn copies_never_overwrite() {
        with_table(4, |table| {
            // A value written directly wins over a copy.
            table.update(1, Value::Live(2));
            assert!(matches!(table.insert_copy(1, 1), CopyStatus::Done));
            assert!(matches!(table.get(1), Lookup::Found(Some(2))));

            // So does a removal.
            table.update(1, Value::Tombstone);
            assert!(matches!(table.insert_copy(1, 1), CopyStatus::Done));
            assert!(matches!(table.get(1), Lookup::Found(None)));

            // A copy into an unclaimed slot lands.
            assert!(matches!(table.insert_copy(3, 30), CopyStatus::Done));
            assert!(matches!(table.get(3), Lookup::Found(Some(30))));
        });
    }

    #[test]
    fn late_copy_after_removal_is_dropped() {
        with_table(4, |table| {
            table.update(1, Value::Live(1));
            table.update(1, Value::Tombstone);

            let i = match table.probe(1, false) {
                Position::Occupied(i) => i,
                _ => unreachable!(),
            };

            unsafe { assert_eq!(table.mark_moving(i), None) };

            // The key was removed here before the slot was retired, a stale copy of
            // an older value must not resurface in the next generation.
            assert!(matches!(table.insert_copy(1, 1), CopyStatus::Done));
        });
    }

    #[test]
    fn copy_into_retired_slot_forwards() {
        with_table(4, |table| {
            // Claim the slot for the key without writing a value.
            let i = match table.probe(1, true) {
                Position::Occupied(i) => i,
                _ => unreachable!(),
            };

            unsafe { assert_eq!(table.mark_moving(i), None) };
            assert!(matches!(table.insert_copy(1, 1), CopyStatus::Forward));
        });
    }

    #[test]
    #[should_panic(expected = "slot changed while being copied")]
    fn retire_requires_copy() {
        let table = Table::alloc(2);
        table.update(1, Value::Live(1));
        let i = match table.probe(1, false) {
            Position::Occupied(i) => i,
            _ => unreachable!(),
        };
        unsafe { table.retire(i, 1) };
    }
}
