mod alloc;
mod probe;
mod slot;
mod table;
mod utils;

use std::sync::atomic::{AtomicPtr, Ordering};
use std::ptr;

use self::alloc::{RawTable, State, Table};
use self::slot::Value;
use self::table::{CopyStatus, Lookup, Update};
use self::utils::Counter;
use crate::cfg::trace;

use seize::{Collector, Guard, LocalGuard, OwnedGuard};

// The capacity of the first generation.
const INITIAL_CAPACITY: usize = 2;

/// A lock-free hash map from positive keys to positive values.
pub struct HashMap {
    /// A pointer to the root generation.
    table: AtomicPtr<RawTable>,

    /// Collector for reclaiming superseded generations.
    collector: Collector,

    /// An atomic counter of the number of keys in the map.
    count: Counter,
}

impl HashMap {
    /// Creates a new map with the given collector.
    pub fn new(collector: Collector) -> HashMap {
        HashMap {
            collector,
            table: AtomicPtr::new(Table::alloc(INITIAL_CAPACITY).raw),
            count: Counter::default(),
        }
    }

    /// Returns a guard for this collector.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Returns an owned guard for this collector.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.collector.enter_owned()
    }

    /// Verify a guard is valid to use with this map.
    #[inline]
    pub fn verify(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "Attempted to access map with incorrect guard"
        );
    }

    /// Returns the number of keys in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.sum()
    }

    /// Returns the capacity of the root generation.
    #[inline]
    pub fn capacity(&self, guard: &impl Guard) -> usize {
        self.root(guard).len()
    }

    /// Returns the root generation, promoting past any generations that have
    /// finished resizing.
    #[inline]
    fn root(&self, guard: &impl Guard) -> Table {
        loop {
            let raw = guard.protect(&self.table, Ordering::Acquire);

            // Safety: The root is always a valid table allocation, and it is protected
            // by the guard.
            let table = unsafe { Table::from_raw(raw) };

            if table.status() != State::FINISHED {
                return table;
            }

            // Keep operations off of retired generations.
            self.try_promote(table, guard);
        }
    }
}

impl HashMap {
    /// Returns the value for a key.
    #[inline]
    pub fn get(&self, key: i32, guard: &impl Guard) -> Option<i32> {
        let mut table = self.root(guard);

        loop {
            match table.get(key) {
                Lookup::Found(value) => return value,
                Lookup::Forward => table = table.successor(),
            }
        }
    }

    /// Inserts a value for a key, returning the previous value.
    #[inline]
    pub fn put(&self, key: i32, value: i32, guard: &impl Guard) -> Option<i32> {
        let previous = self.update(key, Value::Live(value), guard);

        if previous.is_none() {
            self.count.get(guard).fetch_add(1, Ordering::Relaxed);
        }

        previous
    }

    /// Removes a key, returning the previous value.
    #[inline]
    pub fn remove(&self, key: i32, guard: &impl Guard) -> Option<i32> {
        let previous = self.update(key, Value::Tombstone, guard);

        if previous.is_some() {
            self.count.get(guard).fetch_sub(1, Ordering::Relaxed);
        }

        previous
    }

    // Writes a live value or tombstone, resizing and retrying until the write takes effect.
    fn update(&self, key: i32, new: Value, guard: &impl Guard) -> Option<i32> {
        let mut table = self.root(guard);

        loop {
            match table.update(key, new) {
                Update::Done(previous) => return previous,

                Update::Forward(copying) => {
                    // The slot is being copied, help complete the copy so our
                    // write lands after it.
                    if let Some(i) = copying {
                        // Safety: The index was returned by a probe of this table.
                        unsafe { self.migrate(table, i, guard) };
                    }

                    table = table.successor();
                }

                // Went over the probe limit. Every slot is retired once the resize
                // completes, so the write continues in the successor.
                Update::Full => {
                    self.rehash(table, guard);
                    table = table.successor();
                }
            }
        }
    }
}

/// Resize operations.
impl HashMap {
    /// Migrates every slot of a generation to its successor.
    ///
    /// Any number of threads may help with the same resize. Each slot transitions
    /// through its migration states by CAS, so concurrent helpers only observe the
    /// result of whichever transition wins.
    #[cold]
    #[inline(never)]
    fn rehash(&self, table: Table, guard: &impl Guard) {
        let state = table.state();

        // Another thread completed the resize.
        if table.status() == State::FINISHED {
            return;
        }

        let next = self.get_or_alloc_next(table);

        if state
            .status
            .compare_exchange(
                State::PENDING,
                State::COPYING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            trace!("resizing {} -> {}", table.len(), next.len());
        }

        for i in 0..table.len() {
            // Safety: `i` is in-bounds for the table length.
            unsafe { self.migrate(table, i, guard) };
        }

        // Every slot has been retired by us or a concurrent helper.
        if state
            .status
            .compare_exchange(
                State::COPYING,
                State::FINISHED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            trace!("finished resizing {} -> {}", table.len(), next.len());
        }
    }

    /// Migrates the slot at the given index to the next generation.
    ///
    /// Returns once the slot has been retired, by this thread or another.
    ///
    /// # Safety
    ///
    /// The index must be in-bounds for the table.
    unsafe fn migrate(&self, table: Table, i: usize, guard: &impl Guard) {
        // Safety: Guaranteed by the caller.
        let Some(value) = (unsafe { table.mark_moving(i) }) else {
            // Nothing to copy.
            return;
        };

        // Safety: Guaranteed by the caller.
        let key = unsafe { table.key(i) };
        assert!(key > 0, "copying a value without a key");

        // Marking a slot requires the next table to be installed.
        self.copy(table.successor(), key, value, guard);

        // Safety: Guaranteed by the caller.
        unsafe { table.retire(i, value) };
    }

    /// Copies a value into a generation, resizing and forwarding until it lands.
    ///
    /// A copy never fails: if the generation is full, it is resized and the copy is
    /// retried in its successor.
    fn copy(&self, mut table: Table, key: i32, value: i32, guard: &impl Guard) {
        loop {
            match table.insert_copy(key, value) {
                CopyStatus::Done => return,

                CopyStatus::Forward => table = table.successor(),

                CopyStatus::Full => {
                    self.rehash(table, guard);
                    table = table.successor();
                }
            }
        }
    }

    /// Returns the next generation, allocating it if it has not already been created.
    ///
    /// Concurrent callers race to install their allocation, the losers free theirs and
    /// use the winner's.
    fn get_or_alloc_next(&self, table: Table) -> Table {
        // The next table is already allocated.
        if let Some(next) = table.next_table() {
            return next;
        }

        let next = Table::alloc(table.len() << 1);

        match table.state().next.compare_exchange(
            ptr::null_mut(),
            next.raw,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // Successfully installed the table.
            Ok(_) => {
                trace!("allocated generation with capacity {}", next.len());
                next
            }

            // Someone beat us, deallocate our table and use the table that was written.
            Err(found) => {
                // Safety: We allocated the table above and never shared it.
                unsafe { Table::dealloc(next) };

                // Safety: The next table is installed exactly once and never changes.
                unsafe { Table::from_raw(found) }
            }
        }
    }

    /// Advances the root past a generation that has finished resizing.
    fn try_promote(&self, table: Table, guard: &impl Guard) {
        let next = table.successor();

        if self
            .table
            .compare_exchange(table.raw, next.raw, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            trace!("promoted generation with capacity {}", next.len());

            // Safety: The CAS above made the previous table unreachable from the root,
            // and tables only link forward, so no new references to it can be created.
            unsafe { guard.defer_retire(table.raw, reclaim_table) };
        }
    }
}

// Reclaims a superseded generation.
//
// The entries of the generation are plain words that were copied forward, so there
// is nothing to drop besides the allocation itself.
unsafe fn reclaim_table(table: *mut RawTable, _collector: &Collector) {
    unsafe { Table::dealloc(Table::from_raw(table)) }
}

impl Drop for HashMap {
    fn drop(&mut self) {
        let mut raw = *self.table.get_mut();

        // Free the root and any generations it was resizing into. Superseded
        // generations are owned by the collector.
        while !raw.is_null() {
            // Safety: We have unique access to the map, and every table in the chain
            // is a valid allocation that was never retired.
            let table = unsafe { Table::from_raw(raw) };
            raw = table.state().next.load(Ordering::Relaxed);
            unsafe { Table::dealloc(table) };
        }
    }
}
