use std::alloc::Layout;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::{alloc, mem, ptr};

use super::probe;
use super::slot::Slot;

// A generation laid out in a single allocation.
#[repr(transparent)]
pub struct RawTable(u8);

// The layout of the table allocation.
#[repr(C)]
struct TableLayout {
    mask: usize,
    shift: u32,
    state: State,
    slots: [Slot; 0],
}

// Resize state for a generation.
pub struct State {
    // The next generation, installed at most once.
    pub next: AtomicPtr<RawTable>,

    // The progress of the resize out of this generation.
    pub status: AtomicU8,
}

impl Default for State {
    fn default() -> State {
        State {
            next: AtomicPtr::new(ptr::null_mut()),
            status: AtomicU8::new(State::PENDING),
        }
    }
}

impl State {
    // No resize has started.
    pub const PENDING: u8 = 0;

    // The successor is installed and slots are being migrated.
    pub const COPYING: u8 = 1;

    // Every slot has been retired, the generation can be promoted past.
    pub const FINISHED: u8 = 2;
}

// Manages a table allocation.
pub struct Table {
    // Mask for the table length.
    pub mask: usize,
    // The hash shift for this table length.
    pub shift: u32,
    // The raw table pointer.
    pub raw: *mut RawTable,
}

impl Copy for Table {}

impl Clone for Table {
    fn clone(&self) -> Self {
        *self
    }
}

impl Table {
    // The largest supported table length.
    pub const MAX_LEN: usize = 1 << 31;

    // Allocate a table with the provided length.
    pub fn alloc(len: usize) -> Table {
        assert!(len.is_power_of_two() && len >= 2);
        assert!(len <= Table::MAX_LEN, "`HashMap` exceeded maximum capacity");

        let mask = len - 1;
        let shift = probe::shift(len);

        unsafe {
            let layout = Self::layout(len);

            // Allocate the table, zeroing the slots.
            //
            // A zeroed slot holds the empty key and `Value::Empty`.
            let ptr = alloc::alloc_zeroed(layout);
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }

            // Write the table header.
            ptr.cast::<TableLayout>().write(TableLayout {
                mask,
                shift,
                state: State::default(),
                slots: [],
            });

            Table {
                mask,
                shift,
                raw: ptr.cast::<RawTable>(),
            }
        }
    }

    // Creates a `Table` from a raw pointer.
    //
    // # Safety
    //
    // The pointer must be a live allocation created by `Table::alloc`.
    #[inline]
    pub unsafe fn from_raw(raw: *mut RawTable) -> Table {
        let layout = unsafe { &*raw.cast::<TableLayout>() };

        Table {
            raw,
            mask: layout.mask,
            shift: layout.shift,
        }
    }

    // Returns the slot at the given index.
    //
    // # Safety
    //
    // The index must be in-bounds for the table length.
    #[inline]
    pub unsafe fn slot(&self, i: usize) -> &Slot {
        debug_assert!(i < self.len());
        unsafe {
            &*self
                .raw
                .add(mem::size_of::<TableLayout>())
                .cast::<Slot>()
                .add(i)
        }
    }

    // Returns the length of the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.mask + 1
    }

    // Returns a reference to the table state.
    #[inline]
    pub fn state(&self) -> &State {
        unsafe { &(*self.raw.cast::<TableLayout>()).state }
    }

    // Returns the status of the resize out of this table.
    #[inline]
    pub fn status(&self) -> u8 {
        self.state().status.load(Ordering::Acquire)
    }

    // Returns the next table, if it has been installed.
    #[inline]
    pub fn next_table(&self) -> Option<Table> {
        let next = self.state().next.load(Ordering::Acquire);

        // Safety: A non-null next pointer is always a valid table allocation, and is
        // reclaimed only after this table is.
        (!next.is_null()).then(|| unsafe { Table::from_raw(next) })
    }

    // Returns the next table of a table that is known to be forwarding.
    #[inline]
    pub fn successor(&self) -> Table {
        match self.next_table() {
            Some(next) => next,
            None => panic!("slot was forwarded before the next generation was installed"),
        }
    }

    // Deallocate the table.
    //
    // # Safety
    //
    // The table must not be accessible by any other thread.
    pub unsafe fn dealloc(table: Table) {
        let layout = Self::layout(table.len());
        unsafe {
            ptr::drop_in_place(table.raw.cast::<TableLayout>());
            alloc::dealloc(table.raw.cast::<u8>(), layout)
        }
    }

    // The table layout used for allocation.
    fn layout(len: usize) -> Layout {
        let size = mem::size_of::<TableLayout>() + (mem::size_of::<Slot>() * len);
        Layout::from_size_align(size, mem::align_of::<TableLayout>())
            .expect("`HashMap` exceeded maximum capacity")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::slot::{Value, EMPTY_KEY};

    #[test]
    fn layout() {
        unsafe {
            let table = Table::alloc(4);
            let table = Table::from_raw(table.raw);
            assert_eq!(table.mask, 3);
            assert_eq!(table.len(), 4);
            assert_eq!(table.shift, 30);
            assert_eq!(table.status(), State::PENDING);
            assert!(table.next_table().is_none());

            for i in 0..table.len() {
                let slot = table.slot(i);
                assert_eq!(slot.key.load(Ordering::Relaxed), EMPTY_KEY);
                assert_eq!(slot.load(Ordering::Relaxed), Value::Empty);
            }

            Table::dealloc(table);
        }
    }

    #[test]
    fn slots_are_aligned() {
        assert_eq!(mem::size_of::<TableLayout>() % mem::align_of::<Slot>(), 0);
        assert!(mem::align_of::<TableLayout>() >= mem::align_of::<Slot>());
    }

    #[test]
    #[should_panic(expected = "forwarded")]
    fn successor_requires_next() {
        let table = Table::alloc(2);
        let _ = table.successor();
    }
}
