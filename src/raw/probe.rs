// Multiplicative hashing constant, derived from the golden ratio.
const MAGIC: u32 = 0x9E37_79B9;

// A linear probe sequence.
//
// The sequence starts at the multiplicative hash of the key and walks
// backward through the table, wrapping around at the start.
pub struct Probe {
    // The current index in the probe sequence.
    pub i: usize,
    // The current length of the probe sequence.
    pub len: usize,
    // Mask for the length of the table.
    mask: usize,
}

impl Probe {
    // The maximum number of slots visited before an operation gives up on a generation.
    //
    // Exceeding the limit on insertion is the only trigger for a resize.
    pub const LIMIT: usize = 8;

    // Initialize the probe sequence for a table of length `mask + 1`.
    #[inline]
    pub fn start(key: i32, shift: u32, mask: usize) -> Probe {
        Probe {
            i: start_index(key, shift),
            len: 0,
            mask,
        }
    }

    // Returns `true` if the probe limit has been reached.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.len >= Probe::LIMIT
    }

    // Increment the probe sequence.
    #[inline]
    pub fn next(&mut self) {
        self.len += 1;
        self.i = self.i.wrapping_sub(1) & self.mask;
    }
}

// Returns the shift that keeps `log2(len)` bits of a 32-bit hash.
#[inline]
pub fn shift(len: usize) -> u32 {
    debug_assert!(len.is_power_of_two() && len >= 2);
    u32::BITS - len.trailing_zeros()
}

// Returns the initial probe index for a key.
#[inline]
fn start_index(key: i32, shift: u32) -> usize {
    ((key as u32).wrapping_mul(MAGIC) >> shift) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_in_bounds() {
        for len in [2_usize, 4, 64, 1 << 20] {
            let shift = shift(len);
            for key in [1, 2, 3, 6, 1000, i32::MAX] {
                let probe = Probe::start(key, shift, len - 1);
                assert!(probe.i < len);
            }
        }
    }

    #[test]
    fn small_table_collisions() {
        // In a table of two slots, keys 1, 3 and 6 all start at the same slot.
        let shift = shift(2);
        assert_eq!(start_index(1, shift), 1);
        assert_eq!(start_index(3, shift), 1);
        assert_eq!(start_index(6, shift), 1);
        assert_eq!(start_index(2, shift), 0);
    }

    #[test]
    fn walks_backward_and_wraps() {
        let mut probe = Probe::start(1, shift(4), 3);
        let mut seen = vec![probe.i];

        while !probe.exhausted() {
            probe.next();
            seen.push(probe.i);
        }

        assert_eq!(seen.len(), Probe::LIMIT + 1);
        for pair in seen.windows(2) {
            assert_eq!(pair[1], pair[0].wrapping_sub(1) & 3);
        }
    }
}
