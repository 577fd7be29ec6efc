/// Lowest set bit position for every byte value; index 0 is unused by
/// `find_first_set` (whole zero words are skipped before byte probing).
const LOWEST_BIT: [u8; 256] = build_lowest_bit_table();

const fn build_lowest_bit_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte = 1usize;
    while byte < 256 {
        let mut bit = 0u8;
        while byte & (1 << bit) == 0 {
            bit += 1;
        }
        table[byte] = bit;
        byte += 1;
    }
    table
}

/// Fixed-size bit vector with a fast find-lowest-set-bit query, used by
/// the buffer pool to track free frames.
pub struct FrameBitmap {
    words: Vec<u32>,
    len: usize,
}

impl FrameBitmap {
    /// Create a bitmap of `len` bits, all set or all clear
    pub fn new(len: usize, set: bool) -> Self {
        let word_count = len.div_ceil(32);
        let mut words = vec![if set { u32::MAX } else { 0 }; word_count];

        // Clear the unused tail bits of the last word so they never
        // surface from find_first_set
        if set && len % 32 != 0 {
            words[word_count - 1] = (1u32 << (len % 32)) - 1;
        }

        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set or clear the bit at `index`
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len);
        if value {
            self.words[index / 32] |= 1 << (index % 32);
        } else {
            self.words[index / 32] &= !(1 << (index % 32));
        }
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.words[index / 32] & (1 << (index % 32)) != 0
    }

    /// Index of the lowest set bit, or None if all bits are clear.
    /// Scans word by word, then resolves the first non-zero word byte
    /// by byte through the lookup table.
    pub fn find_first_set(&self) -> Option<usize> {
        for (w, &word) in self.words.iter().enumerate() {
            if word == 0 {
                continue;
            }
            for b in 0..4 {
                let byte = ((word >> (b * 8)) & 0xFF) as usize;
                if byte != 0 {
                    return Some(w * 32 + b * 8 + LOWEST_BIT[byte] as usize);
                }
            }
        }
        None
    }
}
