use std::collections::VecDeque;

/// The ladder of read-chunk sizes the sizer picks from, smallest first.
pub const SIZE_CLASSES: [usize; 5] = [
    8 * 1024,
    16 * 1024,
    64 * 1024,
    256 * 1024,
    1024 * 1024,
];

/// Index of the default (initial) rung: 64 KiB.
const DEFAULT_CLASS: usize = 2;

/// Number of recent row sizes kept for the rolling average.
const WINDOW_LEN: usize = 100;

/// Rows observed before the sizer starts adjusting at all.
const MIN_SAMPLES: u64 = 10;

/// Consecutive oversized observations before promoting a rung.
///
/// Deliberately lower than the shrink threshold: under-buffering costs a
/// round trip per row, over-buffering only costs memory.
const GROW_STREAK: u32 = 3;

/// Consecutive undersized observations before demoting a rung.
const SHRINK_STREAK: u32 = 10;

/// Recommends how many bytes to request from the source on the next fetch,
/// based on recently observed row sizes.
///
/// Each reader owns its own sizer; there is no shared state between
/// streams. The recommendation is advisory only: the parser is correct no
/// matter how much or how little a single fetch returns.
#[derive(Clone, Debug)]
pub struct ChunkSizer {
    class: usize,
    total_rows: u64,
    total_bytes: u64,
    window: VecDeque<usize>,
    oversized: u32,
    undersized: u32,
}

impl Default for ChunkSizer {
    fn default() -> ChunkSizer {
        ChunkSizer::starting_at(SIZE_CLASSES[DEFAULT_CLASS])
    }
}

impl ChunkSizer {
    /// Create a sizer starting at the default 64 KiB rung.
    pub fn new() -> ChunkSizer {
        ChunkSizer::default()
    }

    /// Create a sizer starting at the smallest rung that holds `bytes`.
    pub fn starting_at(bytes: usize) -> ChunkSizer {
        let class = SIZE_CLASSES
            .iter()
            .position(|&c| c >= bytes)
            .unwrap_or(SIZE_CLASSES.len() - 1);
        ChunkSizer {
            class,
            total_rows: 0,
            total_bytes: 0,
            window: VecDeque::with_capacity(WINDOW_LEN),
            oversized: 0,
            undersized: 0,
        }
    }

    /// The currently recommended fetch size in bytes.
    pub fn recommended(&self) -> usize {
        SIZE_CLASSES[self.class]
    }

    /// The number of rows observed so far.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// The total number of row bytes observed so far.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Record one observed row size and return the (possibly updated)
    /// recommendation.
    pub fn record_row(&mut self, size: usize) -> usize {
        self.total_rows += 1;
        self.total_bytes += size as u64;
        if self.window.len() == WINDOW_LEN {
            self.window.pop_front();
        }
        self.window.push_back(size);

        if self.total_rows < MIN_SAMPLES {
            return self.recommended();
        }

        let avg = self.window.iter().sum::<usize>() / self.window.len();
        let class_size = SIZE_CLASSES[self.class];
        if avg > class_size / 2 {
            self.undersized = 0;
            self.oversized += 1;
            if self.oversized >= GROW_STREAK {
                if self.class + 1 < SIZE_CLASSES.len() {
                    self.class += 1;
                }
                self.oversized = 0;
            }
        } else if avg < class_size / 10 {
            self.oversized = 0;
            self.undersized += 1;
            if self.undersized >= SHRINK_STREAK {
                if self.class > 0 {
                    self.class -= 1;
                }
                self.undersized = 0;
            }
        } else {
            self.oversized = 0;
            self.undersized = 0;
        }
        self.recommended()
    }

    /// Escape hatch for a single row known to dwarf the current rung: jump
    /// straight to the smallest rung of at least twice `size`, or, if the
    /// ladder tops out below that, recommend twice `size` directly.
    pub fn handle_oversized(&mut self, size: usize) -> usize {
        let need = size.saturating_mul(2);
        match SIZE_CLASSES.iter().position(|&c| c >= need) {
            Some(class) => {
                self.class = class;
                SIZE_CLASSES[class]
            }
            None => {
                self.class = SIZE_CLASSES.len() - 1;
                need
            }
        }
    }

    /// Forget all observations and return to the given starting size.
    pub fn reset(&mut self) {
        *self = ChunkSizer::starting_at(self.recommended());
    }
}
