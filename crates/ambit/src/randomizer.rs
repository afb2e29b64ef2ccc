//! Deterministic per-test random values.
//!
//! Each test context seeds a [`Randomizer`] from its test's seed the first
//! time random data is requested, so a failing run can be replayed with the
//! same values.

/// Characters used by [`Randomizer::next_string`].
pub const DEFAULT_STRING_CHARS: &str =
    "abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNOPQRSTUVWXYZ0123456789_";

/// Seeded xorshift64 generator.
///
/// It is not cryptographically secure.
#[derive(Debug, Clone)]
pub struct Randomizer {
    seed: u64,
    state: u64,
}

impl Randomizer {
    /// Creates a generator from `seed`; a zero seed is replaced with one.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { seed, state }
    }

    /// Seed the generator was created with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Next pseudo-random 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Next pseudo-random 32-bit value, taken from the high bits.
    pub fn next_u32(&mut self) -> u32 {
        u32::try_from(self.next_u64() >> 32).unwrap_or(u32::MAX)
    }

    /// Value in `0..bound`, or `None` when `bound` is zero.
    pub fn next_below(&mut self, bound: u64) -> Option<u64> {
        self.next_u64().checked_rem(bound)
    }

    /// Value in `min..max`, or `None` when the range is empty.
    pub fn next_in_range(&mut self, min: i64, max: i64) -> Option<i64> {
        if max <= min {
            return None;
        }
        let offset = self.next_below(max.abs_diff(min))?;
        min.checked_add_unsigned(offset)
    }

    /// Pseudo-random boolean.
    pub fn next_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// String of `len` characters drawn from [`DEFAULT_STRING_CHARS`].
    pub fn next_string(&mut self, len: usize) -> String {
        self.next_string_from(len, DEFAULT_STRING_CHARS)
    }

    /// String of `len` characters drawn from `chars`.
    ///
    /// Returns an empty string when `chars` is empty.
    pub fn next_string_from(&mut self, len: usize, chars: &str) -> String {
        let pool: Vec<char> = chars.chars().collect();
        let Ok(count) = u64::try_from(pool.len()) else {
            return String::new();
        };
        (0..len)
            .map_while(|_| {
                let index = usize::try_from(self.next_below(count)?).ok()?;
                pool.get(index).copied()
            })
            .collect()
    }

    /// Shuffles `items` in place using Fisher-Yates.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let bound = u64::try_from(i + 1).unwrap_or(u64::MAX);
            let j = self
                .next_below(bound)
                .and_then(|j| usize::try_from(j).ok())
                .unwrap_or(i);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut first = Randomizer::new(42);
        let mut second = Randomizer::new(42);
        for _ in 0..100 {
            assert_eq!(first.next_u64(), second.next_u64());
        }
    }

    #[test]
    fn zero_seed_is_usable() {
        let mut rng = Randomizer::new(0);
        assert_eq!(rng.seed(), 0);
        assert_ne!(rng.next_u64(), 0);
    }

    #[test]
    fn ranges_are_respected() {
        let mut rng = Randomizer::new(7);
        for _ in 0..500 {
            let Some(value) = rng.next_in_range(-5, 5) else {
                panic!("non-empty range must yield a value");
            };
            assert!((-5..5).contains(&value));
        }
        assert_eq!(rng.next_in_range(3, 3), None);
        assert_eq!(rng.next_below(0), None);
    }

    #[test]
    fn ranges_may_span_the_whole_i64_domain() {
        let mut rng = Randomizer::new(5);
        for _ in 0..64 {
            let Some(value) = rng.next_in_range(i64::MIN, i64::MAX) else {
                panic!("the widest range must yield a value");
            };
            assert!(value < i64::MAX);
        }
        assert_eq!(rng.next_in_range(i64::MAX, i64::MIN), None);
    }

    #[test]
    fn strings_use_the_requested_alphabet() {
        let mut rng = Randomizer::new(11);
        let text = rng.next_string_from(32, "ab");
        assert_eq!(text.len(), 32);
        assert!(text.chars().all(|c| c == 'a' || c == 'b'));
        assert!(rng.next_string_from(4, "").is_empty());
    }

    #[test]
    fn shuffle_keeps_every_element() {
        let mut rng = Randomizer::new(99);
        let mut items: Vec<u32> = (0..20).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }
}
