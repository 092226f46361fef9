//! Integer statistics over battery readings.
//!
//! Both types are plain values with inline storage so a slot can own them
//! without allocation. All rounding is "add half the divisor, then divide".

/// Exponential moving average with smoothing length `k`.
///
/// The accumulator holds roughly `k` times the average; every update pulls it
/// towards the new value by one `k`-th of the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialAverage {
    k: i64,
    acc: i64,
}

impl Default for ExponentialAverage {
    fn default() -> Self {
        Self::new(8)
    }
}

impl ExponentialAverage {
    /// `k == 0` is treated as 1 (no smoothing).
    pub fn new(k: u8) -> Self {
        Self {
            k: i64::from(k.max(1)),
            acc: 0,
        }
    }

    pub fn k(&self) -> u8 {
        u8::try_from(self.k).unwrap_or(u8::MAX)
    }

    pub fn reset(&mut self) {
        self.acc = 0;
    }

    pub fn update(&mut self, x: i32) {
        self.acc += i64::from(x) - self.rounded();
    }

    pub fn read(&self) -> i32 {
        saturate_i32(self.rounded())
    }

    /// Feed `x`, then return the new average.
    pub fn average(&mut self, x: i32) -> i32 {
        self.update(x);
        self.read()
    }

    fn rounded(&self) -> i64 {
        (self.acc + self.k / 2) / self.k
    }
}

fn saturate_i32(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

/// Fixed-capacity ring of the last `N` readings.
///
/// While filling, values sit at `buf[0..len]` and `head` stays 0. Once full,
/// `head` is the oldest value and each update overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleHistory<const N: usize> {
    buf: [u16; N],
    len: usize,
    head: usize,
}

impl<const N: usize> Default for SampleHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SampleHistory<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            head: 0,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn reset(&mut self) {
        self.len = 0;
        self.head = 0;
    }

    pub fn update(&mut self, x: u16) {
        if N == 0 {
            return;
        }
        if self.len < N {
            self.buf[self.len] = x;
            self.len += 1;
        } else {
            self.buf[self.head] = x;
            self.head = (self.head + 1) % N;
        }
    }

    /// Feed `x`, then return the new mean.
    pub fn average(&mut self, x: u16) -> u16 {
        self.update(x);
        self.read()
    }

    /// Rounded mean; 0 when empty.
    pub fn read(&self) -> u16 {
        match self.len {
            0 => 0,
            1 => self.buf[0],
            n => {
                let n = n as u64;
                let sum: u64 = self.buf[..self.len].iter().map(|&v| u64::from(v)).sum();
                u16::try_from((sum + n / 2) / n).unwrap_or(u16::MAX)
            }
        }
    }

    /// Most recent value, if any.
    pub fn latest(&self) -> Option<u16> {
        match self.len {
            0 => None,
            n if n < N => Some(self.buf[n - 1]),
            _ => Some(self.buf[(self.head + N - 1) % N]),
        }
    }

    /// Values oldest first.
    pub fn samples(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.len).map(move |i| self.buf[(self.head + i) % N])
    }

    /// Drop everything but the most recent value.
    pub fn retain_latest(&mut self) {
        if let Some(v) = self.latest() {
            self.reset();
            self.update(v);
        }
    }

    /// Population variance around the rounded mean, with a `2 * len` bias.
    /// Fewer than three samples report 1000.
    pub fn dispersion(&self) -> f32 {
        if self.len < 3 {
            return 1000.0;
        }
        let avg = i64::from(self.read());
        let n = self.len as i64;
        let sum: i64 = self.buf[..self.len]
            .iter()
            .map(|&v| {
                let d = i64::from(v) - avg;
                d * d
            })
            .sum::<i64>()
            + 2 * n;
        sum as f32 / n as f32
    }

    /// Least-squares slope of the samples against their position (1..=len,
    /// oldest first), times 100. Values are centred on the mean first to keep
    /// the sums small. 0 with fewer than three samples.
    pub fn gradient(&self) -> i32 {
        if self.len < 3 {
            return 0;
        }
        let avg = i64::from(self.read());
        let (mut sx, mut sxx, mut sxy, mut sy) = (0i64, 0i64, 0i64, 0i64);
        for (i, v) in self.samples().enumerate() {
            let x = i as i64 + 1;
            let y = i64::from(v) - avg;
            sx += x;
            sxx += x * x;
            sxy += x * y;
            sy += y;
        }
        let n = self.len as i64;
        let numerator = n * sxy - sx * sy;
        let denominator = n * sxx - sx * sx;
        if denominator == 0 {
            return 0;
        }
        saturate_i32(numerator * 100 / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_follows_ring_head() {
        let mut h = SampleHistory::<3>::new();
        assert_eq!(h.latest(), None);
        for v in [1, 2, 3, 4] {
            h.update(v);
        }
        assert_eq!(h.latest(), Some(4));
        assert_eq!(h.samples().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn zero_smoothing_length_is_identity() {
        let mut e = ExponentialAverage::new(0);
        assert_eq!(e.k(), 1);
        assert_eq!(e.average(42), 42);
    }
}
