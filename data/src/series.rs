use exchange::{Bar, Price};

/// Bars for one symbol and timeframe, strictly ascending and unique by open time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateSeries {
    bars: Vec<Bar>,
}

impl RateSeries {
    pub fn new(bars: Vec<Bar>) -> Self {
        let mut series = Self::default();
        series.merge(&bars);
        series
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_time(&self) -> Option<u64> {
        self.bars.last().map(|bar| bar.time)
    }

    /// The most recent `n` bars, or all of them when the series is shorter.
    pub fn tail(&self, n: usize) -> &[Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    /// Inserts or overwrites by `time`. Appending past the end is the common
    /// case and does not search.
    pub fn merge(&mut self, new_bars: &[Bar]) {
        for bar in new_bars {
            match self.last_time() {
                Some(last) if bar.time <= last => {
                    match self.bars.binary_search_by_key(&bar.time, |b| b.time) {
                        Ok(idx) => self.bars[idx] = *bar,
                        Err(idx) => self.bars.insert(idx, *bar),
                    }
                }
                _ => self.bars.push(*bar),
            }
        }
    }

    /// Drops the oldest bars so that at most `max_len` remain.
    pub fn truncate_front(&mut self, max_len: usize) {
        if self.bars.len() > max_len {
            let excess = self.bars.len() - max_len;
            self.bars.drain(..excess);
        }
    }
}

/// `(min low, max high)` over a window, `None` when it is empty.
pub fn price_bounds(bars: &[Bar]) -> Option<(Price, Price)> {
    let mut iter = bars.iter();
    let first = iter.next()?;

    Some(iter.fold((first.low, first.high), |(low, high), bar| {
        (low.min(bar.low), high.max(bar.high))
    }))
}

#[cfg(test)]
pub(crate) fn bar_at(time: u64, close: f64) -> Bar {
    Bar::new(time, close - 0.05, close + 0.1, close - 0.1, close, 1)
}
