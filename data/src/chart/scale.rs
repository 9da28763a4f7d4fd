use crate::series::price_bounds;

use exchange::{Bar, Price, Timeframe};
use iced_core::Point;

pub const CANDLE_WIDTH: f32 = 2.0;
pub const CANDLE_GAP: f32 = 1.0;

/// Vertical mapping between prices and pixel rows for the visible window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSpace {
    min: f64,
    max: f64,
    range: f64,
    height: f32,
}

impl PriceSpace {
    /// A flat window (`max == min`) gets a range of one whole price unit.
    pub fn new(min: Price, max: Price, height: f32) -> Self {
        let (min, max) = (min.to_f64(), max.to_f64());
        let range = if max > min { max - min } else { 1.0 };

        Self {
            min,
            max,
            range,
            height,
        }
    }

    pub fn from_window(bars: &[Bar], height: f32) -> Option<Self> {
        price_bounds(bars).map(|(low, high)| Self::new(low, high, height))
    }

    pub fn min(&self) -> Price {
        Price::from_f64(self.min)
    }

    pub fn max(&self) -> Price {
        Price::from_f64(self.max)
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Pixel row of `price`; `max` lands on row 0 and `min` on `height`.
    pub fn price_to_y(&self, price: Price) -> f32 {
        self.value_to_y(price.to_f64())
    }

    pub fn value_to_y(&self, value: f64) -> f32 {
        let offset = ((value - self.min) / self.range * f64::from(self.height)).floor();
        (f64::from(self.height) - offset) as f32
    }

    pub fn y_to_price(&self, y: f32) -> Price {
        Price::from_f64(self.y_to_value(y))
    }

    pub fn y_to_value(&self, y: f32) -> f64 {
        let height = f64::from(self.height);
        self.min + (height - f64::from(y)) / height * self.range
    }
}

/// Horizontal layout: fixed-width candles packed against the right edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarSpace {
    pub width: f32,
    pub candle_width: f32,
    pub gap: f32,
}

impl BarSpace {
    pub fn new(width: f32) -> Self {
        Self {
            width,
            candle_width: CANDLE_WIDTH,
            gap: CANDLE_GAP,
        }
    }

    /// Chart width that fits `count` candles exactly.
    pub fn for_count(count: usize) -> Self {
        Self::new(count as f32 * (CANDLE_WIDTH + CANDLE_GAP))
    }

    pub fn step(&self) -> f32 {
        self.candle_width + self.gap
    }

    /// Left edge of bar `index` in a window of `len` bars.
    pub fn x_of(&self, index: usize, len: usize) -> f32 {
        self.fractional_x(index as f64, len)
    }

    pub fn center_of(&self, index: usize, len: usize) -> f32 {
        self.x_of(index, len) + self.candle_width / 2.0
    }

    pub fn index_at(&self, x: f32, len: usize) -> Option<usize> {
        if !(0.0..self.width).contains(&x) {
            return None;
        }

        let from_right = ((self.width - x) / self.step()).floor() as i64;
        let index = len as i64 - from_right - 1;

        usize::try_from(index).ok().filter(|i| *i < len)
    }

    fn fractional_x(&self, index: f64, len: usize) -> f32 {
        (f64::from(self.width) - (len as f64 - index) * f64::from(self.step())) as f32
    }

    fn fractional_index(&self, x: f32, len: usize) -> f64 {
        let from_right = f64::from(self.width) - f64::from(x);
        len as f64 - from_right / f64::from(self.step())
    }
}

/// Both axes for one rendered window, able to place `(time, price)` points
/// that fall between, before or after the visible bars.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
    pub prices: PriceSpace,
    pub bars: BarSpace,
    pub window: &'a [Bar],
    pub timeframe: Timeframe,
}

impl<'a> Projection<'a> {
    pub fn new(window: &'a [Bar], bars: BarSpace, height: f32, timeframe: Timeframe) -> Option<Self> {
        PriceSpace::from_window(window, height).map(|prices| Self {
            prices,
            bars,
            window,
            timeframe,
        })
    }

    /// Candle centre for `time`; interpolated between bar open times and
    /// extrapolated with the nominal bar length outside the window.
    pub fn time_to_x(&self, time: u64) -> f32 {
        let offset = f64::from(self.bars.candle_width / 2.0);
        (f64::from(self.bars.fractional_x(self.time_index(time), self.window.len())) + offset)
            as f32
    }

    pub fn x_to_time(&self, x: f32) -> u64 {
        let centre = x - self.bars.candle_width / 2.0;
        self.index_time(self.bars.fractional_index(centre, self.window.len()))
    }

    pub fn to_screen(&self, time: u64, price: Price) -> Point {
        Point::new(self.time_to_x(time), self.prices.price_to_y(price))
    }

    pub fn from_screen(&self, point: Point) -> (u64, Price) {
        (self.x_to_time(point.x), self.prices.y_to_price(point.y))
    }

    pub fn bar_at(&self, x: f32) -> Option<&'a Bar> {
        self.bars
            .index_at(x, self.window.len())
            .and_then(|i| self.window.get(i))
    }

    fn bar_secs(&self) -> f64 {
        self.timeframe.to_seconds() as f64
    }

    fn time_index(&self, time: u64) -> f64 {
        let (Some(first), Some(last)) = (self.window.first(), self.window.last()) else {
            return 0.0;
        };
        let last_index = (self.window.len() - 1) as f64;

        if time <= first.time {
            return -((first.time - time) as f64) / self.bar_secs();
        }
        if time >= last.time {
            return last_index + (time - last.time) as f64 / self.bar_secs();
        }

        let next = self.window.partition_point(|bar| bar.time <= time);
        let (a, b) = (&self.window[next - 1], &self.window[next]);
        (next - 1) as f64 + (time - a.time) as f64 / (b.time - a.time) as f64
    }

    fn index_time(&self, index: f64) -> u64 {
        let (Some(first), Some(last)) = (self.window.first(), self.window.last()) else {
            return 0;
        };
        let last_index = (self.window.len() - 1) as f64;

        let time = if index <= 0.0 {
            first.time as f64 + index * self.bar_secs()
        } else if index >= last_index {
            last.time as f64 + (index - last_index) * self.bar_secs()
        } else {
            let i = index.floor() as usize;
            let (a, b) = (&self.window[i], &self.window[i + 1]);
            a.time as f64 + (index - i as f64) * (b.time - a.time) as f64
        };

        time.round().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::bar_at;

    const M5: u64 = 300;

    fn window(len: usize) -> Vec<Bar> {
        (0..len)
            .map(|i| bar_at(1_000_000 + i as u64 * M5, 150.0 + i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn extremes_map_to_edges() {
        let space = PriceSpace::new(Price::from_f64(150.0), Price::from_f64(151.0), 300.0);

        assert_eq!(space.price_to_y(Price::from_f64(151.0)), 0.0);
        assert_eq!(space.price_to_y(Price::from_f64(150.0)), 300.0);
        assert_eq!(space.price_to_y(Price::from_f64(150.5)), 150.0);
        assert_eq!(space.y_to_price(150.0), Price::from_f64(150.5));
    }

    #[test]
    fn pixel_round_trip_within_one_row() {
        let space = PriceSpace::new(Price::from_f64(149.873), Price::from_f64(150.419), 300.0);

        for y in 0..300 {
            let y = y as f32;
            let back = space.price_to_y(space.y_to_price(y));
            assert!((back - y).abs() <= 1.0, "y {y} came back as {back}");
        }
    }

    #[test]
    fn flat_window_uses_unit_range() {
        let flat = [Bar::new(0, 150.0, 150.0, 150.0, 150.0, 0)];
        let space = PriceSpace::from_window(&flat, 300.0).unwrap();

        assert_eq!(space.range(), 1.0);
        assert!(space.price_to_y(Price::from_f64(150.0)).is_finite());
        assert!(PriceSpace::from_window(&[], 300.0).is_none());
    }

    #[test]
    fn bars_pack_against_right_edge() {
        let space = BarSpace::for_count(250);
        assert_eq!(space.width, 750.0);

        assert_eq!(space.x_of(249, 250), 747.0);
        assert_eq!(space.x_of(0, 250), 0.0);
        assert_eq!(space.x_of(0, 10), 720.0);

        assert_eq!(space.index_at(748.0, 250), Some(249));
        assert_eq!(space.index_at(1.0, 250), Some(0));
        assert_eq!(space.index_at(700.0, 10), None);
        assert_eq!(space.index_at(750.0, 250), None);
    }

    #[test]
    fn bar_times_map_to_candle_centres() {
        let bars = window(20);
        let projection = Projection::new(&bars, BarSpace::for_count(20), 300.0, Timeframe::M5).unwrap();

        for (i, bar) in bars.iter().enumerate() {
            let x = projection.time_to_x(bar.time);
            assert_eq!(x, projection.bars.center_of(i, bars.len()));
            assert_eq!(projection.x_to_time(x), bar.time);
        }
    }

    #[test]
    fn times_outside_window_extrapolate() {
        let bars = window(20);
        let projection = Projection::new(&bars, BarSpace::for_count(20), 300.0, Timeframe::M5).unwrap();

        let last = bars[19].time;
        let step = projection.bars.step();
        assert_eq!(projection.time_to_x(last + 2 * M5), projection.time_to_x(last) + 2.0 * step);
        assert_eq!(projection.time_to_x(bars[0].time - M5), projection.time_to_x(bars[0].time) - step);

        let between = bars[3].time + M5 / 2;
        let x = projection.time_to_x(between);
        assert!(x > projection.time_to_x(bars[3].time) && x < projection.time_to_x(bars[4].time));
        assert_eq!(projection.x_to_time(x), between);
    }

    #[test]
    fn hover_finds_bar_under_cursor() {
        let bars = window(20);
        let projection = Projection::new(&bars, BarSpace::for_count(20), 300.0, Timeframe::M5).unwrap();

        assert_eq!(projection.bar_at(59.5).map(|b| b.time), Some(bars[19].time));
        assert_eq!(projection.bar_at(0.5).map(|b| b.time), Some(bars[0].time));
        assert!(projection.bar_at(-1.0).is_none());
    }
}
