use crate::config::theme;

use exchange::Bar;
use iced_core::Color;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PERIODS: [usize; 3] = [20, 75, 200];
pub const MAX_PERIOD: usize = 1_000;

/// One moving-average overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaConfig {
    pub period: usize,
    #[serde(with = "theme::hex", default = "default_color")]
    pub color: Color,
}

impl MaConfig {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.clamp(1, MAX_PERIOD),
            color: theme::MOVING_AVERAGE,
        }
    }

    pub fn defaults() -> Vec<Self> {
        DEFAULT_PERIODS.into_iter().map(Self::new).collect()
    }

    pub fn sanitized(self) -> Self {
        Self {
            period: self.period.clamp(1, MAX_PERIOD),
            ..self
        }
    }
}

fn default_color() -> Color {
    theme::MOVING_AVERAGE
}

/// Simple moving average of closes, as `(index, value)` pairs. The first
/// `period - 1` bars have no value.
pub fn sma(bars: &[Bar], period: usize) -> Vec<(usize, f64)> {
    if period == 0 || bars.len() < period {
        return vec![];
    }

    let closes: Vec<f64> = bars.iter().map(|bar| bar.close.to_f64()).collect();
    let mut sum: f64 = closes[..period].iter().sum();

    let mut points = Vec::with_capacity(closes.len() - period + 1);
    points.push((period - 1, sum / period as f64));

    for i in period..closes.len() {
        sum += closes[i] - closes[i - period];
        points.push((i, sum / period as f64));
    }

    points
}

/// SMA over the whole `history`, re-indexed to the last `window_len` bars.
/// Bars before the window still feed the average, so the line spans the
/// whole window whenever enough history is cached.
pub fn sma_for_window(history: &[Bar], window_len: usize, period: usize) -> Vec<(usize, f64)> {
    let offset = history.len().saturating_sub(window_len);

    sma(history, period)
        .into_iter()
        .filter_map(|(i, value)| i.checked_sub(offset).map(|i| (i, value)))
        .collect()
}
