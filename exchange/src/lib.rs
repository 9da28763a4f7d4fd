pub mod adapter;
pub mod connect;
pub mod unit;

pub use adapter::{AdapterError, RateSource, bridge::BridgeClient};
pub use unit::price::Price;

use enum_map::Enum;
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Bar interval as understood by the market-data bridge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, Enum,
)]
pub enum Timeframe {
    M1,
    #[default]
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    /// Nominal bar length. Months are counted as 30 days, which is only used
    /// to extrapolate positions outside of fetched data.
    pub fn to_seconds(self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
            Timeframe::W1 => 604_800,
            Timeframe::MN1 => 2_592_000,
        }
    }

    /// Number-row shortcut: `1` is M1 through `9` for MN1.
    pub fn from_key(key: char) -> Option<Self> {
        let digit = key.to_digit(10)?;
        (1..=9)
            .contains(&digit)
            .then(|| Self::ALL[(digit - 1) as usize])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTimeframe(pub String);

impl fmt::Display for InvalidTimeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid timeframe: {}", self.0)
    }
}

impl std::error::Error for InvalidTimeframe {}

impl FromStr for Timeframe {
    type Err = InvalidTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == upper)
            .ok_or_else(|| InvalidTimeframe(s.to_string()))
    }
}

/// One OHLC sample as delivered by the bridge. `time` is the bar open in UTC
/// epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Bar {
    pub time: u64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    #[serde(rename = "tick_volume", alias = "volume", default)]
    pub volume: u64,
}

impl Bar {
    pub fn new(time: u64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            time,
            open: Price::from_f64(open),
            high: Price::from_f64(high),
            low: Price::from_f64(low),
            close: Price::from_f64(close),
            volume,
        }
    }

    pub fn body_top(&self) -> Price {
        self.open.max(self.close)
    }

    pub fn body_bottom(&self) -> Price {
        self.open.min(self.close)
    }
}

/// Request sent to a [`RateSource`]. With `from_time` set, only bars opening
/// at or after that time are of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_time: Option<u64>,
}

impl RateRequest {
    pub fn latest(symbol: impl Into<String>, timeframe: Timeframe, count: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            count,
            from_time: None,
        }
    }

    pub fn since(symbol: impl Into<String>, timeframe: Timeframe, count: usize, from: u64) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            count,
            from_time: Some(from),
        }
    }

    pub fn is_differential(&self) -> bool {
        self.from_time.is_some()
    }
}
