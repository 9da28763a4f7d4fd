use crate::chart::indicator::MaConfig;
use crate::util::{ok_or_default, ok_or_enabled};
use crate::{InternalError, read_json_file};

use exchange::{Timeframe, adapter::bridge::DEFAULT_ENDPOINT};
use serde::{Deserialize, Serialize};

use std::path::Path;

pub const DEFAULT_SYMBOLS: [&str; 7] = [
    "USDJPY", "EURUSD", "EURJPY", "GBPUSD", "GBPJPY", "AUDJPY", "AUDUSD",
];
pub const MIN_DISPLAY_COUNT: usize = 20;
pub const MAX_DISPLAY_COUNT: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "ok_or_default")]
    pub endpoint: String,
    #[serde(deserialize_with = "ok_or_default")]
    pub symbol: String,
    #[serde(deserialize_with = "ok_or_default")]
    pub timeframe: Timeframe,
    #[serde(deserialize_with = "ok_or_default")]
    pub symbols: Vec<String>,
    #[serde(deserialize_with = "ok_or_default")]
    pub display_count: usize,
    #[serde(deserialize_with = "ok_or_default")]
    pub chart_height: f32,
    #[serde(deserialize_with = "ok_or_default")]
    pub auto_refresh_secs: u64,
    #[serde(deserialize_with = "ok_or_default")]
    pub moving_averages: Vec<MaConfig>,
    #[serde(deserialize_with = "ok_or_enabled")]
    pub show_candles: bool,
    #[serde(deserialize_with = "ok_or_enabled")]
    pub show_moving_averages: bool,
    #[serde(deserialize_with = "ok_or_enabled")]
    pub show_dividers: bool,
    #[serde(deserialize_with = "ok_or_default")]
    pub annotations_file: String,
    #[serde(deserialize_with = "ok_or_default")]
    pub selection_tolerance: f32,
    #[serde(deserialize_with = "ok_or_default")]
    pub max_cached_bars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            symbol: "USDJPY".to_string(),
            timeframe: Timeframe::M5,
            symbols: DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
            display_count: 250,
            chart_height: 300.0,
            auto_refresh_secs: 5,
            moving_averages: MaConfig::defaults(),
            show_candles: true,
            show_moving_averages: true,
            show_dividers: true,
            annotations_file: "annotations.json".to_string(),
            selection_tolerance: 5.0,
            max_cached_bars: crate::cache::DEFAULT_MAX_BARS,
        }
    }
}

impl Settings {
    /// Reads the settings file. A missing file gives defaults; a corrupt one
    /// is moved aside by [`read_json_file`] and also gives defaults.
    pub fn load(path: &Path) -> Self {
        match read_json_file::<Settings>(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings.sanitized()
            }
            Err(InternalError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::info!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                log::error!("Failed to load settings: {err}");
                Self::default()
            }
        }
    }

    /// Replaces values that fell back to a zero default, or that are out of
    /// range, with usable ones.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();

        let symbols: Vec<String> = self
            .symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let moving_averages = self
            .moving_averages
            .into_iter()
            .map(MaConfig::sanitized)
            .collect();

        Self {
            endpoint: non_empty(self.endpoint, defaults.endpoint),
            symbol: non_empty(self.symbol.trim().to_uppercase(), defaults.symbol),
            timeframe: self.timeframe,
            symbols: if symbols.is_empty() {
                defaults.symbols
            } else {
                symbols
            },
            display_count: if self.display_count == 0 {
                defaults.display_count
            } else {
                self.display_count
                    .clamp(MIN_DISPLAY_COUNT, MAX_DISPLAY_COUNT)
            },
            chart_height: if self.chart_height.is_finite() && self.chart_height >= 1.0 {
                self.chart_height
            } else {
                defaults.chart_height
            },
            auto_refresh_secs: self.auto_refresh_secs.max(1),
            moving_averages,
            show_candles: self.show_candles,
            show_moving_averages: self.show_moving_averages,
            show_dividers: self.show_dividers,
            annotations_file: non_empty(self.annotations_file, defaults.annotations_file),
            selection_tolerance: if self.selection_tolerance > 0.0 {
                self.selection_tolerance
            } else {
                defaults.selection_tolerance
            },
            max_cached_bars: if self.max_cached_bars == 0 {
                defaults.max_cached_bars
            } else {
                self.max_cached_bars.max(MAX_DISPLAY_COUNT)
            },
        }
    }
}

fn non_empty(value: String, fallback: String) -> String {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{temp_file, write_json_to_file};

    #[test]
    fn missing_file_gives_defaults() {
        let settings = Settings::load(&temp_file("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.display_count, 250);
        assert_eq!(settings.moving_averages.len(), 3);
    }

    #[test]
    fn partial_file_keeps_valid_fields() {
        let path = temp_file("settings.json");
        write_json_to_file(
            r##"{
                "symbol": "eurusd",
                "timeframe": "H1",
                "display_count": 5,
                "auto_refresh_secs": "soon",
                "moving_averages": [{"period": 50, "color": "#112233"}]
            }"##,
            &path,
        )
        .unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.symbol, "EURUSD");
        assert_eq!(settings.timeframe, Timeframe::H1);
        assert_eq!(settings.display_count, MIN_DISPLAY_COUNT);
        assert_eq!(settings.auto_refresh_secs, 1);
        assert_eq!(settings.moving_averages[0].period, 50);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn malformed_flags_stay_enabled() {
        let path = temp_file("settings.json");
        write_json_to_file(
            r#"{
                "show_moving_averages": "yes",
                "show_dividers": 1,
                "show_candles": false
            }"#,
            &path,
        )
        .unwrap();

        let settings = Settings::load(&path);
        assert!(settings.show_moving_averages);
        assert!(settings.show_dividers);
        assert!(!settings.show_candles);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let path = temp_file("settings.json");
        write_json_to_file("[1, 2", &path).unwrap();

        assert_eq!(Settings::load(&path), Settings::default());
        assert!(!path.exists());
    }
}
