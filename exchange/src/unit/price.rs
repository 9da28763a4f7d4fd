use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Fixed atomic unit scale: 10^-PRICE_SCALE is the smallest stored fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Price {
    /// number of atomic units (atomic unit = 10^-PRICE_SCALE)
    pub units: i64,
}

impl Price {
    /// number of decimal places of the atomic unit (10^-8)
    pub const PRICE_SCALE: i32 = 8;

    const SCALE_F64: f64 = 100_000_000.0;

    pub const ZERO: Price = Price { units: 0 };

    /// Create Price from raw atomic units (no rounding)
    pub fn from_units(units: i64) -> Self {
        Self { units }
    }

    /// Rounds to the nearest atomic unit
    pub fn from_f64(v: f64) -> Self {
        Self {
            units: (v * Self::SCALE_F64).round() as i64,
        }
    }

    pub fn to_f64(self) -> f64 {
        self.units as f64 / Self::SCALE_F64
    }

    /// Formats with a fixed number of decimals, rounding half away from zero.
    pub fn to_string_with(self, decimals: u32) -> String {
        let decimals = decimals.min(Self::PRICE_SCALE as u32);
        let unit = 10i64.pow(Self::PRICE_SCALE as u32 - decimals);
        let half = unit / 2;

        let rounded = if self.units >= 0 {
            (self.units + half).div_euclid(unit)
        } else {
            -((-self.units + half).div_euclid(unit))
        };

        let sign = if rounded < 0 { "-" } else { "" };
        let abs = rounded.unsigned_abs();

        if decimals == 0 {
            return format!("{sign}{abs}");
        }

        let pow = 10u64.pow(decimals);
        format!(
            "{sign}{}.{:0width$}",
            abs / pow,
            abs % pow,
            width = decimals as usize
        )
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_with(3))
    }
}

impl std::ops::Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            units: self.units.saturating_add(rhs.units),
        }
    }
}

impl std::ops::Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            units: self.units.saturating_sub(rhs.units),
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // bridge rows carry plain numbers, hand-edited files sometimes strings
        let value = Value::deserialize(deserializer)?;
        let v = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid price: {value}")))?;

        Ok(Price::from_f64(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_rounding() {
        assert_eq!(Price::from_f64(150.1234).to_string_with(3), "150.123");
        assert_eq!(Price::from_f64(150.1236).to_string_with(3), "150.124");
        assert_eq!(Price::from_f64(-0.0005).to_string_with(3), "-0.001");
        assert_eq!(Price::from_f64(1.5).to_string_with(0), "2");
        assert_eq!(Price::from_f64(149.9).to_string(), "149.900");
    }

    #[test]
    fn serde_keeps_plain_numbers() {
        let p: Price = serde_json::from_str("150.123").unwrap();
        assert_eq!(p, Price::from_f64(150.123));
        assert_eq!(serde_json::to_string(&p).unwrap(), "150.123");

        let quoted: Price = serde_json::from_str("\"1.0850\"").unwrap();
        assert_eq!(quoted, Price::from_f64(1.085));

        assert!(serde_json::from_str::<Price>("true").is_err());
    }
}
