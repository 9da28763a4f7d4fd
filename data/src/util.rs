use serde::{Deserialize, Deserializer};

/// Deserializes a field, falling back to its default when the stored value
/// does not fit the current type.
pub fn ok_or_default<'a, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Deserialize<'a> + Default,
    D: Deserializer<'a>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Like [`ok_or_default`] for display flags that are on unless set otherwise.
pub fn ok_or_enabled<'a, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'a>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(bool::deserialize(value).unwrap_or(true))
}

pub fn format_utc(epoch_secs: u64, fmt: &str) -> String {
    chrono::DateTime::from_timestamp(epoch_secs as i64, 0)
        .map(|dt| dt.format(fmt).to_string())
        .unwrap_or_default()
}
