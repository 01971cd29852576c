use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Parses the service's timestamps.
///
/// The service emits ISO 8601 strings, sometimes without a timezone
/// ("2025-11-20T05:28:45.444128"); those are taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}

pub(crate) fn deserialize_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => parse_datetime(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("Failed to parse datetime: {}", s))),
    }
}

/// `Option<T>` that accepts an explicit `null` but not a missing key; use it
/// without `#[serde(default)]`.
pub(crate) fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Appends the `otp` query parameter to a relative URL when one is given.
pub fn with_otp(relative_url: &str, otp: Option<&str>) -> String {
    match otp {
        None => relative_url.to_string(),
        Some(otp) => {
            let sep = if relative_url.contains('?') { '&' } else { '?' };
            let encoded: String = url::form_urlencoded::byte_serialize(otp.as_bytes()).collect();
            format!("{}{}otp={}", relative_url, sep, encoded)
        }
    }
}

/// Builds `path?k=v&...` with form-encoded values.
pub(crate) fn with_query(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    format!("{}?{}", path, query)
}

/// Normalizes a phone number to digits only, country code first.
///
/// "+44 0123456789", "(+44) 012 345 6789" and "00440123456789" all become
/// "440123456789".
pub fn standardize_phone_number(phone_number: &str) -> String {
    let digits: String = phone_number.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix("00") {
        Some(rest) => rest.to_string(),
        None => digits,
    }
}
