//! Response records
//!
//! Typed views over the `KEY=VALUE` lines returned by `AT+DIAGNOSTICS?` and
//! `AT+VERSION?`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::protocol::ProtocolError;

/// Diagnostics field: supply voltage, e.g. `3.90V`
pub const FIELD_BATTERY: &str = "BATTERY";
/// Diagnostics field: maximum recorded temperature
pub const FIELD_MAX_TEMP: &str = "MAX TEMP";
/// Diagnostics field: minimum recorded temperature
pub const FIELD_MIN_TEMP: &str = "MIN TEMP";
/// Version field: firmware version
pub const FIELD_FIRMWARE: &str = "F.W";
/// Version field: hardware version
pub const FIELD_HARDWARE: &str = "H.W";

/// Split `KEY=VALUE` lines into a map. A repeated key keeps its last value.
fn parse_fields<'a, I>(lines: I) -> Result<BTreeMap<String, String>, ProtocolError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut fields = BTreeMap::new();
    for line in lines {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ProtocolError::MalformedField(line.clone()))?;
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}

fn lookup<'a>(fields: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, ProtocolError> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
}

fn parse_float(field: &str, value: &str) -> Result<f64, ProtocolError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ProtocolError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Parse the `<digits>.<digits>` number at the start of `s`.
///
/// Anything after the number (a unit suffix like `V`) is ignored. Returns
/// `None` if `s` does not start with that shape.
pub fn parse_leading_decimal(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();

    let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if int_len == 0 || bytes.get(int_len) != Some(&b'.') {
        return None;
    }

    let frac_len = bytes[int_len + 1..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if frac_len == 0 {
        return None;
    }

    s[..int_len + 1 + frac_len].parse().ok()
}

/// Internal diagnostics: temperatures and supply voltage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    fields: BTreeMap<String, String>,
}

impl Diagnostics {
    /// Build from a diagnostics response; every line is a field
    pub fn from_lines(lines: &[String]) -> Result<Self, ProtocolError> {
        Ok(Self {
            fields: parse_fields(lines)?,
        })
    }

    /// Raw value of a field
    pub fn get(&self, key: &str) -> Result<&str, ProtocolError> {
        lookup(&self.fields, key)
    }

    /// All fields
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Supply voltage in volts
    pub fn battery(&self) -> Result<f64, ProtocolError> {
        let value = self.get(FIELD_BATTERY)?;
        parse_leading_decimal(value).ok_or_else(|| ProtocolError::InvalidNumber {
            field: FIELD_BATTERY.to_string(),
            value: value.to_string(),
        })
    }

    /// Maximum internal temperature in degrees Celsius
    pub fn max_temp(&self) -> Result<f64, ProtocolError> {
        parse_float(FIELD_MAX_TEMP, self.get(FIELD_MAX_TEMP)?)
    }

    /// Minimum internal temperature in degrees Celsius
    pub fn min_temp(&self) -> Result<f64, ProtocolError> {
        parse_float(FIELD_MIN_TEMP, self.get(FIELD_MIN_TEMP)?)
    }
}

/// Firmware and hardware versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionInfo {
    fields: BTreeMap<String, String>,
}

impl VersionInfo {
    /// Build from a version response. The first line is a status header and
    /// is skipped.
    pub fn from_lines(lines: &[String]) -> Result<Self, ProtocolError> {
        Ok(Self {
            fields: parse_fields(lines.iter().skip(1))?,
        })
    }

    /// Raw value of a field
    pub fn get(&self, key: &str) -> Result<&str, ProtocolError> {
        lookup(&self.fields, key)
    }

    /// All fields
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Firmware version string
    pub fn firmware(&self) -> Result<&str, ProtocolError> {
        self.get(FIELD_FIRMWARE)
    }

    /// Hardware version string
    pub fn hardware(&self) -> Result<&str, ProtocolError> {
        self.get(FIELD_HARDWARE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_leading_decimal() {
        assert_eq!(parse_leading_decimal("3.90V"), Some(3.90));
        assert_eq!(parse_leading_decimal("12.5"), Some(12.5));
        assert_eq!(parse_leading_decimal("3.90 V"), Some(3.90));
        assert_eq!(parse_leading_decimal("3V"), None);
        assert_eq!(parse_leading_decimal("3.V"), None);
        assert_eq!(parse_leading_decimal(".5"), None);
        assert_eq!(parse_leading_decimal("V3.9"), None);
        assert_eq!(parse_leading_decimal(""), None);
        assert_eq!(parse_leading_decimal("-3.9"), None);
    }

    #[test]
    fn test_diagnostics_fields() {
        let diag =
            Diagnostics::from_lines(&lines(&["BATTERY=3.90V", "MAX TEMP=25", "MIN TEMP=10"]))
                .unwrap();

        let expected: BTreeMap<String, String> = [
            ("BATTERY", "3.90V"),
            ("MAX TEMP", "25"),
            ("MIN TEMP", "10"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(diag.fields(), &expected);

        assert_eq!(diag.battery().unwrap(), 3.90);
        assert_eq!(diag.max_temp().unwrap(), 25.0);
        assert_eq!(diag.min_temp().unwrap(), 10.0);
    }

    #[test]
    fn test_split_on_first_equals() {
        let diag = Diagnostics::from_lines(&lines(&["NOTE=a=b"])).unwrap();
        assert_eq!(diag.get("NOTE").unwrap(), "a=b");
    }

    #[test]
    fn test_repeated_key_last_wins() {
        let diag = Diagnostics::from_lines(&lines(&["MAX TEMP=20", "MAX TEMP=30"])).unwrap();
        assert_eq!(diag.max_temp().unwrap(), 30.0);
    }

    #[test]
    fn test_line_without_equals() {
        let err = Diagnostics::from_lines(&lines(&["BATTERY"])).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedField(ref l) if l == "BATTERY"));
    }

    #[test]
    fn test_missing_field() {
        let diag = Diagnostics::from_lines(&lines(&["MAX TEMP=25"])).unwrap();
        assert!(matches!(
            diag.battery(),
            Err(ProtocolError::MissingField(ref k)) if k == "BATTERY"
        ));
        assert!(matches!(diag.min_temp(), Err(ProtocolError::MissingField(_))));
    }

    #[test]
    fn test_bad_numbers() {
        let diag =
            Diagnostics::from_lines(&lines(&["BATTERY=low", "MAX TEMP=hot"])).unwrap();
        assert!(matches!(diag.battery(), Err(ProtocolError::InvalidNumber { .. })));
        assert!(matches!(diag.max_temp(), Err(ProtocolError::InvalidNumber { .. })));
    }

    #[test]
    fn test_negative_temperature() {
        let diag = Diagnostics::from_lines(&lines(&["MIN TEMP=-4.5"])).unwrap();
        assert_eq!(diag.min_temp().unwrap(), -4.5);
    }

    #[test]
    fn test_version_skips_header() {
        let version = VersionInfo::from_lines(&lines(&["STATUS", "F.W=1.2", "H.W=A1"])).unwrap();
        assert_eq!(version.fields().len(), 2);
        assert_eq!(version.firmware().unwrap(), "1.2");
        assert_eq!(version.hardware().unwrap(), "A1");
    }

    #[test]
    fn test_version_empty_response() {
        let version = VersionInfo::from_lines(&[]).unwrap();
        assert!(version.fields().is_empty());
        assert!(matches!(version.firmware(), Err(ProtocolError::MissingField(_))));
    }

    #[test]
    fn test_records_serialize_as_maps() {
        let version = VersionInfo::from_lines(&lines(&["OK", "F.W=1.2", "H.W=A1"])).unwrap();
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, r#"{"F.W":"1.2","H.W":"A1"}"#);
    }
}
