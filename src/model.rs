use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::time::Instant;

/// Account and application credentials for the Deye cloud.
#[derive(Clone)]
pub struct Credentials {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Bearer token with the instant it stops being usable.
#[derive(Clone)]
pub struct Token {
    pub value: String,
    pub expiry: Instant,
}

impl Token {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expiry
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Value of a telemetry signal. The cloud sends most readings as strings,
/// and signals without a reading as `null` or without a value at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Number(Number),
    Text(String),
    #[default]
    Null,
}

impl TelemetryValue {
    /// Numeric reading, if the value is a number or a string holding one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Number(n) => n.as_f64(),
            TelemetryValue::Text(s) => s.trim().parse().ok(),
            TelemetryValue::Null => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub key: String,
    #[serde(default)]
    pub value: TelemetryValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One program slot of the time-of-use schedule.
///
/// Fields the schedule carries beyond the known ones are kept in `extra` so
/// that a read-modify-write cycle sends them back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouSlot {
    /// Start of the slot, `HHMM` on the wire.
    pub time: String,
    pub soc: u8,
    pub enable_grid_charge: bool,
    pub enable_generation: bool,
    pub power: Number,
    pub voltage: Number,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDevice {
    pub device_sn: String,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_list_items: Vec<StationDevice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub const INVERTER_DEVICE_TYPE: &str = "INVERTER";

impl Station {
    /// Devices of this station whose type is `INVERTER`.
    pub fn inverters(&self) -> impl Iterator<Item = &StationDevice> {
        self.device_list_items
            .iter()
            .filter(|d| d.device_type.as_deref() == Some(INVERTER_DEVICE_TYPE))
    }
}

/// Inverter found during discovery, labelled `"<station> (<serial>)"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InverterChoice {
    pub device_sn: String,
    pub label: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn token_expires_at_its_expiry() {
        let acquired = Instant::now();
        let token = Token {
            value: "abc".to_string(),
            expiry: acquired + Duration::from_secs(3600),
        };

        assert!(token.is_valid_at(acquired + Duration::from_secs(3599)));
        assert!(!token.is_valid_at(acquired + Duration::from_secs(3600)));
        assert!(!token.is_valid_at(acquired + Duration::from_secs(3601)));
    }

    #[test]
    fn secrets_are_not_printed() {
        let credentials = Credentials {
            base_url: "https://example.test".to_string(),
            app_id: "app".to_string(),
            app_secret: "very-secret".to_string(),
            email: "me@example.test".to_string(),
            password: "hunter2".to_string(),
        };
        let token = Token {
            value: "bearer-value".to_string(),
            expiry: Instant::now(),
        };

        let printed = format!("{:?} {:?}", credentials, token);
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("bearer-value"));
    }

    #[test]
    fn telemetry_value_as_f64() {
        let records: Vec<TelemetryRecord> = serde_json::from_value(json!([
            {"key": "SOC", "value": "85", "unit": "%"},
            {"key": "TotalPower", "value": 1234.5, "unit": "W"},
            {"key": "RunStatus", "value": "Normal"}
        ]))
        .unwrap();

        assert_eq!(Some(85.0), records[0].value.as_f64());
        assert_eq!(Some(1234.5), records[1].value.as_f64());
        assert_eq!(None, records[2].value.as_f64());
        assert_eq!(None, records[2].unit);
    }

    #[test]
    fn telemetry_without_reading() {
        let records: Vec<TelemetryRecord> = serde_json::from_value(json!([
            {"key": "Fault", "value": null},
            {"key": "AlarmCode"}
        ]))
        .unwrap();

        assert_eq!(TelemetryValue::Null, records[0].value);
        assert_eq!(TelemetryValue::Null, records[1].value);
        assert_eq!(None, records[0].value.as_f64());
    }

    #[test]
    fn tou_slot_keeps_unknown_fields() {
        let raw = json!({
            "time": "0630",
            "soc": 40,
            "enableGridCharge": false,
            "enableGeneration": true,
            "power": 5000,
            "voltage": 49.5,
            "workMode": "SELLING_FIRST"
        });
        let slot: TouSlot = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!("SELLING_FIRST", slot.extra["workMode"]);
        assert_eq!(raw, serde_json::to_value(&slot).unwrap());
    }

    #[test]
    fn station_inverters_filter() {
        let station: Station = serde_json::from_value(json!({
            "id": 7,
            "name": "Home",
            "deviceListItems": [
                {"deviceSn": "2301", "deviceType": "INVERTER"},
                {"deviceSn": "C001", "deviceType": "COLLECTOR"},
                {"deviceSn": "M001"}
            ]
        }))
        .unwrap();

        let sns: Vec<&str> = station.inverters().map(|d| d.device_sn.as_str()).collect();
        assert_eq!(vec!["2301"], sns);
    }
}
