pub mod config_tou;
pub mod device_latest;
pub mod station_list;
pub mod token;

use serde::Deserialize;
use serde_json::Value;

/* Fields every Deye response carries next to its payload */
#[derive(Deserialize)]
pub struct Status {
    pub success: Option<bool>,
    pub code: Option<Value>,
    pub msg: Option<String>,
}

impl Status {
    pub fn is_failure(&self) -> bool {
        self.success == Some(false)
    }

    pub fn code(&self) -> String {
        match &self.code {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        }
    }

    pub fn message(&self) -> String {
        self.msg
            .clone()
            .unwrap_or_else(|| "(no error message received)".to_string())
    }
}

#[cfg(test)]
mod test {
    use super::config_tou::ConfigTou;
    use super::device_latest::DeviceLatest;
    use super::station_list::StationListWithDevice;
    use super::token::Token;
    use super::Status;
    use std::fs;
    use std::path::PathBuf;

    fn read_resource(filename: &str) -> String {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push(format!("resources/test/{}", filename));
        fs::read_to_string(d.as_path()).unwrap()
    }

    #[test]
    fn token() {
        let input = read_resource("token.json");
        let output: Token = serde_json::from_str(&input).unwrap();
        assert_eq!(Some("eyJhbGciOiJSUzI1NiJ9.token"), output.access_token.as_deref());
        assert_eq!(Some(5183999), output.expires_in_secs());

        let status: Status = serde_json::from_str(&input).unwrap();
        assert!(!status.is_failure());
        assert_eq!("1000000", status.code());
    }

    #[test]
    fn token_rejected() {
        let input = read_resource("token_rejected.json");
        let output: Token = serde_json::from_str(&input).unwrap();
        assert_eq!(None, output.access_token);

        let status: Status = serde_json::from_str(&input).unwrap();
        assert!(status.is_failure());
        assert_eq!("auth invalid", status.message());
    }

    #[test]
    fn station_list_with_device() {
        let input = read_resource("listWithDevice.json");
        let output: StationListWithDevice = serde_json::from_str(&input).unwrap();
        assert_eq!(2, output.station_list.len());
        assert_eq!(Some("Rooftop"), output.station_list[0].name.as_deref());
        assert_eq!("2306198765", output.station_list[0].device_list_items[0].device_sn);
        assert_eq!(1, output.station_list[0].inverters().count());
        assert_eq!(0, output.station_list[1].inverters().count());
    }

    #[test]
    fn device_latest() {
        let input = read_resource("deviceLatest.json");
        let output: DeviceLatest = serde_json::from_str(&input).unwrap();
        let records = &output.device_data_list[0].data_list;
        assert_eq!("SOC", records[0].key);
        assert_eq!(Some(87.0), records[0].value.as_f64());
        assert_eq!(Some("%"), records[0].unit.as_deref());
    }

    #[test]
    fn device_latest_without_readings() {
        let input = read_resource("deviceLatest_null.json");
        let output: DeviceLatest = serde_json::from_str(&input).unwrap();
        let records = &output.device_data_list[0].data_list;
        assert_eq!(3, records.len());
        assert_eq!(Some(85.0), records[0].value.as_f64());
        assert_eq!(None, records[1].value.as_f64());
        assert_eq!(None, records[2].value.as_f64());
        assert_eq!(Some("W"), records[2].unit.as_deref());
    }

    #[test]
    fn token_zero_lease_is_ignored() {
        let output: Token =
            serde_json::from_str(r#"{"accessToken": "t", "expiresIn": 0}"#).unwrap();
        assert_eq!(None, output.expires_in_secs());

        let output: Token =
            serde_json::from_str(r#"{"accessToken": "t", "expiresIn": "0"}"#).unwrap();
        assert_eq!(None, output.expires_in_secs());
    }

    #[test]
    fn config_tou() {
        let input = read_resource("configTou.json");
        let output: ConfigTou = serde_json::from_str(&input).unwrap();
        assert_eq!(6, output.time_use_setting_items.len());
        assert_eq!("0100", output.time_use_setting_items[1].time);
        assert!(output.time_use_setting_items[1].enable_grid_charge);
    }

    #[test]
    #[should_panic]
    fn device_latest_missing_list() {
        let input = read_resource("valid_json.json");
        let _output: DeviceLatest = serde_json::from_str(&input).unwrap();
    }

    #[test]
    #[should_panic]
    fn config_tou_invalid_json() {
        let input = read_resource("invalid_json.json");
        let _output: ConfigTou = serde_json::from_str(&input).unwrap();
    }
}
