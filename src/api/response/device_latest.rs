use crate::model::TelemetryRecord;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceData {
    pub data_list: Vec<TelemetryRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLatest {
    pub device_data_list: Vec<DeviceData>,
}
