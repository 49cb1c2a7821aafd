use crate::model::Station;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationListWithDevice {
    pub station_list: Vec<Station>,
}
