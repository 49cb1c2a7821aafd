use crate::model::TouSlot;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigTou {
    pub time_use_setting_items: Vec<TouSlot>,
}
