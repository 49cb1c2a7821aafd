pub type Endpoint = str;

pub const TOKEN: &Endpoint = "/account/token";
pub const STATION_LIST_WITH_DEVICE: &Endpoint = "/station/listWithDevice";
pub const DEVICE_LATEST: &Endpoint = "/device/latest";
pub const CONFIG_TOU: &Endpoint = "/config/tou";
pub const TOU_UPDATE: &Endpoint = "/order/sys/tou/update";
