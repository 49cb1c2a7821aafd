pub mod endpoint;
pub mod error;
pub mod response;

use crate::model::{Credentials, InverterChoice, Station, TelemetryRecord, Token, TouSlot};
use crate::tou::{self, TouChange};
pub use error::Error;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use response::config_tou::ConfigTou;
use response::device_latest::DeviceLatest;
use response::station_list::StationListWithDevice;
use response::Status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Lease assumed for a token, the token endpoint does not always say.
pub const DEFAULT_TOKEN_LEASE: Duration = Duration::from_secs(3600);

const STATION_PAGE_SIZE: u32 = 50;

/// Result codes of a `success: false` reply that mean the bearer token was refused.
const TOKEN_REJECTED_CODES: &[&str] = &["2101019"];

/// Lower-case hex SHA-256 of `password`, the form the token endpoint expects.
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Map transport errors and non-2xx responses to Error
fn map_api_err(error: reqwest::Error) -> Error {
    match error.status() {
        Some(status) => Error::Network(format!("server responded {}: {}", status, error)),
        None => Error::Network(error.to_string()),
    }
}

/// Process value of valid HTTP response (2xx) to identify API-level errors indicated
/// with `success: false`. A missing `success` field is not treated as a failure.
fn map_response_status(value: Value) -> Result<Value, Error> {
    match Status::deserialize(&value) {
        Ok(status) if status.is_failure() => Err(Error::Remote {
            code: status.code(),
            message: status.message(),
        }),
        _ => Ok(value),
    }
}

fn extract<T: DeserializeOwned>(endpoint: &endpoint::Endpoint, value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::DataShape(format!("{}: {}", endpoint, e)))
}

/// Inverters among `stations`, labelled with their station name.
pub fn inverter_choices(stations: &[Station]) -> Vec<InverterChoice> {
    stations
        .iter()
        .flat_map(|station| {
            let name = station.name.as_deref().unwrap_or("Unknown");
            station.inverters().map(move |device| InverterChoice {
                device_sn: device.device_sn.clone(),
                label: format!("{} ({})", name, device.device_sn),
            })
        })
        .collect()
}

/// Authenticated access to the Deye cloud, not yet bound to a device.
///
/// Holds the only HTTP client and the bearer token. Use [`DeyeCloud::bind`]
/// once the device serial number is known.
pub struct DeyeCloud {
    credentials: Credentials,
    client: reqwest::Client,
    token: Mutex<Option<Token>>,
    token_lease: Duration,
}

impl DeyeCloud {
    pub fn new(credentials: Credentials) -> Result<Self, Error> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .map_err(|e| Error::Network(format!("unable to build HTTP client: {}", e)))?;

        Ok(DeyeCloud {
            credentials,
            client,
            token: Mutex::new(None),
            token_lease: DEFAULT_TOKEN_LEASE,
        })
    }

    pub fn with_token_lease(mut self, lease: Duration) -> Self {
        self.token_lease = lease;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Expiry of the currently held token, if any.
    pub async fn token_expiry(&self) -> Option<Instant> {
        self.token.lock().await.as_ref().map(|t| t.expiry)
    }

    fn url(&self, endpoint: &endpoint::Endpoint) -> String {
        format!("{}{}", self.credentials.base_url.trim_end_matches('/'), endpoint)
    }

    /// Make sure a valid token is held. No request is made while the current one
    /// is still within its lease.
    pub async fn authenticate(&self) -> Result<(), Error> {
        self.token().await.map(|_| ())
    }

    /// Headers for an authenticated call: bearer token and JSON content type.
    pub async fn get_headers(&self) -> Result<HeaderMap, Error> {
        let token = self.token().await?;
        headers_for(&token)
    }

    /* The lock is held across the token request so overlapping callers wait
    for a single authentication instead of starting their own. */
    async fn token(&self) -> Result<String, Error> {
        let mut slot = self.token.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_valid_at(Instant::now()) {
                return Ok(token.value.clone());
            }
            log::debug!("Token expired, authenticating again");
        }
        *slot = None;

        let token = self.request_token().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self, rejected: &str) {
        let mut slot = self.token.lock().await;
        if slot.as_ref().map(|t| t.value.as_str()) == Some(rejected) {
            log::warn!("Token rejected by the server, dropping it");
            *slot = None;
        }
    }

    async fn request_token(&self) -> Result<Token, Error> {
        log::debug!(
            "Authenticating with: base_url={} app_id={} email={}",
            self.credentials.base_url,
            self.credentials.app_id,
            self.credentials.email
        );

        let request_body = json!({
            "appSecret": self.credentials.app_secret,
            "email": self.credentials.email,
            "password": hash_password(&self.credentials.password),
        });

        let text = self
            .client
            .post(self.url(endpoint::TOKEN))
            .query(&[("appId", self.credentials.app_id.as_str())])
            .json(&request_body)
            .send()
            .await
            .map_err(map_api_err)?
            .error_for_status()
            .map_err(map_api_err)?
            .text()
            .await
            .map_err(|e| Error::Network(format!("Error reading API response: {}", e)))?;

        let value = serde_json::from_str::<Value>(&text)
            .map_err(|e| Error::Authentication(format!("token response is not JSON: {}", e)))?;
        let response = response::token::Token::deserialize(&value)
            .map_err(|e| Error::Authentication(format!("unexpected token response: {}", e)))?;

        let access_token = match response.access_token.as_deref() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                let reason = match Status::deserialize(&value) {
                    Ok(status) if status.is_failure() => {
                        format!("{} ({})", status.message(), status.code())
                    }
                    _ => "No accessToken returned".to_string(),
                };
                return Err(Error::Authentication(reason));
            }
        };

        let lease = response
            .expires_in_secs()
            .map(Duration::from_secs)
            .map_or(self.token_lease, |hint| hint.min(self.token_lease));
        log::debug!("Authenticated, token valid for {}s", lease.as_secs());

        Ok(Token {
            value: access_token,
            expiry: Instant::now() + lease,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &endpoint::Endpoint,
        data: &B,
    ) -> Result<Value, Error> {
        let token = self.token().await?;

        let response = self
            .client
            .post(self.url(endpoint))
            .headers(headers_for(&token)?)
            .json(data)
            .send()
            .await
            .map_err(map_api_err)?;

        if response.status() == http::StatusCode::UNAUTHORIZED {
            self.invalidate_token(&token).await;
        }

        let response_text = response
            .error_for_status()
            .map_err(map_api_err)?
            .text()
            .await
            .map_err(|e| Error::Network(format!("Error reading API response: {}", e)))?;

        log::trace!("endpoint: {}, response_text: {}", endpoint, response_text);

        let result = serde_json::from_str::<Value>(&response_text)
            .map_err(|e| Error::DataShape(format!("{}: {}: {}", endpoint, e, response_text)))
            .and_then(map_response_status);

        if let Err(Error::Remote { code, .. }) = &result {
            if TOKEN_REJECTED_CODES.contains(&code.as_str()) {
                self.invalidate_token(&token).await;
            }
        }
        result
    }

    /// List stations of the account, each with its devices.
    pub async fn get_station_list_with_devices(&self) -> Result<Vec<Station>, Error> {
        log::info!("Fetching station list with devices...");
        let request_body = json!({ "page": 1, "size": STATION_PAGE_SIZE });

        let value = self
            .post(endpoint::STATION_LIST_WITH_DEVICE, &request_body)
            .await?;
        extract::<StationListWithDevice>(endpoint::STATION_LIST_WITH_DEVICE, value)
            .map(|response| response.station_list)
    }

    /// Candidate devices for binding: every `INVERTER` of every station.
    pub async fn inverters(&self) -> Result<Vec<InverterChoice>, Error> {
        let stations = self.get_station_list_with_devices().await?;
        Ok(inverter_choices(&stations))
    }

    /// Bind this session to the inverter `device_sn`.
    pub fn bind(self, device_sn: impl Into<String>) -> Result<Inverter, Error> {
        let device_sn = device_sn.into().trim().to_string();
        if device_sn.is_empty() {
            return Err(Error::Precondition(
                "device serial number is not set".to_string(),
            ));
        }

        Ok(Inverter {
            cloud: Arc::new(self),
            device_sn,
        })
    }
}

fn headers_for(token: &str) -> Result<HeaderMap, Error> {
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| Error::Authentication("token is not a valid header value".to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// A [`DeyeCloud`] session bound to one inverter. Clones share the session.
#[derive(Clone)]
pub struct Inverter {
    cloud: Arc<DeyeCloud>,
    device_sn: String,
}

impl Inverter {
    /// Shortcut for a device whose serial number is already known.
    pub fn connect(credentials: Credentials, device_sn: impl Into<String>) -> Result<Self, Error> {
        DeyeCloud::new(credentials)?.bind(device_sn)
    }

    pub fn device_sn(&self) -> &str {
        &self.device_sn
    }

    pub fn cloud(&self) -> &DeyeCloud {
        &self.cloud
    }

    /// Latest telemetry of the device, one record per signal.
    pub async fn get_realtime_data(&self) -> Result<Vec<TelemetryRecord>, Error> {
        log::info!("Fetching realtime data for device {}", self.device_sn);
        let request_body = json!({ "deviceList": [self.device_sn] });

        let value = self.cloud.post(endpoint::DEVICE_LATEST, &request_body).await?;
        extract::<DeviceLatest>(endpoint::DEVICE_LATEST, value)?
            .device_data_list
            .into_iter()
            .next()
            .map(|device| device.data_list)
            .ok_or_else(|| {
                Error::DataShape(format!("{}: empty deviceDataList", endpoint::DEVICE_LATEST))
            })
    }

    /// Current time-of-use schedule of the device.
    pub async fn get_time_of_use(&self) -> Result<Vec<TouSlot>, Error> {
        log::info!("Fetching TOU data for device {}", self.device_sn);
        let request_body = json!({ "deviceSn": self.device_sn });

        let value = self.cloud.post(endpoint::CONFIG_TOU, &request_body).await?;
        extract::<ConfigTou>(endpoint::CONFIG_TOU, value)
            .map(|response| response.time_use_setting_items)
    }

    /// Replace the whole schedule. Slot times are sent in `HHMM` form.
    ///
    /// Nothing is returned; read the schedule again to observe the result.
    pub async fn update_time_of_use(&self, schedule: &[TouSlot]) -> Result<(), Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct UpdateTouRequest<'a> {
            device_sn: &'a str,
            time_use_setting_items: &'a [TouSlot],
        }

        let items = tou::normalize_schedule(schedule);
        log::info!(
            "Updating TOU schedule ({} slots) for device {}",
            items.len(),
            self.device_sn
        );

        self.cloud
            .post(
                endpoint::TOU_UPDATE,
                &UpdateTouRequest {
                    device_sn: &self.device_sn,
                    time_use_setting_items: &items,
                },
            )
            .await
            .map(|_| ())
    }

    /// Read-modify-write of a single field of slot `index`.
    pub async fn modify_time_of_use(&self, index: usize, change: &TouChange) -> Result<(), Error> {
        let mut schedule = self.get_time_of_use().await?;
        tou::apply_change(&mut schedule, index, change)?;
        self.update_time_of_use(&schedule).await
    }

    /// Release this handle. The HTTP session goes away with the last one.
    pub fn close(self) {
        log::debug!(
            "Closing session for device {} ({} handles left)",
            self.device_sn,
            Arc::strong_count(&self.cloud) - 1
        );
    }
}
