#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use deye_cloud_rs::api::{self, DeyeCloud, Inverter};
use deye_cloud_rs::model::{TelemetryRecord, TouSlot};
use deye_cloud_rs::settings::{self, Settings};
use deye_cloud_rs::tou::TouChange;
use deye_cloud_rs::Coordinator;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

mod metrics;

/// Structure containing state for API handlers.
pub struct StateData {
    inverter: Inverter,
    realtime: Arc<Coordinator<Vec<TelemetryRecord>>>,
    tou: Arc<Coordinator<Vec<TouSlot>>>,
}

impl StateData {
    async fn refresh_realtime(&self) -> bool {
        self.realtime
            .refresh(|| self.inverter.get_realtime_data())
            .await
    }

    async fn refresh_tou(&self) -> bool {
        self.tou.refresh(|| self.inverter.get_time_of_use()).await
    }
}

fn coordinator_diagnostics<T>(coordinator: &Coordinator<T>) -> Value
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    json!({
        "name": coordinator.name(),
        "available": coordinator.available(),
        "interval_secs": coordinator.interval().as_secs(),
        "last_refresh_secs_ago": coordinator.last_refresh().map(|at| at.elapsed().as_secs()),
        "data": coordinator.data(),
    })
}

#[get("/metrics")]
fn metrics_route(state: &State<StateData>) -> Result<String, api::Error> {
    metrics::render(state.inverter.device_sn(), &state.realtime, &state.tou)
}

#[get("/realtime")]
fn realtime_route(state: &State<StateData>) -> Result<Json<Vec<TelemetryRecord>>, Status> {
    state
        .realtime
        .available_data()
        .map(Json)
        .ok_or(Status::ServiceUnavailable)
}

#[get("/tou")]
fn tou_route(state: &State<StateData>) -> Result<Json<Vec<TouSlot>>, Status> {
    state
        .tou
        .available_data()
        .map(Json)
        .ok_or(Status::ServiceUnavailable)
}

/// Change one field of one slot, then read the schedule back since the update
/// call does not return it. A failed read-back is reported as the route's error.
#[post("/tou/<slot>", data = "<change>")]
async fn tou_change_route(
    state: &State<StateData>,
    slot: usize,
    change: Json<TouChange>,
) -> Result<Json<Vec<TouSlot>>, api::Error> {
    let change = change.into_inner();
    log::info!("Changing TOU slot {}: {:?}", slot, change);

    state.inverter.modify_time_of_use(slot, &change).await?;
    let schedule = state
        .tou
        .try_refresh(|| state.inverter.get_time_of_use())
        .await?;

    Ok(Json(schedule))
}

#[post("/refresh")]
async fn refresh_route(state: &State<StateData>) -> Json<Value> {
    let realtime = state.refresh_realtime().await;
    let tou = state.refresh_tou().await;
    log::info!("Manual refresh triggered");

    Json(json!({ "realtime": realtime, "tou": tou }))
}

#[get("/stations")]
async fn stations_route(state: &State<StateData>) -> Result<String, api::Error> {
    let stations = state.inverter.cloud().get_station_list_with_devices().await?;

    Ok(format!("{:#?}", stations))
}

#[get("/diagnostics")]
async fn diagnostics_route(state: &State<StateData>) -> Json<Value> {
    let cloud = state.inverter.cloud();
    let token_expires_in = cloud
        .token_expiry()
        .await
        .map(|expiry| expiry.saturating_duration_since(Instant::now()).as_secs());

    Json(json!({
        "device_sn": state.inverter.device_sn(),
        "base_url": cloud.credentials().base_url,
        "app_id": cloud.credentials().app_id,
        "token_expires_in_secs": token_expires_in,
        "realtime": coordinator_diagnostics(&state.realtime),
        "tou": coordinator_diagnostics(&state.tou),
    }))
}

/// Authenticate, discover the account's inverters and bind the configured one,
/// or the only one found when none is configured.
async fn connect(settings: &Settings) -> Result<Inverter, api::Error> {
    let cloud = DeyeCloud::new(settings.credentials())?.with_token_lease(settings.token_lease());
    cloud.authenticate().await?;
    log::info!("Deye authentication successful");

    let choices = cloud.inverters().await?;

    match settings.device_sn() {
        Some(device_sn) => {
            if !choices.iter().any(|choice| choice.device_sn == device_sn) {
                log::warn!(
                    "Device {} is not among the inverters of this account",
                    device_sn
                );
            }
            cloud.bind(device_sn)
        }
        None => match choices.as_slice() {
            [only] => {
                log::info!("Using the only inverter found: {}", only.label);
                let device_sn = only.device_sn.clone();
                cloud.bind(device_sn)
            }
            [] => Err(api::Error::Precondition("No inverters found".to_string())),
            many => Err(api::Error::Precondition(format!(
                "Several inverters found, set DEYE_DEVICE_SN to one of: {}",
                many.iter()
                    .map(|choice| choice.label.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        },
    }
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = settings::read_settings()?;
    let inverter = connect(&settings).await?;
    let device_sn = inverter.device_sn().to_string();

    let state = StateData {
        inverter: inverter.clone(),
        realtime: Arc::new(Coordinator::new(
            format!("deye_realtime_{}", device_sn),
            settings.realtime_interval(),
        )),
        tou: Arc::new(Coordinator::new(
            format!("deye_tou_{}", device_sn),
            settings.tou_interval(),
        )),
    };

    if !(state.refresh_realtime().await && state.refresh_tou().await) {
        inverter.close();
        return Err(format!("Initial data refresh failed for device {}", device_sn).into());
    }

    let pollers = vec![
        state.realtime.spawn({
            let inverter = inverter.clone();
            move || {
                let inverter = inverter.clone();
                async move { inverter.get_realtime_data().await }
            }
        }),
        state.tou.spawn({
            let inverter = inverter.clone();
            move || {
                let inverter = inverter.clone();
                async move { inverter.get_time_of_use().await }
            }
        }),
    ];

    log::info!("Deye Cloud exporter set up with device {}", device_sn);

    let result = rocket::build()
        .manage(state)
        .mount(
            "/",
            routes![
                metrics_route,
                realtime_route,
                tou_route,
                tou_change_route,
                refresh_route,
                stations_route,
                diagnostics_route
            ],
        )
        .launch()
        .await;

    for poller in pollers {
        poller.abort();
    }
    inverter.close();

    result.map_err(|e| e.to_string())?;
    Ok(())
}
