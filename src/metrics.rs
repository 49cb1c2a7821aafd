use deye_cloud_rs::model::{TelemetryRecord, TouSlot};
use deye_cloud_rs::tou::display_time;
use deye_cloud_rs::{Coordinator, Error};
use prometheus::{Encoder, GaugeVec, TextEncoder};
use std::sync::Mutex;

lazy_static! {
    static ref TELEMETRY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("deye_telemetry", "latest numeric telemetry reported by the inverter"),
        &["device_sn", "key", "unit"],
    )
    .unwrap();
    static ref TOU_SOC_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("deye_tou_soc", "battery SOC target of a time-of-use slot (%)"),
        &["device_sn", "slot", "time"],
    )
    .unwrap();
    static ref TOU_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("deye_tou_power", "power limit of a time-of-use slot"),
        &["device_sn", "slot", "time"],
    )
    .unwrap();
    static ref TOU_GRID_CHARGE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("deye_tou_grid_charge", "1 when grid charging is enabled for the slot"),
        &["device_sn", "slot", "time"],
    )
    .unwrap();
    static ref TOU_GENERATION_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("deye_tou_generation", "1 when generation is enabled for the slot"),
        &["device_sn", "slot", "time"],
    )
    .unwrap();
    static ref AVAILABLE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("deye_available", "1 when the last poll of the resource succeeded"),
        &["device_sn", "resource"],
    )
    .unwrap();
    /* Held from reset to encoding so a scrape never sees another one half done */
    static ref SCRAPE: Mutex<()> = Mutex::new(());
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Feed telemetry records of `device_sn` to Prometheus gauges. Text values are skipped.
fn process_telemetry(device_sn: &str, records: &[TelemetryRecord]) {
    for record in records {
        match record.value.as_f64() {
            Some(value) => TELEMETRY_GAUGE
                .with_label_values(&[device_sn, &record.key, record.unit.as_deref().unwrap_or("")])
                .set(value),
            None => log::trace!("Skipping non-numeric telemetry {}", record.key),
        }
    }
}

fn process_schedule(device_sn: &str, schedule: &[TouSlot]) {
    for (index, slot) in schedule.iter().enumerate() {
        let number = (index + 1).to_string();
        let time = display_time(&slot.time).unwrap_or_else(|| slot.time.clone());
        let labels = [device_sn, number.as_str(), time.as_str()];

        TOU_SOC_GAUGE.with_label_values(&labels).set(f64::from(slot.soc));
        TOU_GRID_CHARGE_GAUGE
            .with_label_values(&labels)
            .set(flag(slot.enable_grid_charge));
        TOU_GENERATION_GAUGE
            .with_label_values(&labels)
            .set(flag(slot.enable_generation));
        if let Some(power) = slot.power.as_f64() {
            TOU_POWER_GAUGE.with_label_values(&labels).set(power);
        }
    }
}

/// Rebuild all gauges from the coordinator caches. Unavailable resources
/// only report `deye_available 0`.
fn record(
    device_sn: &str,
    realtime: &Coordinator<Vec<TelemetryRecord>>,
    tou: &Coordinator<Vec<TouSlot>>,
) {
    TELEMETRY_GAUGE.reset();
    if let Some(records) = realtime.available_data() {
        process_telemetry(device_sn, &records);
    }

    for gauge in [
        &*TOU_SOC_GAUGE,
        &*TOU_POWER_GAUGE,
        &*TOU_GRID_CHARGE_GAUGE,
        &*TOU_GENERATION_GAUGE,
    ] {
        gauge.reset();
    }
    if let Some(schedule) = tou.available_data() {
        process_schedule(device_sn, &schedule);
    }

    AVAILABLE_GAUGE
        .with_label_values(&[device_sn, "realtime"])
        .set(flag(realtime.available()));
    AVAILABLE_GAUGE
        .with_label_values(&[device_sn, "tou"])
        .set(flag(tou.available()));
}

/// Rebuild the gauges and encode the registry in one step.
pub fn render(
    device_sn: &str,
    realtime: &Coordinator<Vec<TelemetryRecord>>,
    tou: &Coordinator<Vec<TouSlot>>,
) -> Result<String, Error> {
    let _scrape = SCRAPE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    record(device_sn, realtime, tou);
    read()
}

/// Read metrics from Prometheus exporter registry.
fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(Error::Format))?;
    String::from_utf8(buffer).or(Err(Error::Format))
}
