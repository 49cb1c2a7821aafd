//! Time-of-use schedule helpers.
//!
//! The cloud encodes a slot's start as four digits (`"0630"`), while people
//! and select lists use `"06:30"`. Everything sent back to the cloud goes
//! through [`normalize_time`].

use crate::api::Error;
use crate::model::TouSlot;
use serde::{Deserialize, Serialize};

const SOC_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

fn is_wire_time(time: &str) -> bool {
    time.len() == 4 && time.bytes().all(|b| b.is_ascii_digit())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Convert `"HH:MM"` (or `"H:MM"`) to the wire form `"HHMM"`. Values already
/// in wire form are returned as is.
pub fn normalize_time(time: &str) -> String {
    if is_wire_time(time) {
        return time.to_string();
    }

    match time.split_once(':') {
        Some((hours, minutes))
            if is_digits(hours) && hours.len() <= 2 && is_digits(minutes) && minutes.len() == 2 =>
        {
            format!("{:0>2}{}", hours, minutes)
        }
        _ => time.replace(':', ""),
    }
}

/// `"0630"` -> `"06:30"`; `None` for anything that is not four digits.
pub fn display_time(raw: &str) -> Option<String> {
    if is_wire_time(raw) {
        Some(format!("{}:{}", &raw[..2], &raw[2..]))
    } else {
        None
    }
}

/// Parse either time form into `(hour, minute)`.
pub fn parse_time(time: &str) -> Result<(u8, u8), Error> {
    let wire = normalize_time(time);
    let invalid = || Error::validation("time", format!("`{}` is not a valid HH:MM time", time));

    if !is_wire_time(&wire) {
        return Err(invalid());
    }
    let hour: u8 = wire[..2].parse().map_err(|_| invalid())?;
    let minute: u8 = wire[2..].parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Half-hour start times offered for a slot, `"00:00"` to `"23:30"`.
pub fn time_options() -> Vec<String> {
    (0..24)
        .flat_map(|h| [0, 30].into_iter().map(move |m| format!("{:02}:{:02}", h, m)))
        .collect()
}

/// A change to exactly one field of one slot.
///
/// Serialized as a single-key object, e.g. `{"soc": 80}` or
/// `{"enableGridCharge": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TouChange {
    Time(String),
    Soc(u8),
    EnableGridCharge(bool),
    EnableGeneration(bool),
}

impl TouChange {
    pub fn apply(&self, slot: &mut TouSlot) -> Result<(), Error> {
        match self {
            TouChange::Time(time) => {
                let (hour, minute) = parse_time(time)?;
                slot.time = format!("{:02}{:02}", hour, minute);
            }
            TouChange::Soc(soc) => {
                if !SOC_RANGE.contains(soc) {
                    return Err(Error::validation(
                        "soc",
                        format!("{} is outside {}..={}", soc, SOC_RANGE.start(), SOC_RANGE.end()),
                    ));
                }
                slot.soc = *soc;
            }
            TouChange::EnableGridCharge(on) => slot.enable_grid_charge = *on,
            TouChange::EnableGeneration(on) => slot.enable_generation = *on,
        }
        Ok(())
    }
}

/// Apply `change` to slot `index` of `schedule`, leaving every other field alone.
pub fn apply_change(
    schedule: &mut [TouSlot],
    index: usize,
    change: &TouChange,
) -> Result<(), Error> {
    let len = schedule.len();
    let slot = schedule.get_mut(index).ok_or_else(|| {
        Error::validation("slot", format!("index {} out of range ({} slots)", index, len))
    })?;
    change.apply(slot)
}

/// Copy of `schedule` with every slot's time in wire form.
pub fn normalize_schedule(schedule: &[TouSlot]) -> Vec<TouSlot> {
    schedule
        .iter()
        .cloned()
        .map(|mut slot| {
            slot.time = normalize_time(&slot.time);
            slot
        })
        .collect()
}
