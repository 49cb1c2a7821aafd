//! Client for the Deye cloud inverter API: token handling, realtime telemetry,
//! station discovery and read-modify-write of the time-of-use schedule.

pub mod api;
pub mod coordinator;
pub mod model;
pub mod settings;
pub mod tou;

pub use api::{DeyeCloud, Error, Inverter};
pub use coordinator::Coordinator;
