//! Periodic poll cache for one resource of one inverter.
//!
//! Readers get the last successfully fetched value and an availability flag.
//! A failed poll never reaches the reader as an error: it is logged and the
//! resource is marked unavailable until the next successful poll.

use crate::api::Error;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Snapshot<T> {
    data: Option<T>,
    last_update_success: bool,
    /// Timestamp of last successful refresh
    last_refresh: Option<Instant>,
}

#[derive(Debug)]
pub struct Coordinator<T> {
    name: String,
    interval: Duration,
    state: RwLock<Snapshot<T>>,
}

impl<T: Clone + Send + Sync + 'static> Coordinator<T> {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Coordinator {
            name: name.into(),
            interval,
            state: RwLock::new(Snapshot {
                data: None,
                last_update_success: false,
                last_refresh: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Last successfully fetched value, possibly stale when unavailable.
    pub fn data(&self) -> Option<T> {
        self.state.read().ok().and_then(|s| s.data.clone())
    }

    /// Whether the most recent poll succeeded.
    pub fn available(&self) -> bool {
        self.state
            .read()
            .map(|s| s.last_update_success)
            .unwrap_or(false)
    }

    /// Value to show, `None` while the resource is unavailable.
    pub fn available_data(&self) -> Option<T> {
        if self.available() {
            self.data()
        } else {
            None
        }
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.state.read().ok().and_then(|s| s.last_refresh)
    }

    /// Checks whether `interval` elapsed since the last successful refresh
    pub fn interval_elapsed(&self) -> bool {
        match self.last_refresh() {
            Some(at) => at.elapsed() >= self.interval,
            /* No successful refresh yet, always due */
            None => true,
        }
    }

    /// Run one poll. Returns whether it succeeded.
    pub async fn refresh<F, Fut>(&self, fetch: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.try_refresh(fetch).await.is_ok()
    }

    /// Run one poll and return its outcome to the caller as well.
    pub async fn try_refresh<F, Fut>(&self, fetch: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let result = fetch().await;

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match result {
            Ok(data) => {
                log::debug!("{}: refresh succeeded", self.name);
                state.data = Some(data.clone());
                state.last_update_success = true;
                state.last_refresh = Some(Instant::now());
                Ok(data)
            }
            Err(e) => {
                log::error!("{}: failed to fetch data: {}", self.name, e);
                state.last_update_success = false;
                Err(e)
            }
        }
    }

    /// Poll with `fetch` every `interval`. The first poll runs immediately
    /// unless a refresh already succeeded.
    pub fn spawn<F, Fut>(self: &Arc<Self>, fetch: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send,
    {
        let coordinator = Arc::clone(self);
        let first = match coordinator.last_refresh() {
            Some(_) => coordinator.interval,
            None => Duration::ZERO,
        };
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + first;
            let mut ticker = tokio::time::interval_at(start, coordinator.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                coordinator.refresh(&fetch).await;
            }
        })
    }
}
