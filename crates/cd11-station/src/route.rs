use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::ReceiverConfig;
use crate::error::{Result, StationError};

/// Where one station should send its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationRoute {
    pub station_name: String,
    pub acquired: bool,
    pub data_address: Ipv4Addr,
    /// `None` only for stations that are not acquired.
    pub data_port: Option<u16>,
}

type Routes = Arc<HashMap<String, StationRoute>>;

/// Station name to data endpoint lookup shared by all broker handshakes.
///
/// Lookups clone the current `Arc` snapshot, so a concurrent [`reload`](Self::reload)
/// is never observed half-applied.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Routes>,
}

impl RouteTable {
    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self {
            routes: RwLock::new(Arc::new(build_routes(config))),
        }
    }

    /// Resolve an acquired station's route.
    pub fn lookup(&self, station_name: &str) -> Result<StationRoute> {
        let routes = self.snapshot();
        match routes.get(station_name) {
            None => Err(StationError::UnknownStation(station_name.to_string())),
            Some(route) if !route.acquired => {
                Err(StationError::IgnoredStation(station_name.to_string()))
            }
            Some(route) => Ok(route.clone()),
        }
    }

    /// Replace every route at once.
    pub fn reload(&self, config: &ReceiverConfig) {
        let next = Arc::new(build_routes(config));
        *self.routes.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn snapshot(&self) -> Routes {
        Arc::clone(&self.routes.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

fn build_routes(config: &ReceiverConfig) -> HashMap<String, StationRoute> {
    config
        .stations
        .iter()
        .map(|station| {
            let route = StationRoute {
                station_name: station.station_name.clone(),
                acquired: station.acquired,
                data_address: config.broker.data_consumer_address,
                data_port: config.data_port(station),
            };
            (station.station_name.clone(), route)
        })
        .collect()
}
