//! OSRM HTTP adapter for day routes.
//!
//! Plain requests go to the `route` service, which keeps the stop order.
//! Requests asking for an optimized order go to the `trip` service anchored at
//! the first and last coordinate.

use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::geo::Coordinate;
use crate::polyline::Polyline;
use crate::traits::{ProviderRoute, RouteLeg, RouteRequest, RoutingProvider};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
    pub max_waypoints: usize,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
            max_waypoints: crate::batch::DEFAULT_WAYPOINT_CEILING,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OsrmConfig {
        &self.config
    }

    fn url(&self, request: &RouteRequest) -> String {
        let coords = std::iter::once(&request.origin)
            .chain(request.waypoints.iter())
            .chain(std::iter::once(&request.destination))
            .map(|point| coordinate_param(*point))
            .collect::<Vec<_>>()
            .join(";");

        if request.optimize_order {
            format!(
                "{}/trip/v1/{}/{}?source=first&destination=last&roundtrip=false&overview=full&geometries=geojson",
                self.config.base_url, self.config.profile, coords
            )
        } else {
            format!(
                "{}/route/v1/{}/{}?overview=full&geometries=geojson",
                self.config.base_url, self.config.profile, coords
            )
        }
    }
}

impl RoutingProvider for OsrmClient {
    fn max_waypoints(&self) -> usize {
        self.config.max_waypoints
    }

    fn route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError> {
        if request.waypoints.len() > self.config.max_waypoints {
            return Err(ProviderError::TooManyWaypoints {
                count: request.waypoints.len(),
                max: self.config.max_waypoints,
            });
        }

        let url = self.url(request);
        debug!(%url, waypoints = request.waypoints.len(), "requesting OSRM route");

        // Failures come back as JSON with a non-"Ok" code, usually on a 4xx.
        let body: OsrmResponse = self.client.get(url).send()?.json()?;
        parse_response(body, request.optimize_order, request.waypoints.len())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    #[serde(default)]
    trips: Vec<OsrmRoute>,
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    legs: Vec<OsrmLeg>,
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    #[serde(default)]
    waypoint_index: Option<usize>,
}

fn parse_response(
    body: OsrmResponse,
    trip: bool,
    waypoint_count: usize,
) -> Result<ProviderRoute, ProviderError> {
    if body.code != "Ok" {
        return Err(ProviderError::Rejected {
            message: body.message.unwrap_or_default(),
            code: body.code,
        });
    }

    let routes = if trip { body.trips } else { body.routes };
    let route = routes.into_iter().next().ok_or(ProviderError::NoRoute)?;

    let waypoint_order = if trip {
        // `waypoints` is in input order; `waypoint_index` is each input's
        // position along the trip. Origin and destination stay pinned.
        let mut intermediate: Vec<(usize, usize)> = body
            .waypoints
            .iter()
            .enumerate()
            .skip(1)
            .take(waypoint_count)
            .map(|(input, waypoint)| (waypoint.waypoint_index.unwrap_or(input), input - 1))
            .collect();
        intermediate.sort_unstable();
        Some(intermediate.into_iter().map(|(_, input)| input).collect())
    } else {
        None
    };

    Ok(ProviderRoute {
        legs: route
            .legs
            .iter()
            .map(|leg| RouteLeg {
                distance_km: leg.distance / 1000.0,
                duration_secs: leg.duration,
            })
            .collect(),
        waypoint_order,
        geometry: route
            .geometry
            .map(|geometry| Polyline::from_lng_lat(&geometry.coordinates)),
        estimated: false,
    })
}

/// Format a coordinate the way OSRM URLs expect it (`lng,lat`).
pub fn coordinate_param(point: Coordinate) -> String {
    format!("{:.6},{:.6}", point.lng, point.lat)
}
