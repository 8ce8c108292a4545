//! Straight-line routing estimator (fallback when no road network service is
//! reachable).
//!
//! Legs are great-circle hops driven at an assumed average speed. Less
//! accurate than OSRM (ignores roads) but always available.

use crate::error::ProviderError;
use crate::geo::{self, Coordinate};
use crate::polyline::Polyline;
use crate::traits::{ProviderRoute, RouteLeg, RouteRequest, RoutingProvider};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone)]
pub struct HaversineEstimator {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
    /// Stops per request. Straight lines have no real limit; this mirrors the
    /// road provider so batching behaves the same against either.
    pub max_waypoints: usize,
}

impl Default for HaversineEstimator {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            max_waypoints: crate::batch::DEFAULT_WAYPOINT_CEILING,
        }
    }
}

impl HaversineEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self {
            speed_kmh,
            ..Default::default()
        }
    }

    fn leg(&self, from: Coordinate, to: Coordinate) -> RouteLeg {
        let distance_km = geo::distance_km(from, to);
        RouteLeg {
            distance_km,
            duration_secs: (distance_km / self.speed_kmh * 3600.0).round(),
        }
    }
}

impl RoutingProvider for HaversineEstimator {
    fn max_waypoints(&self) -> usize {
        self.max_waypoints
    }

    /// Visits the waypoints in request order; `optimize_order` is ignored.
    fn route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError> {
        if request.waypoints.len() > self.max_waypoints {
            return Err(ProviderError::TooManyWaypoints {
                count: request.waypoints.len(),
                max: self.max_waypoints,
            });
        }

        let mut points = Vec::with_capacity(request.waypoints.len() + 2);
        points.push(request.origin);
        points.extend_from_slice(&request.waypoints);
        points.push(request.destination);

        let legs = points.windows(2).map(|pair| self.leg(pair[0], pair[1])).collect();

        Ok(ProviderRoute {
            legs,
            waypoint_order: None,
            geometry: Some(Polyline::new(points)),
            estimated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(waypoints: Vec<Coordinate>) -> RouteRequest {
        let depot = Coordinate::new(32.7254465, 35.4669505);
        RouteRequest {
            origin: depot,
            waypoints,
            destination: depot,
            optimize_order: false,
        }
    }

    #[test]
    fn test_one_leg_per_hop() {
        let provider = HaversineEstimator::default();
        let route = provider
            .route(&request(vec![Coordinate::new(32.6, 35.3), Coordinate::new(32.5, 35.2)]))
            .unwrap();
        assert_eq!(route.legs.len(), 3);
        assert!(route.estimated);
        assert!(route.waypoint_order.is_none());
        assert_eq!(route.geometry.unwrap().points().len(), 4);
    }

    #[test]
    fn test_duration_follows_speed() {
        let provider = HaversineEstimator::new(60.0);
        let route = provider.route(&request(vec![Coordinate::new(33.7254465, 35.4669505)])).unwrap();
        // ~111 km out at 60 km/h is ~6672 seconds.
        let out = route.legs[0];
        assert!((out.duration_secs - out.distance_km / 60.0 * 3600.0).abs() <= 0.5);
        assert!((route.total_distance_km() - 2.0 * out.distance_km).abs() < 1e-9);
    }

    #[test]
    fn test_no_waypoints_is_depot_round_trip() {
        let route = HaversineEstimator::default().route(&request(Vec::new())).unwrap();
        assert_eq!(route.legs.len(), 1);
        assert_eq!(route.total_distance_km(), 0.0);
    }

    #[test]
    fn test_too_many_waypoints() {
        let provider = HaversineEstimator::default();
        let stops = vec![Coordinate::new(32.6, 35.3); 24];
        assert!(matches!(
            provider.route(&request(stops)),
            Err(ProviderError::TooManyWaypoints { count: 24, max: 23 })
        ));
    }
}
