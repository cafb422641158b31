use serde::Serialize;

use crate::error::TrackingError;
use crate::models::sample::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two points via the haversine formula.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Arithmetic mean of lat/lng. Fine at city scale, not geodesically exact;
/// do not use across the antimeridian.
pub fn midpoint(a: &GeoPoint, b: &GeoPoint) -> GeoPoint {
    GeoPoint {
        lat: (a.lat + b.lat) / 2.0,
        lng: (a.lng + b.lng) / 2.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lng: (self.min_lng + self.max_lng) / 2.0,
        }
    }
}

/// Axis-aligned bounds of a non-empty point set.
pub fn bounding_box(points: &[GeoPoint]) -> Result<BoundingBox, TrackingError> {
    let first = points.first().ok_or(TrackingError::EmptyPointSet)?;

    let mut bounds = BoundingBox {
        min_lat: first.lat,
        max_lat: first.lat,
        min_lng: first.lng,
        max_lng: first.lng,
    };

    for point in &points[1..] {
        bounds.min_lat = bounds.min_lat.min(point.lat);
        bounds.max_lat = bounds.max_lat.max(point.lat);
        bounds.min_lng = bounds.min_lng.min(point.lng);
        bounds.max_lng = bounds.max_lng.max(point.lng);
    }

    Ok(bounds)
}

/// Largest pairwise haversine distance in the set. Zero for fewer than two
/// points.
pub fn max_pairwise_km(points: &[GeoPoint]) -> f64 {
    let mut max_km: f64 = 0.0;
    for (index, a) in points.iter().enumerate() {
        for b in &points[index + 1..] {
            max_km = max_km.max(haversine_km(a, b));
        }
    }
    max_km
}

#[cfg(test)]
mod tests {
    use super::{bounding_box, haversine_km, max_pairwise_km, midpoint};
    use crate::error::TrackingError;
    use crate::models::sample::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: -29.6842,
            lng: -53.8069,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_symmetric_and_non_negative() {
        let pairs = [
            (
                GeoPoint {
                    lat: -29.68,
                    lng: -53.80,
                },
                GeoPoint {
                    lat: -29.69,
                    lng: -53.81,
                },
            ),
            (
                GeoPoint { lat: 0.0, lng: 0.0 },
                GeoPoint {
                    lat: 45.0,
                    lng: 90.0,
                },
            ),
            (
                GeoPoint {
                    lat: 89.0,
                    lng: 10.0,
                },
                GeoPoint {
                    lat: -89.0,
                    lng: -170.0,
                },
            ),
        ];

        for (a, b) in pairs {
            let forward = haversine_km(&a, &b);
            let backward = haversine_km(&b, &a);
            assert!(forward >= 0.0);
            assert!((forward - backward).abs() < 1e-9);
        }
    }

    #[test]
    fn midpoint_is_the_coordinate_mean() {
        let a = GeoPoint {
            lat: 10.0,
            lng: 20.0,
        };
        let b = GeoPoint {
            lat: 12.0,
            lng: 26.0,
        };
        let mid = midpoint(&a, &b);
        assert_eq!(mid.lat, 11.0);
        assert_eq!(mid.lng, 23.0);
    }

    #[test]
    fn bounding_box_spans_all_points() {
        let points = [
            GeoPoint {
                lat: -29.68,
                lng: -53.80,
            },
            GeoPoint {
                lat: -29.70,
                lng: -53.78,
            },
            GeoPoint {
                lat: -29.69,
                lng: -53.82,
            },
        ];

        let bounds = bounding_box(&points).unwrap();
        assert_eq!(bounds.min_lat, -29.70);
        assert_eq!(bounds.max_lat, -29.68);
        assert_eq!(bounds.min_lng, -53.82);
        assert_eq!(bounds.max_lng, -53.78);

        let center = bounds.center();
        assert!((center.lat - -29.69).abs() < 1e-9);
        assert!((center.lng - -53.80).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_of_nothing_fails() {
        let result = bounding_box(&[]);
        assert!(matches!(result, Err(TrackingError::EmptyPointSet)));
    }

    #[test]
    fn max_pairwise_picks_the_farthest_pair() {
        let near_a = GeoPoint {
            lat: -29.68,
            lng: -53.80,
        };
        let near_b = GeoPoint {
            lat: -29.685,
            lng: -53.805,
        };
        let far = GeoPoint {
            lat: -30.03,
            lng: -51.23,
        };

        let max_km = max_pairwise_km(&[near_a, near_b, far]);
        assert!((max_km - haversine_km(&near_a, &far)).abs() < 1e-9);
        assert_eq!(max_pairwise_km(&[near_a]), 0.0);
    }
}
