use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Distance;

/// Represents a (longitude, latitude) point, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct LonLat {
    pub longitude: f64,
    pub latitude: f64,
}

impl LonLat {
    /// Note the order of arguments!
    pub fn new(lon: f64, lat: f64) -> LonLat {
        LonLat {
            longitude: lon,
            latitude: lat,
        }
    }

    /// Returns the Haversine distance to another point.
    pub fn gps_dist(self, other: LonLat) -> Distance {
        let earth_radius_m = 6_371_000.0;
        let lon1 = self.longitude.to_radians();
        let lon2 = other.longitude.to_radians();
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();

        let delta_lat = lat2 - lat1;
        let delta_lon = lon2 - lon1;

        let a = (delta_lat / 2.0).sin().powi(2)
            + (delta_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Distance::meters(earth_radius_m * c)
    }

    /// Finds the average of a set of coordinates.
    pub fn center(pts: &[LonLat]) -> LonLat {
        if pts.is_empty() {
            panic!("Can't find center of 0 points");
        }
        let mut lon = 0.0;
        let mut lat = 0.0;
        for pt in pts {
            lon += pt.longitude;
            lat += pt.latitude;
        }
        let len = pts.len() as f64;
        LonLat {
            longitude: lon / len,
            latitude: lat / len,
        }
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LonLat({0}, {1})", self.longitude, self.latitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dist_same_point() {
        let pt1 = LonLat::new(10.2356, 10.020134);
        let pt2 = LonLat::new(10.2356, 10.020134);
        assert_eq!(pt1.gps_dist(pt2), Distance::ZERO);
        assert_eq!(pt2.gps_dist(pt1), Distance::ZERO);
    }

    #[test]
    fn test_dist_one_degree_latitude() {
        // One degree of latitude is about 111.19 km on a sphere of radius
        // 6371 km, regardless of longitude.
        let pt1 = LonLat::new(13.7, 51.0);
        let pt2 = LonLat::new(13.7, 52.0);
        let dist = pt1.gps_dist(pt2);
        assert!((dist.inner_meters() - 111_194.9).abs() < 1.0, "{}", dist);
    }

    #[test]
    fn test_dist_symmetric() {
        let pt1 = LonLat::new(10.0, 10.0);
        let pt2 = LonLat::new(0.0, 0.0);
        assert_eq!(pt1.gps_dist(pt2), pt2.gps_dist(pt1));
        // Reference value from an independent implementation of the same
        // formula.
        assert!((pt1.gps_dist(pt2).inner_meters() - 1_568_520.56).abs() < 1.0);
    }

    #[test]
    fn test_center() {
        let center = LonLat::center(&[LonLat::new(0.0, 0.0), LonLat::new(2.0, 4.0)]);
        assert_eq!(center, LonLat::new(1.0, 2.0));
    }
}
