use geom::{Distance, LonLat};

/// One straight piece of a room or connection boundary, between two
/// consecutive boundary points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WallSection {
    pub start: LonLat,
    pub end: LonLat,
}

impl WallSection {
    pub fn new(start: LonLat, end: LonLat) -> WallSection {
        WallSection { start, end }
    }

    /// Drops a perpendicular from `pt` onto this section, returning the foot
    /// of the projection and its parameter t along the section (0 at `start`,
    /// 1 at `end`). The projection is computed directly in degree space; at
    /// building scale the distortion doesn't matter.
    ///
    /// A point already within `threshold` of an endpoint snaps to that
    /// endpoint. Returns None for zero-length sections and for projections
    /// falling outside the section.
    pub fn project(&self, pt: LonLat, threshold: Distance) -> Option<(LonLat, f64)> {
        if pt.gps_dist(self.start) < threshold {
            return Some((self.start, 0.0));
        }
        if pt.gps_dist(self.end) < threshold {
            return Some((self.end, 1.0));
        }

        let dlon = self.end.longitude - self.start.longitude;
        let dlat = self.end.latitude - self.start.latitude;
        let len_squared = dlon.powi(2) + dlat.powi(2);
        if len_squared == 0.0 {
            return None;
        }
        let t = ((pt.longitude - self.start.longitude) * dlon
            + (pt.latitude - self.start.latitude) * dlat)
            / len_squared;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }
        let foot = LonLat::new(
            self.start.longitude + t * dlon,
            self.start.latitude + t * dlat,
        );
        Some((foot, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold() -> Distance {
        Distance::centimeters(40)
    }

    #[test]
    fn test_project_beyond_end() {
        let wall = WallSection::new(LonLat::new(0.0, 0.0), LonLat::new(1.0, 0.0));
        // t would be 2; the foot lies past the end of the section.
        assert_eq!(wall.project(LonLat::new(2.0, 0.0), threshold()), None);
    }

    #[test]
    fn test_project_midpoint() {
        let wall = WallSection::new(LonLat::new(0.0, 0.0), LonLat::new(0.0, 1.0));
        let (foot, t) = wall
            .project(LonLat::new(0.5, 0.5), threshold())
            .unwrap();
        assert_eq!(foot, LonLat::new(0.0, 0.5));
        assert_eq!(t, 0.5);
    }

    #[test]
    fn test_project_real_coordinates() {
        // A wall and a doorway node from a real indoor-mapped building in
        // Dresden.
        let wall = WallSection::new(
            LonLat::new(13.7223363, 51.0255184),
            LonLat::new(13.7221857, 51.0255451),
        );
        let (foot, t) = wall
            .project(LonLat::new(13.7222899, 51.0255614), threshold())
            .unwrap();
        assert!((t - 0.35).abs() < 0.05, "t = {}", t);
        assert!((foot.longitude - 13.7222).abs() < 0.0001, "{}", foot);
        assert!((foot.latitude - 51.0255).abs() < 0.0001, "{}", foot);
    }

    #[test]
    fn test_project_snaps_to_endpoint() {
        // About 0.1m from the start of the wall.
        let wall = WallSection::new(
            LonLat::new(13.7223363, 51.0255184),
            LonLat::new(13.7221857, 51.0255451),
        );
        let (foot, t) = wall
            .project(LonLat::new(13.7223363, 51.0255193), threshold())
            .unwrap();
        assert_eq!(foot, wall.start);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_project_degenerate() {
        let wall = WallSection::new(LonLat::new(1.0, 1.0), LonLat::new(1.0, 1.0));
        assert_eq!(wall.project(LonLat::new(1.1, 1.0), threshold()), None);
    }
}
