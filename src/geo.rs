use serde::{Deserialize, Serialize};

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns the same point with longitude normalized into [-180, 180].
    ///
    /// Exactly 180 is kept as is; everything else lands in [-180, 180).
    pub fn wrap(self) -> Self {
        Self {
            lat: self.lat,
            lng: wrap_num(self.lng, -180.0, 180.0),
        }
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

fn wrap_num(x: f64, min: f64, max: f64) -> f64 {
    if x == max {
        return x;
    }
    let d = max - min;
    ((x - min) % d + d) % d + min
}

/// Axis-aligned geographic rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(a: LatLng, b: LatLng) -> Self {
        Self {
            south_west: LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            north_east: LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        }
    }

    /// Smallest rectangle covering every point, or `None` when there are no points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self::new(first, first);
        for point in points {
            bounds.extend(point);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, point: LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    #[cfg(test)]
    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    /// Pulls a point onto the nearest edge when it lies outside.
    pub fn clamp(&self, point: LatLng) -> LatLng {
        LatLng::new(
            point.lat.clamp(self.south_west.lat, self.north_east.lat),
            point.lng.clamp(self.south_west.lng, self.north_east.lng),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_longitudes_in_range() {
        for lng in [-720.5, -540.0, -181.0, -180.0, -0.5, 0.0, 179.9, 180.0, 181.0, 359.0, 1000.25] {
            let wrapped = LatLng::new(10.0, lng).wrap();
            assert!(
                (-180.0..=180.0).contains(&wrapped.lng),
                "{lng} wrapped to {}",
                wrapped.lng
            );
            assert_eq!(wrapped.lat, 10.0);
        }
    }

    #[test]
    fn wrap_matches_known_values() {
        assert_eq!(LatLng::new(0.0, 190.0).wrap().lng, -170.0);
        assert_eq!(LatLng::new(0.0, -190.0).wrap().lng, 170.0);
        assert_eq!(LatLng::new(0.0, 180.0).wrap().lng, 180.0);
        assert_eq!(LatLng::new(0.0, 540.0).wrap().lng, -180.0);
        assert_eq!(LatLng::new(40.0, -100.0).wrap(), LatLng::new(40.0, -100.0));
    }

    #[test]
    fn bounds_cover_every_point() {
        let points = vec![
            LatLng::new(47.6, -122.3),
            LatLng::new(25.8, -80.2),
            LatLng::new(40.7, -74.0),
            LatLng::new(36.1, -115.1),
        ];
        let bounds = LatLngBounds::from_points(points.iter().copied()).unwrap();
        for p in &points {
            assert!(bounds.contains(*p));
        }
        assert_eq!(bounds.south_west, LatLng::new(25.8, -122.3));
        assert_eq!(bounds.north_east, LatLng::new(47.6, -74.0));
    }

    #[test]
    fn no_points_means_no_bounds() {
        assert!(LatLngBounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn single_point_bounds_are_degenerate() {
        let p = LatLng::new(1.0, 2.0);
        let bounds = LatLngBounds::from_points([p]).unwrap();
        assert_eq!(bounds.center(), p);
        assert!(bounds.contains(p));
    }

    #[test]
    fn clamp_pulls_outside_points_to_the_edge() {
        let bounds = LatLngBounds::new(LatLng::new(24.0, -125.0), LatLng::new(49.0, -67.0));
        assert_eq!(bounds.clamp(LatLng::new(60.0, 10.0)), LatLng::new(49.0, -67.0));
        let inside = LatLng::new(30.0, -100.0);
        assert_eq!(bounds.clamp(inside), inside);
    }
}
