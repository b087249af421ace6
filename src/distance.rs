use geo::Point;

/// Equatorial radius used for all distance calculations, in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Great-circle distance in meters between two points given as
/// (longitude, latitude) degrees.
pub fn haversine(a: Point, b: Point) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let dlat = (b.y() - a.y()).to_radians() / 2.0;
    let dlon = (b.x() - a.x()).to_radians() / 2.0;

    let h = dlat.sin().powi(2) + lat1.cos() * lat2.cos() * dlon.sin().powi(2);
    // rounding can push sqrt(h) just past 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS * c
}
