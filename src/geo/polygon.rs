//! Planar polygon primitives for zone membership and shape.
//!
//! Coordinates are treated as a flat plane with `lng` as x and `lat` as y.
//! Area uses a per-vertex cos(latitude) correction, which only holds for
//! zones small enough that the flat-earth approximation is acceptable; large
//! zones spanning many degrees of latitude will be off. None of these
//! functions are used for distances, see [`crate::geo::haversine_km`].

use crate::error::AppError;
use crate::models::driver::GeoPoint;

const KM_PER_DEGREE_LAT: f64 = 110.574;
const KM_PER_DEGREE_LNG: f64 = 111.320;
const EPSILON: f64 = 1e-12;

/// Ray-casting membership test. Points on an edge or vertex count as inside.
pub fn is_in_zone(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    if on_boundary(point, polygon) {
        return true;
    }

    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].lng, polygon[i].lat);
        let (xj, yj) = (polygon[j].lng, polygon[j].lat);

        // yi != yj inside this branch, so the division below is safe.
        if (yi > y) != (yj > y) {
            let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn on_boundary(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    edges(polygon).any(|(a, b)| on_segment(point, a, b))
}

fn on_segment(p: &GeoPoint, a: &GeoPoint, b: &GeoPoint) -> bool {
    let cross = (b.lng - a.lng) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lng - a.lng);
    if cross.abs() > EPSILON {
        return false;
    }

    p.lng >= a.lng.min(b.lng) - EPSILON
        && p.lng <= a.lng.max(b.lng) + EPSILON
        && p.lat >= a.lat.min(b.lat) - EPSILON
        && p.lat <= a.lat.max(b.lat) + EPSILON
}

fn edges(polygon: &[GeoPoint]) -> impl Iterator<Item = (&GeoPoint, &GeoPoint)> + '_ {
    polygon
        .iter()
        .zip(polygon.iter().cycle().skip(1))
        .take(polygon.len())
}

/// Unweighted vertex average.
pub fn centroid(polygon: &[GeoPoint]) -> GeoPoint {
    if polygon.is_empty() {
        return GeoPoint::new(0.0, 0.0);
    }

    let n = polygon.len() as f64;
    let (lat_sum, lng_sum) = polygon
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));

    GeoPoint::new(lat_sum / n, lng_sum / n)
}

/// Shoelace area in km² with longitudes scaled by cos(latitude) per vertex.
pub fn area_km2(polygon: &[GeoPoint]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }

    let projected: Vec<(f64, f64)> = polygon
        .iter()
        .map(|p| {
            (
                p.lng * KM_PER_DEGREE_LNG * p.lat.to_radians().cos(),
                p.lat * KM_PER_DEGREE_LAT,
            )
        })
        .collect();

    let twice_area: f64 = (0..projected.len())
        .map(|i| {
            let (x1, y1) = projected[i];
            let (x2, y2) = projected[(i + 1) % projected.len()];
            x1 * y2 - x2 * y1
        })
        .sum();

    twice_area.abs() / 2.0
}

/// Checks a zone ring and returns it in canonical form (an explicit closing
/// vertex equal to the first one is dropped).
pub fn normalize_polygon(polygon: &[GeoPoint]) -> Result<Vec<GeoPoint>, AppError> {
    let mut ring = polygon.to_vec();
    if ring.len() > 3 && ring.first() == ring.last() {
        ring.pop();
    }

    if ring.len() < 3 {
        return Err(AppError::Validation(
            "polygon needs at least 3 distinct vertices".to_string(),
        ));
    }

    if let Some(bad) = ring.iter().position(|p| !p.is_valid()) {
        return Err(AppError::Validation(format!(
            "vertex {bad} has invalid coordinates"
        )));
    }

    for (i, (a, b)) in edges(&ring).enumerate() {
        if a == b {
            return Err(AppError::Validation(format!(
                "edge {i} has zero length"
            )));
        }
    }

    if let Some((i, j)) = first_self_intersection(&ring) {
        return Err(AppError::Validation(format!(
            "polygon edges {i} and {j} intersect"
        )));
    }

    if area_km2(&ring) <= 0.0 {
        return Err(AppError::Validation("polygon has no area".to_string()));
    }

    Ok(ring)
}

fn first_self_intersection(ring: &[GeoPoint]) -> Option<(usize, usize)> {
    let n = ring.len();
    let segments: Vec<(&GeoPoint, &GeoPoint)> = edges(ring).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            let (a1, a2) = segments[i];
            let (b1, b2) = segments[j];
            if segments_intersect(a1, a2, b1, b2) {
                return Some((i, j));
            }
        }
    }

    None
}

fn orientation(a: &GeoPoint, b: &GeoPoint, c: &GeoPoint) -> f64 {
    (b.lng - a.lng) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lng - a.lng)
}

fn segments_intersect(a1: &GeoPoint, a2: &GeoPoint, b1: &GeoPoint, b2: &GeoPoint) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
    {
        return true;
    }

    on_segment(a1, b1, b2) || on_segment(a2, b1, b2) || on_segment(b1, a1, a2) || on_segment(b2, a1, a2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> Vec<GeoPoint> {
        points.iter().map(|&(lat, lng)| GeoPoint::new(lat, lng)).collect()
    }

    fn unit_square() -> Vec<GeoPoint> {
        ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)])
    }

    fn concave_l() -> Vec<GeoPoint> {
        ring(&[
            (0.0, 0.0),
            (0.0, 2.0),
            (1.0, 2.0),
            (1.0, 1.0),
            (2.0, 1.0),
            (2.0, 0.0),
        ])
    }

    #[test]
    fn unit_square_membership() {
        let square = unit_square();
        assert!(is_in_zone(&GeoPoint::new(0.5, 0.5), &square));
        assert!(!is_in_zone(&GeoPoint::new(2.0, 2.0), &square));
    }

    #[test]
    fn boundary_points_count_as_inside() {
        let square = unit_square();
        assert!(is_in_zone(&GeoPoint::new(0.0, 0.5), &square));
        assert!(is_in_zone(&GeoPoint::new(1.0, 1.0), &square));
        assert!(is_in_zone(&GeoPoint::new(0.5, 1.0), &square));
    }

    #[test]
    fn centroid_inside_and_far_point_outside() {
        for polygon in [unit_square(), concave_l(), ring(&[(0.0, 0.0), (3.0, 1.0), (0.0, 2.0)])] {
            assert!(is_in_zone(&centroid(&polygon), &polygon));
            assert!(!is_in_zone(&GeoPoint::new(50.0, 50.0), &polygon));
        }
    }

    #[test]
    fn concave_notch_is_outside() {
        assert!(!is_in_zone(&GeoPoint::new(1.5, 1.5), &concave_l()));
        assert!(is_in_zone(&GeoPoint::new(0.5, 1.5), &concave_l()));
    }

    #[test]
    fn membership_is_translation_invariant() {
        let samples = [(0.5, 0.5), (1.5, 1.5), (0.25, 1.75), (3.0, -1.0), (1.0, 0.5)];
        let offsets = [(10.0, 20.0), (-30.0, 45.0), (12.5, -7.25)];

        for &(dlat, dlng) in &offsets {
            let shifted: Vec<GeoPoint> = concave_l()
                .iter()
                .map(|p| GeoPoint::new(p.lat + dlat, p.lng + dlng))
                .collect();

            for &(lat, lng) in &samples {
                let original = is_in_zone(&GeoPoint::new(lat, lng), &concave_l());
                let moved = is_in_zone(&GeoPoint::new(lat + dlat, lng + dlng), &shifted);
                assert_eq!(original, moved, "point ({lat}, {lng}) offset ({dlat}, {dlng})");
            }
        }
    }

    #[test]
    fn horizontal_and_vertical_edges_do_not_break_ray_cast() {
        let square = unit_square();
        // Ray passes exactly through the horizontal top/bottom edge heights.
        assert!(!is_in_zone(&GeoPoint::new(1.0, 2.0), &square));
        assert!(!is_in_zone(&GeoPoint::new(0.0, -1.0), &square));
    }

    #[test]
    fn small_square_area_near_equator() {
        let square = ring(&[(0.0, 0.0), (0.0, 0.01), (0.01, 0.01), (0.01, 0.0)]);
        let area = area_km2(&square);
        assert!((area - 1.231).abs() < 0.01, "area was {area}");
    }

    #[test]
    fn normalize_drops_closing_vertex() {
        let mut closed = unit_square();
        closed.push(closed[0]);
        let normalized = normalize_polygon(&closed).unwrap();
        assert_eq!(normalized.len(), 4);
    }

    #[test]
    fn normalize_rejects_bad_rings() {
        assert!(normalize_polygon(&ring(&[(0.0, 0.0), (1.0, 1.0)])).is_err());
        assert!(normalize_polygon(&ring(&[(0.0, 0.0), (0.0, 1.0), (95.0, 1.0)])).is_err());
        // Bow-tie.
        let bow_tie = ring(&[(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0)]);
        assert!(normalize_polygon(&bow_tie).is_err());
        // Collinear.
        let flat = ring(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        assert!(normalize_polygon(&flat).is_err());
    }
}
