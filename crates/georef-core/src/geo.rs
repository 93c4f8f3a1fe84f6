//! Spherical-earth helpers shared by the transform engine and fix lookup.
//!
//! All angles are degrees at the API surface, distances are nautical miles
//! (one minute of arc). The arctangent form of the great-circle formula is
//! used so near-zero and near-antipodal separations stay numerically sane.

/// Great-circle angular distance between two points, in radians.
pub fn great_circle_rad(src_lat: f64, src_lon: f64, dst_lat: f64, dst_lon: f64) -> f64 {
    let s_lat = src_lat.to_radians();
    let s_lon = src_lon.to_radians();
    let f_lat = dst_lat.to_radians();
    let f_lon = dst_lon.to_radians();
    let d_lon = f_lon - s_lon;
    let t1 = (f_lat.cos() * d_lon.sin()).powi(2);
    let t2 = (s_lat.cos() * f_lat.sin() - s_lat.sin() * f_lat.cos() * d_lon.cos()).powi(2);
    let t3 = s_lat.sin() * f_lat.sin();
    let t4 = s_lat.cos() * f_lat.cos() * d_lon.cos();
    (t1 + t2).sqrt().atan2(t3 + t4)
}

/// Great-circle distance in nautical miles.
pub fn great_circle_nm(src_lat: f64, src_lon: f64, dst_lat: f64, dst_lon: f64) -> f64 {
    great_circle_rad(src_lat, src_lon, dst_lat, dst_lon).to_degrees() * 60.0
}

/// Initial true course from the source point toward the destination, degrees.
pub fn true_course_deg(src_lat: f64, src_lon: f64, dst_lat: f64, dst_lon: f64) -> f64 {
    let s_lat = src_lat.to_radians();
    let f_lat = dst_lat.to_radians();
    let d_lon = (dst_lon - src_lon).to_radians();
    let t1 = s_lat.cos() * f_lat.tan();
    let t2 = s_lat.sin() * d_lon.cos();
    d_lon.sin().atan2(t1 - t2).to_degrees()
}

/// Destination point given a start, a true heading in degrees and a distance
/// in nautical miles. Used to project radial/DME-offset fixes.
pub fn radial_offset(lat_deg: f64, lon_deg: f64, hdg_deg: f64, dist_nm: f64) -> (f64, f64) {
    let dist_rad = (dist_nm / 60.0).to_radians();
    let lat_rad = lat_deg.to_radians();
    let hdg_rad = hdg_deg.to_radians();

    let new_lat_rad = (lat_rad.sin() * dist_rad.cos()
        + lat_rad.cos() * dist_rad.sin() * hdg_rad.cos())
    .asin();
    let lon_rad = (hdg_rad.sin() * dist_rad.sin() * lat_rad.cos())
        .atan2(dist_rad.cos() - lat_rad.sin() * new_lat_rad.sin());

    (new_lat_rad.to_degrees(), lon_rad.to_degrees() + lon_deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    // KBOS and KLAX reference points
    const BOS: (f64, f64) = (42.3629722, -71.0064167);
    const LAX: (f64, f64) = (33.9424964, -118.4080486);

    #[test]
    fn test_great_circle_distance() {
        let nm = great_circle_nm(BOS.0, BOS.1, LAX.0, LAX.1);
        // published great-circle distance is about 2265 nm
        assert!((nm - 2265.0).abs() < 10.0, "got {} nm", nm);
    }

    #[test]
    fn test_zero_distance() {
        assert_eq!(great_circle_rad(BOS.0, BOS.1, BOS.0, BOS.1), 0.0);
    }

    #[test]
    fn test_true_course_westbound() {
        let tc = true_course_deg(BOS.0, BOS.1, LAX.0, LAX.1);
        // heading out of Boston toward LA is a shade south of due west
        assert!(tc < -80.0 && tc > -95.0, "got {} deg", tc);
    }

    #[test]
    fn test_radial_offset_due_north() {
        let (lat, lon) = radial_offset(42.0, -71.0, 0.0, 60.0);
        assert!((lat - 43.0).abs() < 0.01);
        assert!((lon - -71.0).abs() < 0.01);
    }

    #[test]
    fn test_radial_offset_roundtrip() {
        let (lat, lon) = radial_offset(42.0, -71.0, 135.0, 10.0);
        let back = great_circle_nm(42.0, -71.0, lat, lon);
        assert!((back - 10.0).abs() < 0.001, "got {} nm", back);
        let tc = true_course_deg(42.0, -71.0, lat, lon);
        assert!((tc - 135.0).abs() < 0.1, "got {} deg", tc);
    }
}
