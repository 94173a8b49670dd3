// Maidenhead locator conversion.
//
// Fields are 20°x10°, squares 2°x1°, subsquares 5'x2.5'.  Six characters
// (`JO41du`) are what the radio side expects; four-character grids are
// accepted on decode and resolve to the square center.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid maidenhead locator: {0}")]
pub struct GridError(pub String);

/// Encode a coordinate as a six-character locator.
pub fn latlon_to_grid(lat: f64, lon: f64) -> String {
    let lon = (lon + 180.0).clamp(0.0, 359.999_999);
    let lat = (lat + 90.0).clamp(0.0, 179.999_999);

    let field_lon = (lon / 20.0) as u32;
    let field_lat = (lat / 10.0) as u32;
    let square_lon = ((lon % 20.0) / 2.0) as u32;
    let square_lat = (lat % 10.0) as u32;
    let sub_lon = ((lon % 2.0) * 12.0) as u32;
    let sub_lat = ((lat % 1.0) * 24.0) as u32;

    let mut grid = String::with_capacity(6);
    grid.push((b'A' + field_lon as u8) as char);
    grid.push((b'A' + field_lat as u8) as char);
    grid.push((b'0' + square_lon as u8) as char);
    grid.push((b'0' + square_lat as u8) as char);
    grid.push((b'a' + sub_lon as u8) as char);
    grid.push((b'a' + sub_lat as u8) as char);
    grid
}

/// Decode a four- or six-character locator to the center of its cell.
pub fn grid_to_latlon(grid: &str) -> Result<(f64, f64), GridError> {
    let err = || GridError(grid.to_owned());
    let g = grid.to_ascii_uppercase();
    let b = g.as_bytes();
    if b.len() != 4 && b.len() != 6 {
        return Err(err());
    }
    if !(b[0].is_ascii_uppercase() && b[1].is_ascii_uppercase() && b[0] <= b'R' && b[1] <= b'R') {
        return Err(err());
    }
    if !(b[2].is_ascii_digit() && b[3].is_ascii_digit()) {
        return Err(err());
    }

    let mut lon = (b[0] - b'A') as f64 * 20.0 + (b[2] - b'0') as f64 * 2.0;
    let mut lat = (b[1] - b'A') as f64 * 10.0 + (b[3] - b'0') as f64;

    if b.len() == 6 {
        if !(b[4].is_ascii_uppercase() && b[5].is_ascii_uppercase() && b[4] <= b'X' && b[5] <= b'X')
        {
            return Err(err());
        }
        lon += (b[4] - b'A') as f64 * (2.0 / 24.0) + 1.0 / 24.0;
        lat += (b[5] - b'A') as f64 * (1.0 / 24.0) + 0.5 / 24.0;
    } else {
        lon += 1.0;
        lat += 0.5;
    }
    Ok((lat - 90.0, lon - 180.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_locators() {
        // Holzminden, DE
        assert_eq!(latlon_to_grid(51.83, 9.45), "JO41rt");
        // Mountain View, US
        assert_eq!(latlon_to_grid(37.42, -122.08), "CM87xk");
    }

    #[test]
    fn four_char_grid_decodes_to_square_center() {
        let (lat, lon) = grid_to_latlon("JO41").unwrap();
        assert!((lat - 51.5).abs() < 1e-9);
        assert!((lon - 9.0).abs() < 1e-9);
    }

    #[test]
    fn six_char_roundtrip_is_within_subsquare() {
        for &(lat, lon) in &[(51.83, 9.45), (37.42, -122.08), (-34.9, 138.6)] {
            let grid = latlon_to_grid(lat, lon);
            let (dlat, dlon) = grid_to_latlon(&grid).unwrap();
            assert!((dlat - lat).abs() < 1.0 / 24.0, "{grid}");
            assert!((dlon - lon).abs() < 2.0 / 24.0, "{grid}");
        }
    }

    #[test]
    fn lowercase_subsquare_is_accepted() {
        assert!(grid_to_latlon("jo41du").is_ok());
    }

    #[test]
    fn junk_is_rejected () {
        assert!(grid_to_latlon("1234").is_err());
        assert!(grid_to_latlon("JO4").is_err());
        assert!(grid_to_latlon("ZZ99zz").is_err());
    }
}
