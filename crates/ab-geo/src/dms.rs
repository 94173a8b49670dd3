// Degrees/minutes/seconds rendering.

/// Format a coordinate pair as `51°50'16"N 9°26'42"E`.
///
/// The degree sign survives only when unicode output is requested; the
/// fragmenter's transliteration pass folds it to `deg` otherwise.
pub fn format_dms(lat: f64, lon: f64) -> String {
    format!(
        "{} {}",
        format_axis(lat, 'N', 'S'),
        format_axis(lon, 'E', 'W')
    )
}

fn format_axis(value: f64, pos: char, neg: char) -> String {
    let hemi = if value < 0.0 { neg } else { pos };
    let abs = value.abs();
    let deg = abs.trunc();
    let min_f = (abs - deg) * 60.0;
    let min = min_f.trunc();
    let sec = ((min_f - min) * 60.0).round();
    // Carry a rounded-up 60" into the minute (and on into the degree)
    // rather than printing it.
    let (min, sec) = if sec >= 60.0 { (min + 1.0, 0.0) } else { (min, sec) };
    let (deg, min) = if min >= 60.0 { (deg + 1.0, 0.0) } else { (deg, min) };
    format!("{deg:.0}\u{b0}{min:02.0}'{sec:02.0}\"{hemi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_both_hemispheres() {
        assert_eq!(format_dms(51.8378, 9.4450), "51°50'16\"N 9°26'42\"E");
        assert_eq!(format_dms(-33.8650, -70.6333), "33°51'54\"S 70°38'00\"W");
    }

    #[test]
    fn second_rounding_carries_into_minutes() {
        // 10.99999° is 10°59'59.96"; must round to 11°00'00", not 10°60'00".
        assert_eq!(format_dms(10.99999, 0.0), "11°00'00\"N 0°00'00\"E");
    }
}
