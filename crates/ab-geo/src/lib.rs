// ab-geo: geodesic primitives for the responder.
//
// Pure functions of `f64` degrees in, strings or numbers out.  Kept free of
// I/O and of the daemon's types so the whole crate can be tested as a unit.

pub mod dms;
pub mod maidenhead;
pub mod sphere;
pub mod utm;

pub use dms::format_dms;
pub use maidenhead::{grid_to_latlon, latlon_to_grid};
pub use sphere::{bearing_deg, compass_point, distance_km};
pub use utm::{to_mgrs, to_utm, Utm};
