// Nominatim geocoding client (forward, postal code, reverse, nearby).
//
// Nominatim's usage policy requires a descriptive user agent; the shared
// HTTP client carries it.  Results come back nearest-first for bounded
// category searches, which is exactly the order the repeater/OSM
// formatters want.

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, transport_err, GeoPlace, Geocoder, ProviderError, ProviderResult};

const SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Half-width of the bounding box used for `nearby`, in degrees.
const NEARBY_BOX_DEG: f64 = 0.25;

pub struct Nominatim {
    client: reqwest::Client,
}

impl Nominatim {
    pub fn new(client: reqwest::Client) -> Self {
        Nominatim { client }
    }

    async fn search(&self, query: &[(&str, String)]) -> ProviderResult<Vec<GeoPlace>> {
        let mut params: Vec<(&str, String)> = vec![("format", "jsonv2".to_owned())];
        params.extend_from_slice(query);
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&params)
            .send()
            .await
            .map_err(transport_err)?;
        let hits: Vec<SearchHit> = check_status(resp)?.json().await.map_err(transport_err)?;
        hits.into_iter().map(SearchHit::into_place).collect()
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

impl SearchHit {
    fn into_place(self) -> ProviderResult<GeoPlace> {
        let lat = self
            .lat
            .parse()
            .map_err(|_| ProviderError::Unavailable("bad latitude in response".to_owned()))?;
        let lon = self
            .lon
            .parse()
            .map_err(|_| ProviderError::Unavailable("bad longitude in response".to_owned()))?;
        Ok(GeoPlace {
            lat,
            lon,
            display_name: self.display_name,
        })
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    async fn by_city(
        &self,
        city: &str,
        state: Option<&str>,
        country: &str,
    ) -> ProviderResult<GeoPlace> {
        let q = match state {
            Some(s) => format!("{city}, {s}"),
            None => city.to_owned(),
        };
        let hits = self
            .search(&[
                ("q", q),
                ("countrycodes", country.to_lowercase()),
                ("limit", "1".to_owned()),
            ])
            .await?;
        hits.into_iter().next().ok_or(ProviderError::NotFound)
    }

    async fn by_zip(&self, code: &str, country: &str) -> ProviderResult<GeoPlace> {
        let hits = self
            .search(&[
                ("postalcode", code.to_owned()),
                ("countrycodes", country.to_lowercase()),
                ("limit", "1".to_owned()),
            ])
            .await?;
        hits.into_iter().next().ok_or(ProviderError::NotFound)
    }

    async fn reverse(&self, lat: f64, lon: f64) -> ProviderResult<String> {
        let resp = self
            .client
            .get(REVERSE_URL)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("format", "jsonv2".to_owned()),
            ])
            .send()
            .await
            .map_err(transport_err)?;
        let hit: ReverseHit = check_status(resp)?.json().await.map_err(transport_err)?;
        match hit.display_name {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ProviderError::NotFound),
        }
    }

    async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        category: &str,
        limit: usize,
    ) -> ProviderResult<Vec<GeoPlace>> {
        let viewbox = format!(
            "{},{},{},{}",
            lon - NEARBY_BOX_DEG,
            lat + NEARBY_BOX_DEG,
            lon + NEARBY_BOX_DEG,
            lat - NEARBY_BOX_DEG
        );
        let hits = self
            .search(&[
                // Bracketed queries activate Nominatim's special-phrase
                // (amenity) search.
                ("q", format!("[{category}]")),
                ("viewbox", viewbox),
                ("bounded", "1".to_owned()),
                ("limit", limit.to_string()),
            ])
            .await?;
        if hits.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(hits)
    }
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hit_parses_string_coordinates() {
        let hit: SearchHit = serde_json::from_str(
            r#"{"lat": "51.829", "lon": "9.448", "display_name": "Holzminden, Niedersachsen"}"#,
        )
        .unwrap();
        let place = hit.into_place().unwrap();
        assert!((place.lat - 51.829).abs() < 1e-9);
        assert!((place.lon - 9.448).abs() < 1e-9);
        assert_eq!(place.display_name, "Holzminden, Niedersachsen");
    }

    #[test]
    fn malformed_coordinates_are_a_transport_error() {
        let hit: SearchHit = serde_json::from_str(
            r#"{"lat": "north", "lon": "9.4", "display_name": "x"}"#,
        )
        .unwrap();
        assert!(matches!(
            hit.into_place(),
            Err(ProviderError::Unavailable(_))
        ));
    }
}
