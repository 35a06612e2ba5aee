use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, DomainError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(DomainError::validation(format!(
                "latitude `{lat}` must lie within [-90, 90]"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(DomainError::validation(format!(
                "longitude `{lng}` must lie within [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Stable textual form used inside cache keys (4 decimal places, ~11 m).
    pub fn key_fragment(&self) -> String {
        format!("{:.4}:{:.4}", self.lat, self.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_coordinates() {
        let point = GeoPoint::new(52.52, 13.405).expect("valid point");
        assert_eq!(point.lat, 52.52);
        assert_eq!(point.lng, 13.405);
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(GeoPoint::new(0.0, -180.01).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn key_fragment_rounds_to_four_places() {
        let point = GeoPoint::new(40.712_776, -74.005_974).expect("valid point");
        assert_eq!(point.key_fragment(), "40.7128:-74.0060");
    }

    #[test]
    fn deserializes_search_engine_lon_field() {
        let point: GeoPoint = serde_json::from_str(r#"{"lat": 1.5, "lon": 2.5}"#).expect("point");
        assert_eq!(point.lng, 2.5);
    }
}
