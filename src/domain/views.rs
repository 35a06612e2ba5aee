use serde::{Deserialize, Serialize};

/// The part of an indexed place-view event the recommender reads.
///
/// Location and timestamp stay in the index; the engine accepts several
/// encodings for both and nothing here needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceViewRecord {
    #[serde(default)]
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_indexed_document() {
        let raw = r#"{
            "user_id": "u-1",
            "categories": ["food", "art"],
            "location": {"lat": 48.85, "lon": 2.35},
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let view: PlaceViewRecord = serde_json::from_str(raw).expect("view");

        assert_eq!(view.categories, vec!["food", "art"]);
    }

    #[test]
    fn ignores_alternate_location_and_date_encodings() {
        let as_string: PlaceViewRecord = serde_json::from_str(
            r#"{"categories": ["food"], "location": "40.0,-73.0", "timestamp": 1718445600000}"#,
        )
        .expect("string geo_point");
        let as_array: PlaceViewRecord =
            serde_json::from_str(r#"{"categories": ["park"], "location": [-73.0, 40.0]}"#)
                .expect("array geo_point");

        assert_eq!(as_string.categories, vec!["food"]);
        assert_eq!(as_array.categories, vec!["park"]);
    }

    #[test]
    fn tolerates_missing_categories() {
        let view: PlaceViewRecord = serde_json::from_str(r#"{"user_id": "u-2"}"#).expect("view");
        assert!(view.categories.is_empty());
    }
}
