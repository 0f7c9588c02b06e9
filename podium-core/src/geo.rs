use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mean earth radius in meters, as used by the server's geo functions.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Which attributes of a collection carry geo data, as described by the
/// collection's geo index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFields {
    /// One attribute holding `[latitude, longitude]`.
    Location(String),
    /// Two scalar attributes.
    LatLon { latitude: String, longitude: String },
}

impl GeoFields {
    pub fn location(field: impl Into<String>) -> Self {
        GeoFields::Location(field.into())
    }

    pub fn lat_lon(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        GeoFields::LatLon {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }

    /// Reads coordinates out of a record through `lookup`. Returns `None`
    /// when the fields are missing or not numeric.
    pub fn extract<'a>(&self, lookup: impl Fn(&str) -> Option<&'a Value>) -> Option<Coordinates> {
        match self {
            GeoFields::Location(field) => {
                let pair = lookup(field)?.as_array()?;
                match pair.as_slice() {
                    [lat, lon] => Some(Coordinates::new(lat.as_f64()?, lon.as_f64()?)),
                    _ => None,
                }
            }
            GeoFields::LatLon {
                latitude,
                longitude,
            } => Some(Coordinates::new(
                lookup(latitude)?.as_f64()?,
                lookup(longitude)?.as_f64()?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn distance_zero_for_same_point() {
        let p = Coordinates::new(48.8566, 2.3522);
        assert!(p.distance_to(&p).abs() < 1e-6);
    }

    #[test]
    fn distance_paris_london() {
        let paris = Coordinates::new(48.8566, 2.3522);
        let london = Coordinates::new(51.5074, -0.1278);
        let d = paris.distance_to(&london);
        assert!((d - 343_500.0).abs() < 2_000.0, "got {d}");
    }

    #[test]
    fn extract_location_field() {
        let mut record = Map::new();
        record.insert("loc".into(), json!([10.5, 20.25]));
        let fields = GeoFields::location("loc");
        assert_eq!(
            fields.extract(|name| record.get(name)),
            Some(Coordinates::new(10.5, 20.25))
        );
    }

    #[test]
    fn extract_lat_lon_fields() {
        let mut record = Map::new();
        record.insert("lat".into(), json!(1.0));
        record.insert("lon".into(), json!(2));
        let fields = GeoFields::lat_lon("lat", "lon");
        assert_eq!(
            fields.extract(|name| record.get(name)),
            Some(Coordinates::new(1.0, 2.0))
        );
    }

    #[test]
    fn extract_missing_or_malformed() {
        let mut record = Map::new();
        record.insert("loc".into(), json!([1.0]));
        record.insert("lat".into(), json!("north"));
        assert_eq!(GeoFields::location("loc").extract(|n| record.get(n)), None);
        assert_eq!(GeoFields::location("nowhere").extract(|n| record.get(n)), None);
        assert_eq!(GeoFields::lat_lon("lat", "lon").extract(|n| record.get(n)), None);
    }
}
