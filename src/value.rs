use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use wkt::{ToWkt, TryFromWkt};

use crate::error::{Result, TableError};

/// Geometry class of a geometry field. `Geometry` accepts any class and is
/// what remote columns report when the backend does not distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Geometry => "Geometry",
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    /// Match a backend column type name such as `POLYGON` or `geometry`.
    pub fn from_type_name(name: &str) -> Option<GeometryKind> {
        let kinds = [
            GeometryKind::Geometry,
            GeometryKind::Point,
            GeometryKind::LineString,
            GeometryKind::Polygon,
            GeometryKind::MultiPoint,
            GeometryKind::MultiLineString,
            GeometryKind::MultiPolygon,
        ];
        kinds
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

/// Semantic value kind, independent of any backend's column type names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Date,
    Time,
    DateTime,
    Duration,
    Geometry { kind: GeometryKind, srid: i32 },
}

impl FieldKind {
    /// Shorthand for a geometry field in the given EPSG coordinate system.
    pub fn geometry(kind: GeometryKind, srid: i32) -> FieldKind {
        FieldKind::Geometry { kind, srid }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, FieldKind::Geometry { .. })
    }

    /// Whether a remote column of kind `other` satisfies this declared kind.
    /// Geometry kinds match any geometry column; the SRID is not reported by
    /// backends and is not compared.
    pub fn compatible(&self, other: &FieldKind) -> bool {
        match (self, other) {
            (
                FieldKind::Geometry { kind: declared, .. },
                FieldKind::Geometry { kind: remote, .. },
            ) => {
                *declared == GeometryKind::Geometry
                    || *remote == GeometryKind::Geometry
                    || declared == remote
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Bool => write!(f, "boolean"),
            FieldKind::Int => write!(f, "integer"),
            FieldKind::Float => write!(f, "float"),
            FieldKind::Text => write!(f, "text"),
            FieldKind::Bytes => write!(f, "bytes"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::Time => write!(f, "time"),
            FieldKind::DateTime => write!(f, "datetime"),
            FieldKind::Duration => write!(f, "duration"),
            FieldKind::Geometry { kind, srid } => {
                write!(f, "geometry({}, EPSG:{})", kind.name(), srid)
            }
        }
    }
}

/// A geometry value: coordinates plus the EPSG code of their coordinate
/// reference system. Crosses the wire as well-known text + SRID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub geometry: geo_types::Geometry<f64>,
    pub srid: i32,
}

impl Geometry {
    pub fn new(geometry: impl Into<geo_types::Geometry<f64>>, srid: i32) -> Geometry {
        Geometry {
            geometry: geometry.into(),
            srid,
        }
    }

    pub fn from_wkt(text: &str, srid: i32) -> Result<Geometry> {
        let geometry = geo_types::Geometry::try_from_wkt_str(text)
            .map_err(|error| TableError::Geometry(error.to_string()))?;
        Ok(Geometry { geometry, srid })
    }

    pub fn wkt(&self) -> String {
        self.geometry.wkt_string()
    }
}

/// A value of one of the semantic kinds, or null.
///
/// Temporal values are timezone-naive and by convention UTC; the engine
/// stores and compares them exactly as given, without conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Duration(#[serde(with = "duration_microseconds")] Duration),
    Geometry(Geometry),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Time(v) => write!(f, "{}", v.format(TIME_FORMAT)),
            Value::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
            Value::Duration(v) => write!(f, "{}s", v.num_seconds()),
            Value::Geometry(v) => write!(f, "{}", v.wkt()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Value {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Value {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Value {
        Value::DateTime(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Value {
        Value::Duration(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Value {
        Value::Geometry(v)
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DATETIME_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y%m%d %H%M%S",
];

/// Normalize a raw backend value into the declared kind.
///
/// Backends report whatever their driver hands back (SQLite stores temporal
/// values as text and booleans as integers, geometry columns are selected as
/// well-known text); this is the decoding half of the round-trip guarantee.
pub fn decode(field: &str, kind: &FieldKind, raw: Value) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = |raw: &Value| TableError::Decode {
        field: field.to_string(),
        kind: kind.clone(),
        reason: format!("unexpected backend value {}", raw),
    };

    match (kind, raw) {
        (FieldKind::Bool, Value::Bool(v)) => Ok(Value::Bool(v)),
        (FieldKind::Bool, Value::Int(v)) => Ok(Value::Bool(v != 0)),
        (FieldKind::Bool, Value::Text(v)) => match v.to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Ok(Value::Bool(true)),
            "f" | "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&Value::Text(v))),
        },

        (FieldKind::Int, Value::Int(v)) => Ok(Value::Int(v)),
        (FieldKind::Int, Value::Text(v)) => v
            .parse()
            .map(Value::Int)
            .map_err(|_| mismatch(&Value::Text(v))),

        (FieldKind::Float, Value::Float(v)) => Ok(Value::Float(v)),
        (FieldKind::Float, Value::Int(v)) => Ok(Value::Float(v as f64)),
        (FieldKind::Float, Value::Text(v)) => v
            .parse()
            .map(Value::Float)
            .map_err(|_| mismatch(&Value::Text(v))),

        (FieldKind::Text, Value::Text(v)) => Ok(Value::Text(v)),

        (FieldKind::Bytes, Value::Bytes(v)) => Ok(Value::Bytes(v)),

        (FieldKind::Date, Value::Date(v)) => Ok(Value::Date(v)),
        (FieldKind::Date, Value::Text(v)) => NaiveDate::parse_from_str(&v, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|_| mismatch(&Value::Text(v))),

        (FieldKind::Time, Value::Time(v)) => Ok(Value::Time(v)),
        (FieldKind::Time, Value::Text(v)) => NaiveTime::parse_from_str(&v, TIME_FORMAT)
            .map(Value::Time)
            .map_err(|_| mismatch(&Value::Text(v))),

        (FieldKind::DateTime, Value::DateTime(v)) => Ok(Value::DateTime(v)),
        (FieldKind::DateTime, Value::Text(v)) => DATETIME_PARSE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&v, format).ok())
            .map(Value::DateTime)
            .ok_or_else(|| mismatch(&Value::Text(v))),

        (FieldKind::Duration, Value::Duration(v)) => Ok(Value::Duration(v)),

        (FieldKind::Geometry { srid, .. }, Value::Text(v)) => {
            Geometry::from_wkt(&v, *srid).map(Value::Geometry)
        }
        (FieldKind::Geometry { .. }, Value::Geometry(v)) => Ok(Value::Geometry(v)),

        (_, raw) => Err(mismatch(&raw)),
    }
}

mod duration_microseconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_microseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::microseconds(i64::deserialize(deserializer)?))
    }
}
