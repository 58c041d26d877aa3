//! Caller-supplied filters and request limits.
//!
//! Filter payloads are JSON objects such as
//! `{"object_types": "Star", "min_parallax": 5, "max_g_magnitude": 12, "limit": 50}`.
//! Keys are case-insensitive and underscores inside the category part are
//! ignored, so `max_g_magnitude` and `MAX_GMAGNITUDE` name the same bound.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use crate::category::Category;

const OBJECT_TYPES_KEY: &str = "object_types";
const LIMIT_KEY: &str = "limit";
const CHUNK_SIZE_KEY: &str = "chunksize";

/// Malformed filter input. Always surfaced as an input error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("Invalid JSON for query parameters: {0}")]
    InvalidJson(String),
    #[error("Query parameters must be a JSON object")]
    NotAnObject,
    #[error("Duplicate filter key: {0}")]
    DuplicateKey(String),
    #[error("Invalid numeric value for {key}: {value}")]
    InvalidBound { key: String, value: String },
    #[error("Invalid value for {key}: expected an object with ra, dec and radius")]
    InvalidCircle { key: String },
    #[error("Invalid object_types value: {0}")]
    InvalidObjectType(String),
    #[error("Cannot convert to integer {field} value: {value}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("Either limit or chunkSize must be specified in query_params")]
    MissingLimit,
}

/// Which side of a range a bound constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BoundKind {
    Min,
    Max,
}

impl BoundKind {
    fn prefix(&self) -> &'static str {
        match self {
            BoundKind::Min => "min_",
            BoundKind::Max => "max_",
        }
    }

    /// Comparison operator used in predicates.
    pub fn operator(&self) -> &'static str {
        match self {
            BoundKind::Min => ">=",
            BoundKind::Max => "<=",
        }
    }
}

/// Center and radius of a cone filter, in degrees. Fields are optional
/// because partial input is allowed and simply yields no predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CircleFilter {
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub radius: Option<f64>,
}

impl CircleFilter {
    /// `(ra, dec, radius)` when all three are present.
    pub fn complete(&self) -> Option<(f64, f64, f64)> {
        Some((self.ra?, self.dec?, self.radius?))
    }
}

/// Normalized filter bounds, object type and cone filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    bounds: BTreeMap<(String, BoundKind), f64>,
    object_type: Option<String>,
    circle: Option<CircleFilter>,
}

fn normalize_category(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_number(key: &str, value: &Json) -> Result<Option<f64>, FilterError> {
    let invalid = || FilterError::InvalidBound {
        key: key.to_string(),
        value: value.to_string(),
    };
    match value {
        Json::Null => Ok(None),
        Json::Number(n) => n.as_f64().map(Some).ok_or_else(invalid),
        Json::String(s) if s.trim().is_empty() => Ok(None),
        Json::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn parse_circle(key: &str, value: &Json) -> Result<Option<CircleFilter>, FilterError> {
    let object = match value {
        Json::Null => return Ok(None),
        Json::Object(object) => object,
        _ => {
            return Err(FilterError::InvalidCircle {
                key: key.to_string(),
            })
        }
    };

    let mut circle = CircleFilter::default();
    for (field, v) in object {
        let field = field.to_ascii_lowercase();
        let parsed = parse_number(&format!("{key}.{field}"), v)?;
        match field.as_str() {
            "ra" => circle.ra = parsed,
            "dec" => circle.dec = parsed,
            "radius" => circle.radius = parsed,
            _ => {}
        }
    }
    Ok(Some(circle))
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a filter object. Keys that are neither bounds, `object_types`
    /// nor the cone filter are ignored.
    pub fn from_json(params: &Map<String, Json>) -> Result<Self, FilterError> {
        let circle_key = Category::ObjectsInCircle.filter_key();
        let mut filters = FilterSet::new();
        let mut seen = std::collections::HashSet::new();

        for (raw_key, value) in params {
            let key = raw_key.to_ascii_lowercase();

            let bound = [BoundKind::Min, BoundKind::Max]
                .into_iter()
                .find_map(|kind| key.strip_prefix(kind.prefix()).map(|rest| (kind, rest)));

            if let Some((kind, rest)) = bound {
                let canonical = format!("{}{}", kind.prefix(), normalize_category(rest));
                if !seen.insert(canonical.clone()) {
                    return Err(FilterError::DuplicateKey(raw_key.clone()));
                }
                if let Some(v) = parse_number(&canonical, value)? {
                    filters.bounds.insert((normalize_category(rest), kind), v);
                }
            } else if key == OBJECT_TYPES_KEY {
                if !seen.insert(key.clone()) {
                    return Err(FilterError::DuplicateKey(raw_key.clone()));
                }
                match value {
                    Json::Null => {}
                    Json::String(s) => filters.object_type = Some(s.clone()),
                    other => return Err(FilterError::InvalidObjectType(other.to_string())),
                }
            } else if normalize_category(&key) == circle_key {
                if !seen.insert(circle_key.clone()) {
                    return Err(FilterError::DuplicateKey(raw_key.clone()));
                }
                filters.circle = parse_circle(&circle_key, value)?;
            }
        }

        Ok(filters)
    }

    pub fn with_min(mut self, category: Category, value: f64) -> Self {
        self.bounds
            .insert((category.filter_key(), BoundKind::Min), value);
        self
    }

    pub fn with_max(mut self, category: Category, value: f64) -> Self {
        self.bounds
            .insert((category.filter_key(), BoundKind::Max), value);
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_circle(mut self, circle: CircleFilter) -> Self {
        self.circle = Some(circle);
        self
    }

    /// Bound supplied for `category`, if any.
    pub fn bound(&self, category: Category, kind: BoundKind) -> Option<f64> {
        self.bounds.get(&(category.filter_key(), kind)).copied()
    }

    /// Object type exactly as supplied; resolved per catalog when building.
    pub fn object_type(&self) -> Option<&str> {
        self.object_type.as_deref()
    }

    pub fn circle(&self) -> Option<&CircleFilter> {
        self.circle.as_ref()
    }

    pub fn has_bounds(&self) -> bool {
        !self.bounds.is_empty()
    }
}

fn parse_count(field: &'static str, value: Option<&Json>) -> Result<Option<u32>, FilterError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let invalid = || FilterError::InvalidInteger {
        field,
        value: value.to_string(),
    };
    let count = match value {
        Json::Null => return Ok(None),
        Json::Number(n) => match n.as_u64() {
            Some(v) => v,
            None => {
                let v = n.as_f64().ok_or_else(invalid)?;
                if v < 0.0 || v.fract() != 0.0 {
                    return Err(invalid());
                }
                v as u64
            }
        },
        Json::String(s) if s.trim().is_empty() => return Ok(None),
        Json::String(s) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    let count = u32::try_from(count).map_err(|_| invalid())?;
    // Zero is treated as "not given".
    Ok((count > 0).then_some(count))
}

/// A validated query request: filters plus row limit and chunk size.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub filters: FilterSet,
    pub limit: Option<u32>,
    /// Accepted for compatibility; results are not paged.
    pub chunk_size: Option<u32>,
}

impl RequestParams {
    /// Validate a filter payload that carries its own `limit`/`chunkSize`.
    pub fn from_json_str(params: &str) -> Result<Self, FilterError> {
        let json: Json =
            serde_json::from_str(params).map_err(|e| FilterError::InvalidJson(e.to_string()))?;
        let Json::Object(object) = json else {
            return Err(FilterError::NotAnObject);
        };

        let lowered: Map<String, Json> = object
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        let limit = parse_count("limit", lowered.get(LIMIT_KEY))?;
        let chunk_size = parse_count("chunkSize", lowered.get(CHUNK_SIZE_KEY))?;

        Self::new(FilterSet::from_json(&object)?, limit, chunk_size)
    }

    /// Fails when neither a limit nor a chunk size is given.
    pub fn new(
        filters: FilterSet,
        limit: Option<u32>,
        chunk_size: Option<u32>,
    ) -> Result<Self, FilterError> {
        if limit.is_none() && chunk_size.is_none() {
            return Err(FilterError::MissingLimit);
        }
        Ok(Self {
            filters,
            limit,
            chunk_size,
        })
    }
}
