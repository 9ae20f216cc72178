//! POI record as stored and exchanged with the front-end.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::SessionId;
use crate::errors::AppError;
use crate::geometry::{format_logical, parse_logical, GeometryError, Placed, Point};

/// One axis of a logical position, serialized as `+0123` / `-0045`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Coord(i32);

impl Coord {
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Round a computed logical value to the stored precision.
    pub fn from_logical(value: f64) -> Self {
        Self(value.round() as i32)
    }

    pub fn parse(raw: &str) -> Result<Self, GeometryError> {
        parse_logical(raw).map(Self)
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_logical(self.0 as f64))
    }
}

impl Serialize for Coord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Coord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CoordVisitor)
    }
}

struct CoordVisitor;

impl<'de> de::Visitor<'de> for CoordVisitor {
    type Value = Coord;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a signed logical coordinate such as \"+0123\" or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Coord, E> {
        Coord::parse(v).map_err(E::custom)
    }

    // Early records stored raw numbers.
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Coord, E> {
        i32::try_from(v)
            .map(Coord)
            .map_err(|_| E::custom(format!("coordinate {} out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Coord, E> {
        i32::try_from(v)
            .map(Coord)
            .map_err(|_| E::custom(format!("coordinate {} out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Coord, E> {
        if !v.is_finite() || v.abs() > i32::MAX as f64 {
            return Err(E::custom(format!("coordinate {} out of range", v)));
        }
        Ok(Coord::from_logical(v))
    }
}

/// A point-of-interest annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poi {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub x: Coord,
    pub y: Coord,
    /// Client-side display toggle.
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub approved: bool,
    /// Authoring session; absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,
}

fn default_visible() -> bool {
    true
}

impl Poi {
    /// Fresh unapproved POI with a newly minted id.
    pub fn draft(new: NewPoi, session_id: Option<SessionId>, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_poi_id(),
            kind: new.kind,
            description: new.description,
            x: new.x,
            y: new.y,
            visible: true,
            approved: false,
            session_id,
            date_added: Some(now),
            last_edited: None,
        }
    }

    pub fn is_owned_by(&self, session: Option<&SessionId>) -> bool {
        matches!((self.session_id.as_ref(), session), (Some(owner), Some(actor)) if owner == actor)
    }
}

impl Placed for Poi {
    fn logical_position(&self) -> Point {
        Point::new(self.x.value() as f64, self.y.value() as f64)
    }
}

pub fn generate_poi_id() -> String {
    format!("poi-{}", uuid::Uuid::new_v4())
}

/// Input for creating a POI.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPoi {
    pub kind: String,
    pub description: String,
    pub x: Coord,
    pub y: Coord,
}

/// Editable fields of a POI. Position and id never change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoiChanges {
    pub kind: Option<String>,
    pub description: Option<String>,
}

impl PoiChanges {
    pub fn applied_to(&self, poi: &Poi, now: DateTime<Utc>) -> Poi {
        let mut edited = poi.clone();
        if let Some(kind) = &self.kind {
            edited.kind = kind.clone();
        }
        if let Some(description) = &self.description {
            edited.description = description.trim().to_string();
        }
        edited.last_edited = Some(now);
        edited
    }
}

/// Transport tag that may accompany a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitAction {
    Create,
    Update,
}

/// Body of a save request: a POI plus the optional `action` tag.
///
/// Only the fields a client may author are read; ownership and approval are
/// decided by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiSubmission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<SubmitAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub x: Coord,
    pub y: Coord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
}

impl PoiSubmission {
    pub fn from_json(body: serde_json::Value) -> Result<Self, AppError> {
        serde_json::from_value(body).map_err(|e| AppError::Validation(format!("Invalid POI: {}", e)))
    }

    pub fn for_poi(poi: &Poi, action: SubmitAction) -> Self {
        Self {
            action: Some(action),
            id: Some(poi.id.clone()),
            kind: poi.kind.clone(),
            description: poi.description.clone(),
            x: poi.x,
            y: poi.y,
            date_added: poi.date_added,
        }
    }

    /// The requested id, if a non-blank one was supplied.
    pub fn requested_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn changes(&self, kind: String) -> PoiChanges {
        PoiChanges {
            kind: Some(kind),
            description: Some(self.description.clone()),
        }
    }

    /// New draft owned by `session_id`, keeping the client's provisional id.
    pub fn into_draft(self, kind: String, session_id: Option<SessionId>, now: DateTime<Utc>) -> Poi {
        let id = self
            .requested_id()
            .map(str::to_string)
            .unwrap_or_else(generate_poi_id);
        Poi {
            id,
            kind,
            description: self.description.trim().to_string(),
            x: self.x,
            y: self.y,
            visible: true,
            approved: false,
            session_id,
            date_added: Some(self.date_added.unwrap_or(now)),
            last_edited: None,
        }
    }
}

/// The configurable open set of POI categories.
///
/// An empty set accepts any non-empty type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categories(Vec<String>);

impl Default for Categories {
    fn default() -> Self {
        Self::new([
            "shelter", "fragment", "dungeon", "resource", "landmark", "npc", "secret", "boss",
        ])
    }
}

impl Categories {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for name in names {
            let name = normalize_kind(name.as_ref());
            if !name.is_empty() && !list.contains(&name) {
                list.push(name);
            }
        }
        Self(list)
    }

    /// Parse a comma separated list.
    pub fn parse_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn is_open(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Normalized type name, or a validation error.
    pub fn normalize(&self, kind: &str) -> Result<String, AppError> {
        let kind = normalize_kind(kind);
        if kind.is_empty() {
            return Err(AppError::Validation("POI type is required".to_string()));
        }
        if !self.is_open() && !self.0.contains(&kind) {
            return Err(AppError::Validation(format!("Unknown POI type '{}'", kind)));
        }
        Ok(kind)
    }
}

fn normalize_kind(kind: &str) -> String {
    kind.trim().to_lowercase()
}
