use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde::{Serialize, Serializer};

use crate::data::osm::{ElementKind, RawElement};
use crate::errors::{Error, Result};
use crate::keys::{KeyCategory, KeyClassifier};
use crate::rules::RuleSet;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const ADDR_PREFIX: &str = "addr:";
const TAG_PREFIX: &str = "tag:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Node,
    Way,
}

/// Versioning/provenance metadata of an element. Only present on a document
/// when the source carried at least one of these attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changeset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl CreationInfo {
    fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.changeset.is_none()
            && self.timestamp.is_none()
            && self.user.is_none()
            && self.uid.is_none()
    }
}

/// A coordinate pair, serialized as the two-element array [lat, lon].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        [self.lat, self.lon].serialize(serializer)
    }
}

/// The document a node or way is reshaped into: a "type" discriminant,
/// optional created/pos/address sub-structures, ordered node references for
/// ways, and a flat open map for everything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDocument {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<CreationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub node_refs: Vec<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl NormalizedDocument {
    /// Reshape one raw element. Relations yield `None`; they are counted by
    /// the audit but never loaded. Timestamp and coordinate values that fail
    /// to parse surface as errors so the caller can decide the skip policy.
    pub fn shape(
        element: &RawElement,
        classifier: &KeyClassifier,
        rules: &RuleSet,
    ) -> Result<Option<NormalizedDocument>> {
        let element_type = match element.kind {
            ElementKind::Node => ElementType::Node,
            ElementKind::Way => ElementType::Way,
            ElementKind::Relation => return Ok(None),
        };

        let mut created = CreationInfo::default();
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut lat: Option<f64> = None;
        let mut lon: Option<f64> = None;

        for (name, value) in &element.attrs {
            match name.as_str() {
                "version" => created.version = Some(value.clone()),
                "changeset" => created.changeset = Some(value.clone()),
                "timestamp" => created.timestamp = Some(parse_timestamp(value)?),
                "user" => created.user = Some(value.clone()),
                "uid" => created.uid = Some(value.clone()),
                "lat" => lat = Some(value.parse()?),
                "lon" => lon = Some(value.parse()?),
                _ => {
                    fields.entry(name.clone()).or_insert_with(|| value.clone());
                },
            }
        }

        let pos = match (lat, lon) {
            (Some(lat), Some(lon)) => {
                let pos = Position { lat, lon };
                if !pos.in_range() {
                    warn!(
                        id = element.id().unwrap_or(""),
                        lat = lat,
                        lon = lon;
                        "Coordinates outside expected domain range"
                    );
                }
                Some(pos)
            },
            _ => None,
        };

        let mut address: BTreeMap<String, String> = BTreeMap::new();
        for tag in &element.tags {
            match classifier.classify(&tag.key) {
                KeyCategory::Problemchars => {
                    // Quarantined rather than dropped: the value survives
                    // under a namespaced key that cannot collide with a
                    // well-formed one.
                    fields.entry(format!("{}{}", TAG_PREFIX, tag.key))
                        .or_insert_with(|| tag.value.clone());
                },
                category => match tag.key.strip_prefix(ADDR_PREFIX) {
                    Some(component) if category == KeyCategory::LowerColon => {
                        let value = match component {
                            "street" => rules.canonicalize_street(&tag.value),
                            "postcode" => rules.canonicalize_postcode(&tag.value).to_string(),
                            _ => tag.value.clone(),
                        };
                        address.entry(component.to_string()).or_insert(value);
                    },
                    Some(_) => {
                        // addr-prefixed but not a plain two-part key, e.g.
                        // "addr:street:name". Namespaced like problem keys.
                        fields.entry(format!("{}{}", TAG_PREFIX, tag.key))
                            .or_insert_with(|| tag.value.clone());
                    },
                    None => {
                        fields.entry(tag.key.clone()).or_insert_with(|| tag.value.clone());
                    },
                },
            }
        }

        Ok(Some(NormalizedDocument {
            element_type,
            created: if created.is_empty() { None } else { Some(created) },
            pos,
            address: if address.is_empty() { None } else { Some(address) },
            node_refs: element.node_refs.clone(),
            fields,
        }))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|_| Error::TimestampParse(raw.to_string()))?;
    Ok(parsed.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::data::osm::{Member, Tag};

    fn shape(element: &RawElement) -> Result<Option<NormalizedDocument>> {
        NormalizedDocument::shape(element, &KeyClassifier::new(), &RuleSet::austin())
    }

    fn tag(key: &str, value: &str) -> Tag {
        Tag { key: key.to_string(), value: value.to_string() }
    }

    #[test]
    fn way_keeps_ordered_node_refs_and_flat_tags() {
        let mut element = RawElement::new(ElementKind::Way);
        element.attrs.push(("id".to_string(), "7".to_string()));
        element.node_refs = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        element.tags.push(tag("highway", "service"));

        let document = shape(&element).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&document).unwrap(),
            json!({
                "type": "way",
                "id": "7",
                "node_refs": ["1", "2", "3"],
                "highway": "service",
            }),
        );
    }

    #[test]
    fn node_gets_pos_and_created() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "200".to_string()));
        element.attrs.push(("lat".to_string(), "41.97".to_string()));
        element.attrs.push(("lon".to_string(), "-87.68".to_string()));
        element.attrs.push(("timestamp".to_string(), "2012-03-28T18:31:23Z".to_string()));
        element.attrs.push(("user".to_string(), "bbmiller".to_string()));
        element.attrs.push(("uid".to_string(), "451048".to_string()));

        let document = shape(&element).unwrap().unwrap();
        assert_eq!(document.pos, Some(Position { lat: 41.97, lon: -87.68 }));

        let created = document.created.unwrap();
        assert_eq!(created.user.as_deref(), Some("bbmiller"));
        assert_eq!(created.uid.as_deref(), Some("451048"));
        assert_eq!(
            created.timestamp,
            Some(Utc.with_ymd_and_hms(2012, 3, 28, 18, 31, 23).unwrap()),
        );
        // Creation attributes route only into `created`.
        assert!(!document.fields.contains_key("timestamp"));
        assert!(!document.fields.contains_key("user"));
        assert_eq!(document.fields.get("id").map(String::as_str), Some("200"));
    }

    #[test]
    fn pos_serializes_as_lat_lon_array() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.attrs.push(("lat".to_string(), "30.25".to_string()));
        element.attrs.push(("lon".to_string(), "-97.75".to_string()));

        let value = serde_json::to_value(shape(&element).unwrap().unwrap()).unwrap();
        assert_eq!(value["pos"], json!([30.25, -97.75]));
    }

    #[test]
    fn lone_coordinate_does_not_make_a_pos() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.attrs.push(("lat".to_string(), "30.25".to_string()));

        let document = shape(&element).unwrap().unwrap();
        assert_eq!(document.pos, None);
    }

    #[test]
    fn problem_keys_are_namespaced_not_dropped() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.tags.push(tag("amenity?", "fast_food"));

        let document = shape(&element).unwrap().unwrap();
        assert_eq!(
            document.fields.get("tag:amenity?").map(String::as_str),
            Some("fast_food"),
        );
        assert!(!document.fields.contains_key("amenity?"));
    }

    #[test]
    fn addr_tags_build_the_address_with_canonical_values() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.tags.push(tag("addr:street", "Guadalupe St"));
        element.tags.push(tag("addr:postcode", "78701-1234"));
        element.tags.push(tag("addr:city", "Austin"));

        let address = shape(&element).unwrap().unwrap().address.unwrap();
        assert_eq!(address.get("street").map(String::as_str), Some("Guadalupe Street"));
        assert_eq!(address.get("postcode").map(String::as_str), Some("78701"));
        assert_eq!(address.get("city").map(String::as_str), Some("Austin"));
    }

    #[test]
    fn deep_addr_keys_are_namespaced() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.tags.push(tag("addr:street:name", "Lamar"));

        let document = shape(&element).unwrap().unwrap();
        assert_eq!(document.address, None);
        assert_eq!(
            document.fields.get("tag:addr:street:name").map(String::as_str),
            Some("Lamar"),
        );
    }

    #[test]
    fn first_tag_wins_on_duplicate_keys() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.tags.push(tag("name", "First"));
        element.tags.push(tag("name", "Second"));

        let document = shape(&element).unwrap().unwrap();
        assert_eq!(document.fields.get("name").map(String::as_str), Some("First"));
    }

    #[test]
    fn relations_are_never_shaped() {
        let mut element = RawElement::new(ElementKind::Relation);
        element.attrs.push(("id".to_string(), "9".to_string()));
        element.members.push(Member {
            member_type: "way".to_string(),
            member_ref: "7".to_string(),
            role: "outer".to_string(),
        });

        assert_eq!(shape(&element).unwrap(), None);
    }

    #[test]
    fn bad_timestamps_surface_as_errors() {
        let mut element = RawElement::new(ElementKind::Node);
        element.attrs.push(("id".to_string(), "1".to_string()));
        element.attrs.push(("timestamp".to_string(), "2012-03-28 18:31:23".to_string()));

        match shape(&element) {
            Err(Error::TimestampParse(value)) => assert_eq!(value, "2012-03-28 18:31:23"),
            other => panic!("expected a timestamp parse error, got {:?}", other),
        }
    }

    #[test]
    fn shape_always_sets_the_type_discriminant() {
        for kind in [ElementKind::Node, ElementKind::Way] {
            let mut element = RawElement::new(kind);
            element.attrs.push(("id".to_string(), "1".to_string()));
            let value = serde_json::to_value(shape(&element).unwrap().unwrap()).unwrap();
            assert_eq!(value["type"], json!(kind.as_str()));
        }
    }
}
