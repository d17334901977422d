//! Catalog entries, breadcrumb metadata and stream selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A catalog as produced by discovery and consumed by sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// One entry per stream.
    pub streams: Vec<CatalogEntry>,
}

/// One stream in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Identifier the tap uses for the stream.
    pub tap_stream_id: String,
    /// Stream name used in emitted messages.
    pub stream: String,
    /// JSON Schema of the stream.
    pub schema: Value,
    /// Primary key fields.
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Breadcrumb metadata.
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

/// Metadata attached to a breadcrumb: `[]` for the stream, `["properties", name]` for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Path into the schema.
    pub breadcrumb: Vec<String>,
    /// Arbitrary metadata keys (`selected`, `inclusion`, ...).
    pub metadata: Map<String, Value>,
}

/// Metadata indexed by breadcrumb.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetadata(BTreeMap<Vec<String>, Map<String, Value>>);

impl StreamMetadata {
    /// Indexes a metadata list. Later entries for the same breadcrumb are merged over earlier ones.
    pub fn from_entries(entries: &[MetadataEntry]) -> Self {
        let mut map: BTreeMap<Vec<String>, Map<String, Value>> = BTreeMap::new();
        for entry in entries {
            let slot = map.entry(entry.breadcrumb.clone()).or_default();
            for (k, v) in &entry.metadata {
                slot.insert(k.clone(), v.clone());
            }
        }
        Self(map)
    }

    /// Looks up `key` at `breadcrumb`.
    pub fn get(&self, breadcrumb: &[String], key: &str) -> Option<&Value> {
        self.0.get(breadcrumb).and_then(|m| m.get(key))
    }

    fn property_breadcrumb(field: &str) -> Vec<String> {
        vec!["properties".to_string(), field.to_string()]
    }

    /// Whether a top-level field should be kept in emitted records.
    ///
    /// `automatic` fields are always kept, fields explicitly deselected or
    /// marked `unsupported` are dropped, everything else is kept.
    pub fn is_field_selected(&self, field: &str) -> bool {
        let crumb = Self::property_breadcrumb(field);
        let inclusion = self.get(&crumb, "inclusion").and_then(Value::as_str);
        if inclusion == Some("automatic") {
            return true;
        }
        if self.get(&crumb, "selected").and_then(Value::as_bool) == Some(false) {
            return false;
        }
        inclusion != Some("unsupported")
    }

    /// Whether the stream itself is selected (`selected: true` at the empty breadcrumb).
    pub fn is_stream_selected(&self) -> bool {
        self.get(&[], "selected").and_then(Value::as_bool) == Some(true)
    }
}

impl CatalogEntry {
    /// Indexed metadata for this entry.
    pub fn stream_metadata(&self) -> StreamMetadata {
        StreamMetadata::from_entries(&self.metadata)
    }

    /// Selected through metadata, or through the legacy `selected` schema flag.
    pub fn is_selected(&self) -> bool {
        self.stream_metadata().is_stream_selected()
            || self.schema.get("selected").and_then(Value::as_bool) == Some(true)
    }
}

impl Catalog {
    /// Finds an entry by `tap_stream_id`.
    pub fn get_stream(&self, tap_stream_id: &str) -> Option<&CatalogEntry> {
        self.streams.iter().find(|s| s.tap_stream_id == tap_stream_id)
    }

    /// Entries selected for sync, in catalog order.
    pub fn selected_streams(&self) -> Vec<&CatalogEntry> {
        self.streams.iter().filter(|s| s.is_selected()).collect()
    }
}

/// Builds discovery metadata for a stream schema.
///
/// The stream breadcrumb carries the key properties and is selected by default.
/// Each property is `automatic` when it is a key property or `start_date`, and
/// `available` otherwise.
pub fn build_metadata(tap_stream_id: &str, schema: &Value, key_properties: &[String]) -> Vec<MetadataEntry> {
    let mut stream_meta = Map::new();
    stream_meta.insert("inclusion".into(), Value::from("available"));
    stream_meta.insert(
        "table-key-properties".into(),
        Value::from(key_properties.to_vec()),
    );
    stream_meta.insert("schema-name".into(), Value::from(tap_stream_id));
    stream_meta.insert("selected".into(), Value::Bool(true));

    let mut entries = vec![MetadataEntry {
        breadcrumb: vec![],
        metadata: stream_meta,
    }];

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for prop in props.keys() {
            let inclusion = if key_properties.iter().any(|k| k == prop) || prop == "start_date" {
                "automatic"
            } else {
                "available"
            };
            let mut meta = Map::new();
            meta.insert("inclusion".into(), Value::from(inclusion));
            entries.push(MetadataEntry {
                breadcrumb: vec!["properties".into(), prop.clone()],
                metadata: meta,
            });
        }
    }

    entries
}
