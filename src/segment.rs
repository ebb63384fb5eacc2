//! Batch add/remove of contacts to and from segments.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Route the batch form posts to.
pub const BATCH_SET_ROUTE: &str = "/segments/batch/contact/set";

/// A segment as listed in the batch form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub id: u64,
    pub name: String,
}

/// Segment membership operations.
pub trait SegmentActions: Send + Sync {
    fn add_contacts(&self, contact_ids: &[u64], segment_ids: &[u64]);
    fn remove_contacts(&self, contact_ids: &[u64], segment_ids: &[u64]);
    /// Segments the current user may assign contacts to.
    fn user_lists(&self) -> Vec<SegmentSummary>;
}

/// Submitted batch form: `ids` is a JSON-encoded array of contact ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchSegmentRequest {
    #[serde(default)]
    pub ids: Option<String>,
    #[serde(default, deserialize_with = "segment_ids")]
    pub add: Vec<u64>,
    #[serde(default, deserialize_with = "segment_ids")]
    pub remove: Vec<u64>,
}

/// Numbers and numeric strings are ids; anything else is dropped.
fn id_value(item: &Value) -> Option<u64> {
    match item {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn segment_ids<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items.iter().filter_map(id_value).collect())
}

/// Form envelope, fields nested under `lead_batch`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchSegmentForm {
    #[serde(default)]
    pub lead_batch: BatchSegmentRequest,
}

impl BatchSegmentRequest {
    /// Decode the contact ids; numbers and numeric strings are accepted,
    /// anything else is dropped.
    #[must_use]
    pub fn contact_ids(&self) -> Vec<u64> {
        let Some(raw) = self.ids.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Vec::new();
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) else {
            debug!("Batch ids are not a JSON array: {raw}");
            return Vec::new();
        };
        items.iter().filter_map(id_value).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Notice,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    #[serde(rename = "type")]
    pub level: FlashLevel,
    pub message: String,
}

/// JSON acknowledgment of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub close_modal: bool,
    pub flashes: Vec<FlashMessage>,
}

/// Apply a batch: add first, then remove.
pub fn apply_batch(actions: &dyn SegmentActions, request: &BatchSegmentRequest) -> BatchResponse {
    let contact_ids = request.contact_ids();

    let flash = if contact_ids.is_empty() {
        FlashMessage {
            level: FlashLevel::Error,
            message: "No ids set.".to_string(),
        }
    } else {
        if !request.add.is_empty() {
            actions.add_contacts(&contact_ids, &request.add);
        }
        if !request.remove.is_empty() {
            actions.remove_contacts(&contact_ids, &request.remove);
        }
        info!(
            "Batch segment update: {} contact(s), +{:?} -{:?}",
            contact_ids.len(),
            request.add,
            request.remove
        );
        FlashMessage {
            level: FlashLevel::Notice,
            message: format!("{} contacts affected", contact_ids.len()),
        }
    };

    BatchResponse {
        close_modal: true,
        flashes: vec![flash],
    }
}

/// Model behind the batch form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchView {
    pub action: String,
    /// Segment name → id
    pub items: BTreeMap<String, u64>,
}

#[must_use]
pub fn batch_view(actions: &dyn SegmentActions) -> BatchView {
    BatchView {
        action: BATCH_SET_ROUTE.to_string(),
        items: actions
            .user_lists()
            .into_iter()
            .map(|s| (s.name, s.id))
            .collect(),
    }
}

#[derive(Debug, Clone, Default)]
struct Segment {
    name: String,
    members: BTreeSet<u64>,
}

/// Thread-safe in-memory segment store.
#[derive(Debug, Default)]
pub struct SegmentBook {
    segments: RwLock<BTreeMap<u64, Segment>>,
}

impl SegmentBook {
    #[must_use]
    pub fn new(segments: impl IntoIterator<Item = SegmentSummary>) -> Self {
        let segments = segments
            .into_iter()
            .map(|s| {
                (
                    s.id,
                    Segment {
                        name: s.name,
                        members: BTreeSet::new(),
                    },
                )
            })
            .collect();
        Self {
            segments: RwLock::new(segments),
        }
    }

    /// Members of a segment; `None` if the segment does not exist.
    #[must_use]
    pub fn members(&self, segment_id: u64) -> Option<Vec<u64>> {
        self.segments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&segment_id)
            .map(|s| s.members.iter().copied().collect())
    }
}

impl SegmentActions for SegmentBook {
    fn add_contacts(&self, contact_ids: &[u64], segment_ids: &[u64]) {
        let mut segments = self.segments.write().unwrap_or_else(PoisonError::into_inner);
        for id in segment_ids {
            match segments.get_mut(id) {
                Some(segment) => segment.members.extend(contact_ids),
                None => debug!("Unknown segment {id}, skipping"),
            }
        }
    }

    fn remove_contacts(&self, contact_ids: &[u64], segment_ids: &[u64]) {
        let mut segments = self.segments.write().unwrap_or_else(PoisonError::into_inner);
        for id in segment_ids {
            if let Some(segment) = segments.get_mut(id) {
                for contact in contact_ids {
                    segment.members.remove(contact);
                }
            }
        }
    }

    fn user_lists(&self) -> Vec<SegmentSummary> {
        self.segments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, s)| SegmentSummary {
                id: *id,
                name: s.name.clone(),
            })
            .collect()
    }
}
