//! Typed tracker events.
//!
//! On the wire a tracker snapshot carries an `event` string and an opaque
//! `event_payload` object. `TrackerEvent` is the typed view keyed by the event
//! string. Payloads that do not match the shape of their tag fall back to
//! `Unrecognized` rather than failing, so an upstream schema change degrades to
//! an untyped log line instead of a dropped event.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::frame::TrackerSnapshot;

pub const LIMB_OUTSIDE_BED: &str = "limb_outside_bed";
pub const BED_EXIT: &str = "bed_exit";
pub const BED_ENTRY: &str = "bed_entry";
pub const DOOR_CROSSED: &str = "door_crossed";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LimbOutsideBed {
    #[serde(default)]
    pub person_id: Option<i64>,
    #[serde(default)]
    pub keypoints_outside: Vec<String>,
    #[serde(default)]
    pub distance_cm: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub imov: Option<f64>,
}

/// Payload shared by the occupancy transitions (bed exit/entry, door crossing).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonTransition {
    #[serde(default)]
    pub person_id: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub imov: Option<f64>,
}

/// Serializes back to the wire shape: `{"event": ..., "event_payload": ...}`.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    LimbOutsideBed(LimbOutsideBed),
    BedExit(PersonTransition),
    BedEntry(PersonTransition),
    DoorCrossed(PersonTransition),
    Unrecognized {
        event: String,
        event_payload: Option<Value>,
    },
}

impl Serialize for TrackerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("event", self.name())?;
        match self {
            TrackerEvent::LimbOutsideBed(p) => map.serialize_entry("event_payload", p)?,
            TrackerEvent::BedExit(p) | TrackerEvent::BedEntry(p) | TrackerEvent::DoorCrossed(p) => {
                map.serialize_entry("event_payload", p)?
            }
            TrackerEvent::Unrecognized { event_payload, .. } => {
                map.serialize_entry("event_payload", event_payload)?
            }
        }
        map.end()
    }
}

impl TrackerEvent {
    /// Build the typed event for `name`. Never fails.
    pub fn from_parts(name: &str, payload: Option<&Value>) -> Self {
        let normalized = name.trim().to_lowercase();
        let parsed = match normalized.as_str() {
            LIMB_OUTSIDE_BED => parse_payload(payload).map(TrackerEvent::LimbOutsideBed),
            BED_EXIT => parse_payload(payload).map(TrackerEvent::BedExit),
            BED_ENTRY => parse_payload(payload).map(TrackerEvent::BedEntry),
            DOOR_CROSSED => parse_payload(payload).map(TrackerEvent::DoorCrossed),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            log::debug!("tracker event '{}' kept as unrecognized", name);
            TrackerEvent::Unrecognized {
                event: name.to_string(),
                event_payload: payload.cloned(),
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            TrackerEvent::LimbOutsideBed(_) => LIMB_OUTSIDE_BED,
            TrackerEvent::BedExit(_) => BED_EXIT,
            TrackerEvent::BedEntry(_) => BED_ENTRY,
            TrackerEvent::DoorCrossed(_) => DOOR_CROSSED,
            TrackerEvent::Unrecognized { event, .. } => event,
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            TrackerEvent::LimbOutsideBed(_) | TrackerEvent::BedExit(_) => EventSeverity::Critical,
            TrackerEvent::BedEntry(_) => EventSeverity::Info,
            TrackerEvent::DoorCrossed(_) => EventSeverity::Notice,
            TrackerEvent::Unrecognized { .. } => EventSeverity::Unknown,
        }
    }

    pub fn person_id(&self) -> Option<i64> {
        match self {
            TrackerEvent::LimbOutsideBed(p) => p.person_id,
            TrackerEvent::BedExit(p) | TrackerEvent::BedEntry(p) | TrackerEvent::DoorCrossed(p) => {
                p.person_id
            }
            TrackerEvent::Unrecognized { event_payload, .. } => event_payload
                .as_ref()
                .and_then(|p| p.get("person_id"))
                .and_then(Value::as_i64),
        }
    }

    /// One-line detail string for the event log, e.g.
    /// `keypoints: left_hand | distance: 42cm | confidence: 0.91`.
    pub fn summary(&self) -> String {
        let mut details = Vec::new();
        match self {
            TrackerEvent::LimbOutsideBed(p) => {
                if !p.keypoints_outside.is_empty() {
                    details.push(format!("keypoints: {}", p.keypoints_outside.join(", ")));
                }
                if let Some(distance) = p.distance_cm {
                    details.push(format!("distance: {:.0}cm", distance));
                }
                if let Some(conf) = p.confidence {
                    details.push(format!("confidence: {:.2}", conf));
                }
                if let Some(imov) = p.imov {
                    details.push(format!("imov: {:.2}", imov));
                }
            }
            TrackerEvent::BedExit(p) | TrackerEvent::BedEntry(p) | TrackerEvent::DoorCrossed(p) => {
                if let Some(conf) = p.confidence {
                    details.push(format!("confidence: {:.2}", conf));
                }
                if let Some(imov) = p.imov {
                    details.push(format!("imov: {:.2}", imov));
                }
            }
            TrackerEvent::Unrecognized { event_payload, .. } => {
                let payload = event_payload.as_ref();
                if let Some(conf) = payload
                    .and_then(|p| p.get("confidence"))
                    .and_then(Value::as_f64)
                {
                    details.push(format!("confidence: {:.2}", conf));
                }
                if let Some(imov) = payload.and_then(|p| p.get("imov")).and_then(Value::as_f64) {
                    details.push(format!("imov: {:.2}", imov));
                }
            }
        }
        details.join(" | ")
    }
}

fn parse_payload<T: for<'de> Deserialize<'de> + Default>(payload: Option<&Value>) -> Option<T> {
    match payload {
        None | Some(Value::Null) => Some(T::default()),
        Some(value) => serde_json::from_value(value.clone()).ok(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Unknown,
    Notice,
    Info,
    Critical,
}

/// Display row for the event log.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventLogLine {
    pub timestamp: u64,
    pub name: String,
    pub severity: EventSeverity,
    pub person_id: Option<i64>,
    pub details: String,
}

/// Event log rows, newest first.
pub fn event_log_lines<'a, I>(history: I) -> Vec<EventLogLine>
where
    I: DoubleEndedIterator<Item = &'a TrackerSnapshot>,
{
    history
        .rev()
        .filter_map(|tracker| {
            let event = tracker.typed_event()?;
            Some(EventLogLine {
                timestamp: tracker.timestamp,
                name: event.name().to_string(),
                severity: event.severity(),
                person_id: event.person_id(),
                details: event.summary(),
            })
        })
        .collect()
}
