//! Hierarchical consumer group identifiers
//!
//! A group name follows the convention `platform.service.task`, optionally
//! suffixed with the event being listened to: `platform.service.task-on-event`.
//! Groups coordinate partition assignment among the nodes of a clustered
//! service so each record is processed by a single member.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// A logical grouping of consumers committing offsets in a coordinated manner.
///
/// Immutable once constructed; `platform`, `service` and `task` are always
/// non-empty. Parsing accepts the canonical forms plus the legacy
/// four-segment spelling `platform.service.task.event`, which renders back
/// in the `-on-` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerGroup {
    platform: String,
    service: String,
    task: String,
    event: Option<String>,
}

impl ConsumerGroup {
    /// Creates a group from its required fields.
    pub fn new(
        platform: impl Into<String>,
        service: impl Into<String>,
        task: impl Into<String>,
    ) -> Result<Self, StreamError> {
        let group = Self {
            platform: platform.into(),
            service: service.into(),
            task: task.into(),
            event: None,
        };
        if group.platform.is_empty() || group.service.is_empty() || group.task.is_empty() {
            return Err(StreamError::InvalidGroup(
                "consumer group is missing a required field".to_string(),
            ));
        }
        Ok(group)
    }

    /// Creates a group bound to the event it is listening to.
    pub fn with_event(
        platform: impl Into<String>,
        service: impl Into<String>,
        task: impl Into<String>,
        event: impl Into<String>,
    ) -> Result<Self, StreamError> {
        let mut group = Self::new(platform, service, task)?;
        let event = event.into();
        if !event.is_empty() {
            group.event = Some(event);
        }
        Ok(group)
    }

    /// Platform segment of the group name.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Service segment of the group name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Task segment of the group name.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Event the group is listening to, if any.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }
}

impl fmt::Display for ConsumerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            Some(event) => write!(
                f,
                "{}.{}.{}-on-{}",
                self.platform, self.service, self.task, event
            ),
            None => write!(f, "{}.{}.{}", self.platform, self.service, self.task),
        }
    }
}

impl FromStr for ConsumerGroup {
    type Err = StreamError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(StreamError::InvalidGroup(format!(
                "invalid consumer group name '{name}'"
            )));
        }

        // The event is either a fourth dot segment or an `-on-<event>`
        // suffix on the task segment.
        let (task, event) = match parts.get(3) {
            Some(event) if !event.is_empty() => (parts[2], Some((*event).to_string())),
            Some(_) => (parts[2], None),
            None => match parts[2].split_once("-on-") {
                Some((task, event)) if !event.is_empty() => (task, Some(event.to_string())),
                _ => (parts[2], None),
            },
        };

        let mut group = Self::new(parts[0], parts[1], task)?;
        group.event = event;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_rejects_empty_fields() {
        assert!(ConsumerGroup::new("", "svc", "task").is_err());
        assert!(ConsumerGroup::new("plat", "", "task").is_err());
        assert!(ConsumerGroup::new("plat", "svc", "").is_err());
        assert!(ConsumerGroup::new("plat", "svc", "task").is_ok());
    }

    #[test]
    fn test_parse_three_segments() {
        let group: ConsumerGroup = "a.b.c".parse().unwrap();
        assert_eq!(group.platform(), "a");
        assert_eq!(group.service(), "b");
        assert_eq!(group.task(), "c");
        assert_eq!(group.event(), None);
    }

    #[test]
    fn test_parse_rejects_short_names() {
        assert!("a.b".parse::<ConsumerGroup>().is_err());
        assert!("a".parse::<ConsumerGroup>().is_err());
        assert!("".parse::<ConsumerGroup>().is_err());
    }

    #[test]
    fn test_parse_fourth_segment_becomes_event() {
        let group: ConsumerGroup = "a.b.c.d".parse().unwrap();
        assert_eq!(group.platform(), "a");
        assert_eq!(group.service(), "b");
        assert_eq!(group.task(), "c");
        assert_eq!(group.event(), Some("d"));
        // The canonical rendering uses the `-on-` suffix form.
        assert_eq!(group.to_string(), "a.b.c-on-d");
    }

    #[test]
    fn test_parse_rejects_long_names() {
        assert!("a.b.c.d.e".parse::<ConsumerGroup>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let plain = ConsumerGroup::new("acme", "billing", "invoice-sync").unwrap();
        let parsed: ConsumerGroup = plain.to_string().parse().unwrap();
        assert_eq!(parsed, plain);

        let eventful =
            ConsumerGroup::with_event("acme", "billing", "notify", "invoice-paid").unwrap();
        assert_eq!(eventful.to_string(), "acme.billing.notify-on-invoice-paid");
        let parsed: ConsumerGroup = eventful.to_string().parse().unwrap();
        assert_eq!(parsed, eventful);
    }

    #[test]
    fn test_equality_is_canonical() {
        let a = ConsumerGroup::new("p", "s", "t").unwrap();
        let b: ConsumerGroup = "p.s.t".parse().unwrap();
        assert_eq!(a, b);

        let c = ConsumerGroup::with_event("p", "s", "t", "e").unwrap();
        assert_ne!(a, c);
    }
}
