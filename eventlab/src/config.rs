//! Process-wide lab settings
use std::{fmt, str::FromStr, time::Duration};

/// The event severity or type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventType {
    /// An event took place - nothing to worry about.
    Normal,
    /// Something is not working as expected - it might be worth to have a look.
    Warning,
}

impl EventType {
    /// The value used for the `type` field on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which flavour of the Events API to speak
///
/// Both flavours are served from the same storage, so a consumer on one
/// flavour sees events published through the other.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum EventsApi {
    /// `core/v1` events, served under `/api/v1`
    #[default]
    Core,
    /// `events.k8s.io/v1` events, served under `/apis/events.k8s.io/v1`
    Events,
}

impl FromStr for EventsApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" | "v1" => Ok(EventsApi::Core),
            "events" | "events.k8s.io" | "events.k8s.io/v1" => Ok(EventsApi::Events),
            other => Err(format!("unknown events api {other:?}, expected one of: core, events")),
        }
    }
}

impl fmt::Display for EventsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventsApi::Core => f.write_str("core"),
            EventsApi::Events => f.write_str("events"),
        }
    }
}

/// Settings shared by the producer and the consumer
///
/// [`LabConfig::default`] carries the values the lab binaries run with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabConfig {
    /// Namespace of the target `ConfigMap`
    pub target_namespace: String,
    /// Name of the target `ConfigMap`
    pub target_name: String,
    /// Namespace the consumer watches
    pub event_namespace: String,
    /// Reason published by the producer and matched by the consumer
    pub reason: String,
    /// Action published by the producer
    pub action: String,
    /// Severity published by the producer
    pub event_type: EventType,
    /// Message prefix, the tick sequence number is appended
    pub message: String,
    /// Component the events are reported by
    pub component: String,
    /// Time between two emissions
    pub interval: Duration,
    /// Upper bound for the cleanup on shutdown
    pub cleanup_timeout: Duration,
    /// Events API flavour
    pub api: EventsApi,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            target_namespace: "default".into(),
            target_name: "k8s-event-lab".into(),
            event_namespace: "default".into(),
            reason: "Testing".into(),
            action: "NOP".into(),
            event_type: EventType::Warning,
            message: "Event Message".into(),
            component: "k8s.io/event-lab".into(),
            interval: Duration::from_secs(1),
            cleanup_timeout: Duration::from_secs(10),
            api: EventsApi::default(),
        }
    }
}

impl LabConfig {
    /// Select the Events API flavour
    #[must_use]
    pub fn api(mut self, api: EventsApi) -> Self {
        self.api = api;
        self
    }

    /// Change the emission interval
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The message published on tick `seq`
    pub fn message_for(&self, seq: u64) -> String {
        format!("{} {}", self.message, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_lab() {
        let cfg = LabConfig::default();
        assert_eq!(cfg.target_namespace, "default");
        assert_eq!(cfg.target_name, "k8s-event-lab");
        assert_eq!(cfg.reason, "Testing");
        assert_eq!(cfg.event_type, EventType::Warning);
        assert_eq!(cfg.interval, Duration::from_secs(1));
        assert_eq!(cfg.api, EventsApi::Core);
    }

    #[test]
    fn messages_carry_the_sequence() {
        let cfg = LabConfig::default();
        assert_eq!(cfg.message_for(0), "Event Message 0");
        assert_eq!(cfg.message_for(12), "Event Message 12");
    }

    #[test]
    fn events_api_parses() {
        assert_eq!("core".parse::<EventsApi>().unwrap(), EventsApi::Core);
        assert_eq!("events".parse::<EventsApi>().unwrap(), EventsApi::Events);
        assert_eq!("events.k8s.io/v1".parse::<EventsApi>().unwrap(), EventsApi::Events);
        assert!("apps".parse::<EventsApi>().is_err());
        assert_eq!(EventsApi::Events.to_string(), "events");
    }
}
