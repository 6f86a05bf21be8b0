//! Watching events and printing the interesting ones
use std::io::Write;

use futures::StreamExt;
use k8s_openapi::{
    api::{core::v1::Event as CoreEvent, events::v1::Event as EventsV1Event},
    apimachinery::pkg::apis::meta::v1::{MicroTime, Status, Time},
    chrono::SecondsFormat,
};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    notification::{decode_lines, watch_request},
    Error, EventsApi, LabConfig, Notification, NotificationKind, Payload, Result,
};

const NONE: &str = "<none>";

/// An event type the consumer knows how to filter and print
pub trait LabEvent: Resource<DynamicType = ()> + DeserializeOwned {
    /// The machine-readable reason
    fn reason(&self) -> Option<&str>;

    /// Everything printed after the reason for a matching event
    fn summary(&self) -> String;
}

impl LabEvent for CoreEvent {
    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// `message firstTimestamp lastTimestamp count`
    fn summary(&self) -> String {
        [
            self.message.clone().unwrap_or_else(|| NONE.into()),
            time(self.first_timestamp.as_ref()),
            time(self.last_timestamp.as_ref()),
            self.count.map_or_else(|| NONE.into(), |c| c.to_string()),
        ]
        .join(" ")
    }
}

impl LabEvent for EventsV1Event {
    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// `note eventTime`, followed by `lastObservedTime count` for a series
    fn summary(&self) -> String {
        let mut fields = vec![
            self.note.clone().unwrap_or_else(|| NONE.into()),
            micro_time(self.event_time.as_ref()),
        ];
        if let Some(series) = &self.series {
            fields.push(micro_time(Some(&series.last_observed_time)));
            fields.push(series.count.to_string());
        }
        fields.join(" ")
    }
}

fn time(t: Option<&Time>) -> String {
    t.map_or_else(|| NONE.into(), |t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn micro_time(t: Option<&MicroTime>) -> String {
    t.map_or_else(|| NONE.into(), |t| t.0.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// `code reason message details` of a status, details as compact JSON
pub fn render_status(status: &Status) -> String {
    let details = status
        .details
        .as_ref()
        .and_then(|d| serde_json::to_string(d).ok())
        .unwrap_or_else(|| NONE.into());
    format!(
        "{} {} {} {}",
        status.code.map_or_else(|| NONE.into(), |c| c.to_string()),
        status.reason.as_deref().unwrap_or(NONE),
        status.message.as_deref().unwrap_or(NONE),
        details
    )
}

/// The line to print for a notification, if any
///
/// Statuses are always printed. Bookmarks and error notifications that do
/// not carry a status print nothing. Events print only when their reason is
/// exactly `reason`.
pub fn render<E: LabEvent>(notification: &Notification<E>, reason: &str) -> Option<String> {
    match (&notification.kind, &notification.payload) {
        (_, Payload::Status(status)) => Some(render_status(status)),
        (NotificationKind::Bookmark | NotificationKind::Error, _) => None,
        (_, Payload::Bookmark { .. }) => None,
        (_, Payload::Event(ev)) if ev.reason() == Some(reason) => Some(format!("{} {}", reason, ev.summary())),
        (_, Payload::Event(_)) => None,
    }
}

/// Watches events in one namespace and prints those with a given reason
pub struct Consumer {
    client: Client,
    namespace: String,
    reason: String,
    api: EventsApi,
}

impl Consumer {
    /// A consumer for `reason` events in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>, reason: impl Into<String>, api: EventsApi) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            reason: reason.into(),
            api,
        }
    }

    /// A consumer for the event namespace and reason of `config`
    pub fn from_config(client: Client, config: &LabConfig) -> Self {
        Self::new(
            client,
            config.event_namespace.clone(),
            config.reason.clone(),
            config.api,
        )
    }

    /// Consume until the apiserver closes the watch, writing one line per match
    ///
    /// Lines that cannot be decoded are logged and skipped; errors reading the
    /// stream end the run.
    pub async fn run<W: Write>(self, out: W) -> Result<()> {
        match self.api {
            EventsApi::Core => self.consume::<CoreEvent, W>(out).await,
            EventsApi::Events => self.consume::<EventsV1Event, W>(out).await,
        }
    }

    async fn consume<E: LabEvent, W: Write>(&self, mut out: W) -> Result<()> {
        let request = watch_request::<E>(&self.namespace)?;
        info!(namespace = %self.namespace, reason = %self.reason, api = %self.api, "watching events");
        let reader = self.client.request_stream(request).await?;
        let notifications = decode_lines::<E, _>(reader);
        futures::pin_mut!(notifications);

        while let Some(notification) = notifications.next().await {
            let notification = match notification {
                Ok(n) => n,
                Err(err @ Error::Decode { .. }) => {
                    warn!(error = %err, "skipping notification");
                    continue;
                }
                Err(err) => return Err(err),
            };
            debug!(kind = ?notification.kind, "notification");
            if let Some(line) = render(&notification, &self.reason) {
                writeln!(out, "{line}").map_err(Error::Output)?;
            }
        }
        info!("watch closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn core(kind: NotificationKind, value: serde_json::Value) -> Notification<CoreEvent> {
        Notification {
            kind,
            payload: Payload::Event(serde_json::from_value(value).unwrap()),
        }
    }

    fn core_event(reason: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": { "name": "k8s-event-lab.17c" },
            "involvedObject": { "kind": "ConfigMap", "name": "k8s-event-lab" },
            "reason": reason,
            "message": "Event Message 3",
            "firstTimestamp": "2024-05-01T10:00:00Z",
            "lastTimestamp": "2024-05-01T10:00:02Z",
            "count": 3
        })
    }

    fn status() -> Status {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "message": "too old resource version",
            "reason": "Expired",
            "code": 410,
            "details": { "name": "k8s-event-lab", "kind": "events" }
        }))
        .unwrap()
    }

    #[test]
    fn matching_core_events_print_timing_and_count() {
        let n = core(NotificationKind::Added, core_event("Testing"));
        assert_eq!(
            render(&n, "Testing").unwrap(),
            "Testing Event Message 3 2024-05-01T10:00:00Z 2024-05-01T10:00:02Z 3"
        );
    }

    #[test]
    fn other_reasons_print_nothing() {
        for kind in [NotificationKind::Added, NotificationKind::Modified, NotificationKind::Deleted] {
            assert_eq!(render(&core(kind, core_event("Other")), "Testing"), None);
        }
        // match is exact
        assert_eq!(render(&core(NotificationKind::Added, core_event("testing")), "Testing"), None);
    }

    #[test]
    fn bookmark_and_error_kinds_never_print_event_fields() {
        for kind in [NotificationKind::Bookmark, NotificationKind::Error] {
            assert_eq!(render(&core(kind, core_event("Testing")), "Testing"), None);
        }
        let bookmark: Notification<CoreEvent> = Notification {
            kind: NotificationKind::Bookmark,
            payload: Payload::Bookmark {
                resource_version: "12".into(),
            },
        };
        assert_eq!(render(&bookmark, "Testing"), None);
    }

    #[test]
    fn statuses_print_code_reason_message_details_unfiltered() {
        for kind in [NotificationKind::Error, NotificationKind::Added] {
            let n: Notification<CoreEvent> = Notification {
                kind,
                payload: Payload::Status(status()),
            };
            assert_eq!(
                render(&n, "Testing").unwrap(),
                r#"410 Expired too old resource version {"kind":"events","name":"k8s-event-lab"}"#
            );
            assert!(render(&n, "SomethingElse").is_some());
        }
    }

    #[test]
    fn empty_statuses_render_placeholders() {
        let s: Status = serde_json::from_value(json!({ "apiVersion": "v1", "kind": "Status", "metadata": {} })).unwrap();
        assert_eq!(render_status(&s), "<none> <none> <none> <none>");
    }

    #[test]
    fn events_v1_print_series_when_present() {
        let ev: EventsV1Event = serde_json::from_value(json!({
            "apiVersion": "events.k8s.io/v1",
            "kind": "Event",
            "metadata": { "name": "k8s-event-lab.17c" },
            "eventTime": "2024-05-01T10:00:00.000000Z",
            "reason": "Testing",
            "note": "Event Message 0",
            "series": { "count": 4, "lastObservedTime": "2024-05-01T10:00:03.500000Z" }
        }))
        .unwrap();
        let n = Notification {
            kind: NotificationKind::Modified,
            payload: Payload::Event(ev.clone()),
        };
        assert_eq!(
            render(&n, "Testing").unwrap(),
            "Testing Event Message 0 2024-05-01T10:00:00.000000Z 2024-05-01T10:00:03.500000Z 4"
        );

        let single = EventsV1Event { series: None, ..ev };
        let n = Notification {
            kind: NotificationKind::Added,
            payload: Payload::Event(single),
        };
        assert_eq!(
            render(&n, "Testing").unwrap(),
            "Testing Event Message 0 2024-05-01T10:00:00.000000Z"
        );
    }
}
