//! Types and decoding for the events watch stream
//!
//! A watch returns newline separated JSON envelopes of the form
//! `{"type": "ADDED", "object": {...}}`. The object is usually the watched
//! resource, but the apiserver sends a `Status` instead when something goes
//! wrong on its side, and a slimmed down object carrying only a
//! `resourceVersion` for bookmarks. [`Payload`] keeps those apart.
use futures::{AsyncBufRead, AsyncBufReadExt, Stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::{api::WatchParams, Resource};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{Error, Result};

/// The `type` of a watch envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationKind {
    /// Resource was added
    Added,
    /// Resource was modified
    Modified,
    /// Resource was deleted
    Deleted,
    /// Progress marker carrying only a resource version
    Bookmark,
    /// There was some kind of error
    Error,
}

/// What a watch envelope carried
#[derive(Clone, Debug)]
pub enum Payload<E> {
    /// The watched resource
    Event(E),
    /// A status reported by the apiserver in place of a resource
    Status(Status),
    /// The slimmed down object of a bookmark
    Bookmark {
        /// The only field bookmarks can be relied upon to have
        resource_version: String,
    },
}

/// A single notification from a watch
#[derive(Clone, Debug)]
pub struct Notification<E> {
    /// The envelope's `type`
    pub kind: NotificationKind,
    /// The envelope's `object`
    pub payload: Payload<E>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: NotificationKind,
    object: Value,
}

impl<E: DeserializeOwned> Notification<E> {
    /// Decode one line of a watch stream
    ///
    /// The payload variant is picked from the object itself: anything of kind
    /// `Status` is a [`Payload::Status`] regardless of the envelope type.
    pub fn decode(line: &str) -> Result<Self> {
        let decode_err = |source: serde_json::Error| Error::Decode {
            line: line.to_string(),
            source,
        };
        let Envelope { kind, object } = serde_json::from_str(line).map_err(decode_err)?;
        let payload = if object.get("kind").and_then(Value::as_str) == Some("Status") {
            Payload::Status(serde_json::from_value(object).map_err(decode_err)?)
        } else if kind == NotificationKind::Bookmark {
            let resource_version = object
                .pointer("/metadata/resourceVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Payload::Bookmark { resource_version }
        } else {
            Payload::Event(serde_json::from_value(object).map_err(decode_err)?)
        };
        Ok(Self { kind, payload })
    }
}

/// Build the watch request for `E` in `namespace`
///
/// The resource version is left empty so the watch starts at the most recent
/// state instead of replaying a cached snapshot as `ADDED`.
pub fn watch_request<E>(namespace: &str) -> Result<http::Request<Vec<u8>>>
where
    E: Resource<DynamicType = ()>,
{
    let url = E::url_path(&(), Some(namespace));
    kube::core::Request::new(url)
        .watch(&WatchParams::default(), "")
        .map_err(Error::BuildRequest)
}

/// Decode a raw watch body into notifications, one per non-empty line
pub fn decode_lines<E, R>(reader: R) -> impl Stream<Item = Result<Notification<E>>>
where
    E: DeserializeOwned,
    R: AsyncBufRead,
{
    reader.lines().filter_map(|line| async move {
        match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(Notification::decode(&line)),
            Err(err) => Some(Err(Error::ReadStream(err))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{io::Cursor, TryStreamExt};
    use k8s_openapi::api::{core::v1::Event as CoreEvent, events::v1::Event as EventsV1Event};
    use serde_json::json;

    fn line(value: Value) -> String {
        serde_json::to_string(&value).unwrap()
    }

    fn core_event(reason: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": { "name": "k8s-event-lab.17c", "namespace": "default" },
            "involvedObject": { "kind": "ConfigMap", "name": "k8s-event-lab" },
            "reason": reason,
            "message": "Event Message 0",
        })
    }

    #[test]
    fn events_decode_into_event_payloads() {
        let n: Notification<CoreEvent> =
            Notification::decode(&line(json!({ "type": "ADDED", "object": core_event("Testing") }))).unwrap();
        assert_eq!(n.kind, NotificationKind::Added);
        match n.payload {
            Payload::Event(ev) => assert_eq!(ev.reason.as_deref(), Some("Testing")),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn status_objects_decode_into_status_payloads() {
        let status = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "too old resource version: 1 (2)",
            "reason": "Expired",
            "code": 410
        });
        let n: Notification<CoreEvent> =
            Notification::decode(&line(json!({ "type": "ERROR", "object": status }))).unwrap();
        assert_eq!(n.kind, NotificationKind::Error);
        match n.payload {
            Payload::Status(s) => {
                assert_eq!(s.code, Some(410));
                assert_eq!(s.reason.as_deref(), Some("Expired"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn bookmarks_only_keep_the_resource_version() {
        let bookmark = json!({
            "kind": "Event",
            "apiVersion": "events.k8s.io/v1",
            "metadata": { "resourceVersion": "4711" }
        });
        let n: Notification<EventsV1Event> =
            Notification::decode(&line(json!({ "type": "BOOKMARK", "object": bookmark }))).unwrap();
        assert_eq!(n.kind, NotificationKind::Bookmark);
        match n.payload {
            Payload::Bookmark { resource_version } => assert_eq!(resource_version, "4711"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = Notification::<CoreEvent>::decode("{\"type\":\"ADDED\"").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        let err = Notification::<CoreEvent>::decode(r#"{"type":"SYNC","object":{}}"#).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn watch_requests_target_the_flavour_path() {
        let req = watch_request::<CoreEvent>("default").unwrap();
        assert_eq!(req.method(), http::Method::GET);
        assert_eq!(req.uri().path(), "/api/v1/namespaces/default/events");
        let query = req.uri().query().unwrap();
        assert!(query.contains("watch=true"));
        assert!(query.contains("resourceVersion=&"), "unexpected query {query}");

        let req = watch_request::<EventsV1Event>("lab").unwrap();
        assert_eq!(req.uri().path(), "/apis/events.k8s.io/v1/namespaces/lab/events");
    }

    #[tokio::test]
    async fn lines_are_decoded_in_order_skipping_blanks() {
        let body = format!(
            "{}\n\n{}\n",
            line(json!({ "type": "ADDED", "object": core_event("Testing") })),
            line(json!({ "type": "MODIFIED", "object": core_event("Other") })),
        );
        let notifications: Vec<Notification<CoreEvent>> =
            decode_lines(Cursor::new(body.into_bytes())).try_collect().await.unwrap();
        let kinds: Vec<_> = notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Added, NotificationKind::Modified]);
    }
}
