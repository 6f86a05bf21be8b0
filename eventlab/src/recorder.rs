//! Publishes events for objects
//!
//! A [`Recorder`] speaks one flavour of the Events API (see [`EventsApi`]) and
//! coalesces repeated events client side: the first occurrence is created,
//! later ones with the same object, type, reason and action bump the
//! occurrence count of the record already stored by the apiserver.
//!
//! The series cache is bounded both in size and in time. A series not seen
//! for [`SERIES_WINDOW`] starts over with a fresh event.
use std::{collections::HashMap, sync::Arc, time::Duration};

use k8s_openapi::{
    api::{
        core::v1::{Event as CoreEvent, EventSource, ObjectReference},
        events::v1::Event as EventsV1Event,
    },
    apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time},
    chrono::{DateTime, TimeDelta, Utc},
};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Client,
};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{EventType, EventsApi, Result};

/// How long a series stays open after its last occurrence
pub const SERIES_WINDOW: Duration = Duration::from_secs(6 * 60);

/// Default upper bound on the number of series a [`Recorder`] tracks
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Required information to publish a new event via [`Recorder::publish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    /// The action that was taken (either successfully or unsuccessfully) against
    /// the referenced object.
    ///
    /// `action` must be machine-readable.
    pub action: String,
    /// The reason explaining why the `action` was taken.
    ///
    /// `reason` is a short, machine-readable token.
    pub reason: String,
    /// A optional description of the status of the `action`.
    ///
    /// `note` must be human-readable. It becomes `message` on `core/v1` events.
    pub note: Option<String>,
    /// The event severity.
    pub event_type: EventType,
}

/// Details about the event emitter.
///
/// ```rust
/// use eventlab::Reporter;
///
/// let reporter = Reporter {
///     controller: "k8s.io/event-lab".into(),
///     instance: Some("lab-host".into()),
/// };
/// assert_eq!(reporter.instance(), "lab-host");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reporter {
    /// The name of the component publishing the event.
    ///
    /// Mapped to `source.component` and `reportingComponent` on `core/v1`
    /// events and to `reportingController` on `events.k8s.io/v1` events.
    pub controller: String,
    /// The instance of the component publishing the event.
    ///
    /// Mapped to `reportingInstance`. Falls back to `controller` when unset.
    pub instance: Option<String>,
}

impl Reporter {
    /// A reporter for `controller` running on this host
    pub fn new(controller: impl Into<String>) -> Self {
        let instance = hostname::get().ok().and_then(|h| h.into_string().ok());
        Self {
            controller: controller.into(),
            instance,
        }
    }

    /// The reporting instance sent to the apiserver
    pub fn instance(&self) -> &str {
        self.instance.as_deref().unwrap_or(&self.controller)
    }
}

/// Cache key: two events with equal keys belong to the same occurrence series
///
/// The note is left out, a series keeps the latest one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct EventKey {
    uid: Option<String>,
    kind: Option<String>,
    namespace: Option<String>,
    name: Option<String>,
    event_type: EventType,
    reason: String,
    action: String,
}

impl EventKey {
    fn new(ev: &NewEvent, reference: &ObjectReference) -> Self {
        Self {
            uid: reference.uid.clone(),
            kind: reference.kind.clone(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
            event_type: ev.event_type,
            reason: ev.reason.clone(),
            action: ev.action.clone(),
        }
    }
}

/// What the apiserver holds for a cached series
#[derive(Clone, Debug)]
struct Recorded {
    name: String,
    namespace: Option<String>,
    count: i32,
    last_seen: DateTime<Utc>,
}

impl Recorded {
    fn is_quiet(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen >= TimeDelta::seconds(SERIES_WINDOW.as_secs() as i64)
    }
}

/// Drop series that went quiet, then the oldest ones until there is room for one more
fn prune(cache: &mut HashMap<EventKey, Recorded>, now: DateTime<Utc>, capacity: usize) {
    cache.retain(|_, recorded| !recorded.is_quiet(now));
    while cache.len() >= capacity {
        let oldest = cache
            .iter()
            .min_by_key(|(_, recorded)| recorded.last_seen)
            .map(|(key, _)| key.clone());
        let Some(key) = oldest else { break };
        cache.remove(&key);
    }
}

/// A publisher abstraction to emit Kubernetes' events.
///
/// Events are created in the namespace of the [`ObjectReference`] they are
/// published for. Make sure the client has `create` and `patch` permissions on
/// the `events` resource of the chosen API group in that namespace, and
/// `deletecollection` if [`Recorder::delete_for`] is used.
///
/// Events attached to an object show up in the `Events` section of
/// `kubectl describe` for that object.
#[derive(Clone)]
pub struct Recorder {
    client: Client,
    reporter: Reporter,
    api: EventsApi,
    cache: Arc<Mutex<HashMap<EventKey, Recorded>>>,
    capacity: usize,
}

impl Recorder {
    /// Build a new [`Recorder`] speaking the given flavour of the Events API
    #[must_use]
    pub fn new(client: Client, reporter: Reporter, api: EventsApi) -> Self {
        Self {
            client,
            reporter,
            api,
            cache: Arc::default(),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Track at most `capacity` series, forgetting the least recently seen first
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// The reporter events are attributed to
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Publish a new Kubernetes' event for `reference`.
    ///
    /// An event for the same object, type, reason and action as one published
    /// through this recorder within [`SERIES_WINDOW`] is not created again.
    /// The stored record is patched instead: `count`, `lastTimestamp` and the
    /// latest `message` on `core/v1`, `series` on `events.k8s.io/v1` where the
    /// note is immutable. If the stored record has disappeared in the
    /// meantime, a fresh one is created.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`](crate::Error) if the event is rejected by Kubernetes.
    pub async fn publish(&self, ev: &NewEvent, reference: &ObjectReference) -> Result<()> {
        let key = EventKey::new(ev, reference);
        let now = Utc::now();
        let mut cache = self.cache.lock().await;
        if cache.get(&key).is_some_and(|recorded| recorded.is_quiet(now)) {
            cache.remove(&key);
        }

        if let Some(recorded) = cache.get_mut(&key) {
            let count = recorded.count + 1;
            match self.bump(recorded, ev, count, now).await {
                Ok(()) => {
                    recorded.count = count;
                    recorded.last_seen = now;
                    return Ok(());
                }
                Err(err) if err.is_api_code(404) => {
                    debug!(name = %recorded.name, "cached event is gone, recreating");
                    cache.remove(&key);
                }
                Err(err) => return Err(err),
            }
        }

        let recorded = self.create(ev, reference, now).await?;
        prune(&mut cache, now, self.capacity);
        cache.insert(key, recorded);
        Ok(())
    }

    async fn create(&self, ev: &NewEvent, reference: &ObjectReference, now: DateTime<Utc>) -> Result<Recorded> {
        let namespace = reference.namespace.clone();
        let metadata = ObjectMeta {
            name: Some(event_name(reference, &self.reporter, now)),
            namespace: namespace.clone(),
            ..Default::default()
        };
        let pp = PostParams::default();
        let name = match self.api {
            EventsApi::Core => {
                let event = CoreEvent {
                    metadata,
                    involved_object: reference.clone(),
                    action: Some(ev.action.clone()),
                    reason: Some(ev.reason.clone()),
                    message: ev.note.clone(),
                    type_: Some(ev.event_type.as_str().into()),
                    first_timestamp: Some(Time(now)),
                    last_timestamp: Some(Time(now)),
                    count: Some(1),
                    source: Some(EventSource {
                        component: Some(self.reporter.controller.clone()),
                        host: None,
                    }),
                    reporting_component: Some(self.reporter.controller.clone()),
                    reporting_instance: Some(self.reporter.instance().into()),
                    ..Default::default()
                };
                let created = self.core_api(namespace.as_deref()).create(&pp, &event).await?;
                created.metadata.name
            }
            EventsApi::Events => {
                let event = EventsV1Event {
                    metadata,
                    action: Some(ev.action.clone()),
                    reason: Some(ev.reason.clone()),
                    note: ev.note.clone(),
                    type_: Some(ev.event_type.as_str().into()),
                    event_time: Some(MicroTime(now)),
                    regarding: Some(reference.clone()),
                    related: None,
                    reporting_controller: Some(self.reporter.controller.clone()),
                    reporting_instance: Some(self.reporter.instance().into()),
                    series: None,
                    deprecated_count: None,
                    deprecated_first_timestamp: None,
                    deprecated_last_timestamp: None,
                    deprecated_source: None,
                };
                let created = self.events_api(namespace.as_deref()).create(&pp, &event).await?;
                created.metadata.name
            }
        };
        Ok(Recorded {
            name: name.unwrap_or_default(),
            namespace,
            count: 1,
            last_seen: now,
        })
    }

    async fn bump(&self, recorded: &Recorded, ev: &NewEvent, count: i32, now: DateTime<Utc>) -> Result<()> {
        let pp = PatchParams::default();
        let ns = recorded.namespace.as_deref();
        match self.api {
            EventsApi::Core => {
                let patch = json!({
                    "count": count,
                    "lastTimestamp": Time(now),
                    "message": ev.note,
                });
                self.core_api(ns)
                    .patch(&recorded.name, &pp, &Patch::Merge(patch))
                    .await?;
            }
            EventsApi::Events => {
                let patch = json!({
                    "series": {
                        "count": count,
                        "lastObservedTime": MicroTime(now),
                    }
                });
                self.events_api(ns)
                    .patch(&recorded.name, &pp, &Patch::Merge(patch))
                    .await?;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn cached_series(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Field selector matching this flavour's events about the object with `uid`
    pub fn field_selector(&self, uid: &str) -> String {
        match self.api {
            EventsApi::Core => format!("involvedObject.uid={uid}"),
            EventsApi::Events => format!("regarding.uid={uid}"),
        }
    }

    /// Delete every event in `namespace` about the object with `uid`
    ///
    /// Also forgets any cached series for that object.
    pub async fn delete_for(&self, namespace: &str, uid: &str) -> Result<()> {
        let lp = ListParams::default().fields(&self.field_selector(uid));
        let dp = DeleteParams::default();
        match self.api {
            EventsApi::Core => {
                self.core_api(Some(namespace)).delete_collection(&dp, &lp).await?;
            }
            EventsApi::Events => {
                self.events_api(Some(namespace)).delete_collection(&dp, &lp).await?;
            }
        }
        self.cache
            .lock()
            .await
            .retain(|key, _| key.uid.as_deref() != Some(uid));
        Ok(())
    }

    fn core_api(&self, namespace: Option<&str>) -> Api<CoreEvent> {
        match namespace {
            None => Api::all(self.client.clone()),
            Some(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    fn events_api(&self, namespace: Option<&str>) -> Api<EventsV1Event> {
        match namespace {
            None => Api::all(self.client.clone()),
            Some(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }
}

/// `<object-name>.<hex nanos>`, the naming scheme `kubectl` users expect
fn event_name(reference: &ObjectReference, reporter: &Reporter, now: DateTime<Utc>) -> String {
    let prefix = reference.name.as_deref().unwrap_or(&reporter.controller);
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
    format!("{prefix}.{nanos:x}")
}
