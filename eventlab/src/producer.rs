//! Periodic event emission against a target object
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{LabConfig, NewEvent, Recorder, Reporter, Result, TargetObject};

/// Publishes one event per interval against a freshly created [`TargetObject`]
///
/// ```no_run
/// use eventlab::{LabConfig, Producer};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn wrapper(client: kube::Client) -> eventlab::Result<()> {
/// let shutdown = CancellationToken::new();
/// Producer::new(client, LabConfig::default()).run(shutdown).await?;
/// # Ok(())
/// # }
/// ```
pub struct Producer {
    client: Client,
    config: LabConfig,
    recorder: Recorder,
}

impl Producer {
    /// A producer reporting as `config.component` from this host
    pub fn new(client: Client, config: LabConfig) -> Self {
        let reporter = Reporter::new(config.component.clone());
        let recorder = Recorder::new(client.clone(), reporter, config.api);
        Self {
            client,
            config,
            recorder,
        }
    }

    /// Run until `shutdown` is cancelled
    ///
    /// The target is created first; failing to create it is returned
    /// immediately and nothing is published. After cancellation the events
    /// about the target and then the target itself are removed, see
    /// [`Producer::cleanup`]. Cleanup problems are logged, not returned.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let target = TargetObject::create(self.client.clone(), &self.config).await?;
        let emitted = self.emit_until(&target, &shutdown).await;
        info!(emitted, "stopped emitting events");
        self.cleanup(&target).await;
        Ok(())
    }

    async fn emit_until(&self, target: &TargetObject, shutdown: &CancellationToken) -> u64 {
        let reference = target.reference();
        let period = self.config.interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seq = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.emit(&reference, seq).await;
                    seq += 1;
                }
                () = shutdown.cancelled() => {
                    debug!("shutdown requested");
                    return seq;
                }
            }
        }
    }

    /// Fire and forget: a rejected event is logged and the sequence moves on
    async fn emit(&self, reference: &ObjectReference, seq: u64) {
        let ev = NewEvent {
            action: self.config.action.clone(),
            reason: self.config.reason.clone(),
            note: Some(self.config.message_for(seq)),
            event_type: self.config.event_type,
        };
        match self.recorder.publish(&ev, reference).await {
            Ok(()) => info!(
                seq,
                object = reference.name.as_deref().unwrap_or_default(),
                kind = reference.kind.as_deref().unwrap_or_default(),
                event_type = %ev.event_type,
                reason = %ev.reason,
                message = ev.note.as_deref().unwrap_or_default(),
                "event published"
            ),
            Err(err) => warn!(seq, error = %err, "failed to publish event"),
        }
    }

    /// Best-effort removal of everything a run left in the cluster
    ///
    /// Events about the target go first, then the target. Objects that are
    /// already gone count as removed. The whole cleanup is bounded by
    /// `cleanup_timeout`. Returns whether everything is gone.
    pub async fn cleanup(&self, target: &TargetObject) -> bool {
        let work = async {
            let mut clean = true;
            match self.recorder.delete_for(&target.namespace, &target.uid).await {
                Ok(()) => debug!(uid = %target.uid, "deleted events"),
                Err(err) if err.is_api_code(404) => debug!("no events to delete"),
                Err(err) => {
                    error!(error = %err, "failed to delete events");
                    clean = false;
                }
            }
            match target.delete(self.client.clone()).await {
                Ok(()) => debug!(name = %target.name, "deleted target"),
                Err(err) if err.is_api_code(404) => debug!(name = %target.name, "target already gone"),
                Err(err) => {
                    error!(error = %err, "failed to delete target");
                    clean = false;
                }
            }
            clean
        };
        match time::timeout(self.config.cleanup_timeout, work).await {
            Ok(true) => {
                info!("cleaned up residual resources");
                true
            }
            Ok(false) => false,
            Err(_) => {
                error!(timeout = ?self.config.cleanup_timeout, "cleanup timed out");
                false
            }
        }
    }
}
