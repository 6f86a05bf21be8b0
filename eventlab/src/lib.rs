//! A small lab for exercising the Kubernetes Events API.
//!
//! The lab has two halves that only meet through the apiserver:
//!
//! - a [`Producer`] that creates a placeholder `ConfigMap` and publishes one event
//!   against it on every tick, cleaning up after itself when cancelled
//! - a [`Consumer`] that watches events in a namespace and prints those whose
//!   reason matches a filter
//!
//! ```no_run
//! use eventlab::{LabConfig, Producer};
//! use kube::Client;
//!
//! # async fn wrapper() -> eventlab::Result<()> {
//! let client = Client::try_default().await?;
//! let shutdown = eventlab::shutdown::on_signal()?;
//! Producer::new(client, LabConfig::default()).run(shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Both speak either flavour of the Events API, see [`EventsApi`].

pub mod cli;
pub mod config;
pub mod consumer;
mod error;
pub mod kubeconfig;
pub mod notification;
pub mod producer;
pub mod recorder;
pub mod shutdown;
pub mod target;

pub use config::{EventType, EventsApi, LabConfig};
pub use consumer::Consumer;
pub use error::{Error, Result};
pub use notification::{Notification, NotificationKind, Payload};
pub use producer::Producer;
pub use recorder::{NewEvent, Recorder, Reporter};
pub use target::TargetObject;
