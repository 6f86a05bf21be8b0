//! Command line shared by the lab binaries
use std::path::PathBuf;

use kube::Client;

use crate::{kubeconfig, EventsApi, LabConfig, Result};

/// Flags understood by both the producer and the consumer
#[derive(clap::Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about)]
pub struct LabArgs {
    /// (optional) absolute path to the kubeconfig file, defaults to ~/.kube/config
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Events API flavour: core (v1) or events (events.k8s.io/v1)
    #[arg(long, value_name = "API", default_value_t = EventsApi::Core)]
    pub api: EventsApi,
}

impl LabArgs {
    /// The lab settings for these flags
    pub fn config(&self) -> LabConfig {
        LabConfig::default().api(self.api)
    }

    /// A client for the current context of the selected kubeconfig
    pub async fn client(&self) -> Result<Client> {
        kubeconfig::client(self.kubeconfig.as_deref()).await
    }
}
