//! Resolving the kubeconfig the lab binaries connect with
use std::path::{Path, PathBuf};

use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use tracing::debug;

use crate::{Error, Result};

/// The well-known per-user kubeconfig location, when a home directory exists
pub fn default_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".kube").join("config"))
}

/// Build a [`Config`] for the current context of a kubeconfig
///
/// An explicit `path` must be readable. Without one, the per-user default is
/// used if it exists, and otherwise the config is inferred from the
/// environment (in-cluster service account, `KUBECONFIG`).
pub async fn client_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_path().filter(|p| p.exists()),
    };
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(&path).map_err(Error::Kubeconfig)?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(Error::Kubeconfig)
        }
        None => {
            debug!("no kubeconfig found, inferring config");
            Config::infer().await.map_err(Error::InferConfig)
        }
    }
}

/// Build a [`Client`] from [`client_config`]
pub async fn client(path: Option<&Path>) -> Result<Client> {
    let config = client_config(path).await?;
    Ok(Client::try_from(config)?)
}
