//! Locate cluster credentials and build a client from them.
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable that overrides every other kubeconfig location.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Pick the kubeconfig file to use.
///
/// `KUBECONFIG` wins over the configured path, which wins over
/// `$HOME/.kube/config`. Returns `None` when none of them is available.
pub fn resolve_path(
    env: Option<OsString>,
    configured: Option<&Path>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    env.filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| configured.map(Path::to_path_buf))
        .or_else(|| home.map(|home| home.join(".kube").join("config")))
}

/// Resolve the kubeconfig path from the process environment.
pub fn path_from_env(configured: Option<&Path>) -> Option<PathBuf> {
    resolve_path(
        std::env::var_os(KUBECONFIG_ENV),
        configured,
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

/// Build a client for the cluster described by the kubeconfig at `path`.
pub async fn client(path: &Path) -> Result<Client> {
    debug!(path = %path.display(), "loading kubeconfig");
    let kubeconfig = Kubeconfig::read_from(path).map_err(|err| Error::Kubeconfig {
        path: path.to_owned(),
        message: err.to_string(),
    })?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|err| Error::Kubeconfig {
            path: path.to_owned(),
            message: err.to_string(),
        })?;
    Ok(Client::try_from(config)?)
}
