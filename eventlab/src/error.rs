//! Error handling in [`eventlab`][crate]
use thiserror::Error;

/// Possible errors when running the lab
#[derive(Error, Debug)]
pub enum Error {
    /// Errors returned by the apiserver or the client transport
    #[error("KubeError: {0}")]
    Kube(#[source] kube::Error),

    /// Failed to read or apply an explicit kubeconfig file
    #[error("Error loading kubeconfig: {0}")]
    Kubeconfig(#[source] kube::config::KubeconfigError),

    /// Failed to infer a config from the environment when no kubeconfig was found
    #[error("Error inferring config: {0}")]
    InferConfig(#[source] kube::config::InferConfigError),

    /// The target object is still around, most likely from an unclean shutdown
    ///
    /// The lab never adopts an existing object.
    #[error("target {namespace}/{name} already exists")]
    TargetExists {
        /// Namespace of the conflicting object
        namespace: String,
        /// Name of the conflicting object
        name: String,
    },

    /// The apiserver returned an object without a uid
    #[error("object {0} has no uid")]
    MissingUid(String),

    /// Failed to build a raw request
    #[error("Failed to build request: {0}")]
    BuildRequest(#[source] kube::core::request::Error),

    /// A watch line could not be decoded into a notification
    #[error("Error deserializing watch line {line:?}: {source}")]
    Decode {
        /// The offending line, as received
        line: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Returned on `std::io::Error` when reading the watch stream
    #[error("Error reading watch stream: {0}")]
    ReadStream(#[source] std::io::Error),

    /// Failed to install a signal handler
    #[error("Error registering signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// Failed to write a rendered notification
    #[error("Error writing output: {0}")]
    Output(#[source] std::io::Error),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Self::Kube(err)
    }
}

impl Error {
    /// Whether this is an apiserver rejection with the given HTTP status code
    pub fn is_api_code(&self, code: u16) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == code)
    }
}

/// Convenient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "nope".into(),
            reason: "NotFound".into(),
            code,
        }))
    }

    #[test]
    fn api_codes_are_matched() {
        assert!(api_error(404).is_api_code(404));
        assert!(!api_error(409).is_api_code(404));
        assert!(!Error::MissingUid("cm".into()).is_api_code(404));
    }

    #[test]
    fn target_exists_names_the_object() {
        let err = Error::TargetExists {
            namespace: "default".into(),
            name: "k8s-event-lab".into(),
        };
        assert_eq!(err.to_string(), "target default/k8s-event-lab already exists");
    }
}
