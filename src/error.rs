//! Error types for the PSMDB operator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Operator or cluster configuration is unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A resource quantity in the cluster spec could not be parsed
    #[error("Invalid {field} quantity {value:?}")]
    InvalidQuantity { field: String, value: String },

    /// The pod declares no container port named after the mongod port
    #[error("could not find mongodb address for pod {pod}")]
    AddressNotFound { pod: String },

    /// The pod's mongod container carries no replset name
    #[error("could not find mongodb replset name for pod {pod}")]
    ReplsetNameNotFound { pod: String },

    /// An object is missing a field the controller keys on
    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),
}

impl Error {
    /// Transient failures worth a short requeue.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::KubeError(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
