use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure conditions surfaced by the agent.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("node is not synced to the graph")]
    NodeUnsynced,

    #[error("lightning node unreachable: {0}")]
    RpcUnavailable(String),

    #[error("{call} failed: {status}")]
    RpcCallFailed { call: &'static str, status: String },

    #[error("channel graph is too incomplete to proceed, skipped {0} channels")]
    GraphIncomplete(usize),

    #[error("no nodes found in the network graph")]
    GraphEmpty,

    #[error("could not connect to peer {0} on any address")]
    PeerUnreachable(String),

    #[error("policy update rejected: {0}")]
    PolicyUpdateRejected(String),

    #[error("invalid channel point {0:?}")]
    InvalidChannelPoint(String),

    #[error("invalid public key {0:?}")]
    InvalidPublicKey(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Wraps a gRPC status into the call that produced it.
    pub(crate) fn rpc(call: &'static str, status: tonic_lnd::tonic::Status) -> Self {
        Error::RpcCallFailed {
            call,
            status: status.to_string(),
        }
    }
}
