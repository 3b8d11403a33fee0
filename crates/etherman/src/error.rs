use alloy_json_rpc::RpcError;
use alloy_primitives::B256;
use alloy_transport::TransportErrorKind;

/// A [`Result`] that uses [`EthermanError`] as the error type.
pub(crate) type EthermanResult<T> = Result<T, EthermanError>;

/// An error that occurred with the etherman.
#[derive(Debug, thiserror::Error)]
pub enum EthermanError {
    /// A Provider error at the RPC level.
    #[error("execution provider rpc error: {0:?}")]
    ProviderRpc(#[from] RpcError<TransportErrorKind>),
    /// An Ethereum request error.
    #[error("failed Ethereum JSON RPC request: {0:?}")]
    EthRequest(#[from] EthRequestError),
    /// An error related to logs.
    #[error(transparent)]
    Logs(#[from] FilterLogError),
    /// A contract call returned a value that could not be decoded.
    #[error("failed to decode {call} return value: {error}")]
    DecodeCall {
        /// The called function.
        call: &'static str,
        /// The decoding error.
        error: alloy_sol_types::Error,
    },
    /// A contract call returned a value that does not fit in a u64.
    #[error("{0} return value overflows u64")]
    Overflow(&'static str),
    /// A failure produced by a scripted client.
    #[error("{0}")]
    Other(String),
}

/// An error occurred during a request to the Ethereum JSON RPC provider.
#[derive(Debug, thiserror::Error)]
pub enum EthRequestError {
    /// The requested block does not exist.
    #[error("unknown block {0}")]
    MissingBlock(u64),
    /// The requested block hash does not exist.
    #[error("unknown block hash {0}")]
    MissingBlockHash(B256),
    /// The requested transaction hash does not exist.
    #[error("unknown transaction {0}")]
    MissingTransactionHash(B256),
}

/// An error that occurred when filtering logs.
#[derive(Debug, thiserror::Error)]
pub enum FilterLogError {
    /// The log is missing a block number.
    #[error("missing block number for log")]
    MissingBlockNumber,
    /// The log is missing a block hash.
    #[error("missing block hash for log")]
    MissingBlockHash,
    /// The log is missing a transaction hash.
    #[error("unknown transaction hash for log")]
    MissingTransactionHash,
    /// The log has no topics.
    #[error("log without topics")]
    MissingTopic,
    /// Failed to decode a log.
    #[error("failed to decode log of type {log_type}: {error}")]
    DecodeLogFailed {
        /// The log type.
        log_type: &'static str,
        /// The decoding error.
        error: alloy_sol_types::Error,
    },
    /// The sequencing transaction calls an unknown method.
    #[error("unknown sequencing method {0:?}")]
    UnknownMethod([u8; 4]),
    /// Failed to decode sequencing calldata.
    #[error("failed to decode sequencing calldata: {0}")]
    DecodeCalldataFailed(alloy_sol_types::Error),
}
