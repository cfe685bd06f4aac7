use thiserror::Error;

/// Malformed metadata or hierarchy. Fatal at session start.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("hierarchy buffer of {len} bytes is not a multiple of the {record_size} byte record size")]
    InvalidHierarchyLength { len: usize, record_size: usize },

    #[error("hierarchy chunk ended after {records} records but {missing} announced child nodes have no record")]
    MissingChildRecords { records: usize, missing: usize },

    #[error("hierarchy chunk contains {trailing} records that do not belong to any node")]
    TrailingRecords { trailing: usize },

    #[error("hierarchy chunk is empty")]
    EmptyHierarchy,

    #[error("node {0} cannot be subdivided any further")]
    TooDeep(String),

    #[error("hierarchy chunk of node {0} describes the node as a proxy again")]
    ProxyLoop(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("could not parse metadata document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failed partial retrieval. Isolated to a single node.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("expected a partial content response but got status {0}")]
    UnexpectedStatus(u16),

    #[error("expected {expected} bytes but received {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("byte range {offset}+{size} is out of bounds of a {len} byte resource")]
    OutOfBounds { offset: u64, size: u64, len: u64 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout
        } else {
            NetworkError::Transport(e.to_string())
        }
    }
}

/// A corrupt or size-mismatched point payload. Isolated to a single node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload of {len} bytes is not a multiple of the {record_size} byte point record size")]
    InvalidLength { len: usize, record_size: usize },

    #[error("payload holds {actual} points but the node advertises {expected}")]
    PointCountMismatch { expected: u64, actual: u64 },
}

/// Everything that can go wrong while loading a single node.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Everything that can go wrong while opening a data set.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("could not create worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Reasons `NodeCache::begin_load` refuses to start a load.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BeginLoadError {
    #[error("a load for this node is already in flight")]
    AlreadyInFlight,

    #[error("this node is already loaded")]
    AlreadyLoaded,
}
