use crate::error::NetworkError;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::{StatusCode, Url};
use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Partial, byte-ranged retrieval from a store.
///
/// Implementations are shared by all load pipelines, so they must be safe to call from multiple
/// threads at once.
pub trait ChunkFetcher: Debug + Send + Sync {
    /// Reads exactly `byte_size` bytes starting at `byte_offset`.
    fn fetch(&self, byte_offset: u64, byte_size: u64) -> Result<Vec<u8>, NetworkError>;
}

impl<F: ChunkFetcher + ?Sized> ChunkFetcher for Arc<F> {
    fn fetch(&self, byte_offset: u64, byte_size: u64) -> Result<Vec<u8>, NetworkError> {
        self.as_ref().fetch(byte_offset, byte_size)
    }
}

fn check_range(byte_offset: u64, byte_size: u64, len: u64) -> Result<(), NetworkError> {
    match byte_offset.checked_add(byte_size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(NetworkError::OutOfBounds {
            offset: byte_offset,
            size: byte_size,
            len,
        }),
    }
}

/// Fetches byte ranges via HTTP range requests.
/// The server has to answer with `206 Partial Content` and exactly the requested bytes.
#[derive(Debug, Clone)]
pub struct HttpChunkFetcher {
    client: Client,
    url: Url,
}

impl HttpChunkFetcher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let url = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ChunkFetcher for HttpChunkFetcher {
    fn fetch(&self, byte_offset: u64, byte_size: u64) -> Result<Vec<u8>, NetworkError> {
        if byte_size == 0 {
            return Ok(Vec::new());
        }
        check_range(byte_offset, byte_size, u64::MAX)?;

        // the range header's end is inclusive
        let range = format!("bytes={}-{}", byte_offset, byte_offset + byte_size - 1);
        log::trace!("GET {} {}", self.url, range);
        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, range)
            .send()?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(NetworkError::UnexpectedStatus(response.status().as_u16()));
        }

        let bytes = response.bytes()?;
        if bytes.len() as u64 != byte_size {
            return Err(NetworkError::LengthMismatch {
                expected: byte_size,
                actual: bytes.len() as u64,
            });
        }
        Ok(bytes.to_vec())
    }
}

/// Fetches byte ranges from a local file.
#[derive(Debug, Clone)]
pub struct FileChunkFetcher {
    path: PathBuf,
    len: u64,
}

impl FileChunkFetcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, NetworkError> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        Ok(Self { path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkFetcher for FileChunkFetcher {
    fn fetch(&self, byte_offset: u64, byte_size: u64) -> Result<Vec<u8>, NetworkError> {
        if byte_size == 0 {
            return Ok(Vec::new());
        }
        check_range(byte_offset, byte_size, self.len)?;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(byte_offset))?;
        let mut buffer = vec![0u8; byte_size as usize];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

/// Serves byte ranges from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryChunkFetcher {
    data: Arc<Vec<u8>>,
}

impl MemoryChunkFetcher {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ChunkFetcher for MemoryChunkFetcher {
    fn fetch(&self, byte_offset: u64, byte_size: u64) -> Result<Vec<u8>, NetworkError> {
        if byte_size == 0 {
            return Ok(Vec::new());
        }
        check_range(byte_offset, byte_size, self.data.len() as u64)?;
        let start = byte_offset as usize;
        Ok(self.data[start..start + byte_size as usize].to_vec())
    }
}
