//! Cache backend trait and the open-entry type.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Streamable, seekable entry content.
pub trait ReadSeek: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ReadSeek for T {}

/// Incremental checksum accumulator used while writing cache content.
///
/// The checksum algorithm belongs to the backend; the proxy only treats the
/// result as opaque bytes (they surface as the response `ETag`).
pub trait ChecksumHash: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// SHA-256 accumulator, the default hash primitive.
#[derive(Default)]
pub struct Sha256Hash(Sha256);

impl ChecksumHash for Sha256Hash {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

/// An open cache entry: metadata plus a seekable content stream.
pub struct Cache {
    name: String,
    mime_type: String,
    size: u64,
    mod_time: DateTime<Utc>,
    checksum: Vec<u8>,
    content: Box<dyn ReadSeek>,
}

impl Cache {
    /// Assemble an entry from parts. Backends use this when answering a
    /// probe.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        mod_time: DateTime<Utc>,
        checksum: Vec<u8>,
        content: Box<dyn ReadSeek>,
    ) -> Self {
        let name = name.into();
        let mime_type = mime_type_of(&name).to_string();
        Self {
            name,
            mime_type,
            size,
            mod_time,
            checksum,
            content,
        }
    }

    /// Open a file as a cache entry named `name`, computing its checksum
    /// with `hash` in one pass. The returned entry reads from the start of
    /// the file.
    pub async fn from_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        mut hash: Box<dyn ChecksumHash>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::io_with_path(e, path))?;
        let mod_time = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = file
                .read(&mut buffer)
                .await
                .map_err(|e| Error::io_with_path(e, path))?;
            if n == 0 {
                break;
            }
            hash.update(&buffer[..n]);
        }
        file.rewind()
            .await
            .map_err(|e| Error::io_with_path(e, path))?;

        Ok(Self::new(
            name,
            metadata.len(),
            mod_time,
            hash.finalize(),
            Box::new(file),
        ))
    }

    /// Canonical wire-form name, e.g. `example.com/m/@v/v1.2.3.zip`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mod_time(&self) -> DateTime<Utc> {
        self.mod_time
    }

    /// Opaque checksum of the content, as produced by the backend's hash
    /// primitive.
    pub fn checksum(&self) -> &[u8] {
        &self.checksum
    }

    /// Consume the entry, returning its content stream.
    pub fn into_content(self) -> Box<dyn ReadSeek> {
        self.content
    }

    /// Mutable access to the content stream.
    pub fn content_mut(&mut self) -> &mut Box<dyn ReadSeek> {
        &mut self.content
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .field("mod_time", &self.mod_time)
            .finish_non_exhaustive()
    }
}

/// Cache backend: content-addressed read/write with streaming.
///
/// Implementations must be safe for concurrent writers; entries are
/// immutable once written.
#[async_trait]
pub trait Cacher: Send + Sync {
    /// Probe for an entry. A miss is reported as [`Error::CacheMiss`].
    async fn get(&self, name: &str) -> Result<Cache>;

    /// Store an entry (name, content, and precomputed checksum).
    async fn put(&self, cache: Cache) -> Result<()>;

    /// A fresh checksum accumulator matching the backend's hash primitive.
    fn new_hash(&self) -> Box<dyn ChecksumHash>;
}

/// MIME type for a wire-form artifact name.
pub(crate) fn mime_type_of(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("info") => "application/json; charset=utf-8",
        Some("mod") => "text/plain; charset=utf-8",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
