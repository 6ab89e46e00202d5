//! Directory-tree cache backend.

use super::traits::{Cache, Cacher, ChecksumHash, Sha256Hash};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Persistent backend that lays entries out under a root directory using
/// their wire names, e.g. `<root>/example.com/m/@v/v1.2.3.zip`.
///
/// Writes go to a `.tmp` sibling first and are renamed into place, so
/// concurrent writers and readers of the same name never observe a partial
/// entry.
#[derive(Debug, Clone)]
pub struct DiskCacher {
    root: PathBuf,
}

impl DiskCacher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl Cacher for DiskCacher {
    async fn get(&self, name: &str) -> Result<Cache> {
        let path = self.entry_path(name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::CacheMiss);
        }
        Cache::from_file(name, &path, self.new_hash()).await
    }

    async fn put(&self, mut cache: Cache) -> Result<()> {
        let path = self.entry_path(cache.name());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }

        let parent = path.parent().unwrap_or(&self.root);
        let (tmp_file, tmp_path) = tempfile::Builder::new()
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| Error::io_with_path(e, parent))?
            .into_parts();

        let mut file = tokio::fs::File::from_std(tmp_file);
        tokio::io::copy(cache.content_mut(), &mut file)
            .await
            .map_err(|e| Error::io_with_path(e, &*tmp_path))?;
        file.flush()
            .await
            .map_err(|e| Error::io_with_path(e, &*tmp_path))?;
        drop(file);

        tmp_path
            .persist(&path)
            .map_err(|e| Error::io_with_path(e.error, &path))?;
        debug!(name = cache.name(), "cached module artifact");
        Ok(())
    }

    fn new_hash(&self) -> Box<dyn ChecksumHash> {
        Box::<Sha256Hash>::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let cacher = DiskCacher::new(root.path());
        let name = "example.com/m/@v/v1.0.0.mod";

        assert!(matches!(cacher.get(name).await, Err(Error::CacheMiss)));

        let source = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(source.path(), b"module example.com/m\n").unwrap();
        let entry = Cache::from_file(name, source.path(), cacher.new_hash())
            .await
            .unwrap();
        let checksum = entry.checksum().to_vec();
        cacher.put(entry).await.unwrap();

        let got = cacher.get(name).await.unwrap();
        assert_eq!(got.size(), 21);
        assert_eq!(got.checksum(), checksum.as_slice());
        assert_eq!(got.mime_type(), "text/plain; charset=utf-8");

        let mut body = Vec::new();
        got.into_content().read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"module example.com/m\n");
    }

    #[tokio::test]
    async fn entries_nest_under_wire_names() {
        let root = tempfile::tempdir().unwrap();
        let cacher = DiskCacher::new(root.path());

        let source = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(source.path(), b"{}").unwrap();
        let entry = Cache::from_file(
            "example.com/m/@v/v1.0.0.info",
            source.path(),
            cacher.new_hash(),
        )
        .await
        .unwrap();
        cacher.put(entry).await.unwrap();

        assert!(root
            .path()
            .join("example.com/m/@v/v1.0.0.info")
            .is_file());
    }
}
