//! Ephemeral cache backend.

use super::traits::{Cache, Cacher, ChecksumHash, Sha256Hash};
use crate::error::{Error, Result};
use async_trait::async_trait;

/// The backend used when none is configured: every probe misses and every
/// write is discarded. Artifact bytes then only exist in the scratch
/// directory of the request that produced them, which is removed when the
/// response completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TempCacher;

#[async_trait]
impl Cacher for TempCacher {
    async fn get(&self, _name: &str) -> Result<Cache> {
        Err(Error::CacheMiss)
    }

    async fn put(&self, _cache: Cache) -> Result<()> {
        Ok(())
    }

    fn new_hash(&self) -> Box<dyn ChecksumHash> {
        Box::<Sha256Hash>::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn always_misses_and_swallows_writes() {
        let cacher = TempCacher;
        assert!(matches!(
            cacher.get("example.com/m/@v/v1.0.0.info").await,
            Err(Error::CacheMiss)
        ));

        let entry = Cache::new(
            "example.com/m/@v/v1.0.0.info",
            2,
            Utc::now(),
            vec![0xab],
            Box::new(std::io::Cursor::new(b"{}".to_vec())),
        );
        cacher.put(entry).await.unwrap();

        assert!(matches!(
            cacher.get("example.com/m/@v/v1.0.0.info").await,
            Err(Error::CacheMiss)
        ));
    }
}
