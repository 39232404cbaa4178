use super::{PointCloudLocation, PointCloudRecord};
use crate::TerrainError;
use dashmap::DashMap;
use log::debug;
use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Instant,
};
use tempfile::NamedTempFile;

/// Retrieves remote point-cloud bytes.
pub trait Fetch: Send + Sync {
    /// Streams the resource at `url` into `dest`, returning the number
    /// of bytes written.
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, TerrainError>;
}

/// Blocking HTTP(S) fetcher.
#[cfg(feature = "remote")]
pub struct HttpFetch {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpFetch {
    pub fn new(timeout: std::time::Duration) -> Result<Self, TerrainError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TerrainError::SourceUnavailable(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
impl Fetch for HttpFetch {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, TerrainError> {
        let unavailable =
            |e: reqwest::Error| TerrainError::SourceUnavailable(format!("{url}: {e}"));
        let mut response = self.client.get(url).send().map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(TerrainError::SourceUnavailable(format!(
                "HTTP {} when downloading {url}",
                response.status()
            )));
        }
        response.copy_to(dest).map_err(unavailable)
    }
}

/// Local, write-once store of point-cloud files.
///
/// A cached file only appears at its final path once fully written,
/// and concurrent requests for the same file download it once.
pub struct PointCloudCache {
    cache_dir: PathBuf,
    fetcher: Box<dyn Fetch>,

    /// Per-destination download locks.
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PointCloudCache {
    pub fn new(cache_dir: PathBuf, fetcher: Box<dyn Fetch>) -> Self {
        Self {
            cache_dir,
            fetcher,
            locks: DashMap::new(),
        }
    }

    /// Returns a cache downloading over HTTP(S) per `config`.
    #[cfg(feature = "remote")]
    pub fn from_config(config: &crate::Config) -> Result<Self, TerrainError> {
        let fetcher = HttpFetch::new(std::time::Duration::from_secs(config.fetch_timeout_secs))?;
        Ok(Self::new(config.cache_dir.clone(), Box::new(fetcher)))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns a readable local path for `record`, downloading it first
    /// if needed.
    pub fn resolve(&self, record: &PointCloudRecord) -> Result<PathBuf, TerrainError> {
        match record.location() {
            PointCloudLocation::Local(path) if path.is_file() => Ok(path.to_owned()),
            PointCloudLocation::Local(path) => Err(TerrainError::SourceUnavailable(format!(
                "point cloud file not found: {}",
                path.display()
            ))),
            PointCloudLocation::Remote(url) => self.download(record, url),
        }
    }

    fn download(&self, record: &PointCloudRecord, url: &str) -> Result<PathBuf, TerrainError> {
        let dest = self.cache_dir.join(cache_file_name(record));
        if dest.is_file() {
            debug!("point cloud cache hit {dest:?}");
            return Ok(dest);
        }

        let lock = self.locks.entry(dest.clone()).or_default().clone();
        let _guard = lock.lock().map_err(|_| {
            TerrainError::SourceUnavailable("point cloud cache lock poisoned".into())
        })?;

        // Someone else may have finished while we waited.
        if dest.is_file() {
            return Ok(dest);
        }

        let now = Instant::now();
        std::fs::create_dir_all(&self.cache_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
        let bytes = {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let bytes = self.fetcher.fetch(url, &mut writer)?;
            writer.flush()?;
            bytes
        };
        tmp.persist(&dest).map_err(|e| TerrainError::Io(e.error))?;
        debug!(
            "downloaded {url} to {dest:?}; bytes: {bytes}, exec: {:?}",
            now.elapsed()
        );
        Ok(dest)
    }
}

/// File name for a record in the cache, safe on any filesystem.
fn cache_file_name(record: &PointCloudRecord) -> String {
    format!("{}_{}", record.id, record.filename)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{cache_file_name, Fetch, PointCloudCache};
    use crate::{pointcloud::tests::record, TerrainError};
    use std::{
        io::Write,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    struct SlowFetch {
        calls: Arc<AtomicUsize>,
    }

    impl Fetch for SlowFetch {
        fn fetch(&self, _url: &str, dest: &mut dyn Write) -> Result<u64, TerrainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            dest.write_all(b"LASF")?;
            std::thread::sleep(Duration::from_millis(50));
            dest.write_all(b" payload")?;
            Ok(12)
        }
    }

    /// Fails every request after writing a few bytes.
    pub(crate) struct FailingFetch;

    impl Fetch for FailingFetch {
        fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, TerrainError> {
            dest.write_all(b"partial")?;
            Err(TerrainError::SourceUnavailable(format!(
                "HTTP 503 when downloading {url}"
            )))
        }
    }

    #[test]
    fn test_file_name() {
        let mut rec = record("42", None, None);
        rec.filename = "Katoomba tile/1?.laz".to_owned();
        assert_eq!(cache_file_name(&rec), "42_Katoomba_tile_1_.laz");
    }

    #[test]
    fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PointCloudCache::new(dir.path().to_owned(), Box::new(FailingFetch));
        let mut rec = record("1", None, None);
        rec.location = dir.path().join("absent.las").display().to_string();
        assert!(matches!(
            cache.resolve(&rec),
            Err(TerrainError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_concurrent_downloads_fetch_once() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = PointCloudCache::new(
            dir.path().join("cache"),
            Box::new(SlowFetch {
                calls: calls.clone(),
            }),
        );
        let mut rec = record("1", None, None);
        rec.location = "https://example.com/1.las".to_owned();

        let paths: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| cache.resolve(&rec).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"LASF payload");
    }

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PointCloudCache::new(dir.path().to_owned(), Box::new(FailingFetch));
        let mut rec = record("1", None, None);
        rec.location = "https://example.com/1.las".to_owned();

        assert!(matches!(
            cache.resolve(&rec),
            Err(TerrainError::SourceUnavailable(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
