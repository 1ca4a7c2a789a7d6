//! Module fetching and the content-addressed cache.
//!
//! Modules are stored as `<sha256>.wasm` under the cache directory. A cached
//! entry is trusted only after its bytes hash to the requested checksum;
//! a corrupt entry is fetched again.

use crate::error::{WasmError, WasmResult};
use sqlforge_core::Checksum;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

/// Fetch module bytes from a `file://`, `http://` or `https://` URL
///
/// # Errors
///
/// Returns error if the URL is invalid, the scheme unsupported, or the
/// transfer fails
pub async fn fetch(url: &str) -> WasmResult<Vec<u8>> {
    let parsed = Url::parse(url).map_err(|err| WasmError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    match parsed.scheme() {
        "file" => {
            let path = parsed.to_file_path().map_err(|()| WasmError::InvalidUrl {
                url: url.to_string(),
                message: "not a local path".to_string(),
            })?;
            tokio::fs::read(&path)
                .await
                .map_err(|source| WasmError::Io { path, source })
        }
        "http" | "https" => {
            let failed = |err: reqwest::Error| WasmError::Fetch {
                url: url.to_string(),
                message: err.to_string(),
            };
            let response = reqwest::get(parsed.clone())
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(failed)?;
            let bytes = response.bytes().await.map_err(failed)?;
            Ok(bytes.to_vec())
        }
        other => Err(WasmError::UnsupportedScheme(other.to_string())),
    }
}

/// Content-addressed store of verified modules
#[derive(Debug, Clone)]
pub struct ModuleCache {
    dir: PathBuf,
}

impl ModuleCache {
    /// Use `dir` as the cache root; it is created on first store
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location under the system temporary directory
    #[must_use]
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("sqlforge").join("wasm")
    }

    /// Cache root
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a module with `checksum` is stored
    #[must_use]
    pub fn path_for(&self, checksum: &Checksum) -> PathBuf {
        self.dir.join(format!("{}.wasm", checksum.to_hex()))
    }

    /// Load the module at `url`, verified against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`WasmError::ChecksumMismatch`] if the fetched bytes do not
    /// match, or the fetch/storage error
    pub async fn load(&self, url: &str, expected: &Checksum) -> WasmResult<Vec<u8>> {
        let path = self.path_for(expected);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if expected.verify(&bytes) {
                tracing::debug!(%url, path = %path.display(), "module cache hit");
                return Ok(bytes);
            }
            tracing::warn!(path = %path.display(), "discarding corrupt cache entry");
        }

        let bytes = fetch(url).await?;
        let actual = Checksum::compute(&bytes);
        if actual != *expected {
            return Err(WasmError::ChecksumMismatch {
                url: url.to_string(),
                expected: *expected,
                actual,
            });
        }
        self.store(path, bytes.clone()).await?;
        tracing::debug!(%url, checksum = %expected, "module cached");
        Ok(bytes)
    }

    async fn store(&self, path: PathBuf, bytes: Vec<u8>) -> WasmResult<()> {
        let dir = self.dir.clone();
        let write = move || -> Result<(), (PathBuf, std::io::Error)> {
            std::fs::create_dir_all(&dir).map_err(|e| (dir.clone(), e))?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| (dir.clone(), e))?;
            tmp.write_all(&bytes).map_err(|e| (tmp.path().to_path_buf(), e))?;
            tmp.persist(&path).map_err(|e| (path.clone(), e.error))?;
            Ok(())
        };
        match tokio::task::spawn_blocking(write).await {
            Ok(result) => result.map_err(|(path, source)| WasmError::Io { path, source }),
            Err(join) => Err(WasmError::Io {
                path: self.dir.clone(),
                source: std::io::Error::other(join),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_fetch_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.wasm");
        std::fs::write(&path, b"\0asm").unwrap();
        assert_eq!(fetch(&file_url(&path)).await.unwrap(), b"\0asm");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = fetch("ftp://example.com/gen.wasm").await.unwrap_err();
        assert!(matches!(err, WasmError::UnsupportedScheme(ref s) if s == "ftp"));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = fetch("not a url").await.unwrap_err();
        assert!(matches!(err, WasmError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_load_stores_verified_module() {
        let source = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let path = source.path().join("gen.wasm");
        std::fs::write(&path, b"module bytes").unwrap();
        let checksum = Checksum::compute(b"module bytes");

        let cache = ModuleCache::new(cache_dir.path());
        let bytes = cache.load(&file_url(&path), &checksum).await.unwrap();
        assert_eq!(bytes, b"module bytes");
        assert_eq!(std::fs::read(cache.path_for(&checksum)).unwrap(), b"module bytes");

        // Served from the cache once the source is gone
        std::fs::remove_file(&path).unwrap();
        let again = cache.load(&file_url(&path), &checksum).await.unwrap();
        assert_eq!(again, b"module bytes");
    }

    #[tokio::test]
    async fn test_load_mismatch_is_not_cached() {
        let source = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let path = source.path().join("gen.wasm");
        std::fs::write(&path, b"tampered").unwrap();
        let expected = Checksum::compute(b"original");

        let cache = ModuleCache::new(cache_dir.path());
        let err = cache.load(&file_url(&path), &expected).await.unwrap_err();
        match err {
            WasmError::ChecksumMismatch { expected: e, actual, .. } => {
                assert_eq!(e, expected);
                assert_eq!(actual, Checksum::compute(b"tampered"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cache.path_for(&expected).exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_refetched() {
        let source = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let path = source.path().join("gen.wasm");
        std::fs::write(&path, b"good").unwrap();
        let checksum = Checksum::compute(b"good");

        let cache = ModuleCache::new(cache_dir.path());
        std::fs::write(cache.path_for(&checksum), b"bad").unwrap();
        let bytes = cache.load(&file_url(&path), &checksum).await.unwrap();
        assert_eq!(bytes, b"good");
        assert_eq!(std::fs::read(cache.path_for(&checksum)).unwrap(), b"good");
    }
}
