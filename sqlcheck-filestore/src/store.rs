//! The `FileStore` trait (C4) and its shared-root filesystem
//! implementation. All paths the trait accepts are relative to the
//! configured root; `LocalFileStore` is the only thing that ever resolves
//! them to an absolute path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use sqlcheck_types::error::{CoreError, CoreResult};

use crate::encoding::decode_text;
use crate::validate::{has_rejected_name, looks_like_sql};

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, relpath: &str) -> bool;
    async fn read_text(&self, relpath: &str) -> CoreResult<String>;
    async fn write_text(&self, relpath: &str, content: &str) -> CoreResult<()>;
    async fn write_json(&self, relpath: &str, value: &Value) -> CoreResult<()>;
    async fn copy(&self, src: &str, dst: &str) -> CoreResult<()>;
    async fn delete(&self, relpath: &str) -> CoreResult<()>;
    async fn mkdir(&self, relpath: &str) -> CoreResult<()>;
    /// Expands `archive_relpath` under `into_relpath`, filtering the
    /// resulting file list through `is_valid_sql`. Returns the extraction
    /// directory and the relative paths of the files that passed the
    /// filter.
    async fn expand_archive(&self, archive_relpath: &str, into_relpath: &str) -> CoreResult<(String, Vec<String>)>;
    /// Reads the first 1 KiB of `relpath` and runs it through the §4.4
    /// heuristic; never reads the whole file just to validate it.
    async fn is_valid_sql(&self, relpath: &str) -> CoreResult<bool>;
}

pub struct LocalFileStore {
    root: PathBuf,
    max_archive_entries: usize,
    max_file_bytes: u64,
}

impl LocalFileStore {
    /// `max_archive_entries` bounds how many files a single `expand_archive`
    /// call may unpack (§4.4 `LimitExceeded`); `max_file_bytes` bounds the
    /// size of any one SQL file this store will write or treat as valid
    /// (§6.4 `max_file_bytes`).
    pub fn new(root: impl Into<PathBuf>, max_archive_entries: usize) -> Self {
        Self {
            root: root.into(),
            max_archive_entries,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    fn absolute(&self, relpath: &str) -> PathBuf {
        self.root.join(relpath.trim_start_matches('/'))
    }

    fn relative(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, relpath: &str) -> bool {
        tokio::fs::try_exists(self.absolute(relpath)).await.unwrap_or(false)
    }

    async fn read_text(&self, relpath: &str) -> CoreResult<String> {
        let path = self.absolute(relpath);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| map_io_error(relpath, e))?;
        decode_text(&bytes).ok_or_else(|| CoreError::Encoding(format!("{relpath}: binary content or unsupported encoding")))
    }

    async fn write_text(&self, relpath: &str, content: &str) -> CoreResult<()> {
        if content.len() as u64 > self.max_file_bytes {
            return Err(CoreError::Validation(format!(
                "{relpath}: {} bytes exceeds max_file_bytes ({})",
                content.len(),
                self.max_file_bytes
            )));
        }
        let path = self.absolute(relpath);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io_error(relpath, e))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| map_io_error(relpath, e))
    }

    async fn write_json(&self, relpath: &str, value: &Value) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| CoreError::FileAccess(format!("{relpath}: serializing json: {e}")))?;
        self.write_text(relpath, &content).await
    }

    async fn copy(&self, src: &str, dst: &str) -> CoreResult<()> {
        let src_abs = self.absolute(src);
        let dst_abs = self.absolute(dst);
        if !tokio::fs::try_exists(&src_abs).await.unwrap_or(false) {
            return Err(CoreError::FileNotFound(src.to_string()));
        }
        if let Some(parent) = dst_abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io_error(dst, e))?;
        }
        tokio::fs::copy(&src_abs, &dst_abs)
            .await
            .map_err(|e| map_io_error(src, e))?;
        Ok(())
    }

    async fn delete(&self, relpath: &str) -> CoreResult<()> {
        let path = self.absolute(relpath);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await.map_err(|e| map_io_error(relpath, e)),
            Ok(_) => tokio::fs::remove_file(&path).await.map_err(|e| map_io_error(relpath, e)),
            Err(_) => Ok(()), // already gone: delete is idempotent.
        }
    }

    async fn mkdir(&self, relpath: &str) -> CoreResult<()> {
        tokio::fs::create_dir_all(self.absolute(relpath))
            .await
            .map_err(|e| map_io_error(relpath, e))
    }

    async fn expand_archive(&self, archive_relpath: &str, into_relpath: &str) -> CoreResult<(String, Vec<String>)> {
        let archive_path = self.absolute(archive_relpath);
        if !tokio::fs::try_exists(&archive_path).await.unwrap_or(false) {
            return Err(CoreError::FileNotFound(archive_relpath.to_string()));
        }
        let extract_dir = self.absolute(into_relpath);
        let max_entries = self.max_archive_entries;

        let extracted = tokio::task::spawn_blocking(move || extract_zip_blocking(&archive_path, &extract_dir, max_entries))
            .await
            .map_err(|e| CoreError::ArchiveCorrupt(format!("extraction task panicked: {e}")))??;

        let mut sql_files = Vec::new();
        for abs_path in &extracted {
            let file_name = abs_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if has_rejected_name(file_name) {
                continue;
            }
            let relpath = self.relative(abs_path);
            if self.is_valid_sql(&relpath).await.unwrap_or(false) {
                sql_files.push(relpath);
            }
        }
        Ok((self.relative(&self.absolute(into_relpath)), sql_files))
    }

    async fn is_valid_sql(&self, relpath: &str) -> CoreResult<bool> {
        let file_name = Path::new(relpath).file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if has_rejected_name(file_name) {
            return Ok(false);
        }
        let path = self.absolute(relpath);
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| map_io_error(relpath, e))?;
        if metadata.len() == 0 || metadata.len() > self.max_file_bytes {
            return Ok(false);
        }
        let mut file = tokio::fs::File::open(&path).await.map_err(|e| map_io_error(relpath, e))?;
        let mut buf = vec![0u8; 1024];
        use tokio::io::AsyncReadExt;
        let n = file.read(&mut buf).await.map_err(|e| map_io_error(relpath, e))?;
        buf.truncate(n);
        match decode_text(&buf) {
            Some(sample) => Ok(looks_like_sql(&sample)),
            None => Ok(false),
        }
    }
}

fn extract_zip_blocking(archive_path: &Path, extract_dir: &Path, max_entries: usize) -> CoreResult<Vec<PathBuf>> {
    let file = std::fs::File::open(archive_path).map_err(|e| CoreError::FileAccess(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| CoreError::ArchiveCorrupt(e.to_string()))?;

    if archive.len() > max_entries {
        return Err(CoreError::ArchiveLimit(format!(
            "archive contains {} entries, limit is {max_entries}",
            archive.len()
        )));
    }

    std::fs::create_dir_all(extract_dir).map_err(|e| CoreError::FileAccess(e.to_string()))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| CoreError::ArchiveCorrupt(e.to_string()))?;
        let Some(enclosed) = entry.enclosed_name() else {
            continue; // path traversal / absolute-path entries are silently skipped, not extracted.
        };
        let out_path = extract_dir.join(enclosed);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| CoreError::FileAccess(e.to_string()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::FileAccess(e.to_string()))?;
        }
        let mut out_file = std::fs::File::create(&out_path).map_err(|e| CoreError::FileAccess(e.to_string()))?;
        std::io::copy(&mut entry, &mut out_file).map_err(|e| CoreError::FileAccess(e.to_string()))?;
        extracted.push(out_path);
    }
    Ok(extracted)
}

fn map_io_error(relpath: &str, err: std::io::Error) -> CoreError {
    match err.kind() {
        std::io::ErrorKind::NotFound => CoreError::FileNotFound(relpath.to_string()),
        std::io::ErrorKind::PermissionDenied => CoreError::FileAccess(format!("{relpath}: permission denied")),
        _ => CoreError::FileAccess(format!("{relpath}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store() -> (LocalFileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalFileStore::new(dir.path(), 1000), dir)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (store, _dir) = store();
        store.write_text("jobs/1/sources/a.sql", "SELECT 1;").await.unwrap();
        let content = store.read_text("jobs/1/sources/a.sql").await.unwrap();
        assert_eq!(content, "SELECT 1;");
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let (store, _dir) = store();
        let err = store.read_text("nope.sql").await.unwrap_err();
        assert!(matches!(err, CoreError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn is_valid_sql_rejects_dotfiles_and_empty_files() {
        let (store, _dir) = store();
        store.write_text("jobs/1/sources/._report.sql", "SELECT 1;").await.unwrap();
        store.write_text("jobs/1/sources/empty.sql", "").await.unwrap();
        store.write_text("jobs/1/sources/real.sql", "SELECT * FROM t;").await.unwrap();

        assert!(!store.is_valid_sql("jobs/1/sources/._report.sql").await.unwrap());
        assert!(!store.is_valid_sql("jobs/1/sources/empty.sql").await.unwrap());
        assert!(store.is_valid_sql("jobs/1/sources/real.sql").await.unwrap());
    }

    #[tokio::test]
    async fn expand_archive_filters_non_sql_entries() {
        let (store, dir) = store();
        let zip_path = dir.path().join("bundle.zip");
        {
            let file = std::fs::File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("a.sql", options).unwrap();
            writer.write_all(b"SELECT 1;").unwrap();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"not sql").unwrap();
            writer.start_file("._a.sql", options).unwrap();
            writer.write_all(b"SELECT 2;").unwrap();
            writer.finish().unwrap();
        }

        let (extract_dir, sql_files) = store.expand_archive("bundle.zip", "jobs/1/extracted").await.unwrap();
        assert!(extract_dir.contains("extracted"));
        assert_eq!(sql_files.len(), 1);
        assert!(sql_files[0].ends_with("a.sql") && !sql_files[0].contains("._a.sql"));
    }

    #[tokio::test]
    async fn write_text_at_max_file_bytes_is_accepted_beyond_it_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), 1000).with_max_file_bytes(8);

        store.write_text("a.sql", "SELECT 1").await.unwrap(); // exactly 8 bytes
        let err = store.write_text("b.sql", "SELECT 10").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn expand_archive_over_entry_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), 1);
        let zip_path = dir.path().join("bundle.zip");
        {
            let file = std::fs::File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("a.sql", options).unwrap();
            writer.write_all(b"SELECT 1;").unwrap();
            writer.start_file("b.sql", options).unwrap();
            writer.write_all(b"SELECT 2;").unwrap();
            writer.finish().unwrap();
        }

        let err = store.expand_archive("bundle.zip", "jobs/1/extracted").await.unwrap_err();
        assert!(matches!(err, CoreError::ArchiveLimit(_)));
    }
}
