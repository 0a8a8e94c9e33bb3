//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are read by the binary only; the core sees
//! typed values, so renders behave the same in every thread and test harness.

use crate::constants::{DEFAULT_CHECKLIST_BUCKET, DEFAULT_PHOTO_BUCKET};
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on outbound calls to slow collaborators.
pub const DEFAULT_EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_ATTACHMENT_FETCH_CONCURRENCY: usize = 4;
pub const DEFAULT_PHOTO_FETCH_CONCURRENCY: usize = 8;
/// One worker per structural block of the construction narrative.
pub const DEFAULT_TEXT_GENERATION_CONCURRENCY: usize = 5;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    template_dir: PathBuf,
    checklist_bucket: String,
    photo_bucket: String,
    upload_concurrency: usize,
    rasterize_concurrency: usize,
    attachment_fetch_concurrency: usize,
    photo_fetch_concurrency: usize,
    text_generation_concurrency: usize,
    external_call_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig` with default buckets, pool sizes and timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `template_dir` is not an existing directory.
    pub fn new(template_dir: PathBuf) -> CoreResult<Self> {
        if !template_dir.is_dir() {
            return Err(CoreError::InvalidInput(format!(
                "template directory does not exist: {}",
                template_dir.display()
            )));
        }

        let processors = available_processors();
        Ok(Self {
            template_dir,
            checklist_bucket: DEFAULT_CHECKLIST_BUCKET.to_string(),
            photo_bucket: DEFAULT_PHOTO_BUCKET.to_string(),
            upload_concurrency: processors,
            rasterize_concurrency: processors,
            attachment_fetch_concurrency: DEFAULT_ATTACHMENT_FETCH_CONCURRENCY,
            photo_fetch_concurrency: DEFAULT_PHOTO_FETCH_CONCURRENCY,
            text_generation_concurrency: DEFAULT_TEXT_GENERATION_CONCURRENCY,
            external_call_timeout: DEFAULT_EXTERNAL_CALL_TIMEOUT,
        })
    }

    pub fn with_buckets(
        mut self,
        checklist_bucket: impl Into<String>,
        photo_bucket: impl Into<String>,
    ) -> CoreResult<Self> {
        let checklist_bucket = checklist_bucket.into();
        let photo_bucket = photo_bucket.into();
        if checklist_bucket.trim().is_empty() || photo_bucket.trim().is_empty() {
            return Err(CoreError::InvalidInput("bucket names cannot be empty".into()));
        }
        self.checklist_bucket = checklist_bucket;
        self.photo_bucket = photo_bucket;
        Ok(self)
    }

    #[must_use]
    pub fn with_photo_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.photo_fetch_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_attachment_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.attachment_fetch_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_rasterize_concurrency(mut self, concurrency: usize) -> Self {
        self.rasterize_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_text_generation_concurrency(mut self, concurrency: usize) -> Self {
        self.text_generation_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_external_call_timeout(mut self, timeout: Duration) -> Self {
        self.external_call_timeout = timeout;
        self
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn checklist_bucket(&self) -> &str {
        &self.checklist_bucket
    }

    pub fn photo_bucket(&self) -> &str {
        &self.photo_bucket
    }

    pub fn upload_concurrency(&self) -> usize {
        self.upload_concurrency
    }

    pub fn rasterize_concurrency(&self) -> usize {
        self.rasterize_concurrency
    }

    pub fn attachment_fetch_concurrency(&self) -> usize {
        self.attachment_fetch_concurrency
    }

    pub fn photo_fetch_concurrency(&self) -> usize {
        self.photo_fetch_concurrency
    }

    pub fn text_generation_concurrency(&self) -> usize {
        self.text_generation_concurrency
    }

    pub fn external_call_timeout(&self) -> Duration {
        self.external_call_timeout
    }
}

fn available_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a pool size from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default`. Zero is rejected.
pub fn concurrency_from_env_value(value: Option<String>, default: usize) -> CoreResult<usize> {
    match non_blank(value) {
        None => Ok(default),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(CoreError::InvalidInput(format!(
                "concurrency must be a positive integer, got '{}'",
                v
            ))),
        },
    }
}

/// Parse a timeout in whole seconds from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_EXTERNAL_CALL_TIMEOUT`].
pub fn timeout_from_env_value(value: Option<String>) -> CoreResult<Duration> {
    match non_blank(value) {
        None => Ok(DEFAULT_EXTERNAL_CALL_TIMEOUT),
        Some(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(CoreError::InvalidInput(format!(
                "timeout must be a positive number of seconds, got '{}'",
                v
            ))),
        },
    }
}

/// Parse a bucket name, falling back to `default` when unset.
pub fn bucket_from_env_value(value: Option<String>, default: &str) -> String {
    non_blank(value).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_rejects_missing_template_dir() {
        let temp = TempDir::new().unwrap();
        let err = CoreConfig::new(temp.path().join("absent")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(temp.path().to_path_buf()).unwrap();
        assert_eq!(cfg.checklist_bucket(), "checklist-files");
        assert_eq!(cfg.photo_bucket(), "answer-photos");
        assert_eq!(cfg.photo_fetch_concurrency(), 8);
        assert_eq!(cfg.attachment_fetch_concurrency(), 4);
        assert_eq!(cfg.text_generation_concurrency(), 5);
        assert!(cfg.upload_concurrency() >= 1);
        assert_eq!(cfg.external_call_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_with_buckets_rejects_blank() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(temp.path().to_path_buf()).unwrap();
        assert!(cfg.with_buckets(" ", "photos").is_err());
    }

    #[test]
    fn test_concurrency_from_env_value() {
        assert_eq!(concurrency_from_env_value(None, 8).unwrap(), 8);
        assert_eq!(concurrency_from_env_value(Some("  ".into()), 8).unwrap(), 8);
        assert_eq!(concurrency_from_env_value(Some("3".into()), 8).unwrap(), 3);
        assert!(concurrency_from_env_value(Some("0".into()), 8).is_err());
        assert!(concurrency_from_env_value(Some("many".into()), 8).is_err());
    }

    #[test]
    fn test_timeout_from_env_value() {
        assert_eq!(timeout_from_env_value(None).unwrap(), DEFAULT_EXTERNAL_CALL_TIMEOUT);
        assert_eq!(
            timeout_from_env_value(Some("30".into())).unwrap(),
            Duration::from_secs(30)
        );
        assert!(timeout_from_env_value(Some("-1".into())).is_err());
    }

    #[test]
    fn test_bucket_from_env_value() {
        assert_eq!(bucket_from_env_value(None, "x"), "x");
        assert_eq!(bucket_from_env_value(Some(" y ".into()), "x"), "y");
    }
}
