//! Merging uploaded files and edited values into checklist data.
//!
//! The merge algorithm is shared by every template; how an upload key maps onto a location in
//! the data is not, and is supplied by a per-template [`FileDataMerger`].
//!
//! A merge:
//!
//! 1. applies the edited values over the previously stored data
//! 2. restores previously stored file entries the edit dropped
//! 3. hashes the uploads in parallel
//! 4. skips uploads whose content already exists at their target location
//! 5. uploads the rest in parallel and appends a file entry for each
//!
//! No two entries at one location ever share a content hash. Deduplication is scoped to one
//! instance and one location.

mod bucket;
mod location;
mod premise;

pub use bucket::BucketMerger;
pub use location::{file_lists, FileLocation, KEY_SEPARATOR};
pub use premise::PremiseMerger;

use crate::config::CoreConfig;
use crate::model::ChecklistInstance;
use crate::registry::{Strategy, StrategyRegistry};
use crate::{CoreError, CoreResult};
use parking_lot::Mutex;
use rayon::prelude::*;
use report_files::{content_hash, BlobStore, FileEntry, FilesError, ObjectKey};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Maps upload keys onto locations in a template's data.
pub trait FileDataMerger: Strategy {
    /// # Errors
    ///
    /// Returns `InvalidInput` for keys this template does not understand.
    fn parse_location(&self, key: &str) -> CoreResult<FileLocation>;
}

/// A file submitted with a checklist edit.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Composite key naming the target location, e.g. `walls__photos`.
    pub key: String,
    /// Original file name; only its extension is kept.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub uploaded: usize,
    pub duplicates_skipped: usize,
    pub restored: usize,
}

pub fn builtin_mergers() -> Vec<Arc<dyn FileDataMerger>> {
    vec![Arc::new(BucketMerger), Arc::new(PremiseMerger)]
}

/// File operations on checklist instances.
pub struct FileDataService {
    blobs: Arc<dyn BlobStore>,
    config: Arc<CoreConfig>,
    mergers: StrategyRegistry<dyn FileDataMerger>,
    pool: rayon::ThreadPool,
}

impl FileDataService {
    /// Creates the service with the built-in mergers.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the merger registry or the upload pool cannot be built.
    pub fn new(blobs: Arc<dyn BlobStore>, config: Arc<CoreConfig>) -> CoreResult<Self> {
        Self::with_mergers(blobs, config, builtin_mergers())
    }

    pub fn with_mergers(
        blobs: Arc<dyn BlobStore>,
        config: Arc<CoreConfig>,
        mergers: Vec<Arc<dyn FileDataMerger>>,
    ) -> CoreResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.upload_concurrency())
            .thread_name(|i| format!("upload-{}", i))
            .build()
            .map_err(|e| CoreError::Configuration(format!("upload pool: {}", e)))?;
        Ok(Self {
            blobs,
            config,
            mergers: StrategyRegistry::build(mergers)?,
            pool,
        })
    }

    /// Merges edited values and uploaded files into an instance's data.
    ///
    /// # Arguments
    ///
    /// * `template_name` - Name of the instance's template; selects how upload keys are parsed.
    /// * `instance` - The instance to update. Its data is replaced only if the merge succeeds.
    /// * `uploads` - Newly submitted files.
    /// * `token` - Bearer token forwarded to the blob store.
    /// * `new_values` - Edited top-level fields, replacing the stored ones.
    ///
    /// # Returns
    ///
    /// Counts of uploaded, skipped and restored files.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data is malformed, an upload key cannot be parsed, or an
    /// upload fails. Files uploaded before the failure are left in the store.
    pub fn merge(
        &self,
        template_name: &str,
        instance: &mut ChecklistInstance,
        uploads: Vec<UploadedFile>,
        token: &str,
        new_values: Map<String, Value>,
    ) -> CoreResult<MergeOutcome> {
        let merger = self.mergers.resolve(template_name);
        let previous = instance.data_object()?;
        let mut outcome = MergeOutcome::default();

        let mut data = previous.clone();
        for (key, value) in new_values {
            data.insert(key, value);
        }

        for (location, entries) in file_lists(&previous) {
            let present: HashSet<String> = location
                .entries(&data)
                .into_iter()
                .map(|e| e.hash)
                .collect();
            let missing: Vec<FileEntry> = entries
                .into_iter()
                .filter(|e| !present.contains(&e.hash))
                .collect();
            if missing.is_empty() {
                continue;
            }
            let list = location.entries_mut(instance.id, &mut data)?;
            for entry in missing {
                list.push(serde_json::to_value(&entry)?);
                outcome.restored += 1;
            }
        }

        let targets: Vec<FileLocation> = uploads
            .iter()
            .map(|u| merger.parse_location(&u.key))
            .collect::<CoreResult<_>>()?;

        let mut seen: HashMap<FileLocation, Mutex<HashSet<String>>> = HashMap::new();
        for location in &targets {
            seen.entry(location.clone()).or_insert_with(|| {
                Mutex::new(location.entries(&data).into_iter().map(|e| e.hash).collect())
            });
        }

        let instance_id = instance.id;
        let bucket = self.config.checklist_bucket();
        let blobs = &self.blobs;
        let seen = &seen;

        let hashes: Vec<String> = self
            .pool
            .install(|| uploads.par_iter().map(|u| content_hash(&u.bytes)).collect());

        let stored: Vec<Option<(FileLocation, FileEntry)>> = self.pool.install(|| {
            uploads
                .par_iter()
                .zip(targets.par_iter())
                .zip(hashes.into_par_iter())
                .map(
                    |((upload, location), hash)| -> CoreResult<Option<(FileLocation, FileEntry)>> {
                    let fresh = seen
                        .get(location)
                        .map(|set| set.lock().insert(hash.clone()))
                        .unwrap_or(true);
                    if !fresh {
                        tracing::debug!(
                            "skipping duplicate {} for {}",
                            upload.file_name,
                            upload.key
                        );
                        return Ok(None);
                    }

                    let extension = stored_extension(&upload.file_name, &upload.bytes);
                    let name = format!(
                        "{}_{}_{}",
                        instance_id,
                        location.name_part(),
                        Uuid::new_v4().simple()
                    );
                    let url = blobs.put(&name, &extension, bucket, &upload.bytes, token)?;
                    let entry = FileEntry {
                        id: Uuid::new_v4().to_string(),
                        name: ObjectKey::new(name, extension).file_name(),
                        url,
                        hash,
                    };
                    Ok(Some((location.clone(), entry)))
                },
                )
                .collect::<CoreResult<_>>()
        })?;

        for (location, entry) in stored.into_iter().flatten() {
            location
                .entries_mut(instance_id, &mut data)?
                .push(serde_json::to_value(&entry)?);
            outcome.uploaded += 1;
        }
        outcome.duplicates_skipped = uploads.len() - outcome.uploaded;

        instance.data = Value::Object(data);
        tracing::info!(
            instance = %instance_id,
            uploaded = outcome.uploaded,
            skipped = outcome.duplicates_skipped,
            restored = outcome.restored,
            "checklist data merged"
        );
        Ok(outcome)
    }

    /// Removes a stored file and its entry from an instance.
    ///
    /// Every location whose bucket is `bucket` is scanned, premises and parameters included.
    ///
    /// # Returns
    ///
    /// `true` if an entry named `name` was found and removed; `false` (logged) otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or the blob store fails. A blob that is already
    /// gone is not an error.
    pub fn delete_file(
        &self,
        instance: &mut ChecklistInstance,
        name: &str,
        bucket: &str,
    ) -> CoreResult<bool> {
        let mut data = instance.data_object()?;
        let mut found = false;

        for (location, entries) in file_lists(&data) {
            if location.bucket() != bucket || !entries.iter().any(|e| e.name == name) {
                continue;
            }
            location
                .entries_mut(instance.id, &mut data)?
                .retain(|v| v.get("name").and_then(Value::as_str) != Some(name));
            found = true;
        }

        if !found {
            tracing::warn!(
                "no file '{}' in bucket '{}' of checklist {}",
                name,
                bucket,
                instance.id
            );
            return Ok(false);
        }

        self.delete_blob(name)?;
        instance.data = Value::Object(data);
        Ok(true)
    }

    /// Deletes every stored file referenced by an instance, before the instance itself goes.
    ///
    /// Returns the number of files referenced.
    pub fn purge_instance_files(&self, instance: &ChecklistInstance) -> CoreResult<usize> {
        let data = instance.data_object()?;
        let mut count = 0;
        for (_, entries) in file_lists(&data) {
            for entry in entries {
                self.delete_blob(&entry.name)?;
                count += 1;
            }
        }
        tracing::debug!("purged {} files of checklist {}", count, instance.id);
        Ok(count)
    }

    fn delete_blob(&self, file_name: &str) -> CoreResult<()> {
        let key = ObjectKey::from_file_name(file_name);
        match self
            .blobs
            .delete(&key.name, &key.extension, self.config.checklist_bucket())
        {
            Ok(()) => Ok(()),
            Err(FilesError::NotFound(what)) => {
                tracing::warn!("stored file already gone: {}", what);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Extension of the stored object: the uploaded name's, else one guessed from the content.
fn stored_extension(file_name: &str, bytes: &[u8]) -> String {
    let extension = ObjectKey::from_file_name(file_name).extension.to_ascii_lowercase();
    if !extension.is_empty() {
        return extension;
    }
    match report_files::detect_media_type(bytes) {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("application/pdf") => "pdf",
        _ => "bin",
    }
    .to_string()
}
