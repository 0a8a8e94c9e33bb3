//! File entries embedded in checklist data, and the content hash that identifies them.

use sha2::{Digest, Sha256};

/// One stored attachment, as recorded inside a checklist instance's JSON.
///
/// `name` is the object name in the blob store including its extension, so the store key can
/// always be re-derived with [`ObjectKey::from_file_name`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Lowercase hex SHA-256 of the file content
    pub hash: String,
}

/// Blob-store key of an object: logical name and extension, stored as `<name>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub name: String,
    pub extension: String,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
        }
    }

    /// Splits a stored file name on its last dot.
    ///
    /// `"a1_photos_9f.jpg"` yields name `a1_photos_9f` and extension `jpg`; a name without a dot
    /// has an empty extension.
    pub fn from_file_name(file_name: &str) -> Self {
        match file_name.rsplit_once('.') {
            Some((name, extension)) if !name.is_empty() => Self::new(name, extension),
            _ => Self::new(file_name, ""),
        }
    }

    /// The object name as stored, `<name>.<extension>` or just `<name>`.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }
}

/// Computes the lowercase hex SHA-256 digest used for deduplication.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Best-effort media type detection from magic bytes.
///
/// This is not authoritative; `None` means the content was not recognised.
pub fn detect_media_type(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

/// True when the bytes look like a PDF document.
pub fn is_pdf(bytes: &[u8]) -> bool {
    detect_media_type(bytes) == Some("application/pdf")
}

/// True when the bytes look like a raster image.
pub fn is_image(bytes: &[u8]) -> bool {
    detect_media_type(bytes).is_some_and(|m| m.starts_with("image/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }

    #[test]
    fn test_object_key_from_file_name() {
        assert_eq!(
            ObjectKey::from_file_name("a1_photos_9f.jpg"),
            ObjectKey::new("a1_photos_9f", "jpg")
        );
        assert_eq!(
            ObjectKey::from_file_name("archive.tar.gz"),
            ObjectKey::new("archive.tar", "gz")
        );
        assert_eq!(ObjectKey::from_file_name("README"), ObjectKey::new("README", ""));
        assert_eq!(ObjectKey::from_file_name(".hidden"), ObjectKey::new(".hidden", ""));
    }

    #[test]
    fn test_object_key_file_name_round_trips() {
        for name in ["x.png", "plain"] {
            assert_eq!(ObjectKey::from_file_name(name).file_name(), name);
        }
    }

    #[test]
    fn test_file_entry_serialises_with_plain_keys() {
        let entry = FileEntry {
            id: "1".into(),
            name: "a.png".into(),
            url: "memory://b/a.png".into(),
            hash: "00".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["name"], "a.png");
        assert_eq!(json["hash"], "00");
    }

    #[test]
    fn test_media_type_detection() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(is_image(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0]));
        assert_eq!(detect_media_type(b"hello"), None);
    }
}
