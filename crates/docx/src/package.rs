//! Zip package holding the parts of a word-processing document.

use crate::{DocxError, DocxResult};
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Ordered collection of named parts. Part order is preserved on write so that
/// `[Content_Types].xml` stays first, as consumers expect.
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Reads every part of a zip package into memory.
    ///
    /// # Errors
    ///
    /// Returns [`DocxError::Package`] if the bytes are not a readable zip archive.
    pub fn read(bytes: &[u8]) -> DocxResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DocxError::Package(format!("cannot open package: {}", e)))?;

        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| DocxError::Package(format!("cannot read part #{}: {}", index, e)))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)
                .map_err(|e| DocxError::Package(format!("cannot read part {}: {}", name, e)))?;
            parts.push((name, content));
        }

        Ok(Self { parts })
    }

    /// Writes all parts into a new deflate-compressed zip archive.
    ///
    /// # Errors
    ///
    /// Returns [`DocxError::Package`] if the archive cannot be written.
    pub fn write(&self) -> DocxResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in &self.parts {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| DocxError::Package(format!("cannot start part {}: {}", name, e)))?;
            writer
                .write_all(content)
                .map_err(|e| DocxError::Package(format!("cannot write part {}: {}", name, e)))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| DocxError::Package(format!("cannot finish package: {}", e)))?;
        Ok(cursor.into_inner())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_slice())
    }

    /// Returns a part decoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`DocxError::MissingPart`] when absent and [`DocxError::Package`] when the part is
    /// not valid UTF-8.
    pub fn get_str(&self, name: &str) -> DocxResult<&str> {
        let bytes = self
            .get(name)
            .ok_or_else(|| DocxError::MissingPart(name.to_string()))?;
        std::str::from_utf8(bytes)
            .map_err(|e| DocxError::Package(format!("part {} is not UTF-8: {}", name, e)))
    }

    /// Inserts or replaces a part, keeping the position of an existing one.
    pub fn put(&mut self, name: impl Into<String>, content: Vec<u8>) {
        let name = name.into();
        match self.parts.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = content,
            None => self.parts.push((name, content)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_round_trip_preserves_order_and_content() {
        let mut package = Package::default();
        package.put("[Content_Types].xml", b"<Types/>".to_vec());
        package.put("word/document.xml", b"<w:document/>".to_vec());
        package.put("[Content_Types].xml", b"<Types></Types>".to_vec());

        let bytes = package.write().unwrap();
        let read = Package::read(&bytes).unwrap();

        let names: Vec<_> = read.part_names().collect();
        assert_eq!(names, vec!["[Content_Types].xml", "word/document.xml"]);
        assert_eq!(read.get_str("[Content_Types].xml").unwrap(), "<Types></Types>");
    }

    #[test]
    fn test_read_rejects_non_zip_bytes() {
        assert!(matches!(
            Package::read(b"not a zip"),
            Err(DocxError::Package(_))
        ));
    }

    #[test]
    fn test_missing_part_is_reported() {
        let package = Package::default();
        assert!(matches!(
            package.get_str("word/document.xml"),
            Err(DocxError::MissingPart(_))
        ));
    }
}
