use super::location::{FileLocation, KEY_SEPARATOR};
use super::FileDataMerger;
use crate::constants::DEFAULT_TEMPLATE;
use crate::registry::Strategy;
use crate::{CoreError, CoreResult};

/// Merges files keyed as `bucket` or `parameter__bucket`.
#[derive(Debug, Default)]
pub struct BucketMerger;

impl Strategy for BucketMerger {
    fn handles(&self) -> &[&'static str] {
        &[DEFAULT_TEMPLATE]
    }

    fn is_default(&self) -> bool {
        true
    }
}

impl FileDataMerger for BucketMerger {
    fn parse_location(&self, key: &str) -> CoreResult<FileLocation> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(CoreError::InvalidInput(format!("malformed file key '{}'", key)));
        }
        match parts.as_slice() {
            [bucket] => Ok(FileLocation::Bucket {
                bucket: bucket.to_string(),
            }),
            [parameter, bucket] => Ok(FileLocation::ParameterBucket {
                parameter: parameter.to_string(),
                bucket: bucket.to_string(),
            }),
            _ => Err(CoreError::InvalidInput(format!(
                "file key '{}' has too many parts",
                key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        assert_eq!(
            BucketMerger.parse_location("photos").unwrap(),
            FileLocation::Bucket {
                bucket: "photos".into()
            }
        );
        assert_eq!(
            BucketMerger.parse_location("walls__photos").unwrap(),
            FileLocation::ParameterBucket {
                parameter: "walls".into(),
                bucket: "photos".into()
            }
        );
        assert!(BucketMerger.parse_location("a__b__c").is_err());
        assert!(BucketMerger.parse_location("walls__").is_err());
        assert!(BucketMerger.parse_location("").is_err());
    }
}
