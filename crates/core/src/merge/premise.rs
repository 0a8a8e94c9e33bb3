use super::location::{FileLocation, KEY_SEPARATOR};
use super::FileDataMerger;
use crate::constants::{DEFECT_TEMPLATE, PREMISE_PHOTOS_KEY};
use crate::registry::Strategy;
use crate::{CoreError, CoreResult};

/// Buckets that hang off a premise itself rather than off one of its parameters.
const PREMISE_LEVEL_BUCKETS: [&str; 2] = [PREMISE_PHOTOS_KEY, "premise_plans"];

/// Merges files for templates organised by premises.
///
/// Keys are `premise__parameter__bucket`, `premise__bucket` for the premise-level buckets, and
/// otherwise `parameter__bucket` or a bare `bucket`.
#[derive(Debug, Default)]
pub struct PremiseMerger;

impl Strategy for PremiseMerger {
    fn handles(&self) -> &[&'static str] {
        &[DEFECT_TEMPLATE]
    }
}

impl FileDataMerger for PremiseMerger {
    fn parse_location(&self, key: &str) -> CoreResult<FileLocation> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(CoreError::InvalidInput(format!("malformed file key '{}'", key)));
        }
        match parts.as_slice() {
            [premise, parameter, bucket] => Ok(FileLocation::PremiseParameterBucket {
                premise: premise.to_string(),
                parameter: parameter.to_string(),
                bucket: bucket.to_string(),
            }),
            [premise, bucket] if PREMISE_LEVEL_BUCKETS.contains(bucket) => {
                Ok(FileLocation::PremiseBucket {
                    premise: premise.to_string(),
                    bucket: bucket.to_string(),
                })
            }
            [parameter, bucket] => Ok(FileLocation::ParameterBucket {
                parameter: parameter.to_string(),
                bucket: bucket.to_string(),
            }),
            [bucket] => Ok(FileLocation::Bucket {
                bucket: bucket.to_string(),
            }),
            _ => Err(CoreError::InvalidInput(format!(
                "file key '{}' has too many parts",
                key
            ))),
        }
    }
}
