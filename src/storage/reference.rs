use std::fmt;
use std::str::FromStr;

use crate::core::error::ReferenceError;

/// Separator between bucket and key in the persisted encoding.
pub const REFERENCE_DELIMITER: char = ',';

/// Address of one object in the remote store.
///
/// Persisted on the video record as `"bucket,key"`. Neither part may be
/// empty or contain the delimiter, so the encoding always round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageReference {
    bucket: String,
    key: String,
}

impl StorageReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, ReferenceError> {
        let bucket = bucket.into();
        let key = key.into();
        check_part("bucket", &bucket)?;
        check_part("key", &key)?;
        Ok(Self { bucket, key })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The persisted `"bucket,key"` form.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

fn check_part(part: &'static str, value: &str) -> Result<(), ReferenceError> {
    if value.is_empty() {
        return Err(ReferenceError::EmptyPart { part });
    }
    if value.contains(REFERENCE_DELIMITER) {
        return Err(ReferenceError::DelimiterInPart { part });
    }
    Ok(())
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.bucket, REFERENCE_DELIMITER, self.key)
    }
}

impl FromStr for StorageReference {
    type Err = ReferenceError;

    /// Decode `"bucket,key"`. Zero or several delimiters is an error; the
    /// input is never truncated to make it fit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let found = s.matches(REFERENCE_DELIMITER).count();
        if found != 1 {
            return Err(ReferenceError::DelimiterCount { found });
        }
        let (bucket, key) = s
            .split_once(REFERENCE_DELIMITER)
            .ok_or(ReferenceError::DelimiterCount { found: 0 })?;
        Self::new(bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let reference = StorageReference::new("tubely-media", "landscape/abc_-x.mp4").unwrap();
        let encoded = reference.encode();
        assert_eq!(encoded, "tubely-media,landscape/abc_-x.mp4");
        assert_eq!(encoded.parse::<StorageReference>().unwrap(), reference);
    }

    #[test]
    fn test_no_delimiter_rejected() {
        assert_eq!(
            "bucket-only".parse::<StorageReference>(),
            Err(ReferenceError::DelimiterCount { found: 0 })
        );
    }

    #[test]
    fn test_two_delimiters_rejected() {
        assert_eq!(
            "a,b,c".parse::<StorageReference>(),
            Err(ReferenceError::DelimiterCount { found: 2 })
        );
    }

    #[test]
    fn test_empty_parts_rejected() {
        assert_eq!(
            ",key".parse::<StorageReference>(),
            Err(ReferenceError::EmptyPart { part: "bucket" })
        );
        assert_eq!(
            "bucket,".parse::<StorageReference>(),
            Err(ReferenceError::EmptyPart { part: "key" })
        );
    }

    #[test]
    fn test_construction_rejects_delimiter() {
        assert_eq!(
            StorageReference::new("a,b", "k"),
            Err(ReferenceError::DelimiterInPart { part: "bucket" })
        );
        assert_eq!(
            StorageReference::new("b", "k,1"),
            Err(ReferenceError::DelimiterInPart { part: "key" })
        );
    }

    #[test]
    fn test_signed_url_is_not_a_reference() {
        assert!("https://example.com/a.mp4?X-Amz-Signature=abc"
            .parse::<StorageReference>()
            .is_err());
    }
}
