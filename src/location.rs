//! URI parsing / 路径解析
//!
//! `scheme://bucket/path` is split into a [`RemoteLocation`]. The path, minus its
//! single leading `/`, becomes the object key prefix. A trailing `/` marks a
//! folder; its absence marks a file (or an unanchored filter prefix).

use std::fmt;

use url::Url;

use crate::error::{Result, StorageError};

/// Path separator used in object keys
pub const SEPARATOR: char = '/';

/// A `(scheme, bucket, prefix)` triple. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocation {
    scheme: String,
    bucket: String,
    prefix: String,
}

impl RemoteLocation {
    /// Parse `scheme://bucket/path`. Only fails on a malformed URI; the bucket is not checked.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let Some((scheme, rest)) = uri.split_once("://") else {
            return Err(StorageError::invalid_uri(uri, "missing scheme"));
        };
        if !is_valid_scheme(scheme) {
            return Err(StorageError::invalid_uri(uri, "malformed scheme"));
        }

        let url = Url::parse(uri).map_err(|e| StorageError::invalid_uri(uri, &e.to_string()))?;
        let bucket = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(StorageError::invalid_uri(uri, "missing bucket")),
        };
        // `Url` lowercases the host of special schemes; keep the bucket as written.
        let bucket = rest
            .get(..bucket.len())
            .filter(|raw| raw.eq_ignore_ascii_case(&bucket))
            .map(str::to_string)
            .unwrap_or(bucket);

        let path = urlencoding::decode(url.path())
            .map_err(|e| StorageError::invalid_uri(uri, &e.to_string()))?;
        let prefix = path.strip_prefix(SEPARATOR).unwrap_or(&path).to_string();

        Ok(Self {
            scheme: url.scheme().to_string(),
            bucket,
            prefix,
        })
    }

    pub fn new(scheme: impl Into<String>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.strip_prefix(SEPARATOR).map(str::to_string).unwrap_or(prefix);
        Self {
            scheme: scheme.into(),
            bucket: bucket.into(),
            prefix,
        }
    }

    /// Parse and force folder shape (trailing `/`, or empty for the bucket root)
    pub fn folder(uri: &str) -> Result<Self> {
        Ok(Self::parse(uri)?.into_folder())
    }

    /// Parse and require file shape
    pub fn file(uri: &str) -> Result<Self> {
        let location = Self::parse(uri)?;
        if location.is_root() || location.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "{} does not name a file",
                location
            )));
        }
        Ok(location)
    }

    pub fn into_folder(mut self) -> Self {
        if !self.prefix.is_empty() && !self.prefix.ends_with(SEPARATOR) {
            self.prefix.push(SEPARATOR);
        }
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_root(&self) -> bool {
        self.prefix.is_empty()
    }

    pub fn is_folder(&self) -> bool {
        self.prefix.ends_with(SEPARATOR)
    }

    /// Full URI, `scheme://bucket/prefix`
    pub fn uri(&self) -> String {
        format!("{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }

    /// Last non-empty segment of the prefix; the bucket name for the root
    pub fn basename(&self) -> &str {
        self.prefix
            .trim_end_matches(SEPARATOR)
            .rsplit(SEPARATOR)
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.bucket)
    }

    pub fn name(&self) -> &str {
        self.basename()
    }

    /// Location of a direct child; `name` ending with `/` yields a folder
    pub fn child(&self, name: &str) -> Self {
        let base = self.clone().into_folder();
        Self {
            scheme: base.scheme,
            bucket: base.bucket,
            prefix: format!("{}{}", base.prefix, name.trim_start_matches(SEPARATOR)),
        }
    }

    /// Location of the containing folder; `None` for the bucket root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let trimmed = self.prefix.trim_end_matches(SEPARATOR);
        let prefix = match trimmed.rfind(SEPARATOR) {
            Some(pos) => trimmed[..=pos].to_string(),
            None => String::new(),
        };
        Some(Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            prefix,
        })
    }

    /// Same scheme and bucket, different prefix
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self::new(self.scheme.clone(), self.bucket.clone(), prefix)
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

impl std::str::FromStr for RemoteLocation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// RFC 3986 scheme: a letter followed by letters, digits, `+`, `-` or `.`
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let loc = RemoteLocation::parse("gs://aries_test").unwrap();
        assert_eq!(loc.bucket(), "aries_test");
        assert_eq!(loc.prefix(), "");
        assert!(loc.is_root());

        let loc = RemoteLocation::parse("gs://aries_test/").unwrap();
        assert_eq!(loc.bucket(), "aries_test");
        assert_eq!(loc.prefix(), "");

        let loc = RemoteLocation::parse("gs://aries_test/test_folder").unwrap();
        assert_eq!(loc.prefix(), "test_folder");
        assert!(!loc.is_folder());

        let loc = RemoteLocation::parse("s3://aries_test/test_folder/").unwrap();
        assert_eq!(loc.scheme(), "s3");
        assert_eq!(loc.prefix(), "test_folder/");
        assert!(loc.is_folder());

        let loc = RemoteLocation::folder("gs://aries_test/test_folder").unwrap();
        assert_eq!(loc.prefix(), "test_folder/");
    }

    #[test]
    fn test_parse_decodes_path() {
        let loc = RemoteLocation::parse("mem://b/dir/my%20file.txt").unwrap();
        assert_eq!(loc.prefix(), "dir/my file.txt");
    }

    #[test]
    fn test_parse_keeps_bucket_case() {
        let loc = RemoteLocation::parse("file://MyBucket/a.txt").unwrap();
        assert_eq!(loc.bucket(), "MyBucket");
        assert_eq!(loc.prefix(), "a.txt");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            RemoteLocation::parse("bucket/path"),
            Err(StorageError::InvalidUri { .. })
        ));
        assert!(matches!(
            RemoteLocation::parse("1s3://bucket/path"),
            Err(StorageError::InvalidUri { .. })
        ));
        assert!(matches!(
            RemoteLocation::parse("s3:///path"),
            Err(StorageError::InvalidUri { .. })
        ));
        assert!(RemoteLocation::file("s3://b/folder/").is_err());
        assert!(RemoteLocation::file("s3://b").is_err());
    }

    #[test]
    fn test_names_and_navigation() {
        let loc = RemoteLocation::parse("s3://b/a/b/c/").unwrap();
        assert_eq!(loc.basename(), "c");
        assert_eq!(loc.parent().unwrap().prefix(), "a/b/");
        assert_eq!(loc.child("d.txt").prefix(), "a/b/c/d.txt");
        assert_eq!(loc.child("e/").uri(), "s3://b/a/b/c/e/");

        let root = RemoteLocation::parse("s3://b").unwrap();
        assert_eq!(root.basename(), "b");
        assert!(root.parent().is_none());
        assert_eq!(root.child("x.txt").prefix(), "x.txt");

        let file = RemoteLocation::parse("s3://b/x.txt").unwrap();
        assert_eq!(file.parent().unwrap().prefix(), "");
        assert_eq!(file.to_string(), "s3://b/x.txt");
    }
}
