use crate::error::*;
use regex::Regex;
use std::fmt;

/// Tag of an image in the repository
///
/// In [OCI distribution spec](https://github.com/opencontainers/distribution-spec/blob/main/spec.md):
/// > `<reference>` as a tag MUST be at most 128 characters
/// > in length and MUST match the following regular expression:
/// > ```text
/// > [a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}
/// > ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

lazy_static::lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap();
}

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn new(tag: &str) -> Result<Self> {
        if TAG_RE.is_match(tag) {
            Ok(Tag(tag.to_string()))
        } else {
            Err(Error::InvalidTag(tag.to_string()))
        }
    }

    pub fn latest() -> Self {
        Tag("latest".to_string())
    }
}
