//! Opaque file payloads
//!
//! Anything extracted from a container, and any input no scheme recognizes,
//! is exposed as a [`ResourceFile`]: a name paired with a view of bytes.
//! Downstream layers decide what the bytes mean.

use crate::memory::MemoryView;
use crate::scheme::{self, ParsedFile};
use crate::error::Result;

/// A named, uninterpreted span of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    name: String,
    data: MemoryView,
}

impl ResourceFile {
    pub fn new<S: Into<String>>(name: S, data: MemoryView) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload with its position reset to zero.
    pub fn data(&self) -> MemoryView {
        self.data.clone_clean()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Run the scheme dispatcher over this resource's payload.
    ///
    /// Container entries are often themselves containers or serialized
    /// files; this parses them in place without copying the payload.
    pub fn parse(&self) -> Result<ParsedFile> {
        scheme::read_file(self.data(), self.name.clone())
    }
}

impl std::fmt::Display for ResourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.data.len())
    }
}
