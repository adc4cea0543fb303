//! Build request and result values exchanged with the coordinator.

use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// The inputs of one build: file names mapped to file contents, in the
/// order the host listed them.
///
/// Entries with a recognized source extension are compiled; all others are
/// auxiliary inputs (headers and the like) that are written but not compiled
/// directly. JSON objects deserialize into this preserving document order,
/// which is why this is a vector of pairs rather than a map.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    files: Vec<(String, Vec<u8>)>,
}

impl BuildRequest {
    #[must_use]
    pub fn new(files: Vec<(String, Vec<u8>)>) -> Self {
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[(String, Vec<u8>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<'de> Deserialize<'de> for BuildRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FilesVisitor;

        impl<'de> Visitor<'de> for FilesVisitor {
            type Value = Vec<(String, Vec<u8>)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of file names to byte arrays")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut files = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Vec<u8>>()? {
                    files.push(entry);
                }
                Ok(files)
            }
        }

        Ok(Self {
            files: deserializer.deserialize_map(FilesVisitor)?,
        })
    }
}

/// The build stage in which a failure was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailingStage {
    Compile,
    Link,
    Convert,
}

impl FailingStage {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Link => "link",
            Self::Convert => "convert",
        }
    }
}

/// Terminal value of one build; never reused across builds.
#[derive(Debug, Clone)]
pub struct BuildResult {
    succeeded: bool,
    artifact: Option<Vec<u8>>,
    failing_stage: Option<FailingStage>,
    diagnostic: Option<String>,
}

impl BuildResult {
    #[must_use]
    pub fn success(artifact: Vec<u8>) -> Self {
        Self {
            succeeded: true,
            artifact: Some(artifact),
            failing_stage: None,
            diagnostic: None,
        }
    }

    #[must_use]
    pub fn failure(stage: FailingStage, diagnostic: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            artifact: None,
            failing_stage: Some(stage),
            diagnostic: Some(diagnostic.into()),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    #[must_use]
    pub fn artifact(&self) -> Option<&[u8]> {
        self.artifact.as_deref()
    }

    #[must_use]
    pub fn failing_stage(&self) -> Option<FailingStage> {
        self.failing_stage
    }

    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}
