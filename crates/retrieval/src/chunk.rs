//! Chunk identifiers.
//!
//! Textual form `[$]<group>-...-<section>`. A leading `$` marks an
//! ancestor-eligible (top-level) chunk. Within one group the section
//! number orders the chunks of a document.

use chatmesh_core::error::RetrievalError;
use std::fmt;
use std::str::FromStr;

/// Marker prefix for ancestor-eligible chunks.
pub const ANCESTOR_MARKER: char = '$';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    raw: String,
    group: u64,
    section: u64,
}

impl ChunkId {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn group(&self) -> u64 {
        self.group
    }

    pub fn section(&self) -> u64 {
        self.section
    }

    pub fn is_ancestor(&self) -> bool {
        is_ancestor_id(&self.raw)
    }

    /// Everything before the section number, marker included.
    fn prefix(&self) -> &str {
        // Parsing guarantees a '-'
        self.raw.rsplit_once('-').map_or("", |(prefix, _)| prefix)
    }

    /// The id of the sibling at `section` in the same sequence.
    pub fn sibling(&self, section: u64) -> String {
        format!("{}-{section}", self.prefix())
    }
}

/// Whether a raw id carries the ancestor marker.
pub fn is_ancestor_id(raw: &str) -> bool {
    raw.starts_with(ANCESTOR_MARKER)
}

impl FromStr for ChunkId {
    type Err = RetrievalError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || RetrievalError::MalformedChunkMetadata(format!("invalid chunk id '{raw}'"));

        let body = raw.strip_prefix(ANCESTOR_MARKER).unwrap_or(raw);
        let (first, rest) = body.split_once('-').ok_or_else(malformed)?;
        let last = rest.rsplit('-').next().ok_or_else(malformed)?;

        let group = first.trim().parse().map_err(|_| malformed())?;
        let section = last.trim().parse().map_err(|_| malformed())?;

        Ok(Self {
            raw: raw.to_string(),
            group,
            section,
        })
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
