//! The authorized-prefix whitelist.
//!
//! Loaded once from a CSV file before the listener starts and never mutated
//! afterwards, so lookups need no synchronization.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Error type for prefix file loading.
#[derive(Debug, thiserror::Error)]
pub enum PrefixLoadError {
    #[error("cannot read authorized prefix file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable set of authorized prefixes. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizedPrefixSet {
    prefixes: HashSet<String>,
}

impl AuthorizedPrefixSet {
    /// Load the set from a CSV file, taking the first column of every line.
    pub fn load(path: &Path) -> Result<Self, PrefixLoadError> {
        let io_err = |source| PrefixLoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let set = Self::from_reader(BufReader::new(file)).map_err(io_err)?;

        tracing::info!(path = %path.display(), count = set.len(), "Authorized prefixes loaded");
        Ok(set)
    }

    /// Build the set from any line-oriented source.
    ///
    /// Lines with an empty first field are skipped, so the empty string is
    /// never authorized.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut prefixes = HashSet::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            let first = line.split(',').next().unwrap_or_default();
            if first.is_empty() {
                skipped += 1;
                continue;
            }
            prefixes.insert(first.to_string());
        }

        if skipped > 0 {
            tracing::warn!(skipped, "Ignored prefix lines with an empty first field");
        }
        Ok(Self { prefixes })
    }

    pub fn contains(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.prefixes.contains(prefix)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AuthorizedPrefixSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            prefixes: iter
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }
}
