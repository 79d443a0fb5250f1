// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment path resolution.
//!
//! The message store records attachment paths that are often `~`-prefixed
//! and sometimes stale after library moves. Resolution tries the recorded
//! path first, then re-roots the trailing path components under the
//! configured attachments directory, then falls back to a bounded
//! directory walk matching the transfer name. Results are cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, trace};

/// Number of trailing path components that stay stable across library moves.
const STABLE_COMPONENTS: usize = 4;

/// Upper bound on directory entries visited during the fallback walk.
const MAX_WALK_ENTRIES: usize = 4096;

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolves stored attachment paths to files on disk.
pub struct AttachmentResolver {
    root: PathBuf,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl AttachmentResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a stored path and/or transfer name to an existing file.
    pub fn resolve(
        &self,
        stored_path: Option<&str>,
        transfer_name: Option<&str>,
    ) -> Option<PathBuf> {
        let cache_key = format!(
            "{}|{}",
            stored_path.unwrap_or_default(),
            transfer_name.unwrap_or_default()
        );
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&cache_key) {
                trace!(key = %cache_key, "attachment cache hit");
                return hit.clone();
            }
        }

        let resolved = self.resolve_uncached(stored_path, transfer_name);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(cache_key, resolved.clone());
        }
        resolved
    }

    fn resolve_uncached(
        &self,
        stored_path: Option<&str>,
        transfer_name: Option<&str>,
    ) -> Option<PathBuf> {
        if let Some(stored) = stored_path {
            let direct = expand_tilde(stored);
            if direct.is_file() {
                return Some(direct);
            }

            // Re-root the stable tail of the recorded path.
            let components: Vec<_> = direct
                .components()
                .rev()
                .take(STABLE_COMPONENTS)
                .collect();
            let mut rerooted = self.root.clone();
            for component in components.iter().rev() {
                rerooted.push(component.as_os_str());
            }
            if rerooted.is_file() {
                debug!(path = %rerooted.display(), "attachment found via re-rooted tail");
                return Some(rerooted);
            }
        }

        // Last resort: walk the attachments root looking for the file name.
        let needle = transfer_name.map(str::to_string).or_else(|| {
            stored_path
                .map(expand_tilde)
                .as_deref()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .map(str::to_string)
        })?;

        let mut budget = MAX_WALK_ENTRIES;
        let found = walk_for(&self.root, &needle, &mut budget);
        if found.is_some() {
            debug!(name = %needle, "attachment found via directory walk");
        }
        found
    }
}

fn walk_for(dir: &Path, needle: &str, budget: &mut usize) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        if *budget == 0 {
            return None;
        }
        *budget -= 1;

        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = walk_for(&path, needle, budget) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(needle) {
            return Some(path);
        }
    }
    None
}
