//! File globbing for partition discovery.
//!
//! Partition files are usually laid out as `exports/part-0001.csv`,
//! `exports/part-0002.csv.gz`, ... This module expands such patterns into a
//! deterministic, lexicographically sorted file list, which then becomes the
//! merge order.
//!
//! # Examples
//!
//! ```no_run
//! use streammerge::io::glob::expand_glob;
//!
//! let files = expand_glob("exports/part-*.csv*")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Supports standard glob patterns (`*`, `?`, `**`, `[abc]`, `[!abc]`).
/// Directories are skipped.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a matched entry cannot be read.
/// Zero matches is not an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }

    // Sort for deterministic order
    result.sort();

    Ok(result)
}

/// Expand a glob pattern, returning an error if no files are found.
///
/// # Errors
///
/// Returns an error if the pattern is invalid, an entry cannot be read, or
/// nothing matches.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    Ok(files)
}

/// Expand `pattern` relative to `root` and return the matches as `/`-separated
/// paths relative to `root`, sorted.
///
/// # Errors
///
/// Returns an error if `root` is not valid UTF-8, the pattern is invalid, or
/// nothing matches.
pub fn expand_relative(root: &Path, pattern: &str) -> Result<Vec<String>> {
    let root_str = root
        .to_str()
        .with_context(|| format!("non UTF-8 root: {}", root.display()))?;
    let escaped = glob::Pattern::escape(root_str);
    let full = format!("{}/{pattern}", escaped.trim_end_matches('/'));
    expand_glob_required(&full)?
        .into_iter()
        .map(|path| {
            let rel = path
                .strip_prefix(root)
                .with_context(|| format!("{} escapes {}", path.display(), root.display()))?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Ok(parts.join("/"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn matches_are_sorted_and_files_only() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("part-2.csv"), "a\n")?;
        fs::write(dir.path().join("part-1.csv"), "a\n")?;
        fs::create_dir(dir.path().join("part-3.csv"))?;

        let ids = expand_relative(dir.path(), "part-*.csv")?;
        assert_eq!(ids, vec!["part-1.csv", "part-2.csv"]);
        Ok(())
    }

    #[test]
    fn nested_matches_use_forward_slashes() -> Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("day=01"))?;
        fs::write(dir.path().join("day=01").join("p.csv"), "a\n")?;

        let ids = expand_relative(dir.path(), "**/*.csv")?;
        assert_eq!(ids, vec!["day=01/p.csv"]);
        Ok(())
    }

    #[test]
    fn no_match_is_an_error_when_required() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(expand_relative(dir.path(), "*.csv").is_err());
        assert!(expand_glob(&format!("{}/*.csv", dir.path().display()))?.is_empty());
        Ok(())
    }
}
