//! Partition fixtures.

use crate::source::PartitionId;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Header used by [`sequential_partitions`].
pub const SEQUENTIAL_HEADER: &str = "id,partition,value";

/// Render a CSV partition: `header` then one line per row, each `\n`-terminated.
///
/// Fields are joined verbatim; quote them yourself if they need it.
///
/// ```
/// use streammerge::testing::csv_partition;
///
/// assert_eq!(csv_partition("id,name", &[&["1", "Ann"]]), "id,name\n1,Ann\n");
/// ```
#[must_use]
pub fn csv_partition(header: &str, rows: &[&[&str]]) -> String {
    let mut out = String::with_capacity(header.len() + 1 + rows.len() * 16);
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// `count` partitions named `part-0000.csv`, `part-0001.csv`, ... each with
/// [`SEQUENTIAL_HEADER`] and `rows_each` data rows. Ids in the `id` column run
/// from 0 across all partitions, so merged output is easy to check for order.
#[must_use]
pub fn sequential_partitions(count: usize, rows_each: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|p| {
            let mut body = String::from(SEQUENTIAL_HEADER);
            body.push('\n');
            for r in 0..rows_each {
                let id = p * rows_each + r;
                body.push_str(&format!("{id},{p},value-{id}\n"));
            }
            (format!("part-{p:04}.csv"), body)
        })
        .collect()
}

/// Identifiers of `(id, payload)` pairs, in order.
#[must_use]
pub fn partition_ids<K: AsRef<str>, V>(pairs: &[(K, V)]) -> Vec<PartitionId> {
    pairs.iter().map(|(k, _)| PartitionId::new(k.as_ref())).collect()
}

/// Write `(relative path, payload)` pairs under `dir` and return their ids.
///
/// # Errors
///
/// Returns an error if a directory or file cannot be created.
pub fn write_partitions<K, V>(dir: &Path, pairs: &[(K, V)]) -> Result<Vec<PartitionId>>
where
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    for (name, payload) in pairs {
        let path = dir.join(name.as_ref());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        fs::write(&path, payload).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(partition_ids(pairs))
}

/// Gzip `data`, for exercising transparent decompression.
///
/// # Errors
///
/// Returns an error if the encoder fails.
#[cfg(feature = "compression-gzip")]
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
