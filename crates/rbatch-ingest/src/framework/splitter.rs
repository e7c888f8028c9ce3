//! Splits the staged source file into header-carrying partition files
//!
//! Works on raw bytes so the source encoding passes through untouched; only
//! the line terminator is normalised to `\n`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::types::PartitionDescriptor;
use crate::error::{IngestError, Result};

pub const DEFAULT_PARTITION_PREFIX: &str = "restaurant-part-";

/// Path of partition `index` inside `dir`
pub fn partition_path(dir: &Path, prefix: &str, index: usize) -> PathBuf {
    dir.join(format!("{}{:03}.csv", prefix, index))
}

/// Whether `path` names a partition artifact with this prefix
pub fn is_partition_file(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(prefix) && n.ends_with(".csv"))
        .unwrap_or(false)
}

/// Number of lines after the header; 0 for an empty file
pub fn count_body_lines(source: &Path) -> Result<usize> {
    let file = File::open(source).map_err(|e| IngestError::io(source, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut lines = 0usize;

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| IngestError::io(source, e))?;
        if n == 0 {
            break;
        }
        lines += 1;
    }

    Ok(lines.saturating_sub(1))
}

/// Remove partition artifacts left behind by an earlier run
pub fn clear_partitions(dir: &Path, prefix: &str) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))? {
        let path = entry.map_err(|e| IngestError::io(dir, e))?.path();
        if path.is_file() && is_partition_file(&path, prefix) {
            fs::remove_file(&path).map_err(|e| IngestError::io(&path, e))?;
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(dir = %dir.display(), removed, "Cleared stale partition files");
    }
    Ok(removed)
}

/// Split `source` into files of at most `partition_size` body lines
///
/// Every partition starts with a copy of the source header. A trailing
/// partial partition is still written. Any I/O failure aborts the split.
pub fn split(
    source: &Path,
    dest_dir: &Path,
    prefix: &str,
    partition_size: usize,
) -> Result<Vec<PartitionDescriptor>> {
    let partition_size = partition_size.max(1);

    fs::create_dir_all(dest_dir).map_err(|e| IngestError::io(dest_dir, e))?;
    clear_partitions(dest_dir, prefix)?;

    let file = File::open(source).map_err(|e| IngestError::io(source, e))?;
    let mut reader = BufReader::new(file);

    let Some(header) = read_line(&mut reader, source)? else {
        warn!(source = %source.display(), "Source file is empty, nothing to split");
        return Ok(Vec::new());
    };

    let mut partitions = Vec::new();
    let mut buffer: Vec<Vec<u8>> = Vec::with_capacity(partition_size.min(100_000));

    while let Some(line) = read_line(&mut reader, source)? {
        buffer.push(line);
        if buffer.len() == partition_size {
            partitions.push(write_partition(
                dest_dir,
                prefix,
                partitions.len(),
                partition_size,
                &header,
                &buffer,
            )?);
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        partitions.push(write_partition(
            dest_dir,
            prefix,
            partitions.len(),
            partition_size,
            &header,
            &buffer,
        )?);
    }

    info!(
        source = %source.display(),
        partitions = partitions.len(),
        partition_size,
        "Source split into partitions"
    );

    Ok(partitions)
}

/// Next line without its terminator, `None` at end of input
fn read_line<R: BufRead>(reader: &mut R, source: &Path) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .map_err(|e| IngestError::io(source, e))?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn write_partition(
    dir: &Path,
    prefix: &str,
    index: usize,
    line_bound: usize,
    header: &[u8],
    lines: &[Vec<u8>],
) -> Result<PartitionDescriptor> {
    let path = partition_path(dir, prefix, index);
    let file = File::create(&path).map_err(|e| IngestError::io(&path, e))?;
    let mut writer = BufWriter::new(file);

    let io = |e| IngestError::io(&path, e);
    writer.write_all(header).map_err(io)?;
    writer.write_all(b"\n").map_err(io)?;
    for line in lines {
        writer.write_all(line).map_err(io)?;
        writer.write_all(b"\n").map_err(io)?;
    }
    writer.flush().map_err(io)?;

    debug!(path = %path.display(), lines = lines.len(), "Wrote partition");

    Ok(PartitionDescriptor {
        index,
        path,
        line_bound,
    })
}
