//! Atomic Store (C2): writes a byte payload or a columnar table to a path
//! with crash-safe semantics — an observer sees either the prior content or
//! the complete new content, never a partial prefix.
//!
//! Temp-path-then-rename with parent dir creation, shared by any byte
//! payload or Arrow `RecordBatch` writer.

use crate::error::StoreError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs;
use std::io::Write;
use std::path::Path;

fn temp_sibling(final_path: &Path) -> std::path::PathBuf {
    let suffix = uuid::Uuid::new_v4();
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data");
    final_path.with_file_name(format!(".{file_name}.{suffix}.tmp"))
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

fn atomic_rename(tmp_path: &Path, final_path: &Path) -> Result<(), StoreError> {
    if let Err(err) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(StoreError::Rename {
            from: tmp_path.display().to_string(),
            to: final_path.display().to_string(),
            source: err,
        });
    }
    Ok(())
}

/// Write an exact byte payload to `final_path` atomically. Used for raw
/// artifacts (verbatim upstream bytes) and ledger JSON documents.
pub fn put_bytes(final_path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    ensure_parent(final_path)?;
    let tmp_path = temp_sibling(final_path);

    let result = (|| -> Result<(), StoreError> {
        let mut file = fs::File::create(&tmp_path).map_err(|source| StoreError::WriteTemp {
            path: tmp_path.display().to_string(),
            source,
        })?;
        file.write_all(payload)
            .map_err(|source| StoreError::WriteTemp {
                path: tmp_path.display().to_string(),
                source,
            })?;
        file.sync_all().map_err(|source| StoreError::WriteTemp {
            path: tmp_path.display().to_string(),
            source,
        })?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
        return result;
    }

    atomic_rename(&tmp_path, final_path)
}

/// Write one Arrow `RecordBatch` as a compressed Parquet file at
/// `final_path` atomically. Used for monthly refined partitions.
pub fn put_table(final_path: &Path, batch: &RecordBatch) -> Result<(), StoreError> {
    ensure_parent(final_path)?;
    let tmp_path = temp_sibling(final_path);

    let result = (|| -> Result<(), StoreError> {
        let file = fs::File::create(&tmp_path).map_err(|source| StoreError::WriteTemp {
            path: tmp_path.display().to_string(),
            source,
        })?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).map_err(
            |source| StoreError::Encode {
                path: tmp_path.display().to_string(),
                source,
            },
        )?;

        writer
            .write(batch)
            .map_err(|source| StoreError::Encode {
                path: tmp_path.display().to_string(),
                source,
            })?;

        writer
            .close()
            .map_err(|source| StoreError::Encode {
                path: tmp_path.display().to_string(),
                source,
            })?;

        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
        return result;
    }

    atomic_rename(&tmp_path, final_path)
}
