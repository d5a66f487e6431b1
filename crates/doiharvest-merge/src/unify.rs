//! Cross-shard schema unification
//!
//! Reads only Parquet footers. The unified schema is the union of all
//! columns; shared columns with drifting types widen, and columns with a
//! declared canonical type always take that type. Paths are processed in
//! sorted order so the result does not depend on the order shards are given.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{MergeError, ShardReadError};

/// Unified schema plus which shards contributed to it.
#[derive(Debug)]
pub struct UnifiedSchema {
    pub schema: SchemaRef,
    /// Shards whose schema was read, in sorted order
    pub readable: Vec<PathBuf>,
    /// Shards whose footer could not be read
    pub skipped: Vec<PathBuf>,
}

/// Arrow schema stored in a Parquet footer.
pub fn read_schema(path: &Path) -> Result<SchemaRef, ShardReadError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().clone())
}

fn int_rank(dt: &DataType) -> u8 {
    match dt {
        DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 => 3,
        _ => 4,
    }
}

fn float_rank(dt: &DataType) -> u8 {
    match dt {
        DataType::Float16 => 1,
        DataType::Float32 => 2,
        _ => 3,
    }
}

fn signed_for(rank: u8) -> DataType {
    match rank {
        1 => DataType::Int8,
        2 => DataType::Int16,
        3 => DataType::Int32,
        _ => DataType::Int64,
    }
}

/// Common type of two observations of the same column.
pub fn widen(a: &DataType, b: &DataType) -> DataType {
    use DataType::*;

    if a == b {
        return a.clone();
    }
    match (a, b) {
        (Null, other) | (other, Null) => other.clone(),
        _ if a.is_integer() && b.is_integer() => {
            if a.is_signed_integer() == b.is_signed_integer() {
                return if int_rank(a) >= int_rank(b) { a.clone() } else { b.clone() };
            }
            let (signed, unsigned) = if a.is_signed_integer() { (a, b) } else { (b, a) };
            // A signed type holds an unsigned one only when strictly wider
            if int_rank(signed) > int_rank(unsigned) {
                signed.clone()
            } else {
                signed_for((int_rank(unsigned) + 1).min(4))
            }
        }
        _ if a.is_floating() && b.is_floating() => {
            if float_rank(a) >= float_rank(b) { a.clone() } else { b.clone() }
        }
        _ if (a.is_integer() || a.is_floating()) && (b.is_integer() || b.is_floating()) => Float64,
        (Utf8 | LargeUtf8, Utf8 | LargeUtf8) => LargeUtf8,
        (LargeUtf8, _) | (_, LargeUtf8) => LargeUtf8,
        _ => Utf8,
    }
}

/// Fold observed schemas into one, then apply `canonical` overrides.
pub fn unify_schemas(schemas: &[SchemaRef], canonical: &[(String, DataType)]) -> Schema {
    let mut columns: Vec<(String, DataType)> = Vec::new();
    for schema in schemas {
        for field in schema.fields() {
            match columns.iter_mut().find(|(name, _)| name == field.name()) {
                Some((_, dt)) => *dt = widen(dt, field.data_type()),
                None => columns.push((field.name().clone(), field.data_type().clone())),
            }
        }
    }
    let fields: Vec<Field> = columns
        .into_iter()
        .map(|(name, dt)| {
            let dt = canonical
                .iter()
                .find(|(c, _)| *c == name)
                .map(|(_, t)| t.clone())
                .unwrap_or(dt);
            Field::new(name, dt, true)
        })
        .collect();
    Schema::new(fields)
}

/// Read every shard's schema and unify them.
///
/// Unreadable shards are logged and skipped; having none left is fatal.
pub fn unify(
    paths: &[PathBuf],
    canonical: &[(String, DataType)],
) -> Result<UnifiedSchema, MergeError> {
    let mut sorted = paths.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut schemas = Vec::with_capacity(sorted.len());
    let mut readable = Vec::with_capacity(sorted.len());
    let mut skipped = Vec::new();
    for path in sorted {
        match read_schema(&path) {
            Ok(schema) => {
                schemas.push(schema);
                readable.push(path);
            }
            Err(e) => {
                log::warn!("Could not read schema of {}: {e}", path.display());
                skipped.push(path);
            }
        }
    }

    if schemas.is_empty() {
        return Err(MergeError::NoReadableShards {
            candidates: paths.len(),
        });
    }

    let schema = unify_schemas(&schemas, canonical);
    log::info!(
        "Unified schema: {} columns from {} shards ({} skipped)",
        schema.fields().len(),
        readable.len(),
        skipped.len()
    );
    Ok(UnifiedSchema {
        schema: Arc::new(schema),
        readable,
        skipped,
    })
}
