//! Richer-record-wins deduplication
//!
//! Rows are ordered by richness (number of non-null signal columns)
//! descending, then by each date column ascending with missing dates last.
//! The sort is stable, so remaining ties keep input order. The first row per
//! identifier survives; rows with a null identifier are all kept.
//!
//! Input batches are never concatenated. Survivors are addressed as
//! `(batch, row)` pairs and gathered with `interleave` in bounded chunks, so
//! no single string column has to hold the whole merge.

use std::cmp::Ordering;

use arrow::array::{Array, ArrayRef, RecordBatch, RecordBatchOptions, StringArray};
use arrow::compute::{cast, interleave};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::error::ArrowError;
use rustc_hash::FxHashSet;

use crate::config::DedupKeys;

/// Position of one input row: (batch index, row index).
pub type RowRef = (usize, usize);

/// Column rendered as strings, or `None` when absent from the batch.
fn as_strings(batch: &RecordBatch, name: &str) -> Result<Option<StringArray>, ArrowError> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let utf8 = cast(column, &DataType::Utf8)?;
    Ok(utf8.as_any().downcast_ref::<StringArray>().cloned())
}

/// Non-null signal count per row.
pub fn richness(batch: &RecordBatch, signals: &[String]) -> Vec<u32> {
    let mut score = vec![0u32; batch.num_rows()];
    for name in signals {
        if let Some(column) = batch.column_by_name(name) {
            for (row, s) in score.iter_mut().enumerate() {
                if column.is_valid(row) {
                    *s += 1;
                }
            }
        }
    }
    score
}

/// Ascending with `None` after every value.
fn nulls_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn value(array: &StringArray, row: usize) -> Option<&str> {
    array.is_valid(row).then(|| array.value(row))
}

/// Ordering keys of one batch.
struct Keyed {
    ids: StringArray,
    rich: Vec<u32>,
    /// One entry per configured date column, `None` when absent
    dates: Vec<Option<StringArray>>,
}

impl Keyed {
    fn new(batch: &RecordBatch, keys: &DedupKeys) -> Result<Option<Self>, ArrowError> {
        let Some(ids) = as_strings(batch, &keys.id)? else {
            return Ok(None);
        };
        let dates = keys
            .dates
            .iter()
            .map(|name| as_strings(batch, name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self {
            ids,
            rich: richness(batch, &keys.signals),
            dates,
        }))
    }

    fn date(&self, column: usize, row: usize) -> Option<&str> {
        self.dates[column].as_ref().and_then(|d| value(d, row))
    }
}

/// Surviving rows across `batches`, in output order.
///
/// Batches are expected to share one schema. When the identifier column is
/// missing every row passes through in input order.
pub fn survivor_rows(batches: &[RecordBatch], keys: &DedupKeys) -> Result<Vec<RowRef>, ArrowError> {
    let all_rows = || {
        batches
            .iter()
            .enumerate()
            .flat_map(|(b, batch)| (0..batch.num_rows()).map(move |r| (b, r)))
    };
    let keyed = batches
        .iter()
        .map(|batch| Keyed::new(batch, keys))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .collect::<Option<Vec<_>>>();
    let Some(keyed) = keyed else {
        log::warn!("Identifier column '{}' missing, skipping deduplication", keys.id);
        return Ok(all_rows().collect());
    };

    let mut order: Vec<RowRef> = all_rows().collect();
    order.sort_by(|&(ab, ar), &(bb, br)| {
        let (a, b) = (&keyed[ab], &keyed[bb]);
        b.rich[br].cmp(&a.rich[ar]).then_with(|| {
            (0..keys.dates.len())
                .map(|d| nulls_last(a.date(d, ar), b.date(d, br)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    });

    let mut seen = FxHashSet::default();
    Ok(order
        .into_iter()
        .filter(|&(b, r)| match value(&keyed[b].ids, r) {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect())
}

/// Gather `rows` out of `batches` into one batch of `schema`.
pub fn gather(
    batches: &[RecordBatch],
    schema: &SchemaRef,
    rows: &[RowRef],
) -> Result<RecordBatch, ArrowError> {
    if batches.is_empty() || rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema.clone()));
    }
    let columns = (0..schema.fields().len())
        .map(|i| {
            let sources: Vec<&dyn Array> = batches.iter().map(|b| b.column(i).as_ref()).collect();
            interleave(&sources, rows)
        })
        .collect::<Result<Vec<ArrayRef>, _>>()?;
    RecordBatch::try_new_with_options(
        schema.clone(),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(rows.len())),
    )
}

/// Deduplicate one `batch` by `keys`.
pub fn dedup(batch: &RecordBatch, keys: &DedupKeys) -> Result<RecordBatch, ArrowError> {
    let batches = std::slice::from_ref(batch);
    gather(batches, &batch.schema(), &survivor_rows(batches, keys)?)
}
