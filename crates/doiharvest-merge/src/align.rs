//! Align one shard batch to the unified schema

use arrow::array::{Array, ArrayRef, RecordBatch, RecordBatchOptions, new_null_array};
use arrow::compute::{CastOptions, cast, cast_with_options};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::error::ArrowError;

/// What happened to one unified column while aligning a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFix {
    /// Present and cast losslessly
    Cast { from: DataType },
    /// Present; values that did not convert became null
    CastLossy { from: DataType, nulled: usize },
    /// Present but not castable at all; replaced by typed nulls
    Nulled { from: DataType },
    /// Absent from the shard; synthesized as nulls
    Missing,
}

/// Aligned batch plus a fix for every column that did not already match.
#[derive(Debug)]
pub struct Aligned {
    pub batch: RecordBatch,
    pub fixes: Vec<(String, ColumnFix)>,
}

fn strict() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}

/// Cast `column` to `target`: strict first, then value-by-value, then nulls.
fn coerce(column: &ArrayRef, target: &DataType) -> (ArrayRef, ColumnFix) {
    let from = column.data_type().clone();
    if let Ok(array) = cast_with_options(column, target, &strict()) {
        return (array, ColumnFix::Cast { from });
    }
    if let Ok(array) = cast(column, target) {
        let nulled = array.null_count().saturating_sub(column.null_count());
        return (array, ColumnFix::CastLossy { from, nulled });
    }
    (
        new_null_array(target, column.len()),
        ColumnFix::Nulled { from },
    )
}

/// Reorder, cast and fill `batch` so it matches `unified` exactly.
pub fn align(batch: &RecordBatch, unified: &SchemaRef) -> Result<Aligned, ArrowError> {
    let rows = batch.num_rows();
    let mut fixes = Vec::new();
    let columns: Vec<ArrayRef> = unified
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) if column.data_type() == field.data_type() => column.clone(),
            Some(column) => {
                let (array, fix) = coerce(column, field.data_type());
                fixes.push((field.name().clone(), fix));
                array
            }
            None => {
                fixes.push((field.name().clone(), ColumnFix::Missing));
                new_null_array(field.data_type(), rows)
            }
        })
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    let batch = RecordBatch::try_new_with_options(unified.clone(), columns, &options)?;
    Ok(Aligned { batch, fixes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    fn unified() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("doi", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
            Field::new("published_year", DataType::Int64, true),
            Field::new("flag", DataType::Boolean, true),
        ]))
    }

    #[test]
    fn casts_reorders_and_fills() {
        let shard = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("score", DataType::Int32, false),
                Field::new("doi", DataType::Utf8, false),
            ])),
            vec![
                Arc::new(Int32Array::from(vec![3, 4])),
                Arc::new(StringArray::from(vec!["10.1/a", "10.1/b"])),
            ],
        )
        .unwrap();

        let aligned = align(&shard, &unified()).unwrap();
        assert_eq!(aligned.batch.schema(), unified());
        assert_eq!(aligned.batch.num_rows(), 2);

        let score = aligned.batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(score.value(1), 4.0);
        let flag = aligned.batch.column(3).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert_eq!(flag.null_count(), 2);

        assert_eq!(
            aligned.fixes,
            vec![
                ("score".to_string(), ColumnFix::Cast { from: DataType::Int32 }),
                ("published_year".to_string(), ColumnFix::Missing),
                ("flag".to_string(), ColumnFix::Missing),
            ]
        );
    }

    #[test]
    fn unparseable_values_become_null() {
        let shard = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new(
                "published_year",
                DataType::Utf8,
                true,
            )])),
            vec![Arc::new(StringArray::from(vec![Some("2020"), Some("n.d."), None]))],
        )
        .unwrap();

        let aligned = align(&shard, &unified()).unwrap();
        let years = aligned
            .batch
            .column_by_name("published_year")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(years.value(0), 2020);
        assert!(years.is_null(1) && years.is_null(2));
        assert!(aligned.fixes.contains(&(
            "published_year".to_string(),
            ColumnFix::CastLossy {
                from: DataType::Utf8,
                nulled: 1
            }
        )));
    }

    #[test]
    fn uncastable_column_becomes_typed_nulls() {
        let list = arrow::array::ListArray::from_iter_primitive::<arrow::datatypes::Int32Type, _, _>(
            vec![Some(vec![Some(1)])],
        );
        let shard = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new(
                "flag",
                list.data_type().clone(),
                true,
            )])),
            vec![Arc::new(list)],
        )
        .unwrap();

        let aligned = align(&shard, &unified()).unwrap();
        let flag = aligned.batch.column_by_name("flag").unwrap();
        assert_eq!(flag.data_type(), &DataType::Boolean);
        assert_eq!(flag.null_count(), 1);
        assert!(matches!(
            aligned.fixes.iter().find(|(n, _)| n == "flag").unwrap().1,
            ColumnFix::Nulled { .. }
        ));
    }

    #[test]
    fn empty_batch_aligns() {
        let shard = RecordBatch::new_empty(Arc::new(Schema::empty()));
        let aligned = align(&shard, &unified()).unwrap();
        assert_eq!(aligned.batch.num_rows(), 0);
        assert_eq!(aligned.batch.num_columns(), 4);
    }
}
