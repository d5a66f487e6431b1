use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use doiharvest_core::{ProgressContext, tmp_path_for};
use doiharvest_merge::writer::DEDUP_CHUNK_ROWS;
use doiharvest_merge::{
    DedupKeys, MergeConfig, MergeError, discover, merge, read_shard, run, unify,
};
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

fn write_shard(path: &Path, batch: &RecordBatch) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

fn strings(values: &[Option<&str>]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

/// `{doi, registered, provider_id}` shard
fn doi_shard(rows: &[(&str, &str, Option<&str>)]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("doi", DataType::Utf8, true),
        Field::new("registered", DataType::Utf8, true),
        Field::new("provider_id", DataType::Utf8, true),
    ]));
    let dois: Vec<_> = rows.iter().map(|r| Some(r.0)).collect();
    let dates: Vec<_> = rows.iter().map(|r| Some(r.1)).collect();
    let providers: Vec<_> = rows.iter().map(|r| r.2).collect();
    RecordBatch::try_new(schema, vec![strings(&dois), strings(&dates), strings(&providers)])
        .unwrap()
}

fn merged(path: &Path) -> RecordBatch {
    let batches = read_shard(path).unwrap();
    arrow::compute::concat_batches(&batches[0].schema(), &batches).unwrap()
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<T>()
        .unwrap()
}

fn config(inputs: Vec<PathBuf>, out: &Path) -> MergeConfig {
    MergeConfig {
        inputs,
        output_dir: out.to_path_buf(),
        ..Default::default()
    }
}

fn only_parquet(dir: &Path) -> PathBuf {
    let files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1, "expected exactly one output file: {files:?}");
    files.into_iter().next().unwrap()
}

#[test]
fn richer_duplicate_wins_across_shards() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    write_shard(
        &root.join("shard1.parquet"),
        &doi_shard(&[("x", "2020-01-01", None)]),
    );
    write_shard(
        &root.join("shard2.parquet"),
        &doi_shard(&[("x", "2020-01-01", Some("v"))]),
    );

    let out = dir.path().join("merged");
    let report = run(&config(vec![root], &out), &ProgressContext::hidden()).unwrap();
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.unique_rows, 1);
    assert_eq!(report.inputs.len(), 2);

    let path = report.output_path.unwrap();
    assert_eq!(only_parquet(&out), path);
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("doiharvest_merged_") && name.ends_with(".parquet"));

    let batch = merged(&path);
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(column::<StringArray>(&batch, "doi").value(0), "x");
    assert_eq!(column::<StringArray>(&batch, "provider_id").value(0), "v");
}

#[test]
fn result_does_not_depend_on_shard_order() {
    let dir = TempDir::new().unwrap();
    // The richer row sorts first by path in one layout and last in the other
    for (first, second) in [("a", "b"), ("b", "a")] {
        let root = dir.path().join(format!("order_{first}"));
        write_shard(
            &root.join(format!("{first}.parquet")),
            &doi_shard(&[("x", "2021-01-01", Some("rich")), ("y", "2021-01-01", None)]),
        );
        write_shard(
            &root.join(format!("{second}.parquet")),
            &doi_shard(&[("x", "2020-01-01", None), ("y", "2020-06-01", None)]),
        );

        let out = dir.path().join(format!("out_{first}"));
        let report = run(&config(vec![root], &out), &ProgressContext::hidden()).unwrap();
        let batch = merged(&report.output_path.unwrap());
        assert_eq!(batch.num_rows(), 2);

        let dois = column::<StringArray>(&batch, "doi");
        let providers = column::<StringArray>(&batch, "provider_id");
        let dates = column::<StringArray>(&batch, "registered");
        for i in 0..batch.num_rows() {
            match dois.value(i) {
                "x" => assert_eq!(providers.value(i), "rich"),
                // Equal richness: the earlier registration wins
                "y" => assert_eq!(dates.value(i), "2020-06-01"),
                other => panic!("unexpected doi {other}"),
            }
        }
    }
}

#[test]
fn drifting_types_are_unified_and_cast() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    let ints = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("doi", DataType::Utf8, false),
            Field::new("score", DataType::Int32, false),
            Field::new("published_year", DataType::Int32, false),
        ])),
        vec![
            strings(&[Some("10.1/a")]),
            Arc::new(Int32Array::from(vec![7])),
            Arc::new(Int32Array::from(vec![2020])),
        ],
    )
    .unwrap();
    let floats = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("doi", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
            Field::new("extra", DataType::Utf8, true),
        ])),
        vec![
            strings(&[Some("10.1/b")]),
            Arc::new(Float64Array::from(vec![0.5])),
            strings(&[Some("only here")]),
        ],
    )
    .unwrap();
    write_shard(&root.join("ints.parquet"), &ints);
    write_shard(&root.join("floats.parquet"), &floats);

    let mut cfg = config(vec![root], &dir.path().join("out"));
    cfg.dedup = None;
    let report = run(&cfg, &ProgressContext::hidden()).unwrap();
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.unique_rows, 2);

    let batch = merged(&report.output_path.unwrap());
    let schema = batch.schema();
    assert_eq!(schema.field_with_name("score").unwrap().data_type(), &DataType::Float64);
    assert_eq!(
        schema.field_with_name("published_year").unwrap().data_type(),
        &DataType::Int64
    );

    // floats.parquet sorts before ints.parquet
    let scores = column::<Float64Array>(&batch, "score");
    assert_eq!((scores.value(0), scores.value(1)), (0.5, 7.0));
    let years = column::<Int64Array>(&batch, "published_year");
    assert!(years.is_null(0));
    assert_eq!(years.value(1), 2020);
    let extra = column::<StringArray>(&batch, "extra");
    assert!(extra.is_valid(0) && extra.is_null(1));
}

#[test]
fn unreadable_shard_is_skipped() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    write_shard(
        &root.join("good.parquet"),
        &doi_shard(&[("x", "2020-01-01", None), ("y", "2020-01-01", None)]),
    );
    fs::write(root.join("broken.parquet"), b"PAR1 truncated").unwrap();

    let report = run(
        &config(vec![root.clone()], &dir.path().join("out")),
        &ProgressContext::hidden(),
    )
    .unwrap();
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.inputs.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].ends_with("broken.parquet"));
}

#[test]
fn missing_roots_are_not_fatal_but_no_shards_is() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    write_shard(&root.join("s.parquet"), &doi_shard(&[("x", "2020-01-01", None)]));

    let report = run(
        &config(vec![dir.path().join("absent"), root], &dir.path().join("out")),
        &ProgressContext::hidden(),
    )
    .unwrap();
    assert_eq!(report.unique_rows, 1);

    let err = run(
        &config(vec![dir.path().join("absent")], &dir.path().join("out2")),
        &ProgressContext::hidden(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MergeError>(),
        Some(MergeError::NoShardsFound { .. })
    ));
    assert!(!dir.path().join("out2").exists());
}

#[test]
fn all_schemas_unreadable_is_fatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.parquet"), b"nope").unwrap();

    let err = run(&config(vec![root], &dir.path().join("out")), &ProgressContext::hidden())
        .unwrap_err();
    assert!(
        err.chain()
            .any(|e| matches!(e.downcast_ref::<MergeError>(), Some(MergeError::NoReadableShards { .. })))
    );
}

#[test]
fn writer_failure_reports_no_output() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    write_shard(&root.join("s.parquet"), &doi_shard(&[("x", "2020-01-01", None)]));

    let paths: Vec<PathBuf> = discover(&[root], false, None)
        .into_iter()
        .map(|s| s.path)
        .collect();
    let unified = unify(&paths, &[]).unwrap();

    // A directory squatting on the tmp path makes the sink fail to open
    let output = dir.path().join("out/merged.parquet");
    fs::create_dir_all(tmp_path_for(&output).join("blocker")).unwrap();
    let report = merge(&unified, &output, 3, Some(&DedupKeys::default()));
    assert!(report.output_path.is_none());
    assert!(!output.exists());
}

#[test]
fn successful_merge_leaves_no_tmp_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    write_shard(&root.join("s.parquet"), &doi_shard(&[("x", "2020-01-01", None)]));

    let paths: Vec<PathBuf> = discover(&[root], true, None)
        .into_iter()
        .map(|s| s.path)
        .collect();
    let unified = unify(&paths, &[]).unwrap();
    let output = dir.path().join("out/merged.parquet");
    let report = merge(&unified, &output, 3, None);

    assert_eq!(report.output_path.as_deref(), Some(output.as_path()));
    assert!(output.exists());
    assert!(!tmp_path_for(&output).exists());
}

/// `{doi, registered, provider_id}` shard over DOIs `range`, provider set when `rich`
fn range_shard(range: std::ops::Range<usize>, rich: bool) -> RecordBatch {
    let dois: Vec<String> = range.map(|i| format!("10.5555/{i}")).collect();
    let rows: Vec<_> = dois
        .iter()
        .map(|d| (d.as_str(), "2024-01-01", rich.then_some("cern")))
        .collect();
    doi_shard(&rows)
}

#[test]
fn dedup_larger_than_one_output_chunk() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("runs");
    write_shard(&root.join("a.parquet"), &range_shard(0..50_000, false));
    write_shard(&root.join("b.parquet"), &range_shard(25_000..75_000, true));

    let out = dir.path().join("merged");
    let report = run(&config(vec![root], &out), &ProgressContext::hidden()).unwrap();
    assert_eq!(report.rows_written, 100_000);
    assert_eq!(report.unique_rows, 75_000);
    assert!(report.unique_rows > DEDUP_CHUNK_ROWS);

    let batches = read_shard(&report.output_path.unwrap()).unwrap();
    let rich: usize = batches
        .iter()
        .map(|b| b.num_rows() - b.column_by_name("provider_id").unwrap().null_count())
        .sum();
    // Every overlapping DOI kept its richer copy
    assert_eq!(rich, 50_000);
    let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
    assert_eq!(total, 75_000);
}
