use std::sync::Arc;

use arrow::array::{RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use doiharvest_core::ParquetSink;

fn synthetic_shard(n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("doi", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("registered", DataType::Utf8, true),
    ]));
    let dois = StringArray::from((0..n).map(|i| format!("10.5555/{i}")).collect::<Vec<_>>());
    let titles = StringArray::from(
        (0..n)
            .map(|i| format!("Preprint title {i}"))
            .collect::<Vec<_>>(),
    );
    let dates = StringArray::from(vec!["2024-01-01"; n]);
    RecordBatch::try_new(
        schema,
        vec![Arc::new(dois), Arc::new(titles), Arc::new(dates)],
    )
    .unwrap()
}

#[divan::bench(args = [1, 3, 6])]
fn shard_write_zstd(bencher: divan::Bencher, zstd_level: i32) {
    let batch = synthetic_shard(10_000);
    let schema = batch.schema();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench_chunk_00000.parquet");
    bencher.bench(|| {
        let mut sink = ParquetSink::create(&path, schema.as_ref(), zstd_level).unwrap();
        sink.write_batch(&batch).unwrap();
        sink.finalize().unwrap();
    });
}

fn main() {
    divan::main();
}
