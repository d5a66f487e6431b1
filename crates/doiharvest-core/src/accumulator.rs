//! Column-wise row accumulator trait

use arrow::array::RecordBatch;
use arrow::error::ArrowError;

/// Accumulator for batch processing of mapped rows into an Arrow `RecordBatch`.
///
/// Implementors keep one `Vec` per column so that a flush is a set of
/// `mem::take` calls rather than a row → column transpose.
pub trait Accumulator {
    type Row;

    /// Push a row into the accumulator
    fn push(&mut self, row: Self::Row);

    /// Number of rows currently buffered
    fn len(&self) -> usize;

    /// Check if buffer is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take buffered rows as a RecordBatch, resetting internal state
    fn take_batch(&mut self) -> Result<RecordBatch, ArrowError>;
}
