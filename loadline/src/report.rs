use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};

use crate::{aggregate::SecondBucket, error::SinkError};

/// Column names of the output stream, in order.
pub const HEADER: [&str; 7] = ["ts", "rps", "avg_ms", "p50_ms", "p95_ms", "ok", "err"];

/// Summary of one wall-clock second. The unit written to a [`Reporter`].
///
/// Latency fields are `None` for a second without completions and serialize
/// as empty CSV fields.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub ts: u64,
    pub rps: u64,
    #[serde(serialize_with = "three_decimals")]
    pub avg_ms: Option<f64>,
    #[serde(serialize_with = "three_decimals")]
    pub p50_ms: Option<f64>,
    #[serde(serialize_with = "three_decimals")]
    pub p95_ms: Option<f64>,
    pub ok: u64,
    pub err: u64,
}

impl SummaryRow {
    pub fn empty(ts: u64) -> Self {
        Self {
            ts,
            rps: 0,
            avg_ms: None,
            p50_ms: None,
            p95_ms: None,
            ok: 0,
            err: 0,
        }
    }
}

impl From<SecondBucket> for SummaryRow {
    fn from(mut bucket: SecondBucket) -> Self {
        let n = bucket.latencies.len();
        if n == 0 {
            return Self::empty(bucket.second);
        }

        let avg = bucket.latencies.iter().sum::<f64>() / n as f64;
        bucket.latencies.sort_by(f64::total_cmp);

        Self {
            ts: bucket.second,
            rps: n as u64,
            avg_ms: Some(avg),
            p50_ms: Some(nearest_rank(&bucket.latencies, 0.50)),
            p95_ms: Some(nearest_rank(&bucket.latencies, 0.95)),
            ok: bucket.ok,
            err: bucket.err,
        }
    }
}

/// Value at rank `round(q * (n - 1))` of an ascending, non-empty sample.
/// No interpolation.
pub fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    let rank = (q * last as f64).round() as usize;
    sorted[rank.min(last)]
}

fn three_decimals<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&format!("{v:.3}")),
        None => serializer.serialize_str(""),
    }
}

/// Durable append target for summary rows.
///
/// The aggregator is the only caller, rows arrive in strictly increasing `ts`
/// order and every row must be persisted before `report` returns: an
/// interrupted run has to leave a usable prefix behind.
#[async_trait]
pub trait Reporter: Send {
    async fn report(&mut self, row: &SummaryRow) -> Result<(), SinkError>;

    /// Called once after the last row.
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes rows as CSV to a file, flushing after each one.
pub struct CsvReporter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvReporter {
    /// Create (or truncate) `path` and write the header right away.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| SinkError::Open {
            path: path.clone(),
            source,
        })?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), "opened csv output");
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Reporter for CsvReporter {
    async fn report(&mut self, row: &SummaryRow) -> Result<(), SinkError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// CSV on standard output, for piping into other tools.
pub struct StdoutReporter {
    writer: csv::Writer<io::Stdout>,
}

impl StdoutReporter {
    pub fn new() -> Result<Self, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(io::stdout());
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }
}

#[async_trait]
impl Reporter for StdoutReporter {
    async fn report(&mut self, row: &SummaryRow) -> Result<(), SinkError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        io::stdout().flush()?;
        Ok(())
    }
}

/// Keeps rows in memory. Clones share the same storage, so a caller can hand
/// one clone to a run and read the rows back from another.
#[derive(Clone, Debug, Default)]
pub struct MemoryReporter {
    rows: Arc<Mutex<Vec<SummaryRow>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<SummaryRow> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Reporter for MemoryReporter {
    async fn report(&mut self, row: &SummaryRow) -> Result<(), SinkError> {
        let mut rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        rows.push(*row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Outcome, OutcomeEvent};

    fn bucket(second: u64, samples: &[(f64, u16)]) -> SecondBucket {
        let mut bucket = SecondBucket::new(second);
        for (latency, status) in samples {
            bucket.consume(&OutcomeEvent::new(second, *latency, Outcome::Status(*status)));
        }
        bucket
    }

    mod summary {
        use super::*;

        #[test]
        fn mixed_second() {
            let row = SummaryRow::from(bucket(5, &[(500.0, 500), (10.0, 200), (20.0, 200)]));

            assert_eq!(row.ts, 5);
            assert_eq!(row.rps, 3);
            assert_eq!(row.ok, 2);
            assert_eq!(row.err, 1);
            assert_eq!(row.p50_ms, Some(20.0));
            assert_eq!(row.p95_ms, Some(500.0));
            assert!((row.avg_ms.unwrap() - 176.666_666).abs() < 1e-3);
        }

        #[test]
        fn single_sample_is_every_percentile() {
            let row = SummaryRow::from(bucket(1, &[(42.5, 200)]));
            assert_eq!(row.avg_ms, Some(42.5));
            assert_eq!(row.p50_ms, Some(42.5));
            assert_eq!(row.p95_ms, Some(42.5));
        }

        #[test]
        fn empty_second_has_no_latency() {
            let row = SummaryRow::from(SecondBucket::new(77));
            assert_eq!(row, SummaryRow::empty(77));
        }

        #[test]
        fn avg_within_bounds_and_p50_below_p95() {
            let samples: Vec<(f64, u16)> =
                (0..97).map(|i| (((i * 37) % 101) as f64 + 0.5, 200)).collect();
            let min = samples.iter().map(|s| s.0).fold(f64::MAX, f64::min);
            let max = samples.iter().map(|s| s.0).fold(f64::MIN, f64::max);
            let row = SummaryRow::from(bucket(2, &samples));

            let avg = row.avg_ms.unwrap();
            assert!(avg >= min && avg <= max);
            assert!(row.p50_ms.unwrap() <= row.p95_ms.unwrap());
            assert_eq!(row.ok + row.err, row.rps);
        }
    }

    mod nearest_rank {
        use super::*;

        #[test]
        fn rounds_half_away_from_zero() {
            // q * (n - 1) = 0.5 * 3 = 1.5 -> rank 2
            assert_eq!(nearest_rank(&[1.0, 2.0, 3.0, 4.0], 0.5), 3.0);
        }

        #[test]
        fn p95_of_twenty() {
            let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
            // 0.95 * 19 = 18.05 -> rank 18
            assert_eq!(nearest_rank(&sorted, 0.95), 19.0);
        }
    }

    mod csv_output {
        use super::*;

        #[tokio::test]
        async fn header_then_flushed_rows() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("load.csv");
            let mut reporter = CsvReporter::create(&path).unwrap();

            // Header is on disk before any row is produced
            assert_eq!(
                std::fs::read_to_string(&path).unwrap(),
                "ts,rps,avg_ms,p50_ms,p95_ms,ok,err\n"
            );

            reporter
                .report(&SummaryRow::from(bucket(10, &[(1.0, 200), (2.0, 503)])))
                .await
                .unwrap();
            reporter.report(&SummaryRow::empty(11)).await.unwrap();

            // Rows are readable without closing the reporter
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(
                content,
                "ts,rps,avg_ms,p50_ms,p95_ms,ok,err\n\
                 10,2,1.500,2.000,2.000,1,1\n\
                 11,0,,,,0,0\n"
            );

            reporter.close().await.unwrap();
        }

        #[test]
        fn unwritable_path_fails_on_open() {
            let err = CsvReporter::create("/nonexistent-dir/for/sure/out.csv")
                .err()
                .expect("open must fail");
            assert!(matches!(err, SinkError::Open { .. }));
        }
    }

    #[tokio::test]
    async fn memory_reporter_clones_share_rows() {
        let reporter = MemoryReporter::new();
        let mut writer = reporter.clone();
        writer.report(&SummaryRow::empty(1)).await.unwrap();
        writer.report(&SummaryRow::empty(2)).await.unwrap();
        assert_eq!(
            reporter.rows().iter().map(|r| r.ts).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }
}
