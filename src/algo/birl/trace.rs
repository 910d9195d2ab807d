use std::{ops::Index, path::Path, str::FromStr};

use crate::error::{Error, Result};

const FIXED_COLUMNS: [&str; 3] = ["step", "accepted", "log_posterior"];

/// The state of the chain after one MCMC step
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    /// Zero-based iteration index
    pub step: usize,
    /// The sampled reward weights
    pub r: Vec<f64>,
    /// Running posterior mean over the samples past burn-in; equal to `r` during burn-in
    pub r_mean: Vec<f64>,
    /// Whether the step accepted its proposal
    pub accepted: bool,
    /// Log posterior of `r`, up to a constant
    pub log_posterior: f64,
}

/// Append-only record of an MCMC run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TraceRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter()
    }

    /// Iteration indices, in order
    pub fn steps(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.step).collect()
    }

    /// Sampled reward weights, in order
    pub fn rewards(&self) -> Vec<&[f64]> {
        self.records.iter().map(|r| r.r.as_slice()).collect()
    }

    /// Running posterior means, in order
    pub fn means(&self) -> Vec<&[f64]> {
        self.records.iter().map(|r| r.r_mean.as_slice()).collect()
    }

    /// Fraction of steps that accepted their proposal
    pub fn acceptance_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().filter(|r| r.accepted).count() as f64 / self.records.len() as f64
    }

    /// Write the trace as CSV with one row per record
    ///
    /// Columns are `step,accepted,log_posterior,r_0..r_{d-1},r_mean_0..r_mean_{d-1}`. Floats are
    /// written in their shortest round-trip form, so [`load`](Trace::load) restores them exactly.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let dim = self.records.first().map_or(0, |r| r.r.len());
        if let Some(record) = self
            .records
            .iter()
            .find(|r| r.r.len() != dim || r.r_mean.len() != dim)
        {
            return Err(Error::TraceFormat(format!(
                "record {} does not have dimension {dim}",
                record.step
            )));
        }

        let mut wtr = csv::Writer::from_path(path)?;

        let header = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain((0..dim).map(|i| format!("r_{i}")))
            .chain((0..dim).map(|i| format!("r_mean_{i}")))
            .collect::<Vec<_>>();
        wtr.write_record(&header)?;

        for record in &self.records {
            let row = [
                record.step.to_string(),
                record.accepted.to_string(),
                record.log_posterior.to_string(),
            ]
            .into_iter()
            .chain(record.r.iter().map(f64::to_string))
            .chain(record.r_mean.iter().map(f64::to_string))
            .collect::<Vec<_>>();
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Read a trace written by [`save`](Trace::save)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let headers = rdr.headers()?.clone();

        let columns = headers.len();
        if columns < FIXED_COLUMNS.len() || (columns - FIXED_COLUMNS.len()) % 2 != 0 {
            return Err(Error::TraceFormat(format!("unexpected column count {columns}")));
        }
        let dim = (columns - FIXED_COLUMNS.len()) / 2;
        let expected = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain((0..dim).map(|i| format!("r_{i}")))
            .chain((0..dim).map(|i| format!("r_mean_{i}")));
        if !expected.eq(headers.iter().map(str::to_string)) {
            return Err(Error::TraceFormat(format!("unexpected header `{headers:?}`")));
        }

        let mut trace = Trace::new();
        for row in rdr.records() {
            let row = row?;
            let floats = |range: std::ops::Range<usize>| {
                range
                    .map(|i| parse_field::<f64>(&row, i))
                    .collect::<Result<Vec<_>>>()
            };
            let base = FIXED_COLUMNS.len();
            trace.push(TraceRecord {
                step: parse_field(&row, 0)?,
                accepted: parse_field(&row, 1)?,
                log_posterior: parse_field(&row, 2)?,
                r: floats(base..base + dim)?,
                r_mean: floats(base + dim..base + 2 * dim)?,
            });
        }
        Ok(trace)
    }
}

fn parse_field<T: FromStr>(row: &csv::StringRecord, i: usize) -> Result<T> {
    let field = row.get(i).unwrap_or_default();
    field
        .parse()
        .map_err(|_| Error::TraceFormat(format!("cannot parse field {i} `{field}`")))
}

impl Index<usize> for Trace {
    type Output = TraceRecord;

    fn index(&self, index: usize) -> &Self::Output {
        &self.records[index]
    }
}

impl FromIterator<TraceRecord> for Trace {
    fn from_iter<I: IntoIterator<Item = TraceRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs, path::PathBuf};

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        env::temp_dir().join(format!("birl-{}-{name}.csv", std::process::id()))
    }

    fn sample_trace() -> Trace {
        (0..4)
            .map(|step| TraceRecord {
                step,
                r: vec![0.1 + 0.2 * step as f64, -1e-300, 1.0 / 3.0],
                r_mean: vec![std::f64::consts::PI, step as f64, -0.0],
                accepted: step % 2 == 0,
                log_posterior: if step == 0 {
                    f64::NEG_INFINITY
                } else {
                    -12.345_678_901_234_5 * step as f64
                },
            })
            .collect()
    }

    #[test]
    fn save_load_round_trip() {
        let path = scratch("round-trip");
        let trace = sample_trace();
        trace.save(&path).unwrap();
        let loaded = Trace::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, trace);
        assert_eq!(loaded.steps(), trace.steps());
        for (a, b) in loaded.rewards().iter().zip(trace.rewards()) {
            let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(a), bits(b), "bit-exact");
        }
        assert_eq!(loaded.means(), trace.means());
    }

    #[test]
    fn empty_trace_round_trip() {
        let path = scratch("empty");
        Trace::new().save(&path).unwrap();
        let loaded = Trace::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_rejects_foreign_csv() {
        let path = scratch("foreign");
        fs::write(&path, "a,b,c,d\n1,2,3,4\n").unwrap();
        let result = Trace::load(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::TraceFormat(_))));
    }

    #[test]
    fn load_rejects_bad_values() {
        let path = scratch("bad-values");
        fs::write(&path, "step,accepted,log_posterior,r_0,r_mean_0\n0,maybe,1.0,0.5,0.5\n").unwrap();
        let result = Trace::load(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::TraceFormat(_))));
    }

    #[test]
    fn save_rejects_ragged_records_without_writing() {
        let path = scratch("ragged");
        fs::remove_file(&path).ok();
        let mut trace = sample_trace();
        trace.push(TraceRecord {
            step: 4,
            r: vec![0.0; 2],
            r_mean: vec![0.0; 3],
            accepted: false,
            log_posterior: -1.0,
        });

        assert!(matches!(trace.save(&path), Err(Error::TraceFormat(_))));
        assert!(!path.exists(), "no partial file is left behind");
    }

    #[test]
    fn accessors() {
        let trace = sample_trace();
        assert_eq!(trace.len(), 4);
        assert_eq!(trace[1].step, 1);
        assert_eq!(trace.last().map(|r| r.step), Some(3));
        assert_eq!(trace.acceptance_rate(), 0.5);
        assert_eq!(Trace::new().acceptance_rate(), 0.0);
    }
}
