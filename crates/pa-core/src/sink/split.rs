//! One rank file per exponent and classification kind.

use super::EventSink;
use pa_common::{Error, EventKind, EventRecord, RankSample, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<base>-<exponent:.2>-<kind>.dat`
pub fn split_path(base: &Path, exponent: f64, kind: EventKind) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("-{:.2}-{}.dat", exponent, kind.code()));
    PathBuf::from(name)
}

/// Open one buffered writer per `(exponent, classification kind)`, ordered
/// exponent-major.
pub(crate) fn create_writers(base: &Path, exponents: &[f64]) -> Result<Vec<BufWriter<File>>> {
    let mut writers = Vec::with_capacity(exponents.len() * EventKind::CLASSIFICATIONS.len());
    for &a in exponents {
        for kind in EventKind::CLASSIFICATIONS {
            let path = split_path(base, a, kind);
            let file = File::create(&path).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {}", path.display(), e),
                ))
            })?;
            writers.push(BufWriter::new(file));
        }
    }
    Ok(writers)
}

/// Writes each normalized rank on its own line into the file for its
/// exponent and event kind.
pub struct SplitRankSink<W: Write> {
    writers: Vec<W>,
}

impl SplitRankSink<BufWriter<File>> {
    pub fn create(base: &Path, exponents: &[f64]) -> Result<Self> {
        Ok(SplitRankSink {
            writers: create_writers(base, exponents)?,
        })
    }
}

impl<W: Write> SplitRankSink<W> {
    /// `writers.len()` must be a multiple of the number of classification
    /// kinds.
    pub fn from_writers(writers: Vec<W>) -> Self {
        SplitRankSink { writers }
    }

    pub fn into_writers(self) -> Vec<W> {
        self.writers
    }
}

impl<W: Write> EventSink for SplitRankSink<W> {
    fn record(&mut self, event: &EventRecord, rank: Option<&RankSample>) -> Result<()> {
        let (Some(slot), Some(rank)) = (event.kind.classification_slot(), rank) else {
            return Ok(());
        };
        let kinds = EventKind::CLASSIFICATIONS.len();
        for (i, r) in rank.weighted.iter().enumerate() {
            let out = self.writers.get_mut(i * kinds + slot).ok_or_else(|| {
                Error::InconsistentData(format!("no rank output for exponent slot {}", i))
            })?;
            writeln!(out, "{}", r)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for w in &mut self.writers {
            w.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        let p = split_path(Path::new("/tmp/out/run"), 0.5, EventKind::NewNodeEdge);
        assert_eq!(p, PathBuf::from("/tmp/out/run-0.50-3.dat"));
        let p = split_path(Path::new("r"), 1.0, EventKind::ReactivatedEdge);
        assert_eq!(p, PathBuf::from("r-1.00-5.dat"));
    }

    #[test]
    fn test_routes_by_exponent_and_kind() {
        let mut sink = SplitRankSink::from_writers(vec![Vec::<u8>::new(); 8]);
        let rank = RankSample {
            weighted: vec![0.5, 0.75],
            count: 0,
            norm_count: 0,
        };
        sink.record(&EventRecord::new(EventKind::RefreshActiveEdge, 3, 1), Some(&rank))
            .unwrap();
        sink.record(&EventRecord::new(EventKind::DegreeIncrease, 4, 1), None)
            .unwrap();
        let writers = sink.into_writers();
        assert_eq!(writers[2], b"0.5\n");
        assert_eq!(writers[6], b"0.75\n");
        assert_eq!(writers.iter().filter(|w| !w.is_empty()).count(), 2);
    }

    #[test]
    fn test_create_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ranks");
        let mut sink = SplitRankSink::create(&base, &[1.0]).unwrap();
        let rank = RankSample {
            weighted: vec![0.125],
            count: 0,
            norm_count: 0,
        };
        sink.record(&EventRecord::new(EventKind::NewEdge, 1, 1), Some(&rank))
            .unwrap();
        sink.finish().unwrap();
        let text = std::fs::read_to_string(dir.path().join("ranks-1.00-2.dat")).unwrap();
        assert_eq!(text, "0.125\n");
        assert!(dir.path().join("ranks-1.00-5.dat").exists());
    }
}
