//! Sequential reader over one or more tape files.
//!
//! Files are read in the order given and behave as one concatenated tape.
//! Known-bad records are skipped here, so the simulation clock never sees
//! them. Time ordering is *not* checked here; the driver owns the clock and
//! rejects a trade that goes backwards.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;

use bt_core::Trade;
use bt_core::error::SimError;
use tracing::{debug, warn};

use crate::record::{RECORD_SIZE, TradeRecord};

/// Iterator of normalized trades across a list of tape files.
pub struct TapeReader {
    pending: VecDeque<PathBuf>,
    current: Option<(PathBuf, BufReader<File>)>,
    records_read: u64,
    records_skipped: u64,
}

impl TapeReader {
    /// Create a reader over `paths`. Files are opened lazily, one at a time.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            pending: paths.into_iter().map(Into::into).collect(),
            current: None,
            records_read: 0,
            records_skipped: 0,
        }
    }

    /// Records decoded so far, including skipped ones.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Known-bad records dropped so far.
    pub fn records_skipped(&self) -> u64 {
        self.records_skipped
    }

    /// Open the next file if none is active. Returns `Ok(false)` when every
    /// file has been consumed.
    fn ensure_open(&mut self) -> Result<bool, SimError> {
        if self.current.is_some() {
            return Ok(true);
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(false);
        };
        let file = File::open(&path).map_err(|source| SimError::Tape { path: path.clone(), source })?;
        debug!("opened tape {}", path.display());
        self.current = Some((path, BufReader::new(file)));
        Ok(true)
    }

    /// Read the next raw record from the current file, moving on to the
    /// following file at end of input.
    fn next_record(&mut self) -> Result<Option<TradeRecord>, SimError> {
        let mut buf = [0u8; RECORD_SIZE];
        loop {
            if !self.ensure_open()? {
                return Ok(None);
            }
            let Some((path, reader)) = self.current.as_mut() else {
                return Ok(None);
            };

            let filled = read_full(reader, &mut buf)
                .map_err(|source| SimError::Tape { path: path.clone(), source })?;

            if filled == RECORD_SIZE {
                self.records_read += 1;
                return Ok(Some(TradeRecord::decode(&buf)));
            }
            if filled > 0 {
                warn!("tape {}: truncated trailing record ({filled} bytes) ignored", path.display());
            }
            debug!("finished tape {}", path.display());
            self.current = None;
        }
    }
}

impl Iterator for TapeReader {
    type Item = Result<Trade, SimError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_record() {
                Ok(Some(record)) if record.is_known_bad() => {
                    self.records_skipped += 1;
                    debug!("skipping known-bad trade id {}", record.trade_id);
                }
                Ok(Some(record)) => return Some(Ok(record.to_trade())),
                Ok(None) => return None,
                Err(e) => {
                    // A failed file is dropped so the iterator stays fused.
                    self.current = None;
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Fill `buf` as far as the reader allows. Returns the number of bytes read;
/// less than `buf.len()` only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bt_core::Side;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::record::KNOWN_BAD_TRADE_ID;

    fn record(time: i32, trade_id: u32, price: f64, side: u8) -> TradeRecord {
        TradeRecord {
            time,
            trade_id,
            price: bt_core::to_fixed(price),
            amount: bt_core::to_fixed(1.5),
            side,
        }
    }

    fn tape(records: &[TradeRecord]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for r in records {
            file.write_all(&r.encode()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_files_in_order() {
        let a = tape(&[record(10, 1, 100.0, b'b'), record(11, 2, 101.0, b's')]);
        let b = tape(&[record(12, 3, 102.0, b' ')]);

        let trades: Vec<Trade> =
            TapeReader::new([a.path(), b.path()]).collect::<Result<_, _>>().unwrap();

        assert_eq!(trades.len(), 3);
        assert_eq!(trades.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[1].price, 101.0);
        assert_eq!(trades[2].side, Side::Unknown);
        assert_eq!(trades[2].amount, 1.5);
    }

    #[test]
    fn skips_known_bad_record() {
        let file = tape(&[
            record(10, 1, 100.0, b'b'),
            record(5, KNOWN_BAD_TRADE_ID, 0.0, b'b'),
            record(11, 2, 100.0, b's'),
        ]);

        let mut reader = TapeReader::new([file.path()]);
        let ids: Vec<u32> = reader.by_ref().map(|t| t.unwrap().id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(reader.records_read(), 3);
        assert_eq!(reader.records_skipped(), 1);
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let mut file = tape(&[record(10, 1, 100.0, b'b')]);
        file.write_all(&[1, 2, 3]).unwrap();
        file.flush().unwrap();

        let trades: Vec<Trade> = TapeReader::new([file.path()]).collect::<Result<_, _>>().unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");

        let mut reader = TapeReader::new([missing]);
        assert!(matches!(reader.next(), Some(Err(SimError::Tape { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn empty_input() {
        let file = tape(&[]);
        assert_eq!(TapeReader::new([file.path()]).count(), 0);
        assert_eq!(TapeReader::new(Vec::<PathBuf>::new()).count(), 0);
    }
}
