//src/sam.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{LcaError, Result};
use crate::types::Alignment;

const FLAG_UNMAPPED: u16 = 0x4;

/// Lazy reader over the alignments of one SAM file (plain or `.gz`).
///
/// Yields one `Alignment` per mapped record, in file order. Header lines,
/// blank lines and unmapped records are skipped.
pub struct AlignmentReader {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    line: String,
    line_no: usize,
    failed: bool,
}

impl AlignmentReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| LcaError::io(path, e))?;

        let is_gz = path
            .extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        let reader: Box<dyn BufRead + Send> = if is_gz {
            Box::new(BufReader::new(MultiGzDecoder::new(f)))
        } else {
            Box::new(BufReader::new(f))
        };
        Ok(Self::from_reader(reader, path))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, path: impl Into<PathBuf>) -> Self {
        AlignmentReader {
            reader: Box::new(reader),
            path: path.into(),
            line: String::new(),
            line_no: 0,
            failed: false,
        }
    }

    fn malformed(&self) -> LcaError {
        LcaError::MalformedRecord {
            path: self.path.clone(),
            line: self.line_no,
        }
    }

    fn next_record(&mut self) -> Result<Option<Alignment>> {
        loop {
            self.line.clear();
            if self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| LcaError::io(&self.path, e))?
                == 0
            {
                return Ok(None);
            }
            self.line_no += 1;

            let record = self.line.trim_end_matches(['\n', '\r']);
            if record.is_empty() || record.starts_with('@') {
                continue;
            }

            // QNAME FLAG RNAME ...
            let mut fields = record.split('\t');
            let (Some(qname), Some(flag), Some(rname)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(self.malformed());
            };
            let flag: u16 = flag.parse().map_err(|_| self.malformed())?;
            if qname.is_empty() {
                return Err(self.malformed());
            }
            if rname == "*" || flag & FLAG_UNMAPPED != 0 {
                continue;
            }

            return Ok(Some(Alignment {
                read_id: qname.to_string(),
                reference: rname.to_string(),
            }));
        }
    }
}

impl Iterator for AlignmentReader {
    type Item = Result<Alignment>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop after the first error so callers cannot skip past it.
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(rec) => rec.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Open `path` and return its alignments as a lazy sequence.
pub fn alignments<P: AsRef<Path>>(path: P) -> Result<AlignmentReader> {
    AlignmentReader::open(path)
}
