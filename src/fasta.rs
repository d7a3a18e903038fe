use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::types::FastaRecord;

/// Opens a text file for buffered reading, transparently decompressing `.gz`.
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Streaming FASTA reader. Sequence lines are concatenated with whitespace trimmed.
/// Lines before the first `>` are ignored.
pub struct FastaReader<R> {
    reader: R,
    line: String,
    line_no: usize,
    pending_header: Option<(usize, String)>,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            pending_header: None,
            done: false,
        }
    }

    /// Reads the next record together with the 1-based line number of its header.
    pub fn next_record(&mut self) -> io::Result<Option<(usize, FastaRecord)>> {
        if self.done {
            return Ok(None);
        }

        // find a header
        let (header_line_no, header) = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                self.line.clear();
                if self.reader.read_line(&mut self.line)? == 0 {
                    self.done = true;
                    return Ok(None);
                }
                self.line_no += 1;
                if let Some(h) = self.line.strip_prefix('>') {
                    break (self.line_no, h.trim_end_matches(['\n', '\r']).to_string());
                }
            },
        };

        let mut seq = String::new();
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                self.done = true;
                break;
            }
            self.line_no += 1;
            if let Some(h) = self.line.strip_prefix('>') {
                self.pending_header =
                    Some((self.line_no, h.trim_end_matches(['\n', '\r']).to_string()));
                break;
            }
            seq.push_str(self.line.trim());
        }

        Ok(Some((header_line_no, FastaRecord { header, seq })))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = io::Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose().map(|r| r.map(|(_, rec)| rec))
    }
}

/// Reads a whole FASTA file (plain or `.gz`) into memory.
pub fn read_fasta_records<P: AsRef<Path>>(path: P) -> io::Result<Vec<FastaRecord>> {
    FastaReader::new(open_reader(path)?).collect()
}
