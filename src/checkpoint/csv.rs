use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::CheckpointLog;
use crate::durable;
use crate::error::{Error, Result};
use crate::pairs::PairKey;

/// Append-only `id_a,id_b` log, one processed pair per line, no header.
pub struct CsvCheckpoint {
    path: PathBuf,
    file: Option<File>,
}

impl CsvCheckpoint {
    /// Repairs a torn tail; the file itself is created on first append.
    pub fn open(path: &Path) -> Result<Self> {
        durable::repair_tail(path)?;
        Ok(CsvCheckpoint {
            path: path.to_path_buf(),
            file: None,
        })
    }

    fn writer(&mut self) -> Result<&mut File> {
        let file = match self.file.take() {
            Some(f) => f,
            None => durable::open_append(&self.path)?,
        };
        Ok(self.file.insert(file))
    }
}

fn encode<'k>(keys: impl IntoIterator<Item = &'k PairKey>, path: &Path) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for key in keys {
        wtr.write_record([key.lo(), key.hi()])
            .map_err(|e| Error::csv(path, e))?;
    }
    wtr.into_inner()
        .map_err(|e| Error::io(path, io::Error::other(e.to_string())))
}

impl CheckpointLog for CsvCheckpoint {
    fn load(&mut self) -> Result<HashSet<PairKey>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut keys = HashSet::new();
        let mut rows = 0usize;
        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping unreadable checkpoint row in {:?}: {}", self.path, e);
                    continue;
                }
            };
            rows += 1;
            if record.len() != 2 {
                continue;
            }
            keys.insert(PairKey::new(&record[0], &record[1]));
        }
        debug!("Read {} checkpoint rows ({} distinct) from {:?}", rows, keys.len(), self.path);
        Ok(keys)
    }

    fn append(&mut self, key: &PairKey) -> Result<()> {
        let line = encode(std::iter::once(key), &self.path)?;
        let path = self.path.clone();
        let file = self.writer()?;
        durable::append_synced(file, &path, &line)
    }

    fn compact(&mut self, keys: &HashSet<PairKey>) -> Result<()> {
        let mut sorted: Vec<&PairKey> = keys.iter().collect();
        sorted.sort();
        let bytes = encode(sorted, &self.path)?;
        // The old handle points at the replaced inode.
        self.file = None;
        durable::replace_atomically(&self.path, &bytes)
    }
}
