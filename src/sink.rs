use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::catalog::Entity;
use crate::durable;
use crate::error::{Error, Result};
use crate::lookup::Interaction;

pub const HEADER: [&str; 6] = [
    "Drug 1 Name",
    "Drug 1 Unique ID",
    "Drug 2 Name",
    "Drug 2 Unique ID",
    "Interaction Level",
    "Interaction",
];

/// One output row. Drug 1 / Drug 2 follow enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InteractionRecord {
    #[serde(rename = "Drug 1 Name")]
    pub drug1_name: String,
    #[serde(rename = "Drug 1 Unique ID")]
    pub drug1_id: String,
    #[serde(rename = "Drug 2 Name")]
    pub drug2_name: String,
    #[serde(rename = "Drug 2 Unique ID")]
    pub drug2_id: String,
    #[serde(rename = "Interaction Level")]
    pub severity: String,
    #[serde(rename = "Interaction")]
    pub description: String,
}

impl InteractionRecord {
    /// Line breaks in any field are replaced by spaces.
    pub fn new(a: &Entity, b: &Entity, interaction: &Interaction) -> Self {
        InteractionRecord {
            drug1_name: single_line(&a.name),
            drug1_id: single_line(&a.unique_id),
            drug2_name: single_line(&b.name),
            drug2_id: single_line(&b.unique_id),
            severity: interaction.severity.label().to_string(),
            description: single_line(&interaction.description),
        }
    }
}

fn single_line(field: &str) -> String {
    field.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Append-only output table.
///
/// Rows are written whole and synced under a mutex, so concurrent workers
/// never interleave and every returned `Ok` is on disk. Every row is one
/// line, which is what lets `open` drop a torn tail by cutting to the last
/// newline.
pub struct ResultSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultSink {
    pub fn open(path: &Path) -> Result<Self> {
        if !durable::is_empty_or_missing(path) {
            durable::repair_tail(path)?;
        }
        // a torn header repairs down to an empty file
        let fresh = durable::is_empty_or_missing(path);
        let mut file = durable::open_append(path)?;
        if fresh {
            let header = encode_row(path, &HEADER)?;
            durable::append_synced(&mut file, path, &header)?;
            info!("Created output table {:?}", path);
        }
        Ok(ResultSink::from_file(path, file))
    }

    /// Wrap a handle that is already positioned at the end of a table.
    /// No header is written and no repair is done.
    pub fn from_file(path: &Path, file: File) -> Self {
        ResultSink {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        }
    }

    pub fn append(&self, record: &InteractionRecord) -> Result<()> {
        let mut wtr = row_writer();
        wtr.serialize(record).map_err(|e| Error::csv(&self.path, e))?;
        let line = finish(wtr, &self.path)?;

        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        durable::append_synced(&mut file, &self.path, &line)
    }
}

fn row_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new())
}

fn finish(wtr: csv::Writer<Vec<u8>>, path: &Path) -> Result<Vec<u8>> {
    wtr.into_inner()
        .map_err(|e| Error::io(path, io::Error::other(e.to_string())))
}

fn encode_row(path: &Path, fields: &[&str]) -> Result<Vec<u8>> {
    let mut wtr = row_writer();
    wtr.write_record(fields).map_err(|e| Error::csv(path, e))?;
    finish(wtr, path)
}

/// Data rows in an output table (header excluded). Missing file → 0.
pub fn count_rows(path: &Path) -> Result<usize> {
    if durable::is_empty_or_missing(path) {
        return Ok(0);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;
    let mut n = 0;
    for record in reader.records() {
        record.map_err(|e| Error::csv(path, e))?;
        n += 1;
    }
    Ok(n)
}

/// All data rows of an output table.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    if durable::is_empty_or_missing(path) {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;
    reader
        .records()
        .map(|r| {
            r.map(|rec| rec.iter().map(str::to_string).collect::<Vec<String>>())
                .map_err(|e| Error::csv(path, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::lookup::Severity;

    fn record(desc: &str) -> InteractionRecord {
        let a = Entity::new("1", "Aspirin", "x");
        let b = Entity::new("2", "Warfarin", "y");
        InteractionRecord::new(
            &a,
            &b,
            &Interaction {
                severity: Severity::Major,
                involved: "warfarin ↔ aspirin".into(),
                description: desc.into(),
            },
        )
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");

        ResultSink::open(&path).unwrap().append(&record("first")).unwrap();
        ResultSink::open(&path).unwrap().append(&record("second")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Drug 1 Name,Drug 1 Unique ID,Drug 2 Name,Drug 2 Unique ID,Interaction Level,Interaction\n\
             Aspirin,1,Warfarin,2,Major,first\n\
             Aspirin,1,Warfarin,2,Major,second\n"
        );
        assert_eq!(count_rows(&path).unwrap(), 2);
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        fs::write(&path, "").unwrap();

        ResultSink::open(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("Drug 1 Name,"));
        assert_eq!(count_rows(&path).unwrap(), 0);
    }

    #[test]
    fn descriptions_with_commas_and_quotes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        let sink = ResultSink::open(&path).unwrap();
        sink.append(&record(r#"Avoid "together", monitor INR"#)).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][4], "Major");
        assert_eq!(rows[0][5], r#"Avoid "together", monitor INR"#);
    }

    #[test]
    fn torn_row_repaired_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        ResultSink::open(&path).unwrap().append(&record("kept")).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(b"Aspirin,1,Warf");
        fs::write(&path, bytes).unwrap();

        ResultSink::open(&path).unwrap().append(&record("after")).unwrap();
        let rows = read_rows(&path).unwrap();
        let descs: Vec<&str> = rows.iter().map(|r| r[5].as_str()).collect();
        assert_eq!(descs, vec!["kept", "after"]);
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        let sink = ResultSink::open(&path).unwrap();

        std::thread::scope(|s| {
            for t in 0..4 {
                let sink = &sink;
                s.spawn(move || {
                    for i in 0..50 {
                        sink.append(&record(&format!("t{}-{}", t, i))).unwrap();
                    }
                });
            }
        });

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 200);
        assert!(rows.iter().all(|r| r.len() == 6));
    }

    #[test]
    fn torn_header_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        fs::write(&path, "Drug 1 Name,Drug 1 Un").unwrap();

        ResultSink::open(&path).unwrap().append(&record("d")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Drug 1 Name,Drug 1 Unique ID,"));
        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][5], "d");
    }

    #[test]
    fn line_breaks_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        let a = Entity::new("1", "Aspirin\nlow dose", "x");
        let b = Entity::new("2", "Warfarin", "y");
        let interaction = Interaction {
            severity: Severity::Minor,
            involved: String::new(),
            description: "line one\r\nline two".into(),
        };
        let rec = InteractionRecord::new(&a, &b, &interaction);
        assert_eq!(rec.drug1_name, "Aspirin low dose");
        assert_eq!(rec.description, "line one line two");

        ResultSink::open(&path).unwrap().append(&rec).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn missing_output_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(count_rows(&dir.path().join("none.csv")).unwrap(), 0);
    }
}
