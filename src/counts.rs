//src/counts.rs

use ahash::AHashMap;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{LcaError, Result};
use crate::types::TaxonLabel;

/// Marks sample columns in the output header.
pub const SAMPLE_MARKER: char = '#';

/// Label -> number of reads in one sample.
pub type FrequencyTable = AHashMap<TaxonLabel, u64>;

/// Multiset count of the labels of one sample.
pub fn tally<I>(labels: I) -> FrequencyTable
where
    I: IntoIterator<Item = TaxonLabel>,
{
    let mut counts = FrequencyTable::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Sample name for a file: its base name with the last extension removed.
/// A trailing `.gz` is dropped first, so `A.sam.gz` names sample `A`.
pub fn sample_name<P: AsRef<Path>>(path: P) -> String {
    let file_name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = file_name.strip_suffix(".gz").unwrap_or(&file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => base.to_string(),
    }
}

/// Taxon-by-sample count table. Every cell is defined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMatrix {
    samples: Vec<String>,
    rows: Vec<TaxonLabel>,
    /// `counts[row][column]`
    counts: Vec<Vec<u64>>,
}

impl CountMatrix {
    /// Merge per-sample tables. Column order follows `tables`; rows are
    /// the sorted union of all labels.
    pub fn from_tables(tables: Vec<(String, FrequencyTable)>) -> Self {
        let rows: Vec<TaxonLabel> = tables
            .iter()
            .flat_map(|(_, table)| table.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let counts = rows
            .iter()
            .map(|label| {
                tables
                    .iter()
                    .map(|(_, table)| table.get(label).copied().unwrap_or(0))
                    .collect()
            })
            .collect();

        CountMatrix {
            samples: tables.into_iter().map(|(name, _)| name).collect(),
            rows,
            counts,
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn rows(&self) -> &[TaxonLabel] {
        &self.rows
    }

    /// Count for `(label, sample)`, zero when the sample never saw the label.
    /// `None` only if the label or sample is not part of the matrix.
    pub fn get(&self, label: &TaxonLabel, sample: &str) -> Option<u64> {
        let row = self.rows.binary_search(label).ok()?;
        let col = self.samples.iter().position(|s| s == sample)?;
        Some(self.counts[row][col])
    }

    pub fn column_total(&self, sample: &str) -> Option<u64> {
        let col = self.samples.iter().position(|s| s == sample)?;
        Some(self.counts.iter().map(|row| row[col]).sum())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.samples.len() + 1);
        header.push(String::new());
        header.extend(
            self.samples
                .iter()
                .map(|s| format!("{}{}", SAMPLE_MARKER, s)),
        );
        wtr.write_record(&header)?;

        for (label, counts) in self.rows.iter().zip(&self.counts) {
            let mut record = Vec::with_capacity(counts.len() + 1);
            record.push(label.to_string());
            record.extend(counts.iter().map(u64::to_string));
            wtr.write_record(&record)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Write next to `path` and rename into place, so `path` is either
    /// absent or a complete table.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LcaError::io(dir, e))?;
        self.write_csv(tmp.as_file_mut())?;
        tmp.persist(path).map_err(|e| LcaError::io(path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxa(ids: &[u32]) -> FrequencyTable {
        tally(ids.iter().map(|&t| TaxonLabel::Taxon(t)))
    }

    #[test]
    fn test_tally_counts_multiset() {
        let table = taxa(&[9, 2, 9, 9]);
        assert_eq!(table.len(), 2);
        assert_eq!(table[&TaxonLabel::Taxon(9)], 3);
        assert_eq!(table[&TaxonLabel::Taxon(2)], 1);
    }

    #[test]
    fn test_sample_name() {
        assert_eq!(sample_name("/data/out/A.sam"), "A");
        assert_eq!(sample_name("x.y.sam"), "x.y");
        assert_eq!(sample_name("noext"), "noext");
        assert_eq!(sample_name("/data/out/A.sam.gz"), "A");
        assert_eq!(sample_name("x.y.sam.gz"), "x.y");
    }

    #[test]
    fn test_write_to_path_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxon_counts.csv");
        std::fs::write(&path, "old contents\n").unwrap();

        let matrix = CountMatrix::from_tables(vec![("A".to_string(), taxa(&[9]))]);
        matrix.write_to_path(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), ",#A\n9,1\n");
        // Only the table itself is left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_matrix_is_total() {
        let matrix = CountMatrix::from_tables(vec![
            ("A".to_string(), taxa(&[9, 9])),
            ("B".to_string(), taxa(&[2])),
            ("C".to_string(), FrequencyTable::new()),
        ]);
        assert_eq!(matrix.samples(), ["A", "B", "C"]);
        assert_eq!(matrix.rows(), [TaxonLabel::Taxon(2), TaxonLabel::Taxon(9)]);
        for row in matrix.rows() {
            for sample in matrix.samples() {
                assert!(matrix.get(row, sample).is_some());
            }
        }
        assert_eq!(matrix.get(&TaxonLabel::Taxon(9), "A"), Some(2));
        assert_eq!(matrix.get(&TaxonLabel::Taxon(9), "B"), Some(0));
        assert_eq!(matrix.get(&TaxonLabel::Taxon(2), "B"), Some(1));
        assert_eq!(matrix.get(&TaxonLabel::Taxon(7), "A"), None);
        assert_eq!(matrix.column_total("A"), Some(2));
        assert_eq!(matrix.column_total("C"), Some(0));
    }

    #[test]
    fn test_write_csv() {
        let matrix = CountMatrix::from_tables(vec![
            ("A".to_string(), taxa(&[9, 9])),
            ("B".to_string(), taxa(&[2])),
        ]);
        let mut out = Vec::new();
        matrix.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            ",#A,#B\n2,0,1\n9,2,0\n"
        );
    }

    #[test]
    fn test_write_csv_quotes_lineages() {
        let table = tally(vec![TaxonLabel::Lineage("k__Bacteria;s__E, coli".to_string())]);
        let matrix = CountMatrix::from_tables(vec![("S1".to_string(), table)]);
        let mut out = Vec::new();
        matrix.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            ",#S1\n\"k__Bacteria;s__E, coli\",1\n"
        );
    }
}
