use std::fs;
use std::path::{Path, PathBuf};

use shogun_lca::config::{LcaConfig, TaxonomySource};
use shogun_lca::error::LcaError;
use shogun_lca::lca::{CollapseMode, TaxonExtractor};
use shogun_lca::run;
use shogun_lca::types::TaxonLabel;

/// 1 (root) -> 2 (genus) -> {5, 12} (species); 1 -> 9 (genus); 1 -> 30 (genus) -> 31 (species)
const TAXDB: &str = "1\t1\troot\tno rank\n\
2\t1\tAlphagenus\tgenus\n\
5\t2\tAlphagenus one\tspecies\n\
12\t2\tAlphagenus two\tspecies\n\
9\t1\tBetagenus\tgenus\n\
30\t1\tGammagenus\tgenus\n\
31\t30\tGammagenus one\tspecies\n\
77\t0\tOrphan\tgenus\n";

struct Workspace {
    _dir: tempfile::TempDir,
    input: PathBuf,
    output: PathBuf,
    taxdb: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir(&input).unwrap();
    let taxdb = dir.path().join("taxDB");
    fs::write(&taxdb, TAXDB).unwrap();
    Workspace {
        _dir: dir,
        input,
        output,
        taxdb,
    }
}

fn write_sam(dir: &Path, name: &str, hits: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    let mut body = String::from("@HD\tVN:1.0\tSO:unsorted\n");
    for (read, reference) in hits {
        body.push_str(&format!(
            "{}\t0\t{}\t1\t255\t8M\t*\t0\t0\tACGTACGT\tIIIIIIII\n",
            read, reference
        ));
    }
    fs::write(dir.join(name), body).unwrap();
}

fn config(ws: &Workspace, mode: CollapseMode, depth: usize) -> LcaConfig {
    LcaConfig {
        input_dir: ws.input.clone(),
        output_dir: ws.output.clone(),
        aligner_index: None,
        taxonomy: Some(TaxonomySource::TaxDb(ws.taxdb.clone())),
        extractor: TaxonExtractor::default(),
        depth,
        threads: 2,
        mode,
    }
}

#[test]
fn rank_filter_two_sample_scenario() {
    let ws = workspace();
    write_sam(
        &ws.output,
        "A.sam",
        &[("r1", "refX|ncbi_tid|9|"), ("r2", "refY|ncbi_tid|9|")],
    );
    write_sam(
        &ws.output,
        "B.sam",
        &[("r1", "refZ|ncbi_tid|5|"), ("r1", "refW|ncbi_tid|12|")],
    );

    let matrix = run(config(&ws, CollapseMode::RankFilter, 6)).unwrap();

    assert_eq!(matrix.samples(), ["A", "B"]);
    assert_eq!(matrix.rows(), [TaxonLabel::Taxon(2), TaxonLabel::Taxon(9)]);
    assert_eq!(matrix.get(&TaxonLabel::Taxon(9), "A"), Some(2));
    assert_eq!(matrix.get(&TaxonLabel::Taxon(9), "B"), Some(0));
    assert_eq!(matrix.get(&TaxonLabel::Taxon(2), "A"), Some(0));
    assert_eq!(matrix.get(&TaxonLabel::Taxon(2), "B"), Some(1));

    let csv = fs::read_to_string(ws.output.join("taxon_counts.csv")).unwrap();
    assert_eq!(csv, ",#A,#B\n2,0,1\n9,2,0\n");
}

#[test]
fn rank_filter_at_species_drops_genus_lca() {
    let ws = workspace();
    write_sam(
        &ws.output,
        "B.sam",
        &[("r1", "ncbi_tid|5|"), ("r1", "ncbi_tid|12|"), ("r2", "ncbi_tid|12|")],
    );

    let matrix = run(config(&ws, CollapseMode::RankFilter, 7)).unwrap();
    assert_eq!(matrix.rows(), [TaxonLabel::Taxon(12)]);
    assert_eq!(matrix.column_total("B"), Some(1));
}

#[test]
fn lineage_mode_counts_and_excludes_unresolved() {
    let ws = workspace();
    write_sam(
        &ws.output,
        "S1.sam",
        &[
            ("r1", "ncbi_tid|5|"),
            ("r2", "ncbi_tid|12|"),
            ("r3", "ncbi_tid|31|"),
            // no common ancestor with the orphan root
            ("r4", "ncbi_tid|31|"),
            ("r4", "ncbi_tid|77|"),
            ("r4", "ncbi_tid|31|"),
            // root has no ranked lineage
            ("r5", "ncbi_tid|5|"),
            ("r5", "ncbi_tid|9|"),
        ],
    );

    let matrix = run(config(&ws, CollapseMode::Lineage, 6)).unwrap();
    let alpha = TaxonLabel::Lineage("k__;p__;c__;o__;f__;g__Alphagenus".to_string());
    let gamma = TaxonLabel::Lineage("k__;p__;c__;o__;f__;g__Gammagenus".to_string());
    assert_eq!(matrix.rows(), [alpha.clone(), gamma.clone()]);
    assert_eq!(matrix.get(&alpha, "S1"), Some(2));
    assert_eq!(matrix.get(&gamma, "S1"), Some(1));
    assert_eq!(matrix.column_total("S1"), Some(3));
    assert!(matrix.rows().iter().all(|r| !r.to_string().is_empty()));
}

#[test]
fn malformed_reference_aborts_without_output() {
    let ws = workspace();
    write_sam(&ws.output, "A.sam", &[("r1", "ncbi_tid|9|")]);
    write_sam(&ws.output, "B.sam", &[("r1", "refW|tid|12|")]);

    let err = run(config(&ws, CollapseMode::RankFilter, 6)).unwrap_err();
    match err {
        LcaError::Sample { path, source } => {
            assert_eq!(path, ws.output.join("B.sam"));
            assert!(matches!(*source, LcaError::MissingMarker { .. }));
        }
        other => panic!("expected sample error, got {:?}", other),
    }
    assert!(!ws.output.join("taxon_counts.csv").exists());
}

#[test]
fn invalid_depth_aborts_before_output_dir() {
    let ws = workspace();
    let err = run(config(&ws, CollapseMode::Lineage, 8)).unwrap_err();
    assert!(matches!(err, LcaError::InvalidDepth { depth: 8, max: 7 }));
    assert!(!ws.output.exists());
}

#[test]
fn existing_alignments_are_reused_and_missing_ones_fail() {
    let ws = workspace();
    fs::write(ws.input.join("S1.fna"), ">q\nACGT\n").unwrap();
    write_sam(&ws.output, "S1.sam", &[("q", "ncbi_tid|9|")]);

    let matrix = run(config(&ws, CollapseMode::RankFilter, 6)).unwrap();
    assert_eq!(matrix.get(&TaxonLabel::Taxon(9), "S1"), Some(1));

    fs::remove_file(ws.output.join("taxon_counts.csv")).unwrap();
    fs::write(ws.input.join("S2.fna"), ">q\nACGT\n").unwrap();
    let err = run(config(&ws, CollapseMode::RankFilter, 6)).unwrap_err();
    assert!(matches!(err, LcaError::MissingAlignment(ref p) if p == &ws.output.join("S2.sam")));
    assert!(!ws.output.join("taxon_counts.csv").exists());
}

#[test]
fn failed_rerun_removes_previous_table() {
    let ws = workspace();
    write_sam(&ws.output, "A.sam", &[("r1", "ncbi_tid|9|")]);
    let counts = ws.output.join("taxon_counts.csv");

    run(config(&ws, CollapseMode::RankFilter, 6)).unwrap();
    assert!(counts.is_file());

    write_sam(&ws.output, "B.sam", &[("r1", "refW|tid|12|")]);
    assert!(run(config(&ws, CollapseMode::RankFilter, 6)).is_err());
    assert!(!counts.exists());
}

#[test]
fn gzipped_alignments_are_profiled() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let ws = workspace();
    fs::create_dir_all(&ws.output).unwrap();
    let mut enc = GzEncoder::new(
        fs::File::create(ws.output.join("A.sam.gz")).unwrap(),
        Compression::default(),
    );
    enc.write_all(b"@HD\tVN:1.0\nr1\t0\tref|ncbi_tid|9|\t1\t255\t4M\t*\t0\t0\tACGT\tIIII\n")
        .unwrap();
    enc.finish().unwrap();
    write_sam(&ws.output, "B.sam", &[("r1", "ncbi_tid|2|")]);

    let matrix = run(config(&ws, CollapseMode::RankFilter, 6)).unwrap();
    assert_eq!(matrix.samples(), ["A", "B"]);
    assert_eq!(matrix.get(&TaxonLabel::Taxon(9), "A"), Some(1));
    assert_eq!(matrix.get(&TaxonLabel::Taxon(2), "B"), Some(1));

    let csv = fs::read_to_string(ws.output.join("taxon_counts.csv")).unwrap();
    assert_eq!(csv, ",#A,#B\n2,0,1\n9,1,0\n");
}
