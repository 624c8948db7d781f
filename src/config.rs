//src/config.rs

use std::path::PathBuf;

use crate::error::{LcaError, Result};
use crate::lca::{CollapseMode, TaxonExtractor};
use crate::taxdb::{parse_ncbi_dump, parse_taxdb, TaxonomyTree};

/// Default collapse depth (species).
pub const DEFAULT_DEPTH: usize = 7;

/// Query files picked up from the input directory.
pub const QUERY_SUFFIXES: &[&str] = &[".fna"];

/// Alignment files picked up from the output directory.
pub const ALIGNMENT_SUFFIXES: &[&str] = &[".sam", ".sam.gz"];

/// Name of the count table written to the output directory.
pub const COUNTS_FILE_NAME: &str = "taxon_counts.csv";

/// Where the taxonomy is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomySource {
    /// `taxid\tparent\tname\trank` file.
    TaxDb(PathBuf),
    /// NCBI `nodes.dmp` and `names.dmp`.
    NcbiDump { nodes: PathBuf, names: PathBuf },
}

impl TaxonomySource {
    pub fn load(&self) -> Result<TaxonomyTree> {
        match self {
            TaxonomySource::TaxDb(path) => parse_taxdb(path),
            TaxonomySource::NcbiDump { nodes, names } => parse_ncbi_dump(nodes, names),
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct LcaConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// bowtie2 index. Without it only pre-existing SAM files are used.
    pub aligner_index: Option<PathBuf>,
    pub taxonomy: Option<TaxonomySource>,
    pub extractor: TaxonExtractor,
    pub depth: usize,
    pub threads: usize,
    pub mode: CollapseMode,
}

impl Default for LcaConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        LcaConfig {
            input_dir: cwd.clone(),
            output_dir: cwd,
            aligner_index: None,
            taxonomy: None,
            extractor: TaxonExtractor::default(),
            depth: DEFAULT_DEPTH,
            threads: 1,
            mode: CollapseMode::Lineage,
        }
    }
}

impl LcaConfig {
    pub fn taxonomy_source(&self) -> Result<&TaxonomySource> {
        self.taxonomy.as_ref().ok_or(LcaError::MissingTaxonomy)
    }

    pub fn counts_path(&self) -> PathBuf {
        self.output_dir.join(COUNTS_FILE_NAME)
    }
}
