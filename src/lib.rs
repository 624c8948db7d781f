// src/lib.rs
pub mod aligner;
pub mod config;
pub mod counts;
pub mod error;
pub mod lca;
pub mod sam;
pub mod taxdb;
pub mod types;

use ahash::AHashSet;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::aligner::{align_or_reuse, Aligner, Bowtie2Aligner};
use crate::config::{LcaConfig, ALIGNMENT_SUFFIXES, QUERY_SUFFIXES};
use crate::counts::{sample_name, tally, CountMatrix, FrequencyTable};
use crate::error::{LcaError, Result};
use crate::lca::{resolve_alignments, Collapser, TaxonExtractor};
use crate::sam::alignments;
use crate::taxdb::{TaxonomyService, TaxonomyTree};
use crate::types::Resolution;

/// Files in `dir` whose name ends in one of `suffixes`, sorted by file name.
/// The order is the column order of the count table.
pub fn discover_files(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| LcaError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LcaError::io(dir, e))?.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .is_some_and(|n| suffixes.iter().any(|s| n.ends_with(s)));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve, collapse and count one SAM file.
pub fn profile_sample<T>(
    sam_path: &Path,
    extractor: &TaxonExtractor,
    collapser: &Collapser,
    taxonomy: &T,
) -> Result<FrequencyTable>
where
    T: TaxonomyService + ?Sized,
{
    let reader = alignments(sam_path)?;
    let mut n_alignments = 0usize;
    let lca_map = resolve_alignments(reader.inspect(|_| n_alignments += 1), extractor, taxonomy)?;

    let unresolved = lca_map
        .values()
        .filter(|&&r| r == Resolution::Unresolved)
        .count();
    let labels = collapser.collapse(taxonomy, &lca_map);
    log::debug!(
        "{}: {} alignments, {} reads, {} unresolved, {} dropped by collapse",
        sam_path.display(),
        n_alignments,
        lca_map.len(),
        unresolved,
        lca_map.len() - unresolved - labels.len()
    );

    // The resolution map is dropped here; only the counts leave this sample.
    Ok(tally(labels.into_values()))
}

/// One configured run: taxonomy loaded and settings validated.
pub struct Pipeline {
    config: LcaConfig,
    taxonomy: TaxonomyTree,
    collapser: Collapser,
}

impl Pipeline {
    /// Loads the taxonomy and validates the depth. Touches no sample file.
    pub fn new(config: LcaConfig) -> Result<Self> {
        let taxonomy = config.taxonomy_source()?.load()?;
        Self::with_taxonomy(config, taxonomy)
    }

    pub fn with_taxonomy(config: LcaConfig, taxonomy: TaxonomyTree) -> Result<Self> {
        let collapser = Collapser::new(config.mode, config.depth, &taxonomy)?;
        log::info!(
            "Collapsing at depth {} ({}) in {:?} mode",
            config.depth,
            collapser.rank_name(),
            collapser.mode()
        );
        Ok(Pipeline {
            config,
            taxonomy,
            collapser,
        })
    }

    pub fn config(&self) -> &LcaConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &TaxonomyTree {
        &self.taxonomy
    }

    /// Create the output directory and remove a count table left by an earlier run.
    pub fn prepare_output(&self) -> Result<()> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|e| LcaError::io(dir, e))?;

        let stale = self.config.counts_path();
        match fs::remove_file(&stale) {
            Ok(()) => {
                log::info!("Removed previous {}", stale.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LcaError::io(stale, e)),
        }
    }

    /// Align every `.fna` in the input directory, reusing SAM files that exist.
    pub fn align_inputs(&self) -> Result<Vec<PathBuf>> {
        let queries = discover_files(&self.config.input_dir, QUERY_SUFFIXES)?;
        let bowtie2 = self
            .config
            .aligner_index
            .as_ref()
            .map(|index| Bowtie2Aligner::new(index, self.config.threads));
        let aligner = bowtie2.as_ref().map(|a| a as &dyn Aligner);

        queries
            .iter()
            .map(|query| align_or_reuse(aligner, query, &self.config.output_dir))
            .collect()
    }

    /// `*.sam` and `*.sam.gz` in the output directory. Two files naming the
    /// same sample are rejected.
    pub fn discover_alignments(&self) -> Result<Vec<PathBuf>> {
        let files = discover_files(&self.config.output_dir, ALIGNMENT_SUFFIXES)?;
        let mut seen = AHashSet::with_capacity(files.len());
        for path in &files {
            let name = sample_name(path);
            if !seen.insert(name.clone()) {
                return Err(LcaError::DuplicateSample(name));
            }
        }
        Ok(files)
    }

    /// Profile every SAM file, one worker per file, and merge into a matrix.
    pub fn profile(&self, sam_files: &[PathBuf]) -> Result<CountMatrix> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.max(1))
            .build()?;

        let tables: Vec<(String, FrequencyTable)> = pool.install(|| {
            sam_files
                .par_iter()
                .map(|path| -> Result<(String, FrequencyTable)> {
                    let table = profile_sample(
                        path,
                        &self.config.extractor,
                        &self.collapser,
                        &self.taxonomy,
                    )
                    .map_err(|e| e.in_sample(path))?;
                    Ok((sample_name(path), table))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let matrix = CountMatrix::from_tables(tables);
        log::info!(
            "Built count table: {} rows x {} samples",
            matrix.rows().len(),
            matrix.samples().len()
        );
        Ok(matrix)
    }

    pub fn write(&self, matrix: &CountMatrix) -> Result<PathBuf> {
        let path = self.config.counts_path();
        matrix.write_to_path(&path)?;
        log::info!("Wrote {}", path.display());
        Ok(path)
    }

    /// All phases in order. The count table is written only if every sample succeeded.
    pub fn run(&self) -> Result<CountMatrix> {
        self.prepare_output()?;
        self.align_inputs()?;
        let sam_files = self.discover_alignments()?;
        let matrix = self.profile(&sam_files)?;
        self.write(&matrix)?;
        Ok(matrix)
    }
}

/// Load the taxonomy, validate `config`, and run the whole pipeline.
pub fn run(config: LcaConfig) -> Result<CountMatrix> {
    Pipeline::new(config)?.run()
}
