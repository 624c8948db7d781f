//src/error.rs

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::types::TaxId;

pub type Result<T> = std::result::Result<T, LcaError>;

#[derive(Debug, Error)]
pub enum LcaError {
    #[error("invalid depth {depth}: must be between 0 and {max}")]
    InvalidDepth { depth: usize, max: usize },

    #[error("invalid taxon id delimiters {0:?}: expected \"<begin>,<end>\"")]
    InvalidDelimiters(String),

    #[error("no taxonomy configured: pass --taxdb or --ncbi-nodes/--ncbi-names")]
    MissingTaxonomy,

    #[error("reference {reference:?} is missing the {marker:?} marker")]
    MissingMarker { reference: String, marker: String },

    #[error("reference {reference:?} carries a non-numeric taxon id {raw:?}")]
    InvalidTaxonId { reference: String, raw: String },

    #[error("{}:{line}: malformed SAM record", path.display())]
    MalformedRecord { path: PathBuf, line: usize },

    #[error("{}:{line}: {msg}", path.display())]
    Taxonomy { path: PathBuf, line: usize, msg: String },

    #[error("taxon {0} has an ancestor cycle")]
    TaxonomyCycle(TaxId),

    #[error("{program} failed on {} ({status}): {stderr}", query.display())]
    Aligner {
        program: String,
        query: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    #[error("no alignment at {} and no aligner index configured", .0.display())]
    MissingAlignment(PathBuf),

    #[error("more than one alignment file for sample {0:?}")]
    DuplicateSample(String),

    #[error("{}: {source}", path.display())]
    Sample {
        path: PathBuf,
        #[source]
        source: Box<LcaError>,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl LcaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LcaError::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the sample file this error happened in.
    pub(crate) fn in_sample(self, path: impl Into<PathBuf>) -> Self {
        LcaError::Sample {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
