//src/types.rs

use std::fmt;

/// Numeric taxon identifier (NCBI taxid).
pub type TaxId = u32;

/// Outcome of resolving every hit of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// All hits so far share this taxon (or their LCA is this taxon).
    Resolved(TaxId),
    /// Two hits had no common ancestor. Sticky for the rest of the file.
    Unresolved,
}

impl Resolution {
    pub fn taxon(&self) -> Option<TaxId> {
        match *self {
            Resolution::Resolved(tax_id) => Some(tax_id),
            Resolution::Unresolved => None,
        }
    }
}

/// A single reported alignment: the read and the reference it hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub read_id: String,
    pub reference: String,
}

/// Row key of a frequency table / count matrix.
///
/// Which variant appears depends on the run-wide collapse mode, so a single
/// table never mixes the two in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaxonLabel {
    Taxon(TaxId),
    Lineage(String),
}

impl fmt::Display for TaxonLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxonLabel::Taxon(tax_id) => write!(f, "{}", tax_id),
            TaxonLabel::Lineage(lineage) => f.write_str(lineage),
        }
    }
}
