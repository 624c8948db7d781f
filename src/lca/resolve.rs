//src/lca/resolve.rs

use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;

use crate::error::{LcaError, Result};
use crate::taxdb::TaxonomyService;
use crate::types::{Alignment, Resolution, TaxId};

/// Read id -> resolved taxon for one alignment file.
pub type ResolutionMap = AHashMap<String, Resolution>;

/// Pulls the taxon id out of a reference name using a pair of markers,
/// e.g. `ncbi_tid|` and `|` for `gi|123|ncbi_tid|562|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonExtractor {
    begin: String,
    end: String,
}

impl TaxonExtractor {
    pub fn new(begin: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let begin = begin.into();
        let end = end.into();
        if begin.is_empty() {
            return Err(LcaError::InvalidDelimiters(format!("{},{}", begin, end)));
        }
        Ok(TaxonExtractor { begin, end })
    }

    /// Text between the first `begin` and the next `end` after it.
    /// An empty `end` marker runs to the end of the string.
    fn find_between<'a>(&self, reference: &'a str) -> Result<&'a str> {
        let start = reference
            .find(&self.begin)
            .map(|i| i + self.begin.len())
            .ok_or_else(|| LcaError::MissingMarker {
                reference: reference.to_string(),
                marker: self.begin.clone(),
            })?;
        let rest = &reference[start..];
        if self.end.is_empty() {
            return Ok(rest);
        }
        let stop = rest.find(&self.end).ok_or_else(|| LcaError::MissingMarker {
            reference: reference.to_string(),
            marker: self.end.clone(),
        })?;
        Ok(&rest[..stop])
    }

    pub fn extract(&self, reference: &str) -> Result<TaxId> {
        let raw = self.find_between(reference)?;
        raw.trim().parse().map_err(|_| LcaError::InvalidTaxonId {
            reference: reference.to_string(),
            raw: raw.to_string(),
        })
    }
}

impl Default for TaxonExtractor {
    fn default() -> Self {
        TaxonExtractor {
            begin: "ncbi_tid|".to_string(),
            end: "|".to_string(),
        }
    }
}

impl FromStr for TaxonExtractor {
    type Err = LcaError;

    /// Parses `"<begin>,<end>"`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(begin), Some(end), None) => {
                TaxonExtractor::new(begin, end).map_err(|_| LcaError::InvalidDelimiters(s.to_string()))
            }
            _ => Err(LcaError::InvalidDelimiters(s.to_string())),
        }
    }
}

impl fmt::Display for TaxonExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.begin, self.end)
    }
}

/// Fold one more hit into a read's current resolution.
pub fn merge_hit<T: TaxonomyService + ?Sized>(
    taxonomy: &T,
    current: Resolution,
    hit: TaxId,
) -> Resolution {
    match current {
        Resolution::Unresolved => Resolution::Unresolved,
        Resolution::Resolved(cur) if cur == hit => current,
        Resolution::Resolved(cur) => taxonomy
            .lowest_common_ancestor(cur, hit)
            .map_or(Resolution::Unresolved, Resolution::Resolved),
    }
}

/// Resolve every read of one file to a single taxon.
///
/// The first hit of a read is taken as-is; each later hit narrows it to the
/// LCA. A read whose hits share no ancestor becomes `Unresolved` and stays so.
/// Any extraction failure aborts the file.
pub fn resolve_alignments<I, T>(
    alignments: I,
    extractor: &TaxonExtractor,
    taxonomy: &T,
) -> Result<ResolutionMap>
where
    I: IntoIterator<Item = Result<Alignment>>,
    T: TaxonomyService + ?Sized,
{
    let mut lca_map = ResolutionMap::new();
    for alignment in alignments {
        let Alignment { read_id, reference } = alignment?;
        let hit = extractor.extract(&reference)?;

        match lca_map.get_mut(&read_id) {
            Some(current) => *current = merge_hit(taxonomy, *current, hit),
            None => {
                lca_map.insert(read_id, Resolution::Resolved(hit));
            }
        }
    }
    Ok(lca_map)
}
