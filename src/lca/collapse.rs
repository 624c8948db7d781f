//src/lca/collapse.rs

use ahash::AHashMap;

use crate::error::{LcaError, Result};
use crate::lca::resolve::ResolutionMap;
use crate::taxdb::{rank_matches, TaxonomyService};
use crate::types::{Resolution, TaxonLabel};

/// How resolved reads are reported. Fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollapseMode {
    /// Report the Greengenes lineage at the target depth.
    #[default]
    Lineage,
    /// Report the raw taxon id, only for taxa sitting exactly at the target rank.
    RankFilter,
}

/// Post-processes a `ResolutionMap` into reportable labels.
#[derive(Debug, Clone)]
pub struct Collapser {
    mode: CollapseMode,
    depth: usize,
    rank_name: &'static str,
}

impl Collapser {
    /// Fails if `depth` does not index one of the taxonomy's rank names.
    pub fn new<T: TaxonomyService + ?Sized>(
        mode: CollapseMode,
        depth: usize,
        taxonomy: &T,
    ) -> Result<Self> {
        let ranks = taxonomy.ordered_rank_names();
        let rank_name = *ranks.get(depth).ok_or(LcaError::InvalidDepth {
            depth,
            max: ranks.len().saturating_sub(1),
        })?;
        if mode == CollapseMode::RankFilter && depth == 0 {
            log::warn!(
                "Rank filter at depth 0 keeps only taxa ranked {:?}; \
                 most taxonomies label their root \"no rank\", so the table may be empty",
                rank_name
            );
        }
        Ok(Collapser {
            mode,
            depth,
            rank_name,
        })
    }

    pub fn mode(&self) -> CollapseMode {
        self.mode
    }

    pub fn rank_name(&self) -> &'static str {
        self.rank_name
    }

    /// Label for one resolved read, `None` if it is dropped.
    pub fn label<T: TaxonomyService + ?Sized>(
        &self,
        taxonomy: &T,
        resolution: Resolution,
    ) -> Option<TaxonLabel> {
        let tax_id = resolution.taxon()?;
        match self.mode {
            CollapseMode::Lineage => {
                let lineage = taxonomy.lineage(tax_id, self.depth);
                (!lineage.is_empty()).then_some(TaxonLabel::Lineage(lineage))
            }
            CollapseMode::RankFilter => taxonomy
                .rank_of(tax_id)
                .is_some_and(|rank| rank_matches(self.rank_name, rank))
                .then_some(TaxonLabel::Taxon(tax_id)),
        }
    }

    /// Apply the collapse to every read, dropping the ones without a label.
    pub fn collapse<T: TaxonomyService + ?Sized>(
        &self,
        taxonomy: &T,
        lca_map: &ResolutionMap,
    ) -> AHashMap<String, TaxonLabel> {
        lca_map
            .iter()
            .filter_map(|(read_id, &res)| {
                self.label(taxonomy, res)
                    .map(|label| (read_id.clone(), label))
            })
            .collect()
    }
}
