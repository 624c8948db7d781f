//src/taxdb.rs

use ahash::{AHashMap, AHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{LcaError, Result};
use crate::types::TaxId;

/// Rank names indexed by collapse depth. Depth 7 (species) is the default.
pub const RANK_NAMES: [&str; 8] = [
    "root",
    "superkingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "species",
];

/// Whether a node ranked `rank` sits at the `target` rank level.
/// Newer NCBI dumps call the top level `domain` instead of `superkingdom`.
pub fn rank_matches(target: &str, rank: &str) -> bool {
    target == rank || (target == "superkingdom" && rank == "domain")
}

/// Greengenes prefixes for depths 1..=7.
const LINEAGE_PREFIXES: [&str; 7] = ["k__", "p__", "c__", "o__", "f__", "g__", "s__"];

/// What the LCA resolver and the collapser need from a taxonomy.
pub trait TaxonomyService {
    /// Deepest shared ancestor of `a` and `b`, or `None` when there is none.
    fn lowest_common_ancestor(&self, a: TaxId, b: TaxId) -> Option<TaxId>;

    /// Lineage string down to `depth`. Empty when the taxon has no ranked ancestry.
    fn lineage(&self, tax_id: TaxId, depth: usize) -> String;

    fn rank_of(&self, tax_id: TaxId) -> Option<&str>;

    fn ordered_rank_names(&self) -> &[&'static str];
}

#[derive(Debug, Clone)]
struct TaxNode {
    tax_id: TaxId,
    parent: Option<usize>,
    name: String,
    rank: String,
}

/// Taxonomy stored as an arena of nodes with parent indices.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyTree {
    nodes: Vec<TaxNode>,
    index: AHashMap<TaxId, usize>,
}

/// One parsed line before parent ids are turned into arena indices.
struct RawNode {
    tax_id: TaxId,
    parent_id: TaxId,
    name: String,
    rank: String,
}

impl TaxonomyTree {
    /// Build a tree from `(taxid, parent, name, rank)` tuples.
    ///
    /// A node whose parent is 0, itself, or absent from the input becomes a root.
    /// Later duplicates of a taxid replace earlier ones.
    pub fn from_nodes<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TaxId, TaxId, String, String)>,
    {
        let raw = records
            .into_iter()
            .map(|(tax_id, parent_id, name, rank)| RawNode {
                tax_id,
                parent_id,
                name,
                rank,
            })
            .collect();
        Self::build(raw)
    }

    fn build(raw: Vec<RawNode>) -> Result<Self> {
        let mut index: AHashMap<TaxId, usize> = AHashMap::with_capacity(raw.len());
        let mut nodes: Vec<TaxNode> = Vec::with_capacity(raw.len());
        let mut parents: Vec<TaxId> = Vec::with_capacity(raw.len());

        for node in raw {
            let node_ref = TaxNode {
                tax_id: node.tax_id,
                parent: None,
                name: node.name,
                rank: node.rank,
            };
            match index.get(&node.tax_id) {
                Some(&slot) => {
                    nodes[slot] = node_ref;
                    parents[slot] = node.parent_id;
                }
                None => {
                    index.insert(node.tax_id, nodes.len());
                    nodes.push(node_ref);
                    parents.push(node.parent_id);
                }
            }
        }

        for (slot, &parent_id) in parents.iter().enumerate() {
            if parent_id != 0 && parent_id != nodes[slot].tax_id {
                nodes[slot].parent = index.get(&parent_id).copied();
            }
        }

        let tree = TaxonomyTree { nodes, index };
        tree.check_acyclic()?;
        Ok(tree)
    }

    fn check_acyclic(&self) -> Result<()> {
        // Nodes already proven to reach a root.
        let mut rooted = vec![false; self.nodes.len()];
        for start in 0..self.nodes.len() {
            let mut path = Vec::new();
            let mut on_path = AHashSet::new();
            let mut cur = Some(start);
            while let Some(slot) = cur {
                if rooted[slot] {
                    break;
                }
                if !on_path.insert(slot) {
                    return Err(LcaError::TaxonomyCycle(self.nodes[start].tax_id));
                }
                path.push(slot);
                cur = self.nodes[slot].parent;
            }
            for slot in path {
                rooted[slot] = true;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name_of(&self, tax_id: TaxId) -> Option<&str> {
        self.node(tax_id).map(|n| n.name.as_str())
    }

    pub fn parent_of(&self, tax_id: TaxId) -> Option<TaxId> {
        let slot = *self.index.get(&tax_id)?;
        self.nodes[slot].parent.map(|p| self.nodes[p].tax_id)
    }

    fn node(&self, tax_id: TaxId) -> Option<&TaxNode> {
        self.index.get(&tax_id).map(|&slot| &self.nodes[slot])
    }

    /// Arena slots from `slot` up to its root, inclusive.
    fn ancestry(&self, slot: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(slot), move |&s| self.nodes[s].parent)
    }
}

impl TaxonomyService for TaxonomyTree {
    fn lowest_common_ancestor(&self, a: TaxId, b: TaxId) -> Option<TaxId> {
        let a_slot = *self.index.get(&a)?;
        let b_slot = *self.index.get(&b)?;
        if a_slot == b_slot {
            return Some(a);
        }

        let a_anc: AHashSet<usize> = self.ancestry(a_slot).collect();
        self.ancestry(b_slot)
            .find(|slot| a_anc.contains(slot))
            .map(|slot| self.nodes[slot].tax_id)
    }

    fn lineage(&self, tax_id: TaxId, depth: usize) -> String {
        let Some(&slot) = self.index.get(&tax_id) else {
            return String::new();
        };
        // Depth 0 collapses nothing: use the whole window.
        let depth = if depth == 0 {
            LINEAGE_PREFIXES.len()
        } else {
            depth.min(LINEAGE_PREFIXES.len())
        };

        let mut levels: Vec<Option<&str>> = vec![None; depth];
        for s in self.ancestry(slot) {
            let node = &self.nodes[s];
            if let Some(level) = RANK_NAMES[1..=depth]
                .iter()
                .position(|&r| rank_matches(r, &node.rank))
            {
                // The deepest match wins if a rank repeats along the path.
                if levels[level].is_none() {
                    levels[level] = Some(node.name.as_str());
                }
            }
        }

        let Some(last) = levels.iter().rposition(Option::is_some) else {
            return String::new();
        };
        levels[..=last]
            .iter()
            .zip(LINEAGE_PREFIXES.iter())
            .map(|(name, prefix)| format!("{}{}", prefix, name.unwrap_or("")))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn rank_of(&self, tax_id: TaxId) -> Option<&str> {
        self.node(tax_id).map(|n| n.rank.as_str())
    }

    fn ordered_rank_names(&self) -> &[&'static str] {
        &RANK_NAMES
    }
}

fn parse_id(raw: &str, path: &Path, line: usize, what: &str) -> Result<TaxId> {
    raw.trim().parse().map_err(|_| LcaError::Taxonomy {
        path: path.to_path_buf(),
        line,
        msg: format!("invalid {} {:?}", what, raw.trim()),
    })
}

/// Parses a taxDB file in the format:
/// ```text
/// <taxid>\t<parentid>\t<taxname>\t<rank>
/// ```
/// Blank lines are skipped; anything else with fewer than four fields is an error.
pub fn parse_taxdb<P: AsRef<Path>>(filepath: P) -> Result<TaxonomyTree> {
    let path = filepath.as_ref();
    let file = File::open(path).map_err(|e| LcaError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut raw = Vec::new();
    for (i, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| LcaError::io(path, e))?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        // e.g. "2\t1\tBacteria\tsuperkingdom"
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 4 {
            return Err(LcaError::Taxonomy {
                path: path.to_path_buf(),
                line: line_no,
                msg: format!("expected 4 tab-separated fields, found {}", parts.len()),
            });
        }

        raw.push(RawNode {
            tax_id: parse_id(parts[0], path, line_no, "taxid")?,
            parent_id: parse_id(parts[1], path, line_no, "parent taxid")?,
            name: parts[2].trim().to_string(),
            rank: parts[3].trim().to_string(),
        });
    }

    log::info!("Loaded {} taxa from {}", raw.len(), path.display());
    TaxonomyTree::build(raw)
}

fn dmp_fields(line: &str) -> Vec<&str> {
    line.trim_end()
        .trim_end_matches('|')
        .split('|')
        .map(str::trim)
        .collect()
}

/// Parses an NCBI taxonomy dump (`nodes.dmp` + `names.dmp`).
/// Only scientific names are kept.
pub fn parse_ncbi_dump<P: AsRef<Path>, Q: AsRef<Path>>(
    nodes_path: P,
    names_path: Q,
) -> Result<TaxonomyTree> {
    let names_path = names_path.as_ref();
    let names_file = File::open(names_path).map_err(|e| LcaError::io(names_path, e))?;
    let mut names: AHashMap<TaxId, String> = AHashMap::new();
    for (i, line) in BufReader::new(names_file).lines().enumerate() {
        let line = line.map_err(|e| LcaError::io(names_path, e))?;
        let fields = dmp_fields(&line);
        if fields.len() < 4 || fields[3] != "scientific name" {
            continue;
        }
        let tax_id = parse_id(fields[0], names_path, i + 1, "taxid")?;
        names.insert(tax_id, fields[1].to_string());
    }

    let nodes_path = nodes_path.as_ref();
    let nodes_file = File::open(nodes_path).map_err(|e| LcaError::io(nodes_path, e))?;
    let mut raw = Vec::new();
    for (i, line) in BufReader::new(nodes_file).lines().enumerate() {
        let line = line.map_err(|e| LcaError::io(nodes_path, e))?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields = dmp_fields(&line);
        if fields.len() < 3 {
            return Err(LcaError::Taxonomy {
                path: nodes_path.to_path_buf(),
                line: line_no,
                msg: format!("expected at least 3 fields, found {}", fields.len()),
            });
        }
        let tax_id = parse_id(fields[0], nodes_path, line_no, "taxid")?;
        raw.push(RawNode {
            tax_id,
            parent_id: parse_id(fields[1], nodes_path, line_no, "parent taxid")?,
            name: names.remove(&tax_id).unwrap_or_default(),
            rank: fields[2].to_string(),
        });
    }

    log::info!("Loaded {} taxa from {}", raw.len(), nodes_path.display());
    TaxonomyTree::build(raw)
}
