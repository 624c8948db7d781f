pub mod collapse;
pub mod resolve;

pub use collapse::{CollapseMode, Collapser};
pub use resolve::{resolve_alignments, ResolutionMap, TaxonExtractor};
