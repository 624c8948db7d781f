use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;

use shogun_lca::config::{LcaConfig, TaxonomySource, DEFAULT_DEPTH};
use shogun_lca::error::Result;
use shogun_lca::lca::{CollapseMode, TaxonExtractor};
use shogun_lca::Pipeline;

/// Assign reads to the lowest common ancestor of their hits and build a taxon count table.
#[derive(Parser, Debug)]
#[command(name = "shogun-lca", version, about)]
struct Cli {
    /// Directory containing the input FASTA files with ".fna" extensions (default=cwd)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory for the SAM files and taxon_counts.csv (default=cwd)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to the bowtie2 index. Without it only existing SAM files are used.
    #[arg(short = 'b', long = "bt2-index")]
    bt2_index: Option<PathBuf>,

    /// Characters that sandwich the NCBI taxid in the reference names
    #[arg(short = 'x', long, default_value = "ncbi_tid|,|")]
    extract_ncbi_tid: String,

    /// The depth of the search (7=species; 0=no collapse with lineages, rank "root" without)
    #[arg(short, long, default_value_t = DEFAULT_DEPTH)]
    depth: usize,

    /// The number of threads to use
    #[arg(short = 'p', long, default_value_t = 1)]
    threads: usize,

    /// Annotate the taxid with its lineage; `false` keeps raw taxids at the target rank
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    annotate_lineage: bool,

    /// Taxonomy as a `taxid<TAB>parent<TAB>name<TAB>rank` file
    #[arg(long, conflicts_with_all = ["ncbi_nodes", "ncbi_names"])]
    taxdb: Option<PathBuf>,

    /// NCBI nodes.dmp
    #[arg(long, requires = "ncbi_names")]
    ncbi_nodes: Option<PathBuf>,

    /// NCBI names.dmp
    #[arg(long, requires = "ncbi_nodes")]
    ncbi_names: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<LcaConfig> {
        let extractor: TaxonExtractor = self.extract_ncbi_tid.parse()?;
        let taxonomy = match (self.taxdb, self.ncbi_nodes, self.ncbi_names) {
            (Some(path), _, _) => Some(TaxonomySource::TaxDb(path)),
            (None, Some(nodes), Some(names)) => Some(TaxonomySource::NcbiDump { nodes, names }),
            _ => None,
        };
        let defaults = LcaConfig::default();
        Ok(LcaConfig {
            input_dir: self.input.unwrap_or(defaults.input_dir),
            output_dir: self.output.unwrap_or(defaults.output_dir),
            aligner_index: self.bt2_index,
            taxonomy,
            extractor,
            depth: self.depth,
            threads: self.threads,
            mode: if self.annotate_lineage {
                CollapseMode::Lineage
            } else {
                CollapseMode::RankFilter
            },
        })
    }
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{}}} {{msg}}", color))
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg);
    spinner
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;

    // 1. Taxonomy + config validation, before any sample is touched
    let sp = spinner("blue", "Loading taxonomy...");
    let pipeline = Pipeline::new(config)?;
    sp.finish_with_message(format!("Loaded {} taxa.", pipeline.taxonomy().len()));

    // 2. Alignment (or reuse of existing SAM files)
    pipeline.prepare_output()?;
    let sp = spinner("green", "Aligning reads...");
    let aligned = pipeline.align_inputs()?;
    sp.finish_with_message(format!("{} query file(s) aligned or reused.", aligned.len()));

    // 3. LCA + collapse + counts
    let sam_files = pipeline.discover_alignments()?;
    let sp = spinner("yellow", "Resolving lowest common ancestors...");
    let matrix = pipeline.profile(&sam_files)?;
    sp.finish_with_message(format!(
        "{} taxa across {} sample(s).",
        matrix.rows().len(),
        matrix.samples().len()
    ));

    // 4. Output
    let sp = spinner("cyan", "Writing count table...");
    let path = pipeline.write(&matrix)?;
    sp.finish_with_message(format!("Wrote {}", path.display()));
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        let mut msg = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            if !msg.contains(&cause.to_string()) {
                msg.push_str(&format!(": {}", cause));
            }
            source = cause.source();
        }
        eprintln!("Error: {}", msg);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shogun_lca::error::LcaError;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["shogun-lca", "--taxdb", "tax.db"]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.depth, 7);
        assert_eq!(config.threads, 1);
        assert_eq!(config.mode, CollapseMode::Lineage);
        assert_eq!(config.extractor, TaxonExtractor::default());
        assert_eq!(config.taxonomy, Some(TaxonomySource::TaxDb(PathBuf::from("tax.db"))));
    }

    #[test]
    fn test_cli_rank_filter_and_ncbi() {
        let cli = Cli::parse_from([
            "shogun-lca", "-a", "false", "-d", "6", "-x", "tid:,;",
            "--ncbi-nodes", "nodes.dmp", "--ncbi-names", "names.dmp",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.mode, CollapseMode::RankFilter);
        assert_eq!(config.depth, 6);
        assert_eq!(config.extractor.to_string(), "tid:,;");
        assert!(matches!(config.taxonomy, Some(TaxonomySource::NcbiDump { .. })));
    }

    #[test]
    fn test_cli_bad_delimiters() {
        let cli = Cli::parse_from(["shogun-lca", "-x", "no-comma"]);
        assert!(matches!(cli.into_config(), Err(LcaError::InvalidDelimiters(_))));
    }
}
