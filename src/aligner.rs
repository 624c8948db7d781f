//src/aligner.rs

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{LcaError, Result};

/// Produces a SAM file for one query file.
pub trait Aligner: Sync {
    fn align(&self, query: &Path, sam_out: &Path) -> Result<()>;
}

/// Runs `bowtie2` against a prebuilt index.
#[derive(Debug, Clone)]
pub struct Bowtie2Aligner {
    pub program: String,
    pub index: PathBuf,
    pub threads: usize,
}

/// Sensitivity preset appended to every bowtie2 call.
const BOWTIE2_PRESET: [&str; 14] = [
    "--very-sensitive",
    "-k",
    "16",
    "--np",
    "0",
    "--mp",
    "1,1",
    "--rdg",
    "0,1",
    "--rfg",
    "0,1",
    "--score-min",
    "L,0,-0.02",
    "--no-unal",
];

impl Bowtie2Aligner {
    pub fn new(index: impl Into<PathBuf>, threads: usize) -> Self {
        Bowtie2Aligner {
            program: "bowtie2".to_string(),
            index: index.into(),
            threads: threads.max(1),
        }
    }

    fn command(&self, query: &Path, sam_out: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-x")
            .arg(&self.index)
            .arg("-S")
            .arg(sam_out)
            .arg("-f")
            .arg("-U")
            .arg(query)
            .arg("-p")
            .arg(self.threads.to_string())
            .args(BOWTIE2_PRESET);
        cmd
    }
}

impl Aligner for Bowtie2Aligner {
    fn align(&self, query: &Path, sam_out: &Path) -> Result<()> {
        log::info!(
            "Aligning {} with {} against {}",
            query.display(),
            self.program,
            self.index.display()
        );
        let output = self
            .command(query, sam_out)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| LcaError::io(&self.program, e))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(LcaError::Aligner {
                program: self.program.clone(),
                query: query.to_path_buf(),
                status: output.status,
                stderr,
            });
        }
        // bowtie2 prints its alignment summary on stderr.
        if !stderr.is_empty() {
            log::debug!("{}: {}", query.display(), stderr);
        }
        Ok(())
    }
}

/// Where the alignment of `query` is written: `<out_dir>/<stem>.sam`.
pub fn sam_path_for(query: &Path, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}.sam", crate::counts::sample_name(query)))
}

/// Align `query` unless its SAM already exists, in which case it is reused as-is.
/// Returns the SAM path.
pub fn align_or_reuse(
    aligner: Option<&dyn Aligner>,
    query: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let sam_out = sam_path_for(query, out_dir);
    if sam_out.is_file() {
        log::info!(
            "Found the samfile <{}>. Skipping the alignment phase.",
            sam_out.display()
        );
        return Ok(sam_out);
    }
    match aligner {
        Some(aligner) => {
            aligner.align(query, &sam_out)?;
            Ok(sam_out)
        }
        None => Err(LcaError::MissingAlignment(sam_out)),
    }
}
