//! Process-backed oracles.
//!
//! The board solver and the path finder are standalone executables invoked
//! once per request. Output is line oriented:
//!
//! - solver: one `row,col` line per mine
//! - `select <min>`: the distance, then the start id, then the end id
//! - `distance <from> <to>`: the path length (or `-1`), then every id on the path

use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::core::{PageId, Square};
use crate::oracle::{BoardOracle, OracleError, PathOracle};

/// Runs the mine placement solver.
#[derive(Clone, Debug)]
pub struct ProcessBoardOracle {
    program: PathBuf,
}

impl ProcessBoardOracle {
    /// Solver at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl BoardOracle for ProcessBoardOracle {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn generate(
        &self,
        rows: usize,
        cols: usize,
        mines: usize,
        start: Square,
    ) -> Result<Vec<Square>, OracleError> {
        let output = Command::new(&self.program)
            .args([rows, cols, mines, start.0, start.1].map(|arg| arg.to_string()))
            .kill_on_drop(true)
            .output()
            .await?;
        let stdout = successful_stdout(output)?;
        let mines = parse_mines(&stdout)?;
        debug!(count = mines.len(), "board generated");
        Ok(mines)
    }
}

/// Runs the article path finder.
#[derive(Clone, Debug)]
pub struct ProcessPathOracle {
    program: PathBuf,
    dir: Option<PathBuf>,
}

impl ProcessPathOracle {
    /// Path finder at `program`, run from `dir` when given.
    pub fn new(program: impl Into<PathBuf>, dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir,
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output, OracleError> {
        let mut command = Command::new(&self.program);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        Ok(command.output().await?)
    }
}

#[async_trait]
impl PathOracle for ProcessPathOracle {
    #[instrument(skip(self))]
    async fn select(&self, min_distance: u32) -> Result<(PageId, PageId), OracleError> {
        let output = self
            .run(&["select".to_string(), min_distance.to_string()])
            .await?;
        parse_selection(&successful_stdout(output)?)
    }

    #[instrument(skip(self))]
    async fn shortest_path(
        &self,
        from: PageId,
        to: PageId,
    ) -> Result<Option<Vec<PageId>>, OracleError> {
        let output = self
            .run(&["distance".to_string(), from.to_string(), to.to_string()])
            .await?;
        if !output.status.success() {
            warn!(status = %output.status, "path finder gave up");
            return Ok(None);
        }
        parse_path(&String::from_utf8_lossy(&output.stdout))
    }
}

fn successful_stdout(output: Output) -> Result<String, OracleError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OracleError::Failed(format!(
            "{}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T, OracleError> {
    text.trim()
        .parse()
        .map_err(|_| OracleError::Parse(format!("expected a number, got {text:?}")))
}

/// Parse solver output into mine coordinates.
pub fn parse_mines(stdout: &str) -> Result<Vec<Square>, OracleError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (row, col) = line
                .split_once(',')
                .ok_or_else(|| OracleError::Parse(format!("expected row,col, got {line:?}")))?;
            Ok((parse_number(row)?, parse_number(col)?))
        })
        .collect()
}

/// Parse `select` output into `(start, end)`.
pub fn parse_selection(stdout: &str) -> Result<(PageId, PageId), OracleError> {
    let mut lines = stdout.lines().map(str::trim).filter(|line| !line.is_empty());
    let _distance = lines
        .next()
        .ok_or_else(|| OracleError::Parse("empty selection".into()))?;
    let start = lines
        .next()
        .ok_or_else(|| OracleError::Parse("missing start page".into()))?;
    let end = lines
        .next()
        .ok_or_else(|| OracleError::Parse("missing end page".into()))?;
    Ok((parse_number(start)?, parse_number(end)?))
}

/// Parse `distance` output. A negative length means unreachable.
pub fn parse_path(stdout: &str) -> Result<Option<Vec<PageId>>, OracleError> {
    let mut lines = stdout.lines().map(str::trim).filter(|line| !line.is_empty());
    let length: i64 = match lines.next() {
        Some(line) => parse_number(line)?,
        None => return Err(OracleError::Parse("empty path output".into())),
    };
    if length < 0 {
        return Ok(None);
    }
    let path = lines.map(parse_number).collect::<Result<Vec<PageId>, _>>()?;
    if path.is_empty() {
        return Err(OracleError::Parse("path has no pages".into()));
    }
    Ok(Some(path))
}
