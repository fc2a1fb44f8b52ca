//! External Collaborators
//!
//! Narrow async ports for everything the game engines call out to: the
//! board solver, the path finder, the encyclopedia content API and the
//! leaderboard store. Engines only see these traits, so tests swap in the
//! scripted doubles from [`testing`].

pub mod leaderboard;
pub mod process;
pub mod wikipedia;

#[cfg(test)]
pub mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{PageId, Section, Square, WikiPage};

pub use leaderboard::{BoardSize, MemoryLeaderboard, RecordId, TimePage, TimeRecord, PAGE_SIZE};
pub use process::{ProcessBoardOracle, ProcessPathOracle};
pub use wikipedia::MediaWikiClient;

// =============================================================================
// Errors
// =============================================================================

/// Failures of an external collaborator.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The collaborator ran but reported failure.
    #[error("oracle failed: {0}")]
    Failed(String),

    /// Spawning or talking to a process failed.
    #[error("process error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Output could not be understood.
    #[error("unparseable output: {0}")]
    Parse(String),

    /// The remote API returned an error with a user-presentable message.
    #[error("{0}")]
    Api(String),
}

// =============================================================================
// Ports
// =============================================================================

/// Mine placement solver.
#[async_trait]
pub trait BoardOracle: Send + Sync {
    /// Mine coordinates for a `rows x cols` board with `mines` mines that
    /// keeps `start` safe.
    async fn generate(
        &self,
        rows: usize,
        cols: usize,
        mines: usize,
        start: Square,
    ) -> Result<Vec<Square>, OracleError>;
}

/// Shortest-path oracle over the article link graph.
#[async_trait]
pub trait PathOracle: Send + Sync {
    /// Two page ids at least `min_distance` links apart.
    async fn select(&self, min_distance: u32) -> Result<(PageId, PageId), OracleError>;

    /// Page ids on a shortest path, endpoints included. `None` if unreachable.
    async fn shortest_path(&self, from: PageId, to: PageId)
        -> Result<Option<Vec<PageId>>, OracleError>;
}

/// A fetched article before its distance is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentPage {
    /// Page id.
    pub id: PageId,
    /// Canonical title.
    pub title: String,
    /// Rendered HTML.
    pub html: String,
    /// Table of contents.
    pub sections: Vec<Section>,
}

impl ContentPage {
    /// Attach the distance to the goal.
    pub fn into_wiki_page(self, distance: u32) -> WikiPage {
        WikiPage {
            name: self.title,
            distance,
            content: self.html,
            sections: self.sections,
        }
    }
}

/// Encyclopedia content API. `Ok(None)` means the page does not exist.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetch by page id.
    async fn page_by_id(&self, id: PageId) -> Result<Option<ContentPage>, OracleError>;

    /// Fetch by title, following redirects.
    async fn page_by_name(&self, name: &str) -> Result<Option<ContentPage>, OracleError>;
}

/// Completed-run store.
#[async_trait]
pub trait Leaderboard: Send + Sync {
    /// Store an unnamed record.
    async fn record_time(&self, seconds: f64, size: BoardSize) -> Result<RecordId, OracleError>;

    /// Zero-based rank among records of the same size.
    async fn rank_of(&self, seconds: f64, size: BoardSize) -> Result<usize, OracleError>;

    /// Name a record. Returns whether it existed.
    async fn set_name(&self, id: RecordId, name: &str) -> Result<bool, OracleError>;

    /// One page of records, fastest first, optionally restricted to a size.
    async fn query_page(&self, size: Option<BoardSize>, page: usize)
        -> Result<TimePage, OracleError>;
}

// =============================================================================
// Wiring
// =============================================================================

/// Every collaborator the engines need, shared by the queue worker and the
/// navigation fetch tasks.
#[derive(Clone)]
pub struct Services {
    /// Board solver.
    pub boards: Arc<dyn BoardOracle>,
    /// Path finder.
    pub paths: Arc<dyn PathOracle>,
    /// Article content.
    pub content: Arc<dyn ContentApi>,
    /// Completed-run store.
    pub leaderboard: Arc<dyn Leaderboard>,
}

impl Services {
    /// Production collaborators from configuration.
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            boards: Arc::new(ProcessBoardOracle::new(config.board_program.clone())),
            paths: Arc::new(ProcessPathOracle::new(
                config.path_program.clone(),
                config.path_dir.clone(),
            )),
            content: Arc::new(MediaWikiClient::new(&config.wiki_api_url)),
            leaderboard: Arc::new(MemoryLeaderboard::new()),
        }
    }
}

/// Where the external collaborators live.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// Board solver executable.
    pub board_program: PathBuf,
    /// Path finder executable.
    pub path_program: PathBuf,
    /// Working directory for the path finder (it loads its graph from there).
    pub path_dir: Option<PathBuf>,
    /// MediaWiki `api.php` endpoint.
    pub wiki_api_url: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            board_program: PathBuf::from("cpp/build/main"),
            path_program: PathBuf::from("build/wiki"),
            path_dir: Some(PathBuf::from("cpp")),
            wiki_api_url: wikipedia::DEFAULT_API_URL.to_string(),
        }
    }
}

impl OracleConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            board_program: std::env::var("BOARD_ORACLE")
                .map(PathBuf::from)
                .unwrap_or(defaults.board_program),
            path_program: std::env::var("WIKI_ORACLE")
                .map(PathBuf::from)
                .unwrap_or(defaults.path_program),
            path_dir: match std::env::var("WIKI_ORACLE_DIR") {
                Ok(dir) if dir.is_empty() => None,
                Ok(dir) => Some(PathBuf::from(dir)),
                Err(_) => defaults.path_dir,
            },
            wiki_api_url: std::env::var("WIKI_API_URL").unwrap_or(defaults.wiki_api_url),
        }
    }
}
