//! Scripted collaborators for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{PageId, Section, Square};
use crate::oracle::{
    BoardOracle, ContentApi, ContentPage, MemoryLeaderboard, OracleError, PathOracle, Services,
};

/// Board oracle that always returns the same layout, or always fails.
pub struct ScriptedBoards {
    mines: Option<Vec<Square>>,
    calls: AtomicUsize,
}

impl ScriptedBoards {
    /// Always returns `mines`.
    pub fn new(mines: Vec<Square>) -> Self {
        Self { mines: Some(mines), calls: AtomicUsize::new(0) }
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self { mines: None, calls: AtomicUsize::new(0) }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BoardOracle for ScriptedBoards {
    async fn generate(
        &self,
        _rows: usize,
        _cols: usize,
        _mines: usize,
        _start: Square,
    ) -> Result<Vec<Square>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent submissions a chance to pile up behind us.
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.mines
            .clone()
            .ok_or_else(|| OracleError::Failed("exit status: 1".into()))
    }
}

/// A tiny article graph serving as both path oracle and content API.
#[derive(Default)]
pub struct FakeWiki {
    titles: BTreeMap<PageId, String>,
    paths: BTreeMap<(PageId, PageId), Vec<PageId>>,
    selection: Option<(PageId, PageId)>,
    delays: BTreeMap<String, Duration>,
    missing_ids: Vec<PageId>,
}

impl FakeWiki {
    /// Add a page.
    pub fn page(mut self, id: PageId, title: &str) -> Self {
        self.titles.insert(id, title.to_string());
        self
    }

    /// Add a shortest path, endpoints included.
    pub fn path(mut self, path: &[PageId]) -> Self {
        if let (Some(&from), Some(&to)) = (path.first(), path.last()) {
            self.paths.insert((from, to), path.to_vec());
        }
        self
    }

    /// What `select` answers.
    pub fn select(mut self, start: PageId, end: PageId) -> Self {
        self.selection = Some((start, end));
        self
    }

    /// Delay fetches of `title` by `delay`.
    pub fn slow(mut self, title: &str, delay: Duration) -> Self {
        self.delays.insert(title.to_string(), delay);
        self
    }

    /// Report `id` as not found when fetched by id.
    pub fn missing(mut self, id: PageId) -> Self {
        self.missing_ids.push(id);
        self
    }

    fn content(&self, id: PageId, title: &str) -> ContentPage {
        ContentPage {
            id,
            title: title.to_string(),
            html: format!("<p>{title}</p>"),
            sections: vec![Section { toclevel: 1, line: "See also".into(), anchor: "See_also".into() }],
        }
    }

    /// Start(1) -> Alpha(2) -> Beta(3) -> Goal(4), plus Far(5) one step
    /// farther out than Start.
    pub fn sample() -> Self {
        FakeWiki::default()
            .page(1, "Start")
            .page(2, "Alpha")
            .page(3, "Beta")
            .page(4, "Goal")
            .page(5, "Far")
            .path(&[1, 2, 3, 4])
            .path(&[2, 3, 4])
            .path(&[3, 4])
            .path(&[4])
            .path(&[5, 1, 2, 3, 4])
            .select(1, 4)
    }
}

#[async_trait]
impl PathOracle for FakeWiki {
    async fn select(&self, _min_distance: u32) -> Result<(PageId, PageId), OracleError> {
        self.selection
            .ok_or_else(|| OracleError::Failed("no pair far enough apart".into()))
    }

    async fn shortest_path(
        &self,
        from: PageId,
        to: PageId,
    ) -> Result<Option<Vec<PageId>>, OracleError> {
        Ok(self.paths.get(&(from, to)).cloned())
    }
}

#[async_trait]
impl ContentApi for FakeWiki {
    async fn page_by_id(&self, id: PageId) -> Result<Option<ContentPage>, OracleError> {
        if self.missing_ids.contains(&id) {
            return Ok(None);
        }
        Ok(self.titles.get(&id).map(|title| self.content(id, title)))
    }

    async fn page_by_name(&self, name: &str) -> Result<Option<ContentPage>, OracleError> {
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
        if name == "Broken" {
            return Err(OracleError::Api("upstream timeout".into()));
        }
        Ok(self
            .titles
            .iter()
            .find(|(_, title)| title.as_str() == name)
            .map(|(id, title)| self.content(*id, title)))
    }
}

/// Services wired from the given doubles.
pub fn services(boards: Arc<ScriptedBoards>, wiki: Arc<FakeWiki>) -> Services {
    Services {
        boards,
        paths: wiki.clone(),
        content: wiki,
        leaderboard: Arc::new(MemoryLeaderboard::new()),
    }
}
