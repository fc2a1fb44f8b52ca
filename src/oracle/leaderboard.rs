//! Completed-run leaderboard.
//!
//! Records are grouped by board size `(rows, cols, mines)` and ranked by
//! seconds, fastest first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::oracle::{Leaderboard, OracleError};

/// Records per page.
pub const PAGE_SIZE: usize = 25;

/// Record identifier.
pub type RecordId = u64;

/// `(rows, cols, mines)`. Serialized as a three-element array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardSize(pub usize, pub usize, pub usize);

/// A completed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRecord {
    /// Display name, once set.
    pub name: Option<String>,
    /// Elapsed seconds.
    pub seconds: f64,
    /// Board the run was played on.
    pub size: BoardSize,
}

/// One page of records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimePage {
    /// Records on this page, fastest first.
    pub times: Vec<TimeRecord>,
    /// Total number of pages.
    pub npage: usize,
    /// Rank of the first record on this page.
    pub offset: usize,
}

/// In-process leaderboard.
#[derive(Debug, Default)]
pub struct MemoryLeaderboard {
    records: RwLock<Vec<(RecordId, TimeRecord)>>,
}

impl MemoryLeaderboard {
    /// Empty leaderboard.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Leaderboard for MemoryLeaderboard {
    async fn record_time(&self, seconds: f64, size: BoardSize) -> Result<RecordId, OracleError> {
        let mut records = self.records.write().await;
        let id = records.len() as RecordId + 1;
        records.push((id, TimeRecord { name: None, seconds, size }));
        Ok(id)
    }

    async fn rank_of(&self, seconds: f64, size: BoardSize) -> Result<usize, OracleError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(_, record)| record.size == size && record.seconds < seconds)
            .count())
    }

    async fn set_name(&self, id: RecordId, name: &str) -> Result<bool, OracleError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|(record_id, _)| *record_id == id) {
            Some((_, record)) => {
                record.name = Some(name.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_page(
        &self,
        size: Option<BoardSize>,
        page: usize,
    ) -> Result<TimePage, OracleError> {
        let records = self.records.read().await;
        let mut matching: Vec<&TimeRecord> = records
            .iter()
            .map(|(_, record)| record)
            .filter(|record| size.map_or(true, |size| record.size == size))
            .collect();
        matching.sort_by(|a, b| a.seconds.total_cmp(&b.seconds));

        let offset = page.saturating_mul(PAGE_SIZE);
        Ok(TimePage {
            times: matching.iter().skip(offset).take(PAGE_SIZE).map(|r| (*r).clone()).collect(),
            npage: matching.len().div_ceil(PAGE_SIZE),
            offset,
        })
    }
}
