//! WikiRace Engine
//!
//! Both players start on the same article and race along links to a goal
//! article. Page fetches are slow, so a navigation is split in two: the
//! request is recorded as pending with a fresh nonce, the fetch runs outside
//! the queue, and the result is applied later only if that nonce is still the
//! player's pending one.

use futures_util::future::try_join_all;
use tracing::{debug, info, instrument};

use crate::core::race::{judge_interval, judge_navigation, timeout_winner, IntervalVerdict, Verdict};
use crate::core::{EndReason, Millis, PageId, Player, Racer, WikiPage};
use crate::error::AppError;
use crate::game::{GameId, TimerGuard};
use crate::network::protocol::{ServerMessage, WikiConfig, WikiEvent};
use crate::network::registry::ConnectionRegistry;
use crate::oracle::{OracleError, Services};

const INVALID_STATE: &str = "Invalid state";

/// Longest accepted time limit or move interval, in seconds.
pub const MAX_TIMER_SECS: u64 = 24 * 60 * 60;

/// Where the race stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WikiPhase {
    /// Endpoints chosen, waiting for start.
    Ready,
    /// Racing.
    Ongoing,
    /// Decided; players may keep browsing.
    Ended(EndReason),
}

#[derive(Clone, Debug)]
struct PendingNavigation {
    nonce: u64,
    name: String,
    back: bool,
    hash: Option<String>,
}

fn wiki(msg: WikiEvent) -> ServerMessage {
    ServerMessage::Wiki { msg }
}

/// One WikiRace game.
pub struct WikiGame {
    id: GameId,
    created_at: Millis,
    config: WikiConfig,
    start: WikiPage,
    end: WikiPage,
    end_id: PageId,
    path: Vec<WikiPage>,
    phase: WikiPhase,
    racers: [Racer; 2],
    pending: [Option<PendingNavigation>; 2],
    next_nonce: u64,
    timers: Vec<TimerGuard>,
}

impl WikiGame {
    /// Pick endpoints and fetch every page on one shortest path between them.
    #[instrument(skip(services))]
    pub async fn prepare(
        config: WikiConfig,
        services: &Services,
        now: Millis,
    ) -> Result<Self, AppError> {
        let timers = [config.time_limit, config.time_interval];
        if timers.contains(&Some(0)) {
            return Err(AppError::domain("Time limits must be at least one second"));
        }
        if timers.iter().flatten().any(|&secs| secs > MAX_TIMER_SECS) {
            return Err(AppError::domain("Time limits must be at most one day"));
        }

        let (start_id, end_id) = services
            .paths
            .select(config.min_distance.unwrap_or(0))
            .await
            .map_err(|e| AppError::oracle("Failed to find starting/ending articles", e))?;

        let start = services.content.page_by_id(start_id).await?;
        let end = services.content.page_by_id(end_id).await?;
        let (Some(start), Some(end)) = (start, end) else {
            return Err(AppError::domain("Start/end articles no longer exist"));
        };

        let path = services
            .paths
            .shortest_path(start.id, end.id)
            .await
            .map_err(|e| AppError::oracle("Couldn't process path", e))?
            .filter(|path| !path.is_empty())
            .ok_or_else(|| AppError::domain("Couldn't process path"))?;

        let hops = path.len() - 1;
        let inner: &[PageId] = if path.len() > 2 { &path[1..hops] } else { &[] };
        let pages = try_join_all(inner.iter().enumerate().map(|(i, &id)| async move {
            let page = services
                .content
                .page_by_id(id)
                .await?
                .ok_or_else(|| AppError::domain("Articles on path no longer exist"))?;
            Ok::<_, AppError>(page.into_wiki_page((hops - 1 - i) as u32))
        }))
        .await?;

        let end_id = end.id;
        let start = start.into_wiki_page(hops as u32);
        let end = end.into_wiki_page(0);
        info!(start = %start.name, end = %end.name, hops, "wiki endpoints selected");

        let racers = [Racer::new(&start.name, start.distance), Racer::new(&start.name, start.distance)];
        Ok(Self {
            id: GameId::new(),
            created_at: now,
            config,
            start,
            end,
            end_id,
            path: pages,
            phase: WikiPhase::Ready,
            racers,
            pending: [None, None],
            next_nonce: 0,
            timers: Vec::new(),
        })
    }

    /// Game id.
    pub fn id(&self) -> GameId {
        self.id
    }

    /// When the endpoints were selected.
    pub fn created_at(&self) -> Millis {
        self.created_at
    }

    /// Game options.
    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    /// Current phase.
    pub fn phase(&self) -> WikiPhase {
        self.phase
    }

    /// Id of the goal page.
    pub fn goal_id(&self) -> PageId {
        self.end_id
    }

    /// Navigation state of `player`.
    pub fn racer(&self, player: Player) -> &Racer {
        &self.racers[player.index()]
    }

    /// Whether `player` has a navigation in flight.
    pub fn is_loading(&self, player: Player) -> bool {
        self.pending[player.index()].is_some()
    }

    /// `setStartEnd` announcement.
    pub fn setup_event(&self) -> WikiEvent {
        WikiEvent::SetStartEnd {
            start: self.start.clone(),
            end: self.end.clone(),
            path: self.path.clone(),
            game: self.config.clone(),
        }
    }

    /// Start the race. Returns the start time to broadcast.
    pub fn start(&mut self, now: Millis) -> Result<Millis, AppError> {
        if self.phase != WikiPhase::Ready {
            return Err(AppError::domain(INVALID_STATE));
        }
        self.phase = WikiPhase::Ongoing;
        info!(game = %self.id, "wiki race started");
        Ok(now)
    }

    /// Keep timers alive for as long as the race runs.
    pub fn attach_timers(&mut self, timers: Vec<TimerGuard>) {
        self.timers = timers;
    }

    /// Record a navigation request. Returns the nonce its result must carry.
    pub fn begin_navigation(
        &mut self,
        player: Player,
        name: String,
        back: bool,
        hash: Option<String>,
    ) -> Result<u64, AppError> {
        if self.phase == WikiPhase::Ready {
            return Err(AppError::domain(INVALID_STATE));
        }
        self.next_nonce += 1;
        let nonce = self.next_nonce;
        debug!(%player, %name, nonce, "navigation requested");
        self.pending[player.index()] = Some(PendingNavigation { nonce, name, back, hash });
        Ok(nonce)
    }

    /// Drop the pending navigation. Returns whether there was one.
    pub fn stop_loading(&mut self, player: Player) -> bool {
        self.pending[player.index()].take().is_some()
    }

    /// Drop the pending navigation if it is still `nonce`.
    pub fn fail_navigation(&mut self, player: Player, nonce: u64) -> bool {
        let slot = &mut self.pending[player.index()];
        if slot.as_ref().map(|p| p.nonce) == Some(nonce) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Apply a fetched page if `nonce` is still pending for `player`.
    ///
    /// Returns `false` for a stale result, which is dropped untouched.
    pub fn complete_navigation(
        &mut self,
        player: Player,
        nonce: u64,
        page: Option<WikiPage>,
        registry: &ConnectionRegistry,
        now: Millis,
    ) -> bool {
        let slot = &mut self.pending[player.index()];
        let pending = match slot.take() {
            Some(pending) if pending.nonce == nonce => pending,
            other => {
                *slot = other;
                debug!(%player, nonce, "stale page discarded");
                return false;
            }
        };

        let distance = page.as_ref().map(|page| page.distance);
        registry.send_to(
            player,
            wiki(WikiEvent::PageContent { page, hash: pending.hash }),
        );
        registry.broadcast(wiki(WikiEvent::PlayerChange {
            player,
            name: pending.name.clone(),
            back: pending.back,
            distance,
            time: now,
        }));

        if self.phase != WikiPhase::Ongoing {
            return true;
        }

        let previous = self.racers[player.index()].navigate(&pending.name, pending.back, distance);
        match judge_navigation(self.config.only_closer, &self.end.name, &pending.name, previous, distance) {
            Some(Verdict::Target) => self.end(EndReason::Target, Some(player), Some(player), registry, now),
            Some(Verdict::Died) => {
                self.end(EndReason::Died, Some(player), Some(player.other()), registry, now)
            }
            None => {}
        }
        true
    }

    /// Give up the race.
    pub fn stop(&mut self, player: Player, registry: &ConnectionRegistry, now: Millis) -> Result<(), AppError> {
        if self.phase != WikiPhase::Ongoing {
            return Err(AppError::domain(INVALID_STATE));
        }
        self.end(EndReason::Player, Some(player), None, registry, now);
        Ok(())
    }

    /// Time limit reached: the player closer to the goal wins.
    pub fn time_limit_expired(&mut self, registry: &ConnectionRegistry, now: Millis) {
        if self.phase != WikiPhase::Ongoing {
            return;
        }
        let winner = timeout_winner([self.racers[0].distance, self.racers[1].distance]);
        self.end(EndReason::Timeout, None, winner, registry, now);
    }

    /// Move interval elapsed: both players must have reached a new page.
    pub fn interval_elapsed(&mut self, registry: &ConnectionRegistry, now: Millis) {
        if self.phase != WikiPhase::Ongoing {
            return;
        }
        match judge_interval([self.racers[0].moved, self.racers[1].moved]) {
            IntervalVerdict::Continue => {
                for racer in &mut self.racers {
                    racer.moved = false;
                }
                registry.broadcast(wiki(WikiEvent::TimeInterval { time: now }));
            }
            IntervalVerdict::NoMove { winner } => {
                self.end(EndReason::NoMove, None, winner, registry, now);
            }
        }
    }

    fn end(
        &mut self,
        why: EndReason,
        player: Option<Player>,
        winner: Option<Player>,
        registry: &ConnectionRegistry,
        now: Millis,
    ) {
        self.phase = WikiPhase::Ended(why);
        self.timers.clear();
        info!(game = %self.id, ?why, ?winner, "wiki race ended");
        registry.broadcast(wiki(WikiEvent::Stopped { why, player, winner, time: now }));
    }
}

/// Fetch `name` and its distance to `goal`. `None` if the page does not
/// exist or cannot reach the goal.
pub async fn fetch_page(
    services: &Services,
    name: &str,
    goal: PageId,
) -> Result<Option<WikiPage>, OracleError> {
    let Some(page) = services.content.page_by_name(name).await? else {
        return Ok(None);
    };
    let Some(path) = services.paths.shortest_path(page.id, goal).await? else {
        return Ok(None);
    };
    let distance = path.len().saturating_sub(1) as u32;
    Ok(Some(page.into_wiki_page(distance)))
}
