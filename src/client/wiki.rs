//! WikiRace Client Reducer

use crate::core::race::{judge_navigation, Verdict};
use crate::core::{EndReason, Millis, Player, Racer, WikiPage};
use crate::network::protocol::{WikiConfig, WikiEvent};

/// Endpoints and options of a prepared race.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceSetup {
    /// Start page.
    pub start: WikiPage,
    /// Goal page.
    pub end: WikiPage,
    /// One shortest path between them, endpoints excluded.
    pub path: Vec<WikiPage>,
    /// Game options.
    pub config: WikiConfig,
}

/// The page this kiosk is looking at.
#[derive(Clone, Debug, PartialEq)]
pub enum CurrentPage {
    /// A loaded page.
    Page {
        /// Page content.
        page: WikiPage,
        /// Fragment to scroll to.
        hash: Option<String>,
    },
    /// The requested page does not exist or cannot reach the goal.
    Missing,
    /// A navigation is in flight; `previous` stays visible meanwhile.
    Loading {
        /// What was shown before.
        previous: Box<CurrentPage>,
    },
}

/// Race progress from this kiosk's point of view.
#[derive(Clone, Debug, PartialEq)]
pub enum RaceStatus {
    /// Racing.
    Ongoing,
    /// Decided.
    Ended {
        /// `Some(true)` if this kiosk won, `None` for a draw or no winner.
        won: Option<bool>,
        /// Why it ended.
        why: EndReason,
        /// When it ended.
        end_time: Millis,
        /// For a stop, whether this kiosk pressed it.
        stopped_by_me: Option<bool>,
    },
}

/// A started race.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveRace {
    /// Endpoints and options.
    pub setup: RaceSetup,
    /// Both players' navigation, by seat index.
    pub racers: [Racer; 2],
    /// This kiosk's page.
    pub current: CurrentPage,
    /// Race start.
    pub start_time: Millis,
    /// Start of the current move interval.
    pub interval_start: Millis,
    /// Progress.
    pub status: RaceStatus,
}

/// Client-side WikiRace state.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum WikiView {
    /// No game.
    #[default]
    Idle,
    /// Server is choosing endpoints.
    Loading,
    /// Endpoints known, not started.
    Ready(RaceSetup),
    /// Started or finished race.
    Active(ActiveRace),
}

fn end(race: &mut ActiveRace, won: Option<bool>, why: EndReason, end_time: Millis, stopped_by_me: Option<bool>) {
    race.status = RaceStatus::Ended {
        won,
        why,
        end_time,
        stopped_by_me,
    };
}

/// Fold one event into the view. `me` is this kiosk's seat.
pub fn reduce(state: WikiView, event: &WikiEvent, me: Player) -> WikiView {
    match (state, event) {
        (_, WikiEvent::SetStartEnd { start, end, path, game }) => WikiView::Ready(RaceSetup {
            start: start.clone(),
            end: end.clone(),
            path: path.clone(),
            config: game.clone(),
        }),

        (_, WikiEvent::LoadingStartEnd) => WikiView::Loading,

        (WikiView::Ready(setup), WikiEvent::GameStart { start_time }) => {
            let racer = Racer::new(&setup.start.name, setup.start.distance);
            WikiView::Active(ActiveRace {
                racers: [racer.clone(), racer],
                current: CurrentPage::Page {
                    page: setup.start.clone(),
                    hash: None,
                },
                setup,
                start_time: *start_time,
                interval_start: *start_time,
                status: RaceStatus::Ongoing,
            })
        }

        (WikiView::Active(mut race), WikiEvent::LoadingPage) => {
            if !matches!(race.current, CurrentPage::Loading { .. }) {
                let previous = std::mem::replace(&mut race.current, CurrentPage::Missing);
                race.current = CurrentPage::Loading {
                    previous: Box::new(previous),
                };
            }
            WikiView::Active(race)
        }

        (WikiView::Active(mut race), WikiEvent::PageContent { page, hash }) => {
            race.current = match page {
                Some(page) => CurrentPage::Page {
                    page: page.clone(),
                    hash: hash.clone(),
                },
                None => CurrentPage::Missing,
            };
            WikiView::Active(race)
        }

        (WikiView::Active(mut race), WikiEvent::LoadingStopped) => {
            if let CurrentPage::Loading { previous } = race.current {
                race.current = *previous;
            }
            WikiView::Active(race)
        }

        (
            WikiView::Active(mut race),
            WikiEvent::PlayerChange {
                player,
                name,
                back,
                distance,
                time,
            },
        ) if race.status == RaceStatus::Ongoing => {
            let previous = race.racers[player.index()].navigate(name, *back, *distance);
            let verdict = judge_navigation(
                race.setup.config.only_closer,
                &race.setup.end.name,
                name,
                previous,
                *distance,
            );
            match verdict {
                Some(Verdict::Target) => end(&mut race, Some(*player == me), EndReason::Target, *time, None),
                Some(Verdict::Died) => end(&mut race, Some(*player != me), EndReason::Died, *time, None),
                None => {}
            }
            WikiView::Active(race)
        }

        (
            WikiView::Active(mut race),
            WikiEvent::Stopped {
                why,
                player,
                winner,
                time,
            },
        ) if race.status == RaceStatus::Ongoing => {
            let stopped_by_me = (*why == EndReason::Player).then(|| *player == Some(me));
            end(&mut race, winner.map(|w| w == me), *why, *time, stopped_by_me);
            WikiView::Active(race)
        }

        (WikiView::Active(mut race), WikiEvent::TimeInterval { time })
            if race.status == RaceStatus::Ongoing =>
        {
            for racer in &mut race.racers {
                racer.moved = false;
            }
            race.interval_start = *time;
            WikiView::Active(race)
        }

        (state, _) => state,
    }
}
