//! WikiRace Rules
//!
//! Navigation bookkeeping and end-of-game judgments shared by the server
//! engine and the client reducer. Distances always come from the path oracle;
//! nothing here computes them.

use serde::{Deserialize, Serialize};

use crate::core::player::Player;

/// Why a race ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// Time limit expired.
    Timeout,
    /// A player stopped the game.
    Player,
    /// A move interval elapsed without both players moving.
    NoMove,
    /// A player reached the goal page.
    Target,
    /// A player moved away from the goal in only-closer mode.
    Died,
}

/// Decisive result of a single navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The mover reached the goal and wins.
    Target,
    /// The mover went farther from the goal and loses.
    Died,
}

/// Result of a move-interval tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalVerdict {
    /// Both players moved; clear flags and keep going.
    Continue,
    /// At least one player stalled. `winner` is the one who moved, if any.
    NoMove {
        /// Player who moved during the interval.
        winner: Option<Player>,
    },
}

/// Judge a navigation that landed on `name` at `distance`.
///
/// `previous` is the mover's distance before the move. In only-closer mode a
/// move is fatal only when both distances are known and the new one is
/// strictly larger.
pub fn judge_navigation(
    only_closer: bool,
    goal: &str,
    name: &str,
    previous: Option<u32>,
    distance: Option<u32>,
) -> Option<Verdict> {
    if name == goal || distance == Some(0) {
        return Some(Verdict::Target);
    }
    match (previous, distance) {
        (Some(prev), Some(next)) if only_closer && next > prev => Some(Verdict::Died),
        _ => None,
    }
}

/// Judge a move-interval tick from each player's moved flag.
pub fn judge_interval(moved: [bool; 2]) -> IntervalVerdict {
    match moved {
        [true, true] => IntervalVerdict::Continue,
        [false, false] => IntervalVerdict::NoMove { winner: None },
        [true, false] => IntervalVerdict::NoMove { winner: Some(Player::One) },
        [false, true] => IntervalVerdict::NoMove { winner: Some(Player::Two) },
    }
}

/// Winner when the time limit expires: strictly closer to the goal wins,
/// unknown distance counts as farthest, equal distances draw.
pub fn timeout_winner(distances: [Option<u32>; 2]) -> Option<Player> {
    match distances {
        [Some(a), Some(b)] if a < b => Some(Player::One),
        [Some(a), Some(b)] if b < a => Some(Player::Two),
        [Some(_), None] => Some(Player::One),
        [None, Some(_)] => Some(Player::Two),
        _ => None,
    }
}

/// One player's navigation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Racer {
    /// Every page landed on, in order. Append-only.
    pub history: Vec<String>,
    /// Back-navigation stack; the top is the current page.
    pub stack: Vec<String>,
    /// Distance to the goal as reported by the path oracle.
    pub distance: Option<u32>,
    /// Reached a page not seen before during the current interval.
    pub moved: bool,
}

impl Racer {
    /// Racer standing on the start page.
    pub fn new(start: &str, distance: u32) -> Self {
        Self {
            history: vec![start.to_string()],
            stack: vec![start.to_string()],
            distance: Some(distance),
            moved: false,
        }
    }

    /// Page the racer is on.
    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    /// Record a landed navigation. Returns the distance before the move.
    ///
    /// Back pops the page being left; forward pushes the destination. Only a
    /// page absent from the history counts as a move.
    pub fn navigate(&mut self, name: &str, back: bool, distance: Option<u32>) -> Option<u32> {
        let previous = self.distance;
        if !self.history.iter().any(|page| page == name) {
            self.moved = true;
        }
        self.history.push(name.to_string());
        if back {
            self.stack.pop();
            if self.current() != Some(name) {
                self.stack.push(name.to_string());
            }
        } else {
            self.stack.push(name.to_string());
        }
        self.distance = distance;
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_by_name_or_distance() {
        assert_eq!(judge_navigation(false, "Goal", "Goal", Some(1), Some(0)), Some(Verdict::Target));
        assert_eq!(judge_navigation(false, "Goal", "goal", Some(1), Some(0)), Some(Verdict::Target));
        assert_eq!(judge_navigation(true, "Goal", "Other", Some(3), Some(2)), None);
    }

    #[test]
    fn test_only_closer_death() {
        assert_eq!(judge_navigation(true, "Goal", "Far", Some(3), Some(4)), Some(Verdict::Died));
        assert_eq!(judge_navigation(false, "Goal", "Far", Some(3), Some(4)), None);
        assert_eq!(judge_navigation(true, "Goal", "Same", Some(3), Some(3)), None);
        assert_eq!(judge_navigation(true, "Goal", "Lost", Some(3), None), None);
        assert_eq!(judge_navigation(true, "Goal", "Back", None, Some(9)), None);
    }

    #[test]
    fn test_interval() {
        assert_eq!(judge_interval([true, true]), IntervalVerdict::Continue);
        assert_eq!(judge_interval([false, false]), IntervalVerdict::NoMove { winner: None });
        assert_eq!(
            judge_interval([false, true]),
            IntervalVerdict::NoMove { winner: Some(Player::Two) }
        );
    }

    #[test]
    fn test_timeout_winner() {
        assert_eq!(timeout_winner([Some(2), Some(3)]), Some(Player::One));
        assert_eq!(timeout_winner([Some(4), Some(3)]), Some(Player::Two));
        assert_eq!(timeout_winner([Some(3), Some(3)]), None);
        assert_eq!(timeout_winner([None, Some(7)]), Some(Player::Two));
        assert_eq!(timeout_winner([None, None]), None);
    }

    #[test]
    fn test_racer_stack() {
        let mut racer = Racer::new("Start", 3);
        assert_eq!(racer.navigate("A", false, Some(2)), Some(3));
        assert_eq!(racer.navigate("B", false, Some(2)), Some(2));
        assert_eq!(racer.current(), Some("B"));
        racer.navigate("A", true, Some(2));
        assert_eq!(racer.current(), Some("A"));
        assert_eq!(racer.stack, vec!["Start", "A"]);
        assert_eq!(racer.history, vec!["Start", "A", "B", "A"]);
    }

    #[test]
    fn test_revisit_is_not_a_move() {
        let mut racer = Racer::new("Start", 3);
        racer.navigate("A", false, Some(2));
        assert!(racer.moved);
        racer.moved = false;
        racer.navigate("Start", true, Some(3));
        assert!(!racer.moved);
    }
}
