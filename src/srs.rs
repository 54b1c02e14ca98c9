use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Interval multiplier applied on a successful recall.
const GROWTH_FACTOR: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Remembered,
    Forgotten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Language,
    Note,
}

impl Category {
    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "code" => Some(Category::Code),
            "language" => Some(Category::Language),
            "note" => Some(Category::Note),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Code => "code",
            Category::Language => "language",
            Category::Note => "note",
        }
    }
}

/// Scheduling decision for one review: the node's new interval and when
/// it next comes due.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledReview {
    pub interval_days: i32,
    pub next_due_at: NaiveDateTime,
}

/// New interval after one review. A forgotten card resets to one day no
/// matter how long its streak was; a remembered card grows by
/// `GROWTH_FACTOR`, except that the first successful review always lands
/// on one day (interval 0 means "never successfully reviewed").
pub fn next_interval_days(previous_interval_days: i32, outcome: Outcome) -> i32 {
    match outcome {
        Outcome::Forgotten => 1,
        Outcome::Remembered => {
            if previous_interval_days <= 0 {
                1
            } else {
                (previous_interval_days as f64 * GROWTH_FACTOR).ceil() as i32
            }
        }
    }
}

pub fn schedule_review_at(
    previous_interval_days: i32,
    outcome: Outcome,
    now: NaiveDateTime,
) -> ScheduledReview {
    let interval_days = next_interval_days(previous_interval_days, outcome);
    ScheduledReview {
        interval_days,
        next_due_at: now + Duration::days(interval_days as i64),
    }
}

/// One due card joined with its owning node, fixed for the lifetime of a
/// session.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub card_id: i32,
    pub node_id: i32,
    pub category: Category,
    pub front: String,
    pub back: String,
    pub interval_days: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Showing { index: usize, revealed: bool },
    Complete,
}

/// Transition requested in a state that does not permit it. Callers get
/// an error rather than a silent no-op; the one exception is revealing
/// an already-revealed card, which is an idempotent `Ok`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no card is currently being shown")]
    NoCardShown,
    #[error("card has not been revealed yet")]
    NotRevealed,
}

/// Result of grading one card: what the caller must persist for the
/// owning node. The state machine itself performs no I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedCard {
    pub node_id: i32,
    pub card_id: i32,
    pub outcome: Outcome,
    pub schedule: ScheduledReview,
}

/// One pass over a snapshot of due cards. The queue is fixed at build
/// time: entries are shown in arrival order, revealed, then graded, and
/// nothing is ever removed or re-fetched mid-session.
#[derive(Debug)]
pub struct ReviewSession {
    entries: Vec<QueueEntry>,
    state: SessionState,
}

impl ReviewSession {
    pub fn build(entries: Vec<QueueEntry>) -> Self {
        let state = if entries.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Showing {
                index: 0,
                revealed: false,
            }
        };
        Self { entries, state }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        match self.state {
            SessionState::Showing { index, .. } => self.entries.get(index),
            _ => None,
        }
    }

    pub fn reveal(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Showing { index, .. } => {
                self.state = SessionState::Showing {
                    index,
                    revealed: true,
                };
                Ok(())
            }
            _ => Err(TransitionError::NoCardShown),
        }
    }

    /// Grade the revealed card. Computes the node's new schedule, then
    /// advances the cursor (or completes the session). The cursor never
    /// moves on an error.
    pub fn grade(&mut self, outcome: Outcome) -> Result<GradedCard, TransitionError> {
        self.grade_at(outcome, Utc::now().naive_utc())
    }

    pub fn grade_at(
        &mut self,
        outcome: Outcome,
        now: NaiveDateTime,
    ) -> Result<GradedCard, TransitionError> {
        let index = match self.state {
            SessionState::Showing { index, revealed } => {
                if !revealed {
                    return Err(TransitionError::NotRevealed);
                }
                index
            }
            _ => return Err(TransitionError::NoCardShown),
        };

        let entry = &self.entries[index];
        let graded = GradedCard {
            node_id: entry.node_id,
            card_id: entry.card_id,
            outcome,
            schedule: schedule_review_at(entry.interval_days, outcome, now),
        };

        self.state = if index + 1 < self.entries.len() {
            SessionState::Showing {
                index: index + 1,
                revealed: false,
            }
        } else {
            SessionState::Complete
        };

        Ok(graded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(card_id: i32, node_id: i32, interval_days: i32) -> QueueEntry {
        QueueEntry {
            card_id,
            node_id,
            category: Category::Note,
            front: format!("front {card_id}"),
            back: format!("back {card_id}"),
            interval_days,
        }
    }

    fn now() -> NaiveDateTime {
        "2026-08-06T12:00:00"
            .parse::<NaiveDateTime>()
            .expect("valid timestamp")
    }

    #[test]
    fn forgotten_always_resets_to_one_day() {
        for previous in [0, 1, 4, 10, 365] {
            assert_eq!(next_interval_days(previous, Outcome::Forgotten), 1);
        }
    }

    #[test]
    fn first_successful_review_is_one_day() {
        assert_eq!(next_interval_days(0, Outcome::Remembered), 1);
    }

    #[test]
    fn remembered_grows_by_factor_with_ceiling() {
        assert_eq!(next_interval_days(1, Outcome::Remembered), 3);
        assert_eq!(next_interval_days(2, Outcome::Remembered), 5);
        assert_eq!(next_interval_days(4, Outcome::Remembered), 10);
    }

    #[test]
    fn due_date_is_now_plus_interval() {
        let at = now();
        let remembered = schedule_review_at(4, Outcome::Remembered, at);
        assert_eq!(remembered.interval_days, 10);
        assert_eq!(remembered.next_due_at, at + Duration::days(10));

        let forgotten = schedule_review_at(4, Outcome::Forgotten, at);
        assert_eq!(forgotten.interval_days, 1);
        assert_eq!(forgotten.next_due_at, at + Duration::days(1));
    }

    #[test]
    fn empty_queue_builds_empty_session() {
        let session = ReviewSession::build(vec![]);
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.current().is_none());
    }

    #[test]
    fn nonempty_queue_starts_on_first_card_unrevealed() {
        let session = ReviewSession::build(vec![entry(1, 1, 0), entry(2, 2, 4)]);
        assert_eq!(
            session.state(),
            SessionState::Showing {
                index: 0,
                revealed: false
            }
        );
        assert_eq!(session.current().map(|e| e.card_id), Some(1));
    }

    #[test]
    fn reveal_is_idempotent() {
        let mut session = ReviewSession::build(vec![entry(1, 1, 0)]);
        session.reveal().expect("first reveal");
        assert_eq!(
            session.state(),
            SessionState::Showing {
                index: 0,
                revealed: true
            }
        );
        session.reveal().expect("second reveal");
        assert_eq!(
            session.state(),
            SessionState::Showing {
                index: 0,
                revealed: true
            }
        );
    }

    #[test]
    fn reveal_with_no_card_is_rejected() {
        let mut empty = ReviewSession::build(vec![]);
        assert_eq!(empty.reveal(), Err(TransitionError::NoCardShown));

        let mut session = ReviewSession::build(vec![entry(1, 1, 0)]);
        session.reveal().unwrap();
        session.grade_at(Outcome::Remembered, now()).unwrap();
        assert_eq!(session.state(), SessionState::Complete);
        assert_eq!(session.reveal(), Err(TransitionError::NoCardShown));
    }

    #[test]
    fn grade_before_reveal_does_not_advance() {
        let mut session = ReviewSession::build(vec![entry(1, 1, 0), entry(2, 2, 4)]);
        assert_eq!(
            session.grade_at(Outcome::Remembered, now()),
            Err(TransitionError::NotRevealed)
        );
        assert_eq!(
            session.state(),
            SessionState::Showing {
                index: 0,
                revealed: false
            }
        );
    }

    #[test]
    fn grade_advances_and_resets_reveal_flag() {
        let mut session = ReviewSession::build(vec![entry(1, 1, 0), entry(2, 2, 4)]);
        session.reveal().unwrap();
        session.grade_at(Outcome::Remembered, now()).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Showing {
                index: 1,
                revealed: false
            }
        );
    }

    #[test]
    fn grading_last_card_completes_session() {
        let mut session = ReviewSession::build(vec![entry(1, 1, 0)]);
        session.reveal().unwrap();
        session.grade_at(Outcome::Forgotten, now()).unwrap();
        assert_eq!(session.state(), SessionState::Complete);
        assert_eq!(
            session.grade_at(Outcome::Remembered, now()),
            Err(TransitionError::NoCardShown)
        );
    }

    #[test]
    fn two_card_walkthrough() {
        let at = now();
        let mut session = ReviewSession::build(vec![entry(1, 10, 0), entry(2, 20, 4)]);

        session.reveal().unwrap();
        let first = session.grade_at(Outcome::Remembered, at).unwrap();
        assert_eq!(first.node_id, 10);
        assert_eq!(first.schedule.interval_days, 1);
        assert_eq!(first.schedule.next_due_at, at + Duration::days(1));
        assert_eq!(
            session.state(),
            SessionState::Showing {
                index: 1,
                revealed: false
            }
        );

        session.reveal().unwrap();
        let second = session.grade_at(Outcome::Forgotten, at).unwrap();
        assert_eq!(second.node_id, 20);
        assert_eq!(second.schedule.interval_days, 1);
        assert_eq!(second.schedule.next_due_at, at + Duration::days(1));
        assert_eq!(session.state(), SessionState::Complete);
    }

    #[test]
    fn category_round_trips_known_tags_only() {
        assert_eq!(Category::parse("code"), Some(Category::Code));
        assert_eq!(Category::parse("language"), Some(Category::Language));
        assert_eq!(Category::parse("note"), Some(Category::Note));
        assert_eq!(Category::parse("poetry"), None);
    }
}
