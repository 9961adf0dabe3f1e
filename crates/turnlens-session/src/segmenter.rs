//! Turn segmentation
//!
//! Keeps the single "currently open turn" and the store of closed turns, and
//! moves turns between them on speech boundary events. Every transition is
//! constant time.

use turnlens_core::turn::TurnStatus;
use turnlens_core::{Error, Result, Turn};

/// Outcome of a boundary event
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A new turn was opened; `superseded` is the turn force-closed as partial
    Opened {
        turn_number: u32,
        superseded: Option<u32>,
    },
    /// The open turn completed normally
    Closed { turn_number: u32, total_latency: f64 },
    /// Bot speech with no open turn (e.g. an opening greeting)
    Ignored,
    /// Session end; `partial` is the turn that was still open, if any
    Flushed { partial: Option<u32> },
}

/// How a measurement target was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The currently open turn
    Open,
    /// The most recently completed turn, within the grace window
    Late,
}

#[derive(Debug, Clone, Default)]
pub struct TurnSegmenter {
    open: Option<Turn>,
    closed: Vec<Turn>,
    last_turn_number: u32,
}

impl TurnSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// User stopped speaking: supersede any open turn, open the next one
    pub fn user_stopped(&mut self, timestamp: f64) -> Transition {
        let superseded = self.open.take().map(|mut turn| {
            turn.close_partial();
            let number = turn.turn_number;
            self.closed.push(turn);
            number
        });

        if let Some(number) = superseded {
            tracing::warn!(
                turn = number,
                timestamp,
                "User stopped speaking again before the bot responded, closing turn as partial"
            );
        }

        self.last_turn_number += 1;
        self.open = Some(Turn::open(self.last_turn_number, timestamp));

        Transition::Opened {
            turn_number: self.last_turn_number,
            superseded,
        }
    }

    /// Bot started speaking: complete the open turn, if there is one
    pub fn bot_started(&mut self, timestamp: f64) -> Transition {
        match self.open.take() {
            Some(mut turn) => {
                turn.close(timestamp);
                let turn_number = turn.turn_number;
                let total_latency = turn.total_latency().unwrap_or_default();
                if total_latency < 0.0 {
                    tracing::warn!(
                        turn = turn_number,
                        total_latency,
                        "Turn closed before it started; events were delivered out of order"
                    );
                }
                self.closed.push(turn);
                Transition::Closed {
                    turn_number,
                    total_latency,
                }
            }
            None => Transition::Ignored,
        }
    }

    /// Session end: flush the open turn as partial
    pub fn finish(&mut self) -> Transition {
        let partial = self.open.take().map(|mut turn| {
            turn.close_partial();
            let number = turn.turn_number;
            self.closed.push(turn);
            number
        });
        Transition::Flushed { partial }
    }

    /// Pick the turn a measurement at `timestamp` belongs to
    ///
    /// The open turn always wins. Without one, the most recently completed
    /// turn qualifies if the measurement is no more than `grace_window_secs`
    /// past its end.
    pub fn attribution_target(
        &mut self,
        timestamp: f64,
        grace_window_secs: f64,
    ) -> Option<(&mut Turn, Attribution)> {
        if let Some(turn) = self.open.as_mut() {
            return Some((turn, Attribution::Open));
        }

        let last = self.closed.last_mut()?;
        let end = match (last.status, last.end_timestamp) {
            (TurnStatus::Complete, Some(end)) => end,
            _ => return None,
        };

        if timestamp - end <= grace_window_secs {
            Some((last, Attribution::Late))
        } else {
            None
        }
    }

    /// Check the single-open-turn invariants, repairing state if they fail
    pub fn verify(&mut self) -> Result<()> {
        let mut problems = Vec::new();

        if let Some(turn) = self.open.as_ref() {
            if !turn.is_open() {
                problems.push(format!(
                    "turn {} is held open with status {:?}",
                    turn.turn_number, turn.status
                ));
            }
            if turn.turn_number != self.last_turn_number {
                problems.push(format!(
                    "open turn {} is not the latest turn {}",
                    turn.turn_number, self.last_turn_number
                ));
            }
        }

        if let Some(turn) = self.closed.iter().find(|turn| turn.is_open()) {
            problems.push(format!("closed turn {} is still open", turn.turn_number));
        }

        if problems.is_empty() {
            return Ok(());
        }

        // Repair: anything marked open in the store becomes partial, and a
        // stale open pointer is flushed to the store.
        for turn in self.closed.iter_mut().filter(|turn| turn.is_open()) {
            turn.close_partial();
        }
        if let Some(mut turn) = self.open.take() {
            if turn.is_open() && turn.turn_number == self.last_turn_number {
                self.open = Some(turn);
            } else {
                if turn.is_open() {
                    turn.close_partial();
                }
                self.closed.push(turn);
            }
        }
        self.closed.sort_by_key(|turn| turn.turn_number);

        Err(Error::InvariantViolation(problems.join("; ")))
    }

    pub fn open_turn(&self) -> Option<&Turn> {
        self.open.as_ref()
    }

    pub fn open_turn_mut(&mut self) -> Option<&mut Turn> {
        self.open.as_mut()
    }

    /// Closed turns (complete and partial), in turn order
    pub fn turns(&self) -> &[Turn] {
        &self.closed
    }

    pub fn last_turn_number(&self) -> u32 {
        self.last_turn_number
    }
}
