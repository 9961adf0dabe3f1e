//! Tap adapter
//!
//! The pipeline tap hands over every frame each time it passes between two
//! processors, in both directions. The adapter keeps only the first
//! downstream delivery of each frame and forwards its event to the session.

use crate::config::ObserverConfig;
use crate::report::SessionReport;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use turnlens_core::{Event, Result};

/// Direction a frame was travelling when the tap saw it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Downstream,
    Upstream,
}

/// One delivery of an event by the tap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapFrame {
    /// Pipeline frame id; repeated deliveries of a frame share it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default)]
    pub direction: Direction,

    #[serde(flatten)]
    pub event: Event,
}

impl TapFrame {
    pub fn new(id: u64, event: Event) -> Self {
        Self {
            id: Some(id),
            direction: Direction::Downstream,
            event,
        }
    }

    pub fn upstream(mut self) -> Self {
        self.direction = Direction::Upstream;
        self
    }
}

impl From<Event> for TapFrame {
    fn from(event: Event) -> Self {
        Self {
            id: None,
            direction: Direction::Downstream,
            event,
        }
    }
}

/// Direction filter plus a bounded memory of frame ids already seen
#[derive(Debug, Clone)]
struct FrameFilter {
    accept_upstream: bool,
    capacity: usize,
    seen: HashSet<u64>,
    order: VecDeque<u64>,
}

impl FrameFilter {
    fn new(config: &ObserverConfig) -> Self {
        Self {
            accept_upstream: config.accept_upstream,
            capacity: config.dedup_capacity,
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn admit(&mut self, frame: &TapFrame) -> bool {
        if frame.direction == Direction::Upstream && !self.accept_upstream {
            return false;
        }

        let Some(id) = frame.id else {
            return true;
        };
        if self.capacity == 0 {
            return true;
        }
        if !self.seen.insert(id) {
            tracing::trace!(frame_id = id, "Skipping repeated frame delivery");
            return false;
        }

        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// Tap-facing observer: filters frames and drives one session
pub struct Observer {
    filter: FrameFilter,
    session: Session,
}

impl Observer {
    pub fn new(config: ObserverConfig) -> Result<Self> {
        Session::new(config).map(Self::with_session)
    }

    /// Wrap an already configured session
    pub fn with_session(session: Session) -> Self {
        Self {
            filter: FrameFilter::new(session.config()),
            session,
        }
    }

    /// Offer a frame; returns whether its event reached the session
    pub fn on_frame(&mut self, frame: &TapFrame) -> bool {
        if !self.filter.admit(frame) {
            return false;
        }
        self.session.on_event(&frame.event);
        true
    }

    /// Feed an event directly, bypassing the frame filter
    pub fn on_event(&mut self, event: &Event) {
        self.session.on_event(event);
    }

    pub fn finalize(&mut self, ended_at: Option<f64>) -> &SessionReport {
        self.session.finalize(ended_at)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

/// Cloneable handle for hosts that deliver frames from several threads
#[derive(Clone)]
pub struct SharedObserver {
    inner: Arc<Mutex<Observer>>,
}

impl SharedObserver {
    pub fn new(observer: Observer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(observer)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Observer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on_frame(&self, frame: &TapFrame) -> bool {
        self.lock().on_frame(frame)
    }

    pub fn on_event(&self, event: &Event) {
        self.lock().on_event(event);
    }

    /// Run `f` with exclusive access to the observer
    pub fn with<R>(&self, f: impl FnOnce(&mut Observer) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the final report, once the session is terminal
    pub fn report(&self) -> Option<SessionReport> {
        self.lock().session().report().cloned()
    }

    pub fn finalize(&self, ended_at: Option<f64>) -> SessionReport {
        self.lock().finalize(ended_at).clone()
    }
}

impl From<Observer> for SharedObserver {
    fn from(observer: Observer) -> Self {
        Self::new(observer)
    }
}
