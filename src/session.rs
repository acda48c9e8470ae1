use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};

use crate::{error::AnalyzerError, types::SessionSummary};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
    Stopped,
}

struct Inner {
    phase: Phase,
    started_at: Option<Instant>,
    correct_frames: u32,
    total_frames: u32,
    last_summary: Option<SessionSummary>,
}

struct Ticker {
    // Dropping the sender wakes the tick thread immediately.
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Session clock and frame counters for one practice interval.
///
/// State machine Idle → Active → Stopped. While active, a 1 Hz ticker thread
/// republishes the elapsed whole seconds; `stop` freezes the session into a
/// `SessionSummary` and is idempotent. Only one session can be active per
/// aggregator.
pub struct SessionAggregator {
    inner: Mutex<Inner>,
    elapsed_seconds: Arc<AtomicU64>,
    ticker: Mutex<Option<Ticker>>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                started_at: None,
                correct_frames: 0,
                total_frames: 0,
                last_summary: None,
            }),
            elapsed_seconds: Arc::new(AtomicU64::new(0)),
            ticker: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<(), AnalyzerError> {
        let started = Instant::now();
        {
            let mut inner = lock(&self.inner);
            if inner.phase == Phase::Active {
                return Err(AnalyzerError::Session("a session is already active"));
            }

            inner.phase = Phase::Active;
            inner.started_at = Some(started);
            inner.correct_frames = 0;
            inner.total_frames = 0;
            inner.last_summary = None;
        }
        self.elapsed_seconds.store(0, Ordering::Relaxed);

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let elapsed = self.elapsed_seconds.clone();
        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(TICK_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => {
                        elapsed.store(started.elapsed().as_secs(), Ordering::Relaxed);
                    }
                    _ => break,
                }
            }
        });

        self.stop_ticker();
        *lock(&self.ticker) = Some(Ticker {
            stop_tx,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Count one analyzed frame. Returns false (and records nothing) when no
    /// session is active.
    pub fn record_frame(&self, is_correct: bool) -> bool {
        let mut inner = lock(&self.inner);
        if inner.phase != Phase::Active {
            return false;
        }

        inner.total_frames += 1;
        if is_correct {
            inner.correct_frames += 1;
        }
        true
    }

    /// Freeze the session and return its summary. A second call returns the
    /// same frozen summary; stopping while idle returns `None`.
    pub fn stop(&self) -> Option<SessionSummary> {
        let summary = {
            let mut inner = lock(&self.inner);
            match inner.phase {
                Phase::Idle => return None,
                Phase::Stopped => return inner.last_summary,
                Phase::Active => {
                    let elapsed = inner
                        .started_at
                        .map(|started| started.elapsed().as_secs())
                        .unwrap_or(0);
                    let summary = SessionSummary {
                        elapsed_seconds: elapsed,
                        correct_frames: inner.correct_frames,
                        total_frames: inner.total_frames,
                    };
                    inner.phase = Phase::Stopped;
                    inner.last_summary = Some(summary);
                    self.elapsed_seconds.store(elapsed, Ordering::Relaxed);
                    summary
                }
            }
        };

        self.stop_ticker();
        Some(summary)
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner).phase == Phase::Active
    }

    /// Elapsed whole seconds, as maintained by the 1 Hz ticker. Monotonically
    /// non-decreasing while the session is active.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds.load(Ordering::Relaxed)
    }

    /// Current (correct, total) frame counts.
    pub fn progress(&self) -> (u32, u32) {
        let inner = lock(&self.inner);
        (inner.correct_frames, inner.total_frames)
    }

    fn stop_ticker(&self) {
        let ticker = lock(&self.ticker).take();
        if let Some(mut ticker) = ticker {
            drop(ticker.stop_tx);
            if let Some(handle) = ticker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionAggregator {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
