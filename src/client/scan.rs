use std::collections::HashSet;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::task::AbortHandle;

use crate::Result;
use crate::api::{PeripheralId, ScanFilter};
use crate::client::Client;
use crate::client::event::Origin;
use crate::client::request::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Starting,
    Scanning,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Started,
    Stopped,
}

/// Native transitions this client requested and has not yet seen reported.
/// Native events can lag behind requests, so a stop may still be pending
/// when the next start goes out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Pending {
    starts: u32,
    stops: u32,
}

fn origin(pending: Pending, transition: Transition) -> Origin {
    match (transition, pending) {
        (Transition::Started, Pending { starts: 1.., .. }) => Origin::Local,
        (Transition::Stopped, Pending { stops: 1.., .. }) => Origin::Local,
        _ => Origin::External,
    }
}

struct StopTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Scan bookkeeping. Holds no locks across awaits and never talks to the
/// adapter; [`Client`] drives it around its requests.
pub(crate) struct ScanController {
    state: ScanState,
    pending: Pending,
    continuous: bool,
    allow_duplicates: bool,
    seen: HashSet<PeripheralId>,
    stop_timer: Option<StopTimer>,
    timer_generation: u64,
}

impl ScanController {
    pub(crate) fn new() -> Self {
        ScanController {
            state: ScanState::Idle,
            pending: Pending::default(),
            continuous: false,
            allow_duplicates: false,
            seen: HashSet::new(),
            stop_timer: None,
            timer_generation: 0,
        }
    }

    pub(crate) fn state(&self) -> ScanState {
        self.state
    }

    pub(crate) fn allow_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    /// A continuous session was interrupted and nothing has replaced it yet.
    pub(crate) fn wants_restart(&self) -> bool {
        self.continuous && self.state == ScanState::Idle
    }

    /// Returns false when a session is already running or starting.
    pub(crate) fn begin_start(&mut self, continuous: bool, allow_duplicates: bool) -> bool {
        if matches!(self.state, ScanState::Starting | ScanState::Scanning) {
            return false;
        }
        self.state = ScanState::Starting;
        self.pending.starts += 1;
        self.continuous = continuous;
        self.allow_duplicates = allow_duplicates;
        self.seen.clear();
        true
    }

    pub(crate) fn start_resolved(&mut self) {
        if self.state == ScanState::Starting {
            self.state = ScanState::Scanning;
        }
    }

    pub(crate) fn start_failed(&mut self) {
        if self.state == ScanState::Starting {
            self.state = ScanState::Idle;
        }
        self.pending.starts = self.pending.starts.saturating_sub(1);
        self.continuous = false;
    }

    /// An explicit stop always ends continuous mode. Returns true when a stop
    /// request should go out.
    pub(crate) fn begin_stop(&mut self) -> bool {
        self.continuous = false;
        self.cancel_stop_timer();
        if self.state != ScanState::Scanning {
            return false;
        }
        self.state = ScanState::Stopping;
        self.pending.stops += 1;
        true
    }

    pub(crate) fn stop_resolved(&mut self) {
        if self.state == ScanState::Stopping {
            self.state = ScanState::Idle;
        }
    }

    pub(crate) fn stop_failed(&mut self) {
        if self.state == ScanState::Stopping {
            self.state = ScanState::Scanning;
        }
        self.pending.stops = self.pending.stops.saturating_sub(1);
    }

    /// A late report of our own start does not override a stop issued since.
    pub(crate) fn on_native_started(&mut self) -> Origin {
        let origin = origin(self.pending, Transition::Started);
        match origin {
            Origin::Local => {
                self.pending.starts -= 1;
                if self.state == ScanState::Starting {
                    self.state = ScanState::Scanning;
                }
            }
            Origin::External => self.state = ScanState::Scanning,
        }
        origin
    }

    /// Returns the origin and whether a continuous session should restart.
    pub(crate) fn on_native_stopped(&mut self) -> (Origin, bool) {
        let origin = origin(self.pending, Transition::Stopped);
        match origin {
            Origin::Local => {
                self.pending.stops -= 1;
                if self.state == ScanState::Stopping {
                    self.state = ScanState::Idle;
                }
                (origin, false)
            }
            Origin::External => {
                self.cancel_stop_timer();
                self.state = ScanState::Idle;
                (origin, self.continuous)
            }
        }
    }

    /// Adapter went away. Continuous mode survives so the session resumes on
    /// re-enable.
    pub(crate) fn on_disabled(&mut self) {
        self.cancel_stop_timer();
        self.state = ScanState::Idle;
        self.pending = Pending::default();
    }

    /// Deduplicates discoveries within a session unless duplicates are allowed.
    pub(crate) fn should_report(&mut self, id: PeripheralId) -> bool {
        self.allow_duplicates || self.seen.insert(id)
    }

    fn arm_stop_timer(&mut self, handle: impl FnOnce(u64) -> AbortHandle) {
        self.cancel_stop_timer();
        self.timer_generation += 1;
        let generation = self.timer_generation;
        self.stop_timer = Some(StopTimer {
            generation,
            handle: handle(generation),
        });
    }

    /// Claim the stop timer from inside its own task so that the stop it
    /// triggers does not abort it.
    fn take_stop_timer(&mut self, generation: u64) -> bool {
        let current = self
            .stop_timer
            .as_ref()
            .is_some_and(|timer| timer.generation == generation);
        if current {
            self.stop_timer = None;
        }
        current
    }

    fn cancel_stop_timer(&mut self) {
        if let Some(timer) = self.stop_timer.take() {
            timer.handle.abort();
        }
    }
}

impl Client {
    pub(crate) fn scan(&self) -> MutexGuard<'_, ScanController> {
        self.inner.scan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan().state()
    }

    /// Start discovering peripherals. `None` uses the configured duration; a
    /// zero duration scans continuously, restarting whenever the adapter ends
    /// the session on its own. Does nothing while a session is active.
    pub async fn search(&self, duration: Option<Duration>, allow_duplicates: bool) -> Result<()> {
        let duration = duration.unwrap_or(self.inner.config.scan_duration);
        if !self.scan().begin_start(duration.is_zero(), allow_duplicates) {
            debug!("scan already active");
            return Ok(());
        }

        let filter = ScanFilter {
            services: Vec::new(),
            allow_duplicates,
        };
        let result = self
            .inner
            .dispatcher
            .execute(
                "start scan",
                Target::default(),
                self.inner.config.timeout,
                None,
                self.inner.adapter.start_scan(filter),
            )
            .await;

        let mut scan = self.scan();
        match result {
            Ok(_) => {
                scan.start_resolved();
                if !duration.is_zero() {
                    let client = Arc::downgrade(&self.inner);
                    scan.arm_stop_timer(|generation| {
                        tokio::spawn(async move {
                            tokio::time::sleep(duration).await;
                            let Some(inner) = client.upgrade() else {
                                return;
                            };
                            let client = Client { inner };
                            if !client.scan().take_stop_timer(generation) {
                                return;
                            }
                            debug!("scan duration elapsed");
                            if let Err(error) = client.stop_search().await {
                                warn!("automatic scan stop failed: {error}");
                            }
                        })
                        .abort_handle()
                    });
                }
                Ok(())
            }
            Err(error) => {
                scan.start_failed();
                Err(error)
            }
        }
    }

    /// Stop the current session. Does nothing unless scanning.
    pub async fn stop_search(&self) -> Result<()> {
        if !self.scan().begin_stop() {
            return Ok(());
        }

        let result = self
            .inner
            .dispatcher
            .execute(
                "stop scan",
                Target::default(),
                self.inner.config.timeout,
                None,
                self.inner.adapter.stop_scan(),
            )
            .await;

        let mut scan = self.scan();
        match result {
            Ok(_) => {
                scan.stop_resolved();
                Ok(())
            }
            Err(error) => {
                scan.stop_failed();
                Err(error)
            }
        }
    }

    /// Resume a continuous session after `delay`, unless something else
    /// started or ended it meanwhile.
    pub(crate) fn schedule_restart(&self, delay: Duration) {
        let client = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = client.upgrade() else {
                return;
            };
            let client = Client { inner };
            let allow_duplicates = {
                let scan = client.scan();
                if !scan.wants_restart() {
                    return;
                }
                scan.allow_duplicates()
            };
            if !client.is_enabled() {
                return;
            }
            debug!("restarting continuous scan");
            if let Err(error) = client.search(Some(Duration::ZERO), allow_duplicates).await {
                warn!("continuous scan restart failed: {error}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn own_start_is_local_and_external_start_is_not() {
        let mut scan = ScanController::new();
        assert!(scan.begin_start(false, false));
        assert_eq!(scan.state(), ScanState::Starting);
        scan.start_resolved();
        assert_eq!(scan.on_native_started(), Origin::Local);
        assert_eq!(scan.state(), ScanState::Scanning);

        // a second start event with nothing expected came from elsewhere
        assert_eq!(scan.on_native_started(), Origin::External);
    }

    #[test]
    fn native_event_may_precede_resolution() {
        let mut scan = ScanController::new();
        scan.begin_start(false, false);
        assert_eq!(scan.on_native_started(), Origin::Local);
        scan.start_resolved();
        assert_eq!(scan.state(), ScanState::Scanning);
    }

    #[test]
    fn start_is_a_noop_while_active() {
        let mut scan = ScanController::new();
        assert!(scan.begin_start(false, false));
        assert!(!scan.begin_start(false, false));
        scan.start_resolved();
        assert!(!scan.begin_start(true, false));
    }

    #[test]
    fn external_stop_restarts_continuous_session() {
        let mut scan = ScanController::new();
        scan.begin_start(true, false);
        scan.start_resolved();
        scan.on_native_started();

        assert_eq!(scan.on_native_stopped(), (Origin::External, true));
        assert!(scan.wants_restart());
    }

    #[test]
    fn explicit_stop_ends_continuous_mode() {
        let mut scan = ScanController::new();
        scan.begin_start(true, false);
        scan.start_resolved();
        scan.on_native_started();

        assert!(scan.begin_stop());
        assert_eq!(scan.state(), ScanState::Stopping);
        scan.stop_resolved();
        assert_eq!(scan.on_native_stopped(), (Origin::Local, false));
        assert!(!scan.wants_restart());
    }

    #[test]
    fn late_reports_of_own_transitions_stay_local() {
        let mut scan = ScanController::new();
        scan.begin_start(true, false);
        scan.start_resolved();
        scan.begin_stop();
        scan.stop_resolved();
        scan.begin_start(false, false);
        scan.start_resolved();

        // first start, the stop, then the second start arrive only now
        assert_eq!(scan.on_native_started(), Origin::Local);
        assert_eq!(scan.on_native_stopped(), (Origin::Local, false));
        assert_eq!(scan.state(), ScanState::Scanning);
        assert_eq!(scan.on_native_started(), Origin::Local);
        assert_eq!(scan.on_native_started(), Origin::External);
    }

    #[test]
    fn stop_is_a_noop_unless_scanning() {
        let mut scan = ScanController::new();
        assert!(!scan.begin_stop());
        scan.begin_start(false, false);
        assert!(!scan.begin_stop());
    }

    #[test]
    fn failed_stop_returns_to_scanning() {
        let mut scan = ScanController::new();
        scan.begin_start(false, false);
        scan.start_resolved();
        scan.begin_stop();
        scan.stop_failed();
        assert_eq!(scan.state(), ScanState::Scanning);
        assert_eq!(scan.on_native_stopped().0, Origin::External);
    }

    #[test]
    fn disabling_keeps_continuous_intent() {
        let mut scan = ScanController::new();
        scan.begin_start(true, false);
        scan.start_resolved();
        scan.on_disabled();
        assert_eq!(scan.state(), ScanState::Idle);
        assert!(scan.wants_restart());
    }

    #[test]
    fn duplicates_are_reported_once_per_session() {
        let mut scan = ScanController::new();
        let id = PeripheralId(Uuid::from_u128(7));
        scan.begin_start(false, false);
        assert!(scan.should_report(id));
        assert!(!scan.should_report(id));

        scan.start_resolved();
        scan.begin_stop();
        scan.stop_resolved();
        scan.begin_start(false, true);
        assert!(scan.should_report(id));
        assert!(scan.should_report(id));
    }
}
