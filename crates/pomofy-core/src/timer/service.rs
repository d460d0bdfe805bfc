//! Async driver for [`TimerEngine`].
//!
//! The service owns the engine behind a mutex and runs at most one clock
//! task. The clock task ticks the engine once per period until the engine
//! drops its [`ClockToken`] or the task is cancelled. Every mutation
//! publishes its transition event followed by [`Event::StateSnapshot`] on a
//! broadcast channel.
//!
//! All methods that may spawn tasks must be called inside a Tokio runtime.
//! Locks are always taken engine first, then the clock and disarm slots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::engine::{ClockToken, TimerEngine, TimerState, RESET_CONFIRM_WINDOW};
use super::plan::SessionPlan;
use crate::error::{ConfigError, TimerError};
use crate::events::{Event, Snapshot};
use crate::storage::{KvStore, Settings, SettingsStore, ValidatedSettings};

/// Default clock period.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 64;

struct ClockTask {
    token: ClockToken,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ClockTask {
    fn stop(self) {
        self.cancel.cancel();
        drop(self.handle);
    }
}

struct Shared {
    engine: Mutex<TimerEngine>,
    clock: Mutex<Option<ClockTask>>,
    disarm: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<Event>,
    show_in_title: AtomicBool,
    tick_period: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn publish(&self, engine: &TimerEngine, event: Option<Event>) {
        // Sending fails only when nobody listens.
        if let Some(event) = event {
            let _ = self.events.send(event);
        }
        let _ = self.events.send(Event::StateSnapshot(engine.snapshot()));
    }

    /// Bring the clock task in line with the engine's token.
    fn sync_clock(self: &Arc<Self>, engine: &TimerEngine) {
        let mut clock = lock(&self.clock);
        let wanted = engine.clock_token();
        if clock.as_ref().map(|task| task.token) == wanted {
            return;
        }
        if let Some(task) = clock.take() {
            task.stop();
        }
        if let Some(token) = wanted {
            *clock = Some(self.spawn_clock(token));
        }
    }

    fn spawn_clock(self: &Arc<Self>, token: ClockToken) -> ClockTask {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_clock(
            Arc::downgrade(self),
            token,
            cancel.clone(),
            self.tick_period,
        ));
        tracing::debug!(?token, "clock task spawned");
        ClockTask {
            token,
            cancel,
            handle,
        }
    }

    /// One clock tick. Returns false once `token` is no longer the live clock.
    fn tick(&self, token: ClockToken) -> bool {
        let mut engine = lock(&self.engine);
        if !engine.is_clock(token) {
            return false;
        }
        let event = engine.tick_for(token);
        self.publish(&engine, event);
        if engine.is_clock(token) {
            return true;
        }
        let mut clock = lock(&self.clock);
        if clock.as_ref().is_some_and(|task| task.token == token) {
            // The running task is this one; detaching is enough.
            clock.take();
        }
        false
    }

    fn cancel_disarm(&self) {
        if let Some(handle) = lock(&self.disarm).take() {
            handle.abort();
        }
    }

    // The helpers below run under the caller's engine guard.

    fn start_locked(self: &Arc<Self>, engine: &mut TimerEngine) -> Result<(), TimerError> {
        if let Some(event) = engine.start()? {
            self.sync_clock(engine);
            self.publish(engine, Some(event));
        }
        Ok(())
    }

    fn pause_locked(self: &Arc<Self>, engine: &mut TimerEngine) {
        let event = engine.pause();
        self.sync_clock(engine);
        if event.is_some() {
            self.publish(engine, event);
        }
    }

    fn new_cycle_locked(self: &Arc<Self>, engine: &mut TimerEngine) -> Result<(), TimerError> {
        let event = engine.restart_cycle();
        self.sync_clock(engine);
        self.cancel_disarm();
        self.publish(engine, Some(event));
        self.start_locked(engine)
    }
}

async fn run_clock(
    shared: Weak<Shared>,
    token: ClockToken,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                if !shared.tick(token) {
                    break;
                }
            }
        }
    }
    tracing::debug!(?token, "clock task finished");
}

/// Shared handle to a running timer.
#[derive(Clone)]
pub struct TimerService {
    shared: Arc<Shared>,
}

impl TimerService {
    pub fn new(engine: TimerEngine) -> Self {
        Self::with_tick_period(engine, TICK_PERIOD)
    }

    pub fn with_tick_period(engine: TimerEngine, tick_period: Duration) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                clock: Mutex::new(None),
                disarm: Mutex::new(None),
                events,
                show_in_title: AtomicBool::new(true),
                tick_period,
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        lock(&self.shared.engine).snapshot()
    }

    pub fn state(&self) -> TimerState {
        lock(&self.shared.engine).state()
    }

    pub fn plan(&self) -> SessionPlan {
        lock(&self.shared.engine).plan().clone()
    }

    /// Whether the remaining time belongs in the page title.
    pub fn show_in_title(&self) -> bool {
        self.shared.show_in_title.load(Ordering::Relaxed)
    }

    /// Whether a clock task is currently attached.
    pub fn has_clock(&self) -> bool {
        lock(&self.shared.clock).is_some()
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Start or resume. Starting while running leaves the existing clock alone.
    pub fn start(&self) -> Result<(), TimerError> {
        let mut engine = lock(&self.shared.engine);
        self.shared.start_locked(&mut engine)
    }

    pub fn pause(&self) {
        let mut engine = lock(&self.shared.engine);
        self.shared.pause_locked(&mut engine);
    }

    /// Start when idle, pause when running, begin a new cycle once the
    /// current one is complete.
    pub fn toggle(&self) -> Result<(), TimerError> {
        let mut engine = lock(&self.shared.engine);
        match engine.state() {
            TimerState::Running => {
                self.shared.pause_locked(&mut engine);
                Ok(())
            }
            TimerState::CycleComplete => self.shared.new_cycle_locked(&mut engine),
            _ => self.shared.start_locked(&mut engine),
        }
    }

    /// Rewind to slot 0 and start the clock, from any state.
    pub fn new_cycle(&self) -> Result<(), TimerError> {
        let mut engine = lock(&self.shared.engine);
        self.shared.new_cycle_locked(&mut engine)
    }

    /// Two-stage reset. A first stage schedules its own disarm once the
    /// confirmation window lapses.
    pub fn reset(&self) {
        let mut engine = lock(&self.shared.engine);
        let event = engine.reset_at(Instant::now());
        self.shared.sync_clock(&engine);
        self.shared.cancel_disarm();
        if matches!(event, Event::ResetArmed { .. }) {
            let handle = tokio::spawn(disarm_after_window(Arc::downgrade(&self.shared)));
            *lock(&self.shared.disarm) = Some(handle);
        }
        self.shared.publish(&engine, Some(event));
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Swap in a plan.
    ///
    /// An identical, already loaded plan keeps the slot in progress. A
    /// completed cycle is always reseeded so the next one is ready.
    pub fn apply_plan(&self, plan: SessionPlan) {
        let mut engine = lock(&self.shared.engine);
        let unchanged = engine.is_plan_loaded() && *engine.plan() == plan;
        if unchanged && !engine.is_cycle_complete() {
            return;
        }
        let event = engine.apply_new_plan(plan);
        self.shared.sync_clock(&engine);
        self.shared.publish(&engine, Some(event));
    }

    /// Apply already validated settings.
    pub fn apply_validated(&self, settings: ValidatedSettings) {
        self.shared
            .show_in_title
            .store(settings.show_in_title, Ordering::Relaxed);
        {
            let mut engine = lock(&self.shared.engine);
            engine.apply_options(&settings.options);
        }
        self.apply_plan(settings.plan);
    }

    /// Validate and apply a settings record.
    ///
    /// Rejected settings keep the current plan, or the compiled-in defaults
    /// if no plan was ever loaded. The validation error is still returned.
    pub fn apply_settings(&self, settings: &Settings) -> Result<(), ConfigError> {
        match settings.validate() {
            Ok(validated) => {
                self.apply_validated(validated);
                Ok(())
            }
            Err(e) => {
                let loaded = lock(&self.shared.engine).is_plan_loaded();
                if loaded {
                    tracing::warn!(error = %e, "invalid settings, keeping current plan");
                } else {
                    tracing::warn!(error = %e, "invalid settings, using defaults");
                    if let Ok(defaults) = Settings::default().validate() {
                        self.apply_validated(defaults);
                    }
                }
                Err(e)
            }
        }
    }

    /// Load settings from `store` off the async threads and apply them.
    pub async fn load_from<K>(&self, store: Arc<SettingsStore<K>>) -> Result<(), ConfigError>
    where
        K: KvStore + 'static,
    {
        let settings = match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "settings load task failed, using defaults");
                Settings::default()
            }
        };
        self.apply_settings(&settings)
    }

    /// Apply every settings change published on `rx` until the sender or
    /// this service goes away.
    pub fn watch_settings(&self, mut rx: watch::Receiver<Settings>) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(shared) = shared.upgrade() else { break };
                let settings = rx.borrow_and_update().clone();
                // Rejections are logged by apply_settings.
                let _ = TimerService { shared }.apply_settings(&settings);
            }
            tracing::debug!("settings watcher finished");
        })
    }
}

async fn disarm_after_window(shared: Weak<Shared>) {
    time::sleep(RESET_CONFIRM_WINDOW).await;
    let Some(shared) = shared.upgrade() else { return };
    let mut engine = lock(&shared.engine);
    if let Some(event) = engine.expire_reset_window(Instant::now()) {
        shared.publish(&engine, Some(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryKv, Preset};
    use crate::timer::{EngineOptions, PresetDurations};

    /// work 3s, longBreak 4s.
    fn tiny_plan() -> SessionPlan {
        SessionPlan::from_preset(
            PresetDurations {
                work: 3,
                short_break: 2,
                long_break: 4,
            },
            1,
        )
        .unwrap()
    }

    fn service(auto_continue: bool) -> TimerService {
        let options = EngineOptions {
            auto_continue,
            ..EngineOptions::default()
        };
        TimerService::new(TimerEngine::new(tiny_plan()).with_options(&options))
    }

    async fn wait(millis: u64) {
        time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn running_clock_counts_down() {
        let service = service(false);
        service.start().unwrap();
        wait(2_500).await;
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Running);
        assert_eq!(snap.remaining_secs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_without_auto_continue_stops_clock() {
        let service = service(false);
        service.start().unwrap();
        wait(3_500).await;
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::SessionComplete);
        assert_eq!(snap.current_index, 1);
        assert_eq!(snap.remaining_secs, 4);
        assert!(!service.has_clock());

        wait(5_000).await;
        assert_eq!(service.snapshot().remaining_secs, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_continue_runs_to_cycle_complete() {
        let service = service(true);
        service.start().unwrap();
        wait(3_500).await;
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Running);
        assert_eq!(snap.current_index, 1);
        assert_eq!(snap.remaining_secs, 4);

        wait(4_000).await;
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::CycleComplete);
        assert_eq!(snap.current_index, 2);
        assert!(!service.has_clock());
        assert!(service.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_the_clock() {
        let service = service(false);
        service.start().unwrap();
        wait(1_500).await;
        service.pause();
        assert!(!service.has_clock());
        wait(5_000).await;
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Paused);
        assert_eq!(snap.remaining_secs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_keeps_a_single_clock() {
        let service = service(false);
        service.start().unwrap();
        service.start().unwrap();
        wait(1_500).await;
        assert_eq!(service.snapshot().remaining_secs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_alternates() {
        let service = service(false);
        service.toggle().unwrap();
        assert_eq!(service.state(), TimerState::Running);
        service.toggle().unwrap();
        assert_eq!(service.state(), TimerState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_after_cycle_complete_starts_a_new_cycle() {
        let service = service(true);
        service.start().unwrap();
        wait(7_500).await;
        assert_eq!(service.state(), TimerState::CycleComplete);

        let mut rx = service.subscribe();
        service.toggle().unwrap();
        assert!(matches!(rx.try_recv().unwrap(), Event::CycleReset { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Event::StateSnapshot(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::TimerStarted { slot_index: 0, .. }
        ));
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Running);
        assert_eq!(snap.current_index, 0);
        assert_eq!(snap.remaining_secs, 3);
        assert!(service.has_clock());

        wait(1_500).await;
        assert_eq!(service.snapshot().remaining_secs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn new_cycle_clears_an_armed_reset_and_runs_one_clock() {
        let service = service(false);
        service.start().unwrap();
        wait(1_500).await;
        service.reset();
        assert!(service.snapshot().reset_armed);

        service.new_cycle().unwrap();
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Running);
        assert_eq!(snap.remaining_secs, 3);
        assert!(!snap.reset_armed);

        // A lapsing window from the cancelled disarm must not fire.
        let mut rx = service.subscribe();
        wait(2_500).await;
        assert_eq!(service.snapshot().remaining_secs, 1);
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, Event::ResetDisarmed { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn double_reset_rewinds_cycle() {
        let service = service(true);
        service.start().unwrap();
        wait(4_500).await;
        assert_eq!(service.snapshot().current_index, 1);

        service.reset();
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Paused);
        assert_eq!(snap.current_index, 1);
        assert_eq!(snap.remaining_secs, 4);
        assert!(snap.reset_armed);

        service.reset();
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Stopped);
        assert_eq!(snap.current_index, 0);
        assert_eq!(snap.remaining_secs, 3);
        assert!(!snap.reset_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_window_disarms_itself() {
        let service = service(false);
        let mut rx = service.subscribe();
        service.reset();
        assert!(service.snapshot().reset_armed);

        wait(3_500).await;
        assert!(!service.snapshot().reset_armed);
        let mut saw_disarm = false;
        while let Ok(event) = rx.try_recv() {
            saw_disarm |= matches!(event, Event::ResetDisarmed { .. });
        }
        assert!(saw_disarm);

        service.reset();
        assert_eq!(service.snapshot().state, TimerState::Stopped);
        assert!(service.snapshot().reset_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_publish_event_then_snapshot() {
        let service = service(false);
        let mut rx = service.subscribe();
        service.start().unwrap();
        assert!(matches!(rx.try_recv().unwrap(), Event::TimerStarted { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Event::StateSnapshot(_)));

        wait(1_500).await;
        match rx.try_recv().unwrap() {
            Event::StateSnapshot(snap) => assert_eq!(snap.remaining_secs, 2),
            other => panic!("expected snapshot, got {other:?}"),
        }

        service.pause();
        assert!(matches!(rx.try_recv().unwrap(), Event::TimerPaused { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Event::StateSnapshot(_)));

        service.pause();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_while_running_keeps_slot() {
        let service = service(false);
        service.start().unwrap();
        wait(1_500).await;

        service
            .apply_settings(&Settings::default().with_preset(Preset::Focus))
            .unwrap();
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Running);
        assert_eq!(snap.remaining_secs, 2);
        assert_eq!(snap.total_slots, 6);
        assert!(service.has_clock());
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_while_idle_reseeds() {
        let service = service(false);
        service.apply_settings(&Settings::default()).unwrap();
        let snap = service.snapshot();
        assert_eq!(snap.total_slots, 8);
        assert_eq!(snap.remaining_secs, 25 * 60);
        assert_eq!(snap.state, TimerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn option_only_change_keeps_paused_progress() {
        let service = TimerService::new(TimerEngine::unloaded());
        service.apply_settings(&Settings::default()).unwrap();
        service.start().unwrap();
        wait(10_500).await;
        service.pause();

        let mut settings = Settings::default();
        settings.audio.volume = 10;
        settings.ui.show_in_title = false;
        service.apply_settings(&settings).unwrap();
        assert_eq!(service.snapshot().remaining_secs, 25 * 60 - 10);
        assert!(!service.show_in_title());
    }

    #[tokio::test(start_paused = true)]
    async fn identical_plan_while_paused_keeps_progress() {
        let service = service(false);
        let mut rx = service.subscribe();
        service.start().unwrap();
        wait(1_500).await;
        service.pause();
        while rx.try_recv().is_ok() {}

        service.apply_plan(tiny_plan());
        assert!(rx.try_recv().is_err());
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Paused);
        assert_eq!(snap.remaining_secs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_plan_while_paused_reseeds() {
        let service = service(false);
        service.start().unwrap();
        wait(1_500).await;
        service.pause();

        let longer = SessionPlan::from_preset(
            PresetDurations {
                work: 5,
                short_break: 2,
                long_break: 4,
            },
            1,
        )
        .unwrap();
        service.apply_plan(longer);
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Paused);
        assert_eq!(snap.current_index, 0);
        assert_eq!(snap.remaining_secs, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_plan_after_cycle_complete_readies_the_next_cycle() {
        let service = service(true);
        service.start().unwrap();
        wait(7_500).await;
        assert_eq!(service.state(), TimerState::CycleComplete);

        service.apply_plan(tiny_plan());
        let snap = service.snapshot();
        assert_eq!(snap.state, TimerState::Stopped);
        assert_eq!(snap.current_index, 0);
        assert_eq!(snap.remaining_secs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_settings_keep_last_known_good() {
        let service = service(false);
        let mut bad = Settings::default();
        bad.cycle.sessions = None;
        bad.cycle.work_sessions = 0;
        assert!(service.apply_settings(&bad).is_err());
        assert_eq!(service.plan(), tiny_plan());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_settings_before_load_use_defaults() {
        let service = TimerService::new(TimerEngine::unloaded());
        assert_eq!(service.snapshot().total_slots, 1);
        let mut bad = Settings::default();
        bad.audio.volume = -1;
        assert!(service.apply_settings(&bad).is_err());
        assert_eq!(service.snapshot().total_slots, 8);
    }

    #[tokio::test]
    async fn load_from_store_applies_saved_settings() {
        let store = Arc::new(SettingsStore::new(MemoryKv::new()));
        store
            .save(&Settings::default().with_preset(Preset::Sprint))
            .unwrap();
        let service = TimerService::new(TimerEngine::unloaded());
        service.load_from(store).await.unwrap();
        assert_eq!(service.snapshot().total_slots, 12);
        assert_eq!(service.snapshot().remaining_secs, 15 * 60);
    }

    #[tokio::test]
    async fn watcher_applies_saved_changes() {
        let store = SettingsStore::new(MemoryKv::new());
        let service = TimerService::new(TimerEngine::new(tiny_plan()));
        let watcher = service.watch_settings(store.subscribe());

        store
            .save(&Settings::default().with_preset(Preset::Focus))
            .unwrap();
        for _ in 0..100 {
            if service.snapshot().total_slots == 6 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(service.snapshot().total_slots, 6);

        drop(store);
        watcher.await.unwrap();
    }
}
