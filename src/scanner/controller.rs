use std::sync::Arc;

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    analysis::{AnalysisRequest, AnalysisService},
    db::KeyValueStore,
    models::{AnalysisResult, HistoryItem},
    settings::ScannerTimings,
};

use super::{
    events::{ScanEvent, EVENT_CHANNEL_CAPACITY},
    persistence,
    state::{
        countdown_progress, estimate_progress, step_for_progress, AutoScanCycle, ScannerState,
        ANALYSIS_STEPS, UNEXPECTED_ERROR,
    },
    AutoScanStatus, ScanSnapshot, ScanState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// How a call to [`ScanController::submit`] settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank text and no image; nothing happened.
    IgnoredEmpty,
    /// Another analysis call was still outstanding; the request was dropped.
    AlreadyScanning,
    Resulted,
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum ScanTrigger {
    Manual,
    Auto,
}

impl ScanTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            ScanTrigger::Manual => "manual",
            ScanTrigger::Auto => "auto",
        }
    }
}

#[derive(Debug, Default)]
struct WrittenVersions {
    history: u64,
    auto_scan: u64,
}

/// Owns the scan lifecycle: submission, progress estimation, the debounced
/// auto-scan cycle and history recording.
///
/// Cheap to clone; all clones share one state. The state lock is never held
/// across the analysis call or a store write.
#[derive(Clone)]
pub struct ScanController {
    state: Arc<Mutex<ScannerState>>,
    service: Arc<dyn AnalysisService>,
    store: Arc<dyn KeyValueStore>,
    // Last version written per key; a write older than it is skipped.
    persist: Arc<Mutex<WrittenVersions>>,
    events: broadcast::Sender<ScanEvent>,
    timings: ScannerTimings,
}

impl ScanController {
    /// Reads history and the auto-scan flag from `store` and builds a controller.
    pub async fn load(
        service: Arc<dyn AnalysisService>,
        store: Arc<dyn KeyValueStore>,
        timings: ScannerTimings,
    ) -> Self {
        let history = persistence::load_history(store.as_ref()).await;
        let auto_scan_enabled = persistence::load_auto_scan(store.as_ref()).await;

        log_info!(
            "Scan controller ready ({} history items, auto-scan {})",
            history.len(),
            if auto_scan_enabled { "on" } else { "off" }
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(ScannerState::new(history, auto_scan_enabled))),
            service,
            store,
            persist: Arc::new(Mutex::new(WrittenVersions::default())),
            events,
            timings,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ScanSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn history(&self) -> Vec<HistoryItem> {
        self.state.lock().await.history.to_vec()
    }

    /// Scans `text` and/or `image`. Any pending auto-scan cycle is cancelled first.
    pub async fn submit(&self, text: &str, image: Option<&str>) -> SubmitOutcome {
        self.run_scan(
            text.to_string(),
            image.map(str::to_string),
            ScanTrigger::Manual,
        )
        .await
    }

    /// Scans whatever is currently in the input fields.
    pub async fn submit_current(&self) -> SubmitOutcome {
        let (text, image) = {
            let state = self.state.lock().await;
            (state.input_text.clone(), state.image.clone())
        };
        self.run_scan(text, image, ScanTrigger::Manual).await
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        let mut state = self.state.lock().await;
        if state.input_text == text {
            return;
        }
        state.input_text = text;
        self.restart_auto_cycle(&mut state);
        self.emit_state(&state);
    }

    pub async fn set_image(&self, image: Option<String>) {
        let mut state = self.state.lock().await;
        if state.image == image {
            return;
        }
        state.image = image;
        self.restart_auto_cycle(&mut state);
        self.emit_state(&state);
    }

    pub async fn set_auto_scan_enabled(&self, enabled: bool) {
        let version = {
            let mut state = self.state.lock().await;
            if state.auto_scan_enabled == enabled {
                return;
            }
            state.auto_scan_enabled = enabled;
            self.restart_auto_cycle(&mut state);
            self.emit_state(&state);
            state.auto_scan_version += 1;
            state.auto_scan_version
        };

        log_info!("Auto-scan {}", if enabled { "enabled" } else { "disabled" });

        let mut written = self.persist.lock().await;
        if version > written.auto_scan {
            persistence::save_auto_scan(self.store.as_ref(), enabled).await;
            written.auto_scan = version;
        }
    }

    /// Resets input and scan state. History and the auto-scan flag are kept.
    /// An outstanding analysis call keeps running but can no longer change
    /// the visible state.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.cancel_auto_cycle();
        state.detach_scan();
        state.input_text.clear();
        state.image = None;
        state.scan = ScanState::Idle;
        state.auto_status = AutoScanStatus::Idle;
        self.emit_state(&state);
    }

    /// Shows a past verdict without calling the analysis service.
    pub async fn restore_from_history(&self, item: &HistoryItem) {
        let mut state = self.state.lock().await;
        if state.scan.is_scanning() {
            state.detach_scan();
        }
        state.scan = ScanState::Resulted(item.result.clone());
        self.emit_state(&state);
    }

    pub async fn restore_by_id(&self, id: &str) -> Option<HistoryItem> {
        let item = self.state.lock().await.history.find(id).cloned()?;
        self.restore_from_history(&item).await;
        Some(item)
    }

    async fn run_scan(
        &self,
        text: String,
        image: Option<String>,
        trigger: ScanTrigger,
    ) -> SubmitOutcome {
        let generation = {
            let mut state = self.state.lock().await;
            if text.trim().is_empty() && image.is_none() {
                return SubmitOutcome::IgnoredEmpty;
            }
            if state.in_flight {
                log_info!(
                    "Dropping {} scan request: another scan is in flight",
                    trigger.as_str()
                );
                return SubmitOutcome::AlreadyScanning;
            }

            state.cancel_auto_cycle();
            let generation = state.begin_scan();
            state.estimator = Some(self.spawn_estimator(generation));
            self.emit_state(&state);
            generation
        };

        log_info!(
            "Starting {} scan #{} ({} chars, image: {})",
            trigger.as_str(),
            generation,
            text.chars().count(),
            image.is_some()
        );

        let request = AnalysisRequest {
            content: text.clone(),
            image: image.clone(),
        };

        match self.service.analyze(request).await {
            Ok(result) => {
                self.complete_scan(generation, &text, image.is_some(), result)
                    .await
            }
            Err(err) => self.fail_scan(generation, err).await,
        }
    }

    async fn complete_scan(
        &self,
        generation: u64,
        text: &str,
        has_image: bool,
        result: AnalysisResult,
    ) -> SubmitOutcome {
        log_info!(
            "Scan #{} returned {} (risk {})",
            generation,
            result.threat_level.as_str(),
            result.risk_score
        );

        let (serialized, version) = {
            let mut state = self.state.lock().await;
            state.stop_estimator();
            state
                .history
                .push(HistoryItem::record(text, has_image, result.clone()));

            if state.is_current_scan(generation) {
                state.progress = 100.0;
                state.analysis_step = ANALYSIS_STEPS.len() - 1;
                let _ = self.events.send(ScanEvent::Progress {
                    scan_progress: state.progress,
                    analysis_step: state.analysis_step,
                });
            }
            let _ = self.events.send(ScanEvent::HistoryChanged {
                items: state.history.len(),
            });

            state.history_version += 1;
            (
                persistence::serialize_history(&state.history),
                state.history_version,
            )
        };

        {
            let mut written = self.persist.lock().await;
            if version > written.history {
                if let Some(serialized) = serialized {
                    persistence::save_history(self.store.as_ref(), &serialized).await;
                }
                written.history = version;
            }
        }

        time::sleep(self.timings.completion_delay()).await;

        let mut state = self.state.lock().await;
        state.in_flight = false;
        if state.is_current_scan(generation) {
            state.scan = ScanState::Resulted(result);
            if state.auto_status == AutoScanStatus::Analyzing {
                state.auto_status = AutoScanStatus::Idle;
            }
            state.progress = 0.0;
            state.analysis_step = 0;
            self.emit_state(&state);
        }

        SubmitOutcome::Resulted
    }

    async fn fail_scan(&self, generation: u64, err: anyhow::Error) -> SubmitOutcome {
        let message = format!("{err:#}");
        let message = if message.trim().is_empty() {
            UNEXPECTED_ERROR.to_string()
        } else {
            message
        };
        log_warn!("Scan #{} failed: {}", generation, message);

        let mut state = self.state.lock().await;
        state.stop_estimator();
        state.in_flight = false;
        if state.is_current_scan(generation) {
            state.scan = ScanState::Failed(message);
            if state.auto_status == AutoScanStatus::Analyzing {
                state.auto_status = AutoScanStatus::Idle;
            }
            state.progress = 0.0;
            state.analysis_step = 0;
            self.emit_state(&state);
        }

        SubmitOutcome::Failed
    }

    /// Cosmetic progress while the analysis call is outstanding. Stops on its
    /// own once its generation is no longer current or it has been detached.
    fn spawn_estimator(&self, generation: u64) -> JoinHandle<()> {
        let state = self.state.clone();
        let events = self.events.clone();
        let tick = self.timings.tick();
        let estimated_ms = self.timings.estimated_scan().as_millis();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = time::interval_at(started + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let mut guard = state.lock().await;
                if !guard.is_current_scan(generation) || guard.estimator.is_none() {
                    break;
                }

                let progress = estimate_progress(started.elapsed().as_millis(), estimated_ms);
                guard.progress = progress;
                guard.analysis_step = step_for_progress(progress);
                let _ = events.send(ScanEvent::Progress {
                    scan_progress: guard.progress,
                    analysis_step: guard.analysis_step,
                });
            }
        })
    }

    /// Input or enablement changed: drop the pending cycle and, when armed,
    /// start a fresh one in Typing.
    fn restart_auto_cycle(&self, state: &mut ScannerState) {
        let previous = state.auto_status;
        state.cancel_auto_cycle();

        if !state.auto_scan_armed() {
            if matches!(previous, AutoScanStatus::Typing | AutoScanStatus::Waiting) {
                // Collapses to Idle even over a running scan; that scan's
                // estimator keeps writing progress on its next tick.
                state.auto_status = AutoScanStatus::Idle;
                state.progress = 0.0;
            } else {
                state.settle_auto_status();
            }
            return;
        }

        state.auto_status = AutoScanStatus::Typing;
        if !state.scan_owns_progress() {
            state.progress = 0.0;
        }

        let generation = state.cycle_generation;
        let token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_auto_cycle(generation, token.clone()));
        state.auto_cycle = Some(AutoScanCycle { token, handle });
    }

    async fn run_auto_cycle(self, generation: u64, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = time::sleep(self.timings.debounce()) => {}
        }

        {
            let mut state = self.state.lock().await;
            if state.cycle_generation != generation {
                return;
            }
            state.auto_status = AutoScanStatus::Waiting;
            if !state.scan_owns_progress() {
                state.progress = 0.0;
            }
            self.emit_state(&state);
        }

        let countdown = self.timings.countdown();
        let tick = self.timings.tick();
        let started = Instant::now();
        let deadline = started + countdown;
        let mut ticker = time::interval_at(started + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = time::sleep_until(deadline) => break,
                _ = ticker.tick() => {
                    let mut state = self.state.lock().await;
                    if state.cycle_generation != generation {
                        return;
                    }
                    if !state.scan_owns_progress() {
                        state.progress = countdown_progress(
                            started.elapsed().as_millis(),
                            countdown.as_millis(),
                        );
                        let _ = self.events.send(ScanEvent::Progress {
                            scan_progress: state.progress,
                            analysis_step: state.analysis_step,
                        });
                    }
                }
            }
        }

        let (text, image) = {
            let mut state = self.state.lock().await;
            if state.cycle_generation != generation {
                return;
            }
            // The cycle is done; dropping our own handle only detaches it.
            state.auto_cycle = None;

            if state.in_flight {
                log_info!("Auto-scan trigger dropped: a scan is already in flight");
                state.settle_auto_status();
                self.emit_state(&state);
                return;
            }
            (state.input_text.clone(), state.image.clone())
        };

        // Submit from a fresh task so that cancelling this cycle can never
        // abort the scan it started.
        tokio::spawn(async move {
            self.run_scan(text, image, ScanTrigger::Auto).await;
        });
    }

    fn emit_state(&self, state: &ScannerState) {
        let _ = self.events.send(ScanEvent::StateChanged(state.snapshot()));
    }
}
