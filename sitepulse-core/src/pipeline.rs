//! The assembled telemetry pipeline
//!
//! Signals flow: capture adapters → event buffer → {fast path → transport;
//! periodic flush → transport} → (on failure) offline queue → (on resync)
//! transport.
//!
//! The pipeline is an explicit object built from injected collaborators (an
//! analytics sink, a durable queue store) and owned by the application's
//! composition root; there is no ambient global. It runs single-threaded and
//! cooperatively: handlers run to completion between awaits, so buffer
//! mutation never races with itself.
//!
//! The run loop never awaits a batch send inline. A flush hands the batch to
//! transport and keeps the resulting [`InFlightBatch`] in the loop's
//! `select!`, so a hung request delays only its own batch while signals,
//! identity updates, and the fast path keep flowing. At most one batch send
//! is outstanding; a flush trigger that lands while one is pending skips
//! that cycle.

use std::mem;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::capture::{
    scroll_milestone, HeatmapSampler, PageSignal, RageClickDetector, VitalsTracker,
};
use crate::config::PipelineConfig;
use crate::session::SessionTracker;
use crate::store::QueueStore;
use crate::transport::{AnalyticsSink, InFlightBatch, Transport};
use crate::types::{is_critical, Batch, Environment, Event, PageContext};

/// Capture and dispatch statistics
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Events appended to the buffer
    pub events_captured: usize,
    /// Events that also took the fast path
    pub critical_events: usize,
    /// Batches drained from the buffer
    pub batches_built: usize,
    /// Flush cycles skipped because a send was already in flight
    pub flushes_skipped: usize,
}

/// What the driving loop should do after a signal has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep consuming signals
    Continue,
    /// The signal asks for an immediate flush (visibility loss)
    FlushRequested,
    /// The session has ended and the terminal batch was attempted
    Ended,
}

/// The telemetry capture and delivery pipeline.
///
/// Nothing in here may propagate an error to the caller: telemetry must never
/// be able to break the product it instruments. Failures terminate in a log
/// line or an offline-queue write.
pub struct Pipeline<S: AnalyticsSink, Q: QueueStore> {
    session: SessionTracker,
    environment: Environment,
    context: PageContext,
    buffer: Vec<Event>,
    heatmap: HeatmapSampler,
    rage: RageClickDetector,
    vitals: VitalsTracker,
    transport: Transport<S, Q>,
    flush_interval: std::time::Duration,
    stats: PipelineStats,
}

impl<S: AnalyticsSink + 'static, Q: QueueStore> Pipeline<S, Q> {
    pub fn new(
        config: &PipelineConfig,
        environment: Environment,
        context: PageContext,
        transport: Transport<S, Q>,
    ) -> Self {
        Self {
            session: SessionTracker::start(Utc::now()),
            environment,
            context,
            buffer: Vec::new(),
            heatmap: HeatmapSampler::new(
                config.heatmap_tick_ms,
                config.heatmap_sample_probability,
                config.heatmap_capacity,
                config.heatmap_batch_sample,
            ),
            rage: RageClickDetector::new(
                config.rage_click_window_ms,
                config.rage_click_threshold,
                config.rage_click_max_area,
            ),
            vitals: VitalsTracker::new(),
            transport,
            flush_interval: std::time::Duration::from_secs(config.flush_interval_secs),
            stats: PipelineStats::default(),
        }
    }

    /// Emit the `session_start` event. Call once, before driving signals.
    pub async fn start(&mut self) {
        let props = self.session.start_properties(&self.environment);
        let event = self.make_event("session_start", props);
        self.append(event).await;
    }

    // ============================================
    // Classifier & buffer
    // ============================================

    /// Stamp, buffer, and classify an event.
    ///
    /// Critical events are additionally handed to transport right away so
    /// they survive a missed flush window; they stay in the buffer and appear
    /// in the next batch as well. This stage never drops an event, whatever
    /// the buffer size; bounding happens only in the offline queue.
    pub async fn append(&mut self, event: Event) {
        self.stats.events_captured += 1;

        if is_critical(&event.name) {
            self.stats.critical_events += 1;
            self.buffer.push(event.clone());
            self.transport.send_event(event).await;
        } else {
            self.buffer.push(event);
        }
    }

    fn make_event(&self, name: &str, properties: serde_json::Value) -> Event {
        Event {
            name: name.to_string(),
            properties,
            session_id: self.session.id().to_string(),
            user_id: self.session.user_id().map(String::from),
            captured_at: Utc::now(),
            context: self.context.clone(),
        }
    }

    /// Merge caller-supplied properties over a base object.
    fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
        if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in e {
                b.insert(k.clone(), v.clone());
            }
        }
        base
    }

    // ============================================
    // Public tracking API
    // ============================================

    /// Track an arbitrary named event.
    pub async fn track(&mut self, name: &str, properties: serde_json::Value) {
        let event = self.make_event(name, properties);
        self.append(event).await;
    }

    /// Attach a user identity to the session. Repeat calls overwrite;
    /// already-captured events keep their original (anonymous) stamp.
    pub async fn identify(&mut self, user_id: &str, properties: serde_json::Value) {
        self.session.identify(user_id);
        let props = Self::merge(json!({ "user_id": user_id }), properties);
        let event = self.make_event("identify", props);
        self.append(event).await;
    }

    /// Drop the attached identity; the session is anonymous again.
    pub fn anonymize(&mut self) {
        self.session.anonymize();
    }

    /// Record a page view.
    pub async fn page(&mut self, name: &str, properties: serde_json::Value) {
        self.session.count_page_view();
        let props = Self::merge(json!({ "page": name }), properties);
        let event = self.make_event("page_view", props);
        self.append(event).await;
    }

    /// Record a funnel conversion step. Always critical.
    pub async fn conversion(&mut self, funnel: &str, step: &str, value: f64) {
        let event = self.make_event(
            "conversion",
            json!({ "funnel": funnel, "step": step, "value": value }),
        );
        self.append(event).await;
    }

    /// Record an experiment exposure.
    pub async fn experiment(&mut self, id: &str, variant: &str) {
        let event = self.make_event(
            "experiment_view",
            json!({ "experiment_id": id, "variant": variant }),
        );
        self.append(event).await;
    }

    /// Record a custom numeric metric.
    pub async fn metric(&mut self, name: &str, value: f64, properties: serde_json::Value) {
        let props = Self::merge(json!({ "metric": name, "value": value }), properties);
        let event = self.make_event("metric", props);
        self.append(event).await;
    }

    /// Update the page context stamped onto subsequent events (e.g. after a
    /// client-side navigation).
    pub fn set_context(&mut self, context: PageContext) {
        self.context = context;
    }

    // ============================================
    // Capture adapters
    // ============================================

    /// Feed one raw host-page signal through the adapters.
    ///
    /// Returns what the driving loop should do next. Flushing is left to the
    /// loop so it can balance the request against a send already in flight.
    pub async fn handle_signal(&mut self, signal: PageSignal) -> Flow {
        match signal {
            PageSignal::Click { x, y, target, at } => {
                self.session.count_click();
                if let Some(rage) = self.rage.observe(x, y, at) {
                    let event = self.make_event(
                        "rage_click",
                        json!({
                            "click_count": rage.count,
                            "area": rage.area,
                            "target": target,
                        }),
                    );
                    self.append(event).await;
                }
            }

            PageSignal::PointerMove { x, y, at } => {
                self.heatmap.observe(x, y, at);
            }

            PageSignal::Scroll {
                scroll_y,
                scroll_height,
                viewport_height,
            } => {
                if let Some(percent) = scroll_milestone(scroll_y, scroll_height, viewport_height) {
                    self.session.count_scroll();
                    let event = self.make_event("scroll_milestone", json!({ "percent": percent }));
                    self.append(event).await;
                }
            }

            PageSignal::FieldChange {
                field,
                field_type,
                value_len,
            } => {
                // Field identity and length only; the raw value never enters
                // the pipeline.
                let event = self.make_event(
                    "field_change",
                    json!({
                        "field": field,
                        "field_type": field_type,
                        "value_length": value_len,
                    }),
                );
                self.append(event).await;
            }

            PageSignal::VisibilityChange { hidden } => {
                let name = if hidden { "page_hidden" } else { "page_visible" };
                let event = self.make_event(name, json!({}));
                self.append(event).await;
                if hidden {
                    // The page may never come back; get the buffer out now
                    return Flow::FlushRequested;
                }
            }

            PageSignal::ScriptError {
                message,
                source,
                line,
                column,
            } => {
                self.session.count_error();
                let event = self.make_event(
                    "error",
                    json!({
                        "error_type": "script_error",
                        "message": message,
                        "source": source,
                        "line": line,
                        "column": column,
                    }),
                );
                self.append(event).await;
            }

            PageSignal::UnhandledRejection { reason } => {
                self.session.count_error();
                let event = self.make_event(
                    "error",
                    json!({
                        "error_type": "unhandled_rejection",
                        "message": reason,
                    }),
                );
                self.append(event).await;
            }

            PageSignal::LoadComplete { timing } => {
                if let Some(props) = self.vitals.on_load_complete(&timing) {
                    let event = self.make_event("performance", props);
                    self.append(event).await;
                }
            }

            PageSignal::LargestContentfulPaint { value_ms } => {
                let props = self.vitals.on_largest_contentful_paint(value_ms);
                let event = self.make_event("web_vital", props);
                self.append(event).await;
            }

            PageSignal::FirstInputDelay { value_ms } => {
                let props = self.vitals.on_first_input_delay(value_ms);
                let event = self.make_event("web_vital", props);
                self.append(event).await;
            }

            PageSignal::LayoutShift { score } => {
                let props = self.vitals.on_layout_shift(score);
                let event = self.make_event("web_vital", props);
                self.append(event).await;
            }

            PageSignal::ConnectivityChange { online } => {
                if online {
                    let replayed = self.transport.resync().await;
                    if replayed > 0 {
                        tracing::info!(replayed, "connectivity restored, offline queue replayed");
                    }
                } else {
                    tracing::debug!("connectivity lost");
                }
            }

            PageSignal::Teardown => {
                self.end_session().await;
                return Flow::Ended;
            }
        }

        Flow::Continue
    }

    // ============================================
    // Dispatcher
    // ============================================

    /// Drain the buffer into a batch.
    ///
    /// The buffer is swapped out before any send begins, so events captured
    /// during an outstanding send land in a fresh buffer instead of racing
    /// the drained one.
    fn drain_batch(&mut self) -> Batch {
        let events = mem::take(&mut self.buffer);
        let batch = Batch {
            events,
            session_id: self.session.id().to_string(),
            user_id: self.session.user_id().map(String::from),
            produced_at: Utc::now(),
            performance_summary: self.vitals.summary().cloned(),
            heatmap_sample: self.heatmap.sample(),
        };
        self.stats.batches_built += 1;
        batch
    }

    /// Drain the buffer and deliver the batch, awaiting the send inline.
    ///
    /// Safe to invoke redundantly. `force` bypasses the empty-buffer check
    /// so the terminal batch is always attempted. The run loop does not use
    /// this for periodic or visibility flushes; it polls the send instead
    /// (see [`Pipeline::run`]).
    pub async fn flush(&mut self, force: bool) {
        if self.buffer.is_empty() && !force {
            return;
        }
        let batch = self.drain_batch();
        self.transport.send_batch(batch).await;
    }

    /// Begin a non-blocking flush: drain a non-empty buffer and hand the
    /// batch to transport, returning the send for the run loop to poll.
    fn begin_flush(&mut self) -> Option<InFlightBatch> {
        if self.buffer.is_empty() {
            return None;
        }
        let batch = self.drain_batch();
        self.transport.begin_batch(batch)
    }

    /// One flush trigger from the run loop: skip the cycle if a send is
    /// still outstanding, otherwise start a new one.
    fn begin_or_skip_flush(&mut self, in_flight: &mut Option<InFlightBatch>) {
        if in_flight.is_some() {
            self.stats.flushes_skipped += 1;
            tracing::debug!("flush skipped, batch send still in flight");
            return;
        }
        *in_flight = self.begin_flush();
    }

    /// End the session: emit the critical `session_end` summary and force a
    /// terminal flush. Must not rely on timers, which may never fire again
    /// during page teardown. A second call is a no-op.
    pub async fn end_session(&mut self) {
        let Some(props) = self.session.end(Utc::now()) else {
            return;
        };
        let event = self.make_event("session_end", props);
        self.append(event).await;
        self.flush(true).await;
    }

    /// Replay the offline queue (manual trigger).
    pub async fn resync(&mut self) -> usize {
        self.transport.resync().await
    }

    // ============================================
    // Run loop
    // ============================================

    /// Drive the pipeline from the host environment.
    ///
    /// Consumes raw signals from a single-consumer channel (preserving
    /// arrival order), flushes on a periodic timer, and follows the identity
    /// provider through a watch subscription. Batch sends are polled here
    /// rather than awaited inline, so a hung request never stalls capture.
    /// Returns the pipeline after teardown so callers can inspect final
    /// state.
    pub async fn run(
        mut self,
        mut signals: mpsc::Receiver<PageSignal>,
        mut identity: watch::Receiver<Option<String>>,
    ) -> Self {
        self.start().await;

        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // periodic flush happens one full interval in.
        ticker.tick().await;

        let mut identity_closed = false;
        let mut in_flight: Option<InFlightBatch> = None;

        loop {
            tokio::select! {
                maybe_signal = signals.recv() => {
                    match maybe_signal {
                        Some(signal) => match self.handle_signal(signal).await {
                            Flow::Continue => {}
                            Flow::FlushRequested => self.begin_or_skip_flush(&mut in_flight),
                            Flow::Ended => break,
                        },
                        None => {
                            self.end_session().await;
                            break;
                        }
                    }
                }

                Some((batch, outcome)) = settle_send(&mut in_flight), if in_flight.is_some() => {
                    self.transport.complete_batch(batch, outcome);
                }

                _ = ticker.tick() => {
                    self.begin_or_skip_flush(&mut in_flight);
                }

                changed = identity.changed(), if !identity_closed => {
                    match changed {
                        Ok(()) => {
                            let user_id = identity.borrow_and_update().clone();
                            match user_id {
                                Some(id) => self.identify(&id, json!({})).await,
                                None => self.anonymize(),
                            }
                        }
                        Err(_) => identity_closed = true,
                    }
                }
            }
        }

        // Teardown cannot wait on an outstanding send; park its batch so
        // resync replays it. Duplicates are possible, loss is not.
        if let Some(pending) = in_flight.take() {
            self.transport.defer_batch(pending.into_batch());
        }

        self
    }

    // ============================================
    // Introspection
    // ============================================

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn transport(&self) -> &Transport<S, Q> {
        &self.transport
    }
}

/// Poll an in-flight batch send to completion.
///
/// Cancel-safe: losing the `select!` race leaves the send in the slot,
/// resumable on the next loop turn. Only polled while the slot is occupied.
async fn settle_send(
    slot: &mut Option<InFlightBatch>,
) -> Option<(Batch, crate::error::Result<()>)> {
    let outcome = slot.as_mut()?.wait().await;
    let batch = slot.take()?.into_batch();
    Some((batch, outcome))
}
