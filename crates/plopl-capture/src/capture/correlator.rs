//! Stitching request and response signals into exchanges.

use super::body::decode_body;
use super::types::{
    canonical_reason, CaptureSignal, CapturedExchange, ExchangeReady, ExchangeState, Headers,
    ObservedResponse, RequestData, ResponseData,
};
use crate::config::{Config, CorrelatorConfig};
use crate::delivery::{create_sink, ChannelSink, Emitter, RetryPolicy};
use crate::matcher::{self, MatchVerdict};
use crate::metrics;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::schema::Schema;
use crate::store::{create_exchange_store, ExchangeStore, Snapshot};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

type EntryRef = Arc<Mutex<LiveEntry>>;

struct LiveEntry {
    exchange: CapturedExchange,
    /// Creation order, used for oldest-first matching of unkeyed responses.
    seq: u64,
    body_seen: bool,
    /// Response that arrived before the request body.
    buffered_response: Option<ResponseData>,
    timer: Option<TimerHandle>,
    /// Set once the entry leaves the live table; later signals are stale.
    retired: bool,
}

impl LiveEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn retire(&mut self) {
        self.retired = true;
        self.cancel_timer();
    }

    fn awaits_response(&self) -> bool {
        matches!(
            self.exchange.state,
            ExchangeState::Pending | ExchangeState::BodyReady
        ) && self.exchange.response.is_none()
            && self.buffered_response.is_none()
    }

    fn is_placeholder(&self) -> bool {
        self.exchange.state == ExchangeState::Synthesized && self.exchange.placeholder
    }
}

/// Signals for a correlation key nobody has announced yet.
#[derive(Default)]
struct Orphan {
    body: Option<Value>,
    response: Option<ResponseData>,
    timer: Option<TimerHandle>,
}

/// Follow-up work once the entry lock is released.
enum Effect {
    None,
    Persist,
    Emit { ready: ExchangeReady, retire: bool },
    Abandon { history_changed: bool },
}

/// Correlates capture signals for one active schema.
///
/// Sessions are independent: each owns its active schema, live table,
/// buffered signals and history. Cloning a session yields another handle to
/// the same state.
#[derive(Clone)]
pub struct CorrelatorSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: CorrelatorConfig,
    schema: RwLock<Option<Arc<Schema>>>,
    live: RwLock<HashMap<String, EntryRef>>,
    /// Lock order: `orphans` before `live`. A key is either live or
    /// buffered, never both.
    orphans: Mutex<HashMap<String, Orphan>>,
    /// Emitted exchanges per schema id, in order of first emission.
    history: RwLock<HashMap<String, Vec<CapturedExchange>>>,
    seq: AtomicU64,
    persist_lock: Mutex<()>,
    emitter: Emitter,
    store: Arc<dyn ExchangeStore>,
    scheduler: Arc<dyn Scheduler>,
}

impl CorrelatorSession {
    pub fn new(
        config: &CorrelatorConfig,
        emitter: Emitter,
        store: Arc<dyn ExchangeStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config: config.clone(),
                schema: RwLock::new(None),
                live: RwLock::new(HashMap::new()),
                orphans: Mutex::new(HashMap::new()),
                history: RwLock::new(HashMap::new()),
                seq: AtomicU64::new(0),
                persist_lock: Mutex::new(()),
                emitter,
                store,
                scheduler,
            }),
        }
    }

    /// Wire a session from configuration: store, sink, retry policy.
    ///
    /// Returns the channel sink too when one is configured, so a consumer
    /// can attach to it.
    pub fn from_config(
        config: &Config,
        scheduler: Arc<dyn Scheduler>,
    ) -> anyhow::Result<(Self, Option<Arc<ChannelSink>>)> {
        let store = create_exchange_store(&config.store)?;
        let (sink, channel) = create_sink(&config.delivery)?;
        let emitter = Emitter::new(
            sink,
            RetryPolicy::from(&config.delivery),
            store.clone(),
            scheduler.clone(),
        );
        Ok((
            Self::new(&config.correlator, emitter, store, scheduler),
            channel,
        ))
    }

    pub fn active_schema(&self) -> Option<Arc<Schema>> {
        self.inner.active_schema()
    }

    /// Replace the active schema. Live exchanges of the previous schema are
    /// abandoned; the latest completed exchange of the new one, if any, is
    /// delivered again.
    pub fn activate_schema(&self, schema: Schema) {
        self.inner.activate_schema(schema);
    }

    /// Drop all live, buffered and historical state.
    pub fn clear_all(&self) {
        self.inner.clear_all();
    }

    pub fn on_request_started(&self, correlation_key: &str, url: &str, method: &str, headers: Headers) {
        self.inner
            .on_request_started(correlation_key, url, method, headers);
    }

    /// `body` is `null` for requests without a body.
    pub fn on_request_body(&self, correlation_key: &str, body: Value) {
        self.inner.on_request_body(correlation_key, body);
    }

    pub fn on_request_body_bytes(&self, correlation_key: &str, raw: Bytes) {
        self.inner.on_request_body(correlation_key, decode_body(&raw));
    }

    pub fn on_response(
        &self,
        correlation_key: Option<&str>,
        url: &str,
        method: &str,
        status: u16,
        headers: Headers,
        body: Value,
    ) {
        self.inner.on_observed_response(ObservedResponse::new(
            correlation_key,
            url,
            method,
            status,
            headers,
            body,
        ));
    }

    pub fn on_observed_response(&self, observed: ObservedResponse) {
        self.inner.on_observed_response(observed);
    }

    pub fn apply(&self, signal: CaptureSignal) {
        match signal {
            CaptureSignal::RequestStarted {
                correlation_key,
                url,
                method,
                headers,
            } => self.on_request_started(&correlation_key, &url, &method, headers),
            CaptureSignal::RequestBody {
                correlation_key,
                body,
            } => self.on_request_body(&correlation_key, body),
            CaptureSignal::Response {
                correlation_key,
                url,
                method,
                status,
                status_text,
                headers,
                body,
                request_headers,
                request_body,
            } => {
                let status_text = if status_text.is_empty() {
                    canonical_reason(status).to_string()
                } else {
                    status_text
                };
                let mut response = ResponseData::new(status, "", headers, body);
                response.status_text = status_text;
                self.on_observed_response(ObservedResponse {
                    correlation_key,
                    url,
                    method,
                    response,
                    request_headers,
                    request_body,
                });
            }
        }
    }

    /// Completed and synthesized exchanges of a schema, most recent last.
    pub fn get_completed_exchanges(&self, schema_id: &str) -> Vec<CapturedExchange> {
        self.inner
            .history
            .read()
            .get(schema_id)
            .map(|list| list.iter().filter(|e| e.state.is_ready()).cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent exchange of a schema holding a response.
    pub fn current_exchange(&self, schema_id: &str) -> Option<CapturedExchange> {
        self.get_completed_exchanges(schema_id).pop()
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.read().len()
    }

    /// Load the persisted snapshot into history.
    pub fn restore(&self) -> anyhow::Result<usize> {
        self.inner.restore()
    }

    /// Drain events whose delivery exhausted its retries.
    pub fn recover_undelivered(&self) -> anyhow::Result<Vec<ExchangeReady>> {
        self.inner.store.take_undelivered()
    }
}

impl SessionInner {
    fn active_schema(&self) -> Option<Arc<Schema>> {
        self.schema.read().clone()
    }

    // ===== Control plane =====

    fn activate_schema(&self, schema: Schema) {
        let schema = Arc::new(schema);
        let abandoned = self.drain_live();
        self.drain_orphans();
        *self.schema.write() = Some(schema.clone());

        info!(
            schema_id = %schema.id,
            url = %schema.request.url_substring,
            method = %schema.request.method,
            abandoned,
            "Monitoring for schema"
        );
        for diagnostic in &schema.diagnostics {
            warn!(schema_id = %schema.id, "Schema diagnostic: {}", diagnostic);
        }

        let latest = self.history.read().get(&schema.id).and_then(|list| {
            list.iter()
                .rev()
                .find(|e| e.state.is_ready() && e.response.is_some())
                .cloned()
        });
        if let Some(exchange) = latest {
            info!(
                schema_id = %schema.id,
                correlation_key = %exchange.correlation_key,
                revision = exchange.revision,
                "Re-delivering previously captured exchange"
            );
            self.emitter.emit(exchange.to_ready());
        }
    }

    fn clear_all(&self) {
        self.emitter.reset();
        let dropped = self.drain_live();
        self.drain_orphans();
        self.history.write().clear();
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear exchange store: {:#}", e);
        }
        info!(dropped, "Cleared all captured state");
    }

    /// Retire every live entry. Returns how many were still in flight.
    fn drain_live(&self) -> usize {
        let entries: Vec<EntryRef> = {
            let mut live = self.live.write();
            metrics::set_live_exchanges(0);
            live.drain().map(|(_, entry)| entry).collect()
        };

        let mut in_flight = 0;
        for entry in entries {
            let mut guard = entry.lock();
            if guard.retired {
                continue;
            }
            if matches!(
                guard.exchange.state,
                ExchangeState::Pending | ExchangeState::BodyReady
            ) {
                guard.exchange.state = ExchangeState::Abandoned;
                metrics::record_transition(ExchangeState::Abandoned.as_str());
                in_flight += 1;
            }
            guard.retire();
        }
        in_flight
    }

    fn drain_orphans(&self) {
        for (_, orphan) in self.orphans.lock().drain() {
            if let Some(timer) = orphan.timer {
                timer.cancel();
            }
        }
    }

    // ===== Signals =====

    fn on_request_started(
        self: &Arc<Self>,
        key: &str,
        url: &str,
        method: &str,
        headers: Headers,
    ) {
        const KIND: &str = "request_started";

        let Some(schema) = self.active_schema() else {
            debug!(correlation_key = key, "No active schema, ignoring request");
            metrics::record_signal(KIND, "ignored");
            return;
        };
        if !matcher::matches(url, method, None, &schema) {
            metrics::record_signal(KIND, "ignored");
            return;
        }

        let (entry, orphan) = {
            let mut orphans = self.orphans.lock();
            let mut live = self.live.write();
            if live.contains_key(key) {
                debug!(correlation_key = key, "Duplicate request start ignored");
                metrics::record_signal(KIND, "ignored");
                return;
            }
            let exchange =
                CapturedExchange::new(key, &schema.id, RequestData::new(url, method, headers));
            let entry = Arc::new(Mutex::new(LiveEntry {
                exchange,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                body_seen: false,
                buffered_response: None,
                timer: None,
                retired: false,
            }));
            live.insert(key.to_string(), entry.clone());
            metrics::set_live_exchanges(live.len());
            (entry, orphans.remove(key))
        };

        info!(
            correlation_key = key,
            schema_id = %schema.id,
            url,
            method,
            "Matched request, awaiting body and response"
        );
        metrics::record_signal(KIND, "accepted");
        metrics::record_transition(ExchangeState::Pending.as_str());

        let effect = {
            let mut guard = entry.lock();
            // Concurrent body and response may already have completed it.
            if !guard.retired {
                guard.timer = Some(self.start_wait_timer(key, &entry));
            }

            match orphan {
                Some(orphan) => {
                    if let Some(timer) = orphan.timer {
                        timer.cancel();
                    }
                    if guard.buffered_response.is_none() {
                        guard.buffered_response = orphan.response;
                    }
                    match orphan.body {
                        Some(body) => self.apply_body(&mut guard, body, &schema),
                        None => Effect::None,
                    }
                }
                None => Effect::None,
            }
        };
        self.finish(key, &entry, effect);
    }

    fn on_request_body(self: &Arc<Self>, key: &str, body: Value) {
        const KIND: &str = "request_body";

        let Some(schema) = self.active_schema() else {
            metrics::record_signal(KIND, "ignored");
            return;
        };

        let entry = {
            let mut orphans = self.orphans.lock();
            let entry = self.live.read().get(key).cloned();
            match entry {
                Some(entry) => entry,
                None => {
                    debug!(correlation_key = key, "Buffering body for unannounced request");
                    metrics::record_signal(KIND, "buffered");
                    self.buffer_orphan(&mut orphans, key, |orphan| {
                        if orphan.body.is_none() {
                            orphan.body = Some(body);
                        }
                    });
                    return;
                }
            }
        };

        let effect = {
            let mut guard = entry.lock();
            self.apply_body(&mut guard, body, &schema)
        };
        metrics::record_signal(KIND, "accepted");
        self.finish(key, &entry, effect);
    }

    fn on_observed_response(self: &Arc<Self>, observed: ObservedResponse) {
        let Some(schema) = self.active_schema() else {
            metrics::record_signal("response", "ignored");
            return;
        };
        match observed.correlation_key.clone() {
            Some(key) => self.on_keyed_response(&key, observed, &schema),
            None => self.on_unkeyed_response(observed, &schema),
        }
    }

    fn on_keyed_response(self: &Arc<Self>, key: &str, observed: ObservedResponse, schema: &Schema) {
        let mut orphans = self.orphans.lock();
        let entry = self.live.read().get(key).cloned();
        if let Some(entry) = entry {
            drop(orphans);
            let effect = {
                let mut guard = entry.lock();
                self.attach_response(&mut guard, observed.response)
            };
            self.finish(key, &entry, effect);
            return;
        }

        if !matcher::matches(&observed.url, &observed.method, None, schema) {
            metrics::record_signal("response", "ignored");
            return;
        }

        debug!(correlation_key = key, url = %observed.url, "Buffering response for unannounced request");
        metrics::record_signal("response", "buffered");
        let response = observed.response;
        self.buffer_orphan(&mut orphans, key, move |orphan| orphan.response = Some(response));
    }

    fn on_unkeyed_response(self: &Arc<Self>, observed: ObservedResponse, schema: &Schema) {
        if !matcher::matches(
            &observed.url,
            &observed.method,
            observed.request_body.as_ref(),
            schema,
        ) {
            metrics::record_signal("response", "ignored");
            return;
        }

        let entries: Vec<(String, EntryRef)> = self
            .live
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        let mut open = Vec::new();
        let mut placeholders = Vec::new();
        for (key, entry) in entries {
            let guard = entry.lock();
            if guard.retired
                || guard.exchange.request.url != observed.url
                || guard.exchange.request.method != observed.method
            {
                continue;
            }
            if guard.awaits_response() {
                open.push((guard.seq, key, entry.clone()));
            } else if guard.is_placeholder() {
                placeholders.push((guard.seq, key, entry.clone()));
            }
        }
        open.sort_by_key(|(seq, _, _)| *seq);
        placeholders.sort_by_key(|(seq, _, _)| *seq);

        for (_, key, entry) in open.into_iter().chain(placeholders) {
            let effect = {
                let mut guard = entry.lock();
                if guard.retired || !(guard.awaits_response() || guard.is_placeholder()) {
                    continue;
                }
                debug!(correlation_key = %key, "Correlated unkeyed response");
                self.attach_response(&mut guard, observed.response.clone())
            };
            self.finish(&key, &entry, effect);
            return;
        }

        self.synthesize_response_only(observed, schema);
    }

    fn synthesize_response_only(&self, observed: ObservedResponse, schema: &Schema) {
        let key = format!("synthetic_{}", Uuid::new_v4());
        let mut request = RequestData::new(
            &observed.url,
            &observed.method,
            observed.request_headers.unwrap_or_default(),
        );
        request.body = observed.request_body.unwrap_or(Value::Null);

        let mut exchange = CapturedExchange::new(&key, &schema.id, request);
        exchange.response = Some(observed.response);
        exchange.state = ExchangeState::Synthesized;
        exchange.revision = 1;

        info!(
            correlation_key = %key,
            schema_id = %schema.id,
            url = %observed.url,
            "Response arrived without a request, synthesized exchange"
        );
        metrics::record_signal("response", "accepted");
        metrics::record_transition(ExchangeState::Synthesized.as_str());

        self.record(&exchange);
        self.persist();
        self.emitter.emit(exchange.to_ready());
    }

    // ===== Transitions (entry lock held) =====

    fn apply_body(&self, entry: &mut LiveEntry, body: Value, schema: &Schema) -> Effect {
        if entry.retired || entry.body_seen {
            return Effect::None;
        }
        entry.body_seen = true;

        let request = &entry.exchange.request;
        if matcher::verdict(&request.url, &request.method, Some(&body), schema)
            == MatchVerdict::Rejected
        {
            let was_emitted = entry.exchange.state == ExchangeState::Synthesized;
            entry.retire();
            entry.exchange.state = ExchangeState::Abandoned;
            metrics::record_transition(ExchangeState::Abandoned.as_str());
            info!(
                correlation_key = %entry.exchange.correlation_key,
                "Request body does not match the schema, abandoning exchange"
            );
            if was_emitted {
                self.forget(&entry.exchange);
            }
            return Effect::Abandon {
                history_changed: was_emitted,
            };
        }

        entry.exchange.request.body = body;

        match entry.exchange.state {
            ExchangeState::Pending => match entry.buffered_response.take() {
                Some(response) => self.complete(entry, response),
                None => {
                    entry.exchange.state = ExchangeState::BodyReady;
                    metrics::record_transition(ExchangeState::BodyReady.as_str());
                    debug!(correlation_key = %entry.exchange.correlation_key, "Request body attached");
                    Effect::None
                }
            },
            ExchangeState::Synthesized => {
                self.record(&entry.exchange);
                Effect::Persist
            }
            _ => Effect::None,
        }
    }

    fn attach_response(&self, entry: &mut LiveEntry, response: ResponseData) -> Effect {
        if entry.retired {
            return Effect::None;
        }
        match entry.exchange.state {
            ExchangeState::Pending => {
                debug!(
                    correlation_key = %entry.exchange.correlation_key,
                    "Response arrived before request body, buffering"
                );
                metrics::record_signal("response", "buffered");
                entry.buffered_response = Some(response);
                Effect::None
            }
            ExchangeState::BodyReady => {
                metrics::record_signal("response", "accepted");
                self.complete(entry, response)
            }
            ExchangeState::Synthesized if entry.exchange.placeholder => {
                info!(
                    correlation_key = %entry.exchange.correlation_key,
                    "Real response replaces placeholder"
                );
                metrics::record_signal("response", "accepted");
                self.complete(entry, response)
            }
            _ => {
                metrics::record_signal("response", "ignored");
                Effect::None
            }
        }
    }

    fn complete(&self, entry: &mut LiveEntry, response: ResponseData) -> Effect {
        entry.retire();
        let exchange = &mut entry.exchange;
        exchange.response = Some(response);
        exchange.state = ExchangeState::Completed;
        exchange.placeholder = false;
        exchange.revision += 1;

        info!(
            correlation_key = %exchange.correlation_key,
            schema_id = %exchange.schema_id,
            revision = exchange.revision,
            "Exchange completed"
        );
        metrics::record_transition(ExchangeState::Completed.as_str());

        self.record(exchange);
        Effect::Emit {
            ready: exchange.to_ready(),
            retire: true,
        }
    }

    // ===== Timers =====

    fn start_wait_timer(self: &Arc<Self>, key: &str, entry: &EntryRef) -> TimerHandle {
        let session = Arc::downgrade(self);
        let entry = Arc::downgrade(entry);
        let key = key.to_string();
        self.scheduler.schedule(
            self.config.wait_timeout(),
            Box::pin(async move {
                if let (Some(session), Some(entry)) = (session.upgrade(), entry.upgrade()) {
                    session.on_wait_timer(&key, &entry);
                }
            }),
        )
    }

    fn on_wait_timer(self: &Arc<Self>, key: &str, entry: &EntryRef) {
        let effect = {
            let mut guard = entry.lock();
            guard.timer = None;
            if guard.retired {
                return;
            }
            let state = guard.exchange.state;
            match state {
                ExchangeState::Pending if guard.buffered_response.is_some() => {
                    match guard.buffered_response.take() {
                        Some(response) => self.complete(&mut guard, response),
                        None => Effect::None,
                    }
                }
                ExchangeState::Pending | ExchangeState::BodyReady => {
                    let exchange = &mut guard.exchange;
                    exchange.response = Some(ResponseData::placeholder());
                    exchange.state = ExchangeState::Synthesized;
                    exchange.placeholder = true;
                    exchange.revision += 1;

                    info!(
                        correlation_key = key,
                        schema_id = %exchange.schema_id,
                        timeout_ms = self.config.wait_timeout_ms,
                        "No response in time, synthesized placeholder"
                    );
                    metrics::record_transition(ExchangeState::Synthesized.as_str());

                    self.record(exchange);
                    let ready = exchange.to_ready();
                    guard.timer = Some(self.start_late_window_timer(key, entry));
                    Effect::Emit {
                        ready,
                        retire: false,
                    }
                }
                _ => Effect::None,
            }
        };
        self.finish(key, entry, effect);
    }

    fn start_late_window_timer(self: &Arc<Self>, key: &str, entry: &EntryRef) -> TimerHandle {
        let session = Arc::downgrade(self);
        let entry = Arc::downgrade(entry);
        let key = key.to_string();
        self.scheduler.schedule(
            self.config.late_response_window(),
            Box::pin(async move {
                if let (Some(session), Some(entry)) = (session.upgrade(), entry.upgrade()) {
                    session.on_late_window_closed(&key, &entry);
                }
            }),
        )
    }

    fn on_late_window_closed(&self, key: &str, entry: &EntryRef) {
        let expired = {
            let mut guard = entry.lock();
            guard.timer = None;
            if !guard.retired && guard.is_placeholder() {
                guard.retire();
                true
            } else {
                false
            }
        };
        if expired {
            debug!(correlation_key = key, "Placeholder exchange leaves the live table");
            self.remove_live(key, entry);
        }
    }

    fn buffer_orphan(
        self: &Arc<Self>,
        orphans: &mut HashMap<String, Orphan>,
        key: &str,
        update: impl FnOnce(&mut Orphan),
    ) {
        let orphan = orphans.entry(key.to_string()).or_default();
        update(orphan);
        if orphan.timer.is_none() {
            let session = Arc::downgrade(self);
            let owned_key = key.to_string();
            orphan.timer = Some(self.scheduler.schedule(
                self.config.response_buffer_ttl(),
                Box::pin(async move {
                    if let Some(session) = session.upgrade() {
                        session.expire_orphan(&owned_key);
                    }
                }),
            ));
        }
    }

    fn expire_orphan(&self, key: &str) {
        if self.orphans.lock().remove(key).is_some() {
            debug!(correlation_key = key, "Discarding buffered signals, no request appeared");
        }
    }

    // ===== Bookkeeping =====

    fn finish(&self, key: &str, entry: &EntryRef, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Persist => self.persist(),
            Effect::Emit { ready, retire } => {
                if retire {
                    self.remove_live(key, entry);
                }
                self.persist();
                self.emitter.emit(ready);
            }
            Effect::Abandon { history_changed } => {
                self.remove_live(key, entry);
                if history_changed {
                    self.persist();
                }
            }
        }
    }

    fn remove_live(&self, key: &str, entry: &EntryRef) {
        let mut live = self.live.write();
        if live
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            live.remove(key);
        }
        metrics::set_live_exchanges(live.len());
    }

    /// Insert or update an exchange in history. An older revision never
    /// overwrites a newer one.
    fn record(&self, exchange: &CapturedExchange) {
        let mut history = self.history.write();
        let list = history.entry(exchange.schema_id.clone()).or_default();
        match list.iter_mut().find(|e| same_exchange(e, exchange)) {
            Some(existing) if existing.revision <= exchange.revision => *existing = exchange.clone(),
            Some(_) => {}
            None => list.push(exchange.clone()),
        }
    }

    fn forget(&self, exchange: &CapturedExchange) {
        if let Some(list) = self.history.write().get_mut(&exchange.schema_id) {
            list.retain(|e| !same_exchange(e, exchange));
        }
    }

    fn persist(&self) {
        let _guard = self.persist_lock.lock();
        let snapshot: Snapshot = self
            .history
            .read()
            .values()
            .flatten()
            .map(|e| (snapshot_key(e), e.clone()))
            .collect();
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Failed to persist exchange snapshot: {:#}", e);
        }
    }

    fn restore(&self) -> anyhow::Result<usize> {
        let snapshot = self.store.load()?;
        let mut restored: Vec<CapturedExchange> = snapshot
            .into_values()
            .filter(|e| e.state.is_ready())
            .collect();
        restored.sort_by(|a, b| {
            a.request
                .captured_at
                .cmp(&b.request.captured_at)
                .then_with(|| a.correlation_key.cmp(&b.correlation_key))
        });

        let count = restored.len();
        for exchange in &restored {
            self.record(exchange);
        }
        info!(count, "Restored captured exchanges");
        Ok(count)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for entry in self.live.get_mut().values() {
            entry.lock().cancel_timer();
        }
        for orphan in self.orphans.get_mut().values() {
            if let Some(timer) = &orphan.timer {
                timer.cancel();
            }
        }
    }
}

/// A reused correlation key starts a new exchange; the request timestamp
/// tells the two apart.
fn same_exchange(a: &CapturedExchange, b: &CapturedExchange) -> bool {
    a.correlation_key == b.correlation_key && a.request.captured_at == b.request.captured_at
}

/// Snapshot entries follow the same identity as history.
fn snapshot_key(exchange: &CapturedExchange) -> String {
    format!(
        "{}@{}",
        exchange.correlation_key,
        exchange.request.captured_at.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryExchangeStore;
    use crate::delivery::LogSink;
    use crate::scheduler::TokioScheduler;
    use serde_json::json;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn session() -> (CorrelatorSession, Arc<InMemoryExchangeStore>) {
        session_with_store(Arc::new(InMemoryExchangeStore::new()))
    }

    fn session_with_store(
        store: Arc<InMemoryExchangeStore>,
    ) -> (CorrelatorSession, Arc<InMemoryExchangeStore>) {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current().unwrap());
        let emitter = Emitter::new(
            Arc::new(LogSink),
            RetryPolicy::default(),
            store.clone(),
            scheduler.clone(),
        );
        (
            CorrelatorSession::new(&CorrelatorConfig::default(), emitter, store.clone(), scheduler),
            store,
        )
    }

    fn gql_schema() -> Schema {
        Schema::new("s1", "api.example.com/gql", "POST").with_body_query("{ me { id } }")
    }

    const URL: &str = "https://api.example.com/gql";

    #[tokio::test(start_paused = true)]
    async fn test_ignores_requests_without_schema() {
        let (session, _) = session();
        session.on_request_started("1", URL, "POST", Headers::new());
        assert_eq!(session.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_non_matching_requests() {
        let (session, _) = session();
        session.activate_schema(gql_schema());
        session.on_request_started("1", "https://other.com/", "POST", Headers::new());
        session.on_request_started("2", URL, "GET", Headers::new());
        assert_eq!(session.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_exchange_is_persisted() {
        let (session, store) = session();
        session.activate_schema(gql_schema());

        session.on_request_started("1", URL, "POST", Headers::new());
        session.on_request_body("1", json!({"query": "{ me { id } }"}));
        session.on_response(Some("1"), URL, "POST", 200, Headers::new(), json!({"data": {"me": {"id": 1}}}));

        assert_eq!(session.live_count(), 0);
        let completed = session.get_completed_exchanges("s1");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].state, ExchangeState::Completed);
        assert_eq!(completed[0].revision, 1);
        assert_eq!(completed[0].response.as_ref().unwrap().status_text, "OK");

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.keys().all(|k| k.starts_with("1@")));
        assert_eq!(snapshot.values().next().unwrap().correlation_key, "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_key_survives_restore() {
        let (session, store) = session();
        let mut first = CapturedExchange::new("k", "s1", RequestData::new(URL, "POST", Headers::new()));
        first.state = ExchangeState::Completed;
        first.revision = 1;
        first.response = Some(ResponseData::new(200, "OK", Headers::new(), json!({"n": 1})));
        let mut second = first.clone();
        second.request.captured_at = first.request.captured_at + chrono::Duration::seconds(1);
        second.response = Some(ResponseData::new(200, "OK", Headers::new(), json!({"n": 2})));

        session.inner.record(&first);
        session.inner.record(&second);
        session.inner.persist();
        assert_eq!(session.get_completed_exchanges("s1").len(), 2);
        assert_eq!(store.load().unwrap().len(), 2);

        let (restored, _) = session_with_store(store);
        assert_eq!(restored.restore().unwrap(), 2);
        let bodies: Vec<_> = restored
            .get_completed_exchanges("s1")
            .iter()
            .map(|e| e.response.as_ref().unwrap().body["n"].clone())
            .collect();
        assert_eq!(bodies, vec![json!(1), json!(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_rejection_abandons() {
        let (session, _) = session();
        session.activate_schema(gql_schema());

        session.on_request_started("1", URL, "POST", Headers::new());
        assert_eq!(session.live_count(), 1);
        session.on_request_body("1", json!({"query": "{ viewer { login } }"}));
        assert_eq!(session.live_count(), 0);

        session.on_response(Some("1"), URL, "POST", 200, Headers::new(), json!({}));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(session.get_completed_exchanges("s1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_abandons_live_exchanges() {
        let (session, _) = session();
        session.activate_schema(gql_schema());
        session.on_request_started("1", URL, "POST", Headers::new());
        session.activate_schema(Schema::new("s2", "other.com", "GET"));
        assert_eq!(session.live_count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(session.get_completed_exchanges("s1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_drops_history() {
        let (session, store) = session();
        session.activate_schema(gql_schema());
        session.on_request_started("1", URL, "POST", Headers::new());
        session.on_request_body("1", Value::Null);
        session.on_response(Some("1"), URL, "POST", 200, Headers::new(), json!({}));
        assert_eq!(session.get_completed_exchanges("s1").len(), 1);

        session.clear_all();
        assert!(session.get_completed_exchanges("s1").is_empty());
        assert!(store.load().unwrap().is_empty());
        assert!(session.active_schema().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_keeps_multiple_exchanges() {
        let (session, _) = session();
        session.activate_schema(gql_schema());
        for key in ["1", "2"] {
            session.on_request_started(key, URL, "POST", Headers::new());
            session.on_request_body(key, Value::Null);
            session.on_response(Some(key), URL, "POST", 200, Headers::new(), json!({"n": key}));
        }
        let completed = session.get_completed_exchanges("s1");
        let keys: Vec<_> = completed.iter().map(|e| e.correlation_key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2"]);
        assert_eq!(session.current_exchange("s1").unwrap().correlation_key, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_signal() {
        let (session, _) = session();
        session.activate_schema(gql_schema());
        let signals: Vec<CaptureSignal> = serde_json::from_value(json!([
            {"type": "requestStarted", "correlationKey": "9", "url": URL, "method": "POST"},
            {"type": "requestBody", "correlationKey": "9", "body": {"query": "{ me { id } }"}},
            {"type": "response", "correlationKey": "9", "url": URL, "method": "POST", "status": 201, "body": {}}
        ]))
        .unwrap();
        for signal in signals {
            session.apply(signal);
        }
        let exchange = session.current_exchange("s1").unwrap();
        assert_eq!(exchange.response.as_ref().unwrap().status, 201);
        assert_eq!(exchange.response.as_ref().unwrap().status_text, "Created");
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_body_bytes_are_decoded() {
        let (session, _) = session();
        session.activate_schema(gql_schema());
        session.on_request_started("1", URL, "POST", Headers::new());
        session.on_request_body_bytes("1", Bytes::from_static(br#"{"query":"{ me { id } }"}"#));
        session.on_response(Some("1"), URL, "POST", 200, Headers::new(), json!({}));
        let exchange = session.current_exchange("s1").unwrap();
        assert_eq!(exchange.request.body["query"], json!("{ me { id } }"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_activation_logs_diagnostics() {
        let (session, _) = session();
        let schema =
            Schema::from_value(json!({"id": 7, "request": {"url": "", "method": "GET"}})).unwrap();
        session.activate_schema(schema);

        assert!(logs_contain("Monitoring for schema"));
        assert!(logs_contain("Schema diagnostic"));
        assert_eq!(session.active_schema().unwrap().id, "7");
    }
}
