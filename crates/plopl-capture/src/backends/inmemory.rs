use crate::capture::ExchangeReady;
use crate::store::{ExchangeStore, Snapshot};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct State {
    snapshot: Snapshot,
    undelivered: Vec<ExchangeReady>,
}

/// In-memory implementation of ExchangeStore
///
/// Keeps the snapshot for the lifetime of the process only. Useful for
/// testing, replay and single-run captures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExchangeStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExchangeStore for InMemoryExchangeStore {
    fn load(&self) -> Result<Snapshot> {
        Ok(self.state.lock().snapshot.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        self.state.lock().snapshot = snapshot.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.snapshot.clear();
        state.undelivered.clear();
        Ok(())
    }

    fn put_undelivered(&self, ready: &ExchangeReady) -> Result<()> {
        self.state.lock().undelivered.push(ready.clone());
        Ok(())
    }

    fn take_undelivered(&self) -> Result<Vec<ExchangeReady>> {
        Ok(std::mem::take(&mut self.state.lock().undelivered))
    }
}
