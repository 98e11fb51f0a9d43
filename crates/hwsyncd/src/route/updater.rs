//! Batched route updates.

use super::backend::{RibBackend, RouteBatches};
use super::table::{RouteContext, RouteTable};
use super::types::{AddDelRoutes, ProgramReport, RouteNextHopEntry};
use crate::debug_log;
use sonic_orch_common::OrchResult;
use sonic_types::{ClientId, IpPrefix, RouterId};

/// Accumulates route changes until `program()` flushes them.
#[derive(Debug, Default)]
pub struct RouteUpdater {
    backend: RibBackend,
    pending: RouteBatches,
}

impl RouteUpdater {
    pub fn new(backend: RibBackend) -> Self {
        Self {
            backend,
            pending: RouteBatches::new(),
        }
    }

    pub fn backend(&self) -> RibBackend {
        self.backend
    }

    pub fn add_route(
        &mut self,
        router: RouterId,
        client: ClientId,
        prefix: IpPrefix,
        entry: RouteNextHopEntry,
    ) {
        self.pending
            .entry((router, client))
            .or_default()
            .add(prefix, entry);
    }

    pub fn del_route(&mut self, router: RouterId, client: ClientId, prefix: IpPrefix) {
        self.pending
            .entry((router, client))
            .or_default()
            .delete(prefix);
    }

    /// Drops whatever is queued for `(router, client)`. Returns the number
    /// of operations dropped.
    pub fn discard(&mut self, router: RouterId, client: ClientId) -> usize {
        self.pending
            .remove(&(router, client))
            .map_or(0, |batch| batch.len())
    }

    /// Queued operations across all batches.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(AddDelRoutes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(AddDelRoutes::is_empty)
    }

    pub fn pending(&self, router: RouterId, client: ClientId) -> Option<&AddDelRoutes> {
        self.pending.get(&(router, client))
    }

    /// Flushes everything queued through the configured backend.
    ///
    /// On success the queue is empty afterwards. On failure the queue is
    /// kept as it was so the caller can retry the flush; re-applying an
    /// operation that already landed makes no driver call.
    pub fn program(
        &mut self,
        table: &mut RouteTable,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<ProgramReport> {
        if self.is_empty() {
            return Ok(ProgramReport::default());
        }
        let batches = std::mem::take(&mut self.pending);
        debug_log!(
            "RouteUpdater",
            backend = %self.backend,
            batches = batches.len(),
            "flushing route batches"
        );
        match self.backend.program(&batches, table, ctx) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.pending = batches;
                Err(e)
            }
        }
    }
}
