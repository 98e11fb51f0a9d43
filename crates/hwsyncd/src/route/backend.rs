//! The two route programming backends.
//!
//! Legacy applies a flush all or nothing: the first failure undoes what the
//! flush already changed and fails the whole flush. Standalone applies each
//! prefix on its own and reports the ones that failed; only a fatal error
//! stops it.

use super::table::{RouteContext, RouteTable};
use super::types::{AddDelRoutes, ProgramReport, RouteFailure, RouteNextHopEntry};
use crate::{info_log, warn_log};
use serde::{Deserialize, Serialize};
use sonic_orch_common::OrchResult;
use sonic_types::{ClientId, IpPrefix, RouterId};
use std::collections::BTreeMap;
use std::fmt;

pub type RouteBatches = BTreeMap<(RouterId, ClientId), AddDelRoutes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RibBackend {
    #[default]
    Legacy,
    Standalone,
}

impl RibBackend {
    pub fn from_flag(standalone_rib: bool) -> Self {
        if standalone_rib {
            RibBackend::Standalone
        } else {
            RibBackend::Legacy
        }
    }

    pub(crate) fn program(
        self,
        batches: &RouteBatches,
        table: &mut RouteTable,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<ProgramReport> {
        match self {
            RibBackend::Legacy => program_legacy(batches, table, ctx),
            RibBackend::Standalone => program_standalone(batches, table, ctx),
        }
    }
}

impl fmt::Display for RibBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RibBackend::Legacy => f.write_str("legacy"),
            RibBackend::Standalone => f.write_str("standalone"),
        }
    }
}

enum RouteOp<'a> {
    Add(&'a RouteNextHopEntry),
    Delete,
}

/// Deletes before adds within each batch, batches in key order.
fn operations(
    batches: &RouteBatches,
) -> impl Iterator<Item = (RouterId, ClientId, IpPrefix, RouteOp<'_>)> {
    batches.iter().flat_map(|(&(router, client), batch)| {
        let deletes = batch
            .to_del
            .iter()
            .map(move |&prefix| (router, client, prefix, RouteOp::Delete));
        let adds = batch
            .to_add
            .iter()
            .map(move |(&prefix, entry)| (router, client, prefix, RouteOp::Add(entry)));
        deletes.chain(adds)
    })
}

fn apply(
    table: &mut RouteTable,
    ctx: &mut RouteContext<'_>,
    router: RouterId,
    client: ClientId,
    prefix: IpPrefix,
    op: &RouteOp<'_>,
) -> OrchResult<()> {
    match op {
        RouteOp::Add(entry) => table.add(router, client, prefix, (*entry).clone(), ctx),
        RouteOp::Delete => table.delete(router, client, prefix, ctx).map(|_| ()),
    }
}

struct Undo {
    router: RouterId,
    client: ClientId,
    prefix: IpPrefix,
    previous: Option<RouteNextHopEntry>,
}

fn program_legacy(
    batches: &RouteBatches,
    table: &mut RouteTable,
    ctx: &mut RouteContext<'_>,
) -> OrchResult<ProgramReport> {
    let mut undo_log: Vec<Undo> = Vec::new();
    for (router, client, prefix, op) in operations(batches) {
        let previous = table.client_entry(router, client, prefix).cloned();
        if let Err(e) = apply(table, ctx, router, client, prefix, &op) {
            warn_log!(
                "RouteUpdater",
                router = %router,
                prefix = %prefix,
                error = %e,
                undo = undo_log.len(),
                "legacy flush failed, undoing"
            );
            rollback(table, ctx, undo_log);
            return Err(e);
        }
        undo_log.push(Undo {
            router,
            client,
            prefix,
            previous,
        });
    }
    Ok(ProgramReport {
        applied: undo_log.len(),
        failed: Vec::new(),
    })
}

fn rollback(table: &mut RouteTable, ctx: &mut RouteContext<'_>, undo_log: Vec<Undo>) {
    for undo in undo_log.into_iter().rev() {
        let result = match undo.previous {
            Some(entry) => table.add(undo.router, undo.client, undo.prefix, entry, ctx),
            None => table
                .delete(undo.router, undo.client, undo.prefix, ctx)
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn_log!("RouteUpdater", router = %undo.router, prefix = %undo.prefix, error = %e, "undo failed");
        }
    }
}

fn program_standalone(
    batches: &RouteBatches,
    table: &mut RouteTable,
    ctx: &mut RouteContext<'_>,
) -> OrchResult<ProgramReport> {
    let mut report = ProgramReport::default();
    for (router, client, prefix, op) in operations(batches) {
        match apply(table, ctx, router, client, prefix, &op) {
            Ok(()) => report.applied += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn_log!("RouteUpdater", router = %router, prefix = %prefix, error = %e, "route failed");
                report.failed.push(RouteFailure {
                    router,
                    client,
                    prefix,
                    error: e.to_string(),
                });
            }
        }
    }
    if !report.is_complete() {
        info_log!(
            "RouteUpdater",
            applied = report.applied,
            failed = report.failed.len(),
            "standalone flush finished with failures"
        );
    }
    Ok(report)
}
