//! The daemon loop.

use super::agent::SwitchAgent;
use super::state::ControlPlaneUpdate;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::lag::{LinkEvent, LinkEventHandler};
use crate::{audit_log, debug_log, error_log, info_log, warn_log};
use sonic_orch_common::{OrchError, OrchResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs the agent until both channels close or `shutdown` fires.
///
/// Control-plane updates are applied in order on this task. Link events are
/// handled on a separate task so a link-down never waits behind a route
/// flush. A fatal error stops both and is returned; resource faults are
/// counted and the loop carries on. On a clean exit the agent is handed
/// back for inspection.
pub async fn run(
    mut agent: SwitchAgent,
    mut updates: mpsc::Receiver<ControlPlaneUpdate>,
    link_events: mpsc::Receiver<LinkEvent>,
    shutdown: CancellationToken,
) -> OrchResult<SwitchAgent> {
    audit_log!(
        AuditRecord::new(AuditCategory::SystemLifecycle, "SwitchAgent", "run_loop")
            .with_outcome(AuditOutcome::InProgress)
    );

    let link_task = tokio::spawn(link_loop(
        agent.link_event_handler(),
        link_events,
        shutdown.clone(),
    ));

    let result = loop {
        let update = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info_log!("SwitchAgent", "shutdown requested");
                break Ok(());
            }
            update = updates.recv() => update,
        };
        let Some(update) = update else {
            debug_log!("SwitchAgent", "control-plane channel closed");
            break Ok(());
        };

        let kind = update.kind();
        match agent.apply(update) {
            Ok(()) => agent.stats.updates_applied += 1,
            Err(e) if e.is_fatal() => {
                error_log!("SwitchAgent", kind = kind, error = %e, "fatal error, stopping");
                audit_log!(fatal_error_record(kind, &e));
                shutdown.cancel();
                break Err(e);
            }
            Err(e) => {
                agent.stats.updates_failed += 1;
                warn_log!("SwitchAgent", kind = kind, error = %e, "update failed");
            }
        }
    };

    match link_task.await {
        Ok(handled) => agent.stats.link_events_handled += handled,
        Err(e) => warn_log!("SwitchAgent", error = %e, "link event task aborted"),
    }

    let outcome = if result.is_ok() {
        AuditOutcome::Success
    } else {
        AuditOutcome::Failure
    };
    audit_log!(
        AuditRecord::new(AuditCategory::SystemLifecycle, "SwitchAgent", "run_loop")
            .with_outcome(outcome)
            .with_details(serde_json::json!({
                "updates_applied": agent.stats.updates_applied,
                "updates_failed": agent.stats.updates_failed,
                "link_events_handled": agent.stats.link_events_handled,
            }))
    );

    result.map(|()| agent)
}

fn fatal_error_record(kind: &str, error: &OrchError) -> AuditRecord {
    AuditRecord::new(AuditCategory::ErrorCondition, "SwitchAgent", "apply_update")
        .with_details(serde_json::json!({ "update": kind }))
        .with_error(error.to_string())
}

async fn link_loop(
    handler: LinkEventHandler,
    mut events: mpsc::Receiver<LinkEvent>,
    shutdown: CancellationToken,
) -> u64 {
    let mut handled = 0;
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        match handler.handle(event) {
            Ok(outcome) => debug_log!("LinkEvents", event = ?event, outcome = ?outcome, "link event handled"),
            Err(e) => warn_log!("LinkEvents", event = ?event, error = %e, "link event failed"),
        }
        handled += 1;
    }
    handled
}
