use imprest_core::approvals::{ApprovalGate, Decision};
use imprest_core::audit::{AuditSink, InMemoryAuditSink, TracingAuditSink};
use imprest_core::domain::advance::AdvanceId;
use imprest_core::domain::profile::ActorId;
use imprest_core::errors::AdvanceError;
use imprest_db::repositories::{ProfileRepository, SqlAdvanceRepository, SqlProfileRepository};

use crate::commands::{with_migrated_pool, CommandResult, StepFailure};

/// Exit code for decisions the gate refused (not found, forbidden, conflict,
/// over limit, invalid input).
const REFUSED: u8 = 7;

pub fn approve(advance_id: &str, actor: &str) -> CommandResult {
    run("approve", advance_id, actor, Decision::Approve)
}

pub fn reject(advance_id: &str, actor: &str, reason: &str) -> CommandResult {
    run("reject", advance_id, actor, Decision::Reject { reason: reason.to_owned() })
}

/// Operator path to the approval gate. The actor's stored approval limit
/// applies exactly as it does over HTTP. The gate's audit event is logged
/// and attached to the printed outcome.
fn run(command: &'static str, advance_id: &str, actor: &str, decision: Decision) -> CommandResult {
    let actor_id = match ActorId::parse(actor) {
        Ok(actor_id) => actor_id,
        Err(error) => {
            return CommandResult::failure(command, "invalid_argument", error.to_string(), REFUSED)
        }
    };
    let advance_id = AdvanceId(advance_id.trim().to_owned());
    let correlation_id = format!("cli-{command}-{advance_id}");

    let result = with_migrated_pool(command, |_, pool| async move {
        let profile = SqlProfileRepository::new(pool.clone())
            .find_by_id(&actor_id)
            .await
            .map_err(|error| ("transport_failure", error.to_string(), 4u8))?
            .ok_or_else(|| {
                ("unknown_actor", format!("profile `{actor_id}` does not exist"), REFUSED)
            })?;

        let advances = SqlAdvanceRepository::new(pool);
        let audit = InMemoryAuditSink::default();
        let gate = ApprovalGate::new(&advances)
            .with_audit(&audit)
            .with_correlation_id(correlation_id.as_str());

        let decided = gate.decide(&profile.as_actor(), &advance_id, decision).await;
        Ok::<_, StepFailure>((decided, audit.events().pop()))
    });

    let (decided, event) = match result {
        Ok(decided) => decided,
        Err(failure) => return failure,
    };
    let outcome = decided
        .map(|advance| format!("advance `{}` is now {}", advance.id, advance.status))
        .map_err(refusal);

    match event {
        Some(event) => {
            TracingAuditSink.emit(event.clone());
            CommandResult::audited(command, outcome, event)
        }
        None => match outcome {
            Ok(message) => CommandResult::success(command, message),
            Err((error_class, message, exit_code)) => {
                CommandResult::failure(command, error_class, message, exit_code)
            }
        },
    }
}

fn refusal(error: AdvanceError) -> StepFailure {
    let exit_code = if error.is_business_refusal() { REFUSED } else { 4 };
    (error.kind(), error.to_string(), exit_code)
}
