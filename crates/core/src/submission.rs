use chrono::{DateTime, Utc};

use crate::domain::advance::{Advance, AdvanceDraft};
use crate::domain::profile::{ActorId, Profile, Team};
use crate::errors::AdvanceError;

/// Resolves the assigned approver for a new advance: the manager of the
/// requester's team.
pub fn resolve_approver(requester: &Profile, team: Option<&Team>) -> Result<ActorId, AdvanceError> {
    let Some(team) = team else {
        return Err(AdvanceError::InvalidArgument(format!(
            "`{}` is not a member of a team with an approver",
            requester.id
        )));
    };

    if requester.team_id.as_ref() != Some(&team.id) {
        return Err(AdvanceError::InvalidArgument(format!(
            "`{}` is not a member of team `{}`",
            requester.id, team.id.0
        )));
    }

    if team.manager_id == requester.id {
        return Err(AdvanceError::InvalidArgument(format!(
            "`{}` manages team `{}` and cannot approve their own advance",
            requester.id, team.id.0
        )));
    }

    Ok(team.manager_id.clone())
}

/// Builds the pending advance to persist. Nothing is written here.
pub fn prepare(
    requester: &Profile,
    team: Option<&Team>,
    draft: AdvanceDraft,
    now: DateTime<Utc>,
) -> Result<Advance, AdvanceError> {
    draft.validate().map_err(|error| AdvanceError::InvalidArgument(error.to_string()))?;
    let approver_id = resolve_approver(requester, team)?;

    Ok(Advance::pending(
        requester.id.clone(),
        approver_id,
        draft.amount,
        draft.purpose.trim(),
        now,
    ))
}
