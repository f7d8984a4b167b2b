use chrono::{SecondsFormat, Utc};
use imprest_core::domain::profile::ActorId;
use imprest_core::session::Session;
use imprest_db::repositories::{
    ProfileRepository, SessionRepository, SqlProfileRepository, SqlSessionRepository,
};

use crate::commands::{with_migrated_pool, CommandResult};

/// Issues a bearer session for an existing profile and prints the raw token.
/// Only the token digest is stored.
pub fn run(profile: &str) -> CommandResult {
    let profile_id = match ActorId::parse(profile) {
        Ok(profile_id) => profile_id,
        Err(error) => {
            return CommandResult::failure("token", "invalid_argument", error.to_string(), 7)
        }
    };

    let result = with_migrated_pool("token", |config, pool| async move {
        let exists = SqlProfileRepository::new(pool.clone())
            .find_by_id(&profile_id)
            .await
            .map_err(|error| ("transport_failure", error.to_string(), 4u8))?
            .is_some();
        if !exists {
            return Err(("unknown_profile", format!("profile `{profile_id}` does not exist"), 7u8));
        }

        let (token, session) = Session::issue(profile_id, config.session_ttl(), Utc::now());
        SqlSessionRepository::new(pool)
            .insert(&session)
            .await
            .map_err(|error| ("transport_failure", error.to_string(), 4u8))?;
        Ok((token.expose().to_owned(), session))
    });

    match result {
        Ok((token, session)) => CommandResult::success(
            "token",
            format!(
                "token={token} profile={} expires_at={}",
                session.profile_id,
                session.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        ),
        Err(failure) => failure,
    }
}
