use crate::commands::{with_migrated_pool, CommandResult};
use imprest_db::DemoSeedDataset;

/// Loads the demo organisation. With `reset`, previously seeded rows (and any
/// decisions taken on them) are removed first.
pub fn run(reset: bool) -> CommandResult {
    let result = with_migrated_pool("seed", |_, pool| async move {
        if reset {
            DemoSeedDataset::clean(&pool)
                .await
                .map_err(|error| ("seed_reset", error.to_string(), 5u8))?;
        }

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            return Err(("seed_verification", failure_message(&verification.checks), 6u8));
        }
        Ok(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: profiles [{}], advances [{}]",
                seeded.profiles.join(", "),
                seeded.advances.join(", ")
            ),
        ),
        Err(failure) => failure,
    }
}

fn failure_message(checks: &[(&str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!(
            "seed verification failed for checks: {} \
             (rerun with --reset to restore the demo state)",
            failed.join(", ")
        )
    }
}
