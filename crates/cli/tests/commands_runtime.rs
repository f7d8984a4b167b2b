use std::env;
use std::sync::{Mutex, OnceLock};

use imprest_cli::commands::{decide, migrate, seed, token};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("IMPREST_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("IMPREST_DATABASE_URL", "postgres://localhost/imprest")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_profiles_and_advances() {
    with_env(&[("IMPREST_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("u-maria"));
        assert!(message.contains("adv-demo-over-limit"));
    });
}

#[test]
fn seed_is_idempotent_on_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("IMPREST_DATABASE_URL", url.as_str())], || {
        let first = seed::run(false);
        let second = seed::run(false);
        assert_eq!(first.exit_code, 0, "{}", first.output);
        assert_eq!(second.exit_code, 0, "{}", second.output);
        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );
    });
}

#[test]
fn operator_decisions_go_through_the_gate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("IMPREST_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run(false).exit_code, 0);

        let approved = decide::approve("adv-demo-pending", "u-maria");
        assert_eq!(approved.exit_code, 0, "{}", approved.output);
        let payload = parse_payload(&approved.output);
        assert!(payload["message"].as_str().unwrap_or_default().contains("is now approved"));
        assert_eq!(payload["audit"]["outcome"], "success");
        assert_eq!(payload["audit"]["metadata"]["status"], "approved");

        let again = decide::reject("adv-demo-pending", "u-maria", "too late");
        assert_eq!(again.exit_code, 7);
        assert_eq!(parse_payload(&again.output)["error_class"], "conflict");

        let over_limit = decide::approve("adv-demo-over-limit", "u-maria");
        assert_eq!(over_limit.exit_code, 7);
        assert_eq!(parse_payload(&over_limit.output)["error_class"], "limit_exceeded");

        let stranger = decide::approve("adv-demo-over-limit", "u-ana");
        assert_eq!(parse_payload(&stranger.output)["error_class"], "forbidden");

        let unknown = decide::approve("adv-demo-over-limit", "nobody");
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_actor");

        // The decided advance no longer matches its seeded shape.
        let reseed = seed::run(false);
        assert_eq!(reseed.exit_code, 6);
        assert_eq!(seed::run(true).exit_code, 0);
    });
}

#[test]
fn refused_decisions_carry_their_audit_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("IMPREST_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run(false).exit_code, 0);

        let over_limit = parse_payload(&decide::approve("adv-demo-over-limit", "u-maria").output);
        let audit = &over_limit["audit"];
        assert_eq!(audit["event_type"], "advance.approve");
        assert_eq!(audit["outcome"], "rejected");
        assert_eq!(audit["actor"], "u-maria");
        assert_eq!(audit["advance_id"], "adv-demo-over-limit");
        assert_eq!(audit["correlation_id"], "cli-approve-adv-demo-over-limit");
        assert_eq!(audit["metadata"]["error_kind"], "limit_exceeded");

        let stranger = parse_payload(&decide::reject("adv-demo-pending", "u-ana", "no").output);
        assert_eq!(stranger["audit"]["metadata"]["error_kind"], "forbidden");

        // No gate call happens for an unknown actor, so nothing is audited.
        let unknown = parse_payload(&decide::approve("adv-demo-pending", "nobody").output);
        assert_eq!(unknown["error_class"], "unknown_actor");
        assert!(unknown.get("audit").is_none());
    });
}

#[test]
fn token_requires_an_existing_profile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("IMPREST_DATABASE_URL", url.as_str())], || {
        let missing = token::run("u-ana");
        assert_eq!(missing.exit_code, 7);
        assert_eq!(parse_payload(&missing.output)["error_class"], "unknown_profile");

        assert_eq!(seed::run(false).exit_code, 0);
        let issued = token::run("u-ana");
        assert_eq!(issued.exit_code, 0, "{}", issued.output);
        let payload = parse_payload(&issued.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("token="));
        assert!(message.contains("profile=u-ana"));
    });
}

fn file_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("imprest.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "IMPREST_DATABASE_URL",
        "IMPREST_DATABASE_MAX_CONNECTIONS",
        "IMPREST_DATABASE_TIMEOUT_SECS",
        "IMPREST_SERVER_BIND_ADDRESS",
        "IMPREST_SERVER_PORT",
        "IMPREST_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "IMPREST_AUTH_SESSION_TTL_HOURS",
        "IMPREST_LOGGING_LEVEL",
        "IMPREST_LOGGING_FORMAT",
        "IMPREST_LOG_LEVEL",
        "IMPREST_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
