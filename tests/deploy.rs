// ABOUTME: Integration tests for the deployment orchestrator.
// ABOUTME: Exit codes, history records and phase ordering against scripted hosts.

mod support;

use chrono::{TimeZone, Utc};
use deckhand::config::{Config, NameMismatchPolicy, RegistryCredentials};
use deckhand::deploy::{DeployOptions, Interrupt, Orchestrator, Outcome, Phase, RollbackOutcome};
use deckhand::history::{DeployStatus, LocalHistory};
use deckhand::lock::LockInfo;
use deckhand::output::{Output, OutputMode};
use deckhand::prompt::Confirm;
use deckhand::rollback::RollbackError;
use deckhand::shell::{Shell, UnreachableShell};
use deckhand::transport::TransportMethod;
use deckhand::version::FixedClock;
use std::time::Duration;
use support::{FakeShell, Reply, ScriptedPrompt, healthy_remote, operator_machine, shop_config, with_previous};

const VERSION: &str = "abc1234-20250101-120000";

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap())
}

fn tar() -> DeployOptions {
    DeployOptions {
        method: TransportMethod::Tar,
        ..Default::default()
    }
}

async fn deploy(
    config: &Config,
    local: &FakeShell,
    remote: &dyn Shell,
    prompt: &dyn Confirm,
    options: &DeployOptions,
) -> Outcome {
    support::init_tracing();
    let output = Output::new(OutputMode::Quiet);
    let clock = clock();
    Orchestrator::new(config, local, remote, prompt, &output)
        .with_clock(&clock)
        .run(options)
        .await
        .expect("version resolves")
}

fn history(config: &Config) -> Vec<(String, DeployStatus)> {
    LocalHistory::new(config.local_state_dir())
        .recent(100)
        .unwrap()
        .into_iter()
        .map(|r| (r.version.to_string(), r.status))
        .collect()
}

fn unhealthy_api(remote: &FakeShell) {
    remote.on("localhost:3000/health", "{\"status\":\"starting\"}\n503");
}

mod success {
    use super::*;

    #[tokio::test]
    async fn tar_deploy_records_success_and_moves_pointer() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();

        let outcome = deploy(&config, &local, &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert!(matches!(outcome, Outcome::Deployed { .. }), "{outcome}");
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.version().as_str(), VERSION);

        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Success)]);
        let pointer = LocalHistory::new(config.local_state_dir())
            .current_version()
            .unwrap()
            .unwrap();
        assert_eq!(pointer.as_str(), VERSION);

        assert!(remote.called(&format!("|{}|success|tar", VERSION)));
        assert!(remote.called(&format!(
            "'{}' > \"/opt/shop/.deploy/current_version.tmp.$$\"",
            VERSION
        )));
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();

        deploy(&config, &local, &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        let archive = format!("/tmp/deckhand-shop-{}.tar.gz", VERSION);
        let order = [
            "set -C",
            "docker ps -a",
            &format!("upload {}", archive),
            "docker load -i",
            &format!("rm -f '{}'", archive),
            "fuser -k 3000/tcp",
            "docker compose -p 'shop' -f '/opt/shop/docker-compose.yml' down",
            &format!("APP_VERSION='{}'", VERSION),
            "localhost:3000/health",
            "versions.log",
            "rm -f '/opt/shop/.deploy/deploy.lock'",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|p| remote.position(p).unwrap_or_else(|| panic!("never ran {p}")))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted, "calls: {:#?}", remote.calls());
    }

    #[tokio::test]
    async fn new_version_is_tagged_latest_before_compose_up() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();

        deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        let tag = remote
            .position(&format!("docker tag 'shop-web:{}' 'shop-web:latest'", VERSION))
            .unwrap();
        let up = remote.position("up -d").unwrap();
        assert!(tag < up);
    }

    #[tokio::test]
    async fn skip_healthcheck_never_probes() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        unhealthy_api(&remote);
        let options = DeployOptions {
            skip_healthcheck: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert_eq!(outcome.exit_code(), 0);
        assert!(!remote.called("curl"));
    }

    #[tokio::test]
    async fn build_command_gets_the_version() {
        let state = tempfile::tempdir().unwrap();
        let mut config = shop_config(state.path());
        config.build.command = Some("docker compose build".to_string());
        let local = operator_machine();

        deploy(&config, &local, &healthy_remote(), &ScriptedPrompt::non_interactive(), &tar()).await;

        assert!(local.called(&format!(
            "export APP_VERSION='{}'; docker compose build",
            VERSION
        )));
    }

    #[tokio::test]
    async fn existing_deployment_is_backed_up_before_anything_stops() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert_eq!(outcome.exit_code(), 0);
        let backup = remote
            .position("./scripts/backup.sh '/opt/shop/backups' 7")
            .unwrap();
        assert!(backup < remote.position("down").unwrap());
    }

    #[tokio::test]
    async fn registry_deploy_logs_in_with_stdin_and_retags_on_target() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();
        let options = DeployOptions {
            method: TransportMethod::Registry,
            ..Default::default()
        };

        let outcome = deploy(&config, &local, &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert_eq!(outcome.exit_code(), 0, "{outcome}");
        assert!(local.called(&format!(
            "docker push 'registry.example.com/shop-api:{}'",
            VERSION
        )));
        assert!(local.inputs().iter().any(|(cmd, input)| {
            cmd.contains("--password-stdin") && input.as_slice() == b"s3cret"
        }));
        assert!(!local.calls().iter().any(|c| c.contains("s3cret")));
        assert!(remote.called(&format!(
            "docker tag 'registry.example.com/shop-api:{v}' 'shop-api:{v}'",
            v = VERSION
        )));
        assert!(remote.called(&format!("|{}|success|registry", VERSION)));
    }

    #[tokio::test]
    async fn pointer_left_behind_on_target_exits_2() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_exit("current_version.tmp", 1, "No space left on device");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Unrecorded { version, reason } => {
                assert_eq!(version.as_str(), VERSION);
                assert!(reason.contains("No space left on device"), "{reason}");
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(outcome.exit_code(), 2);
        // The operator machine still knows what is running.
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Success)]);
        assert!(remote.called(&format!("|{}|success|tar", VERSION)));
    }
}

mod failure {
    use super::*;

    #[tokio::test]
    async fn failed_health_with_successful_rollback_exits_1() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_sequence(
            "localhost:3000/health",
            vec![
                Reply::ok("{\"status\":\"starting\"}\n503"),
                Reply::ok("{\"status\":\"starting\"}\n503"),
                Reply::ok("{\"status\":\"healthy\"}\n200"),
            ],
        );

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Failed {
                phase: Phase::Health,
                rollback: RollbackOutcome::Restored(restored),
                ..
            } => assert_eq!(restored.as_str(), "v0"),
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(
            history(&config),
            vec![
                (VERSION.to_string(), DeployStatus::Failed),
                ("v0".to_string(), DeployStatus::Rollback),
            ]
        );
        assert!(remote.called("docker tag 'shop-api:v0' 'shop-api:latest'"));
        let pointer = LocalHistory::new(config.local_state_dir())
            .current_version()
            .unwrap();
        assert_eq!(pointer.map(|v| v.to_string()), Some("v0".to_string()));
    }

    #[tokio::test]
    async fn failed_health_with_failed_rollback_exits_2() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        unhealthy_api(&remote);

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                rollback: RollbackOutcome::Failed(RollbackError::Unhealthy { .. }),
                ..
            }
        ));
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
        assert!(remote.called(&format!("|{}|failed|tar", VERSION)));
    }

    #[tokio::test]
    async fn first_deployment_cannot_roll_back() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        unhealthy_api(&remote);

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                rollback: RollbackOutcome::Failed(RollbackError::NoPreviousVersion),
                ..
            }
        ));
        assert_eq!(outcome.exit_code(), 2);
        // No restore was attempted.
        assert_eq!(remote.count("up -d"), 1);
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
    }

    #[tokio::test]
    async fn rollback_needs_previous_images_on_target() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_exit("'shop-web:v0'", 1, "Error: No such image");
        unhealthy_api(&remote);

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match outcome {
            Outcome::Failed {
                rollback: RollbackOutcome::Failed(RollbackError::MissingArtifact { version, images }),
                ..
            } => {
                assert_eq!(version, "v0");
                assert_eq!(images, vec!["shop-web:v0".to_string()]);
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(remote.count("up -d"), 1);
    }

    #[tokio::test]
    async fn no_rollback_leaves_failed_version_and_exits_1() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        unhealthy_api(&remote);
        let options = DeployOptions {
            no_rollback: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                rollback: RollbackOutcome::Disabled,
                ..
            }
        ));
        assert_eq!(outcome.exit_code(), 1);
        assert!(!remote.called("shop-api:v0' 'shop-api:latest'"));
    }

    #[tokio::test]
    async fn start_failure_rolls_back() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_sequence(
            "up -d",
            vec![Reply::exit(1, "port is already allocated"), Reply::ok("")],
        );

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                phase: Phase::Start,
                rollback: RollbackOutcome::Restored(_),
                ..
            }
        ));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn stop_failure_is_only_a_warning() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote.on_exit(" down", 1, "no configuration file provided");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert_eq!(outcome.exit_code(), 0, "{outcome}");
    }

    #[tokio::test]
    async fn rollback_that_cannot_move_the_pointer_exits_2() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_sequence(
            "localhost:3000/health",
            vec![
                Reply::ok("{\"status\":\"starting\"}\n503"),
                Reply::ok("{\"status\":\"starting\"}\n503"),
                Reply::ok("{\"status\":\"healthy\"}\n200"),
            ],
        );
        remote.on_exit("current_version.tmp", 1, "Read-only file system");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Failed {
                rollback: RollbackOutcome::Failed(RollbackError::Unrecorded { version, .. }),
                ..
            } => assert_eq!(version, "v0"),
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(outcome.exit_code(), 2);
    }
}

mod aborts {
    use super::*;

    fn assert_untouched(remote: &FakeShell) {
        assert!(!remote.called("docker compose"), "calls: {:#?}", remote.calls());
        assert!(!remote.called("fuser"));
    }

    #[tokio::test]
    async fn small_backup_aborts_before_anything_stops() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on("du -sb", "51200\n");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Aborted { phase, reason, .. } => {
                assert_eq!(*phase, Phase::Backup);
                assert!(reason.contains("51200"), "{reason}");
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert_untouched(&remote);
        assert!(!remote.called("upload"));
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
    }

    #[tokio::test]
    async fn skip_backup_is_refused_without_a_human() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        let options = DeployOptions {
            skip_backup: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert!(matches!(outcome, Outcome::Aborted { phase: Phase::Backup, .. }));
        assert!(!remote.called("backup.sh"));
        assert_untouched(&remote);
    }

    #[tokio::test]
    async fn skip_backup_proceeds_after_typing_the_project_name() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        let prompt = ScriptedPrompt::answering(&["shop"]);
        let options = DeployOptions {
            skip_backup: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &prompt, &options).await;

        assert_eq!(outcome.exit_code(), 0, "{outcome}");
        assert!(!remote.called("backup.sh"));
        assert_eq!(prompt.asked().len(), 1);
    }

    #[tokio::test]
    async fn skip_backup_with_wrong_name_aborts() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        let options = DeployOptions {
            skip_backup: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::answering(&["y"]), &options).await;

        assert!(matches!(outcome, Outcome::Aborted { phase: Phase::Backup, .. }));
        assert_untouched(&remote);
    }

    #[tokio::test]
    async fn blocking_preflight_failure_aborts_non_interactive_runs() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote.on("test -e", "");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Aborted { phase, reason, .. } => {
                assert_eq!(*phase, Phase::Preflight);
                assert!(reason.contains("remote-paths"), "{reason}");
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert!(!remote.called("upload"));
        assert_untouched(&remote);
        // The lock is released on the abort path too.
        assert!(remote.called("rm -f '/opt/shop/.deploy/deploy.lock'"));
    }

    #[tokio::test]
    async fn operator_may_override_blocking_failures_interactively() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote.on("ss -ltnH 'sport = :3000'", "LISTEN 0 511 0.0.0.0:3000 0.0.0.0:*\n");
        let prompt = ScriptedPrompt::answering(&["y"]);

        let outcome = deploy(&config, &operator_machine(), &remote, &prompt, &tar()).await;

        assert_eq!(outcome.exit_code(), 0, "{outcome}");
        assert!(prompt.asked()[0].contains("ports"));
    }

    #[tokio::test]
    async fn operator_declining_blocking_failures_aborts() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote.on("ss -ltnH 'sport = :3000'", "LISTEN 0 511 0.0.0.0:3000 0.0.0.0:*\n");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::answering(&["n"]), &tar()).await;

        assert!(matches!(outcome, Outcome::Aborted { phase: Phase::Preflight, .. }));
        assert_untouched(&remote);
    }

    #[tokio::test]
    async fn name_mismatch_is_advisory_under_warn_policy() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote.on(
            "docker ps -a",
            r#"{"Names":"legacy-db","Image":"mongo:6","State":"running"}"#,
        );

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert_eq!(outcome.exit_code(), 0, "{outcome}");
    }

    #[tokio::test]
    async fn name_mismatch_blocks_under_fail_policy() {
        let state = tempfile::tempdir().unwrap();
        let mut config = shop_config(state.path());
        config.preflight.name_mismatch = NameMismatchPolicy::Fail;
        let remote = healthy_remote();
        remote.on(
            "docker ps -a",
            r#"{"Names":"legacy-db","Image":"mongo:6","State":"running"}"#,
        );

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Aborted { reason, .. } => assert!(reason.contains("naming"), "{reason}"),
            other => panic!("unexpected outcome: {other}"),
        }
    }

    #[tokio::test]
    async fn incomplete_registry_credentials_stop_before_any_push() {
        let state = tempfile::tempdir().unwrap();
        let mut config = shop_config(state.path());
        config.registry = RegistryCredentials::new("registry.example.com", "ci", "");
        let local = operator_machine();
        let remote = healthy_remote();
        let options = DeployOptions {
            method: TransportMethod::Registry,
            ..Default::default()
        };

        let outcome = deploy(&config, &local, &remote, &ScriptedPrompt::non_interactive(), &options).await;

        match &outcome {
            Outcome::Aborted { reason, .. } => assert!(reason.contains("transport"), "{reason}"),
            other => panic!("unexpected outcome: {other}"),
        }
        assert!(!local.called("docker push"));
        assert!(!local.called("docker login"));
    }

    #[tokio::test]
    async fn local_method_requires_local_target() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        let options = DeployOptions {
            method: TransportMethod::Local,
            ..Default::default()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert!(matches!(outcome, Outcome::Aborted { phase: Phase::Preflight, .. }));
    }

    #[tokio::test]
    async fn pinned_version_skips_build_and_needs_existing_images() {
        let state = tempfile::tempdir().unwrap();
        let mut config = shop_config(state.path());
        config.build.command = Some("docker compose build".to_string());
        let local = operator_machine();
        local.on_exit("'shop-api:v2.0.0'", 1, "Error: No such image");
        let remote = healthy_remote();
        let options = DeployOptions {
            version: Some("v2.0.0".to_string()),
            ..tar()
        };

        let outcome = deploy(&config, &local, &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert_eq!(outcome.version().as_str(), "v2.0.0");
        match &outcome {
            Outcome::Aborted { reason, .. } => assert!(reason.contains("artifacts"), "{reason}"),
            other => panic!("unexpected outcome: {other}"),
        }
        assert!(!local.called("git rev-parse"));
        assert!(!local.called("docker compose build"));
    }

    #[tokio::test]
    async fn transport_failure_cleans_up_and_needs_no_rollback() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_exit("docker load", 1, "unexpected EOF");

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        assert!(matches!(outcome, Outcome::Aborted { phase: Phase::Transport, .. }));
        assert_eq!(outcome.exit_code(), 1);
        assert!(remote.called(&format!("rm -f '/tmp/deckhand-shop-{}.tar.gz'", VERSION)));
        assert_untouched(&remote);
        assert!(remote.called(&format!("|{}|failed|tar", VERSION)));
    }

    #[tokio::test]
    async fn live_lock_held_elsewhere_aborts() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        let mut holder = LockInfo::new(&config.project);
        holder.holder = "ci-runner-7".to_string();
        remote
            .on_exit("set -C", 1, "")
            .on(
                "cat '/opt/shop/.deploy/deploy.lock'",
                &serde_json::to_string(&holder).unwrap(),
            );

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Aborted { phase, reason, .. } => {
                assert_eq!(*phase, Phase::Lock);
                assert!(reason.contains("ci-runner-7"), "{reason}");
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert!(!remote.called("docker ps"));
        // Never release somebody else's lock.
        assert!(!remote.called("rm -f '/opt/shop/.deploy/deploy.lock'"));
        // Recorded on this machine only.
        assert!(!remote.called("versions.log"));
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
    }

    #[tokio::test]
    async fn break_lock_takes_over_a_live_lock() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote
            .on_sequence("set -C", vec![Reply::exit(1, ""), Reply::ok("")])
            .on(
                "cat '/opt/shop/.deploy/deploy.lock'",
                &serde_json::to_string(&LockInfo::new(&config.project)).unwrap(),
            );
        let options = DeployOptions {
            break_lock: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert_eq!(outcome.exit_code(), 0, "{outcome}");
    }
}

mod interrupts {
    use super::*;

    #[tokio::test]
    async fn interrupt_during_backup_aborts_without_touching_the_target() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();
        with_previous(&remote, "v0");
        remote.on_hang("./scripts/backup.sh");

        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let output = Output::new(OutputMode::Quiet);
        let clock = clock();
        let prompt = ScriptedPrompt::non_interactive();
        let outcome = Orchestrator::new(&config, &local, &remote, &prompt, &output)
            .with_clock(&clock)
            .with_interrupt(interrupt)
            .run(&tar())
            .await
            .unwrap();

        match &outcome {
            Outcome::Aborted { phase, reason, .. } => {
                assert_eq!(*phase, Phase::Backup);
                assert!(reason.contains("interrupted"));
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert!(!remote.called("docker compose"));
        assert!(!remote.called("versions.log"));
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
    }

    #[tokio::test]
    async fn interrupt_after_start_runs_to_completion() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();

        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        // Fire while health checks poll: first api probe is slow to pass.
        remote.on_sequence(
            "localhost:3000/health",
            vec![
                Reply::ok("{\"status\":\"starting\"}\n503"),
                Reply::ok("{\"status\":\"healthy\"}\n200"),
            ],
        );
        let output = Output::new(OutputMode::Quiet);
        let clock = clock();
        let prompt = ScriptedPrompt::non_interactive();
        let orchestrator = Orchestrator::new(&config, &local, &remote, &prompt, &output)
            .with_clock(&clock)
            .with_interrupt(interrupt);

        let tar_path = tar();
        let run = orchestrator.run(&tar_path);
        tokio::pin!(run);
        // Let the run get past the point of no return, then interrupt.
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome.unwrap(),
                _ = tokio::time::sleep(Duration::from_millis(1)) => {
                    if remote.called("up -d") {
                        trigger.trigger();
                    }
                }
            }
        };

        assert!(matches!(outcome, Outcome::Deployed { .. }), "{outcome}");
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Success)]);
    }

    #[tokio::test]
    async fn interrupt_during_transport_removes_the_partial_archive() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();
        remote.on_hang("docker load");

        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let output = Output::new(OutputMode::Quiet);
        let clock = clock();
        let prompt = ScriptedPrompt::non_interactive();
        let outcome = Orchestrator::new(&config, &local, &remote, &prompt, &output)
            .with_clock(&clock)
            .with_interrupt(interrupt)
            .run(&tar())
            .await
            .unwrap();

        assert!(
            matches!(outcome, Outcome::Aborted { phase: Phase::Transport, .. }),
            "{outcome}"
        );
        assert_eq!(outcome.exit_code(), 1);
        assert!(remote.called(&format!("rm -f '/tmp/deckhand-shop-{}.tar.gz'", VERSION)));
        assert!(!remote.called("docker compose"));
        assert!(!remote.called("versions.log"));
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
    }
}

mod dry_run {
    use super::*;

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let local = operator_machine();
        let remote = healthy_remote();
        let options = DeployOptions {
            dry_run: true,
            ..tar()
        };

        let outcome = deploy(&config, &local, &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert!(matches!(outcome, Outcome::DryRun { clear: true, .. }));
        assert_eq!(outcome.exit_code(), 0);
        for mutation in ["set -C", ">>", "mv -f", "upload", "docker compose", "docker load", "backup.sh"] {
            assert!(!remote.called(mutation), "dry run ran {mutation}");
        }
        assert!(history(&config).is_empty());
        assert!(!state.path().join("history.log").exists());
    }

    #[tokio::test]
    async fn dry_run_with_blocking_failure_exits_1() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let remote = healthy_remote();
        remote.on_exit("true", 255, "Connection refused");
        let options = DeployOptions {
            dry_run: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &remote, &ScriptedPrompt::non_interactive(), &options).await;

        assert!(matches!(outcome, Outcome::DryRun { clear: false, .. }));
        assert_eq!(outcome.exit_code(), 1);
    }
}

mod unreachable {
    use super::*;

    fn down() -> UnreachableShell {
        UnreachableShell::new("prod.example.com", "Connection refused (os error 111)")
    }

    #[tokio::test]
    async fn unreachable_target_is_recorded_on_this_machine() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());

        let outcome = deploy(&config, &operator_machine(), &down(), &ScriptedPrompt::non_interactive(), &tar()).await;

        match &outcome {
            Outcome::Aborted { phase, reason, .. } => {
                assert_eq!(*phase, Phase::Preflight);
                assert!(reason.contains("Connection refused"), "{reason}");
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(history(&config), vec![(VERSION.to_string(), DeployStatus::Failed)]);
    }

    #[tokio::test]
    async fn dry_run_against_unreachable_target_reports_and_exits_1() {
        let state = tempfile::tempdir().unwrap();
        let config = shop_config(state.path());
        let options = DeployOptions {
            dry_run: true,
            ..tar()
        };

        let outcome = deploy(&config, &operator_machine(), &down(), &ScriptedPrompt::non_interactive(), &options).await;

        assert!(matches!(outcome, Outcome::DryRun { clear: false, .. }), "{outcome}");
        assert_eq!(outcome.exit_code(), 1);
        assert!(history(&config).is_empty());
    }
}
