mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, StubConnector};
use netbatch::profile::DeviceKind;
use netbatch::runner::{RunnerOptions, SessionRunner};
use netbatch::target::{Credentials, DeviceTarget};

fn target(dir: &std::path::Path, profile: DeviceKind) -> DeviceTarget {
    DeviceTarget::new(
        "core-sw",
        22,
        Arc::new(Credentials::new("admin", "pw")),
        profile,
        dir,
    )
}

#[tokio::test]
async fn status_command_follows_the_dialect() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = common::runner(StubConnector::new(Behavior::Succeed(Duration::ZERO)));
    let target = target(dir.path(), DeviceKind::Huawei);

    let result = runner.run(&target).await;

    assert!(result.is_success(), "{}", result.status());
    let log = std::fs::read_to_string(target.log_destination()).expect("log");
    assert!(log.contains("dir flash:\n"));
}

#[tokio::test]
async fn configured_status_command_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = RunnerOptions {
        status_command: Some("show system".to_string()),
        ..common::options()
    };
    let runner = SessionRunner::new(StubConnector::new(Behavior::Succeed(Duration::ZERO)), options);
    let target = target(dir.path(), DeviceKind::HpProcurve);

    assert!(runner.run(&target).await.is_success());
    let log = std::fs::read_to_string(target.log_destination()).expect("log");
    assert!(log.contains("show system\n"));
    assert!(!log.contains("show flash"));
}

#[tokio::test]
async fn connect_timeout_is_enforced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = RunnerOptions {
        connect_timeout: Duration::from_millis(1),
        ..common::options()
    };
    let connector = StubConnector::new(Behavior::Succeed(Duration::ZERO));
    let probe = connector.probe();
    let runner = SessionRunner::new(connector, options);
    let target = target(dir.path(), DeviceKind::HpProcurve);

    let result = runner.run(&target).await;

    assert_eq!(
        result.status().failure().map(|reason| reason.to_string()),
        Some("timed out in connect step".to_string())
    );
    assert_eq!(probe.active(), 0);
    assert_eq!(probe.closes(), 0);
    assert!(!target.log_destination().exists());
}
