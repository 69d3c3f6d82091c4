//! End-to-end invariant checking over captured log files.

use std::fs;

use schedlog::dsl::TraceBuilder;
use schedlog::trace::read_full;
use schedlog::{verify_logs, CheckMode, Policy, SchedlogError, Verifier, VerifierConfig, VerifyOutcome};

/// Captured MQSS output with shell noise around the trace lines.
fn mqss_capture() -> String {
    let body = TraceBuilder::new()
        .active(0, 0, 10)
        .running(4, "tfkcpu", 3)
        .active(0, 1, 20)
        .queued(1, "init", 6)
        .expired(0, 0, 10)
        .active(1, 0, 9)
        .running(4, "tfkcpu", 2)
        .active(1, 1, 20)
        .queued(1, "init", 6)
        .expired(1, 0, 10)
        .active(2, 1, 19)
        .running(4, "tfkcpu", 3)
        .queued(1, "init", 5)
        .render();
    format!("xv6 kernel is booting\n$ tfkcpu\n{}$ \n", body)
}

#[test]
fn test_check_single_capture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tfkcpu_MQSS_run001.log");
    fs::write(&path, mqss_capture()).unwrap();

    let trace = read_full(&path).unwrap();
    let report = Verifier::for_policy(Policy::Mqss).verify(&trace);
    assert!(report.is_clean(), "{:?}", report.first_violation());
    assert!(report.into_result().is_ok());
}

#[test]
fn test_set_exclusivity_violation_surfaces() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tbg_MQSS_run001.log");
    let text = TraceBuilder::new()
        .active(10, 0, 10)
        .running(9, "tbg", 4)
        .expired(10, 1, 20)
        .queued(9, "tbg", 20)
        .render();
    fs::write(&path, text).unwrap();

    let trace = read_full(&path).unwrap();
    let mut verifier = Verifier::for_policy(Policy::Mqss);
    verifier.set_mode(CheckMode::FailFast);
    match verifier.verify(&trace).into_result() {
        Err(SchedlogError::Invariant(v)) => {
            assert_eq!(v.property, "set-exclusivity");
            assert_eq!(v.tick.map(|t| t.ticks()), Some(10));
        }
        other => panic!("expected set-exclusivity violation, got {:?}", other),
    }
}

#[test]
fn test_batch_continues_past_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("tfkcpu_MQSS_run001.log"), mqss_capture()).unwrap();
    fs::write(
        dir.path().join("tfkcpu_MQSS_run002.log"),
        "0|active|0(10),[4]tfkcpu:4(3),,[1]init:3(6)\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("tfkcpu_MQSS_run003.log"),
        TraceBuilder::new().active(0, 0, 10).expired(0, 0, 10).render(),
    )
    .unwrap();
    fs::write(dir.path().join("README"), "not a log").unwrap();

    let results = verify_logs(dir.path(), &VerifierConfig::default()).unwrap();
    let runs: Vec<u32> = results.iter().map(|r| r.name.run).collect();
    assert_eq!(runs, vec![1, 2, 3]);

    assert!(results[0].passed());
    match &results[1].outcome {
        VerifyOutcome::Unparsable { reason } => assert!(reason.contains("','")),
        other => panic!("expected parse failure, got {:?}", other),
    }
    match &results[2].outcome {
        VerifyOutcome::Checked(report) => {
            let v = report.first_violation().unwrap();
            assert_eq!(v.property, "structural-minimum");
            assert_eq!(v.message, "missing multiple levels");
        }
        other => panic!("expected violations, got {:?}", other),
    }
}

#[test]
fn test_report_serializes() {
    let trace = TraceBuilder::new().active(0, 0, 10).build();
    let report = Verifier::for_policy(Policy::Mqss).verify(&trace);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcomes"][2]["property"], "structural-minimum");
    assert_eq!(json["outcomes"][2]["violations"].as_array().unwrap().len(), 2);
}
