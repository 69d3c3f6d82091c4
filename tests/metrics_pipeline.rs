//! Metric extraction from captured files through the public API.

use std::fs;
use std::io::Write as _;

use proptest::prelude::*;
use schedlog::dsl::TickLogBuilder;
use schedlog::trace::read_terse;
use schedlog::{
    collect_metrics, compute_metrics, parse_terse, summarize, ContextSwitchMode, Policy,
    TestProcessSelector, VerifierConfig,
};

#[test]
fn test_metrics_from_captured_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog_RR_run001.log");
    fs::write(
        &path,
        "$ prog\n0|_|[5]prog(3)\n1|_|[5]prog(2)\nhello from prog\n2|_|[5]prog(0)\n",
    )
    .unwrap();

    let log = read_terse(&path).unwrap();
    let m = compute_metrics(
        &log,
        &TestProcessSelector::Program("prog".into()),
        &VerifierConfig::default(),
    )
    .unwrap();

    assert_eq!(m.pid.raw(), 5);
    assert_eq!(m.response_time, 0);
    assert_eq!(m.turnaround_time, 2);
    assert_eq!(m.total_running_ticks, 2);
    assert_eq!(m.cpu_percent, 100.0);
}

#[test]
fn test_config_file_changes_running_state() {
    let text = TickLogBuilder::new()
        .tick(0)
        .process_with_state(7, "tbg", 2, 5)
        .tick(1)
        .process_with_state(7, "tbg", 4, 4)
        .tick(2)
        .process_with_state(7, "tbg", 2, 3)
        .render();
    let log = parse_terse(&text);

    let default = compute_metrics(&log, &TestProcessSelector::FirstNonSystem, &VerifierConfig::default())
        .unwrap();
    assert_eq!(default.total_running_ticks, 1);
    assert_eq!(default.first_execution_tick.ticks(), 1);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"running_state": 2}}"#).unwrap();
    let config = VerifierConfig::load(Some(file.path())).unwrap();
    let custom = compute_metrics(&log, &TestProcessSelector::FirstNonSystem, &config).unwrap();
    assert_eq!(custom.total_running_ticks, 2);
    assert_eq!(custom.response_time, 0);
}

#[test]
fn test_batch_rows_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    for (run, len) in [(1u32, 4u64), (2, 6), (3, 5)] {
        let mut b = TickLogBuilder::new();
        for t in 0..len {
            b = b.tick(t).process(1, "init", 1).process(9, "tfkio", (len - t) as i64);
        }
        fs::write(dir.path().join(format!("tfkio_MLFQ_run{:03}.log", run)), b.render()).unwrap();
    }
    fs::write(dir.path().join("tfkio_MLFQ_run004.log"), "").unwrap();

    let report = collect_metrics(dir.path(), &VerifierConfig::default()).unwrap();
    assert_eq!(report.rows.len(), 3);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.rows.iter().all(|r| r.policy == Policy::Mlfq));

    let turnaround: Vec<u64> = report.rows.iter().map(|r| r.metrics.turnaround_time).collect();
    assert_eq!(turnaround, vec![3, 5, 4]);

    let summary = summarize(&report.rows);
    let t = summary.iter().find(|s| s.metric == "turnaround_time").unwrap();
    assert_eq!(t.mean, 4.0);
    assert_eq!(t.median, 4.0);
    assert_eq!(t.range, 2.0);
    assert_eq!(t.sd, Some(1.0));

    let json = serde_json::to_value(&report.rows[0]).unwrap();
    assert_eq!(json["program"], "tfkio");
    assert_eq!(json["policy"], "MLFQ");
    assert_eq!(json["turnaround_time"], 3);
}

fn snapshot_strategy() -> impl Strategy<Value = Vec<(u64, Vec<(u32, Option<u32>, i64)>)>> {
    prop::collection::vec(
        (
            0u64..3,
            prop::collection::vec((1u32..6, prop::option::of(2u32..6), 0i64..4), 0..4),
        ),
        1..20,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn metric_laws_hold(raw in snapshot_strategy(), head_of_queue in any::<bool>()) {
        let mut builder = TickLogBuilder::new();
        let mut tick = 0;
        for (step, procs) in raw {
            tick += step;
            builder = builder.tick(tick);
            for (pid, state, q) in procs {
                builder = match state {
                    Some(state) => builder.process_with_state(pid, "work", state, q),
                    None => builder.process(pid, "work", q),
                };
            }
        }
        let log = builder.build();

        let config = VerifierConfig {
            context_switches: if head_of_queue {
                ContextSwitchMode::HeadOfQueue
            } else {
                ContextSwitchMode::RunningMember
            },
            ..VerifierConfig::default()
        };

        if let Ok(m) = compute_metrics(&log, &TestProcessSelector::FirstNonSystem, &config) {
            let executing = m.ending_tick.ticks() - m.first_execution_tick.ticks();
            prop_assert_eq!(m.response_time + executing, m.turnaround_time);
            prop_assert!((0.0..=100.0).contains(&m.cpu_percent));
            if m.ending_tick == m.arrival_tick {
                prop_assert_eq!(m.cpu_percent, 100.0);
            }
            prop_assert!(m.total_running_ticks <= m.turnaround_time + 1);
        }
    }
}
