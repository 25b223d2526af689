mod support;

use pipecheck::{
    EngineConfig, PipelineError, PipelineOutcome, SuiteConfig, SuiteRunner, TestCase,
    load_cases_from_dir, parse_pipeline,
};
use pipecheck_llm::ScriptedModelClient;
use std::sync::Arc;
use std::time::Duration;
use support::{CallLog, engine, executors, files_toolkit, session};
use tempfile::TempDir;

fn sleeping_case(name: &str, seconds: u64) -> TestCase {
    let document = format!(
        r#"
name: {name}
state:
  slept: map
entry_point: nap
nodes:
  - id: nap
    type: toolkit
    toolkit: files
    tool: sleep
    input_mapping:
      seconds:
        type: fixed
        value: {seconds}
    output: [slept]
"#
    );
    TestCase::from_definition(parse_pipeline(&document).expect("case should parse"))
}

fn failing_case(name: &str) -> TestCase {
    let document = format!(
        r#"
name: {name}
entry_point: read
nodes:
  - id: read
    type: toolkit
    toolkit: files
    tool: read_item
"#
    );
    TestCase::from_definition(parse_pipeline(&document).expect("case should parse"))
}

fn runner(log: &CallLog, config: SuiteConfig) -> SuiteRunner {
    let engine = engine(files_toolkit(log), Arc::new(ScriptedModelClient::new()));
    SuiteRunner::new(Arc::new(engine), config)
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn slow_pipeline_times_out_without_holding_up_the_rest() {
    let log = CallLog::default();
    let config = SuiteConfig {
        concurrency: 3,
        pipeline_timeout_secs: Some(2),
        ..SuiteConfig::default()
    };
    let cases = vec![
        sleeping_case("one", 1),
        sleeping_case("slow", 5),
        sleeping_case("three", 1),
        sleeping_case("four", 1),
        sleeping_case("five", 1),
    ];

    let suite = runner(&log, config).run(cases, &session("5a1e5a1e")).await;

    assert_eq!(suite.total, 5);
    assert_eq!(suite.passed, 4);
    assert_eq!(suite.errors, 1);
    assert_eq!(suite.exit_code(), 1);
    assert!(suite.duration < Duration::from_secs(4));

    let names: Vec<&str> = suite.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["one", "slow", "three", "four", "five"]);
    let slow = suite.result("slow").expect("slow case should be reported");
    assert_eq!(slow.outcome, PipelineOutcome::Errored);
    assert_eq!(
        slow.error,
        Some(PipelineError::Timeout(Duration::from_secs(2)))
    );
    assert_eq!(log.calls().len(), 5);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn concurrency_bounds_wall_clock_time() {
    let log = CallLog::default();
    let cases: Vec<TestCase> = (0..4)
        .map(|index| sleeping_case(&format!("case-{index}"), 3))
        .collect();
    let config = SuiteConfig {
        concurrency: 2,
        ..SuiteConfig::default()
    };

    let suite = runner(&log, config).run(cases, &session("c0c0c0c0")).await;

    assert!(suite.all_passed());
    assert!(suite.duration >= Duration::from_secs(6));
    assert!(suite.duration < Duration::from_secs(7));
}

#[tokio::test(flavor = "current_thread")]
async fn stop_on_first_failure_expected_remaining_cases_skipped() {
    let log = CallLog::default();
    let config = SuiteConfig {
        concurrency: 1,
        stop_on_first_failure: true,
        ..SuiteConfig::default()
    };
    let cases = vec![
        sleeping_case("first", 0),
        failing_case("broken"),
        sleeping_case("third", 0),
        sleeping_case("fourth", 0),
    ];

    let suite = runner(&log, config).run(cases, &session("57075707")).await;

    assert_eq!(
        (suite.passed, suite.failed, suite.errors, suite.skipped),
        (1, 0, 1, 2)
    );
    let outcomes: Vec<PipelineOutcome> = suite.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            PipelineOutcome::Passed,
            PipelineOutcome::Errored,
            PipelineOutcome::Skipped,
            PipelineOutcome::Skipped,
        ]
    );
    assert_eq!(log.operations(), vec!["files.sleep", "files.read_item"]);
}

#[tokio::test(flavor = "current_thread")]
async fn unloadable_document_counts_as_error_and_suite_continues() {
    let log = CallLog::default();
    let cases = vec![
        TestCase::from_document("garbled", "name: [unterminated"),
        TestCase::from_document(
            "no entry",
            "name: no entry\nentry_point: ghost\nnodes:\n  - id: a\n    type: code\n    code: x\n",
        ),
        sleeping_case("fine", 0),
    ];

    let suite = runner(&log, SuiteConfig::default())
        .run(cases, &session("10ad10ad"))
        .await;

    assert_eq!((suite.passed, suite.errors), (1, 2));
    let garbled = suite.result("garbled").expect("garbled case reported");
    assert_eq!(
        garbled.error.as_ref().map(PipelineError::kind),
        Some("ParseError")
    );
    let no_entry = suite.result("no entry").expect("no entry case reported");
    assert_eq!(
        no_entry.error.as_ref().map(PipelineError::kind),
        Some("GraphError")
    );

    let document = suite.to_document();
    assert_eq!(document.errors, 2);
    assert!(!document.results[0].test_passed);
    assert!(document.results[2].test_passed);
}

#[tokio::test(flavor = "current_thread")]
async fn from_config_engine_settings_expected_applied_to_runs() {
    let log = CallLog::default();
    let config = SuiteConfig::from_toml_str("[engine]\nmax_steps = 3\n").expect("config parses");
    let spin = r#"
name: spin
entry_point: echo
nodes:
  - id: echo
    type: toolkit
    toolkit: files
    tool: echo
    transition: echo
"#;
    let runner = SuiteRunner::from_config(
        config,
        executors(files_toolkit(&log), Arc::new(ScriptedModelClient::new())),
    );

    let suite = runner
        .run(vec![TestCase::from_document("spin", spin)], &session("c0ff1e00"))
        .await;

    let spin = suite.result("spin").expect("spin case reported");
    assert_eq!(spin.error, Some(PipelineError::StepLimitExceeded(3)));
    assert_eq!(log.calls().len(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn from_config_verdict_key_expected_used_for_pass() {
    let log = CallLog::default();
    let config = SuiteConfig {
        engine: EngineConfig {
            verdict_key: "ok".to_string(),
            ..EngineConfig::default()
        },
        ..SuiteConfig::default()
    };
    let document = r#"
name: verdict
state:
  ok: boolean
entry_point: echo
nodes:
  - id: echo
    type: toolkit
    toolkit: files
    tool: echo
    input_mapping:
      ok:
        type: fixed
        value: false
    output: [ok]
"#;
    let runner = SuiteRunner::from_config(
        config,
        executors(files_toolkit(&log), Arc::new(ScriptedModelClient::new())),
    );

    let suite = runner
        .run(vec![TestCase::from_document("verdict", document)], &session("c0ff1e01"))
        .await;

    assert_eq!((suite.passed, suite.failed), (0, 1));
}

#[tokio::test(flavor = "current_thread")]
async fn unmapped_input_expected_counted_as_failed_not_error() {
    let log = CallLog::default();
    let document = r#"
name: missing input
entry_point: use
nodes:
  - id: use
    type: toolkit
    toolkit: files
    tool: echo
    input: [never_set]
"#;

    let suite = runner(&log, SuiteConfig::default())
        .run(vec![TestCase::from_document("missing input", document)], &session("fa11fa11"))
        .await;

    assert_eq!((suite.passed, suite.failed, suite.errors), (0, 1, 0));
    let result = suite.result("missing input").expect("case reported");
    assert_eq!(result.outcome, PipelineOutcome::Failed);
    assert_eq!(result.failing_node(), Some("use"));
    assert_eq!(
        result.error.as_ref().map(PipelineError::kind),
        Some("UnknownStateVariable")
    );
    assert!(log.calls().is_empty());
}

#[test]
fn load_cases_from_dir_expected_sorted_yaml_files_only() {
    let temp = TempDir::new().expect("temp dir should be created");
    std::fs::write(temp.path().join("b_second.yaml"), "name: second\n").expect("write b");
    std::fs::write(temp.path().join("a_first.yml"), "name: first\n").expect("write a");
    std::fs::write(temp.path().join("notes.txt"), "not a pipeline").expect("write notes");
    std::fs::create_dir(temp.path().join("nested.yaml")).expect("create nested dir");

    let cases = load_cases_from_dir(temp.path()).expect("directory should load");

    let names: Vec<&str> = cases.iter().map(|case| case.name.as_str()).collect();
    assert_eq!(names, vec!["a_first", "b_second"]);
    assert_eq!(
        cases[0],
        TestCase::from_document("a_first", "name: first\n")
    );
}
