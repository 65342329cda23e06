//! End-to-end recording through the replay host on an in-memory store.

use std::io::Cursor;
use std::sync::Arc;

use bbstatus_core::events::{BuildResults, LogContents, StepResults};
use bbstatus_core::store::SqliteStore;
use bbstatus_core::types::BuildQuery;
use bbstatus_core::{
    BuildInfo, Channel, Dispatcher, DocumentStore, EventRecorder, ResultCode, StatusEvent, StepInfo,
};
use chrono::{Duration, TimeZone, Utc};

fn store() -> Arc<dyn DocumentStore> {
    let store = SqliteStore::open_in_memory().expect("Failed to open in-memory store");
    store.ensure_indexes().expect("Failed to create indexes");
    Arc::new(store)
}

#[test]
fn test_build_lifecycle_is_recorded() {
    let store = store();
    let mut dispatcher = Dispatcher::new();
    dispatcher.subscribe(EventRecorder::new(Arc::clone(&store), Some("master-a".into())));

    let started = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut build = BuildInfo {
        builder: "linux-x64".into(),
        number: 42,
        workers: vec!["w1".into()],
        started_at: started,
        finished_at: None,
    };
    let mut step = StepInfo {
        name: "compile".into(),
        started_at: started + Duration::seconds(1),
        finished_at: None,
    };

    // Builder comes online.
    dispatcher
        .dispatch(&StatusEvent::BuilderAdded { name: "linux-x64".into() })
        .unwrap();
    let builder = store.find_builder("linux-x64", Some("master-a")).unwrap().unwrap();
    assert_eq!(builder.status, "offline");

    dispatcher
        .dispatch(&StatusEvent::BuilderChangedState {
            name: "linux-x64".into(),
            state: "idle".into(),
        })
        .unwrap();
    let builder = store.find_builder("linux-x64", Some("master-a")).unwrap().unwrap();
    assert_eq!(builder.status, "idle");

    // Build starts.
    dispatcher
        .dispatch(&StatusEvent::BuildStarted { build: build.clone() })
        .unwrap();
    let builds = store.recent_builds(&BuildQuery::default()).unwrap();
    assert_eq!(builds.len(), 1);
    let build_id = builds[0].id.clone();
    assert_eq!(builds[0].number, 42);
    assert_eq!(builds[0].workers, vec!["w1".to_string()]);
    assert!(builds[0].time_end.is_none());

    // Step runs and logs.
    dispatcher
        .dispatch(&StatusEvent::StepStarted {
            build: build.clone(),
            step: step.clone(),
        })
        .unwrap();
    let steps = store.steps_for_build(&build_id).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].build, build_id);
    assert!(!steps[0].successful);

    for text in ["a", "b", "c"] {
        dispatcher
            .dispatch(&StatusEvent::LogChunk {
                build: build.clone(),
                step: step.clone(),
                log: "stdio".into(),
                channel: Channel::Stdout,
                text: text.into(),
            })
            .unwrap();
    }
    dispatcher
        .dispatch(&StatusEvent::LogFinished {
            build: build.clone(),
            step: step.clone(),
            log: "stdio".into(),
            contents: None,
        })
        .unwrap();
    let stored = store.get_step(&steps[0].id).unwrap().unwrap();
    assert_eq!(stored.stdout, "abc");

    // Step and build finish.
    step.finished_at = Some(started + Duration::seconds(30));
    dispatcher
        .dispatch(&StatusEvent::StepFinished {
            build: build.clone(),
            step: step.clone(),
            results: StepResults::new(ResultCode::Success),
        })
        .unwrap();
    let stored = store.get_step(&steps[0].id).unwrap().unwrap();
    assert!(stored.successful);
    assert_eq!(stored.time_end, step.finished_at);

    build.finished_at = Some(started + Duration::seconds(31));
    dispatcher
        .dispatch(&StatusEvent::BuildFinished {
            build: build.clone(),
            results: BuildResults {
                result: ResultCode::Success.code(),
            },
        })
        .unwrap();
    let stored = store.get_build(&build_id).unwrap().unwrap();
    assert_eq!(stored.time_end, build.finished_at);
    assert!(stored.successful);
    assert_eq!(stored.steps, vec![steps[0].id.clone()]);
}

#[test]
fn test_replay_jsonl_stream() {
    let store = store();
    let mut dispatcher = Dispatcher::new();
    dispatcher.subscribe(EventRecorder::new(Arc::clone(&store), None));

    let build = r#""build":{"builder":"mac","number":7,"workers":["w2"],"started_at":"2024-05-01T12:00:00Z","finished_at":null}"#;
    let step = r#""step":{"name":"test","started_at":"2024-05-01T12:00:01Z","finished_at":"2024-05-01T12:00:09Z"}"#;
    let input = [
        "# replayed from master log".to_string(),
        r#"{"event":"builder_added","name":"mac"}"#.to_string(),
        format!(r#"{{"event":"build_started",{build}}}"#),
        format!(r#"{{"event":"step_started",{build},{step}}}"#),
        format!(r#"{{"event":"log_chunk",{build},{step},"channel":"stdout","text":"runn"}}"#),
        format!(r#"{{"event":"log_chunk",{build},{step},"channel":"stderr","text":"warn"}}"#),
        format!(
            r#"{{"event":"log_finished",{build},{step},"contents":{{"stdout":"running 3 tests\n","stderr":"warn\n","headers":""}}}}"#
        ),
        format!(r#"{{"event":"step_finished",{build},{step},"results":{{"result":2,"text":["failed"]}}}}"#),
        format!(r#"{{"event":"build_finished",{build},"results":{{"result":2}}}}"#),
    ]
    .join("\n");

    let stats = dispatcher.replay(Cursor::new(input)).unwrap();
    assert_eq!(stats.events, 8);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.by_kind.get("log_chunk"), Some(&2));

    let builds = store
        .recent_builds(&BuildQuery {
            worker: Some("w2".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(builds.len(), 1);
    assert!(!builds[0].successful);
    assert_eq!(builds[0].result, Some(2));
    assert!(builds[0].time_end.is_some());

    let steps = store.steps_for_build(&builds[0].id).unwrap();
    assert_eq!(steps[0].stdout, "running 3 tests\n");
    assert_eq!(steps[0].stderr, "warn\n");
    assert!(!steps[0].successful);
    assert_eq!(steps[0].text, vec!["failed".to_string()]);

    let builders = store.list_builders(None).unwrap();
    assert_eq!(builders.len(), 1);
    assert_eq!(builders[0].status, "offline");
}

#[test]
fn test_explicit_log_contents_replace_chunks() {
    let store = store();
    let mut dispatcher = Dispatcher::new();
    dispatcher.subscribe(EventRecorder::new(Arc::clone(&store), None));

    let build = BuildInfo {
        builder: "win".into(),
        number: 1,
        workers: vec![],
        started_at: Utc::now(),
        finished_at: None,
    };
    let step = StepInfo {
        name: "lint".into(),
        started_at: Utc::now(),
        finished_at: None,
    };

    dispatcher
        .dispatch(&StatusEvent::BuildStarted { build: build.clone() })
        .unwrap();
    dispatcher
        .dispatch(&StatusEvent::StepStarted {
            build: build.clone(),
            step: step.clone(),
        })
        .unwrap();
    dispatcher
        .dispatch(&StatusEvent::LogChunk {
            build: build.clone(),
            step: step.clone(),
            log: "stdio".into(),
            channel: Channel::Header,
            text: "partial".into(),
        })
        .unwrap();
    dispatcher
        .dispatch(&StatusEvent::LogFinished {
            build: build.clone(),
            step: step.clone(),
            log: "stdio".into(),
            contents: Some(LogContents {
                headers: "full header\n".into(),
                ..Default::default()
            }),
        })
        .unwrap();

    let builds = store.recent_builds(&BuildQuery::default()).unwrap();
    let steps = store.steps_for_build(&builds[0].id).unwrap();
    assert_eq!(steps[0].headers, "full header\n");
    assert_eq!(steps[0].stdout, "");
}
