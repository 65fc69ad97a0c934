//! End-to-end script execution against the Boa sandbox

mod common;

use common::TestEngine;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use userscript_core::{EngineError, EngineEvent, LogLevel, TaskEvent};

/// Every event published until `terminate` of `task_id`
async fn events_until_terminate(
    rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
    task_id: &userscript_core::TaskId,
) -> Vec<TaskEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for terminate")
            .unwrap();
        if let EngineEvent::Task(event) = event {
            let done = matches!(&event, TaskEvent::Terminate(t) if &t.task_id == task_id);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

#[tokio::test]
async fn test_hello_script_logs_then_terminates() {
    let engine = TestEngine::new();
    let script = engine
        .script("hello", "exports.main = () => { console.info('hello'); };")
        .await;

    let mut rx = engine.manager.events().subscribe();
    let task = engine.manager.execute(&script, JsonValue::Null).await.unwrap();
    let events = events_until_terminate(&mut rx, &task.task_id).await;

    assert_eq!(events.len(), 2, "unexpected events {:?}", events);
    match &events[0] {
        TaskEvent::Output { task_id, output } => {
            assert_eq!(task_id, &task.task_id);
            assert_eq!(output.level, LogLevel::Info);
            assert_eq!(output.payload, vec![json!("hello")]);
        }
        other => panic!("expected output first, got {:?}", other),
    }
    match &events[1] {
        TaskEvent::Terminate(termination) => {
            assert_eq!(termination.result, None);
            assert!(!termination.has_clean_up);
            assert!(!termination.has_error);
        }
        other => panic!("expected terminate, got {:?}", other),
    }

    assert!(engine.manager.get_tasks().await.is_empty());
    assert_eq!(engine.host.output.lock().unwrap().as_slice(), ["hello"]);
}

#[tokio::test]
async fn test_throwing_script_is_reported_and_finalized() {
    let engine = TestEngine::new();
    let script = engine
        .script("thrower", "exports.main = () => { throw new Error('kaboom'); };")
        .await;

    let (task, termination) = engine
        .manager
        .execute_and_wait(&script, JsonValue::Null)
        .await
        .unwrap();

    assert!(termination.has_error);
    assert!(!termination.has_clean_up);
    assert_eq!(termination.result, None);

    let reports = engine.reporter.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1, "reports: {:?}", reports);
    assert_eq!(reports[0].0, "SCRIPT_ERROR");
    assert!(reports[0].1.contains(task.task_id.as_str()));
    assert!(engine.manager.get_tasks().await.is_empty());
}

#[tokio::test]
async fn test_custom_result_kept_until_cleaned_up() {
    let engine = TestEngine::new();
    let script = engine
        .script(
            "counter",
            "let cleaned = 0;\n\
             exports.main = (args) => ({\n\
               custom: { doubled: args.n * 2 },\n\
               cleanUp() { cleaned += 1; console.log('cleaned', cleaned); },\n\
             });",
        )
        .await;

    let (task, termination) = engine
        .manager
        .execute_and_wait(&script, json!({"n": 21}))
        .await
        .unwrap();
    assert_eq!(termination.result, Some(json!({"doubled": 42})));
    assert!(termination.has_clean_up);

    let tasks = engine.manager.get_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, task.task_id);

    engine.manager.clean_up(&task.task_id).await.unwrap();
    assert!(engine.manager.get_tasks().await.is_empty());
    assert_eq!(engine.host.output.lock().unwrap().as_slice(), ["cleaned 1"]);

    let again = engine.manager.clean_up(&task.task_id).await.unwrap_err();
    assert!(matches!(again, EngineError::InvalidUsage(_)));
}

#[tokio::test]
async fn test_mounted_tasks_survive_bulk_cleanup() {
    let engine = TestEngine::new();
    let script = engine.script("listener", "exports.main = () => () => {};").await;

    let (mounted, _) = engine.manager.execute_and_wait(&script, JsonValue::Null).await.unwrap();
    let (loose, _) = engine.manager.execute_and_wait(&script, JsonValue::Null).await.unwrap();
    assert_ne!(mounted.task_id, loose.task_id);
    assert!(engine.manager.mount_task(&mounted.task_id).await);

    assert_eq!(engine.manager.clean_up_all(false).await, 1);
    let remaining: Vec<_> = engine
        .manager
        .get_tasks()
        .await
        .into_iter()
        .map(|task| task.task_id)
        .collect();
    assert_eq!(remaining, vec![mounted.task_id.clone()]);

    assert_eq!(engine.manager.clean_up_all(true).await, 1);
    assert!(engine.manager.get_tasks().await.is_empty());
}

#[tokio::test]
async fn test_host_module_and_packages_are_required() {
    let engine = TestEngine::new();
    engine.write(
        "packages/node_modules/shout/package.json",
        r#"{"name": "shout", "main": "lib/shout.js"}"#,
    );
    engine.write(
        "packages/node_modules/shout/lib/shout.js",
        "module.exports = (text) => text.toUpperCase() + '!';",
    );
    let script = engine
        .script(
            "greeter",
            "const host = require('vscode');\n\
             const shout = require('shout');\n\
             exports.main = (args) => ({ custom: shout(host.greet(args.name)) });",
        )
        .await;

    let (_, termination) = engine
        .manager
        .execute_and_wait(&script, json!({"name": "ada"}))
        .await
        .unwrap();
    assert_eq!(termination.result, Some(json!("HELLO ADA!")));
    assert!(!termination.has_error);

    let calls = engine.host_module.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("greet".to_string(), vec![json!("ada")])]);
}

#[tokio::test]
async fn test_missing_module_is_invalid_usage() {
    let engine = TestEngine::new();
    let script = engine
        .script("needy", "const x = require('not-installed'); exports.main = () => {};")
        .await;

    let (_, termination) = engine.manager.execute_and_wait(&script, JsonValue::Null).await.unwrap();
    assert!(termination.has_error);

    let reports = engine.reporter.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "INVALID_USAGE");
}

#[tokio::test]
async fn test_async_main_result_is_awaited() {
    let engine = TestEngine::new();
    let script = engine
        .script(
            "later",
            "exports.main = async () => { await Promise.resolve(); return { custom: 'done', cleanUp: () => {} }; };",
        )
        .await;

    let (_, termination) = engine.manager.execute_and_wait(&script, JsonValue::Null).await.unwrap();
    assert_eq!(termination.result, Some(json!("done")));
    assert!(termination.has_clean_up);
}

#[tokio::test]
async fn test_invalid_script_names_are_rejected() {
    let engine = TestEngine::new();
    for name in ["", "has space", "a/b", "what?", "tab\tbed"] {
        let script = userscript_core::UserScript::new(name, userscript_core::ScriptLang::Js);
        let err = engine.library.create_script(&script, None).await.unwrap_err();
        match err {
            EngineError::InvalidUsage(message) => assert!(!message.is_empty()),
            other => panic!("{:?} accepted for {:?}", other, name),
        }
    }

    let script = userscript_core::UserScript::new("daily-report_v2", userscript_core::ScriptLang::Js);
    engine.library.create_script(&script, None).await.unwrap();
    assert_eq!(engine.library.list_scripts().await.unwrap(), vec![script]);
}

#[tokio::test]
async fn test_last_executed_script_is_remembered() {
    let engine = TestEngine::new();
    assert_eq!(engine.manager.get_last_executed_script_name().await.unwrap(), None);

    let script = engine.script("recent", "exports.main = () => {};").await;
    engine.manager.execute_and_wait(&script, JsonValue::Null).await.unwrap();
    assert_eq!(
        engine.manager.get_last_executed_script_name().await.unwrap().as_deref(),
        Some("recent")
    );
}
