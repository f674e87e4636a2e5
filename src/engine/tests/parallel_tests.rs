//! Tests for parallel

use super::helpers::{nodes, test_plugin, var, Peek};
use crate::engine::{Engine, EngineError, ExecutionOptions};
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_results_in_document_order() {
    let engine = Engine::builder().plugin(test_plugin()).build();
    let document = nodes(&json!([
        {
            "type": "tag",
            "name": "parallel",
            "attributes": { "id": "p" },
            "children": [
                { "type": "tag", "name": "sleep", "attributes": { "ms": 40, "text": "slow" } },
                { "type": "tag", "name": "sleep", "attributes": { "ms": 1, "text": "fast" } }
            ]
        },
        { "type": "text", "content": "|" },
        { "type": "text", "content": var("p.results.0") },
        { "type": "text", "content": "," },
        { "type": "text", "content": var("p.results.1") }
    ])
    .to_string());

    let out = engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "slowfast|slow,fast");
}

#[tokio::test]
async fn test_children_run_concurrently() {
    let engine = Engine::builder().plugin(test_plugin()).build();
    let document = nodes(&json!([{
        "type": "tag",
        "name": "parallel",
        "children": [
            { "type": "tag", "name": "sleep", "attributes": { "ms": 200 } },
            { "type": "tag", "name": "sleep", "attributes": { "ms": 200 } },
            { "type": "tag", "name": "sleep", "attributes": { "ms": 200 } }
        ]
    }])
    .to_string());

    let started = Instant::now();
    engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(550));
}

#[tokio::test]
async fn test_branch_scopes_are_disjoint() {
    let (peek, seen) = Peek::new(vec!["v"]);
    let engine = Engine::builder()
        .plugin(test_plugin().tag("peek", peek))
        .build();

    let branch = |n: i64, ms: u64| {
        json!({
            "type": "tag",
            "name": "inline",
            "children": [
                { "type": "tag", "name": "set", "attributes": { "id": "v", "number": n } },
                { "type": "tag", "name": "sleep", "attributes": { "ms": ms } },
                { "type": "tag", "name": "peek" }
            ]
        })
    };
    let document = nodes(&json!([{
        "type": "tag",
        "name": "parallel",
        "children": [branch(1, 30), branch(2, 5)]
    }])
    .to_string());

    engine.render(&document, ExecutionOptions::default()).await.unwrap();

    let mut seen: Vec<_> = seen.lock().iter().map(|vals| vals[0].clone()).collect();
    seen.sort_by_key(|v| v.as_ref().and_then(|v| v["number"].as_i64()));
    assert_eq!(seen, vec![Some(json!({ "number": 1 })), Some(json!({ "number": 2 }))]);
}

#[tokio::test]
async fn test_fail_fast_drops_slow_siblings() {
    let engine = Engine::builder().plugin(test_plugin()).build();
    let document = nodes(&json!([{
        "type": "tag",
        "name": "parallel",
        "children": [
            { "type": "tag", "name": "sleep", "attributes": { "ms": 10000, "text": "never" } },
            { "type": "tag", "name": "fail" }
        ]
    }])
    .to_string());

    let started = Instant::now();
    let err = engine.render(&document, ExecutionOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::ExternalCall { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}
