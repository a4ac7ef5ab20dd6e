//! End-to-end compilation pipeline tests: fluent assembly through document
//! rendering, permission aggregation and registry publishing.

use asl_lite_core::{
    Chain, CompileError, Condition, MachineRecord, MachineState, MachineStore, MemoryMachineStore,
    PolicyStatement, StateGraph, StateNode, ERRORS_ALL,
};
use serde_json::Value;

fn invoke_statement(arn: &str) -> PolicyStatement {
    PolicyStatement::allow(["lambda:InvokeFunction"], [arn])
}

fn order_pipeline() -> StateGraph {
    let mut g = StateGraph::new("order pipeline");
    g.set_timeout_seconds(600);

    let fetch = g.add(
        StateNode::task("FetchOrder", "arn:fn:fetch")
            .with_statement(invoke_statement("arn:fn:fetch"))
            .with_result_path("$.order"),
    );
    let charge = g.add(
        StateNode::task("ChargeCard", "arn:fn:charge")
            .with_statement(invoke_statement("arn:fn:charge")),
    );
    let refund = g.add(
        StateNode::task("Refund", "arn:fn:refund")
            .with_statement(invoke_statement("arn:fn:refund")),
    );
    let done = g.add(StateNode::succeed("Done"));
    g.add(StateNode::fail("Rejected").with_error("OrderRejected"));

    let router = g.add(
        StateNode::choice("Route")
            .when(
                Condition::BooleanEquals {
                    variable: "$.order.paid".into(),
                    value: true,
                },
                "Done",
            )
            .when(
                Condition::NumericGreaterThan {
                    variable: "$.order.total".into(),
                    value: 10_000,
                },
                "Refund",
            )
            .otherwise("Rejected"),
    );

    Chain::start(&g, fetch)
        .next_state(&mut g, charge)
        .unwrap()
        .next_state(&mut g, router)
        .unwrap();
    Chain::start(&g, refund).next_state(&mut g, done).unwrap();
    g.set_start(fetch);
    g
}

/// Collect every transition target named at one document level.
fn level_targets(states: &Value) -> Vec<String> {
    let mut targets = Vec::new();
    for (_, state) in states.as_object().unwrap() {
        if let Some(next) = state.get("Next").and_then(Value::as_str) {
            targets.push(next.to_string());
        }
        if let Some(default) = state.get("Default").and_then(Value::as_str) {
            targets.push(default.to_string());
        }
        if let Some(choices) = state.get("Choices").and_then(Value::as_array) {
            for rule in choices {
                targets.push(rule["Next"].as_str().unwrap().to_string());
            }
        }
        if let Some(catches) = state.get("Catch").and_then(Value::as_array) {
            for handler in catches {
                targets.push(handler["Next"].as_str().unwrap().to_string());
            }
        }
    }
    targets
}

/// Assert the closure property at every nesting level.
fn assert_level_closed(doc: &Value) {
    let states = &doc["States"];
    let keys: Vec<&str> = states.as_object().unwrap().keys().map(String::as_str).collect();

    let start = doc["StartAt"].as_str().unwrap();
    assert!(keys.contains(&start), "StartAt `{start}` missing from States");

    for target in level_targets(states) {
        assert!(
            keys.contains(&target.as_str()),
            "target `{target}` missing from States"
        );
    }

    for (_, state) in states.as_object().unwrap() {
        if let Some(branches) = state.get("Branches").and_then(Value::as_array) {
            for branch in branches {
                assert_level_closed(branch);
            }
        }
        if let Some(iterator) = state.get("Iterator") {
            assert_level_closed(iterator);
        }
    }
}

#[test]
fn compilation_is_deterministic() {
    let first = order_pipeline();
    let second = order_pipeline();

    let a = first.compile().unwrap();
    let b = second.compile().unwrap();
    assert_eq!(a.json, b.json);
    assert_eq!(a.document_version, b.document_version);

    // Re-compiling the same graph returns the cached artifact unchanged.
    let again = first.compile().unwrap();
    assert_eq!(a.json, again.json);
}

#[test]
fn no_dangling_references_survive_compilation() {
    let g = order_pipeline();
    let artifact = g.compile().unwrap();

    assert_eq!(artifact.document["StartAt"], "FetchOrder");
    assert_level_closed(&artifact.document);
}

#[test]
fn statements_are_deduplicated_across_tasks() {
    let mut g = StateGraph::new("same backend twice");
    let shared = invoke_statement("arn:fn:shared");
    let a = g.add(StateNode::task("First", "arn:fn:shared").with_statement(shared.clone()));
    let b = g.add(StateNode::task("Second", "arn:fn:shared").with_statement(shared.clone()));
    Chain::start(&g, a)
        .next_state(&mut g, b)
        .unwrap()
        .end(&mut g)
        .unwrap();
    g.set_start(a);

    let artifact = g.compile().unwrap();
    assert_eq!(artifact.statements, vec![shared]);
}

#[test]
fn statement_order_follows_discovery() {
    let g = order_pipeline();
    let artifact = g.compile().unwrap();
    let resources: Vec<&str> = artifact
        .statements
        .iter()
        .map(|s| s.resources[0].as_str())
        .collect();
    assert_eq!(resources, vec!["arn:fn:fetch", "arn:fn:charge", "arn:fn:refund"]);
}

#[test]
fn renamed_default_target_is_rejected() {
    let mut g = StateGraph::new("stale default");
    let accept = g.add(StateNode::pass("Accept"));
    Chain::start(&g, accept).end(&mut g).unwrap();
    // Default still says `Fallback`, but the state was defined as `Backup`.
    let backup = g.add(StateNode::pass("Backup"));
    Chain::start(&g, backup).end(&mut g).unwrap();
    let router = g.add(
        StateNode::choice("Route")
            .when(
                Condition::IsPresent {
                    variable: "$.payload".into(),
                    value: true,
                },
                "Accept",
            )
            .otherwise("Fallback"),
    );
    g.set_start(router);

    match g.compile() {
        Err(CompileError::UnresolvedTransition { from, target }) => {
            assert_eq!(from, "Route");
            assert_eq!(target, "Fallback");
        }
        other => panic!("expected unresolved transition, got {other:?}"),
    }
}

#[test]
fn branch_namespaces_flatten_for_uniqueness() {
    let mut g = StateGraph::new("clashing branches");
    let (left, right) = g.scoped("Fanout", |g| {
        let left = g.scoped("BranchA", |g| {
            let id = g.add(StateNode::task("Work", "arn:fn:a"));
            Chain::start(g, id).end(g).unwrap();
            id
        });
        let right = g.scoped("BranchB", |g| {
            let id = g.add(StateNode::task("Work", "arn:fn:b"));
            Chain::start(g, id).end(g).unwrap();
            id
        });
        (left, right)
    });
    let par = g.add(
        StateNode::parallel("Both")
            .with_branch(left)
            .with_branch(right),
    );
    Chain::start(&g, par).end(&mut g).unwrap();
    g.set_start(par);

    match g.compile() {
        Err(CompileError::DuplicateStateName { name, first, second }) => {
            assert_eq!(name, "Work");
            assert_eq!(first, "Fanout/BranchA/Work");
            assert_eq!(second, "Fanout/BranchB/Work");
        }
        other => panic!("expected duplicate name error, got {other:?}"),
    }
}

#[test]
fn catch_routes_are_walked_and_emitted() {
    let mut g = StateGraph::new("with recovery");
    let recover = g.add(StateNode::task("Recover", "arn:fn:recover"));
    Chain::start(&g, recover).end(&mut g).unwrap();
    let fragile = g.add(
        StateNode::task("Fragile", "arn:fn:fragile")
            .with_catch(asl_lite_core::CatchHandler::on([ERRORS_ALL], "Recover"))
            .unwrap(),
    );
    Chain::start(&g, fragile).end(&mut g).unwrap();
    g.set_start(fragile);

    let artifact = g.compile().unwrap();
    assert_level_closed(&artifact.document);
    assert!(artifact.document["States"].get("Recover").is_some());
}

#[tokio::test]
async fn compiled_artifact_publishes_through_registry() {
    let artifact = order_pipeline().compile().unwrap().clone();
    let version_key = artifact.document_version.clone();

    let store = MemoryMachineStore::new();
    store
        .save(&MachineRecord::draft("orders", 1, artifact))
        .await
        .unwrap();
    store
        .set_state("orders", 1, MachineState::Published)
        .await
        .unwrap();

    let published = store.load_latest_published("orders").await.unwrap().unwrap();
    assert_eq!(published.artifact.document_version, version_key);
    assert_eq!(published.artifact.statements.len(), 3);
}
