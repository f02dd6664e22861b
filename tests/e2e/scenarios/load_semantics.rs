//! Reload, conflicts, damaged stores, and batch boundaries.

use crate::harness::{Assertion, Node, Scenario};
use privmap_core::store::MemoryGraph;
use privmap_core::{AbusableRight, EdgeKind, NodeKind, ProcessReport, Store};

fn small_host(scenario: Scenario) -> Scenario {
    scenario
        .stage_dir("c:/tools")
        .stage_exe("c:/tools/a.exe")
        .stage_exe("c:/tools/b.exe")
        .stage_principal("alice")
}

#[test]
fn test_reprocess_is_idempotent() {
    small_host(Scenario::new("Reprocess creates nothing new"))
        .process()
        .assert_created(4)
        .assert_conflicts(0)
        .process()
        .assert_no_failures()
        .assert_created(0)
        .assert_conflicts(4)
        .assert_nodes(4)
        .assert_edge_count(EdgeKind::Contains, 2)
        .run()
        .unwrap();
}

#[test]
fn test_only_abusable_rights_become_edges() {
    Scenario::new("READ is observed, GENERIC_ALL is an edge")
        .stage_exe("c:/tools/a.exe")
        .stage_exe("c:/tools/b.exe")
        .stage_ace("bob", "READ", NodeKind::Exe, "c:/tools/a.exe")
        .stage_ace("bob", "generic_all", NodeKind::Exe, "c:/tools/b.exe")
        .process()
        .assert_no_failures()
        .assert_no_edge(Node::principal("bob"), Node::path("c:/tools/a.exe"))
        .assert_edge(
            Node::principal("bob"),
            EdgeKind::Acl(AbusableRight::GenericAll),
            Node::path("c:/tools/b.exe"),
        )
        .assert_edge_count(EdgeKind::Acl(AbusableRight::GenericAll), 1)
        .run()
        .unwrap();
}

#[test]
fn test_damaged_store_lines_are_skipped() {
    small_host(Scenario::new("Malformed line and torn tail are skipped"))
        .finish_staging()
        .append_raw(Store::Exes, b"not-a-hex-id,x,y,z,,,,\n")
        .append_raw(Store::Exes, b"deadbeef,partial")
        .process()
        .assert_malformed(1)
        .assert_label_count("Exe", 2)
        .assert_created(4)
        .run()
        .unwrap();
}

#[test]
fn test_batch_size_one_loads_everything() {
    small_host(Scenario::new("One record per batch"))
        .stage_member("alice", "tools-admins")
        .process_with_batch(1)
        .assert_no_failures()
        .assert_created(5)
        .assert_edge_count(EdgeKind::MemberOf, 1)
        .assert(Assertion::Custom(Box::new(|graph: &MemoryGraph, report: Option<&ProcessReport>| {
            let report = report.ok_or_else(|| anyhow::anyhow!("no report"))?;
            let exes = &report.load.kinds[&NodeKind::Exe];
            anyhow::ensure!(exes.batches == 2, "expected 2 exe batches, got {}", exes.batches);
            anyhow::ensure!(graph.constraint_count() > 0, "schema not declared");
            Ok(())
        })))
        .run()
        .unwrap();
}

#[test]
fn test_drop_then_reprocess_recreates() {
    small_host(Scenario::new("Drop clears graph before load"))
        .process()
        .process_dropping()
        .assert_no_failures()
        .assert_created(4)
        .assert_conflicts(0)
        .assert_nodes(4)
        .run()
        .unwrap();
}
