//! Staged records through schema, load, and relationships to privilege paths.

use crate::harness::{Node, Scenario};
use privmap_core::{AbusableRight, EdgeKind, NodeKind, RunnerKind};

#[test]
fn test_group_member_reaches_writable_exe() {
    Scenario::new("Group member reaches writable exe")
        .stage_dir("c:/tools")
        .stage_exe("c:/tools/a.exe")
        .stage_principal("tools-admins")
        .stage_principal_in("alice", "tools-admins")
        .stage_ace("tools-admins", "GENERIC_WRITE", NodeKind::Exe, "c:/tools/a.exe")
        .process()
        .assert_no_failures()
        .assert_created(4)
        .assert_nodes(4)
        .assert_edge(
            Node::principal("alice"),
            EdgeKind::MemberOf,
            Node::principal("tools-admins"),
        )
        .assert_edge(
            Node::principal("tools-admins"),
            EdgeKind::Acl(AbusableRight::GenericWrite),
            Node::path("c:/tools/a.exe"),
        )
        .assert_path_count(Node::principal("alice"), Node::path("c:/tools/a.exe"), 1)
        .assert_shortest_path(
            Node::principal("alice"),
            Node::path("c:/tools/a.exe"),
            vec![EdgeKind::MemberOf, EdgeKind::Acl(AbusableRight::GenericWrite)],
        )
        .run()
        .unwrap();
}

#[test]
fn test_directory_contains_file_once() {
    Scenario::new("Directory contains file once")
        .stage_dir("C:\\Tools")
        .stage_exe("\"C:\\Tools\\A.EXE\"")
        .stage_exe("c:/tools/a.exe")
        .process()
        .assert_label_count("Exe", 1)
        .assert_label_count("Directory", 1)
        .assert_edge_count(EdgeKind::Contains, 1)
        .assert_edge(Node::path("c:/tools"), EdgeKind::Contains, Node::path("c:/tools/a.exe"))
        .run()
        .unwrap();
}

#[test]
fn test_service_runner_chain_to_system() {
    let exe = r"C:\Windows\System32\spoolsv.exe";
    Scenario::new("Writable service binary leads to SYSTEM")
        .stage_dir("c:/windows/system32")
        .stage_runner(RunnerKind::Service, "Spooler", exe, "LocalSystem")
        .stage_ace("users", "WRITE_DACL", NodeKind::Exe, exe)
        .process()
        .assert_no_failures()
        .assert_edge(Node::path(exe), EdgeKind::ExecutedBy, Node::runner("service:spooler"))
        .assert_edge(
            Node::runner("service:spooler"),
            EdgeKind::RunsAs,
            Node::principal("NT AUTHORITY\\SYSTEM"),
        )
        .assert_edge(
            Node::path("c:/windows/system32"),
            EdgeKind::Hosts,
            Node::runner("service:spooler"),
        )
        .assert_shortest_path(
            Node::principal("users"),
            Node::principal("system"),
            vec![
                EdgeKind::Acl(AbusableRight::WriteDacl),
                EdgeKind::ExecutedBy,
                EdgeKind::RunsAs,
            ],
        )
        .run()
        .unwrap();
}

#[test]
fn test_imports_and_forwards() {
    Scenario::new("Imports and forwards become dependency edges")
        .stage_dir("c:/tools")
        .stage_exe("c:/tools/a.exe")
        .stage_dll("c:/tools/b.dll")
        .stage_import("c:/tools/a.exe", "b.dll!Run")
        .stage_import("c:/tools/a.exe", "B.DLL!run")
        .stage_forward("c:/tools/b.dll", "kernel32.dll!CreateFileW")
        .process()
        .assert_no_failures()
        .assert_label_count("Dep", 2)
        .assert_edge_count(EdgeKind::ImportedBy, 1)
        .assert_edge(Node::dep("b.dll!run"), EdgeKind::ImportedBy, Node::path("c:/tools/a.exe"))
        .assert_edge(
            Node::path("c:/tools/b.dll"),
            EdgeKind::Forwards,
            Node::dep("kernel32.dll!createfilew"),
        )
        .run()
        .unwrap();
}

#[test]
fn test_group_hint_and_member_store_agree() {
    Scenario::new("Group hint and member store give one edge")
        .stage_principal("tools-admins")
        .stage_principal_in("alice", "tools-admins")
        .stage_member("alice", "tools-admins")
        .process()
        .assert_no_failures()
        .assert_label_count("Principal", 2)
        .assert_edge_count(EdgeKind::MemberOf, 1)
        .run()
        .unwrap();
}
