//! Collecting a host tree and inventory, then loading the result.

use crate::harness::{Node, Scenario};
use privmap_core::collect::{GroupEntry, JsonInventory, ServiceEntry};
use privmap_core::{AbusableRight, EdgeKind};

fn inventory() -> JsonInventory {
    JsonInventory {
        services: vec![ServiceEntry {
            name: "Updater".to_string(),
            command_line: "{host}/tools/a.exe -k run".to_string(),
            start_name: String::new(),
        }],
        groups: vec![GroupEntry {
            name: "tools-admins".to_string(),
            members: vec!["alice".to_string()],
        }],
        ..JsonInventory::default()
    }
}

fn host_tree(scenario: Scenario) -> Scenario {
    scenario
        .host_file("tools/a.exe", b"import kernel32.dll!CreateFileW\n")
        .host_file("tools/readme.txt", b"not an image")
        .host_file("tools/lib/b.dll", b"forward ntdll.dll!RtlAllocateHeap\n")
}

#[test]
fn test_collected_tree_loads_with_relationships() {
    host_tree(Scenario::new("Collected tree loads"))
        .collect(inventory())
        .process()
        .assert_no_failures()
        .assert_malformed(0)
        .assert_label_count("Exe", 1)
        .assert_label_count("Dll", 1)
        .assert_label_count("Runner", 1)
        .assert_label_count("Dep", 2)
        .assert_edge(Node::host("tools"), EdgeKind::Contains, Node::host("tools/a.exe"))
        .assert_edge(Node::host("tools"), EdgeKind::Contains, Node::host("tools/lib"))
        .assert_edge(Node::principal("SYSTEM"), EdgeKind::Owns, Node::host("tools/a.exe"))
        .assert_edge(
            Node::principal(r"BUILTIN\Users"),
            EdgeKind::Acl(AbusableRight::GenericWrite),
            Node::host("tools/a.exe"),
        )
        .assert_edge(
            Node::dep("kernel32.dll!createfilew"),
            EdgeKind::ImportedBy,
            Node::host("tools/a.exe"),
        )
        .assert_edge(
            Node::host("tools/lib/b.dll"),
            EdgeKind::Forwards,
            Node::dep("ntdll.dll!rtlallocateheap"),
        )
        .assert_edge(
            Node::host("tools/a.exe"),
            EdgeKind::ExecutedBy,
            Node::runner("service:updater"),
        )
        .assert_edge(Node::host("tools"), EdgeKind::Hosts, Node::runner("service:updater"))
        .assert_edge(
            Node::runner("service:updater"),
            EdgeKind::RunsAs,
            Node::principal("SYSTEM"),
        )
        .assert_edge(
            Node::principal("alice"),
            EdgeKind::MemberOf,
            Node::principal("tools-admins"),
        )
        .run()
        .unwrap();
}

#[test]
fn test_recollect_and_reload_is_stable() {
    host_tree(Scenario::new("Second collection reloads without new nodes"))
        .collect(inventory())
        .process()
        .collect(inventory())
        .process()
        .assert_no_failures()
        .assert_created(0)
        .assert_edge_count(EdgeKind::Forwards, 1)
        .assert_edge_count(EdgeKind::ExecutedBy, 1)
        .run()
        .unwrap();
}
