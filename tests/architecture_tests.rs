//! Layering rules for the source tree.

mod support;

use support::architecture::{find_definitions_in_mod_files, find_lines_containing};

#[test]
fn domain_has_no_framework_or_outer_layer_imports() {
    let hits = find_lines_containing(
        "src/domain",
        &[
            "crate::adapter",
            "crate::infrastructure",
            "crate::application",
            "crate::port",
            "tokio::",
            "reqwest::",
        ],
    );

    assert!(
        hits.is_empty(),
        "found forbidden imports in domain layer: {hits:#?}"
    );
}

#[test]
fn ports_depend_only_on_domain() {
    let hits = find_lines_containing(
        "src/port",
        &["crate::adapter", "crate::infrastructure", "crate::application"],
    );

    assert!(
        hits.is_empty(),
        "ports should only reference domain types: {hits:#?}"
    );
}

#[test]
fn application_does_not_reach_into_orchestration_or_cli() {
    let hits = find_lines_containing(
        "src/application",
        &["crate::infrastructure::orchestration", "crate::adapter::inbound"],
    );

    assert!(
        hits.is_empty(),
        "application layer should not depend on process wiring: {hits:#?}"
    );
}

#[test]
fn outbound_adapters_do_not_depend_on_application() {
    let hits = find_lines_containing("src/adapter/outbound", &["crate::application"]);

    assert!(
        hits.is_empty(),
        "outbound adapters should not import application code: {hits:#?}"
    );
}

#[test]
fn mod_rs_declares_no_items() {
    let violations = find_definitions_in_mod_files("src");
    assert!(
        violations.is_empty(),
        "found item definitions in mod.rs files: {violations:#?}"
    );
}
