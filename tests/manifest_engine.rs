//! Integration tests for the manifest engine through the public library API.
//!
//! Edited manifests are pinned with inline `insta` snapshots so a change in
//! output is reviewed line by line. To update them after an intentional
//! change:
//! ```bash
//! cargo insta test --accept
//! ```

mod common;

use common::manifests;
use manifest_sweep::manifest::{
    self, Action, CoercionPolicy, FieldPath, QuotingPolicy, UpsertOptions,
};
use proptest::prelude::*;

fn path(text: &str) -> FieldPath {
    text.parse().unwrap()
}

fn edit(text: &str, field: &str, value: &str) -> String {
    manifest::edit(text, &path(field), value, UpsertOptions::default())
        .unwrap()
        .0
}

#[test]
fn test_insert_with_always_quote() {
    let options = UpsertOptions {
        quoting: QuotingPolicy::Always,
        ..UpsertOptions::default()
    };
    let (text, result) =
        manifest::edit(manifests::APPLICATION, &path("application.stack"), "python", options)
            .unwrap();

    assert_eq!(text, "application:\n  name: foo\n  stack: \"python\"\n");
    assert_eq!(result.action, Action::Inserted);
    assert_eq!(result.previous, None);
    assert!(result.coercions.is_empty());
}

#[test]
fn test_insert_into_commented_manifest() {
    let text = edit(manifests::COMMENTED, "applications.stack", "cflinuxfs4");
    insta::assert_snapshot!(text, @r###"
    # Deployment manifest for the billing service
    ---
    applications:
      # primary web process
      name: billing-web
      memory: 1G    # raised after the March incident
      instances: 2

      env:
        LOG_LEVEL: 'info'
        FEATURE_FLAGS: "a,b"
      stack: cflinuxfs4
    "###);
}

#[test]
fn test_nested_insert_creates_ancestors() {
    let text = edit(manifests::COMMENTED, "applications.env.STACK_VERSION", "4");
    insta::assert_snapshot!(text, @r###"
    # Deployment manifest for the billing service
    ---
    applications:
      # primary web process
      name: billing-web
      memory: 1G    # raised after the March incident
      instances: 2

      env:
        LOG_LEVEL: 'info'
        FEATURE_FLAGS: "a,b"
        STACK_VERSION: "4"
    "###);
}

#[test]
fn test_only_first_document_is_edited() {
    let text = edit("a: 1\n---\nb: 2\n", "c", "x");
    assert_eq!(text, "a: 1\nc: x\n---\nb: 2\n");
}

#[test]
fn test_anchors_and_merge_keys_survive() {
    let source = "defaults: &defaults\n  memory: 1G\napp:\n  <<: *defaults\n  name: foo\n";
    let text = edit(source, "app.stack", "python");
    assert_eq!(
        text,
        "defaults: &defaults\n  memory: 1G\napp:\n  <<: *defaults\n  name: foo\n  stack: python\n"
    );
}

#[test]
fn test_reserved_indicator_is_quoted_once() {
    let first = manifest::dump(&manifest::load(manifests::RESERVED_INDICATOR).unwrap());
    assert_eq!(first, "owner: \"@someuser\"\n");
    let second = manifest::dump(&manifest::load(&first).unwrap());
    assert_eq!(second, first);
}

#[test]
fn test_coercion_policies() {
    let rejected = manifest::edit(
        manifests::SEQUENCE,
        &path("applications.stack"),
        "python",
        UpsertOptions::default(),
    );
    assert!(rejected.is_err());

    let options = UpsertOptions {
        coercion: CoercionPolicy::Replace,
        ..UpsertOptions::default()
    };
    let (text, result) =
        manifest::edit(manifests::SEQUENCE, &path("applications.stack"), "python", options)
            .unwrap();
    assert_eq!(text, "applications:\n  stack: python\n");
    assert_eq!(result.coercions.len(), 1);
    assert_eq!(result.coercions[0].found, "Sequence");
}

proptest! {
    /// Writing the same value twice leaves the text of the first write.
    #[test]
    fn upsert_is_deterministic(
        key in "[a-z][a-z0-9_]{0,8}",
        value in "[a-z0-9][a-z0-9._-]{0,15}",
        quoting in prop_oneof![
            Just(QuotingPolicy::Never),
            Just(QuotingPolicy::IfNeeded),
            Just(QuotingPolicy::Always),
        ],
    ) {
        let field = path(&format!("applications.x_{}", key));
        let options = UpsertOptions { quoting, ..UpsertOptions::default() };

        let (first, _) = manifest::edit(manifests::COMMENTED, &field, &value, options).unwrap();
        let (second, result) = manifest::edit(&first, &field, &value, options).unwrap();

        prop_assert!(!result.changed);
        prop_assert_eq!(result.action, Action::Updated);
        prop_assert_eq!(result.previous.as_deref(), Some(value.as_str()));
        prop_assert_eq!(second, first);
    }

    /// Lines outside the mutated path are never touched.
    #[test]
    fn upsert_only_adds_or_replaces_one_line(value in "[a-z][a-z0-9-]{0,12}") {
        let (text, _) = manifest::edit(
            manifests::COMMENTED,
            &path("applications.stack"),
            &value,
            UpsertOptions::default(),
        )
        .unwrap();
        let before: Vec<&str> = manifests::COMMENTED.lines().collect();
        let after: Vec<&str> = text.lines().collect();
        prop_assert_eq!(after.len(), before.len() + 1);
        prop_assert_eq!(&after[..before.len()], &before[..]);
    }
}
