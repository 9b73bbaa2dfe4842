//! Tests for certificate provisioning.

mod common;

use std::path::Path;

use common::RecordingNode;
use cocoon_harness::certs::{generate_certificate, AttestationMode};
use cocoon_harness::HarnessError;

#[tokio::test]
async fn test_tdx_generation_runs_elevated_then_fixes_ownership() {
    let node = RecordingNode::remote();
    generate_certificate(node.as_ref(), Path::new("/tmp"), AttestationMode::Tdx, "target_proxy_tdx")
        .await
        .unwrap();

    assert_eq!(
        node.runs(),
        vec![
            "sudo /tmp/gen-cert --tdx tdx --name target_proxy_tdx --force",
            "sudo chown ubuntu:ubuntu target_proxy_tdx_key.pem",
            "sudo chown ubuntu:ubuntu target_proxy_tdx_cert.pem",
        ]
    );
}

#[tokio::test]
async fn test_fake_tdx_needs_no_ownership_fix() {
    let node = RecordingNode::local();
    generate_certificate(
        node.as_ref(),
        Path::new("./tee"),
        AttestationMode::FakeTdx,
        "local_proxy_fake_tdx",
    )
    .await
    .unwrap();

    assert_eq!(
        node.runs(),
        vec!["./tee/gen-cert --tdx fake_tdx --name local_proxy_fake_tdx --force"]
    );
}

#[tokio::test]
async fn test_none_generates_simulated_certificate() {
    let node = RecordingNode::local();
    generate_certificate(node.as_ref(), Path::new("./tee"), AttestationMode::None, "local_proxy_none")
        .await
        .unwrap();

    assert_eq!(
        node.runs(),
        vec!["./tee/gen-cert --tdx fake_tdx --name local_proxy_none --force"]
    );
}

#[tokio::test]
async fn test_failed_generation_skips_chown() {
    let node = RecordingNode::local();
    node.fail_runs_containing("gen-cert");
    let err = generate_certificate(node.as_ref(), Path::new("./tee"), AttestationMode::Tdx, "c")
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::ProcessExecution { .. }));
    assert_eq!(node.runs().len(), 1);
}
