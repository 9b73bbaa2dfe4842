//! Proxy-chain scenario against live in-process listeners on the fixed
//! SOCKS5 and local reverse ports.
//!
//! Kept in its own test binary so nothing else in the process binds or
//! expects those ports to be closed.

mod common;

use std::sync::Arc;

use common::net::{start_echo, start_socks};
use common::{context, test_config, RecordingNode};
use cocoon_harness::probe::ProbeResponse;
use cocoon_harness::proxy_config::{LOCAL_REVERSE_PORT, SOCKS5_PORT};
use cocoon_harness::scenario::{run, Phase, ProxyChainOptions, ScenarioOutcome, ScenarioSpec};
use parking_lot::Mutex;
use tempfile::tempdir;

#[tokio::test]
async fn test_local_chain_answers_both_requests() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    start_socks(&format!("127.0.0.1:{SOCKS5_PORT}"), Arc::clone(&seen)).await;
    start_echo(&format!("127.0.0.1:{LOCAL_REVERSE_PORT}")).await;

    let dir = tempdir().unwrap();
    let local = RecordingNode::local();
    let ctx = context(&local, None, test_config(dir.path())).strict(true);
    let opts = ProxyChainOptions {
        fwd_policy: "tdx".into(),
        ..Default::default()
    };

    let report = run(&ScenarioSpec::ProxyChain(opts), &ctx).await.unwrap();
    assert!(!report.phases.contains(&Phase::LogCollection));
    let chain = match report.outcome {
        ScenarioOutcome::ProxyChain(chain) => chain,
        other => panic!("unexpected outcome {other:?}"),
    };

    let expected = ProbeResponse {
        status: 200,
        body: "Echo GET: /interesting\n".into(),
    };
    assert_eq!(chain.error, None);
    assert_eq!(chain.responses, vec![expected.clone(), expected]);
    assert!(chain.all_succeeded());
    assert_eq!(*seen.lock(), vec!["tdx".to_string(), "tdx".to_string()]);
}
