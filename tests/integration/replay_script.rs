//! Replay script tests
//!
//! Scripts go through the same JSON path the binary uses: file on disk,
//! `load_script`, `run_script`, JSON output lines.

use std::io::Write;

use qos_policy_exchange::config::ExchangeConfig;
use qos_policy_exchange::replay::{load_script, run_script, ReplayOutput};
use tempfile::NamedTempFile;

fn write_script(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[tokio::test(start_paused = true)]
async fn test_session_with_consumer_swap() {
    let file = write_script(
        r#"[
        { "type": "attach", "consumer": "hal-a" },
        { "type": "submit", "dialog_token": 1, "operations": [
            { "op": "add", "rule_id": 1, "dscp": 46, "classifier": { "is_valid": true } }
        ] },
        { "type": "submit", "dialog_token": 2, "operations": [
            { "op": "add", "rule_id": 2, "dscp": 46, "classifier": { "is_valid": false } }
        ] },
        { "type": "attach", "consumer": "hal-b" },
        { "type": "dump" },
        { "type": "attach", "consumer": "hal-b" },
        { "type": "submit", "dialog_token": 3, "operations": [] },
        { "type": "dump" }
    ]"#,
    );

    let events = load_script(file.path()).unwrap();
    let output = run_script(&ExchangeConfig::default(), events).await.unwrap();

    let lines: Vec<String> = output.iter().map(|l| l.to_json().unwrap()).collect();
    assert_eq!(lines.len(), 4, "{lines:#?}");

    // Batch 1 was dropped by the swap, batch 2 declined locally
    let ReplayOutput::Response(second) = &output[0] else {
        panic!("expected response, got {}", lines[0]);
    };
    assert_eq!(second.dialog_token, 2);
    assert!(matches!(output[1], ReplayOutput::Dump(_)));

    let ReplayOutput::Response(third) = &output[2] else {
        panic!("expected response, got {}", lines[2]);
    };
    assert_eq!(third.dialog_token, 3);

    let ReplayOutput::Dump(last) = &output[3] else {
        panic!("expected dump, got {}", lines[3]);
    };
    assert_eq!(last.stats.batches_discarded, 1);
    assert_eq!(last.stats.batches_completed, 2);
    assert!(lines[3].starts_with(r#"{"type":"dump""#));
}

#[tokio::test(start_paused = true)]
async fn test_session_stall() {
    let file = write_script(
        r#"[
        { "type": "attach", "consumer": "hal" },
        { "type": "submit", "dialog_token": 9, "operations": [
            { "op": "add", "rule_id": 1, "dscp": 10, "classifier": { "is_valid": true } },
            { "op": "remove", "rule_id": 4 }
        ] },
        { "type": "wait", "ms": 2000 },
        { "type": "outcome", "rule_id": 1, "status": "success" }
    ]"#,
    );

    let events = load_script(file.path()).unwrap();
    let output = run_script(&ExchangeConfig::default(), events).await.unwrap();

    assert_eq!(
        output,
        vec![ReplayOutput::Reset {
            interface: "wlan0".into()
        }]
    );
}
