// tests/s3_recurring_serialization.rs

//! S3: a recurring action submitted for a resource that already has a
//! one-shot action queued is blocked until the one-shot completes, per the
//! per-resource concurrency gate (§4.2 step 1).

use std::collections::HashMap;
use std::sync::Arc;

use ha_substrate::core::executor::{Executor, SubmitRequest};
use ha_substrate::core::identity::OperationIdentity;

mod common;
use common::NeverKnows;

fn request(rsc: &str, operation: &str, interval_ms: u64) -> SubmitRequest {
    SubmitRequest {
        rsc_id: rsc.to_string(),
        operation: operation.to_string(),
        interval_ms,
        timeout_ms: 5_000,
        class: "generic".to_string(),
        provider: None,
        agent: "dummy-agent".to_string(),
        parameters: HashMap::new(),
        synchronous: false,
        user_data: None,
        callback: None,
    }
}

#[tokio::test]
async fn monitor_is_blocked_behind_an_in_flight_start() {
    let mut ex = Executor::new("heartbeat", "1.0", Vec::new(), Arc::new(NeverKnows), Arc::new(NeverKnows));

    ex.submit(request("r1", "start", 0)).await.unwrap();
    let start_id = OperationIdentity::new("r1", "start", 0);
    assert_eq!(ex.in_flight_count(), 1);
    assert!(ex.tracked(&start_id).is_some());

    ex.submit(request("r1", "monitor", 5_000)).await.unwrap();
    let monitor_id = OperationIdentity::new("r1", "monitor", 5_000);

    // The resource's single concurrency slot is held by `start`; `monitor`
    // sits in the pending queue rather than running alongside it.
    assert_eq!(ex.in_flight_count(), 1);
    assert_eq!(ex.pending_count(), 1);
    assert!(ex.tracked(&monitor_id).is_some());
}
