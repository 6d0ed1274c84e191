use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use eth_tx_tracker::api::QueryFacade;
use eth_tx_tracker::blockchain::{PassOutcome, RpcClient, Tracker, TrackerState};
use eth_tx_tracker::config::BlockSelector;
use eth_tx_tracker::error::RpcError;
use eth_tx_tracker::models::Transaction;
use eth_tx_tracker::retry::RetryConfig;
use eth_tx_tracker::store::Store;

const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

fn tx_json(hash: &str, from: &str, to: &str) -> Value {
    json!({"hash": hash, "from": from, "to": to, "value": "0x0", "gas": "0x5208"})
}

fn block_response(number: u64, transactions: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "number": format!("{:#x}", number),
            "transactions": transactions
        }
    }))
}

async fn serve_block(server: &MockServer, number: u64, transactions: Vec<Value>) {
    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(block_response(number, transactions))
        .mount(server)
        .await;
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn tracker_for(server: &MockServer, store: Arc<Store>, poll_interval: Duration, retry: RetryConfig) -> Tracker {
    let rpc_client = RpcClient::new(server.uri(), BlockSelector::Finalized, Duration::from_secs(2))
        .expect("Failed to create client");
    Tracker::new(rpc_client, store, poll_interval, retry)
}

#[tokio::test]
async fn test_pass_indexes_only_subscribed_addresses() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let facade = QueryFacade::new(Arc::clone(&store));
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(1));

    assert!(facade.subscribe(A));
    serve_block(
        &mock_server,
        100,
        vec![tx_json("0x01", A, B), tx_json("0x02", C, A), tx_json("0x03", B, C)],
    )
    .await;

    let outcome = tracker.run_pass(&CancellationToken::new()).await;

    assert_eq!(outcome, Ok(PassOutcome::Indexed { block_number: 100, matched: 2 }));
    assert_eq!(facade.get_current_block(), 100);
    assert_eq!(
        facade.get_transactions(A),
        vec![Transaction::new("0x01", A, B), Transaction::new("0x02", C, A)]
    );
    assert!(facade.get_transactions(B).is_empty());
    assert!(facade.get_transactions(C).is_empty());
}

#[tokio::test]
async fn test_history_accumulates_across_passes() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let facade = QueryFacade::new(Arc::clone(&store));
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(1));
    let cancel = CancellationToken::new();

    facade.subscribe(A);

    serve_block(&mock_server, 100, vec![tx_json("0x01", A, B)]).await;
    tracker.run_pass(&cancel).await.unwrap();

    serve_block(&mock_server, 101, vec![tx_json("0x02", C, A)]).await;
    tracker.run_pass(&cancel).await.unwrap();

    assert_eq!(facade.get_current_block(), 101);
    assert_eq!(
        facade.get_transactions(A),
        vec![Transaction::new("0x01", A, B), Transaction::new("0x02", C, A)]
    );
}

#[tokio::test]
async fn test_repeated_block_is_not_indexed_twice() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    store.add_subscriber(A);
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(1));
    let cancel = CancellationToken::new();

    serve_block(&mock_server, 100, vec![tx_json("0x01", A, B)]).await;

    assert_eq!(
        tracker.run_pass(&cancel).await,
        Ok(PassOutcome::Indexed { block_number: 100, matched: 1 })
    );
    assert_eq!(
        tracker.run_pass(&cancel).await,
        Ok(PassOutcome::AlreadyIndexed { block_number: 100 })
    );
    assert_eq!(store.get_transactions_by_address(A).len(), 1);
}

#[tokio::test]
async fn test_failed_pass_changes_nothing() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    store.add_subscriber(A);
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(1));
    let cancel = CancellationToken::new();

    serve_block(&mock_server, 100, vec![tx_json("0x01", A, B)]).await;
    tracker.run_pass(&cancel).await.unwrap();

    let failures = vec![
        ResponseTemplate::new(500).set_body_string("Internal Server Error"),
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "header not found"}
        })),
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": {"number": "0xzz", "transactions": []}
        })),
    ];

    for failure in failures {
        mock_server.reset().await;
        Mock::given(method("POST")).respond_with(failure).mount(&mock_server).await;

        assert!(tracker.run_pass(&cancel).await.is_err());
        assert_eq!(store.get_latest_block(), 100);
        assert_eq!(store.get_transactions_by_address(A), vec![Transaction::new("0x01", A, B)]);
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried_within_pass() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    store.add_subscriber(B);
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(3));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(block_response(7, vec![tx_json("0x01", A, B)]))
        .mount(&mock_server)
        .await;

    let outcome = tracker.run_pass(&CancellationToken::new()).await;

    assert_eq!(outcome, Ok(PassOutcome::Indexed { block_number: 7, matched: 1 }));
    assert_eq!(store.get_latest_block(), 7);
}

#[tokio::test]
async fn test_remote_error_is_not_retried() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(5));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = tracker.run_pass(&CancellationToken::new()).await;
    assert!(matches!(outcome, Err(RpcError::Remote { code: -32601, .. })));
}

#[tokio::test]
async fn test_pass_without_subscribers_only_records_height() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let tracker = tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(1));

    serve_block(&mock_server, 55, vec![tx_json("0x01", A, B)]).await;

    let outcome = tracker.run_pass(&CancellationToken::new()).await;

    assert_eq!(outcome, Ok(PassOutcome::NoSubscribers { block_number: 55 }));
    assert_eq!(store.get_latest_block(), 55);
    assert_eq!(store.transaction_count(), 0);
}

#[tokio::test]
async fn test_run_loop_polls_until_cancelled() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    store.add_subscriber(A);
    let tracker = Arc::new(tracker_for(
        &mock_server,
        Arc::clone(&store),
        Duration::from_millis(50),
        fast_retry(1),
    ));
    serve_block(&mock_server, 200, vec![tx_json("0x01", A, B)]).await;

    let cancel = CancellationToken::new();
    let handle = {
        let tracker = Arc::clone(&tracker);
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run(cancel).await })
    };

    timeout(Duration::from_secs(5), async {
        while store.get_latest_block() != 200 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Tracker never indexed the block");

    cancel.cancel();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("Tracker did not stop")
        .unwrap();

    assert_eq!(tracker.state(), TrackerState::Stopped);
    // Later ticks saw the same block and skipped it
    assert_eq!(store.get_transactions_by_address(A).len(), 1);
}

#[tokio::test]
async fn test_run_loop_survives_failing_node() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let tracker = Arc::new(tracker_for(
        &mock_server,
        Arc::clone(&store),
        Duration::from_millis(20),
        fast_retry(1),
    ));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    let handle = {
        let tracker = Arc::clone(&tracker);
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run(cancel).await })
    };

    sleep(Duration::from_millis(150)).await;
    assert_eq!(store.get_latest_block(), 0);

    // Node recovers; the loop picks up on a later tick
    serve_block(&mock_server, 9, vec![]).await;
    timeout(Duration::from_secs(5), async {
        while store.get_latest_block() != 9 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Tracker did not recover");

    cancel.cancel();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_backoff() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let retry = RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    let tracker = Arc::new(tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), retry));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    let pass = {
        let tracker = Arc::clone(&tracker);
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run_pass(&cancel).await })
    };

    sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let outcome = timeout(Duration::from_secs(5), pass)
        .await
        .expect("Pass kept waiting after cancellation")
        .unwrap();
    assert!(matches!(outcome, Err(RpcError::Transport(_))));
    assert_eq!(store.get_latest_block(), 0);
}

#[tokio::test]
async fn test_overlapping_pass_is_skipped() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let tracker = Arc::new(tracker_for(&mock_server, Arc::clone(&store), Duration::from_secs(5), fast_retry(1)));

    Mock::given(method("POST"))
        .respond_with(block_response(3, vec![]).set_delay(Duration::from_millis(300)))
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    let first = {
        let tracker = Arc::clone(&tracker);
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run_pass(&cancel).await })
    };

    sleep(Duration::from_millis(50)).await;
    assert_eq!(tracker.state(), TrackerState::Polling);
    assert_eq!(tracker.run_pass(&cancel).await, Ok(PassOutcome::Skipped));

    assert_eq!(
        first.await.unwrap(),
        Ok(PassOutcome::NoSubscribers { block_number: 3 })
    );
    assert_eq!(tracker.state(), TrackerState::Idle);
}

#[tokio::test]
async fn test_subscriptions_during_polling() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(Store::new());
    let facade = QueryFacade::new(Arc::clone(&store));
    let tracker = Arc::new(tracker_for(
        &mock_server,
        Arc::clone(&store),
        Duration::from_millis(10),
        fast_retry(1),
    ));
    serve_block(&mock_server, 1, vec![tx_json("0x01", A, B)]).await;

    let cancel = CancellationToken::new();
    let handle = {
        let tracker = Arc::clone(&tracker);
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run(cancel).await })
    };

    let mut subscribers = Vec::new();
    for i in 0..20u32 {
        let facade = facade.clone();
        subscribers.push(tokio::spawn(async move {
            let address = format!("0x{:040x}", i + 1);
            assert!(facade.subscribe(&address));
            facade.get_transactions(&address)
        }));
    }
    for handle in subscribers {
        assert!(handle.await.unwrap().is_empty());
    }

    cancel.cancel();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

    assert_eq!(store.subscriber_count(), 20);
}
