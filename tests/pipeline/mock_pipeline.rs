use std::time::Duration;

use crate::support::{
    helpers::{
        contract_address, init_tracing, ping_topic, start_relay, test_config, wait_for_checkpoint,
    },
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::Result;
use pongrelay::{Checkpoint, CheckpointStore, FileCheckpointStore};
use tokio::time::sleep;

fn resumed_checkpoint(last_processed: u64) -> Checkpoint {
    Checkpoint {
        starting_block: 1,
        last_processed_block: Some(last_processed),
        handled_events: Default::default(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backfills_missed_blocks_and_responds() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("checkpoint.json");

    // Tracking previously reached block 1; blocks 2..=5 happened offline.
    let store = FileCheckpointStore::new(&state_path);
    store.save(&resumed_checkpoint(1)).await?;

    let chain = MockChain::new(5, &contract_address(), &ping_topic());
    let key_a = chain.add_ping(2, 0xa1);
    let key_b = chain.add_ping(4, 0xb2);
    let server = MockRpcServer::start(chain.clone()).await?;

    let relay = start_relay(test_config(server.url(), &state_path))?;
    let checkpoint = wait_for_checkpoint(&state_path, Duration::from_secs(5), |checkpoint| {
        checkpoint.last_processed_block == Some(5)
    })
    .await?;

    assert!(checkpoint.is_handled(&key_a), "block 2 event must be handled");
    assert!(checkpoint.is_handled(&key_b), "block 4 event must be handled");
    assert_eq!(chain.sent_count(), 2, "one response per event");

    relay.stop().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn follows_live_blocks() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("checkpoint.json");

    let chain = MockChain::new(3, &contract_address(), &ping_topic());
    let server = MockRpcServer::start(chain.clone()).await?;

    let relay = start_relay(test_config(server.url(), &state_path))?;

    // Fresh start initializes at the current height.
    let checkpoint = wait_for_checkpoint(&state_path, Duration::from_secs(5), |checkpoint| {
        checkpoint.starting_block == 3
    })
    .await?;
    assert!(checkpoint.handled_events.is_empty());

    // New blocks arrive, one of them carrying a Ping.
    let key = chain.add_ping(5, 0xc3);
    chain.advance_tip_to(6);

    let checkpoint = wait_for_checkpoint(&state_path, Duration::from_secs(5), |checkpoint| {
        checkpoint.last_processed_block == Some(6)
    })
    .await?;
    assert!(checkpoint.is_handled(&key));
    assert_eq!(chain.sent_count(), 1);

    relay.stop().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_submission_leaves_checkpoint_and_self_heals() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("checkpoint.json");

    let store = FileCheckpointStore::new(&state_path);
    store.save(&resumed_checkpoint(1)).await?;

    let chain = MockChain::new(3, &contract_address(), &ping_topic());
    let key = chain.add_ping(2, 0xd4);
    chain.set_fail_sends(true);
    let server = MockRpcServer::start(chain.clone()).await?;

    let relay = start_relay(test_config(server.url(), &state_path))?;

    // Every submission attempt fails, so the checkpoint must stay put while
    // the pipeline keeps running.
    sleep(Duration::from_millis(400)).await;
    let checkpoint = wait_for_checkpoint(&state_path, Duration::from_secs(1), |_| true).await?;
    assert_eq!(
        checkpoint.last_processed_block,
        Some(1),
        "checkpoint must not advance past the failing block"
    );
    assert!(!checkpoint.is_handled(&key));
    assert_eq!(chain.sent_count(), 0);

    // Once the chain accepts transactions again the same block is retried
    // without a restart.
    chain.set_fail_sends(false);
    let checkpoint = wait_for_checkpoint(&state_path, Duration::from_secs(5), |checkpoint| {
        checkpoint.last_processed_block == Some(3)
    })
    .await?;
    assert!(checkpoint.is_handled(&key));
    assert_eq!(chain.sent_count(), 1);

    relay.stop().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirmation_waits_through_receipt_polls() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("checkpoint.json");

    let store = FileCheckpointStore::new(&state_path);
    store.save(&resumed_checkpoint(1)).await?;

    let chain = MockChain::new(2, &contract_address(), &ping_topic());
    chain.set_receipt_delay(3);
    let key = chain.add_ping(2, 0xe5);
    let server = MockRpcServer::start(chain.clone()).await?;

    let relay = start_relay(test_config(server.url(), &state_path))?;
    let checkpoint = wait_for_checkpoint(&state_path, Duration::from_secs(5), |checkpoint| {
        checkpoint.last_processed_block == Some(2)
    })
    .await?;

    assert!(checkpoint.is_handled(&key));
    assert_eq!(chain.sent_count(), 1);

    relay.stop().await?;
    server.shutdown().await;
    Ok(())
}
