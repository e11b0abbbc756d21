//! Wallet connection handling through the client context.

use std::sync::Arc;
use std::time::Duration;
use subzero_client::{
    config::Config,
    testing::{MockContracts, MockTransport, MockWallet},
    wallet::{WalletEvent, WalletProvider},
    ClientContext, ClientDeps, ClientError,
};

const ALICE: &str = "0xAbC0000000000000000000000000000000000001";

fn context(wallet: Arc<MockWallet>) -> ClientContext {
    let _ = env_logger::builder().is_test(true).try_init();
    let wallet: Arc<dyn WalletProvider> = wallet;
    ClientContext::new(
        Arc::new(Config::default()),
        ClientDeps {
            wallet: Some(wallet),
            transport: Arc::new(MockTransport::new()),
            contracts: Arc::new(MockContracts::new()),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn burst_of_checks_issues_one_probe() -> anyhow::Result<()> {
    let wallet = Arc::new(MockWallet::with_accounts(&[ALICE]).with_latency(Duration::from_millis(300)));
    let ctx = context(wallet.clone());

    let checks = (0..8).map(|_| ctx.check_connection());
    let results = futures::future::join_all(checks).await;
    for result in results {
        assert_eq!(result?.account.as_deref(), Some(ALICE));
    }
    assert_eq!(wallet.call_count("eth_accounts"), 1);

    // inside the cooldown nothing new goes out
    ctx.check_connection().await?;
    assert_eq!(wallet.call_count("eth_accounts"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_connect_fails_fast() -> anyhow::Result<()> {
    let wallet = Arc::new(MockWallet::with_accounts(&[ALICE]));
    let gate = wallet.hold_connect();
    let ctx = Arc::new(context(wallet.clone()));

    let first = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.connect_wallet().await })
    };
    tokio::task::yield_now().await;

    assert!(matches!(
        ctx.connect_wallet().await,
        Err(ClientError::ConnectionInProgress)
    ));
    gate.notify_one();
    let status = first.await??;
    assert!(status.is_connected);
    assert_eq!(wallet.call_count("eth_requestAccounts"), 1);
    Ok(())
}

#[tokio::test]
async fn user_rejection_is_reported_and_state_kept() -> anyhow::Result<()> {
    let wallet = Arc::new(MockWallet::with_accounts(&[ALICE]));
    wallet.reject_connect(true);
    let ctx = context(wallet);

    let err = ctx.connect_wallet().await.unwrap_err();
    assert_eq!(err.to_string(), "Connection rejected by user");
    assert!(!ctx.connection.snapshot().is_connected);
    assert!(!ctx.connection.is_connecting());
    Ok(())
}

#[tokio::test]
async fn wallet_events_update_actor() -> anyhow::Result<()> {
    let wallet = Arc::new(MockWallet::with_accounts(&[ALICE]));
    let ctx = context(wallet.clone());
    assert!(ctx.listen_for_wallet_events());
    let session_actor = ctx.connection.actor_id();

    wallet.emit(WalletEvent::AccountsChanged(vec![ALICE.to_string()]));
    for _ in 0..10 {
        if ctx.connection.current_account().is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(ctx.connection.actor_id().as_str(), ALICE.to_lowercase());
    assert_ne!(ctx.connection.actor_id(), session_actor);
    ctx.shutdown();
    Ok(())
}
