//! End-to-end quota behaviour through the public client context.

use std::sync::Arc;
use std::time::Duration;
use subzero_client::{
    api::{RateLimitCategory, RateLimitPolicy},
    config::Config,
    testing::{MockContracts, MockTransport, MockWallet},
    wallet::{ActorId, WalletProvider},
    ClientContext, ClientDeps, ClientError,
};

const USER: &str = "0xAbC0000000000000000000000000000000000001";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context_with(config: Config, wallet: Arc<MockWallet>, contracts: Arc<MockContracts>) -> ClientContext {
    let wallet: Arc<dyn WalletProvider> = wallet;
    ClientContext::new(
        Arc::new(config),
        ClientDeps {
            wallet: Some(wallet),
            transport: Arc::new(MockTransport::new()),
            contracts,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn sixth_write_in_a_minute_is_rejected_then_allowed() -> anyhow::Result<()> {
    init_logging();
    let wallet = Arc::new(MockWallet::with_accounts(&[USER]));
    let contracts = Arc::new(MockContracts::new());
    let ctx = context_with(Config::default(), wallet, contracts.clone());
    ctx.connect_wallet().await?;

    for _ in 0..5 {
        ctx.contracts.deposit_for_copy_trading("0.1").await?;
    }

    let err = ctx.contracts.deposit_for_copy_trading("0.1").await.unwrap_err();
    match &err {
        ClientError::RateLimited { category, retry_after } => {
            assert_eq!(category, "contract_write");
            assert!(*retry_after <= Duration::from_secs(60));
            assert!(*retry_after > Duration::ZERO);
        }
        other => panic!("expected a rate limit rejection, got {other}"),
    }
    assert_eq!(
        err.to_string(),
        "Rate limit exceeded for contract_write. Try again in 60s"
    );
    assert_eq!(contracts.send_count(), 5);

    tokio::time::advance(Duration::from_secs(60)).await;
    ctx.contracts.deposit_for_copy_trading("0.1").await?;
    assert_eq!(contracts.send_count(), 6);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn quotas_are_partitioned_by_actor_and_category() -> anyhow::Result<()> {
    init_logging();
    let mut config = Config::default();
    config
        .rate_limits
        .insert(RateLimitCategory::ContractWrite, RateLimitPolicy::new(1, Duration::from_secs(10)));
    let wallet = Arc::new(MockWallet::with_accounts(&[USER]));
    let contracts = Arc::new(MockContracts::new());
    contracts.set_read("depositedFunds", serde_json::json!("0"));
    let ctx = context_with(config, wallet, contracts);
    ctx.connect_wallet().await?;

    ctx.contracts.withdraw_from_vault("1").await?;
    assert!(matches!(
        ctx.contracts.withdraw_from_vault("1").await,
        Err(ClientError::RateLimited { .. })
    ));

    // reads draw from their own category
    ctx.contracts.get_deposited_funds(USER).await?;

    let actor = ActorId::from_address(USER);
    assert_eq!(
        ctx.limiter
            .get_remaining_requests(&actor, &RateLimitCategory::ContractWrite),
        0
    );
    assert_eq!(
        ctx.limiter
            .get_remaining_requests(&ActorId::from_address("0x0000000000000000000000000000000000000009"), &RateLimitCategory::ContractWrite),
        1
    );
    Ok(())
}

#[tokio::test]
async fn rejected_wallet_probe_does_not_consume_quota_when_provider_missing() -> anyhow::Result<()> {
    init_logging();
    let ctx = ClientContext::new(
        Arc::new(Config::default()),
        ClientDeps {
            wallet: None,
            transport: Arc::new(MockTransport::new()),
            contracts: Arc::new(MockContracts::new()),
        },
    );

    assert!(matches!(
        ctx.check_connection().await,
        Err(ClientError::ProviderUnavailable)
    ));
    let actor = ctx.connection.actor_id();
    assert_eq!(
        ctx.limiter.get_remaining_requests(&actor, &RateLimitCategory::Wallet),
        10
    );
    Ok(())
}
