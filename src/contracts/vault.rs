// src/contracts/vault.rs
//! Copy-trading vault: deposits, follow relationships and per-asset mirrored positions.

use super::assets::get_asset_bytes32;
use super::backend::{ContractEvent, TxOptions, TxReceipt};
use super::{invalidate_reads, ContractClient};
use crate::error::{ClientError, Result};
use crate::utils::{format_ether, is_valid_address, parse_ether, value_to_u128};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const DEPOSIT_GAS_LIMIT: u64 = 200_000;
const FOLLOW_GAS_LIMIT: u64 = 150_000;
const UNFOLLOW_GAS_LIMIT: u64 = 100_000;
const WITHDRAW_GAS_LIMIT: u64 = 150_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CopyTradingInfo {
    /// AVAX
    pub deposited_balance: f64,
    pub total_following: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowingStatus {
    pub is_following: bool,
    pub percentage: u64,
}

fn as_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| ClientError::Parse(format!("Expected bool, got {}", value)))
}

fn positive_amount(amount_avax: &str) -> Result<u128> {
    let wei = parse_ether(amount_avax)?;
    if wei == 0 {
        return Err(ClientError::InvalidInput("Amount must be positive".to_string()));
    }
    Ok(wei)
}

impl ContractClient {
    /// Forward vault events to `handler` until the backend's stream closes.
    ///
    /// Cached reads mentioning any address in an event are dropped before `handler` sees it.
    /// Returns `None` when the backend does not stream events.
    pub fn listen_to_vault_events<F>(&self, handler: F) -> Option<JoinHandle<()>>
    where
        F: Fn(ContractEvent) + Send + 'static,
    {
        let mut events = self.backend.subscribe(&self.vault_address)?;
        let governor = self.governor.clone();
        let vault = self.vault_address.clone();
        info!("Listening to vault events on {}", vault);

        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.contract.eq_ignore_ascii_case(&vault) => {
                        debug!("Vault event {} in {}", event.name, event.transaction_hash);
                        for address in event.addresses() {
                            invalidate_reads(&governor, &address);
                        }
                        handler(event);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Vault event listener lagged, skipped {} events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Vault event stream closed");
        }))
    }

    pub async fn deposit_for_copy_trading(&self, amount_avax: &str) -> Result<TxReceipt> {
        let value = positive_amount(amount_avax)?;
        self.write(
            &self.vault_address,
            "depositForCopyTrading",
            vec![],
            TxOptions::gas(DEPOSIT_GAS_LIMIT).with_value(value),
            "Deposit",
        )
        .await
    }

    /// Mirror `percentage` (1..=100) of `trader`'s trades. Arguments are checked before
    /// anything touches the rate limiter or the network.
    pub async fn follow_trader(&self, trader: &str, percentage: u8) -> Result<TxReceipt> {
        if !is_valid_address(trader) {
            return Err(ClientError::InvalidInput("Invalid trader address".to_string()));
        }
        if !(1..=100).contains(&percentage) {
            return Err(ClientError::InvalidInput(
                "Percentage must be between 1 and 100".to_string(),
            ));
        }
        self.write(
            &self.vault_address,
            "followTrader",
            vec![json!(trader), json!(percentage.to_string())],
            TxOptions::gas(FOLLOW_GAS_LIMIT),
            "Follow trader",
        )
        .await
    }

    pub async fn unfollow_trader(&self, trader: &str) -> Result<TxReceipt> {
        if !is_valid_address(trader) {
            return Err(ClientError::InvalidInput("Invalid trader address".to_string()));
        }
        self.write(
            &self.vault_address,
            "unfollowTrader",
            vec![json!(trader)],
            TxOptions::gas(UNFOLLOW_GAS_LIMIT),
            "Unfollow trader",
        )
        .await
    }

    pub async fn withdraw_from_vault(&self, amount_avax: &str) -> Result<TxReceipt> {
        let amount = positive_amount(amount_avax)?;
        self.write(
            &self.vault_address,
            "withdrawFunds",
            vec![json!(amount.to_string())],
            TxOptions::gas(WITHDRAW_GAS_LIMIT),
            "Withdrawal",
        )
        .await
    }

    pub async fn get_user_copy_info(&self, user: &str) -> Result<CopyTradingInfo> {
        let value = self.read(&self.vault_address, "getUserCopyInfo", vec![json!(user)]).await?;
        match value.as_array().map(Vec::as_slice) {
            Some([deposited, following]) => {
                let total_following = u64::try_from(value_to_u128(following)?)
                    .map_err(|_| ClientError::Parse(format!("following count out of range: {}", following)))?;
                Ok(CopyTradingInfo {
                    deposited_balance: format_ether(value_to_u128(deposited)?),
                    total_following,
                })
            }
            _ => Err(ClientError::Parse(format!(
                "getUserCopyInfo: expected (uint256, uint256), got {}",
                value
            ))),
        }
    }

    pub async fn check_is_following(&self, follower: &str, trader: &str) -> Result<FollowingStatus> {
        let args = vec![json!(follower), json!(trader)];
        let (is_following, percentage) = futures::try_join!(
            self.read(&self.vault_address, "isFollowing", args.clone()),
            self.read(&self.vault_address, "copyPercentage", args),
        )?;
        let percentage = u64::try_from(value_to_u128(&percentage)?)
            .map_err(|_| ClientError::Parse("copy percentage out of range".to_string()))?;
        Ok(FollowingStatus {
            is_following: as_bool(&is_following)?,
            percentage,
        })
    }

    /// AVAX held in the vault for `user`
    pub async fn get_deposited_funds(&self, user: &str) -> Result<f64> {
        let value = self.read(&self.vault_address, "depositedFunds", vec![json!(user)]).await?;
        Ok(format_ether(value_to_u128(&value)?))
    }

    pub async fn get_vault_position(&self, user: &str, symbol: &str) -> Result<f64> {
        let asset = get_asset_bytes32(symbol)?;
        let value = self
            .read(&self.vault_address, "vaultPositions", vec![json!(user), json!(asset)])
            .await?;
        Ok(format_ether(value_to_u128(&value)?))
    }

    pub async fn check_is_authorized_executor(&self, executor: &str) -> Result<bool> {
        let value = self
            .read(&self.vault_address, "isAuthorizedExecutor", vec![json!(executor)])
            .await?;
        as_bool(&value)
    }
}
