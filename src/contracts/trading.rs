// src/contracts/trading.rs
use super::assets::{get_asset_bytes32, symbol_for_bytes32};
use super::backend::{TxOptions, TxReceipt};
use super::ContractClient;
use crate::error::{ClientError, Result};
use crate::utils::{format_ether, parse_ether, value_to_i128, value_to_u128};
use serde::Serialize;
use serde_json::{json, Value};

const INVEST_GAS_LIMIT: u64 = 300_000;
const CLOSE_GAS_LIMIT: u64 = 300_000;
const SELL_PARTIAL_GAS_LIMIT: u64 = 500_000;

/// Aggregate position value, in AVAX
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UserTotalValue {
    pub total_invested: f64,
    pub total_pnl: f64,
}

impl UserTotalValue {
    pub fn current_value(&self) -> f64 {
        self.total_invested + self.total_pnl
    }

    pub fn profit_percentage(&self) -> f64 {
        if self.total_invested > 0.0 {
            self.total_pnl / self.total_invested * 100.0
        } else {
            0.0
        }
    }
}

fn signed_ether(wei: i128) -> f64 {
    let sign = if wei < 0 { -1.0 } else { 1.0 };
    sign * format_ether(wei.unsigned_abs())
}

fn decode_symbols(value: &Value) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| ClientError::Parse(format!("Expected bytes32[], got {}", value)))?;
    items
        .iter()
        .map(|item| {
            let raw = item
                .as_str()
                .ok_or_else(|| ClientError::Parse(format!("Expected bytes32, got {}", item)))?;
            Ok(symbol_for_bytes32(raw).map(str::to_string).unwrap_or_else(|| raw.to_string()))
        })
        .collect()
}

impl ContractClient {
    pub async fn invest_in_asset(&self, symbol: &str, amount_avax: &str) -> Result<TxReceipt> {
        let asset = get_asset_bytes32(symbol)?;
        let value = parse_ether(amount_avax)?;
        if value == 0 {
            return Err(ClientError::InvalidInput("Investment amount must be positive".to_string()));
        }
        self.write(
            &self.trading_address,
            "investInAsset",
            vec![json!(asset)],
            TxOptions::gas(INVEST_GAS_LIMIT).with_value(value),
            "Invest",
        )
        .await
    }

    pub async fn close_position_by_asset(&self, symbol: &str) -> Result<TxReceipt> {
        let asset = get_asset_bytes32(symbol)?;
        self.write(
            &self.trading_address,
            "closePositionByAsset",
            vec![json!(asset)],
            TxOptions::gas(CLOSE_GAS_LIMIT),
            "Close position",
        )
        .await
    }

    pub async fn sell_partial(&self, symbol: &str, amount_avax: &str) -> Result<TxReceipt> {
        let asset = get_asset_bytes32(symbol)?;
        let amount = parse_ether(amount_avax)?;
        if amount == 0 {
            return Err(ClientError::InvalidInput("Sell amount must be positive".to_string()));
        }
        self.write(
            &self.trading_address,
            "sellPartial",
            vec![json!(asset), json!(amount.to_string())],
            TxOptions::gas(SELL_PARTIAL_GAS_LIMIT),
            "Partial sell",
        )
        .await
    }

    /// Amount invested by `user` in `symbol`, in AVAX
    pub async fn get_user_asset_investment(&self, user: &str, symbol: &str) -> Result<f64> {
        let asset = get_asset_bytes32(symbol)?;
        let value = self
            .read(&self.trading_address, "getUserAssetInvestment", vec![json!(user), json!(asset)])
            .await?;
        Ok(format_ether(value_to_u128(&value)?))
    }

    /// Symbols `user` holds; bytes32 values outside the registry are returned as hex
    pub async fn get_user_assets(&self, user: &str) -> Result<Vec<String>> {
        let value = self.read(&self.trading_address, "getUserAssets", vec![json!(user)]).await?;
        decode_symbols(&value)
    }

    /// Raw on-chain price for `symbol`
    pub async fn get_current_asset_price(&self, symbol: &str) -> Result<u128> {
        let asset = get_asset_bytes32(symbol)?;
        let value = self
            .read(&self.trading_address, "getCurrentAssetPrice", vec![json!(asset)])
            .await?;
        value_to_u128(&value)
    }

    /// Profit or loss on one asset, in AVAX
    pub async fn get_user_asset_pnl(&self, user: &str, symbol: &str) -> Result<f64> {
        let asset = get_asset_bytes32(symbol)?;
        let value = self
            .read(&self.trading_address, "getUserAssetPnL", vec![json!(user), json!(asset)])
            .await?;
        Ok(signed_ether(value_to_i128(&value)?))
    }

    pub async fn get_user_total_value(&self, user: &str) -> Result<UserTotalValue> {
        let value = self.read(&self.trading_address, "getUserTotalValue", vec![json!(user)]).await?;
        match value.as_array().map(Vec::as_slice) {
            Some([invested, pnl]) => Ok(UserTotalValue {
                total_invested: format_ether(value_to_u128(invested)?),
                total_pnl: signed_ether(value_to_i128(pnl)?),
            }),
            _ => Err(ClientError::Parse(format!(
                "getUserTotalValue: expected (uint256, int256), got {}",
                value
            ))),
        }
    }

    pub async fn get_supported_assets(&self) -> Result<Vec<String>> {
        let value = self.read(&self.trading_address, "getSupportedAssets", vec![]).await?;
        decode_symbols(&value)
    }
}
