// src/api/models.rs
//! Request and response bodies for the trading API.

use crate::error::{ClientError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowTraderRequest {
    pub follower_address: String,
    pub trader_address: String,
    pub allocation_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfollowTraderRequest {
    pub follower_address: String,
    pub trader_address: String,
}

/// Records an executed on-chain trade with the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub user_address: String,
    pub asset_symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_avax: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_amount_avax: Option<f64>,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderPerformance {
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub profitable_trades: u64,
    #[serde(default)]
    pub win_rate: String,
    #[serde(default)]
    pub total_pnl: f64,
    #[serde(default)]
    pub followers_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardTrader {
    pub rank: u32,
    pub trader_address: String,
    #[serde(flatten)]
    pub performance: TraderPerformance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderBreakdown {
    pub active_traders: u64,
    pub copy_traders: u64,
    pub new_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardTrader>,
    #[serde(default)]
    pub total_traders: u64,
    #[serde(default)]
    pub breakdown: Option<TraderBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowedTrader {
    pub trader_address: String,
    pub allocation_percentage: u8,
    #[serde(default)]
    pub deposited_amount: Option<f64>,
    pub following_since: String,
    pub performance: TraderPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowingResponse {
    #[serde(default)]
    pub following: Vec<FollowedTrader>,
}

/// One mirrored trade; older backend versions use `asset`/`amount` instead of the prefixed names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyTradeRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub trader_address: Option<String>,
    #[serde(default)]
    pub follower_address: Option<String>,
    #[serde(default, alias = "asset")]
    pub asset_symbol: Option<String>,
    #[serde(default, alias = "amount")]
    pub copied_amount: Option<String>,
    pub created_at: String,
    pub status: String,
    #[serde(default)]
    pub pnl: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyHistoryResponse {
    #[serde(default)]
    pub copy_trades: Vec<CopyTradeRecord>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopTrader {
    pub trader_address: String,
    pub total_trades: u64,
    pub total_pnl: f64,
    pub followers_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyTradingStatistics {
    pub total_relationships: u64,
    pub active_relationships: u64,
    pub total_copied_trades: u64,
    pub recent_trades_24h: u64,
    #[serde(default)]
    pub top_traders: Vec<TopTrader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub statistics: CopyTradingStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_traders_found: u64,
    pub processed_traders: u64,
    pub skipped_traders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub message: String,
    pub stats: SyncStats,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected id, got {}", other))),
    }
}

/// Decodes a `{success, ...payload}` envelope, treating `success: false` as an API error
pub fn decode_envelope<T: DeserializeOwned>(body: Value) -> Result<T> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request was not successful")
            .to_string();
        return Err(ClientError::Api { status: 200, message });
    }
    Ok(serde_json::from_value(body)?)
}
