use crate::error::ClientError;
use log::info;
use serde_json::Value;

pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;

pub fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized.");
    Ok(())
}

/// `0x` followed by 20 hex-encoded bytes, any case
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(body) if body.len() == 40 => hex::decode(body).is_ok(),
        _ => false,
    }
}

/// Decimal ether amount ("0.25") to wei
pub fn parse_ether(amount: &str) -> Result<u128, ClientError> {
    let amount = amount.trim();
    let invalid = || ClientError::InvalidInput(format!("Invalid AVAX amount: '{}'", amount));

    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(ClientError::InvalidInput(format!(
            "AVAX amount '{}' has more than {} decimals",
            amount, ETHER_DECIMALS
        )));
    }

    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .ok()
            .and_then(|w| w.checked_mul(WEI_PER_ETHER))
            .ok_or_else(invalid)?
    };
    let fraction_wei = if fraction.is_empty() {
        0
    } else {
        format!("{:0<width$}", fraction, width = ETHER_DECIMALS)
            .parse::<u128>()
            .map_err(|_| invalid())?
    };
    whole_wei.checked_add(fraction_wei).ok_or_else(invalid)
}

/// Wei to a floating ether amount, for display
pub fn format_ether(wei: u128) -> f64 {
    let whole = (wei / WEI_PER_ETHER) as f64;
    let fraction = (wei % WEI_PER_ETHER) as f64 / WEI_PER_ETHER as f64;
    whole + fraction
}

/// `0x`-prefixed JSON-RPC quantity
pub fn parse_hex_quantity(raw: &str) -> Result<u128, ClientError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ClientError::Parse(format!("Expected hex quantity, got '{}'", raw)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ClientError::Parse(format!("Bad hex quantity '{}': {}", raw, e)))
}

/// Unsigned integer result from a contract call: decimal string, hex string or JSON number
pub fn value_to_u128(value: &Value) -> Result<u128, ClientError> {
    match value {
        Value::String(s) if s.starts_with("0x") => parse_hex_quantity(s),
        Value::String(s) => s
            .parse()
            .map_err(|e| ClientError::Parse(format!("Bad uint '{}': {}", s, e))),
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| ClientError::Parse(format!("Bad uint {}", n))),
        other => Err(ClientError::Parse(format!("Expected uint, got {}", other))),
    }
}

/// Signed integer result from a contract call (PnL values)
pub fn value_to_i128(value: &Value) -> Result<i128, ClientError> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|e| ClientError::Parse(format!("Bad int '{}': {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| ClientError::Parse(format!("Bad int {}", n))),
        other => Err(ClientError::Parse(format!("Expected int, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("0xefF79F639543f38223e02DbaBAE4200Df2b7A2F4"));
        assert!(!is_valid_address("efF79F639543f38223e02DbaBAE4200Df2b7A2F4"));
        assert!(!is_valid_address("0xefF79F639543f38223e02DbaBAE4200Df2b7A2F"));
        assert!(!is_valid_address("0xZZF79F639543f38223e02DbaBAE4200Df2b7A2F4"));
    }

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_ether("0.5").unwrap(), WEI_PER_ETHER / 2);
        assert_eq!(parse_ether(".001").unwrap(), 1_000_000_000_000_000);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
        assert!(parse_ether("").is_err());
        assert!(parse_ether("-1").is_err());
        assert!(parse_ether("1.2.3").is_err());
        assert!(parse_ether("0.0000000000000000001").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_approx_eq!(format_ether(WEI_PER_ETHER * 3 / 2), 1.5);
        assert_approx_eq!(format_ether(parse_ether("12.3456").unwrap()), 12.3456);
        assert_approx_eq!(format_ether(0), 0.0);
    }

    #[test]
    fn test_contract_value_decoding() {
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_hex_quantity("0x").unwrap(), 0);
        assert!(parse_hex_quantity("123").is_err());
        assert_eq!(value_to_u128(&json!("1000000000000000000")).unwrap(), WEI_PER_ETHER);
        assert_eq!(value_to_u128(&json!(42)).unwrap(), 42);
        assert_eq!(value_to_i128(&json!("-250")).unwrap(), -250);
        assert!(value_to_u128(&json!(true)).is_err());
    }
}
