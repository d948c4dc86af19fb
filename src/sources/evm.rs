use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;

use crate::error::SourceError;

// ── ARM vault interface ────────────────────────────────────────────

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IArmVault {
        function totalAssets() external view returns (uint256);
    }
}

// ── Reads ──────────────────────────────────────────────────────────

/// `totalAssets()` of an ARM vault, bounded by `timeout`.
pub async fn total_assets(rpc_url: &str, vault: &str, timeout: Duration) -> Result<U256, SourceError> {
    let vault: Address = vault
        .parse()
        .map_err(|e| SourceError::Rpc(format!("invalid vault address {vault}: {e}")))?;
    let provider = ProviderBuilder::new().connect_http(
        rpc_url
            .parse()
            .map_err(|e| SourceError::Rpc(format!("invalid RPC URL {rpc_url}: {e}")))?,
    );

    let arm = IArmVault::new(vault, &provider);
    let call = arm.totalAssets();
    match tokio::time::timeout(timeout, call.call()).await {
        Ok(Ok(assets)) => Ok(assets),
        Ok(Err(e)) => Err(SourceError::Rpc(format!("totalAssets() failed: {e}"))),
        Err(_) => Err(SourceError::Rpc(format!(
            "totalAssets() timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

// ── Utility functions ──────────────────────────────────────────────

/// Convert token units to a human-readable amount.
pub fn from_token_units(units: U256, decimals: u8) -> f64 {
    let raw: f64 = units.to_string().parse().unwrap_or(0.0);
    raw / 10f64.powi(decimals as i32)
}
