//! # Protocol Configuration & Constants
//!
//! Every magic number in Keel lives here. Fixed-point scales, class tags,
//! versioning: if a vault compares against a literal, the literal belongs in
//! this file.
//!
//! ## Fixed-Point Convention
//!
//! Ratios (liquidation thresholds, collateral factors) are integers scaled by
//! 100, i.e. two decimals of precision. `15_000` reads as `150.00`. Nothing in
//! the protocol ever touches a float.

// ---------------------------------------------------------------------------
// Fixed-Point Parameters
// ---------------------------------------------------------------------------

/// Number of decimals carried by every ratio in the protocol.
pub const RATIO_DECIMALS: u32 = 2;

/// Scale factor of a 2-decimal fixed-point ratio. `1.00` is stored as `100`.
pub const RATIO_SCALE: u128 = 100;

/// Upper bound for an aggregate liquidation threshold returned by a registry.
/// `10_000` represents `100.00`.
pub const MAX_LIQUIDATION_THRESHOLD: u16 = 10_000;

/// Multiplier applied to the total value in the health test
/// `total_value * HEALTH_MULTIPLIER >= used_margin * liquidation_threshold`.
pub const HEALTH_MULTIPLIER: u128 = RATIO_SCALE;

/// Collateral factor meaning "no haircut" (`100.00`).
pub const FULL_COLLATERAL_FACTOR: u16 = 10_000;

// ---------------------------------------------------------------------------
// Asset Class Tags
// ---------------------------------------------------------------------------

/// Batch tag for fungible assets.
pub const TAG_FUNGIBLE: u8 = 0;

/// Batch tag for unique non-fungible assets (one owner per token id).
pub const TAG_UNIQUE_NFT: u8 = 1;

/// Batch tag for multi-class non-fungible assets (balances per token id).
pub const TAG_MULTI_NFT: u8 = 2;

/// Amount reported in a snapshot for every unique-NFT entry.
pub const UNIQUE_NFT_AMOUNT: u128 = 1;

/// Token id reported in a snapshot for fungible entries.
pub const FUNGIBLE_TOKEN_ID: u128 = 0;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Vault logic version stamped on freshly created vaults. Margin protocols
/// receive it during the account handshake and may refuse versions they do
/// not support.
pub const CURRENT_VAULT_VERSION: u16 = 1;

/// Address length in bytes.
pub const ADDRESS_LENGTH: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_tags_are_distinct() {
        assert_ne!(TAG_FUNGIBLE, TAG_UNIQUE_NFT);
        assert_ne!(TAG_FUNGIBLE, TAG_MULTI_NFT);
        assert_ne!(TAG_UNIQUE_NFT, TAG_MULTI_NFT);
    }

    #[test]
    fn test_ratio_scale_matches_decimals() {
        assert_eq!(RATIO_SCALE, 10u128.pow(RATIO_DECIMALS));
        assert_eq!(u128::from(MAX_LIQUIDATION_THRESHOLD), RATIO_SCALE * RATIO_SCALE);
        assert_eq!(FULL_COLLATERAL_FACTOR, MAX_LIQUIDATION_THRESHOLD);
    }
}
