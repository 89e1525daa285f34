//! # Core Types
//!
//! The vocabulary shared by the vault and its collaborators: account
//! addresses, asset classes, the four-list batch call surface, and the
//! valuation snapshot.
//!
//! All amounts and values are `u128` in the smallest unit of the asset or
//! currency they are expressed in. Token identifiers are `u128` as well.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::config::{
    ADDRESS_LENGTH, FUNGIBLE_TOKEN_ID, TAG_FUNGIBLE, TAG_MULTI_NFT, TAG_UNIQUE_NFT,
};

/// Identifier of a single token instance inside a non-fungible asset.
pub type TokenId = u128;

/// Internal currency identifier resolved by the registry.
pub type CurrencyId = u64;

/// Version of the vault logic. Selected at construction, raised by upgrades.
pub type VaultVersion = u16;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account or asset identifier.
///
/// Rendered as `0x`-prefixed lowercase hex. Serialized as that same string so
/// scenario files and JSON summaries stay human-readable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

/// Failure to parse an [`Address`] from text.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {ADDRESS_LENGTH} bytes, got {0}")]
    Length(usize),
}

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Creates an address whose last eight bytes hold `n` big-endian.
    ///
    /// Handy for fixtures and simulations where readable, distinct addresses
    /// matter more than realism.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 8..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Returns the `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a hex-encoded address, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::Length(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AssetClass
// ---------------------------------------------------------------------------

/// The three asset classes a vault can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Interchangeable units; balance read live from the asset.
    Fungible,
    /// One owner per token id; implicit amount of one.
    UniqueNft,
    /// Per-token-id balances; read live from the asset.
    MultiNft,
}

impl AssetClass {
    /// Decodes a batch class tag. Returns `None` for unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_FUNGIBLE => Some(AssetClass::Fungible),
            TAG_UNIQUE_NFT => Some(AssetClass::UniqueNft),
            TAG_MULTI_NFT => Some(AssetClass::MultiNft),
            _ => None,
        }
    }

    /// Returns the batch tag for this class.
    pub fn tag(&self) -> u8 {
        match self {
            AssetClass::Fungible => TAG_FUNGIBLE,
            AssetClass::UniqueNft => TAG_UNIQUE_NFT,
            AssetClass::MultiNft => TAG_MULTI_NFT,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Fungible => write!(f, "fungible"),
            AssetClass::UniqueNft => write!(f, "unique-nft"),
            AssetClass::MultiNft => write!(f, "multi-nft"),
        }
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// A malformed deposit or withdrawal batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error(
        "batch lists differ in length: {assets} assets, {token_ids} token ids, \
         {amounts} amounts, {classes} class tags"
    )]
    LengthMismatch {
        assets: usize,
        token_ids: usize,
        amounts: usize,
        classes: usize,
    },

    #[error("unknown asset class tag {tag} at index {index}")]
    UnknownClass { index: usize, tag: u8 },
}

/// One decoded entry of an [`AssetBatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetAction {
    pub asset: Address,
    pub token_id: TokenId,
    pub amount: u128,
    pub class: AssetClass,
}

/// The batch call surface: four parallel lists, one entry per asset action.
///
/// Token ids are ignored for fungible entries but the slot must still be
/// present so the lists stay aligned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBatch {
    pub assets: Vec<Address>,
    pub token_ids: Vec<TokenId>,
    pub amounts: Vec<u128>,
    pub classes: Vec<u8>,
}

impl AssetBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fungible entry.
    pub fn fungible(self, asset: Address, amount: u128) -> Self {
        self.with(asset, FUNGIBLE_TOKEN_ID, amount, AssetClass::Fungible)
    }

    /// Appends a unique-NFT entry.
    pub fn unique_nft(self, asset: Address, token_id: TokenId) -> Self {
        self.with(asset, token_id, 1, AssetClass::UniqueNft)
    }

    /// Appends a multi-class NFT entry.
    pub fn multi_nft(self, asset: Address, token_id: TokenId, amount: u128) -> Self {
        self.with(asset, token_id, amount, AssetClass::MultiNft)
    }

    fn with(mut self, asset: Address, token_id: TokenId, amount: u128, class: AssetClass) -> Self {
        self.assets.push(asset);
        self.token_ids.push(token_id);
        self.amounts.push(amount);
        self.classes.push(class.tag());
        self
    }

    /// Number of entries, assuming the lists are aligned.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns `true` if the batch has no entries.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Validates the batch shape and decodes every entry.
    ///
    /// Fails on the first problem found; nothing is partially decoded.
    pub fn actions(&self) -> Result<Vec<AssetAction>, BatchError> {
        let n = self.assets.len();
        if self.token_ids.len() != n || self.amounts.len() != n || self.classes.len() != n {
            return Err(BatchError::LengthMismatch {
                assets: n,
                token_ids: self.token_ids.len(),
                amounts: self.amounts.len(),
                classes: self.classes.len(),
            });
        }

        (0..n)
            .map(|i| {
                let tag = self.classes[i];
                let class =
                    AssetClass::from_tag(tag).ok_or(BatchError::UnknownClass { index: i, tag })?;
                Ok(AssetAction {
                    asset: self.assets[i],
                    token_id: self.token_ids[i],
                    amount: self.amounts[i],
                    class,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// AssetSnapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of a vault's holdings in valuation format.
///
/// Three equal-length lists; index `i` of each describes the same holding.
/// Order across snapshots is not stable, only the correspondence within one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub assets: Vec<Address>,
    pub token_ids: Vec<TokenId>,
    pub amounts: Vec<u128>,
}

impl AssetSnapshot {
    /// Creates an empty snapshot with room for `capacity` holdings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            assets: Vec::with_capacity(capacity),
            token_ids: Vec::with_capacity(capacity),
            amounts: Vec::with_capacity(capacity),
        }
    }

    /// Appends one holding.
    pub fn push(&mut self, asset: Address, token_id: TokenId, amount: u128) {
        self.assets.push(asset);
        self.token_ids.push(token_id);
        self.amounts.push(amount);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Iterates `(asset, token_id, amount)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (Address, TokenId, u128)> + '_ {
        self.assets
            .iter()
            .zip(&self.token_ids)
            .zip(&self.amounts)
            .map(|((asset, id), amount)| (*asset, *id, *amount))
    }
}
