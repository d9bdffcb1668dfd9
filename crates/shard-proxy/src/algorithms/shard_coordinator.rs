//! # Shard Coordinator
//!
//! Deterministic address to shard mapping.
//!
//! The shard is derived from a fixed-width suffix of the raw public key:
//!
//! ```text
//! bytes_needed = 1 (<= 256 shards) | 2 (<= 65536) | 3 (<= 2^24) | 4
//! n            = ceil(log2(num_shards))
//! suffix       = big-endian integer of the last bytes_needed bytes
//! shard        = suffix & ((1 << n) - 1)
//! if shard >= num_shards: shard = suffix & ((1 << (n - 1)) - 1)
//! ```
//!
//! The second mask folds the unused upper half of the power-of-two range back
//! onto existing shards, so the mapping never changes for a given shard count.
//! No randomness and no clock: the result is stable across restarts.

use crate::domain::{
    ProxyError, ShardId, ADDRESS_LEN, MAX_SHARD_COUNT, METACHAIN_SHARD_ID, MIN_SHARD_COUNT,
};

/// Prefix length of zero bytes marking a smart contract address.
const SC_PREFIX_LEN: usize = 8;

/// Maps addresses to shards for a fixed shard count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardCoordinator {
    num_shards: u32,
    mask_high: u32,
    mask_low: u32,
    bytes_needed: usize,
}

impl ShardCoordinator {
    /// Create a coordinator for `num_shards` regular shards.
    pub fn new(num_shards: u32) -> Result<Self, ProxyError> {
        if !(MIN_SHARD_COUNT..=MAX_SHARD_COUNT).contains(&num_shards) {
            return Err(ProxyError::InvalidTopology(format!(
                "shard count {} outside [{}, {}]",
                num_shards, MIN_SHARD_COUNT, MAX_SHARD_COUNT
            )));
        }

        let n = ceil_log2(num_shards);
        let mask_high = ((1u64 << n) - 1) as u32;
        let mask_low = if n == 0 { 0 } else { ((1u64 << (n - 1)) - 1) as u32 };

        Ok(Self {
            num_shards,
            mask_high,
            mask_low,
            bytes_needed: bytes_needed(num_shards),
        })
    }

    /// Number of regular shards.
    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    /// Shard of a hex-encoded address.
    pub fn compute_shard_id(&self, address: &str) -> Result<ShardId, ProxyError> {
        let bytes = decode_address(address)?;
        self.compute_shard_id_bytes(&bytes)
    }

    /// Shard of a raw 32-byte address.
    pub fn compute_shard_id_bytes(&self, address: &[u8]) -> Result<ShardId, ProxyError> {
        if address.len() != ADDRESS_LEN {
            return Err(ProxyError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                address.len()
            )));
        }

        if is_system_account(address) || is_smart_contract_on_meta(address) {
            return Ok(METACHAIN_SHARD_ID);
        }

        let suffix = address[ADDRESS_LEN - self.bytes_needed..]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));

        let mut shard = suffix & self.mask_high;
        if shard > self.num_shards - 1 {
            shard = suffix & self.mask_low;
        }
        Ok(shard)
    }

    /// Single comparison against the meta sentinel.
    pub fn is_meta_shard(&self, shard: ShardId) -> bool {
        shard == METACHAIN_SHARD_ID
    }

    /// Every regular shard followed by meta.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        (0..self.num_shards)
            .chain(std::iter::once(METACHAIN_SHARD_ID))
            .collect()
    }

    /// Whether a shard ID is known to this coordinator.
    pub fn is_known_shard(&self, shard: ShardId) -> bool {
        shard < self.num_shards || shard == METACHAIN_SHARD_ID
    }

    /// Whether two addresses live in the same shard.
    pub fn same_shard(&self, a: &str, b: &str) -> Result<bool, ProxyError> {
        Ok(self.compute_shard_id(a)? == self.compute_shard_id(b)?)
    }
}

/// Decode a hex address into its raw public key bytes.
pub fn decode_address(address: &str) -> Result<Vec<u8>, ProxyError> {
    let trimmed = address.trim();
    let bytes = hex::decode(trimmed)
        .map_err(|e| ProxyError::InvalidAddress(format!("{}: {}", trimmed, e)))?;
    if bytes.len() != ADDRESS_LEN {
        return Err(ProxyError::InvalidAddress(format!(
            "{}: expected {} bytes, got {}",
            trimmed,
            ADDRESS_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// The reserved system account (all `0xff`) always lives in meta.
fn is_system_account(address: &[u8]) -> bool {
    address.iter().all(|b| *b == 0xff)
}

/// Smart contract address deployed on the meta shard: zero prefix and `ffff` suffix.
fn is_smart_contract_on_meta(address: &[u8]) -> bool {
    address[..SC_PREFIX_LEN].iter().all(|b| *b == 0)
        && address[ADDRESS_LEN - 2..] == [0xff, 0xff]
}

fn ceil_log2(value: u32) -> u32 {
    u32::BITS - (value - 1).leading_zeros()
}

fn bytes_needed(num_shards: u32) -> usize {
    match num_shards {
        0..=256 => 1,
        257..=65_536 => 2,
        65_537..=16_777_216 => 3,
        _ => 4,
    }
}
