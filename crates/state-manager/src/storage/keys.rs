// The storage keys are prefixed so that every record kind lives in its own key range.

use alloy::primitives::{Address, B256};

const ACCOUNT_STORAGE_PREFIX: u8 = 0;
const CODE_STORAGE_PREFIX: u8 = 1;
const SLOT_STORAGE_PREFIX: u8 = 2;

/// Returns the account storage key to use for persistence.
pub fn account_storage_key(address: &Address) -> Vec<u8> {
    prefixed(ACCOUNT_STORAGE_PREFIX, &[address.as_slice()])
}

/// Returns the contract code storage key to use for persistence.
pub fn code_storage_key(address: &Address) -> Vec<u8> {
    prefixed(CODE_STORAGE_PREFIX, &[address.as_slice()])
}

/// Returns the storage key of the `slot` of `address` to use for persistence.
pub fn slot_storage_key(address: &Address, slot: &B256) -> Vec<u8> {
    prefixed(SLOT_STORAGE_PREFIX, &[address.as_slice(), slot.as_slice()])
}

fn prefixed(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut v = Vec::with_capacity(1 + parts.iter().map(|p| p.len()).sum::<usize>());
    v.push(prefix);
    for part in parts {
        v.extend_from_slice(part);
    }
    v
}
