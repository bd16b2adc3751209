//! Portable JSON snapshot of the registered state of a channel, and its structural validator.

use std::collections::HashSet;

use alloy::primitives::{hex, Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokamak_crypto::{field::field_to_be_bytes, pad32, FieldElement};

use crate::error::{StateManagerError, StateManagerResult};

/// A storage slot and its value, both `0x`-prefixed hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Every per-address array is aligned with `storage_addresses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub channel_id: String,
    pub state_roots: Vec<String>,
    pub storage_addresses: Vec<String>,
    pub registered_keys: Vec<Vec<String>>,
    pub storage_entries: Vec<Vec<KeyValue>>,
    pub pre_allocated_leaves: Vec<Vec<KeyValue>>,
    pub entry_contract_address: String,
}

impl StateSnapshot {
    pub fn from_json(json: &str) -> StateManagerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> StateManagerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Runs [validate_snapshot_json] on this snapshot.
    pub fn validate(&self) -> Result<SnapshotSummary, SnapshotValidationError> {
        let value = serde_json::to_value(self).map_err(|e| SnapshotValidationError {
            failures: vec![e.to_string()],
        })?;
        validate_snapshot_json(&value)
    }

    /// Checks that every per-address array has one entry per storage address.
    pub(crate) fn check_shape(&self) -> StateManagerResult<()> {
        let expected = self.storage_addresses.len();
        let lengths = [
            ("registeredKeys", self.registered_keys.len()),
            ("storageEntries", self.storage_entries.len()),
            ("preAllocatedLeaves", self.pre_allocated_leaves.len()),
        ];
        for (field, len) in lengths {
            if len != expected {
                return Err(StateManagerError::SnapshotShapeMismatch(format!(
                    "{field} has {len} entries, storageAddresses has {expected}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub addresses: usize,
    pub roots: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("snapshot validation failed: {}", failures.join("; "))]
pub struct SnapshotValidationError {
    pub failures: Vec<String>,
}

/// Checks the structure of a JSON snapshot, collecting every failure instead of stopping at the
/// first one.
pub fn validate_snapshot_json(
    snapshot: &Value,
) -> Result<SnapshotSummary, SnapshotValidationError> {
    let mut failures = Vec::new();

    let Some(object) = snapshot.as_object() else {
        return Err(SnapshotValidationError {
            failures: vec!["Snapshot must be an object".into()],
        });
    };

    let channel_id = object.get("channelId");
    let entry_contract = object.get("entryContractAddress");
    let array = |field: &str| object.get(field).and_then(Value::as_array);

    check(
        &mut failures,
        channel_id.is_some_and(Value::is_string),
        "channelId must be a string".into(),
    );
    for field in [
        "stateRoots",
        "storageAddresses",
        "registeredKeys",
        "storageEntries",
        "preAllocatedLeaves",
    ] {
        check(&mut failures, array(field).is_some(), format!("{field} must be an array"));
    }
    check(
        &mut failures,
        entry_contract.is_some_and(Value::is_string),
        "entryContractAddress must be a string".into(),
    );

    let (
        Some(roots),
        Some(addresses),
        Some(registered_keys),
        Some(storage_entries),
        Some(pre_allocated),
    ) = (
        array("stateRoots"),
        array("storageAddresses"),
        array("registeredKeys"),
        array("storageEntries"),
        array("preAllocatedLeaves"),
    )
    else {
        return Err(SnapshotValidationError { failures });
    };
    if !failures.is_empty() {
        return Err(SnapshotValidationError { failures });
    }

    let lengths = [
        roots.len(),
        addresses.len(),
        registered_keys.len(),
        storage_entries.len(),
        pre_allocated.len(),
    ];
    check(
        &mut failures,
        lengths.iter().all(|len| *len == lengths[0]),
        "stateRoots/storageAddresses/registeredKeys/storageEntries/preAllocatedLeaves length mismatch"
            .into(),
    );
    check(
        &mut failures,
        channel_id.is_some_and(|v| is_hex_allow_empty(v)),
        "channelId must be 0x-prefixed hex string".into(),
    );
    check(
        &mut failures,
        entry_contract.is_some_and(|v| is_hex(v)),
        "entryContractAddress must be 0x-prefixed non-empty hex string".into(),
    );

    let mut seen_addresses = HashSet::new();
    for (i, address) in addresses.iter().enumerate() {
        check(&mut failures, is_hex(address), format!("storageAddresses[{i}] must be hex"));
        check(
            &mut failures,
            roots.get(i).is_some_and(is_hex_allow_empty),
            format!("stateRoots[{i}] must be hex"),
        );

        let registered = registered_keys.get(i).and_then(Value::as_array);
        check(
            &mut failures,
            registered.is_some(),
            format!("registeredKeys[{i}] must be array"),
        );

        check(
            &mut failures,
            seen_addresses.insert(lowercase(address)),
            format!("duplicate storage address at index {i}: {}", display(address)),
        );

        let mut registered_set = OrderedSet::default();
        for (k, key) in registered.into_iter().flatten().enumerate() {
            check(
                &mut failures,
                is_hex(key),
                format!("registeredKeys[{i}][{k}] must be hex"),
            );
            registered_set.insert(lowercase(key));
        }

        let mut union_set = OrderedSet::default();
        for (label, lists) in [
            ("storageEntries", storage_entries),
            ("preAllocatedLeaves", pre_allocated),
        ] {
            let entries = lists.get(i).and_then(Value::as_array);
            check(&mut failures, entries.is_some(), format!("{label}[{i}] must be array"));

            for (j, entry) in entries.into_iter().flatten().enumerate() {
                let ptr = format!("{label}[{i}][{j}]");
                check(&mut failures, entry.is_object(), format!("{ptr} must be object"));

                let key = entry.get("key");
                check(
                    &mut failures,
                    key.is_some_and(|v| is_hex(v)),
                    format!("{ptr}.key must be hex"),
                );
                check(
                    &mut failures,
                    entry.get("value").is_some_and(|v| is_hex_allow_empty(v)),
                    format!("{ptr}.value must be hex"),
                );
                if let Some(key) = key.and_then(Value::as_str) {
                    union_set.insert(key.to_lowercase());
                }
            }
        }

        if registered_set.len() != union_set.len() {
            failures.push(format!(
                "registered key count mismatch at address index {i}: registered={}, union={}",
                registered_set.len(),
                union_set.len()
            ));
        }
        for key in union_set.iter().filter(|k| !registered_set.contains(k)) {
            failures.push(format!(
                "registered keys missing entry key at address index {i}: {key}"
            ));
        }
        for key in registered_set.iter().filter(|k| !union_set.contains(k)) {
            failures.push(format!(
                "registered keys contain extra key at address index {i}: {key}"
            ));
        }
    }

    if !failures.is_empty() {
        return Err(SnapshotValidationError { failures });
    }

    Ok(SnapshotSummary {
        addresses: addresses.len(),
        roots: roots.len(),
    })
}

fn check(failures: &mut Vec<String>, cond: bool, msg: String) {
    if !cond {
        failures.push(msg);
    }
}

/// A set that iterates in insertion order.
#[derive(Default)]
struct OrderedSet {
    items: Vec<String>,
    index: HashSet<String>,
}

impl OrderedSet {
    fn insert(&mut self, item: String) {
        if self.index.insert(item.clone()) {
            self.items.push(item);
        }
    }

    fn contains(&self, item: &str) -> bool {
        self.index.contains(item)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }
}

fn hex_digits(value: &Value) -> Option<&str> {
    value
        .as_str()?
        .strip_prefix("0x")
        .filter(|digits| digits.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_hex(value: &Value) -> bool {
    hex_digits(value).is_some_and(|digits| !digits.is_empty())
}

fn is_hex_allow_empty(value: &Value) -> bool {
    hex_digits(value).is_some()
}

fn lowercase(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_lowercase)
        .unwrap_or_else(|| value.to_string())
}

fn display(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_owned)
        .unwrap_or_else(|| value.to_string())
}

/// Decodes a `0x`-prefixed hex number, accepting an odd digit count.
pub(crate) fn decode_hex_number(field: &'static str, value: &str) -> StateManagerResult<Vec<u8>> {
    let invalid = || StateManagerError::InvalidHex {
        field,
        value: value.to_owned(),
    };

    let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
    let digits = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_owned()
    };
    hex::decode(digits).map_err(|_| invalid())
}

/// Decodes a storage key, left padding it to 32 bytes.
pub(crate) fn parse_key(value: &str) -> StateManagerResult<B256> {
    let bytes = decode_hex_number("key", value)?;
    if bytes.len() > 32 {
        return Err(StateManagerError::InvalidHex {
            field: "key",
            value: value.to_owned(),
        });
    }
    Ok(B256::from(pad32(&bytes)))
}

pub(crate) fn parse_value(value: &str) -> StateManagerResult<Vec<u8>> {
    decode_hex_number("value", value)
}

pub(crate) fn parse_address(field: &'static str, value: &str) -> StateManagerResult<Address> {
    value
        .parse::<Address>()
        .map_err(|_| StateManagerError::InvalidHex {
            field,
            value: value.to_owned(),
        })
}

/// Compares a declared root against a field element by numeric value.
pub(crate) fn root_matches(declared: &str, root: &FieldElement) -> StateManagerResult<bool> {
    let bytes = decode_hex_number("stateRoots", declared)?;
    let significant = tokamak_crypto::field::unpad(&bytes);
    if significant.len() > 32 {
        return Ok(false);
    }
    Ok(pad32(significant) == field_to_be_bytes(root))
}

pub fn format_root(root: &FieldElement) -> String {
    format!("0x{}", hex::encode(field_to_be_bytes(root)))
}

pub fn format_key(key: &B256) -> String {
    format!("0x{}", hex::encode(key))
}

pub fn format_value(value: &Bytes) -> String {
    format!("0x{}", hex::encode(value))
}
