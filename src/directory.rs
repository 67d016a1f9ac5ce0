//! Directory child-table encoding: a length-prefixed map from name to inode
//! number, stored as a file's data blocks.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// `name -> inode_number`. `BTreeMap` keeps `readdir` output in a stable,
/// documented order across encode/decode round-trips.
pub type ChildTable = BTreeMap<String, u64>;

/// Encodes the child table as `u32` count followed by, per entry, a `u32`
/// UTF-8 name length, the name bytes, and a `u64` inode number.
pub fn encode(children: &ChildTable) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(children.len() as u32).to_le_bytes());
    for (name, inum) in children {
        let name_bytes = name.as_bytes();
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&inum.to_le_bytes());
    }
    out
}

pub fn decode(data: &[u8]) -> Result<ChildTable> {
    let mut children = ChildTable::new();
    if data.len() < 4 {
        return Ok(children);
    }
    let mut p = 0usize;
    let count = u32::from_le_bytes(data[p..p + 4].try_into().unwrap()) as usize;
    p += 4;
    for _ in 0..count {
        if p + 4 > data.len() {
            return Err(Error::Invariant("directory table truncated (name length)".into()));
        }
        let name_len = u32::from_le_bytes(data[p..p + 4].try_into().unwrap()) as usize;
        p += 4;
        if p + name_len + 8 > data.len() {
            return Err(Error::Invariant("directory table truncated (entry)".into()));
        }
        let name = String::from_utf8(data[p..p + name_len].to_vec())
            .map_err(|e| Error::Invariant(format!("directory entry not utf8: {e}")))?;
        p += name_len;
        let inum = u64::from_le_bytes(data[p..p + 8].try_into().unwrap());
        p += 8;
        children.insert(name, inum);
    }
    Ok(children)
}
