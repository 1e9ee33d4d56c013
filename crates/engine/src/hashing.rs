//! Content hashes for sync buckets (SHA-256, lowercase hex).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use iamsync_auth::Permission;

pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash of the compact JSON encoding of `value`.
///
/// Map-typed payloads must use ordered maps so the encoding is canonical.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(hash_bytes(&serde_json::to_vec(value)?))
}

/// Order-independent hash of a permission set: sorted, comma-joined.
pub fn hash_permissions<'a>(permissions: impl IntoIterator<Item = &'a Permission>) -> String {
    let mut names: Vec<&str> = permissions.into_iter().map(|p| p.as_str()).collect();
    names.sort_unstable();
    hash_bytes(names.join(",").as_bytes())
}

/// Hash of a resolved screen: `<template version>:<instance updated_at>`.
///
/// The payload body is not hashed; only these two fields drive change.
pub fn hash_screen(template_version: u32, instance_updated_at: DateTime<Utc>) -> String {
    let stamp = instance_updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
    hash_bytes(format!("{template_version}:{stamp}").as_bytes())
}
