//! Explicit profile cache keyed by schema fingerprint.
//!
//! The orchestration layer owns a [`ProfileCache`] and passes it around; there is no
//! process-wide state. Two schemas with the same declared columns, resolver rules and
//! metric configuration share a live profile.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::MetricConfig;
use crate::error::Result;
use crate::profile::DatasetProfile;
use crate::schema::{ColumnType, DatasetSchema};

#[derive(Serialize)]
struct FingerprintInput<'a> {
    columns: &'a BTreeMap<String, ColumnType>,
    resolver: String,
    config: &'a MetricConfig,
}

/// Stable fingerprint of a schema: the first 16 bytes of a SHA-256 digest, hex encoded.
pub fn schema_fingerprint(schema: &DatasetSchema) -> Result<String> {
    let input = FingerprintInput {
        columns: schema.columns(),
        resolver: schema.resolver().describe(),
        config: schema.config(),
    };
    let encoded = serde_json::to_vec(&input)?;

    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    let hash = hasher.finalize();
    Ok(hex::encode(&hash[..16]))
}

/// Live profiles keyed by schema fingerprint.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: BTreeMap<String, DatasetProfile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live profile for `schema`, creating it on first use.
    pub fn get_or_create(&mut self, schema: &DatasetSchema) -> Result<&mut DatasetProfile> {
        use std::collections::btree_map::Entry;

        let fingerprint = schema_fingerprint(schema)?;
        match self.profiles.entry(fingerprint) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!(fingerprint = %entry.key(), "Creating cached profile");
                let profile = DatasetProfile::new(schema.clone())?;
                Ok(entry.insert(profile))
            }
        }
    }

    pub fn get(&self, schema: &DatasetSchema) -> Result<Option<&DatasetProfile>> {
        Ok(self.profiles.get(&schema_fingerprint(schema)?))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Removes and returns every cached profile, in fingerprint order.
    pub fn drain(&mut self) -> Vec<DatasetProfile> {
        std::mem::take(&mut self.profiles).into_values().collect()
    }
}
