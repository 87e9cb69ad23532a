//! Storage of a party's local shares.

use std::{collections::BTreeMap, fs, io, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    PARTIES,
    attribute::Attribute,
    domain::{Ring, Share},
};

/// Errors that can occur while reading shares from a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file could not be read or written.
    #[error("unable to access share store")]
    Io(#[from] io::Error),
    /// The backing file is not a valid list of records.
    #[error("invalid share store contents")]
    Json(#[from] serde_json::Error),
    /// A record does not hold a share for the requested attribute.
    #[error("record {record} has no share for attribute {attribute}")]
    MissingAttribute {
        /// The index of the incomplete record.
        record: usize,
        /// The missing attribute.
        attribute: Attribute,
    },
}

/// One record: a share (or a plaintext value) per tracked attribute.
pub type Record<T> = BTreeMap<Attribute, T>;

/// Yields the local shares of a party.
pub trait ShareStore: Send + Sync {
    /// Returns this party's shares of `attribute`, one per record.
    ///
    /// The order must be stable across repeated calls and identical across all parties.
    fn stream_shares(&self, attribute: Attribute) -> Result<Vec<Share>, StoreError>;
}

/// A share store held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    records: Vec<Record<Share>>,
}

impl MemoryStore {
    /// Creates a store from records.
    pub fn new(records: Vec<Record<Share>>) -> Self {
        Self { records }
    }

    /// Creates a store holding a single attribute.
    pub fn from_column(attribute: Attribute, shares: impl IntoIterator<Item = Share>) -> Self {
        Self::new(
            shares
                .into_iter()
                .map(|share| Record::from([(attribute, share)]))
                .collect(),
        )
    }

    /// Loads a store from a JSON file containing a list of records.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Writes the store to a JSON file as a list of records.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl ShareStore for MemoryStore {
    fn stream_shares(&self, attribute: Attribute) -> Result<Vec<Share>, StoreError> {
        self.records
            .iter()
            .enumerate()
            .map(|(record, r)| {
                r.get(&attribute)
                    .copied()
                    .ok_or(StoreError::MissingAttribute { record, attribute })
            })
            .collect()
    }
}

/// Splits plaintext records into one share store per party.
///
/// Every attribute of every record is split independently, so no single store reveals anything
/// about the plaintext values.
pub fn share_records(
    ring: Ring,
    records: &[Record<i64>],
    rng: &mut impl Rng,
) -> [MemoryStore; PARTIES] {
    let mut stores: [Vec<Record<Share>>; PARTIES] = Default::default();
    for record in records {
        let mut shared: [Record<Share>; PARTIES] = Default::default();
        for (attribute, value) in record {
            let shares = ring.split(ring.encode(*value), rng);
            for (party, share) in shares.into_iter().enumerate() {
                shared[party].insert(*attribute, share);
            }
        }
        for (store, record) in stores.iter_mut().zip(shared) {
            store.push(record);
        }
    }
    stores.map(MemoryStore::new)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn plaintext() -> Vec<Record<i64>> {
        vec![
            Record::from([(Attribute::Gpa, 350), (Attribute::Age, 21)]),
            Record::from([(Attribute::Gpa, 280), (Attribute::Age, 19)]),
            Record::from([(Attribute::Gpa, 400), (Attribute::Age, -3)]),
        ]
    }

    #[test]
    fn shared_records_reconstruct() -> Result<(), StoreError> {
        let ring = Ring::Prime { modulus: 1_000_003 };
        let mut rng = StdRng::seed_from_u64(1);
        let stores = share_records(ring, &plaintext(), &mut rng);
        for attribute in [Attribute::Gpa, Attribute::Age] {
            let columns = stores
                .iter()
                .map(|s| s.stream_shares(attribute))
                .collect::<Result<Vec<_>, _>>()?;
            let values: Vec<i128> = (0..3)
                .map(|r| ring.decode(ring.sum(columns.iter().map(|c| c[r]))))
                .collect();
            let expected: Vec<i128> = plaintext().iter().map(|r| r[&attribute] as i128).collect();
            assert_eq!(values, expected);
        }
        Ok(())
    }

    #[test]
    fn missing_attribute_is_reported() {
        let mut rng = StdRng::seed_from_u64(2);
        let [store, _, _] = share_records(Ring::Wrapping, &plaintext(), &mut rng);
        let err = store.stream_shares(Attribute::FinancialAid).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingAttribute {
                record: 0,
                attribute: Attribute::FinancialAid
            }
        ));
    }

    #[test]
    fn json_store_keeps_record_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("party0.json");
        let store = MemoryStore::from_column(Attribute::Age, [Share(3), Share(-1), Share(7)]);
        store.save(&path)?;
        let loaded = MemoryStore::load(&path)?;
        assert_eq!(loaded, store);
        assert_eq!(
            loaded.stream_shares(Attribute::Age)?,
            vec![Share(3), Share(-1), Share(7)]
        );
        Ok(())
    }

    #[test]
    fn invalid_json_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.json");
        fs::write(&path, "{\"gpa\": 1}")?;
        assert!(matches!(MemoryStore::load(&path), Err(StoreError::Json(_))));
        assert!(matches!(
            MemoryStore::load(dir.path().join("missing.json")),
            Err(StoreError::Io(_))
        ));
        Ok(())
    }
}
