//! Persistent address ↔ identity index.
//!
//! Identities are handed out densely from zero in first-seen order. Each new
//! assignment writes the forward entry, the reverse entry and the updated
//! counter in a single batch, so a reopened index never sees a half-written
//! identity.

use std::borrow::Cow;

use cospend_common::{Error, Result};
use cospend_core::types::{Address, AddressId, KeyEncoding};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{Column, KeyBatch, KeyValueStore};

const NEXT_ID_KEY: &[u8] = b"next_id";
const ENCODING_KEY: &[u8] = b"key_encoding";

/// Bidirectional mapping between addresses and dense identities
pub struct AddressIndex<S: KeyValueStore> {
    store: S,
    next_id: u64,
    encoding: KeyEncoding,
}

impl<S: KeyValueStore> AddressIndex<S> {
    /// Open an index over `store`, resuming numbering if it already holds one.
    ///
    /// Fails if the store was built with a different key encoding.
    pub fn open(store: S, encoding: KeyEncoding) -> Result<Self> {
        let next_id = match store.get(Column::Meta, NEXT_ID_KEY)? {
            Some(bytes) => decode_counter(&bytes)?,
            None => 0,
        };

        match store.get(Column::Meta, ENCODING_KEY)? {
            Some(stored) if stored != encoding.to_string().as_bytes() => {
                return Err(Error::config(format!(
                    "Address index was built with key encoding '{}', not '{}'",
                    String::from_utf8_lossy(&stored),
                    encoding
                )));
            }
            Some(_) => {}
            None => store.put(Column::Meta, ENCODING_KEY, encoding.to_string().as_bytes())?,
        }

        if next_id > 0 {
            info!("Resuming address index with {} identities", next_id);
        }
        Ok(Self {
            store,
            next_id,
            encoding,
        })
    }

    fn storage_key<'a>(&self, address: &'a Address) -> Cow<'a, [u8]> {
        match self.encoding {
            KeyEncoding::Raw => Cow::Borrowed(address.as_bytes()),
            KeyEncoding::Sha256 => Cow::Owned(Sha256::digest(address.as_bytes()).to_vec()),
        }
    }

    /// Identity of `address`, assigning the next one if it is new
    pub fn assign_if_absent(&mut self, address: &Address) -> Result<AddressId> {
        let key = self.storage_key(address);
        if let Some(bytes) = self.store.get(Column::Address, &key)? {
            return decode_identity(&bytes);
        }

        // at most AddressId::MAX identities, so cluster weights fit in a u32
        if self.next_id >= AddressId::MAX as u64 {
            return Err(Error::IdentityOverflow(self.next_id));
        }
        let id = self.next_id as AddressId;
        let id_bytes = id.to_be_bytes();
        let next = self.next_id + 1;

        let mut batch = KeyBatch::new();
        batch
            .put(Column::Address, &key, &id_bytes)
            .put(Column::Identity, &id_bytes, address.as_bytes())
            .put(Column::Meta, NEXT_ID_KEY, &next.to_be_bytes());
        self.store.write_batch(batch)?;

        self.next_id = next;
        Ok(id)
    }

    /// Identity of `address`, if it was ever assigned
    pub fn get(&self, address: &Address) -> Result<Option<AddressId>> {
        let key = self.storage_key(address);
        match self.store.get(Column::Address, &key)? {
            Some(bytes) => decode_identity(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Identity of `address`; `NotFound` if it was never assigned
    pub fn lookup(&self, address: &Address) -> Result<AddressId> {
        self.get(address)?
            .ok_or_else(|| Error::not_found(address.to_string()))
    }

    pub fn contains(&self, address: &Address) -> Result<bool> {
        let key = self.storage_key(address);
        self.store.contains(Column::Address, &key)
    }

    /// Address that was assigned `id`
    pub fn reverse_lookup(&self, id: AddressId) -> Result<Address> {
        self.store
            .get(Column::Identity, &id.to_be_bytes())?
            .map(Address::from_bytes)
            .ok_or_else(|| Error::not_found(format!("identity {}", id)))
    }

    /// Number of assigned identities
    pub fn count(&self) -> u64 {
        self.next_id
    }

    pub fn flush(&self) -> Result<()> {
        debug!("Flushing address index at {} identities", self.next_id);
        self.store.flush()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn decode_identity(bytes: &[u8]) -> Result<AddressId> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::storage(format!("Identity value has {} bytes, expected 4", bytes.len())))?;
    Ok(AddressId::from_be_bytes(raw))
}

fn decode_counter(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::storage(format!("Identity counter has {} bytes, expected 8", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}
