use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Dense identity assigned to an address in first-seen order
pub type AddressId = u32;

/// Canonical byte form of a ledger address
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Vec<u8>);

impl Address {
    /// Wrap raw address bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Address(bytes.into())
    }

    /// Canonical key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.as_bytes().to_vec())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s.into_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

const HEX_PREFIX: &str = "0x";

/// Text addresses travel as-is. Anything that is not UTF-8, or that would
/// itself read as hex, travels as `0x` followed by the hex of its bytes.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(s) if !s.starts_with(HEX_PREFIX) => serializer.serialize_str(s),
            _ => serializer.serialize_str(&format!("{}{}", HEX_PREFIX, hex::encode(&self.0))),
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if let Some(digits) = s.strip_prefix(HEX_PREFIX) {
            if let Ok(bytes) = hex::decode(digits) {
                return Ok(Address(bytes));
            }
        }
        Ok(Address::from(s))
    }
}

/// How an address is turned into a storage key
///
/// `Sha256` bounds the key width at 32 bytes. Two distinct addresses with the
/// same digest would silently share an identity, so `Raw` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    #[default]
    Raw,
    Sha256,
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEncoding::Raw => write!(f, "raw"),
            KeyEncoding::Sha256 => write!(f, "sha256"),
        }
    }
}

impl std::str::FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(KeyEncoding::Raw),
            "sha256" => Ok(KeyEncoding::Sha256),
            other => Err(format!("unknown key encoding '{}'", other)),
        }
    }
}

/// Transaction input as seen by the clustering engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Spent address, absent for coinbase and non-standard scripts
    #[serde(default)]
    pub address: Option<Address>,

    /// Value of the spent output
    #[serde(default)]
    pub value: u64,
}

/// Transaction output as seen by the clustering engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Receiving address, absent for unattributable scripts
    #[serde(default)]
    pub address: Option<Address>,

    /// Output value
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub inputs: Vec<TxInput>,

    #[serde(default)]
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Addresses of the inputs that carry one, in ledger order
    pub fn input_addresses(&self) -> impl Iterator<Item = &Address> {
        self.inputs.iter().filter_map(|input| input.address.as_ref())
    }

    /// Addresses of the outputs that carry one, in ledger order
    pub fn output_addresses(&self) -> impl Iterator<Item = &Address> {
        self.outputs.iter().filter_map(|output| output.address.as_ref())
    }
}

/// Decoded block record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height
    pub height: u64,

    /// Block timestamp in unix seconds
    #[serde(default)]
    pub time: u64,

    #[serde(default)]
    pub transactions: Vec<Transaction>,
}
