use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::ParseValueError;

pub const ETHER_DECIMALS: usize = 18;
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

static ADDRESS_PATTERN: OnceLock<Regex> = OnceLock::new();
static HASH_PATTERN: OnceLock<Regex> = OnceLock::new();

fn address_pattern() -> &'static Regex {
    ADDRESS_PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address pattern"))
}

fn hash_pattern() -> &'static Regex {
    HASH_PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid hash pattern"))
}

fn nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Decodes pre-validated hex digits (no `0x` prefix) into a fixed array.
fn decode_hex<const N: usize>(digits: &str) -> [u8; N] {
    let mut out = [0_u8; N];
    for (slot, pair) in out.iter_mut().zip(digits.as_bytes().chunks(2)) {
        *slot = (nibble(pair[0]) << 4) | nibble(pair[1]);
    }
    out
}

macro_rules! hex_newtype {
    ($name:ident, $len:expr, $pattern:ident, $field:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const ZERO: Self = Self([0_u8; $len]);

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Places `value` big-endian in the low eight bytes.
            pub fn from_low_u64(value: u64) -> Self {
                let mut bytes = [0_u8; $len];
                bytes[$len - 8..].copy_from_slice(&value.to_be_bytes());
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("0x")?;
                for byte in self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl FromStr for $name {
            type Err = ParseValueError;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                let trimmed = input.trim();
                if !$pattern().is_match(trimmed) {
                    return Err(ParseValueError::new($field, input));
                }
                Ok(Self(decode_hex(&trimmed[2..])))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(Address, 20, address_pattern, "address");
hex_newtype!(TxHash, 32, hash_pattern, "transaction hash");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParseValueError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseValueError::new("task id", input))
    }
}

/// Native-currency amount in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmountWei(pub u128);

impl AmountWei {
    pub const ZERO: Self = Self(0);

    /// Converts a decimal amount with up to 18 fractional digits ("0.1") to wei.
    pub fn parse_ether(input: &str) -> Result<Self, ParseValueError> {
        let invalid = || ParseValueError::new("amount", input);
        let trimmed = input.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) || fraction.len() > ETHER_DECIMALS {
            return Err(invalid());
        }

        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .ok()
                .and_then(|units| units.checked_mul(WEI_PER_ETHER))
                .ok_or_else(invalid)?
        };
        let fraction_wei = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<width$}", width = ETHER_DECIMALS)
                .parse::<u128>()
                .map_err(|_| invalid())?
        };
        whole_wei
            .checked_add(fraction_wei)
            .map(Self)
            .ok_or_else(invalid)
    }

    pub fn format_ether(self) -> String {
        let whole = self.0 / WEI_PER_ETHER;
        let fraction = self.0 % WEI_PER_ETHER;
        if fraction == 0 {
            return whole.to_string();
        }
        let digits = format!("{fraction:0width$}", width = ETHER_DECIMALS);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Display for AmountWei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one `CallRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbiType {
    Address,
    Uint256,
    Bool,
    String,
    Bytes,
}

impl AbiType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Uint256 => "uint256",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

/// Typed argument or raw response value exchanged with registry collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AbiValue {
    Address(Address),
    Uint(u128),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    /// Scalar type of the value; composites have none.
    pub fn abi_type(&self) -> Option<AbiType> {
        match self {
            Self::Address(_) => Some(AbiType::Address),
            Self::Uint(_) => Some(AbiType::Uint256),
            Self::Bool(_) => Some(AbiType::Bool),
            Self::String(_) => Some(AbiType::String),
            Self::Bytes(_) => Some(AbiType::Bytes),
            Self::Array(_) | Self::Tuple(_) => None,
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
            scalar => scalar.abi_type().map_or("unknown", AbiType::label),
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(address) => Some(*address),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<Address> for AbiValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<TaskId> for AbiValue {
    fn from(value: TaskId) -> Self {
        Self::Uint(u128::from(value.0))
    }
}

impl From<AmountWei> for AbiValue {
    fn from(value: AmountWei) -> Self {
        Self::Uint(value.0)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for AbiValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
