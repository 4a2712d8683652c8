//! `serde_with` formats for wide integers and account identifiers.
//!
//! TOML integers stop at `i64::MAX` and many JSON consumers lose precision
//! above 2^53, while 18-decimal prices routinely exceed both. Every `u128`,
//! `i128` and `U256` therefore serializes as a base-10 string. Deserializers
//! also accept plain integers and `_` digit separators so hand-written
//! configuration stays readable (`"2_000_000000000000000000"`).
//!
//! Use with `#[serde_as]` on the type and `#[serde_as(as = "...")]` on the
//! field:
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use serde_with::serde_as;
//! use tally_types::codec;
//!
//! #[serde_as]
//! #[derive(Serialize, Deserialize)]
//! struct Entry {
//!     #[serde_as(as = "codec::Decimal")]
//!     assets: u128,
//! }
//! ```

use std::fmt::Display;
use std::str::FromStr;

use ethnum::U256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, FromInto, PickFirst, Same, SerializeAs};

/// Base-10 text, `_` separators allowed on input.
pub struct Separated;

impl<T: Display> SerializeAs<T> for Separated {
    fn serialize_as<S: Serializer>(source: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(source)
    }
}

impl<'de, T> DeserializeAs<'de, T> for Separated
where
    T: FromStr,
    T::Err: Display,
{
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
        let text = String::deserialize(deserializer)?;
        strip_separators(&text)
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid integer {text:?}: {e}")))
    }
}

/// `u128` and `i128` fields: decimal string out; string or integer in.
pub type Decimal = PickFirst<(Separated, Same)>;

/// `U256` fields: decimal string out; string or 64-bit integer in.
pub type WideDecimal = PickFirst<(Separated, FromInto<u64>)>;

/// [`AccountId`](crate::AccountId) fields as 64 lowercase hex characters.
pub type AccountHex = serde_with::hex::Hex;

/// Parse a base-10 `U256`, accepting `_` separators.
pub fn parse_wide(v: &str) -> Option<U256> {
    U256::from_str_radix(&strip_separators(v), 10).ok()
}

fn strip_separators(v: &str) -> String {
    v.trim().chars().filter(|c| *c != '_').collect()
}
