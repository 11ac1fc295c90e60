//! Serde adapter for [`Amount`](crate::Amount) values.
//!
//! Amounts are written as decimal strings so JSON consumers never round
//! them through a double. Reading accepts either a decimal string or an
//! unsigned integer literal.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

use crate::types::Amount;

pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a non-negative integer amount or its decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Amount::try_from(v).map_err(|_| E::custom(format!("amount must be non-negative, got {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.trim()
            .parse::<Amount>()
            .map_err(|e| E::custom(format!("invalid amount '{v}': {e}")))
    }
}

/// Optional amounts. Pair with `#[serde(default)]` so absent fields read as `None`.
pub mod option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::Amount;

    #[derive(Serialize, Deserialize)]
    struct Wrapped(#[serde(with = "crate::amount")] Amount);

    pub fn serialize<S>(value: &Option<Amount>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Wrapped).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Amount>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|wrapped| wrapped.0))
    }
}
