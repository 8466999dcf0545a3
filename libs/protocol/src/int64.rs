//! Integer fields accepting JSON numbers or decimal strings
//!
//! Protobuf JSON writes 64-bit integers as strings (`"minv":"1000"`), and
//! stored profiles use that form. Both decode to the same value; encoding
//! always emits plain numbers.

use serde::de::{Deserialize, Deserializer, Error};
use std::fmt::Display;
use std::str::FromStr;

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

impl<T> NumberOrString<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn into_value<E: Error>(self) -> Result<T, E> {
        match self {
            NumberOrString::Number(value) => Ok(value),
            NumberOrString::String(text) => text
                .trim()
                .parse()
                .map_err(|e| E::custom(format!("invalid integer string {:?}: {}", text, e))),
        }
    }
}

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    NumberOrString::<T>::deserialize(deserializer)?.into_value()
}

pub mod option {
    use super::NumberOrString;
    use serde::de::{Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        Option::<NumberOrString<T>>::deserialize(deserializer)?
            .map(NumberOrString::into_value)
            .transpose()
    }
}
