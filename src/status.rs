//! Finding status.

use anyhow::{bail, Error};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, fmt::Display, result, str::FromStr};

/// Status of a finding.
///
/// The order is significant: it goes from harmless to dangerous, so that
/// statuses can be compared when filtering rules with a minimum status.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub enum Status {
    /// The check passed, nothing wrong was found.
    Secure,
    /// Purely informational observation.
    Info,
    /// Potentially dangerous, needs human review.
    Warning,
    /// Insecure behavior was detected.
    Insecure,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(de)?;
        Self::from_str(&string)
            .map_err(|_| de::Error::custom(format!("unexpected status: {:?}", string)))
    }
}

impl FromStr for Status {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "secure" => Ok(Self::Secure),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "insecure" => Ok(Self::Insecure),
            _ => bail!("unknown status `{}`", s),
        }
    }
}
