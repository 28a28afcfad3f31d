use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::kms::KeyType;

/// Wallet engine configuration.
///
/// All fields have defaults, so an empty JSON object is a valid configuration.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Name of the store holding wallet profiles.
    pub profile_store: String,
    /// Delay between two polls of a protocol service's pending actions.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Key type used when a key has to be created without an explicit type.
    pub default_key_type: KeyType,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile_store: "vcwallet_profiles".into(),
            poll_interval: Duration::from_millis(100),
            default_key_type: KeyType::Ed25519,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}
