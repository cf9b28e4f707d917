use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::transaction::TxType;
use super::Address;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    Creator,
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Creator => "CREATOR",
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }

    pub fn may_execute(self, kind: TxType) -> bool {
        match kind {
            TxType::Mint => matches!(self, Role::Creator),
            TxType::Transfer => true,
            TxType::Freeze | TxType::Unfreeze => matches!(self, Role::Creator | Role::Admin),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATOR" => Ok(Role::Creator),
            "ADMIN" => Ok(Role::Admin),
            // Records written before a role was assigned carry an empty
            // string; those accounts act as plain users.
            "USER" | "" => Ok(Role::User),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

impl Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    pub nonce: u64,
    pub is_frozen: bool,
    #[serde(default)]
    pub role: Role,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance: 0,
            nonce: 0,
            is_frozen: false,
            role: Role::User,
        }
    }
}
