use serde::{Deserialize, Serialize};

use crate::domain::entity::Department;

/// Roles that hold a slot in an approval chain.
///
/// Staff can carry any role string in the directory; only these five ever
/// appear in a chain table, and everything else fails role resolution at
/// decision time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    Manager,
    Executive,
    Finance,
    Gmd,
    Chairman,
}

impl ChainRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Executive => "executive",
            Self::Finance => "finance",
            Self::Gmd => "gmd",
            Self::Chairman => "chairman",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "executive" => Some(Self::Executive),
            "finance" => Some(Self::Finance),
            "gmd" => Some(Self::Gmd),
            "chairman" => Some(Self::Chairman),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChainRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity record resolved for an acting user at decision time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub department: Department,
}

impl ActorProfile {
    pub fn chain_role(&self) -> Option<ChainRole> {
        ChainRole::parse(&self.role)
    }
}
