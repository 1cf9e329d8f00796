//! Administrative scope shared by permissions and roles.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The trust scope a permission or role applies to.
///
/// Levels form a strict hierarchy (`site` > `organization` > `project`), but the
/// catalog only ever compares them for equality: a role may hold a permission
/// only when both sit at the same level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLevel {
    Site,
    Organization,
    Project,
}

impl ResourceLevel {
    pub const ALL: [ResourceLevel; 3] = [
        ResourceLevel::Site,
        ResourceLevel::Organization,
        ResourceLevel::Project,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLevel::Site => "site",
            ResourceLevel::Organization => "organization",
            ResourceLevel::Project => "project",
        }
    }
}

impl core::fmt::Display for ResourceLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site" => Ok(ResourceLevel::Site),
            "organization" => Ok(ResourceLevel::Organization),
            "project" => Ok(ResourceLevel::Project),
            other => Err(DomainError::validation(format!(
                "unknown resource level '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ResourceLevel::Organization).unwrap();
        assert_eq!(json, "\"organization\"");

        let level: ResourceLevel = serde_json::from_str("\"project\"").unwrap();
        assert_eq!(level, ResourceLevel::Project);
    }

    #[test]
    fn from_str_matches_as_str() {
        for level in ResourceLevel::ALL {
            assert_eq!(level.as_str().parse::<ResourceLevel>().unwrap(), level);
        }
        assert!("user".parse::<ResourceLevel>().is_err());
        assert!("Site".parse::<ResourceLevel>().is_err());
    }
}
