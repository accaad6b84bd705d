// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles project names, image lists, and endpoint check lists.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::health::EndpointCheck;
use crate::types::{ImageName, ProjectName};

pub fn deserialize_project_name<'de, D>(deserializer: D) -> Result<ProjectName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ProjectName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_images<'de, D>(deserializer: D) -> Result<NonEmpty<ImageName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<String> = Vec::deserialize(deserializer)?;
    let images = values
        .iter()
        .map(|s| ImageName::new(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(images)
        .ok_or_else(|| serde::de::Error::custom("at least one image is required"))
}

pub fn deserialize_checks<'de, D>(deserializer: D) -> Result<NonEmpty<EndpointCheck>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let checks: Vec<EndpointCheck> = Vec::deserialize(deserializer)?;

    let mut names = std::collections::HashSet::new();
    for check in &checks {
        if !names.insert(check.name.as_str()) {
            return Err(serde::de::Error::custom(format!(
                "duplicate health check name: {}",
                check.name
            )));
        }
    }

    NonEmpty::from_vec(checks)
        .ok_or_else(|| serde::de::Error::custom("at least one health check is required"))
}
