use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The one step a bridge invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    /// Ask the backend for build requirements beyond the static ones.
    QueryExtraRequirements,
    /// Ask the backend to write the `.dist-info` directory without building.
    PrepareMetadata,
    /// Build the wheel.
    BuildArtifact,
}

impl Goal {
    /// The name used on the command line.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::QueryExtraRequirements => "GetRequiresForBuildWheel",
            Self::PrepareMetadata => "WheelMetadata",
            Self::BuildArtifact => "Wheel",
        }
    }

    /// The backend hook that implements this goal.
    pub fn hook_name(self) -> &'static str {
        match self {
            Self::QueryExtraRequirements => "get_requires_for_build_wheel",
            Self::PrepareMetadata => "prepare_metadata_for_build_wheel",
            Self::BuildArtifact => "build_wheel",
        }
    }
}

impl Display for Goal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error(
    "Unknown goal `{0}`, expected one of `GetRequiresForBuildWheel`, `WheelMetadata`, or `Wheel`"
)]
pub struct GoalParseError(String);

impl FromStr for Goal {
    type Err = GoalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GetRequiresForBuildWheel" => Ok(Self::QueryExtraRequirements),
            "WheelMetadata" => Ok(Self::PrepareMetadata),
            "Wheel" => Ok(Self::BuildArtifact),
            _ => Err(GoalParseError(s.to_string())),
        }
    }
}
