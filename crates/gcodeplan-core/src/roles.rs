//! Extrusion roles, move types and skip types
//!
//! Every planned move carries a [`MoveType`] derived from its axis deltas
//! and an [`ExtrusionRole`] taken from the last `;FEATURE:` tag.

use crate::error::GcodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the nozzle is producing while a move executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrusionRole {
    None,
    Perimeter,
    ExternalPerimeter,
    OverhangPerimeter,
    InternalInfill,
    SolidInfill,
    TopSolidInfill,
    BottomSurface,
    Ironing,
    BridgeInfill,
    GapFill,
    Skirt,
    Brim,
    SupportMaterial,
    SupportMaterialInterface,
    SupportTransition,
    WipeTower,
    /// Purge performed during a filament change
    Flush,
    Custom,
    Mixed,
}

impl Default for ExtrusionRole {
    fn default() -> Self {
        Self::None
    }
}

impl ExtrusionRole {
    /// Number of roles; sizes the per-role statistics tables
    pub const COUNT: usize = 20;

    /// All roles in table order
    pub const ALL: [ExtrusionRole; Self::COUNT] = [
        Self::None,
        Self::Perimeter,
        Self::ExternalPerimeter,
        Self::OverhangPerimeter,
        Self::InternalInfill,
        Self::SolidInfill,
        Self::TopSolidInfill,
        Self::BottomSurface,
        Self::Ironing,
        Self::BridgeInfill,
        Self::GapFill,
        Self::Skirt,
        Self::Brim,
        Self::SupportMaterial,
        Self::SupportMaterialInterface,
        Self::SupportTransition,
        Self::WipeTower,
        Self::Flush,
        Self::Custom,
        Self::Mixed,
    ];

    /// Position of the role in [`ExtrusionRole::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used in `;FEATURE:` tags and in reports
    pub fn tag_name(self) -> &'static str {
        match self {
            Self::None => "Undefined",
            Self::Perimeter => "Inner wall",
            Self::ExternalPerimeter => "Outer wall",
            Self::OverhangPerimeter => "Overhang wall",
            Self::InternalInfill => "Sparse infill",
            Self::SolidInfill => "Internal solid infill",
            Self::TopSolidInfill => "Top surface",
            Self::BottomSurface => "Bottom surface",
            Self::Ironing => "Ironing",
            Self::BridgeInfill => "Bridge",
            Self::GapFill => "Gap infill",
            Self::Skirt => "Skirt",
            Self::Brim => "Brim",
            Self::SupportMaterial => "Support",
            Self::SupportMaterialInterface => "Support interface",
            Self::SupportTransition => "Support transition",
            Self::WipeTower => "Prime tower",
            Self::Flush => "Flush",
            Self::Custom => "Custom",
            Self::Mixed => "Multiple",
        }
    }

    /// Support material of any kind
    pub fn is_support(self) -> bool {
        matches!(
            self,
            Self::SupportMaterial | Self::SupportMaterialInterface | Self::SupportTransition
        )
    }
}

impl fmt::Display for ExtrusionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

impl FromStr for ExtrusionRole {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name == "Floating vertical shell" {
            return Ok(Self::SolidInfill);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|role| *role != Self::None && role.tag_name() == name)
            .ok_or_else(|| GcodeError::UnknownRole {
                name: name.to_string(),
            })
    }
}

/// Kind of motion a block represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    Noop,
    Retract,
    Unretract,
    Seam,
    ToolChange,
    ColorChange,
    PausePrint,
    CustomGcode,
    Travel,
    Wipe,
    Extrude,
}

impl Default for MoveType {
    fn default() -> Self {
        Self::Noop
    }
}

impl MoveType {
    /// Number of move types
    pub const COUNT: usize = 11;

    /// All move types in table order
    pub const ALL: [MoveType; Self::COUNT] = [
        Self::Noop,
        Self::Retract,
        Self::Unretract,
        Self::Seam,
        Self::ToolChange,
        Self::ColorChange,
        Self::PausePrint,
        Self::CustomGcode,
        Self::Travel,
        Self::Wipe,
        Self::Extrude,
    ];

    /// Position of the move type in [`MoveType::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Noop => "Noop",
            Self::Retract => "Retract",
            Self::Unretract => "Unretract",
            Self::Seam => "Seam",
            Self::ToolChange => "Tool change",
            Self::ColorChange => "Color change",
            Self::PausePrint => "Pause print",
            Self::CustomGcode => "Custom G-code",
            Self::Travel => "Travel",
            Self::Wipe => "Wipe",
            Self::Extrude => "Extrude",
        };
        f.write_str(name)
    }
}

/// Category of a skippable region (`;SKIPTYPE:` tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipType {
    Timelapse,
    HeadWipe,
    Other,
    None,
}

impl Default for SkipType {
    fn default() -> Self {
        Self::None
    }
}

impl SkipType {
    /// Parse the tag value; anything unknown is `Other`
    pub fn from_tag(value: &str) -> Self {
        match value.trim() {
            "timelapse" => Self::Timelapse,
            "head_wipe" => Self::HeadWipe,
            "" => Self::None,
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_index_matches_table() {
        for (i, role) in ExtrusionRole::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
        for (i, t) in MoveType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }

    #[test]
    fn test_role_from_tag() {
        assert_eq!(
            "Outer wall".parse::<ExtrusionRole>(),
            Ok(ExtrusionRole::ExternalPerimeter)
        );
        assert_eq!(
            "Prime tower".parse::<ExtrusionRole>(),
            Ok(ExtrusionRole::WipeTower)
        );
        assert_eq!(
            "Floating vertical shell".parse::<ExtrusionRole>(),
            Ok(ExtrusionRole::SolidInfill)
        );
        assert!("Undefined".parse::<ExtrusionRole>().is_err());
        assert!(matches!(
            "Spaghetti".parse::<ExtrusionRole>(),
            Err(GcodeError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_support_roles() {
        assert!(ExtrusionRole::SupportTransition.is_support());
        assert!(!ExtrusionRole::WipeTower.is_support());
    }

    #[test]
    fn test_skip_type() {
        assert_eq!(SkipType::from_tag("timelapse"), SkipType::Timelapse);
        assert_eq!(SkipType::from_tag("head_wipe"), SkipType::HeadWipe);
        assert_eq!(SkipType::from_tag("whatever"), SkipType::Other);
    }
}
