//! Compiled-in anatomical lookup tables: roll degrees, axis-fix membership and
//! reference planes. Left-side names are listed once and mirrored to the right.

use hashbrown::HashMap;
use once_cell::sync::Lazy;

use crate::config::RigGeneration;

const ARM_BONES: &[&str] = &[
    "Collar",
    "Shldr",
    "ShldrBend",
    "ShldrTwist",
    "ForeArm",
    "ForearmBend",
    "ForearmTwist",
    "Hand",
];

const LEG_BONES: &[&str] = &[
    "Thigh",
    "ThighBend",
    "ThighTwist",
    "Shin",
    "Foot",
    "Metatarsals",
];

const TOE_BONES: &[&str] = &[
    "Toe",
    "BigToe",
    "BigToe_2",
    "SmallToe1",
    "SmallToe1_2",
    "SmallToe2",
    "SmallToe2_2",
    "SmallToe3",
    "SmallToe3_2",
    "SmallToe4",
    "SmallToe4_2",
];

const FINGER_BONES: &[&str] = &[
    "Carpal1", "Carpal2", "Carpal3", "Carpal4", "Thumb1", "Thumb2", "Thumb3", "Index1", "Index2",
    "Index3", "Mid1", "Mid2", "Mid3", "Ring1", "Ring2", "Ring3", "Pinky1", "Pinky2", "Pinky3",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Limb {
    Arm,
    Leg,
    Toe,
    Finger,
}

/// Table entry for one named bone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollEntry {
    /// Roll for Genesis and Genesis 2 rigs, degrees
    pub legacy: f64,
    /// Roll for Genesis 3 and Genesis 8 rigs, degrees
    pub bend_twist: f64,
    /// Engine axis whose component is removed from the local Z axis
    pub fix_axis: usize,
}

impl RollEntry {
    pub fn degrees(&self, generation: Option<RigGeneration>) -> f64 {
        match generation {
            Some(g) if g.is_bend_twist() => self.bend_twist,
            _ => self.legacy,
        }
    }
}

fn entry_for(limb: Limb, side: f64) -> RollEntry {
    match limb {
        Limb::Arm => RollEntry {
            legacy: 90.0 * side,
            bend_twist: 90.0 * side,
            fix_axis: 2,
        },
        Limb::Leg | Limb::Toe => RollEntry {
            legacy: 0.0,
            bend_twist: 0.0,
            fix_axis: 0,
        },
        Limb::Finger => RollEntry {
            legacy: 90.0 * side,
            bend_twist: 180.0,
            fix_axis: 0,
        },
    }
}

static ROLL_TABLE: Lazy<HashMap<String, RollEntry>> = Lazy::new(|| {
    let groups = [
        (Limb::Arm, ARM_BONES),
        (Limb::Leg, LEG_BONES),
        (Limb::Toe, TOE_BONES),
        (Limb::Finger, FINGER_BONES),
    ];
    let mut table = HashMap::new();
    for (prefix, side) in [('l', 1.0), ('r', -1.0)] {
        for (limb, names) in groups {
            for base in names {
                table.insert(format!("{prefix}{base}"), entry_for(limb, side));
            }
        }
    }
    table
});

/// Roll table lookup by canonical bone name.
pub fn roll_entry(name: &str) -> Option<&'static RollEntry> {
    ROLL_TABLE.get(name)
}

/// Which end of a bone a plane point sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoneEnd {
    Head,
    Tail,
}

/// One defining point of a reference plane. The first bone present in the
/// figure is used, so one definition covers both naming generations.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanePoint {
    pub bones: Vec<String>,
    pub end: BoneEnd,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaneDef {
    pub name: String,
    pub points: [PlanePoint; 3],
}

struct PlaneTemplate {
    name: &'static str,
    points: [(&'static [&'static str], BoneEnd); 3],
    members: &'static [&'static str],
}

const PLANE_TEMPLATES: &[PlaneTemplate] = &[
    PlaneTemplate {
        name: "Arm",
        points: [
            (&["Shldr", "ShldrBend"], BoneEnd::Head),
            (&["ForeArm", "ForearmBend"], BoneEnd::Head),
            (&["Hand"], BoneEnd::Head),
        ],
        members: &[
            "Shldr",
            "ShldrBend",
            "ShldrTwist",
            "ForeArm",
            "ForearmBend",
            "ForearmTwist",
        ],
    },
    PlaneTemplate {
        name: "Leg",
        points: [
            (&["Thigh", "ThighBend"], BoneEnd::Head),
            (&["Shin"], BoneEnd::Head),
            (&["Foot"], BoneEnd::Head),
        ],
        members: &["Thigh", "ThighBend", "ThighTwist", "Shin"],
    },
    PlaneTemplate {
        name: "Thumb",
        points: [
            (&["Thumb1"], BoneEnd::Head),
            (&["Thumb2"], BoneEnd::Head),
            (&["Thumb3"], BoneEnd::Tail),
        ],
        members: &["Thumb1", "Thumb2", "Thumb3"],
    },
    PlaneTemplate {
        name: "Index",
        points: [
            (&["Index1"], BoneEnd::Head),
            (&["Index2"], BoneEnd::Head),
            (&["Index3"], BoneEnd::Tail),
        ],
        members: &["Index1", "Index2", "Index3"],
    },
    PlaneTemplate {
        name: "Mid",
        points: [
            (&["Mid1"], BoneEnd::Head),
            (&["Mid2"], BoneEnd::Head),
            (&["Mid3"], BoneEnd::Tail),
        ],
        members: &["Mid1", "Mid2", "Mid3"],
    },
    PlaneTemplate {
        name: "Ring",
        points: [
            (&["Ring1"], BoneEnd::Head),
            (&["Ring2"], BoneEnd::Head),
            (&["Ring3"], BoneEnd::Tail),
        ],
        members: &["Ring1", "Ring2", "Ring3"],
    },
    PlaneTemplate {
        name: "Pinky",
        points: [
            (&["Pinky1"], BoneEnd::Head),
            (&["Pinky2"], BoneEnd::Head),
            (&["Pinky3"], BoneEnd::Tail),
        ],
        members: &["Pinky1", "Pinky2", "Pinky3"],
    },
];

struct PlaneTables {
    defs: Vec<PlaneDef>,
    usage: HashMap<String, String>,
}

static PLANES: Lazy<PlaneTables> = Lazy::new(|| {
    let mut defs = Vec::new();
    let mut usage = HashMap::new();
    for prefix in ['l', 'r'] {
        for template in PLANE_TEMPLATES {
            let name = format!("{prefix}{}", template.name);
            let points = template.points.clone().map(|(bones, end)| PlanePoint {
                bones: bones.iter().map(|b| format!("{prefix}{b}")).collect(),
                end,
            });
            for member in template.members {
                usage.insert(format!("{prefix}{member}"), name.clone());
            }
            defs.push(PlaneDef { name, points });
        }
    }
    PlaneTables { defs, usage }
});

/// Every reference plane definition, left side first.
pub fn plane_defs() -> &'static [PlaneDef] {
    &PLANES.defs
}

/// Name of the reference plane a bone is registered against.
pub fn plane_for_bone(name: &str) -> Option<&'static str> {
    PLANES.usage.get(name).map(String::as_str)
}
