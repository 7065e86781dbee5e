//! Parsed DAZ asset model.
//!
//! Scenes are parsed once into closed, explicitly optional records. The
//! [`AssetGraph`] indexes them so formula references can be resolved by entity id
//! without probing loose JSON.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::channel_path::ChannelPath;

fn default_rotation_order() -> String {
    "XYZ".to_string()
}

fn default_max() -> f64 {
    1.0
}

/// Per-axis lock flags in DAZ axis order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLocks {
    #[serde(default)]
    pub rotation: [bool; 3],
    #[serde(default)]
    pub translation: [bool; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneSpec {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Head, DAZ space (cm, Y-up)
    pub center_point: [f64; 3],
    /// Tail, DAZ space (cm, Y-up)
    pub end_point: [f64; 3],
    /// World-space orientation Euler, degrees
    #[serde(default, rename = "ws_rot", alias = "orientation")]
    pub orientation: [f64; 3],
    #[serde(default = "default_rotation_order")]
    pub rotation_order: String,
    #[serde(default)]
    pub locks: ChannelLocks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureSpec {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Explicit rig generation label ("Genesis8", ...); detected from the name when absent.
    #[serde(default)]
    pub rig: Option<String>,
    pub bones: Vec<BoneSpec>,
    #[serde(default)]
    pub formulas: Vec<FormulaSpec>,
}

impl FigureSpec {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn bone(&self, name: &str) -> Option<&BoneSpec> {
        self.bones.iter().find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub formulas: Vec<FormulaSpec>,
}

/// A scene node that is not a figure (props, cameras) but may own formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub formulas: Vec<FormulaSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Sum,
    Mult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(f64),
    /// Spline knot, `[x, y]` or `[x, y, tension, continuity, bias]`
    Knot(Vec<f64>),
    Ref(ChannelPath),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation", into = "RawOperation")]
pub enum Operation {
    Push(Operand),
    Add,
    Sub,
    Mult,
    Div,
    SplineConstant,
    SplineLinear,
    SplineTcb,
    /// Unrecognised tag; evaluation rejects it.
    Unknown(String),
}

impl Operation {
    pub fn tag(&self) -> &str {
        match self {
            Operation::Push(_) => "push",
            Operation::Add => "add",
            Operation::Sub => "sub",
            Operation::Mult => "mult",
            Operation::Div => "div",
            Operation::SplineConstant => "spline_constant",
            Operation::SplineLinear => "spline_linear",
            Operation::SplineTcb => "spline_tcb",
            Operation::Unknown(tag) => tag,
        }
    }

    pub fn is_spline(&self) -> bool {
        matches!(
            self,
            Operation::SplineConstant | Operation::SplineLinear | Operation::SplineTcb
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawOperation {
    op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    val: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl TryFrom<RawOperation> for Operation {
    type Error = String;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        Ok(match raw.op.as_str() {
            "push" => {
                if let Some(url) = raw.url {
                    let path = ChannelPath::parse(&url).map_err(|e| e.to_string())?;
                    Operation::Push(Operand::Ref(path))
                } else {
                    match raw.val {
                        Some(serde_json::Value::Number(n)) => Operation::Push(Operand::Const(
                            n.as_f64().ok_or_else(|| format!("push value {n} is not a float"))?,
                        )),
                        Some(serde_json::Value::Array(items)) => {
                            let knot = items
                                .iter()
                                .map(|v| {
                                    v.as_f64()
                                        .ok_or_else(|| format!("knot entry {v} is not a number"))
                                })
                                .collect::<Result<Vec<f64>, String>>()?;
                            Operation::Push(Operand::Knot(knot))
                        }
                        Some(other) => return Err(format!("unsupported push value {other}")),
                        None => return Err("push without 'val' or 'url'".to_string()),
                    }
                }
            }
            "add" => Operation::Add,
            "sub" => Operation::Sub,
            "mult" => Operation::Mult,
            "div" => Operation::Div,
            "spline_constant" => Operation::SplineConstant,
            "spline_linear" => Operation::SplineLinear,
            "spline_tcb" => Operation::SplineTcb,
            other => Operation::Unknown(other.to_string()),
        })
    }
}

impl From<Operation> for RawOperation {
    fn from(op: Operation) -> Self {
        let tag = op.tag().to_string();
        match op {
            Operation::Push(Operand::Const(v)) => RawOperation {
                op: tag,
                val: Some(serde_json::json!(v)),
                url: None,
            },
            Operation::Push(Operand::Knot(k)) => RawOperation {
                op: tag,
                val: Some(serde_json::json!(k)),
                url: None,
            },
            Operation::Push(Operand::Ref(path)) => RawOperation {
                op: tag,
                val: None,
                url: Some(path.to_string()),
            },
            _ => RawOperation {
                op: tag,
                val: None,
                url: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSpec {
    pub output: ChannelPath,
    #[serde(default)]
    pub stage: Stage,
    pub operations: Vec<Operation>,
}

/// Top-level scene document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub figures: Vec<FigureSpec>,
    #[serde(default, alias = "modifiers")]
    pub morphs: Vec<MorphSpec>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub formulas: Vec<FormulaSpec>,
}

/// Where a formula was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaOwner {
    Scene,
    Figure(usize),
    Morph(usize),
    Node(usize),
}

/// Entity resolved from a formula reference.
#[derive(Debug, Clone, Copy)]
pub enum Asset<'a> {
    Figure(&'a FigureSpec),
    Bone {
        figure: &'a FigureSpec,
        bone: &'a BoneSpec,
    },
    Morph(&'a MorphSpec),
    Node(&'a NodeSpec),
}

/// Index over a parsed [`SceneFile`].
#[derive(Debug, Default)]
pub struct AssetGraph {
    scene: SceneFile,
    figure_index: HashMap<String, usize>,
    morph_index: HashMap<String, usize>,
    node_index: HashMap<String, usize>,
    /// All formulas in declaration order: scene, figures, morphs, nodes.
    formulas: Vec<(FormulaOwner, FormulaSpec)>,
    by_output: HashMap<String, Vec<usize>>,
}

impl AssetGraph {
    pub fn new(scene: SceneFile) -> Self {
        let mut figure_index = HashMap::new();
        for (i, fig) in scene.figures.iter().enumerate() {
            figure_index.insert(fig.id().to_string(), i);
            figure_index.entry(fig.name.clone()).or_insert(i);
        }
        let mut morph_index = HashMap::new();
        for (i, morph) in scene.morphs.iter().enumerate() {
            if morph_index.insert(morph.id.clone(), i).is_some() {
                log::warn!("duplicate morph id '{}'; keeping the last one", morph.id);
            }
        }
        let node_index = scene
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut formulas = Vec::new();
        formulas.extend(
            scene
                .formulas
                .iter()
                .map(|f| (FormulaOwner::Scene, f.clone())),
        );
        for (i, fig) in scene.figures.iter().enumerate() {
            formulas.extend(fig.formulas.iter().map(|f| (FormulaOwner::Figure(i), f.clone())));
        }
        for (i, morph) in scene.morphs.iter().enumerate() {
            formulas.extend(morph.formulas.iter().map(|f| (FormulaOwner::Morph(i), f.clone())));
        }
        for (i, node) in scene.nodes.iter().enumerate() {
            formulas.extend(node.formulas.iter().map(|f| (FormulaOwner::Node(i), f.clone())));
        }

        let mut by_output: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, (_, f)) in formulas.iter().enumerate() {
            by_output.entry(f.output.entity.clone()).or_default().push(i);
        }

        Self {
            scene,
            figure_index,
            morph_index,
            node_index,
            formulas,
            by_output,
        }
    }

    pub fn scene(&self) -> &SceneFile {
        &self.scene
    }

    pub fn figures(&self) -> &[FigureSpec] {
        &self.scene.figures
    }

    pub fn figure(&self, id: &str) -> Option<&FigureSpec> {
        self.figure_index.get(id).map(|&i| &self.scene.figures[i])
    }

    pub fn morph(&self, id: &str) -> Option<&MorphSpec> {
        self.morph_index.get(id).map(|&i| &self.scene.morphs[i])
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.node_index.get(id).map(|&i| &self.scene.nodes[i])
    }

    /// Resolve an entity id in the context of `figure`: its bones first, then
    /// morphs, figures and plain nodes.
    pub fn resolve<'a>(&'a self, figure: &'a FigureSpec, entity: &str) -> Option<Asset<'a>> {
        if let Some(bone) = figure.bone(entity) {
            return Some(Asset::Bone { figure, bone });
        }
        if let Some(morph) = self.morph(entity) {
            return Some(Asset::Morph(morph));
        }
        if let Some(fig) = self.figure(entity) {
            return Some(Asset::Figure(fig));
        }
        self.node(entity).map(Asset::Node)
    }

    /// Every formula in declaration order with its owner.
    pub fn formulas(&self) -> impl Iterator<Item = (FormulaOwner, &FormulaSpec)> {
        self.formulas.iter().map(|(owner, f)| (*owner, f))
    }

    /// Formulas visible while building figure `index`: scene-level, that figure's,
    /// and all morph and node formulas.
    pub fn formulas_for_figure(&self, index: usize) -> impl Iterator<Item = &FormulaSpec> {
        self.formulas.iter().filter_map(move |(owner, f)| match owner {
            FormulaOwner::Figure(i) if *i != index => None,
            _ => Some(f),
        })
    }

    /// Formulas whose output entity is `entity`, in declaration order.
    pub fn formulas_for_output<'a>(
        &'a self,
        entity: &str,
    ) -> impl Iterator<Item = &'a FormulaSpec> + 'a {
        self.by_output
            .get(entity)
            .into_iter()
            .flat_map(move |idx| idx.iter().map(move |&i| &self.formulas[i].1))
    }

    pub fn figure_index(&self, id: &str) -> Option<usize> {
        self.figure_index.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_path::{Channel, Component};

    fn scene() -> SceneFile {
        serde_json::from_str(
            r##"{
            "figures": [{
                "name": "Genesis8Female",
                "bones": [
                    {"name": "lShldrBend", "center_point": [10, 150, 0], "end_point": [30, 150, 0]},
                    {"name": "lForearmBend", "parent": "lShldrBend",
                     "center_point": [30, 150, 0], "end_point": [50, 150, 0],
                     "ws_rot": [0, 0, 5], "rotation_order": "YZX"}
                ],
                "formulas": [{
                    "output": "Genesis8Female:#lForearmBend?rotation/y",
                    "operations": [
                        {"op": "push", "url": "#lShldrBend?rotation/x"},
                        {"op": "push", "val": 0.5},
                        {"op": "mult"}
                    ]
                }]
            }],
            "morphs": [{
                "id": "pJCMForeArmFwd_75_L",
                "formulas": [{
                    "output": "#pJCMForeArmFwd_75_L?value",
                    "stage": "mult",
                    "operations": [{"op": "push", "url": "#pCTRL?value"}, {"op": "frobnicate"}]
                }]
            }]
        }"##,
        )
        .unwrap()
    }

    #[test]
    fn parses_bones_and_formulas() {
        let s = scene();
        let fig = &s.figures[0];
        assert_eq!(fig.id(), "Genesis8Female");
        let bone = fig.bone("lForearmBend").unwrap();
        assert_eq!(bone.parent.as_deref(), Some("lShldrBend"));
        assert_eq!(bone.orientation, [0.0, 0.0, 5.0]);
        assert_eq!(bone.rotation_order, "YZX");
        assert_eq!(fig.bone("lShldrBend").unwrap().rotation_order, "XYZ");

        let f = &fig.formulas[0];
        assert_eq!(f.stage, Stage::Sum);
        assert_eq!(f.output.channel, Channel::Rotation);
        assert_eq!(f.output.component, Component::Y);
        assert_eq!(f.operations.len(), 3);
        assert_eq!(f.operations[1], Operation::Push(Operand::Const(0.5)));
        assert_eq!(f.operations[2], Operation::Mult);
    }

    #[test]
    fn unknown_ops_survive_parsing() {
        let s = scene();
        let f = &s.morphs[0].formulas[0];
        assert_eq!(f.stage, Stage::Mult);
        assert_eq!(f.operations[1], Operation::Unknown("frobnicate".into()));
    }

    #[test]
    fn push_without_operand_is_rejected() {
        let err = serde_json::from_str::<Operation>(r#"{"op": "push"}"#).unwrap_err();
        assert!(err.to_string().contains("push without"));
    }

    #[test]
    fn graph_resolves_bones_before_morphs() {
        let graph = AssetGraph::new(scene());
        let fig = graph.figure("Genesis8Female").unwrap();
        assert!(matches!(
            graph.resolve(fig, "lShldrBend"),
            Some(Asset::Bone { .. })
        ));
        assert!(matches!(
            graph.resolve(fig, "pJCMForeArmFwd_75_L"),
            Some(Asset::Morph(_))
        ));
        assert!(graph.resolve(fig, "lHand").is_none());
        assert_eq!(graph.formulas().count(), 2);
        assert_eq!(graph.formulas_for_output("lForearmBend").count(), 1);
        assert_eq!(graph.formulas_for_figure(0).count(), 2);
    }
}
