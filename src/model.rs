// src/model.rs
//
// Model registry: an ordered collection of named node specifications with
// one designated composite output.
//
// Model definition is an immutable declarative step. Nothing is sampled
// here; nodes are realized per evaluator invocation and discarded once
// summaries are extracted. Validation happens at build time so undefined
// or forward references surface before any evaluation starts.
//
// Node order is a Vec, not a map: declaration order is meaningful (an
// expression may only reference earlier nodes) and deterministic
// iteration keeps seed derivation stable.

use serde::{Deserialize, Serialize};

use crate::compose::BinaryOp;
use crate::error::McError;
use crate::node::Role;
use crate::sampler::Distribution;

/// Arithmetic expression over named nodes.
///
/// Deserializes from YAML as a bare string (node reference), a bare
/// number (inline constant), or a `{op, lhs, rhs}` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    Name(String),
    Const(f64),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn name(n: impl Into<String>) -> Self {
        Expr::Name(n.into())
    }

    pub fn constant(v: f64) -> Self {
        Expr::Const(v)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Div, lhs, rhs)
    }

    /// Collect every node name referenced by this expression.
    pub fn references(&self, out: &mut Vec<String>) {
        match self {
            Expr::Name(n) => out.push(n.clone()),
            Expr::Const(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.references(out);
                rhs.references(out);
            }
        }
    }
}

/// Declarative specification of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    /// A fixed scalar.
    Constant { value: f64 },
    /// A node sampled along one axis. `role` must be `variability` or
    /// `uncertainty`.
    Sampled {
        role: Role,
        distribution: Distribution,
    },
    /// A node derived from earlier nodes via the composition engine.
    Derived { expr: Expr },
}

/// Validated model: ordered named specs plus the output designation.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    nodes: Vec<(String, NodeSpec)>,
    output: String,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[(String, NodeSpec)] {
        &self.nodes
    }

    pub fn output_name(&self) -> &str {
        &self.output
    }

    pub fn get(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    /// Position of a node in declaration order. The index doubles as the
    /// node's seed offset during evaluation.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|(n, _)| n == name)
    }

    /// Resolve the output node's dimensional role symbolically, without
    /// realizing any values, by folding the role table over the specs.
    pub fn output_role(&self) -> Role {
        let mut roles: Vec<(&str, Role)> = Vec::with_capacity(self.nodes.len());
        for (name, spec) in &self.nodes {
            let role = match spec {
                NodeSpec::Constant { .. } => Role::Constant,
                NodeSpec::Sampled { role, .. } => *role,
                NodeSpec::Derived { expr } => expr_role(expr, &roles),
            };
            roles.push((name.as_str(), role));
        }
        roles
            .iter()
            .find(|(n, _)| *n == self.output)
            .map(|(_, r)| *r)
            .expect("output validated at build time")
    }

    /// The built-in drinking-water exposure model used by the CLI
    /// harnesses and the documentation examples.
    ///
    /// Daily dose = concentration (org/L, varies between servings)
    ///            x consumption (L/day, varies between individuals)
    ///            x recovery correction (method uncertainty).
    pub fn example_drinking_water() -> Model {
        Model::builder()
            .sampled(
                "concentration",
                Role::Variability,
                Distribution::LogNormal {
                    meanlog: -1.2,
                    sdlog: 0.8,
                },
            )
            .sampled(
                "consumption",
                Role::Variability,
                Distribution::TruncNormal {
                    mean: 1.4,
                    sd: 0.6,
                    lower: 0.1,
                },
            )
            .sampled(
                "recovery",
                Role::Uncertainty,
                Distribution::LogNormal {
                    meanlog: 0.0,
                    sdlog: 0.3,
                },
            )
            .derived(
                "dose",
                Expr::mul(
                    Expr::mul(Expr::name("concentration"), Expr::name("consumption")),
                    Expr::name("recovery"),
                ),
            )
            .output("dose")
            .build()
            .expect("built-in model is valid")
    }
}

/// Symbolic role of an expression given the roles declared so far.
fn expr_role(expr: &Expr, roles: &[(&str, Role)]) -> Role {
    match expr {
        Expr::Const(_) => Role::Constant,
        Expr::Name(n) => roles
            .iter()
            .find(|(name, _)| name == n)
            .map(|(_, r)| *r)
            // Unresolved names are caught by build(); default is inert.
            .unwrap_or(Role::Constant),
        Expr::Binary { lhs, rhs, .. } => crate::compose::resolve_role(
            expr_role(lhs, roles),
            expr_role(rhs, roles),
        ),
    }
}

/// Builder collecting node declarations in order, validated by `build`.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    nodes: Vec<(String, NodeSpec)>,
    output: Option<String>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.nodes
            .push((name.into(), NodeSpec::Constant { value }));
        self
    }

    pub fn sampled(
        mut self,
        name: impl Into<String>,
        role: Role,
        distribution: Distribution,
    ) -> Self {
        self.nodes
            .push((name.into(), NodeSpec::Sampled { role, distribution }));
        self
    }

    pub fn derived(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.nodes.push((name.into(), NodeSpec::Derived { expr }));
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.output = Some(name.into());
        self
    }

    /// Validate and freeze the model.
    ///
    /// Checks: at least one node; no duplicate names; sampled roles are
    /// one-dimensional; distribution parameters are in-domain; derived
    /// expressions reference only earlier nodes; the output exists.
    pub fn build(self) -> Result<Model, McError> {
        if self.nodes.is_empty() {
            return Err(McError::InvalidParams {
                context: "model".to_string(),
                message: "a model needs at least one node".to_string(),
            });
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.nodes.len());
        for (name, spec) in &self.nodes {
            if name.is_empty() {
                return Err(McError::InvalidParams {
                    context: "model".to_string(),
                    message: "node names must be non-empty".to_string(),
                });
            }
            if seen.contains(&name.as_str()) {
                return Err(McError::InvalidParams {
                    context: "model".to_string(),
                    message: format!("duplicate node name '{}'", name),
                });
            }

            match spec {
                NodeSpec::Constant { value } => {
                    if !value.is_finite() {
                        return Err(McError::InvalidParams {
                            context: format!("node '{}'", name),
                            message: "constant value must be finite".to_string(),
                        });
                    }
                }
                NodeSpec::Sampled { role, distribution } => {
                    if !matches!(role, Role::Variability | Role::Uncertainty) {
                        return Err(McError::InvalidParams {
                            context: format!("node '{}'", name),
                            message: format!(
                                "sampled nodes must be variability or uncertainty (got {})",
                                role.as_str()
                            ),
                        });
                    }
                    distribution.validate()?;
                }
                NodeSpec::Derived { expr } => {
                    let mut refs = Vec::new();
                    expr.references(&mut refs);
                    for r in refs {
                        if !seen.contains(&r.as_str()) {
                            return Err(McError::UndefinedNode {
                                name: r,
                                context: format!("derived node '{}'", name),
                            });
                        }
                    }
                }
            }
            seen.push(name.as_str());
        }

        let output = self.output.ok_or_else(|| McError::InvalidParams {
            context: "model".to_string(),
            message: "no output node designated".to_string(),
        })?;
        if !seen.contains(&output.as_str()) {
            return Err(McError::UndefinedNode {
                name: output,
                context: "output designation".to_string(),
            });
        }

        Ok(Model {
            nodes: self.nodes,
            output,
        })
    }
}
