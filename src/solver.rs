//! Solver interface.
//!
//! The engine consumes the solver through the [`Solver`] trait: model
//! extraction over a constraint, enumeration of distinct models, and
//! concrete evaluation of variable-free trees. [`Z3Solver`] implements
//! it on top of z3, and doubles as the external simplifier by pushing
//! an AST through z3's `simplify` and re-parsing the SMT-LIB2 text that
//! comes back.

pub mod smtlib;
pub mod to_z3;

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use z3::ast::Ast;

use crate::ast::{extract_unique_ast_nodes, AstBuilder, AstRef};
use crate::error::{Result, TaseError};
use crate::symbolic::ExternalSimplifier;
use self::to_z3::ToZ3;

/// One assignment inside a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverModel {
    pub id: u64,
    pub name: String,
    pub value: u64,
}

pub trait Solver {
    fn name(&self) -> &'static str;

    /// A satisfying assignment for `node`, keyed by variable name.
    /// Unsatisfiable constraints yield an empty map.
    fn get_model(&self, node: &AstRef) -> Result<HashMap<String, u64>>;

    /// Up to `limit` models differing on at least one variable.
    fn get_models(&self, node: &AstRef, limit: usize) -> Result<Vec<HashMap<String, u64>>>;

    /// Concrete value of a variable-free tree.
    fn evaluate(&self, node: &AstRef) -> Result<u64>;

    fn is_sat(&self, node: &AstRef) -> Result<bool>;
}

#[derive(Clone)]
pub struct Z3Solver {
    z3_ctx: Rc<z3::Context>,
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Solver {
    pub fn new() -> Self {
        let cfg = z3::Config::new();
        Z3Solver {
            z3_ctx: Rc::new(z3::Context::new(&cfg)),
        }
    }

    pub fn get_z3_ctx(&self) -> &z3::Context {
        &self.z3_ctx
    }

    /// Free variables of `node` as `(name, bit size)` pairs, in
    /// first-seen order.
    fn free_variables(node: &AstRef) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        for n in extract_unique_ast_nodes(node) {
            if let crate::ast::AstOp::Var(name) = n.get_op() {
                out.push((name.clone(), n.get_size()));
            }
        }
        out
    }

    fn solve_once<'ctx>(
        &'ctx self,
        conv: &ToZ3<'ctx>,
        solver: &z3::Solver<'ctx>,
        vars: &[(String, u32)],
    ) -> Result<Option<HashMap<String, u64>>> {
        match solver.check() {
            z3::SatResult::Sat => {}
            z3::SatResult::Unsat => return Ok(None),
            z3::SatResult::Unknown => {
                return Err(TaseError::Solver("solver returned unknown".to_string()))
            }
        }
        let model = solver
            .get_model()
            .ok_or_else(|| TaseError::Solver("no model for a sat constraint".to_string()))?;
        let mut out = HashMap::new();
        for (name, size) in vars {
            let ast = conv.variable(name, *size);
            if let Some(value) = model.eval(&ast, false).and_then(|v| v.as_u64()) {
                out.insert(name.clone(), value);
            }
        }
        Ok(Some(out))
    }
}

impl Solver for Z3Solver {
    fn name(&self) -> &'static str {
        "z3"
    }

    fn get_model(&self, node: &AstRef) -> Result<HashMap<String, u64>> {
        Ok(self.get_models(node, 1)?.pop().unwrap_or_default())
    }

    fn get_models(&self, node: &AstRef, limit: usize) -> Result<Vec<HashMap<String, u64>>> {
        let conv = ToZ3::new(self);
        let constraint = conv.convert_bool(node)?;
        let solver = z3::Solver::new(self.get_z3_ctx());
        solver.assert(&constraint);
        let vars = Self::free_variables(node);
        let mut models = Vec::new();
        while models.len() < limit {
            let Some(model) = self.solve_once(&conv, &solver, &vars)? else {
                break;
            };
            // Next model must differ on at least one variable.
            let distinct: Vec<z3::ast::Bool> = model
                .iter()
                .map(|(name, value)| {
                    let size = vars.iter().find(|(n, _)| n == name).map(|(_, s)| *s).unwrap_or(64);
                    let var = conv.variable(name, size);
                    var._eq(&z3::ast::BV::from_u64(self.get_z3_ctx(), *value, size)).not()
                })
                .collect();
            models.push(model);
            if distinct.is_empty() {
                // No variables: a single trivial model is all there is.
                break;
            }
            let refs: Vec<&z3::ast::Bool> = distinct.iter().collect();
            solver.assert(&z3::ast::Bool::or(self.get_z3_ctx(), &refs));
        }
        debug!("{} model(s) extracted", models.len());
        Ok(models)
    }

    fn evaluate(&self, node: &AstRef) -> Result<u64> {
        if node.is_concretized() && node.get_size() <= 64 {
            return Ok(node.evaluate());
        }
        let vars = Self::free_variables(node);
        if !vars.is_empty() {
            return Err(TaseError::Solver(format!(
                "cannot evaluate: free variable {}",
                vars[0].0
            )));
        }
        let conv = ToZ3::new(self);
        let ast = conv.convert(node)?.simplify();
        if let Some(bv) = ast.as_bv() {
            return bv
                .as_u64()
                .ok_or_else(|| TaseError::Solver("value exceeds 64 bits".to_string()));
        }
        if let Some(b) = ast.as_bool() {
            return b
                .as_bool()
                .map(u64::from)
                .ok_or_else(|| TaseError::Solver("boolean did not normalise".to_string()));
        }
        Err(TaseError::Solver("unexpected sort from the solver".to_string()))
    }

    fn is_sat(&self, node: &AstRef) -> Result<bool> {
        let conv = ToZ3::new(self);
        let constraint = conv.convert_bool(node)?;
        let solver = z3::Solver::new(self.get_z3_ctx());
        solver.assert(&constraint);
        match solver.check() {
            z3::SatResult::Sat => Ok(true),
            z3::SatResult::Unsat => Ok(false),
            z3::SatResult::Unknown => Err(TaseError::Solver("solver returned unknown".to_string())),
        }
    }
}

impl ExternalSimplifier for Z3Solver {
    /// Round-trips `node` through z3's simplifier: the simplified tree
    /// comes back as SMT-LIB2 text and is re-parsed into builder nodes.
    fn simplify(&self, ast: &AstBuilder, node: &AstRef) -> Result<AstRef> {
        let conv = ToZ3::new(self);
        let simplified = conv.convert(node)?.simplify();
        let text = simplified.to_string();
        let out = smtlib::parse_term(ast, &text)?;
        if out.get_sort() != node.get_sort() {
            return Err(TaseError::Simplification(format!(
                "solver changed the sort from {} to {}",
                node.get_sort(),
                out.get_sort()
            )));
        }
        Ok(out)
    }
}
