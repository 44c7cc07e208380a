//! Typed AST constructors, interning dictionary and node pool.
//!
//! The builder is a cheap-to-clone handle over one shared pool, so every
//! engine of a session hands out nodes from the same dictionary. Each
//! constructor checks its operand sorts, computes the concolic evaluation
//! of the new node and applies the local rewrites that keep trees small
//! (neutral elements, concrete conditions, full-range extracts).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::error::{AstError, AstResult};
use super::printer::ReprMode;
use super::{bitmask, AstNode, AstOp, AstRef, Sort, MAX_BIT_SIZE};

#[derive(Debug, Default)]
struct AstPool {
    /// Interning dictionary keyed by structural hash.
    dictionary: HashMap<u64, AstRef>,
    dictionaries_enabled: bool,
    /// Every live node, keyed by allocation identity.
    allocated: HashMap<usize, AstRef>,
    /// Named free variables.
    variables: HashMap<String, AstRef>,
    mode: ReprMode,
}

#[derive(Clone, Debug)]
pub struct AstBuilder {
    pool: Rc<RefCell<AstPool>>,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        AstBuilder {
            pool: Rc::new(RefCell::new(AstPool {
                dictionaries_enabled: true,
                ..AstPool::default()
            })),
        }
    }

    fn new_node(&self, op: AstOp, args: Vec<AstRef>, sort: Sort, symbolized: bool, eval: u64) -> AstRef {
        let masked = match sort {
            Sort::Bitv(len) => eval & bitmask(len),
            Sort::Bool => (eval != 0) as u64,
        };
        let node: AstRef = AstNode::new(op, args, sort, symbolized, masked).into();
        self.record_ast_node(node)
    }

    fn new_node_maybe_const(&self, op: AstOp, args: Vec<AstRef>, sort: Sort, symbolized: bool, eval: u64) -> AstRef {
        if !symbolized && sort.get_size() <= u64::BITS {
            self.new_const(sort, eval)
        } else {
            self.new_node(op, args, sort, symbolized, eval)
        }
    }

    fn check_size(size: u32) -> AstResult<()> {
        if size == 0 || size > MAX_BIT_SIZE {
            return Err(AstError::SizeOutOfRange(size));
        }
        Ok(())
    }

    /// Records the node in the pool, or hands back the canonical
    /// representative when an equal node is already interned.
    pub fn record_ast_node(&self, node: AstRef) -> AstRef {
        let mut pool = self.pool.borrow_mut();
        if pool.dictionaries_enabled {
            if let Some(cached) = pool.dictionary.get(&node.get_hash()) {
                return cached.clone();
            }
            pool.dictionary.insert(node.get_hash(), node.clone());
        }
        pool.allocated.insert(node.as_ptr(), node.clone());
        node
    }

    /// Releases a set of nodes from the pool and the dictionary.
    pub fn free_ast_nodes(&self, nodes: &[AstRef]) {
        let mut pool = self.pool.borrow_mut();
        for node in nodes {
            pool.allocated.remove(&node.as_ptr());
            if let Some(canon) = pool.dictionary.get(&node.get_hash()) {
                if canon.as_ptr() == node.as_ptr() {
                    pool.dictionary.remove(&node.get_hash());
                }
            }
        }
    }

    /// Tears the whole pool down: dictionary, pool and variable registry.
    pub fn free_all_ast_nodes(&self) {
        let mut pool = self.pool.borrow_mut();
        pool.dictionary.clear();
        pool.allocated.clear();
        pool.variables.clear();
    }

    pub fn get_allocated_ast_nodes(&self) -> Vec<AstRef> {
        self.pool.borrow().allocated.values().cloned().collect()
    }

    pub fn set_allocated_ast_nodes(&self, nodes: &[AstRef]) {
        let mut pool = self.pool.borrow_mut();
        pool.allocated = nodes.iter().map(|n| (n.as_ptr(), n.clone())).collect();
        if pool.dictionaries_enabled {
            pool.dictionary = nodes.iter().map(|n| (n.get_hash(), n.clone())).collect();
        }
    }

    pub fn enable_dictionaries(&self, flag: bool) {
        self.pool.borrow_mut().dictionaries_enabled = flag;
    }

    pub fn dictionaries_enabled(&self) -> bool {
        self.pool.borrow().dictionaries_enabled
    }

    pub fn get_dictionaries_stats(&self) -> HashMap<String, usize> {
        let pool = self.pool.borrow();
        let mut stats = HashMap::new();
        stats.insert("dictionary".to_string(), pool.dictionary.len());
        stats.insert("allocated".to_string(), pool.allocated.len());
        stats.insert("variables".to_string(), pool.variables.len());
        stats
    }

    /// Looks the node up in the dictionary, without inserting it.
    pub fn browse_ast_dictionaries(&self, node: &AstRef) -> Option<AstRef> {
        self.pool.borrow().dictionary.get(&node.get_hash()).cloned()
    }

    pub fn record_variable_ast_node(&self, name: &str, node: AstRef) {
        self.pool.borrow_mut().variables.insert(name.to_string(), node);
    }

    pub fn get_ast_variable_node(&self, name: &str) -> Option<AstRef> {
        self.pool.borrow().variables.get(name).cloned()
    }

    pub fn get_ast_variable_nodes(&self) -> HashMap<String, AstRef> {
        self.pool.borrow().variables.clone()
    }

    pub fn set_ast_variable_nodes(&self, vars: HashMap<String, AstRef>) {
        self.pool.borrow_mut().variables = vars;
    }

    pub fn get_representation_mode(&self) -> ReprMode {
        self.pool.borrow().mode
    }

    pub fn set_representation_mode(&self, mode: ReprMode) {
        self.pool.borrow_mut().mode = mode;
    }

    /// Checks that every free variable of `root` resolves through the
    /// variable registry.
    pub fn check_variables_resolved(&self, root: &AstRef) -> AstResult<()> {
        let pool = self.pool.borrow();
        let mut stack = vec![root.clone()];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.get_hash()) {
                continue;
            }
            if let AstOp::Var(name) = node.get_op() {
                if !pool.variables.contains_key(name) {
                    return Err(AstError::UndefinedVariable(name.clone()));
                }
            }
            for arg in node.iter_args() {
                stack.push(arg.clone());
            }
        }
        Ok(())
    }

    /* Leaf constructors ================================================= */

    pub fn new_const(&self, sort: Sort, value: u64) -> AstRef {
        self.new_node(AstOp::Const, vec![], sort, false, value)
    }

    pub fn new_bv(&self, value: u64, size: u32) -> AstResult<AstRef> {
        Self::check_size(size)?;
        Ok(self.new_const(Sort::Bitv(size), value))
    }

    pub fn new_bool(&self, value: bool) -> AstRef {
        self.new_const(Sort::Bool, value as u64)
    }

    /// Fresh free variable; also records it in the variable registry so
    /// every variable reachable from an expression resolves by name.
    pub fn new_var(&self, sort: Sort, name: &str) -> AstResult<AstRef> {
        self.new_var_with_value(sort, name, 0)
    }

    /// Variable carrying the concrete value it had when it was
    /// introduced, so concolic evaluation stays defined across it.
    pub fn new_var_with_value(&self, sort: Sort, name: &str, value: u64) -> AstResult<AstRef> {
        if let Sort::Bitv(size) = sort {
            Self::check_size(size)?;
        }
        let node = self.new_node(AstOp::Var(name.to_string()), vec![], sort, true, value);
        self.record_variable_ast_node(name, node.clone());
        Ok(node)
    }

    /* Boolean constructors ============================================== */

    pub fn new_ite(&self, condition: AstRef, then: AstRef, otherwise: AstRef) -> AstResult<AstRef> {
        condition.expect_bool()?;
        then.expect_same_sort_with(&otherwise)?;

        if condition.is_concretized() {
            return Ok(if condition.evaluate_bool() { then } else { otherwise });
        }
        let symbolized = true;
        let sort = then.get_sort();
        let eval = if condition.evaluate_bool() {
            then.evaluate()
        } else {
            otherwise.evaluate()
        };
        Ok(self.new_node(AstOp::Ite, vec![condition, then, otherwise], sort, symbolized, eval))
    }

    pub fn new_lnot(&self, x: AstRef) -> AstResult<AstRef> {
        x.expect_bool()?;
        let symbolized = x.is_symbolized();
        let eval = (!x.evaluate_bool()) as u64;
        Ok(self.new_node_maybe_const(AstOp::Lnot, vec![x], Sort::Bool, symbolized, eval))
    }

    pub fn new_land(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bool()?;
        y.expect_bool()?;
        let symbolized = x.is_symbolized() | y.is_symbolized();
        let eval = (x.evaluate_bool() && y.evaluate_bool()) as u64;
        if x.is_concretized() {
            return Ok(if x.evaluate_bool() { y } else { self.new_bool(false) });
        }
        if y.is_concretized() {
            return Ok(if y.evaluate_bool() { x } else { self.new_bool(false) });
        }
        Ok(self.new_node_maybe_const(AstOp::Land, vec![x, y], Sort::Bool, symbolized, eval))
    }

    pub fn new_lor(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bool()?;
        y.expect_bool()?;
        let symbolized = x.is_symbolized() | y.is_symbolized();
        let eval = (x.evaluate_bool() || y.evaluate_bool()) as u64;
        if x.is_concretized() {
            return Ok(if x.evaluate_bool() { self.new_bool(true) } else { y });
        }
        if y.is_concretized() {
            return Ok(if y.evaluate_bool() { self.new_bool(true) } else { x });
        }
        Ok(self.new_node_maybe_const(AstOp::Lor, vec![x, y], Sort::Bool, symbolized, eval))
    }

    pub fn new_equal(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;
        let symbolized = x.is_symbolized() | y.is_symbolized();
        let eval = (x.evaluate() == y.evaluate()) as u64;
        Ok(self.new_node_maybe_const(AstOp::Equal, vec![x, y], Sort::Bool, symbolized, eval))
    }

    pub fn new_distinct(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;
        let symbolized = x.is_symbolized() | y.is_symbolized();
        let eval = (x.evaluate() != y.evaluate()) as u64;
        Ok(self.new_node_maybe_const(AstOp::Distinct, vec![x, y], Sort::Bool, symbolized, eval))
    }

    /* Bit-vector arithmetic ============================================= */

    pub fn new_bvadd(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate().wrapping_add(y.evaluate());

        if x.is_zero() {
            Ok(y)
        } else if y.is_zero() {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvadd, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvsub(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate().wrapping_sub(y.evaluate());

        if y.is_zero() {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvsub, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvmul(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate().wrapping_mul(y.evaluate());

        if x.is_zero() || y.is_zero() {
            Ok(self.new_const(sort, 0))
        } else if x.is_concretized() && x.evaluate() == 1 {
            Ok(y)
        } else if y.is_concretized() && y.evaluate() == 1 {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvmul, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvudiv(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        // bvudiv by zero is all ones.
        let eval = if y.evaluate() == 0 {
            bitmask(sort.get_size())
        } else {
            x.evaluate() / y.evaluate()
        };

        if y.is_concretized() && y.evaluate() == 1 {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvudiv, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvsdiv(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let size = sort.get_size();
        let eval = if y.evaluate() == 0 {
            // bvsdiv by zero is -1 for non-negative, 1 otherwise.
            if to_signed(x.evaluate(), size) >= 0 {
                bitmask(size)
            } else {
                1
            }
        } else {
            to_signed(x.evaluate(), size).wrapping_div(to_signed(y.evaluate(), size)) as u64
        };

        if y.is_concretized() && y.evaluate() == 1 {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvsdiv, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvurem(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = if y.evaluate() == 0 {
            x.evaluate()
        } else {
            x.evaluate() % y.evaluate()
        };
        Ok(self.new_node_maybe_const(AstOp::Bvurem, vec![x, y], sort, symbolized, eval))
    }

    pub fn new_bvsrem(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let size = sort.get_size();
        let eval = if y.evaluate() == 0 {
            x.evaluate()
        } else {
            to_signed(x.evaluate(), size).wrapping_rem(to_signed(y.evaluate(), size)) as u64
        };
        Ok(self.new_node_maybe_const(AstOp::Bvsrem, vec![x, y], sort, symbolized, eval))
    }

    /* Bit-vector logic ================================================== */

    pub fn new_bvand(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate() & y.evaluate();

        if x.is_zero() || y.is_zero() {
            Ok(self.new_const(sort, 0))
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvand, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvor(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate() | y.evaluate();

        if x.is_zero() {
            Ok(y)
        } else if y.is_zero() {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvor, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvxor(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate() ^ y.evaluate();

        if x.is_zero() {
            Ok(y)
        } else if y.is_zero() {
            Ok(x)
        } else if x.get_hash() == y.get_hash() {
            // xor with itself clears the destination.
            Ok(self.new_const(sort, 0))
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvxor, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvnot(&self, x: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        let symbolized = x.is_symbolized();
        let sort = x.get_sort();
        let eval = !x.evaluate();
        Ok(self.new_node_maybe_const(AstOp::Bvnot, vec![x], sort, symbolized, eval))
    }

    pub fn new_bvneg(&self, x: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        let symbolized = x.is_symbolized();
        let sort = x.get_sort();
        let eval = x.evaluate().wrapping_neg();
        Ok(self.new_node_maybe_const(AstOp::Bvneg, vec![x], sort, symbolized, eval))
    }

    pub fn new_bvshl(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let shift = y.evaluate();
        let eval = if shift >= u64::from(sort.get_size()) {
            0
        } else {
            x.evaluate().wrapping_shl(shift as u32)
        };

        if y.is_zero() {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvshl, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvlshr(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let shift = y.evaluate();
        let eval = if shift >= u64::from(sort.get_size()).min(64) {
            0
        } else {
            (x.evaluate() & bitmask(sort.get_size())) >> shift
        };

        if y.is_zero() {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvlshr, vec![x, y], sort, symbolized, eval))
        }
    }

    pub fn new_bvashr(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        x.expect_bitv()?;
        y.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        let symbolized = x.is_symbolized() | y.is_symbolized();
        let sort = x.get_sort();
        let size = sort.get_size();
        let shift = y.evaluate().min(u64::from(size.saturating_sub(1))).min(63);
        let eval = (to_signed(x.evaluate(), size) >> shift) as u64;

        if y.is_zero() {
            Ok(x)
        } else {
            Ok(self.new_node_maybe_const(AstOp::Bvashr, vec![x, y], sort, symbolized, eval))
        }
    }

    /* Comparisons ======================================================= */

    pub fn new_bvult(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_unsigned_cmp(AstOp::Bvult, x, y, |a, b| a < b)
    }

    pub fn new_bvule(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_unsigned_cmp(AstOp::Bvule, x, y, |a, b| a <= b)
    }

    pub fn new_bvugt(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_unsigned_cmp(AstOp::Bvugt, x, y, |a, b| a > b)
    }

    pub fn new_bvuge(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_unsigned_cmp(AstOp::Bvuge, x, y, |a, b| a >= b)
    }

    pub fn new_bvslt(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_signed_cmp(AstOp::Bvslt, x, y, |a, b| a < b)
    }

    pub fn new_bvsle(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_signed_cmp(AstOp::Bvsle, x, y, |a, b| a <= b)
    }

    pub fn new_bvsgt(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_signed_cmp(AstOp::Bvsgt, x, y, |a, b| a > b)
    }

    pub fn new_bvsge(&self, x: AstRef, y: AstRef) -> AstResult<AstRef> {
        self.new_signed_cmp(AstOp::Bvsge, x, y, |a, b| a >= b)
    }

    fn new_unsigned_cmp(
        &self,
        op: AstOp,
        x: AstRef,
        y: AstRef,
        cmp: fn(u64, u64) -> bool,
    ) -> AstResult<AstRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;
        let symbolized = x.is_symbolized() | y.is_symbolized();
        let eval = cmp(x.evaluate(), y.evaluate()) as u64;
        Ok(self.new_node_maybe_const(op, vec![x, y], Sort::Bool, symbolized, eval))
    }

    fn new_signed_cmp(
        &self,
        op: AstOp,
        x: AstRef,
        y: AstRef,
        cmp: fn(i64, i64) -> bool,
    ) -> AstResult<AstRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;
        let size = x.get_size();
        let symbolized = x.is_symbolized() | y.is_symbolized();
        let eval = cmp(to_signed(x.evaluate(), size), to_signed(y.evaluate(), size)) as u64;
        Ok(self.new_node_maybe_const(op, vec![x, y], Sort::Bool, symbolized, eval))
    }

    /* Width changes ===================================================== */

    pub fn new_concat(&self, high: AstRef, low: AstRef) -> AstResult<AstRef> {
        high.expect_bitv()?;
        low.expect_bitv()?;

        let size = high.get_size() + low.get_size();
        Self::check_size(size)?;
        let symbolized = high.is_symbolized() | low.is_symbolized();
        let eval = if low.get_size() >= u64::BITS {
            low.evaluate()
        } else {
            high.evaluate().wrapping_shl(low.get_size()) | low.evaluate()
        };
        Ok(self.new_node_maybe_const(AstOp::Concat, vec![high, low], Sort::Bitv(size), symbolized, eval))
    }

    /// Extracts bits `high` down to `low` from `value`.
    pub fn new_extract(&self, high: u32, low: u32, value: AstRef) -> AstResult<AstRef> {
        value.expect_bitv()?;
        if high < low || high >= value.get_size() {
            return Err(AstError::ExtractBounds {
                high,
                low,
                size: value.get_size(),
            });
        }
        if low == 0 && high == value.get_size() - 1 {
            return Ok(value);
        }
        let size = high - low + 1;
        let symbolized = value.is_symbolized();
        let eval = if low >= u64::BITS {
            0
        } else {
            (value.evaluate() >> low) & bitmask(size)
        };
        Ok(self.new_node_maybe_const(AstOp::Extract(high, low), vec![value], Sort::Bitv(size), symbolized, eval))
    }

    pub fn new_zero_extend(&self, bits: u32, value: AstRef) -> AstResult<AstRef> {
        value.expect_bitv()?;
        if bits == 0 {
            return Ok(value);
        }
        let size = value.get_size() + bits;
        Self::check_size(size)?;
        let symbolized = value.is_symbolized();
        let eval = value.evaluate();
        Ok(self.new_node_maybe_const(AstOp::ZeroExt(bits), vec![value], Sort::Bitv(size), symbolized, eval))
    }

    pub fn new_sign_extend(&self, bits: u32, value: AstRef) -> AstResult<AstRef> {
        value.expect_bitv()?;
        if bits == 0 {
            return Ok(value);
        }
        let size = value.get_size() + bits;
        Self::check_size(size)?;
        let symbolized = value.is_symbolized();
        let eval = to_signed(value.evaluate(), value.get_size()) as u64;
        Ok(self.new_node_maybe_const(AstOp::SignExt(bits), vec![value], Sort::Bitv(size), symbolized, eval))
    }

    /* Sort bridges ====================================================== */

    /// Bool to Bitv(1), as flag registers are bit-vectors.
    pub fn bool_to_bv(&self, op: AstRef) -> AstResult<AstRef> {
        if op.is_bool() {
            if op.is_concretized() {
                return self.new_bv(op.evaluate(), 1);
            }
            let one = self.new_bv(1, 1)?;
            let zero = self.new_bv(0, 1)?;
            return self.new_ite(op, one, zero);
        }
        if op.get_sort() == Sort::Bitv(1) {
            return Ok(op);
        }
        Err(AstError::UnexpectedSort(Sort::Bitv(1), op.get_sort()))
    }

    /// Bitv(1) to Bool.
    pub fn bv_to_bool(&self, op: AstRef) -> AstResult<AstRef> {
        if op.is_bool() {
            return Ok(op);
        }
        if op.get_sort() != Sort::Bitv(1) {
            return Err(AstError::UnexpectedSort(Sort::Bitv(1), op.get_sort()));
        }
        let one = self.new_bv(1, 1)?;
        self.new_equal(op, one)
    }
}

/// Reads `value` as a signed `size`-bit quantity.
fn to_signed(value: u64, size: u32) -> i64 {
    if size >= u64::BITS {
        value as i64
    } else {
        let shift = u64::BITS - size;
        ((value << shift) as i64) >> shift
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn const_folding() {
        let ast = AstBuilder::new();
        let a = ast.new_bv(40, 32).unwrap();
        let b = ast.new_bv(2, 32).unwrap();
        let sum = ast.new_bvadd(a, b).unwrap();
        assert!(sum.is_const());
        assert_eq!(sum.evaluate(), 42);
        assert_eq!(sum.get_size(), 32);
    }

    #[test]
    fn neutral_elements() {
        let ast = AstBuilder::new();
        let x = ast.new_var(Sort::Bitv(16), "x").unwrap();
        let zero = ast.new_bv(0, 16).unwrap();
        let one = ast.new_bv(1, 16).unwrap();
        assert_eq!(ast.new_bvadd(x.clone(), zero.clone()).unwrap(), x);
        assert_eq!(ast.new_bvmul(x.clone(), one).unwrap(), x);
        assert_eq!(ast.new_bvxor(x.clone(), zero).unwrap(), x);
        // x ^ x folds to zero.
        let xx = ast.new_bvxor(x.clone(), x.clone()).unwrap();
        assert!(xx.is_zero());
    }

    #[test]
    fn typing_is_checked() {
        let ast = AstBuilder::new();
        let x = ast.new_bv(1, 8).unwrap();
        let y = ast.new_bv(1, 16).unwrap();
        assert!(matches!(
            ast.new_bvadd(x.clone(), y),
            Err(AstError::SortIntegrity(..))
        ));
        assert!(matches!(
            ast.new_lnot(x.clone()),
            Err(AstError::UnexpectedSort(..))
        ));
        assert!(matches!(
            ast.new_extract(8, 0, x),
            Err(AstError::ExtractBounds { .. })
        ));
    }

    #[test]
    fn record_is_idempotent() {
        let ast = AstBuilder::new();
        let x = ast.new_var(Sort::Bitv(8), "x").unwrap();
        let y = ast.new_bv(3, 8).unwrap();
        let n1 = ast.new_bvadd(x.clone(), y.clone()).unwrap();
        let n2 = ast.new_bvadd(x, y).unwrap();
        assert_eq!(n1.as_ptr(), n2.as_ptr());
        let again = ast.record_ast_node(n1.clone());
        assert_eq!(again.as_ptr(), n1.as_ptr());
    }

    #[test]
    fn dictionary_can_be_disabled() {
        let ast = AstBuilder::new();
        ast.enable_dictionaries(false);
        let x = ast.new_bv(7, 8).unwrap();
        let y = ast.new_bv(7, 8).unwrap();
        assert_ne!(x.as_ptr(), y.as_ptr());
    }

    #[test]
    fn concat_and_extract_evaluate() {
        let ast = AstBuilder::new();
        let hi = ast.new_bv(0xab, 8).unwrap();
        let lo = ast.new_bv(0xcd, 8).unwrap();
        let cat = ast.new_concat(hi, lo).unwrap();
        assert_eq!(cat.get_size(), 16);
        assert_eq!(cat.evaluate(), 0xabcd);
        let back = ast.new_extract(15, 8, cat).unwrap();
        assert_eq!(back.evaluate(), 0xab);
    }

    #[test]
    fn signed_evaluation() {
        let ast = AstBuilder::new();
        let minus_one = ast.new_bv(0xff, 8).unwrap();
        let two = ast.new_bv(2, 8).unwrap();
        let cmp = ast.new_bvslt(minus_one.clone(), two.clone()).unwrap();
        assert_eq!(cmp.evaluate(), 1);
        let div = ast.new_bvsdiv(minus_one, two).unwrap();
        // -1 / 2 == 0
        assert_eq!(div.evaluate(), 0);
    }

    #[test]
    fn ite_on_concrete_condition_folds() {
        let ast = AstBuilder::new();
        let t = ast.new_bv(1, 8).unwrap();
        let e = ast.new_bv(2, 8).unwrap();
        let cond = ast.new_bool(true);
        let node = ast.new_ite(cond, t.clone(), e).unwrap();
        assert_eq!(node, t);
    }

    #[test]
    fn variables_resolve_through_registry() {
        let ast = AstBuilder::new();
        let x = ast.new_var(Sort::Bitv(8), "x").unwrap();
        let y = ast.new_bv(1, 8).unwrap();
        let node = ast.new_bvadd(x, y).unwrap();
        assert!(ast.check_variables_resolved(&node).is_ok());
        assert!(ast.get_ast_variable_node("x").is_some());
    }
}
