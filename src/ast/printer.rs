//! Textual representations of AST nodes.
//!
//! A single-slot mode selects between SMT-LIB2 output (the default, valid
//! input for any SMT toolchain) and a pythonic infix rendition meant for
//! humans reading traces.

use std::fmt::{self, Write};

use super::{bitmask, AstOp, AstRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReprMode {
    #[default]
    Smt,
    Python,
}

/// Writes `node` to `out` according to `mode`.
pub fn print_ast_representation(out: &mut dyn Write, node: &AstRef, mode: ReprMode) -> fmt::Result {
    match mode {
        ReprMode::Smt => write_smt(out, node),
        ReprMode::Python => write_python(out, node),
    }
}

/// Convenience wrapper returning the representation as a string.
pub fn ast_to_string(node: &AstRef, mode: ReprMode) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = print_ast_representation(&mut out, node, mode);
    out
}

fn write_smt(out: &mut dyn Write, node: &AstRef) -> fmt::Result {
    match node.get_op() {
        AstOp::Const => {
            if node.is_bool() {
                write!(out, "{}", if node.evaluate_bool() { "true" } else { "false" })
            } else {
                write!(out, "(_ bv{} {})", node.evaluate(), node.get_size())
            }
        }
        AstOp::Var(name) => write!(out, "{}", name),
        AstOp::Extract(high, low) => {
            write!(out, "((_ extract {} {}) ", high, low)?;
            write_smt(out, &node.get_arg(0))?;
            write!(out, ")")
        }
        AstOp::ZeroExt(bits) => {
            write!(out, "((_ zero_extend {}) ", bits)?;
            write_smt(out, &node.get_arg(0))?;
            write!(out, ")")
        }
        AstOp::SignExt(bits) => {
            write!(out, "((_ sign_extend {}) ", bits)?;
            write_smt(out, &node.get_arg(0))?;
            write!(out, ")")
        }
        op => {
            write!(out, "({}", smt_symbol(op))?;
            for arg in node.iter_args() {
                write!(out, " ")?;
                write_smt(out, arg)?;
            }
            write!(out, ")")
        }
    }
}

fn smt_symbol(op: &AstOp) -> &'static str {
    match op {
        AstOp::Ite => "ite",
        AstOp::Equal => "=",
        AstOp::Distinct => "distinct",
        AstOp::Lnot => "not",
        AstOp::Land => "and",
        AstOp::Lor => "or",
        AstOp::Bvadd => "bvadd",
        AstOp::Bvsub => "bvsub",
        AstOp::Bvmul => "bvmul",
        AstOp::Bvudiv => "bvudiv",
        AstOp::Bvsdiv => "bvsdiv",
        AstOp::Bvurem => "bvurem",
        AstOp::Bvsrem => "bvsrem",
        AstOp::Bvand => "bvand",
        AstOp::Bvor => "bvor",
        AstOp::Bvxor => "bvxor",
        AstOp::Bvnot => "bvnot",
        AstOp::Bvneg => "bvneg",
        AstOp::Bvshl => "bvshl",
        AstOp::Bvlshr => "bvlshr",
        AstOp::Bvashr => "bvashr",
        AstOp::Bvult => "bvult",
        AstOp::Bvule => "bvule",
        AstOp::Bvugt => "bvugt",
        AstOp::Bvuge => "bvuge",
        AstOp::Bvslt => "bvslt",
        AstOp::Bvsle => "bvsle",
        AstOp::Bvsgt => "bvsgt",
        AstOp::Bvsge => "bvsge",
        AstOp::Concat => "concat",
        AstOp::Const | AstOp::Var(_) | AstOp::Extract(..) | AstOp::ZeroExt(_) | AstOp::SignExt(_) => {
            unreachable!("handled by the caller")
        }
    }
}

fn write_python(out: &mut dyn Write, node: &AstRef) -> fmt::Result {
    match node.get_op() {
        AstOp::Const => {
            if node.is_bool() {
                write!(out, "{}", if node.evaluate_bool() { "True" } else { "False" })
            } else {
                write!(out, "{:#x}", node.evaluate())
            }
        }
        AstOp::Var(name) => write!(out, "{}", name),
        AstOp::Ite => {
            write!(out, "(")?;
            write_python(out, &node.get_arg(1))?;
            write!(out, " if ")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, " else ")?;
            write_python(out, &node.get_arg(2))?;
            write!(out, ")")
        }
        AstOp::Lnot => {
            write!(out, "(not ")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, ")")
        }
        AstOp::Bvnot => {
            write!(out, "(~")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, " & {:#x})", node.get_bitmask())
        }
        AstOp::Bvneg => {
            write!(out, "(-")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, " & {:#x})", node.get_bitmask())
        }
        AstOp::Extract(_, low) => {
            write!(out, "((")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, " >> {}) & {:#x})", low, bitmask(node.get_size()))
        }
        AstOp::ZeroExt(_) => write_python(out, &node.get_arg(0)),
        AstOp::SignExt(_) => {
            write!(out, "sign_extend(")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, ", {})", node.get_size())
        }
        AstOp::Concat => {
            let low = node.get_arg(1);
            write!(out, "((")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, " << {}) | ", low.get_size())?;
            write_python(out, &low)?;
            write!(out, ")")
        }
        op => {
            let (symbol, masked) = python_symbol(op);
            write!(out, "(")?;
            write_python(out, &node.get_arg(0))?;
            write!(out, " {} ", symbol)?;
            write_python(out, &node.get_arg(1))?;
            if masked {
                write!(out, ") & {:#x}", node.get_bitmask())?;
                return Ok(());
            }
            write!(out, ")")
        }
    }
}

fn python_symbol(op: &AstOp) -> (&'static str, bool) {
    match op {
        AstOp::Equal => ("==", false),
        AstOp::Distinct => ("!=", false),
        AstOp::Land => ("and", false),
        AstOp::Lor => ("or", false),
        AstOp::Bvadd => ("+", true),
        AstOp::Bvsub => ("-", true),
        AstOp::Bvmul => ("*", true),
        AstOp::Bvudiv | AstOp::Bvsdiv => ("//", true),
        AstOp::Bvurem | AstOp::Bvsrem => ("%", true),
        AstOp::Bvand => ("&", false),
        AstOp::Bvor => ("|", false),
        AstOp::Bvxor => ("^", false),
        AstOp::Bvshl => ("<<", true),
        AstOp::Bvlshr | AstOp::Bvashr => (">>", false),
        AstOp::Bvult | AstOp::Bvslt => ("<", false),
        AstOp::Bvule | AstOp::Bvsle => ("<=", false),
        AstOp::Bvugt | AstOp::Bvsgt => (">", false),
        AstOp::Bvuge | AstOp::Bvsge => (">=", false),
        _ => unreachable!("handled by the caller"),
    }
}
