//! SMT-LIB2 term parsing.
//!
//! The external simplifier hands trees back as SMT-LIB2 text; this
//! module re-parses that text into builder nodes. Variables must already
//! be recorded in the builder's variable registry; `let` bindings (which
//! z3 emits for shared subterms) are expanded in place, which preserves
//! sharing through the interning dictionary.

use std::collections::HashMap;

use crate::ast::{AstBuilder, AstRef, Sort};
use crate::error::{Result, TaseError};

#[derive(Debug, Clone, PartialEq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

fn err(msg: impl Into<String>) -> TaseError {
    TaseError::Simplification(msg.into())
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            '|' => {
                // Quoted symbol: everything until the closing pipe.
                for q in chars.by_ref() {
                    if q == '|' {
                        break;
                    }
                    current.push(q);
                }
                tokens.push(std::mem::take(&mut current));
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_sexpr(tokens: &[String], pos: &mut usize) -> Result<SExpr> {
    let token = tokens.get(*pos).ok_or_else(|| err("unexpected end of input"))?;
    *pos += 1;
    if token == "(" {
        let mut items = Vec::new();
        loop {
            match tokens.get(*pos) {
                Some(t) if t == ")" => {
                    *pos += 1;
                    return Ok(SExpr::List(items));
                }
                Some(_) => items.push(parse_sexpr(tokens, pos)?),
                None => return Err(err("unbalanced parenthesis")),
            }
        }
    } else if token == ")" {
        Err(err("unexpected closing parenthesis"))
    } else {
        Ok(SExpr::Atom(token.clone()))
    }
}

/// Parses one SMT-LIB2 term into builder nodes.
pub fn parse_term(ast: &AstBuilder, text: &str) -> Result<AstRef> {
    let tokens = tokenize(text);
    let mut pos = 0;
    let sexpr = parse_sexpr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(err("trailing tokens after the term"));
    }
    build(ast, &sexpr, &HashMap::new())
}

fn build(ast: &AstBuilder, sexpr: &SExpr, env: &HashMap<String, AstRef>) -> Result<AstRef> {
    match sexpr {
        SExpr::Atom(atom) => build_atom(ast, atom, env),
        SExpr::List(items) => build_list(ast, items, env),
    }
}

fn build_atom(ast: &AstBuilder, atom: &str, env: &HashMap<String, AstRef>) -> Result<AstRef> {
    match atom {
        "true" => return Ok(ast.new_bool(true)),
        "false" => return Ok(ast.new_bool(false)),
        _ => {}
    }
    if let Some(hex) = atom.strip_prefix("#x") {
        let size = 4 * hex.len() as u32;
        if size > 64 {
            return Err(err(format!("literal {} exceeds 64 bits", atom)));
        }
        let value = u64::from_str_radix(hex, 16).map_err(|e| err(e.to_string()))?;
        return Ok(ast.new_bv(value, size)?);
    }
    if let Some(bin) = atom.strip_prefix("#b") {
        let size = bin.len() as u32;
        if size > 64 {
            return Err(err(format!("literal {} exceeds 64 bits", atom)));
        }
        let value = u64::from_str_radix(bin, 2).map_err(|e| err(e.to_string()))?;
        return Ok(ast.new_bv(value, size)?);
    }
    if let Some(node) = env.get(atom) {
        return Ok(node.clone());
    }
    ast.get_ast_variable_node(atom)
        .ok_or_else(|| err(format!("unknown symbol {}", atom)))
}

fn atom_of(sexpr: &SExpr) -> Result<&str> {
    match sexpr {
        SExpr::Atom(a) => Ok(a),
        SExpr::List(_) => Err(err("expected an atom")),
    }
}

fn number_of(sexpr: &SExpr) -> Result<u64> {
    atom_of(sexpr)?.parse().map_err(|_| err("expected a numeral"))
}

fn build_list(ast: &AstBuilder, items: &[SExpr], env: &HashMap<String, AstRef>) -> Result<AstRef> {
    let (head, args) = items.split_first().ok_or_else(|| err("empty term"))?;
    match head {
        // Indexed operator application: ((_ extract 7 0) x) and friends.
        SExpr::List(indexed) => {
            let mut parts = indexed.iter();
            let underscore = parts.next().map(atom_of).transpose()?;
            if underscore != Some("_") {
                return Err(err("expected an indexed operator"));
            }
            let name = atom_of(parts.next().ok_or_else(|| err("missing operator name"))?)?;
            let value = build(ast, args.first().ok_or_else(|| err("missing operand"))?, env)?;
            match name {
                "extract" => {
                    let high = number_of(indexed.get(2).ok_or_else(|| err("missing index"))?)? as u32;
                    let low = number_of(indexed.get(3).ok_or_else(|| err("missing index"))?)? as u32;
                    Ok(ast.new_extract(high, low, value)?)
                }
                "zero_extend" => {
                    let bits = number_of(indexed.get(2).ok_or_else(|| err("missing index"))?)? as u32;
                    Ok(ast.new_zero_extend(bits, value)?)
                }
                "sign_extend" => {
                    let bits = number_of(indexed.get(2).ok_or_else(|| err("missing index"))?)? as u32;
                    Ok(ast.new_sign_extend(bits, value)?)
                }
                other => Err(err(format!("unsupported indexed operator {}", other))),
            }
        }
        SExpr::Atom(op) => match op.as_str() {
            // Standalone indexed literal: (_ bv42 8).
            "_" => {
                let name = atom_of(args.first().ok_or_else(|| err("missing literal"))?)?;
                let digits = name
                    .strip_prefix("bv")
                    .ok_or_else(|| err(format!("unsupported indexed term {}", name)))?;
                let value: u64 = digits.parse().map_err(|_| err("bad literal value"))?;
                let size = number_of(args.get(1).ok_or_else(|| err("missing literal size"))?)? as u32;
                Ok(ast.new_bv(value, size)?)
            }
            "let" => {
                let SExpr::List(bindings) = args.first().ok_or_else(|| err("missing bindings"))? else {
                    return Err(err("malformed let bindings"));
                };
                let mut scope = env.clone();
                for binding in bindings {
                    let SExpr::List(pair) = binding else {
                        return Err(err("malformed let binding"));
                    };
                    let name = atom_of(pair.first().ok_or_else(|| err("missing binding name"))?)?;
                    let value = build(ast, pair.get(1).ok_or_else(|| err("missing binding value"))?, &scope)?;
                    scope.insert(name.to_string(), value);
                }
                build(ast, args.get(1).ok_or_else(|| err("missing let body"))?, &scope)
            }
            "ite" => {
                let [c, t, e] = args else {
                    return Err(err("ite expects three operands"));
                };
                let cond = build(ast, c, env)?;
                let then = build(ast, t, env)?;
                let otherwise = build(ast, e, env)?;
                Ok(ast.new_ite(cond, then, otherwise)?)
            }
            "=" => {
                let [a, b] = args else {
                    return Err(err("= expects two operands"));
                };
                let x = build(ast, a, env)?;
                let y = build(ast, b, env)?;
                if x.get_sort() == Sort::Bool {
                    // Boolean equality: (a and b) or (not a and not b).
                    let both = ast.new_land(x.clone(), y.clone())?;
                    let neither = ast.new_land(ast.new_lnot(x)?, ast.new_lnot(y)?)?;
                    Ok(ast.new_lor(both, neither)?)
                } else {
                    Ok(ast.new_equal(x, y)?)
                }
            }
            "distinct" => {
                let [a, b] = args else {
                    return Err(err("distinct expects two operands"));
                };
                let x = build(ast, a, env)?;
                let y = build(ast, b, env)?;
                Ok(ast.new_distinct(x, y)?)
            }
            "not" => {
                let [a] = args else {
                    return Err(err("not expects one operand"));
                };
                Ok(ast.new_lnot(build(ast, a, env)?)?)
            }
            "and" => fold_bool(ast, args, env, AstBuilder::new_land),
            "or" => fold_bool(ast, args, env, AstBuilder::new_lor),
            "concat" => {
                let mut out = build(ast, args.first().ok_or_else(|| err("missing operand"))?, env)?;
                for arg in &args[1..] {
                    out = ast.new_concat(out, build(ast, arg, env)?)?;
                }
                Ok(out)
            }
            "bvnot" => {
                let [a] = args else {
                    return Err(err("bvnot expects one operand"));
                };
                Ok(ast.new_bvnot(build(ast, a, env)?)?)
            }
            "bvneg" => {
                let [a] = args else {
                    return Err(err("bvneg expects one operand"));
                };
                Ok(ast.new_bvneg(build(ast, a, env)?)?)
            }
            "bvadd" => fold_bv(ast, args, env, AstBuilder::new_bvadd),
            "bvsub" => fold_bv(ast, args, env, AstBuilder::new_bvsub),
            "bvmul" => fold_bv(ast, args, env, AstBuilder::new_bvmul),
            "bvudiv" => fold_bv(ast, args, env, AstBuilder::new_bvudiv),
            "bvsdiv" => fold_bv(ast, args, env, AstBuilder::new_bvsdiv),
            "bvurem" => fold_bv(ast, args, env, AstBuilder::new_bvurem),
            "bvsrem" => fold_bv(ast, args, env, AstBuilder::new_bvsrem),
            "bvand" => fold_bv(ast, args, env, AstBuilder::new_bvand),
            "bvor" => fold_bv(ast, args, env, AstBuilder::new_bvor),
            "bvxor" => fold_bv(ast, args, env, AstBuilder::new_bvxor),
            "bvshl" => fold_bv(ast, args, env, AstBuilder::new_bvshl),
            "bvlshr" => fold_bv(ast, args, env, AstBuilder::new_bvlshr),
            "bvashr" => fold_bv(ast, args, env, AstBuilder::new_bvashr),
            "bvult" => cmp(ast, args, env, AstBuilder::new_bvult),
            "bvule" => cmp(ast, args, env, AstBuilder::new_bvule),
            "bvugt" => cmp(ast, args, env, AstBuilder::new_bvugt),
            "bvuge" => cmp(ast, args, env, AstBuilder::new_bvuge),
            "bvslt" => cmp(ast, args, env, AstBuilder::new_bvslt),
            "bvsle" => cmp(ast, args, env, AstBuilder::new_bvsle),
            "bvsgt" => cmp(ast, args, env, AstBuilder::new_bvsgt),
            "bvsge" => cmp(ast, args, env, AstBuilder::new_bvsge),
            other => Err(err(format!("unsupported operator {}", other))),
        },
    }
}

type BinOp = fn(&AstBuilder, AstRef, AstRef) -> crate::ast::AstResult<AstRef>;

fn fold_bv(ast: &AstBuilder, args: &[SExpr], env: &HashMap<String, AstRef>, f: BinOp) -> Result<AstRef> {
    let mut out = build(ast, args.first().ok_or_else(|| err("missing operand"))?, env)?;
    for arg in &args[1..] {
        out = f(ast, out, build(ast, arg, env)?)?;
    }
    Ok(out)
}

fn fold_bool(ast: &AstBuilder, args: &[SExpr], env: &HashMap<String, AstRef>, f: BinOp) -> Result<AstRef> {
    fold_bv(ast, args, env, f)
}

fn cmp(ast: &AstBuilder, args: &[SExpr], env: &HashMap<String, AstRef>, f: BinOp) -> Result<AstRef> {
    if args.len() != 2 {
        return Err(err("comparison expects two operands"));
    }
    let x = build(ast, &args[0], env)?;
    let y = build(ast, &args[1], env)?;
    f(ast, x, y).map_err(Into::into)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{printer::ast_to_string, ReprMode};

    #[test]
    fn parses_literals() {
        let ast = AstBuilder::new();
        let node = parse_term(&ast, "#x2a").unwrap();
        assert_eq!(node.get_size(), 8);
        assert_eq!(node.evaluate(), 0x2a);
        let node = parse_term(&ast, "#b1010").unwrap();
        assert_eq!(node.get_size(), 4);
        assert_eq!(node.evaluate(), 0b1010);
        let node = parse_term(&ast, "(_ bv66 16)").unwrap();
        assert_eq!(node.get_size(), 16);
        assert_eq!(node.evaluate(), 66);
    }

    #[test]
    fn parses_application() {
        let ast = AstBuilder::new();
        ast.new_var(Sort::Bitv(8), "x").unwrap();
        let node = parse_term(&ast, "(bvadd x #x01)").unwrap();
        assert_eq!(ast_to_string(&node, ReprMode::Smt), "(bvadd x (_ bv1 8))");
    }

    #[test]
    fn parses_indexed_operators() {
        let ast = AstBuilder::new();
        ast.new_var(Sort::Bitv(32), "x").unwrap();
        let node = parse_term(&ast, "((_ extract 7 0) x)").unwrap();
        assert_eq!(node.get_size(), 8);
        let node = parse_term(&ast, "((_ zero_extend 8) ((_ extract 7 0) x))").unwrap();
        assert_eq!(node.get_size(), 16);
    }

    #[test]
    fn parses_let_bindings() {
        let ast = AstBuilder::new();
        ast.new_var(Sort::Bitv(8), "x").unwrap();
        let node = parse_term(&ast, "(let ((a!1 (bvadd x #x01))) (bvmul a!1 a!1))").unwrap();
        assert_eq!(node.get_size(), 8);
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        let ast = AstBuilder::new();
        assert!(matches!(
            parse_term(&ast, "(bvadd nope #x01)"),
            Err(TaseError::Simplification(_))
        ));
    }
}
