//! Recursive-descent expression parser built on `winnow`, following the
//! precedence-climbing structure of `wf-lang`'s `wfl_parser::expr`
//! (Or -> And -> Cmp -> Sum -> Mul -> Un -> Primary), adapted to this
//! language's grammar (§4.3): no `in (...)` operator, `=~`/`!~` regex
//! match, and `%` modulo at multiplicative precedence.

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, cut_err, opt, preceded, repeat, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::token::{literal, take_while};
use winnow::{ModalResult, Parser};

use crate::ast::{BinOp, Expr, UnOp};

#[derive(Debug, thiserror::Error)]
#[error("failed to parse expression: {0}")]
pub struct ParseError(pub String);

/// Parse a complete expression, requiring the entire input to be consumed.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut rest = input;
    ws(&mut rest).map_err(|e| ParseError(format!("{e:?}")))?;
    let expr = or_expr(&mut rest).map_err(|e| ParseError(format!("{e:?}")))?;
    ws(&mut rest).map_err(|e| ParseError(format!("{e:?}")))?;
    if !rest.is_empty() {
        return Err(ParseError(format!("unexpected trailing input: {rest:?}")));
    }
    Ok(expr)
}

fn ws(input: &mut &str) -> ModalResult<()> {
    multispace0.void().parse_next(input)
}

fn ci_kw<'s>(word: &'static str) -> impl Parser<&'s str, (), ErrMode<ContextError>> {
    move |input: &mut &'s str| {
        let start = *input;
        let n = word.len();
        if start.len() >= n && start[..n].eq_ignore_ascii_case(word) {
            let after = &start[n..];
            if after.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                return Err(ErrMode::Backtrack(ContextError::new()));
            }
            *input = after;
            Ok(())
        } else {
            Err(ErrMode::Backtrack(ContextError::new()))
        }
    }
}

pub(crate) fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = and_expr.parse_next(input)?;
    loop {
        ws.parse_next(input)?;
        if opt(ci_kw("OR")).parse_next(input)?.is_some() {
            ws.parse_next(input)?;
            let right = cut_err(and_expr).parse_next(input)?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = cmp_expr.parse_next(input)?;
    loop {
        ws.parse_next(input)?;
        if opt(ci_kw("AND")).parse_next(input)?.is_some() {
            ws.parse_next(input)?;
            let right = cut_err(cmp_expr).parse_next(input)?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn cmp_op(input: &mut &str) -> ModalResult<BinOp> {
    alt((
        literal("==").value(BinOp::Eq),
        literal("!=").value(BinOp::Ne),
        literal("<=").value(BinOp::Le),
        literal(">=").value(BinOp::Ge),
        literal("=~").value(BinOp::Match),
        literal("!~").value(BinOp::NotMatch),
        literal("<").value(BinOp::Lt),
        literal(">").value(BinOp::Gt),
    ))
    .parse_next(input)
}

fn cmp_expr(input: &mut &str) -> ModalResult<Expr> {
    let left = sum_expr.parse_next(input)?;
    ws.parse_next(input)?;
    if let Some(op) = opt(cmp_op).parse_next(input)? {
        ws.parse_next(input)?;
        let right = cut_err(sum_expr).parse_next(input)?;
        return Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn sum_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = mul_expr.parse_next(input)?;
    loop {
        ws.parse_next(input)?;
        let op = opt(alt((
            literal("+").value(BinOp::Add),
            literal("-").value(BinOp::Sub),
        )))
        .parse_next(input)?;
        if let Some(op) = op {
            ws.parse_next(input)?;
            let right = cut_err(mul_expr).parse_next(input)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = unary_expr.parse_next(input)?;
    loop {
        ws.parse_next(input)?;
        let op = opt(alt((
            literal("*").value(BinOp::Mul),
            literal("/").value(BinOp::Div),
            literal("%").value(BinOp::Mod),
        )))
        .parse_next(input)?;
        if let Some(op) = op {
            ws.parse_next(input)?;
            let right = cut_err(unary_expr).parse_next(input)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        } else {
            break;
        }
    }
    Ok(left)
}

fn unary_expr(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    let op = opt(alt((
        literal("-").value(UnOp::Neg),
        literal("!").value(UnOp::Not),
    )))
    .parse_next(input)?;
    ws.parse_next(input)?;
    let expr = primary_expr.parse_next(input)?;
    Ok(match op {
        Some(op) => Expr::Unary {
            op,
            expr: Box::new(expr),
        },
        None => expr,
    })
}

fn primary_expr(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((
        paren_expr,
        bool_literal,
        regex_literal,
        string_literal,
        number_literal,
        call_or_ident,
    ))
    .parse_next(input)
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("(").parse_next(input)?;
    ws.parse_next(input)?;
    let expr = cut_err(or_expr).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;
    Ok(expr)
}

fn bool_literal(input: &mut &str) -> ModalResult<Expr> {
    alt((
        ci_kw("TRUE").value(Expr::Bool(true)),
        ci_kw("FALSE").value(Expr::Bool(false)),
    ))
    .parse_next(input)
}

fn regex_literal(input: &mut &str) -> ModalResult<Expr> {
    literal("/").parse_next(input)?;
    let body: &str = take_while(0.., |c: char| c != '/').parse_next(input)?;
    cut_err(literal("/")).parse_next(input)?;
    Ok(Expr::Regex(body.to_string()))
}

fn string_literal(input: &mut &str) -> ModalResult<Expr> {
    literal("\"").parse_next(input)?;
    let body: &str = take_while(0.., |c: char| c != '"').parse_next(input)?;
    cut_err(literal("\"")).parse_next(input)?;
    Ok(Expr::Str(body.to_string()))
}

fn number_literal(input: &mut &str) -> ModalResult<Expr> {
    let integer_part: &str = digit1.parse_next(input)?;
    if opt(literal(".")).parse_next(input)?.is_some() {
        let frac_part: &str = cut_err(digit1).parse_next(input)?;
        let s = format!("{integer_part}.{frac_part}");
        let value: f64 = s.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
        Ok(Expr::Number(value))
    } else {
        let value: f64 = integer_part
            .parse()
            .map_err(|_| ErrMode::Backtrack(ContextError::new()))?;
        Ok(Expr::Number(value))
    }
}

fn raw_ident(input: &mut &str) -> ModalResult<String> {
    if !input.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let ident: &str = take_while(1.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)?;
    Ok(ident.to_string())
}

fn call_or_ident(input: &mut &str) -> ModalResult<Expr> {
    let name = raw_ident.parse_next(input)?;
    ws.parse_next(input)?;
    if opt(literal("(")).parse_next(input)?.is_some() {
        ws.parse_next(input)?;
        let args: Vec<Expr> = if opt(literal(")")).parse_next(input)?.is_some() {
            Vec::new()
        } else {
            let args: Vec<Expr> =
                separated(1.., preceded(ws, or_expr), (ws, literal(","))).parse_next(input)?;
            ws.parse_next(input)?;
            cut_err(literal(")")).parse_next(input)?;
            args
        };
        return Ok(Expr::Call { name, args });
    }
    Ok(Expr::Ident(name))
}
