//! Recursive-descent parser for the pipeline program format (§6), built on
//! `winnow` following the same style as `vortex_grammar::parser` (`ws`/
//! `ci_kw`/`raw_ident` helpers, precedence expressed as a chain of small
//! functions). Statements are `var` declarations, `dbrp` scope bindings,
//! and pipeline chains, separated by `;` and/or newlines.
//!
//! `lambda: <expr>` bodies are captured as balanced text and handed to
//! `vortex_grammar::parse` rather than re-implemented here.

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, cut_err, opt, repeat, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::token::{literal, take_while};
use winnow::{ModalResult, Parser};

use super::ast::{Dbrp, MethodArg, MethodCall, PipelineChain, Program, Root, Stage, VarDecl, VarType, VarValue};

#[derive(Debug, thiserror::Error)]
#[error("failed to parse program: {0}")]
pub struct ProgramParseError(pub String);

/// Parse a complete program, requiring the entire input to be consumed.
pub fn parse_program(input: &str) -> Result<Program, ProgramParseError> {
    let mut rest = input;
    let program = program.parse_next(&mut rest).map_err(|e| ProgramParseError(format!("{e:?}")))?;
    ws_full(&mut rest).map_err(|e| ProgramParseError(format!("{e:?}")))?;
    if !rest.is_empty() {
        return Err(ProgramParseError(format!("unexpected trailing input: {rest:?}")));
    }
    Ok(program)
}

fn ws(input: &mut &str) -> ModalResult<()> {
    multispace0.void().parse_next(input)
}

/// Whitespace, `;` statement terminators, and `//` line comments — anything
/// that can separate two statements or trail the program.
fn ws_full(input: &mut &str) -> ModalResult<()> {
    loop {
        ws.parse_next(input)?;
        if opt(literal("//")).parse_next(input)?.is_some() {
            let _: &str = take_while(0.., |c: char| c != '\n').parse_next(input)?;
            continue;
        }
        if opt(literal(";")).parse_next(input)?.is_some() {
            continue;
        }
        break;
    }
    Ok(())
}

fn raw_ident(input: &mut &str) -> ModalResult<String> {
    if !input.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let ident: &str = take_while(1.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)?;
    Ok(ident.to_string())
}

fn kw<'s>(word: &'static str) -> impl Fn(&mut &'s str) -> ModalResult<()> {
    move |input: &mut &'s str| {
        let start = *input;
        let n = word.len();
        if start.len() >= n && &start[..n] == word {
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

fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let quote = alt((literal('\''), literal('"'))).parse_next(input)?;
    let body: &str = take_while(0.., move |c: char| c != quote.chars().next().unwrap()).parse_next(input)?;
    cut_err(literal(quote)).parse_next(input)?;
    Ok(body.to_string())
}

fn duration_unit_nanos(unit: &str) -> Option<i64> {
    Some(match unit {
        "ns" => 1,
        "us" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        "d" => 86_400_000_000_000,
        _ => return None,
    })
}

/// `10s`, `500ms`, `1h` — digits immediately followed by a time unit, no
/// intervening whitespace (distinguishes from a bare number literal).
fn duration_literal(input: &mut &str) -> ModalResult<i64> {
    let digits: &str = digit1.parse_next(input)?;
    let unit: &str = take_while(1..=2, |c: char| c.is_ascii_alphabetic()).parse_next(input)?;
    let nanos_per_unit = duration_unit_nanos(unit).ok_or_else(|| ErrMode::Backtrack(ContextError::new()))?;
    let count: i64 = digits.parse().map_err(|_| ErrMode::Backtrack(ContextError::new()))?;
    Ok(count * nanos_per_unit)
}

fn number_literal(input: &mut &str) -> ModalResult<f64> {
    let integer_part: &str = digit1.parse_next(input)?;
    if opt(literal(".")).parse_next(input)?.is_some() {
        let frac_part: &str = cut_err(digit1).parse_next(input)?;
        format!("{integer_part}.{frac_part}")
            .parse()
            .map_err(|_| ErrMode::Cut(ContextError::new()))
    } else {
        integer_part.parse().map_err(|_| ErrMode::Backtrack(ContextError::new()))
    }
}

fn bool_literal(input: &mut &str) -> ModalResult<bool> {
    alt((kw("true").value(true), kw("false").value(false))).parse_next(input)
}

/// Capture raw text up to (but not including) the next top-level `,` or
/// `)`, tracking paren nesting and single/double-quoted strings so commas
/// and parens inside a lambda body or a nested call don't end the capture
/// early.
fn balanced_until_comma_or_close(input: &mut &str) -> ModalResult<String> {
    let start = *input;
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut idx = 0usize;
    for c in start.chars() {
        if let Some(q) = in_quote {
            if c == q {
                in_quote = None;
            }
            idx += c.len_utf8();
            continue;
        }
        match c {
            '\'' | '"' => in_quote = Some(c),
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            ')' | ',' if depth == 0 => break,
            _ => {}
        }
        idx += c.len_utf8();
    }
    if idx == 0 {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let (body, rest) = start.split_at(idx);
    *input = rest;
    Ok(body.trim().to_string())
}

fn lambda_arg(input: &mut &str) -> ModalResult<MethodArg> {
    kw("lambda").parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(literal(":")).parse_next(input)?;
    ws.parse_next(input)?;
    let body = cut_err(balanced_until_comma_or_close).parse_next(input)?;
    let expr = vortex_grammar::parse(&body)
        .map_err(|_| ErrMode::Cut(ContextError::new()))?;
    Ok(MethodArg::Lambda(expr))
}

fn list_arg(input: &mut &str) -> ModalResult<MethodArg> {
    literal("[").parse_next(input)?;
    ws.parse_next(input)?;
    let items: Vec<MethodArg> = if opt(literal("]")).parse_next(input)?.is_some() {
        return Ok(MethodArg::List(Vec::new()));
    } else {
        separated(1.., method_arg, (ws, literal(","), ws)).parse_next(input)?
    };
    ws.parse_next(input)?;
    cut_err(literal("]")).parse_next(input)?;
    Ok(MethodArg::List(items))
}

fn method_arg(input: &mut &str) -> ModalResult<MethodArg> {
    ws.parse_next(input)?;
    alt((
        lambda_arg,
        list_arg,
        quoted_string.map(MethodArg::Str),
        duration_literal.map(MethodArg::Duration),
        number_literal.map(MethodArg::Num),
        bool_literal.map(MethodArg::Bool),
        raw_ident.map(MethodArg::Ident),
    ))
    .parse_next(input)
}

fn call_args(input: &mut &str) -> ModalResult<Vec<MethodArg>> {
    literal("(").parse_next(input)?;
    ws.parse_next(input)?;
    let args: Vec<MethodArg> = if opt(literal(")")).parse_next(input)?.is_some() {
        return Ok(Vec::new());
    } else {
        separated(1.., method_arg, (ws, literal(","), ws)).parse_next(input)?
    };
    ws.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;
    Ok(args)
}

fn method_call(input: &mut &str) -> ModalResult<MethodCall> {
    literal(".").parse_next(input)?;
    let name = cut_err(raw_ident).parse_next(input)?;
    ws.parse_next(input)?;
    let args = cut_err(call_args).parse_next(input)?;
    Ok(MethodCall { name, args })
}

fn stage(input: &mut &str) -> ModalResult<Stage> {
    let kind = raw_ident.parse_next(input)?;
    ws.parse_next(input)?;
    let args = cut_err(call_args).parse_next(input)?;
    let methods: Vec<MethodCall> = repeat(0.., method_call).parse_next(input)?;
    Ok(Stage { kind, args, methods })
}

fn root(input: &mut &str) -> ModalResult<Root> {
    alt((
        kw("stream").value(Root::Stream),
        kw("batch").value(Root::Batch),
        raw_ident.map(Root::Var),
    ))
    .parse_next(input)
}

fn pipeline_chain(input: &mut &str) -> ModalResult<PipelineChain> {
    let root = root.parse_next(input)?;
    ws.parse_next(input)?;
    let mut stages = Vec::new();
    loop {
        ws.parse_next(input)?;
        if opt(literal("|")).parse_next(input)?.is_some() {
            ws.parse_next(input)?;
            stages.push(cut_err(stage).parse_next(input)?);
        } else {
            break;
        }
    }
    Ok(PipelineChain { root, stages })
}

fn looks_like_pipeline_root(input: &str) -> bool {
    let mut probe = input;
    if kw("stream")(&mut probe).is_ok() || kw("batch")(&mut probe).is_ok() {
        return true;
    }
    // `var y = x|alert()` — a bare identifier root only counts as a
    // pipeline when followed (after whitespace) by a `|` stage.
    let mut probe = input;
    if raw_ident(&mut probe).is_ok() {
        let _ = ws(&mut probe);
        return probe.starts_with('|');
    }
    false
}

fn var_value(input: &mut &str) -> ModalResult<VarValue> {
    if looks_like_pipeline_root(*input) {
        return pipeline_chain.map(VarValue::Pipeline).parse_next(input);
    }
    method_arg.map(VarValue::Literal).parse_next(input)
}

fn var_type(input: &mut &str) -> ModalResult<VarType> {
    alt((
        kw("duration").value(VarType::Duration),
        kw("float").value(VarType::Float),
        kw("int").value(VarType::Int),
        kw("string").value(VarType::String),
        kw("bool").value(VarType::Bool),
        kw("regex").value(VarType::Regex),
        kw("lambda").value(VarType::Lambda),
        kw("list").value(VarType::List),
        kw("star").value(VarType::Star),
    ))
    .parse_next(input)
}

fn var_decl(input: &mut &str) -> ModalResult<VarDecl> {
    kw("var").parse_next(input)?;
    ws.parse_next(input)?;
    let name = cut_err(raw_ident).parse_next(input)?;
    ws.parse_next(input)?;
    let declared_type = opt(var_type).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(literal("=")).parse_next(input)?;
    ws.parse_next(input)?;
    let value = cut_err(var_value).parse_next(input)?;
    Ok(VarDecl { name, declared_type, value })
}

fn dbrp_decl(input: &mut &str) -> ModalResult<Dbrp> {
    kw("dbrp").parse_next(input)?;
    ws.parse_next(input)?;
    let database = cut_err(quoted_string).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(literal(".")).parse_next(input)?;
    ws.parse_next(input)?;
    let retention_policy = cut_err(quoted_string).parse_next(input)?;
    Ok(Dbrp { database, retention_policy })
}

fn program(input: &mut &str) -> ModalResult<Program> {
    let mut prog = Program::default();
    loop {
        ws_full.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        let probe: &str = *input;
        if probe.starts_with("var") && !probe[3..].starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            prog.vars.push(var_decl.parse_next(input)?);
        } else if probe.starts_with("dbrp") && !probe[4..].starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            prog.dbrps.push(dbrp_decl.parse_next(input)?);
        } else {
            prog.statements.push(pipeline_chain.parse_next(input)?);
        }
    }
    Ok(prog)
}
