//! Compile-time node-kind registry (§9 "dynamic dispatch of node kinds"):
//! a name → metadata table used to reject unknown kinds and shape
//! mismatches (stream vs. batch, arity) before the compiler (`compiler.rs`)
//! attempts to construct anything.
//!
//! Rust's type system gives each node constructor a distinct signature
//! (differing edge element types and input arities), so there's no single
//! function-pointer type to store per entry the way a dynamically typed
//! host language would. This table carries only the metadata; the
//! heterogeneous construction itself is a `match` in `compiler.rs`.

use vortex_shared::VortexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeShape {
    Stream,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one input edge.
    One,
    /// Two or more input edges named by the call's arguments (`join`/`union`).
    Many,
}

#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub input_shape: EdgeShape,
    /// `None` for terminal sinks (no output edge).
    pub output_shape: Option<EdgeShape>,
}

const KINDS: &[KindSpec] = &[
    KindSpec { name: "from", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "where", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "eval", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "groupBy", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "window", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "join", arity: Arity::Many, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "union", arity: Arity::Many, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "stateDuration", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "stateCount", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: Some(EdgeShape::Stream) },
    KindSpec { name: "alert", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: None },
    KindSpec { name: "httpOut", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: None },
    KindSpec { name: "influxDBOut", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: None },
    KindSpec { name: "kafkaOut", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: None },
    KindSpec { name: "logOut", arity: Arity::One, input_shape: EdgeShape::Stream, output_shape: None },
    KindSpec { name: "query", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "sum", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "mean", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "count", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "min", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "max", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "percentile", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "stddev", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
    KindSpec { name: "spread", arity: Arity::One, input_shape: EdgeShape::Batch, output_shape: Some(EdgeShape::Batch) },
];

pub fn lookup(name: &str) -> Result<KindSpec, VortexError> {
    KINDS
        .iter()
        .find(|k| k.name == name)
        .copied()
        .ok_or_else(|| VortexError::ValidationError(format!("unknown node kind {name:?}")))
}

pub fn is_aggregate_fn(name: &str) -> bool {
    matches!(name, "sum" | "mean" | "count" | "min" | "max" | "percentile" | "stddev" | "spread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_kind() {
        assert!(lookup("frobnicate").is_err());
    }

    #[test]
    fn window_emits_batch_from_a_stream_input() {
        let spec = lookup("window").unwrap();
        assert_eq!(spec.input_shape, EdgeShape::Stream);
        assert_eq!(spec.output_shape, Some(EdgeShape::Batch));
    }

    #[test]
    fn join_and_union_declare_many_arity() {
        assert_eq!(lookup("join").unwrap().arity, Arity::Many);
        assert_eq!(lookup("union").unwrap().arity, Arity::Many);
    }
}
