//! Canonical node kinds (§4.2). Each submodule owns one or two related
//! node kinds; `registry.rs` maps kind names to constructors over these
//! types for the compiler (§9: "dynamic dispatch of node kinds").

pub mod aggregate;
pub mod alert;
pub mod eval_node;
pub mod fanout;
pub mod filter;
pub mod group_by;
pub mod join;
pub mod sinks;
pub mod sources;
pub mod state_track;
pub mod union;
pub mod window;
