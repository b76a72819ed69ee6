//! pplua: a Lua preprocessor for the groff pipeline.
//!
//! Documents flow through line by line.  `.lua` / `.endlua` blocks and
//! `\lua'…'` inline expressions are evaluated by an [`Evaluator`]; everything
//! else passes through untouched.  Evaluated code talks to the document
//! through the `lroff` library, which routes all text through a diversion
//! store so output can be captured, replayed, and reordered.
//!
//! | Module   | Responsibility                                              |
//! |----------|-------------------------------------------------------------|
//! | `cli`    | argument parsing                                            |
//! | `engine` | the line scanner: blocks, line accounting, `.lf` directives |
//! | `eval`   | the [`Evaluator`] seam and its [`Value`] result model       |
//! | `expand` | `\lua'…'` inline expression expansion                       |
//! | `lroff`  | groff markup emission and document state                    |
//! | `lua`    | the mlua-backed engine (behind the `lua` feature)           |
//! | `output` | output sink and named diversions                            |

pub mod cli;
pub mod engine;
pub mod eval;
pub mod expand;
pub mod lroff;
pub mod lua;
pub mod output;

pub use engine::{Config, PreprocessError, Preprocessor};
pub use eval::{EvalError, Evaluator, Value};
pub use lroff::Lroff;
pub use output::{DivertError, DivertStore, OutputSink};

#[cfg(feature = "lua")]
pub use lua::LuaEngine;
