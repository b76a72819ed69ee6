//! The script-evaluation boundary.
//!
//! The preprocessor never talks to a Lua state directly; it submits source
//! text through the narrow [`Evaluator`] capability and receives a tagged
//! [`Value`] or an [`EvalError`].  This keeps the scanner testable with a
//! canned fake and the real engine (`lua.rs`, behind the `lua` feature)
//! swappable.

use std::fmt;

// ── Value ─────────────────────────────────────────────────────────────────────

/// Classified result of evaluating a script chunk.
///
/// Deliberately a closed three-case enum: the scanner's routing logic is a
/// tagged-union discrimination, and new engine-side value kinds must map
/// onto one of these rather than growing the set silently.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string result, written verbatim.
    Text(String),
    /// A numeric result, written as canonical decimal text.
    Number(f64),
    /// nil, tables, functions, … — produces no output.
    Nothing,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Number(n) => {
                // Integral values print like Lua integers: 42, not 42.0.
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Nothing => Ok(()),
        }
    }
}

impl Value {
    /// Text contribution of this value to the output stream, if any.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Nothing => None,
            other => Some(other.to_string()),
        }
    }
}

// ── EvalError ─────────────────────────────────────────────────────────────────

/// Failure reported by the script engine for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Capability to execute script source.
///
/// `chunk_name` identifies the source for engine-side error messages; the
/// scanner passes `@file:line` (and `@file:line:inline` for inline
/// expressions), following the Lua chunk-name convention.
///
/// The call blocks until the chunk completes; any output the chunk emitted
/// through the `lroff` surface has already been routed by the time it
/// returns.
pub trait Evaluator {
    fn execute(&mut self, source: &str, chunk_name: &str) -> Result<Value, EvalError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_displays_verbatim() {
        assert_eq!(Value::Text("hello".into()).to_string(), "hello");
    }

    #[test]
    fn integral_number_has_no_fraction() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(-7.0).to_string(), "-7");
        assert_eq!(Value::Number(0.0).to_string(), "0");
    }

    #[test]
    fn fractional_number_keeps_fraction() {
        assert_eq!(Value::Number(3.14).to_string(), "3.14");
        assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
    }

    #[test]
    fn nothing_renders_none() {
        assert_eq!(Value::Nothing.render(), None);
        assert_eq!(Value::Text("x".into()).render(), Some("x".into()));
        assert_eq!(Value::Number(1.0).render(), Some("1".into()));
    }

    #[test]
    fn eval_error_display() {
        let e = EvalError::new("attempt to call a nil value");
        assert_eq!(e.to_string(), "attempt to call a nil value");
    }
}
