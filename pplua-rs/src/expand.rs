//! Inline expression expansion.
//!
//! Replaces every `\lua'…'` span in a single markup line with the
//! stringified result of evaluating the enclosed expression, leaving the
//! rest of the line untouched.  Runs only on lines the block scanner did
//! not claim.
//!
//! Inside a span a backslash escapes the character after it: the escaped
//! character is kept as-is in the extracted source and never acts as a
//! delimiter.  The span ends at the first unescaped close character; the
//! depth counter starts at 1 and is only ever decremented, so spans of the
//! same delimiter do not nest — existing documents rely on
//! terminate-at-first-unescaped-close.

use crate::engine::Config;
use crate::eval::Evaluator;

/// Expand all inline expression spans in `line`, returning the rewritten
/// line.  `file`/`lineno` locate diagnostics and name the chunks.
pub fn expand_inline<E: Evaluator>(
    line: &str,
    cfg: &Config,
    eval: &mut E,
    file: &str,
    lineno: usize,
) -> String {
    let open = cfg.inline_open.as_str();
    let close = cfg.inline_close;

    // Fast path: most markup lines contain no inline expression at all.
    if !line.contains(open) {
        return line.to_owned();
    }

    let mut out = String::with_capacity(line.len());
    let mut pos = 0;

    while pos < line.len() {
        let Some(rel) = line[pos..].find(open) else {
            out.push_str(&line[pos..]);
            break;
        };
        let start = pos + rel;
        out.push_str(&line[pos..start]);

        let expr_start = start + open.len();

        // Scan for the first unescaped close character.
        let mut expr_end = None;
        let mut depth = 1u32;
        let mut it = line[expr_start..].char_indices();
        while let Some((off, c)) = it.next() {
            if c == '\\' {
                it.next(); // escaped character, copied as-is
                continue;
            }
            if c == close {
                depth -= 1;
                if depth == 0 {
                    expr_end = Some(expr_start + off);
                    break;
                }
            }
        }

        let Some(end) = expr_end else {
            // Unterminated span: pass the remainder through verbatim,
            // open delimiter included, and stop scanning this line.
            eprintln!("pplua: {file}:{lineno}: warning: unterminated \\lua expression");
            out.push_str(&line[start..]);
            break;
        };

        let expr = &line[expr_start..end];

        // Wrap so the expression's value is captured and coerced to text.
        let chunk = format!("return tostring({expr})");
        let chunk_name = format!("@{file}:{lineno}:inline");
        match eval.execute(&chunk, &chunk_name) {
            Ok(value) => {
                if let Some(text) = value.render() {
                    out.push_str(&text);
                }
            }
            Err(e) => {
                // Leave the expression site empty on error.
                eprintln!("pplua: {file}:{lineno}: inline lua error: {e}");
            }
        }

        pos = end + close.len_utf8();
    }

    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalError, Value};

    /// Evaluator driven by a closure; records every chunk it is handed.
    struct FnEval<F: FnMut(&str) -> Result<Value, EvalError>> {
        f: F,
        chunks: Vec<(String, String)>,
    }

    impl<F: FnMut(&str) -> Result<Value, EvalError>> FnEval<F> {
        fn new(f: F) -> Self {
            Self { f, chunks: Vec::new() }
        }
    }

    impl<F: FnMut(&str) -> Result<Value, EvalError>> Evaluator for FnEval<F> {
        fn execute(&mut self, source: &str, chunk_name: &str) -> Result<Value, EvalError> {
            self.chunks.push((source.to_owned(), chunk_name.to_owned()));
            (self.f)(source)
        }
    }

    fn text_eval(s: &str) -> FnEval<impl FnMut(&str) -> Result<Value, EvalError>> {
        let s = s.to_owned();
        FnEval::new(move |_| Ok(Value::Text(s.clone())))
    }

    fn exp<E: Evaluator>(line: &str, eval: &mut E) -> String {
        expand_inline(line, &Config::default(), eval, "doc.ms", 7)
    }

    #[test]
    fn identity_when_no_delimiter() {
        let mut eval = FnEval::new(|_| panic!("must not evaluate"));
        assert_eq!(exp("plain markup line", &mut eval), "plain markup line");
        assert!(eval.chunks.is_empty());
    }

    #[test]
    fn single_expression_substituted() {
        let mut eval = text_eval("2");
        assert_eq!(exp("x = \\lua'1+1' here", &mut eval), "x = 2 here");
    }

    #[test]
    fn expression_wrapped_in_tostring() {
        let mut eval = text_eval("ok");
        exp("\\lua'foo()'", &mut eval);
        assert_eq!(eval.chunks[0].0, "return tostring(foo())");
        assert_eq!(eval.chunks[0].1, "@doc.ms:7:inline");
    }

    #[test]
    fn multiple_expressions_on_one_line() {
        let mut n = 0;
        let mut eval = FnEval::new(move |_| {
            n += 1;
            Ok(Value::Text(n.to_string()))
        });
        assert_eq!(exp("a\\lua'p'b\\lua'q'c", &mut eval), "a1b2c");
    }

    #[test]
    fn escaped_close_stays_in_expression() {
        let mut eval = text_eval("R");
        exp("\\lua'f(\\'s\\')'", &mut eval);
        // The escaped quotes survive into the extracted source.
        assert_eq!(eval.chunks[0].0, "return tostring(f(\\'s\\'))");
    }

    #[test]
    fn escaped_backslash_then_close_terminates() {
        // \\ escapes the backslash itself; the following quote closes.
        let mut eval = text_eval("R");
        assert_eq!(exp("\\lua'a\\\\'x", &mut eval), "Rx");
        assert_eq!(eval.chunks[0].0, "return tostring(a\\\\)");
    }

    #[test]
    fn unterminated_span_passes_through_verbatim() {
        let mut eval = FnEval::new(|_| panic!("must not evaluate"));
        assert_eq!(
            exp("before \\lua'no end", &mut eval),
            "before \\lua'no end"
        );
        assert!(eval.chunks.is_empty());
    }

    #[test]
    fn error_leaves_empty_substitution() {
        let mut eval = FnEval::new(|_| Err(EvalError::new("boom")));
        assert_eq!(exp("a\\lua'bad'b", &mut eval), "ab");
    }

    #[test]
    fn number_result_uses_canonical_decimal() {
        let mut eval = FnEval::new(|_| Ok(Value::Number(2.0)));
        assert_eq!(exp("\\lua'1+1'", &mut eval), "2");
    }

    #[test]
    fn nothing_result_substitutes_nothing() {
        let mut eval = FnEval::new(|_| Ok(Value::Nothing));
        assert_eq!(exp("[\\lua'nil']", &mut eval), "[]");
    }

    #[test]
    fn text_before_and_after_is_untouched() {
        let mut eval = text_eval("MID");
        assert_eq!(
            exp("keep .this\\lua'x'and 'that'", &mut eval),
            "keep .thisMIDand 'that'"
        );
        // Only one expression was seen; the trailing quotes are ordinary
        // text because no open delimiter precedes them.
        assert_eq!(eval.chunks.len(), 1);
    }
}
