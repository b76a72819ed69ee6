use proptest::prelude::*;

use pplua::engine::Config;
use pplua::eval::{EvalError, Evaluator, Value};
use pplua::expand::expand_inline;
use pplua::lroff::escape;
use pplua::output::DivertStore;

/// An evaluator that echoes the expression back, for exercising the scanner
/// without a Lua state.
struct Echo;

impl Evaluator for Echo {
    fn execute(&mut self, source: &str, _chunk_name: &str) -> Result<Value, EvalError> {
        Ok(Value::Text(source.to_owned()))
    }
}

proptest! {
    /// Lines without the opening delimiter pass through byte-identical.
    #[test]
    fn expand_is_identity_without_delimiter(s in "\\PC*") {
        prop_assume!(!s.contains("\\lua'"));
        let cfg = Config::default();
        let out = expand_inline(&s, &cfg, &mut Echo, "f", 1);
        prop_assert_eq!(out, s);
    }

    /// Arbitrary input never panics the expander, terminated or not.
    #[test]
    fn expand_never_panics(s in "\\PC*") {
        let cfg = Config::default();
        let _ = expand_inline(&s, &cfg, &mut Echo, "f", 1);
    }

    /// Escaping never leaves a bare backslash: every `\` in the output is
    /// part of a doubled pair.
    #[test]
    fn escape_doubles_every_backslash(s in "[a-z\\\\.']{0,40}") {
        let escaped = escape(&s);
        let stripped = escaped.replace("\\\\", "").replace("\\&", "");
        prop_assert!(!stripped.contains('\\'));
    }

    /// After escaping, no output line can start with a control character
    /// that groff would treat as a request.
    #[test]
    fn escape_neutralizes_line_start_requests(s in "[a-z\\n.']{0,60}") {
        let escaped = escape(&s);
        for line in escaped.split('\n') {
            prop_assert!(!line.starts_with('.') && !line.starts_with('\''));
        }
    }

    /// Benign text (no backslashes, no line-start requests) is untouched.
    #[test]
    fn escape_is_identity_on_benign_text(s in "[a-zA-Z0-9 ,;:]{0,60}") {
        prop_assert_eq!(escape(&s), s);
    }

    /// Balanced begin/end sequences leave the store with no active
    /// diversion, and text written outside any diversion reaches main.
    #[test]
    fn diversions_balance(names in proptest::collection::vec("[a-z]{1,6}", 0..6)) {
        let mut d = DivertStore::new();
        for n in &names {
            d.begin(n);
            d.writeln("captured");
        }
        for _ in &names {
            prop_assert!(d.end().is_ok());
        }
        prop_assert!(!d.is_diverting());
        prop_assert!(d.end().is_err());
        d.writeln("top");
        prop_assert!(d.main().contents().ends_with("top\n"));
    }
}
