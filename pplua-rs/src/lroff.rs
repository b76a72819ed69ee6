//! The `lroff` emission library.
//!
//! Everything scripted code can do to the output goes through here: raw
//! emission, groff requests, escaping, fonts and sizes, number/string
//! registers, diversions, macro definition, inline styling, document
//! structure, and compound structures (tables and lists).
//!
//! Because pplua is a *preprocessor*, it cannot interrogate the downstream
//! formatter at run time.  [`DocumentState`] is a best-effort shadow of the
//! formatter's state that stays correct as long as every state change is
//! made through these operations.

use std::collections::HashMap;

use crate::output::{DivertError, DivertStore};

/// Version string reported by `lroff.version()` and `lroff._VERSION`.
pub const PPLUA_VERSION: &str = concat!("pplua ", env!("CARGO_PKG_VERSION"));

// ── Escaping & reference builders (pure text transforms) ──────────────────────

/// Escape plain text for safe inclusion in groff source.
///
/// Single pass with one piece of state: whether the cursor is at the start
/// of an output line (true initially and immediately after every newline).
/// Backslashes are doubled; a period or apostrophe at line start is
/// prefixed with `\&` so the formatter cannot mistake the line for a
/// control request.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut at_line_start = true;
    for c in text.chars() {
        match c {
            '\\' => {
                out.push_str("\\\\");
                at_line_start = false;
            }
            '\n' => {
                out.push('\n');
                at_line_start = true;
            }
            '.' | '\'' => {
                if at_line_start {
                    out.push_str("\\&");
                }
                out.push(c);
                at_line_start = false;
            }
            other => {
                out.push(other);
                at_line_start = false;
            }
        }
    }
    out
}

/// Build an inline escape sequence: `\<code><arg>` when both the code and
/// the argument are a single character, else the bracketed `\<code>[<arg>]`
/// form, which stays unambiguous for multi-character identifiers.
pub fn inline_escape(code: &str, arg: &str) -> String {
    if code.chars().count() == 1 && arg.chars().count() <= 1 {
        format!("\\{code}{arg}")
    } else {
        format!("\\{code}[{arg}]")
    }
}

/// Wrap `text` in a font-change/font-restore pair.  Returned, never emitted.
pub fn styled(font_code: &str, text: &str) -> String {
    if font_code.chars().count() > 1 {
        format!("\\f[{font_code}]{text}\\f[P]")
    } else {
        format!("\\f{font_code}{text}\\fP")
    }
}

pub fn bold(text: &str) -> String {
    styled("B", text)
}

pub fn italic(text: &str) -> String {
    styled("I", text)
}

pub fn bold_italic(text: &str) -> String {
    styled("BI", text)
}

pub fn mono(text: &str) -> String {
    styled("CR", text)
}

/// Reference to a named special character: `\(xx` for names of at most two
/// characters, `\[name]` otherwise.
pub fn special_char(name: &str) -> String {
    if name.chars().count() <= 2 {
        format!("\\({name}")
    } else {
        format!("\\[{name}]")
    }
}

/// Interpolation reference to a number register.
pub fn nr_ref(name: &str) -> String {
    match name.chars().count() {
        1 => format!("\\n{name}"),
        2 => format!("\\n({name}"),
        _ => format!("\\n[{name}]"),
    }
}

/// Interpolation reference to a string register.
pub fn ds_ref(name: &str) -> String {
    match name.chars().count() {
        1 => format!("\\*{name}"),
        2 => format!("\\*({name}"),
        _ => format!("\\*[{name}]"),
    }
}

// ── DocumentState ─────────────────────────────────────────────────────────────

/// Shadow record of formatter state.
///
/// Owned exclusively by one [`Lroff`] instance (and thereby by one
/// preprocessor run); never ambient, so independent runs cannot interfere.
#[derive(Debug)]
pub struct DocumentState {
    pub number_registers: HashMap<String, i64>,
    pub string_registers: HashMap<String, String>,

    pub font_family: String,
    pub font_style: String,
    pub point_size: i64,
    pub vert_spacing: i64,

    unique_counter: u64,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            number_registers: HashMap::new(),
            string_registers: HashMap::new(),
            font_family: "T".to_owned(),
            font_style: "R".to_owned(),
            point_size: 10,
            vert_spacing: 12,
            unique_counter: 0,
        }
    }
}

impl DocumentState {
    /// Produce a run-unique identifier with the given prefix.  The counter
    /// is monotonic and never reset within a run.
    pub fn unique_name(&mut self, prefix: &str) -> String {
        self.unique_counter += 1;
        format!("{prefix}{}", self.unique_counter)
    }
}

// ── Lroff ─────────────────────────────────────────────────────────────────────

/// The emission library: a [`DivertStore`] (which owns the main output
/// sink) plus the [`DocumentState`] shadow.
#[derive(Debug, Default)]
pub struct Lroff {
    pub diverts: DivertStore,
    pub state: DocumentState,
}

impl Lroff {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Raw emission ──────────────────────────────────────────────────────────

    pub fn emit(&mut self, text: &str) {
        self.diverts.write(text);
    }

    pub fn emitln(&mut self, text: &str) {
        self.diverts.writeln(text);
    }

    pub fn blank(&mut self) {
        self.diverts.blank_line();
    }

    /// Emit a groff request with no arguments: `.req`.
    pub fn request(&mut self, req: &str) {
        self.diverts.writeln(&format!(".{req}"));
    }

    /// Emit a groff request with arguments: `.req args`.
    pub fn request_with(&mut self, req: &str, args: &str) {
        self.diverts.writeln(&format!(".{req} {args}"));
    }

    /// Emit a groff comment line: `.\" text`.
    pub fn comment(&mut self, text: &str) {
        self.diverts.writeln(&format!(".\\\" {text}"));
    }

    // ── Fonts / sizes ─────────────────────────────────────────────────────────

    pub fn font(&mut self, f: &str) {
        self.state.font_style = f.to_owned();
        self.request_with("ft", f);
    }

    pub fn font_bold(&mut self) {
        self.font("B");
    }

    pub fn font_italic(&mut self) {
        self.font("I");
    }

    pub fn font_roman(&mut self) {
        self.font("R");
    }

    pub fn font_bold_italic(&mut self) {
        self.font("BI");
    }

    /// `.ft` with no argument restores the previous font.
    pub fn font_previous(&mut self) {
        self.request("ft");
    }

    pub fn size(&mut self, pts: i64) {
        self.state.point_size = pts;
        self.request_with("ps", &pts.to_string());
    }

    pub fn size_relative(&mut self, delta: i64) {
        self.state.point_size += delta;
        let arg = if delta >= 0 {
            format!("+{delta}")
        } else {
            delta.to_string()
        };
        self.request_with("ps", &arg);
    }

    // ── Number registers ──────────────────────────────────────────────────────

    pub fn nr_set(&mut self, name: &str, value: i64) {
        self.state.number_registers.insert(name.to_owned(), value);
        self.request_with("nr", &format!("{name} {value}"));
    }

    pub fn nr_incr(&mut self, name: &str, delta: i64) {
        *self.state.number_registers.entry(name.to_owned()).or_insert(0) += delta;
        let sign = if delta >= 0 { "+" } else { "" };
        self.request_with("nr", &format!("{name} {sign}{delta}"));
    }

    /// Shadow value of a number register, if it was ever set through here.
    pub fn nr_get(&self, name: &str) -> Option<i64> {
        self.state.number_registers.get(name).copied()
    }

    // ── String registers ──────────────────────────────────────────────────────

    /// Registers are emitted directly, not routed through [`escape`].
    pub fn ds_set(&mut self, name: &str, value: &str) {
        self.state
            .string_registers
            .insert(name.to_owned(), value.to_owned());
        self.diverts.writeln(&format!(".ds {name} {value}"));
    }

    pub fn ds_get(&self, name: &str) -> Option<&str> {
        self.state.string_registers.get(name).map(String::as_str)
    }

    // ── Diversions ────────────────────────────────────────────────────────────

    pub fn divert_begin(&mut self, name: &str) {
        self.diverts.begin(name);
    }

    pub fn divert_end(&mut self) -> Result<(), DivertError> {
        self.diverts.end()
    }

    /// Replay a diversion's contents into the current output target.
    pub fn divert_emit(&mut self, name: &str) {
        let text = self.diverts.get(name).to_owned();
        self.diverts.write(&text);
    }

    pub fn divert_get(&self, name: &str) -> &str {
        self.diverts.get(name)
    }

    pub fn divert_clear(&mut self, name: &str) {
        self.diverts.clear(name);
    }

    // ── Macros ────────────────────────────────────────────────────────────────

    /// Define a groff macro: `.de name` / body / `..`.
    pub fn macro_define(&mut self, name: &str, body: &str) {
        self.diverts.writeln(&format!(".de {name}"));
        self.diverts.write(body);
        if !body.is_empty() && !body.ends_with('\n') {
            self.diverts.write("\n");
        }
        self.diverts.writeln("..");
    }

    /// Define a groff macro whose body is a Lua block, re-processed when
    /// the preprocessor output is fed back through pplua.
    pub fn macro_define_lua(&mut self, name: &str, code: &str) {
        self.diverts.writeln(&format!(".de {name}"));
        self.diverts.writeln(".lua");
        self.diverts.write(code);
        if !code.is_empty() && !code.ends_with('\n') {
            self.diverts.write("\n");
        }
        self.diverts.writeln(".endlua");
        self.diverts.writeln("..");
    }

    // ── Document structure ────────────────────────────────────────────────────

    pub fn paragraph(&mut self, macro_name: &str) {
        self.request(macro_name);
    }

    pub fn section(&mut self, title: &str) {
        self.diverts.writeln(".SH");
        self.diverts.writeln(title);
    }

    pub fn subsection(&mut self, title: &str) {
        self.diverts.writeln(".SS");
        self.diverts.writeln(title);
    }

    pub fn title(&mut self, t: &str) {
        self.diverts.writeln(".TL");
        self.diverts.writeln(t);
    }

    pub fn author(&mut self, a: &str) {
        self.diverts.writeln(".AU");
        self.diverts.writeln(a);
    }

    pub fn display_begin(&mut self, kind: &str) {
        if kind.is_empty() {
            self.request("DS");
        } else {
            self.request_with("DS", kind);
        }
    }

    pub fn display_end(&mut self) {
        self.request("DE");
    }

    // ── Compound structures ───────────────────────────────────────────────────

    /// Emit a tbl block.
    ///
    /// `global_format`, when non-empty, is the caller-supplied tbl options
    /// line (e.g. `box center;`).  The column format is generated from the
    /// header: every header cell centered bold, every data cell
    /// left-aligned.  Rows are sized to the header; cells beyond the
    /// declared columns are dropped.
    pub fn table(&mut self, headers: &[String], rows: &[Vec<String>], global_format: &str) {
        self.diverts.writeln(".TS");
        if !global_format.is_empty() {
            self.diverts.writeln(global_format);
        }

        let hfmt: Vec<&str> = headers.iter().map(|_| "cb").collect();
        let dfmt: Vec<&str> = headers.iter().map(|_| "l").collect();
        self.diverts.writeln(&hfmt.join(" "));
        self.diverts.writeln(&format!("{}.", dfmt.join(" ")));

        self.diverts.writeln(&headers.join("\t"));
        self.diverts.writeln("_");
        for row in rows {
            let cells: Vec<&str> = row
                .iter()
                .take(headers.len())
                .map(String::as_str)
                .collect();
            self.diverts.writeln(&cells.join("\t"));
        }
        self.diverts.writeln(".TE");
    }

    pub fn bullet_list(&mut self, items: &[String]) {
        for item in items {
            self.diverts.writeln(".IP \\(bu 2");
            self.diverts.writeln(item);
        }
    }

    /// Numbered list with strictly 1-based `<n>.` labels.
    pub fn numbered_list(&mut self, items: &[String]) {
        for (i, item) in items.iter().enumerate() {
            self.diverts.writeln(&format!(".IP {}. 4", i + 1));
            self.diverts.writeln(item);
        }
    }

    pub fn def_list(&mut self, items: &[(String, String)]) {
        for (term, def) in items {
            self.diverts.writeln(".TP");
            self.diverts.writeln(&format!("\\fB{term}\\fP"));
            self.diverts.writeln(def);
        }
    }

    // ── Utility ───────────────────────────────────────────────────────────────

    pub fn unique(&mut self, prefix: &str) -> String {
        self.state.unique_name(prefix)
    }

    pub fn version(&self) -> &'static str {
        PPLUA_VERSION
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn main_text(l: &mut Lroff) -> String {
        l.diverts.take_main()
    }

    // ── escape ────────────────────────────────────────────────────────────────

    #[test]
    fn escape_identity_on_benign_text() {
        assert_eq!(escape("hello world"), "hello world");
        assert_eq!(escape("mid.sentence dots"), "mid.sentence dots");
    }

    #[test]
    fn escape_neutralises_line_start_period() {
        assert_eq!(escape(".b"), "\\&.b");
        assert_eq!(escape("a.b"), "a.b");
        assert_eq!(escape("a\n.b"), "a\n\\&.b");
    }

    #[test]
    fn escape_neutralises_line_start_apostrophe() {
        assert_eq!(escape("'quoted"), "\\&'quoted");
        assert_eq!(escape("it's"), "it's");
    }

    #[test]
    fn escape_doubles_backslash() {
        assert_eq!(escape("\\"), "\\\\");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn escape_backslash_clears_line_start() {
        // The backslash is the first char, so the following period is no
        // longer at line start.
        assert_eq!(escape("\\."), "\\\\.");
    }

    #[test]
    fn escape_newline_rearms_line_start() {
        assert_eq!(escape("x\n.y\n'z"), "x\n\\&.y\n\\&'z");
    }

    // ── inline escapes / references ───────────────────────────────────────────

    #[test]
    fn inline_escape_short_and_bracketed() {
        assert_eq!(inline_escape("f", "B"), "\\fB");
        assert_eq!(inline_escape("f", "CR"), "\\f[CR]");
        assert_eq!(inline_escape("ft", "B"), "\\ft[B]");
    }

    #[test]
    fn styled_short_and_bracketed() {
        assert_eq!(styled("B", "hi"), "\\fBhi\\fP");
        assert_eq!(styled("CR", "code"), "\\f[CR]code\\f[P]");
        assert_eq!(bold("x"), "\\fBx\\fP");
        assert_eq!(italic("x"), "\\fIx\\fP");
        assert_eq!(bold_italic("x"), "\\f[BI]x\\f[P]");
        assert_eq!(mono("x"), "\\f[CR]x\\f[P]");
    }

    #[test]
    fn special_char_forms() {
        assert_eq!(special_char("bu"), "\\(bu");
        assert_eq!(special_char("em"), "\\(em");
        assert_eq!(special_char("rightarrow"), "\\[rightarrow]");
    }

    #[test]
    fn register_reference_forms() {
        assert_eq!(nr_ref("x"), "\\nx");
        assert_eq!(nr_ref("xy"), "\\n(xy");
        assert_eq!(nr_ref("count"), "\\n[count]");
        assert_eq!(ds_ref("s"), "\\*s");
        assert_eq!(ds_ref("st"), "\\*(st");
        assert_eq!(ds_ref("subject"), "\\*[subject]");
    }

    // ── emission primitives ───────────────────────────────────────────────────

    #[test]
    fn request_forms() {
        let mut l = Lroff::new();
        l.request("PP");
        l.request_with("ft", "B");
        l.comment("generated");
        assert_eq!(main_text(&mut l), ".PP\n.ft B\n.\\\" generated\n");
    }

    // ── fonts / sizes ─────────────────────────────────────────────────────────

    #[test]
    fn font_updates_state_and_emits() {
        let mut l = Lroff::new();
        l.font_bold();
        assert_eq!(l.state.font_style, "B");
        l.font_previous();
        assert_eq!(main_text(&mut l), ".ft B\n.ft\n");
    }

    #[test]
    fn size_relative_sign_convention() {
        let mut l = Lroff::new();
        l.size(12);
        l.size_relative(2);
        l.size_relative(-3);
        assert_eq!(l.state.point_size, 11);
        assert_eq!(main_text(&mut l), ".ps 12\n.ps +2\n.ps -3\n");
    }

    // ── registers ─────────────────────────────────────────────────────────────

    #[test]
    fn nr_set_and_incr() {
        let mut l = Lroff::new();
        l.nr_set("PN", 1);
        l.nr_incr("PN", 2);
        l.nr_incr("PN", -1);
        assert_eq!(l.nr_get("PN"), Some(2));
        assert_eq!(main_text(&mut l), ".nr PN 1\n.nr PN +2\n.nr PN -1\n");
    }

    #[test]
    fn nr_incr_on_unset_register_starts_at_zero() {
        let mut l = Lroff::new();
        l.nr_incr("new", 5);
        assert_eq!(l.nr_get("new"), Some(5));
    }

    #[test]
    fn nr_get_unset_is_none() {
        let l = Lroff::new();
        assert_eq!(l.nr_get("missing"), None);
    }

    #[test]
    fn ds_set_emits_unescaped() {
        let mut l = Lroff::new();
        l.ds_set("TI", "A.Title");
        assert_eq!(l.ds_get("TI"), Some("A.Title"));
        assert_eq!(main_text(&mut l), ".ds TI A.Title\n");
    }

    // ── macros ────────────────────────────────────────────────────────────────

    #[test]
    fn macro_define_terminates_body() {
        let mut l = Lroff::new();
        l.macro_define("XX", "body line");
        assert_eq!(main_text(&mut l), ".de XX\nbody line\n..\n");
        // Trailing newline in the body is not doubled.
        l.macro_define("YY", "line\n");
        assert_eq!(main_text(&mut l), ".de YY\nline\n..\n");
    }

    #[test]
    fn macro_define_lua_wraps_in_block_markers() {
        let mut l = Lroff::new();
        l.macro_define_lua("GEN", "lroff.emitln('hi')");
        assert_eq!(
            main_text(&mut l),
            ".de GEN\n.lua\nlroff.emitln('hi')\n.endlua\n..\n"
        );
    }

    // ── document structure ────────────────────────────────────────────────────

    #[test]
    fn structure_helpers() {
        let mut l = Lroff::new();
        l.title("My Doc");
        l.author("Someone");
        l.section("Intro");
        l.subsection("Detail");
        l.paragraph("PP");
        assert_eq!(
            main_text(&mut l),
            ".TL\nMy Doc\n.AU\nSomeone\n.SH\nIntro\n.SS\nDetail\n.PP\n"
        );
    }

    #[test]
    fn display_with_and_without_type() {
        let mut l = Lroff::new();
        l.display_begin("");
        l.display_end();
        l.display_begin("L");
        l.display_end();
        assert_eq!(main_text(&mut l), ".DS\n.DE\n.DS L\n.DE\n");
    }

    // ── compound structures ───────────────────────────────────────────────────

    #[test]
    fn table_two_columns_no_caller_format() {
        let mut l = Lroff::new();
        l.table(
            &["A".into(), "B".into()],
            &[vec!["1".into(), "2".into()]],
            "",
        );
        assert_eq!(
            main_text(&mut l),
            ".TS\ncb cb\nl l.\nA\tB\n_\n1\t2\n.TE\n"
        );
    }

    #[test]
    fn table_with_caller_format_line() {
        let mut l = Lroff::new();
        l.table(&["H".into()], &[], "box center;");
        assert_eq!(main_text(&mut l), ".TS\nbox center;\ncb\nl.\nH\n_\n.TE\n");
    }

    #[test]
    fn table_oversized_rows_truncated_to_header_width() {
        let mut l = Lroff::new();
        l.table(
            &["A".into(), "B".into()],
            &[vec!["1".into(), "2".into(), "3".into()]],
            "",
        );
        // The data format declares two columns; the third cell is dropped.
        assert_eq!(
            main_text(&mut l),
            ".TS\ncb cb\nl l.\nA\tB\n_\n1\t2\n.TE\n"
        );
    }

    #[test]
    fn bullet_list_shape() {
        let mut l = Lroff::new();
        l.bullet_list(&["one".into(), "two".into()]);
        assert_eq!(
            main_text(&mut l),
            ".IP \\(bu 2\none\n.IP \\(bu 2\ntwo\n"
        );
    }

    #[test]
    fn numbered_list_labels_are_one_based() {
        let mut l = Lroff::new();
        l.numbered_list(&["first".into(), "second".into()]);
        assert_eq!(
            main_text(&mut l),
            ".IP 1. 4\nfirst\n.IP 2. 4\nsecond\n"
        );
    }

    #[test]
    fn def_list_shape() {
        let mut l = Lroff::new();
        l.def_list(&[("term".into(), "meaning".into())]);
        assert_eq!(main_text(&mut l), ".TP\n\\fBterm\\fP\nmeaning\n");
    }

    // ── utility ───────────────────────────────────────────────────────────────

    #[test]
    fn unique_names_are_distinct_and_monotonic() {
        let mut l = Lroff::new();
        assert_eq!(l.unique("_lua"), "_lua1");
        assert_eq!(l.unique("_lua"), "_lua2");
        assert_eq!(l.unique("tbl"), "tbl3");
    }

    #[test]
    fn version_string() {
        let l = Lroff::new();
        assert!(l.version().starts_with("pplua "));
    }

    // ── diversion wrappers ────────────────────────────────────────────────────

    #[test]
    fn divert_emit_replays_into_current_target() {
        let mut l = Lroff::new();
        l.divert_begin("toc");
        l.emitln("entry");
        l.divert_end().unwrap();
        l.emitln("before");
        l.divert_emit("toc");
        assert_eq!(main_text(&mut l), "before\nentry\n");
    }

    #[test]
    fn divert_end_error_propagates() {
        let mut l = Lroff::new();
        assert!(l.divert_end().is_err());
    }
}
