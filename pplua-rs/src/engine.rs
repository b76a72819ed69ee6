//! The preprocessor engine: block scanning, inline expansion, and output
//! assembly.
//!
//! [`Preprocessor::process`] consumes one input stream line by line with a
//! two-state machine:
//!
//! | State     | Line                     | Action                                   |
//! |-----------|--------------------------|------------------------------------------|
//! | outside   | `.lua` marker            | enter block (same-line source allowed)   |
//! | outside   | anything else            | inline-expand, write through diversions  |
//! | in block  | `.endlua` marker         | evaluate accumulated source, emit `.lf`  |
//! | in block  | anything else            | accumulate as script source              |
//!
//! Evaluation happens through the [`Evaluator`] capability; the engine never
//! sees a Lua state.  All output is routed through the shared [`Lroff`]
//! library so that scripted diversions also capture ordinary markup lines.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::eval::Evaluator;
use crate::expand::expand_inline;
use crate::lroff::Lroff;

// ── Config ────────────────────────────────────────────────────────────────────

/// Preprocessor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Block-open marker, matched at line start (request style).
    pub block_open: String,
    /// Block-close marker, matched at line start.
    pub block_close: String,
    /// Inline-expression open delimiter (a short literal string).
    pub inline_open: String,
    /// Inline-expression close character.
    pub inline_close: char,
    /// Emit `.lf` line-accounting directives so downstream error messages
    /// refer to original source lines.
    pub emit_lf: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_open: ".lua".to_owned(),
            block_close: ".endlua".to_owned(),
            inline_open: "\\lua'".to_owned(),
            inline_close: '\'',
            emit_lf: true,
        }
    }
}

// ── PreprocessError ───────────────────────────────────────────────────────────

/// Failure that affects the run's overall result.
///
/// Everything else (evaluation errors, unterminated inline spans) is a
/// diagnostic: reported to stderr, after which scanning continues.
#[derive(Debug)]
pub enum PreprocessError {
    /// The stream ended while still inside a script block.
    UnterminatedBlock { file: String, line: usize },
    /// A named input could not be opened or read.
    Io { path: String, source: io::Error },
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessError::UnterminatedBlock { file, line } => {
                write!(f, "{file}:{line}: unterminated .lua block")
            }
            PreprocessError::Io { path, source } => {
                write!(f, "cannot read '{path}': {source}")
            }
        }
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreprocessError::Io { source, .. } => Some(source),
            PreprocessError::UnterminatedBlock { .. } => None,
        }
    }
}

// ── Marker matching ───────────────────────────────────────────────────────────

/// Test a line against a block marker.
///
/// Leading horizontal whitespace is stripped; the line matches if the
/// remainder equals the marker, or begins with the marker followed by a
/// space or tab.  On a match, returns the trailer after the marker and one
/// separator (empty when the marker stands alone).
fn marker_match<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let trimmed = line.trim_start_matches([' ', '\t']);
    let rest = trimmed.strip_prefix(marker)?;
    if rest.is_empty() {
        return Some("");
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some(' ' | '\t') => Some(chars.as_str()),
        _ => None,
    }
}

// ── Preprocessor ──────────────────────────────────────────────────────────────

/// One preprocessing run: owns the evaluator and (jointly with the
/// evaluator's callbacks) the [`Lroff`] library.
///
/// The `Arc<Mutex<…>>` exists only so script-engine callbacks can reach the
/// same library instance; a run is strictly single-threaded and the lock is
/// never contended.
pub struct Preprocessor<E: Evaluator> {
    cfg: Config,
    lroff: Arc<Mutex<Lroff>>,
    eval: E,
}

impl<E: Evaluator> Preprocessor<E> {
    pub fn new(cfg: Config, lroff: Arc<Mutex<Lroff>>, eval: E) -> Self {
        Self { cfg, lroff, eval }
    }

    /// Process a single input stream.  `filename` labels `.lf` directives,
    /// chunk names, and diagnostics.
    ///
    /// On an unterminated block the error is returned, but everything
    /// produced before the block opened is still retrievable via
    /// [`Preprocessor::flush`].
    pub fn process<R: BufRead>(&mut self, input: R, filename: &str) -> Result<(), PreprocessError> {
        let mut in_block = false;
        let mut block_start = 0usize;
        let mut block_buf = String::new();
        let mut lineno = 0usize;

        for line in input.lines() {
            let line = line.map_err(|e| PreprocessError::Io {
                path: filename.to_owned(),
                source: e,
            })?;
            lineno += 1;

            if in_block {
                if marker_match(&line, &self.cfg.block_close).is_some() {
                    in_block = false;
                    let code = std::mem::take(&mut block_buf);
                    self.exec_chunk(&code, filename, block_start);
                    self.emit_lf(lineno + 1, filename);
                } else {
                    block_buf.push_str(&line);
                    block_buf.push('\n');
                }
                continue;
            }

            if let Some(trailer) = marker_match(&line, &self.cfg.block_open) {
                in_block = true;
                block_start = lineno + 1;

                if !trailer.is_empty() {
                    // One-liner convenience: source on the marker line, and
                    // possibly the close marker too.
                    if let Some(close_at) = trailer.find(&self.cfg.block_close) {
                        let code = &trailer[..close_at];
                        self.exec_chunk(code, filename, lineno);
                        in_block = false;
                        self.emit_lf(lineno + 1, filename);
                    } else {
                        block_buf.push_str(trailer);
                        block_buf.push('\n');
                    }
                }
                continue;
            }

            // Ordinary markup: expand inline expressions, then pass through.
            let expanded = expand_inline(&line, &self.cfg, &mut self.eval, filename, lineno);
            self.lroff.lock().unwrap().diverts.writeln(&expanded);
        }

        if in_block {
            return Err(PreprocessError::UnterminatedBlock {
                file: filename.to_owned(),
                line: block_start,
            });
        }
        Ok(())
    }

    /// Process a named file.
    pub fn process_file(&mut self, path: &Path) -> Result<(), PreprocessError> {
        let file = File::open(path).map_err(|e| PreprocessError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        self.process(BufReader::new(file), &path.display().to_string())
    }

    /// Write all accumulated output to `out`, emptying the sink.
    pub fn flush<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let text = self.lroff.lock().unwrap().diverts.take_main();
        out.write_all(text.as_bytes())
    }

    /// Shared handle to the emission library (for inspection in tests and
    /// for engine wiring).
    pub fn lroff(&self) -> Arc<Mutex<Lroff>> {
        Arc::clone(&self.lroff)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Run one script chunk and route its result value.
    fn exec_chunk(&mut self, code: &str, file: &str, line: usize) {
        let chunk_name = format!("@{file}:{line}");
        match self.eval.execute(code, &chunk_name) {
            Ok(value) => {
                // Text verbatim, numbers as canonical decimal, the rest
                // silently discarded.
                if let Some(text) = value.render() {
                    self.lroff.lock().unwrap().diverts.write(&text);
                }
            }
            Err(e) => {
                eprintln!("pplua: {file}:{line}: lua error: {e}");
            }
        }
    }

    /// Keep the downstream formatter's line counter in sync.
    fn emit_lf(&mut self, line: usize, file: &str) {
        if self.cfg.emit_lf {
            self.lroff
                .lock()
                .unwrap()
                .diverts
                .writeln(&format!(".lf {line} {file}"));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
