//! Output buffering and diversions.
//!
//! All groff text produced by the preprocessor — passthrough lines, block
//! results, and everything the `lroff` library emits — flows through a
//! [`DivertStore`].  When no diversion is active, text lands in the main
//! [`OutputSink`]; `divert_begin("name")` redirects writes into the named
//! buffer until the matching `divert_end()`.  Diversion buffers persist for
//! the whole run, so scripted code can fill one early and replay it later.

use std::collections::HashMap;
use std::fmt;

// ── OutputSink ────────────────────────────────────────────────────────────────

/// Linear accumulator for generated groff source.  Append-only until
/// [`OutputSink::take`] or [`OutputSink::clear`].
#[derive(Debug, Default)]
pub struct OutputSink {
    buf: String,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text (no trailing newline).
    pub fn write(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Append raw text followed by exactly one newline.
    pub fn writeln(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    /// Append a bare newline (blank line = paragraph break in groff).
    pub fn blank_line(&mut self) {
        self.buf.push('\n');
    }

    /// Everything accumulated so far.
    pub fn contents(&self) -> &str {
        &self.buf
    }

    /// Take the accumulated text, leaving the sink empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    /// Discard all accumulated text.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

// ── DivertError ───────────────────────────────────────────────────────────────

/// Protocol violation in the diversion stack.
#[derive(Debug, PartialEq, Eq)]
pub enum DivertError {
    /// `end()` was called with no diversion active.
    NoActiveDiversion,
}

impl fmt::Display for DivertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivertError::NoActiveDiversion => {
                write!(f, "divert_end: no diversion is active")
            }
        }
    }
}

impl std::error::Error for DivertError {}

// ── DivertStore ───────────────────────────────────────────────────────────────

/// Named diversion buffers plus the LIFO stack of active names.
///
/// The store owns the main [`OutputSink`]; the buffers live in a name→text
/// map and the stack holds names only, so there is no ownership cycle
/// between the two.  The same name may appear on the stack more than once
/// (re-entrant diversion); writes always target the current top.
#[derive(Debug, Default)]
pub struct DivertStore {
    main: OutputSink,
    bufs: HashMap<String, String>,
    stack: Vec<String>,
}

impl DivertStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Stack operations ──────────────────────────────────────────────────────

    /// Activate the named diversion.  A buffer is created on first use;
    /// re-opening an existing name appends to its previous contents.
    pub fn begin(&mut self, name: &str) {
        self.stack.push(name.to_owned());
        self.bufs.entry(name.to_owned()).or_default();
    }

    /// Deactivate the most recently begun diversion.
    ///
    /// Fails without touching any buffer if the stack is already empty;
    /// the error must reach the caller (scripted code sees it as a runtime
    /// error in its own chunk).
    pub fn end(&mut self) -> Result<(), DivertError> {
        if self.stack.pop().is_none() {
            return Err(DivertError::NoActiveDiversion);
        }
        Ok(())
    }

    // ── Writing (routed to the current target) ────────────────────────────────

    pub fn write(&mut self, text: &str) {
        match self.current_buf() {
            Some(buf) => buf.push_str(text),
            None => self.main.write(text),
        }
    }

    pub fn writeln(&mut self, text: &str) {
        match self.current_buf() {
            Some(buf) => {
                buf.push_str(text);
                buf.push('\n');
            }
            None => self.main.writeln(text),
        }
    }

    pub fn blank_line(&mut self) {
        match self.current_buf() {
            Some(buf) => buf.push('\n'),
            None => self.main.blank_line(),
        }
    }

    /// Buffer named by the top of the stack, re-created if it was erased
    /// while still active.
    fn current_buf(&mut self) -> Option<&mut String> {
        let name = self.stack.last()?;
        Some(self.bufs.entry(name.clone()).or_default())
    }

    // ── Query / retrieve ──────────────────────────────────────────────────────

    /// The full text of the named buffer; empty for unknown names.
    pub fn get(&self, name: &str) -> &str {
        self.bufs.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.bufs.contains_key(name)
    }

    /// Empty the named buffer in place; no-op if it does not exist.
    pub fn clear(&mut self, name: &str) {
        if let Some(buf) = self.bufs.get_mut(name) {
            buf.clear();
        }
    }

    /// Remove the named buffer entirely.  A later `begin` with the same
    /// name starts fresh.
    pub fn erase(&mut self, name: &str) {
        self.bufs.remove(name);
    }

    pub fn is_diverting(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Name of the diversion currently receiving writes, if any.
    pub fn current_name(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    // ── Main sink access ──────────────────────────────────────────────────────

    pub fn main(&self) -> &OutputSink {
        &self.main
    }

    /// Take the main sink's accumulated text (used by flush).
    pub fn take_main(&mut self) -> String {
        self.main.take()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
