//! Command-line argument parsing.
//!
//! Usage:
//!   pplua [-n] [-e <code>] [-l <file>] [-I <dir>] [-D <name>[=<value>]] [<file>...]
//!
//! With no input files (or a `-` file) the document is read from stdin.

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Lua chunks to execute before processing (`-e <code>`, repeatable,
    /// errors are fatal).
    pub exec_chunks: Vec<String>,
    /// Lua preamble files to load before processing (`-l <file>`,
    /// repeatable, errors are reported but not fatal).
    pub preambles: Vec<PathBuf>,
    /// Extra `package.path` patterns derived from `-I <dir>`.
    pub lua_paths: Vec<String>,
    /// Global string definitions (`-D <name>[=<value>]`, bare name means "1").
    pub defines: Vec<(String, String)>,
    /// Suppress `.lf` line-sync directives (`-n`).
    pub no_line_sync: bool,
    /// Print version and exit (`-V` / `--version`).
    pub show_version: bool,
    /// Print usage and exit (`-h` / `--help`).
    pub show_help: bool,
    /// Input documents in order; `-` means stdin.
    pub inputs: Vec<String>,
}

/// Usage text for `-h`.
pub const USAGE: &str = "\
usage: pplua [options] [file ...]
  -e <code>           execute Lua code before processing (fatal on error)
  -l <file>           load a Lua preamble file before processing
  -I <dir>            add <dir> to the Lua module search path
  -D <name>[=<value>] define a global Lua string (default value: 1)
  -n                  do not emit .lf line-sync directives
  -V, --version       print version and exit
  -h, --help          print this help and exit
With no file arguments (or a `-' argument) the document is read from stdin.";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            args.inputs.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument (`-` alone is the stdin placeholder).
        if !arg.starts_with('-') || arg == "-" {
            args.inputs.push(arg.to_owned());
            i += 1;
            continue;
        }

        match arg {
            "--version" => {
                args.show_version = true;
                i += 1;
                continue;
            }
            "--help" => {
                args.show_help = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'n' => args.no_line_sync = true,
                'V' => args.show_version = true,
                'h' => args.show_help = true,

                // -e <code> / -e<code>
                'e' => {
                    let code = take_value(&chars, &mut j, argv, &mut i, "-e", "a code")?;
                    args.exec_chunks.push(code);
                }

                // -l <file> / -l<file>
                'l' => {
                    let file = take_value(&chars, &mut j, argv, &mut i, "-l", "a file")?;
                    args.preambles.push(PathBuf::from(file));
                }

                // -I <dir> / -I<dir>: expand to require() search patterns.
                'I' => {
                    let dir = take_value(&chars, &mut j, argv, &mut i, "-I", "a directory")?;
                    let dir = dir.trim_end_matches('/');
                    args.lua_paths.push(format!("{dir}/?.lua"));
                    args.lua_paths.push(format!("{dir}/?/init.lua"));
                }

                // -D <name>[=<value>] / -D<name>[=<value>]
                'D' => {
                    let def = take_value(&chars, &mut j, argv, &mut i, "-D", "a name")?;
                    let (name, value) = match def.split_once('=') {
                        Some((n, v)) => (n.to_owned(), v.to_owned()),
                        None => (def, "1".to_owned()),
                    };
                    if name.is_empty() {
                        return Err("-D requires a non-empty name".to_owned());
                    }
                    args.defines.push((name, value));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

/// Consume a flag value, embedded (`-e<code>`) or separate (`-e <code>`).
fn take_value(
    chars: &[char],
    j: &mut usize,
    argv: &[String],
    i: &mut usize,
    flag: &str,
    what: &str,
) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len(); // consumed rest of this arg
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(format!("{flag} requires {what} argument"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
