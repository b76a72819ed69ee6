use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use pplua::cli::{self, CliArgs};
use pplua::engine::{Config, Preprocessor};
use pplua::lroff::{Lroff, PPLUA_VERSION};
use pplua::LuaEngine;

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("pplua: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    if args.show_help {
        println!("{}", cli::USAGE);
        return;
    }
    if args.show_version {
        println!("{PPLUA_VERSION}");
        return;
    }

    std::process::exit(run(args));
}

fn run(args: CliArgs) -> i32 {
    // ── Shared document state and scripting engine ────────────────────────────
    let lroff = Arc::new(Mutex::new(Lroff::new()));
    let engine = match LuaEngine::new(Arc::clone(&lroff)) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("pplua: cannot initialize Lua: {e}");
            return 1;
        }
    };

    if let Err(e) = engine.extend_package_path(&args.lua_paths) {
        eprintln!("pplua: {e}");
        return 1;
    }

    // ── -D globals, then -l preambles, then -e chunks ─────────────────────────
    for (name, value) in &args.defines {
        if let Err(e) = engine.set_global(name, value) {
            eprintln!("pplua: -D {name}: {e}");
            return 1;
        }
    }

    // Preamble failures are reported but processing continues.
    for path in &args.preambles {
        if let Err(e) = engine.load_file(path) {
            eprintln!("pplua: {}: {e}", path.display());
        }
    }

    // -e code runs before any input; an error here is fatal.
    for (n, chunk) in args.exec_chunks.iter().enumerate() {
        let name = format!("=(command line)[{}]", n + 1);
        if let Err(e) = engine.exec(chunk, &name) {
            eprintln!("pplua: -e: {e}");
            return 1;
        }
    }

    // ── Process inputs ────────────────────────────────────────────────────────
    let cfg = Config {
        emit_lf: !args.no_line_sync,
        ..Config::default()
    };
    let mut pp = Preprocessor::new(cfg, lroff, engine);
    let mut rc = 0;

    let inputs = if args.inputs.is_empty() {
        vec!["-".to_owned()]
    } else {
        args.inputs
    };

    for input in &inputs {
        let result = if input == "-" {
            let stdin = io::stdin();
            pp.process(BufReader::new(stdin.lock()), "<stdin>")
        } else {
            pp.process_file(Path::new(input))
        };
        if let Err(e) = result {
            eprintln!("pplua: {e}");
            rc = 1;
        }
    }

    // Flush whatever was produced, even after a failed input.
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = pp.flush(&mut out) {
        eprintln!("pplua: write error: {e}");
        rc = 1;
    }
    if let Err(e) = out.flush() {
        eprintln!("pplua: write error: {e}");
        rc = 1;
    }

    rc
}
