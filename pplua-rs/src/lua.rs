//! Lua 5.4 scripting via the `mlua` crate, behind the `lua` Cargo feature.
//!
//! # The `lroff` table
//!
//! Every Lua state gets an `lroff` table pre-registered.  Its functions are
//! the only mutation points for the document state and the diversion store:
//!
//! | Group      | Functions                                                        |
//! |------------|------------------------------------------------------------------|
//! | output     | `emit`, `emitln`, `blank`, `request`, `request_with`, `comment`  |
//! | escaping   | `escape`, `inline_escape`                                        |
//! | fonts      | `font`, `font_bold`, `font_italic`, `font_roman`, `font_bold_italic`, `font_previous` |
//! | sizes      | `size`, `size_relative`, `with_size`                             |
//! | registers  | `nr_set`, `nr_incr`, `nr_get`, `nr_ref`, `ds_set`, `ds_get`, `ds_ref` |
//! | diversions | `divert_begin`, `divert_end`, `divert_emit`, `divert_get`, `divert_clear` |
//! | macros     | `macro_define`, `macro_define_lua`                               |
//! | styling    | `styled`, `bold`, `italic`, `bold_italic`, `mono`, `special_char` |
//! | structure  | `paragraph`, `section`, `subsection`, `title`, `author`, `display_begin`, `display_end` |
//! | compound   | `table`, `bullet_list`, `numbered_list`, `def_list`              |
//! | utility    | `unique`, `version`, `_VERSION`                                  |
//!
//! A handful of pure-Lua convenience wrappers (`printf`, `with_font`,
//! `indented`, …) are defined on top of the bindings.

#[cfg(feature = "lua")]
pub use lua_impl::LuaEngine;

#[cfg(feature = "lua")]
mod lua_impl {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use mlua::prelude::*;

    use crate::eval::{EvalError, Evaluator, Value};
    use crate::lroff::{self, Lroff};

    // ── LuaEngine ─────────────────────────────────────────────────────────────

    /// A Lua 5.4 interpreter with the `lroff` library pre-registered.
    ///
    /// The engine shares the [`Lroff`] instance with the preprocessor that
    /// drives it: binding closures capture an `Arc<Mutex<Lroff>>`, so text
    /// emitted from scripted code lands in the same diversion store the
    /// scanner writes through.
    pub struct LuaEngine {
        lua: Lua,
    }

    impl LuaEngine {
        /// Create a new interpreter and register the `lroff` table.
        pub fn new(lroff: Arc<Mutex<Lroff>>) -> LuaResult<Self> {
            let lua = Lua::new();
            register_lroff(&lua, lroff)?;
            Ok(Self { lua })
        }

        /// Append search patterns (e.g. `dir/?.lua`) to `package.path`.
        pub fn extend_package_path(&self, patterns: &[String]) -> LuaResult<()> {
            if patterns.is_empty() {
                return Ok(());
            }
            let package: LuaTable = self.lua.globals().get("package")?;
            let mut path: String = package.get("path")?;
            for p in patterns {
                path.push(';');
                path.push_str(p);
            }
            package.set("path", path)
        }

        /// Set a global string variable (the `-D NAME=VALUE` surface).
        pub fn set_global(&self, name: &str, value: &str) -> LuaResult<()> {
            self.lua.globals().set(name, value)
        }

        /// Load and execute a Lua preamble file (the `-l FILE` surface).
        pub fn load_file(&self, path: &Path) -> LuaResult<()> {
            self.lua.load(path).exec()
        }

        /// Execute an arbitrary chunk under the given name (the `-e CODE`
        /// surface).
        pub fn exec(&self, chunk: &str, name: &str) -> LuaResult<()> {
            self.lua.load(chunk).set_name(name).exec()
        }
    }

    impl Evaluator for LuaEngine {
        fn execute(&mut self, source: &str, chunk_name: &str) -> Result<Value, EvalError> {
            let result = self
                .lua
                .load(source)
                .set_name(chunk_name)
                .eval::<LuaValue>();
            match result {
                Ok(LuaValue::String(s)) => {
                    let text = s
                        .to_str()
                        .map_err(|e| EvalError::new(e.to_string()))?
                        .to_owned();
                    Ok(Value::Text(text))
                }
                Ok(LuaValue::Integer(i)) => Ok(Value::Number(i as f64)),
                Ok(LuaValue::Number(x)) => Ok(Value::Number(x)),
                Ok(_) => Ok(Value::Nothing),
                Err(e) => Err(EvalError::new(e.to_string())),
            }
        }
    }

    // ── lroff registration ────────────────────────────────────────────────────

    fn register_lroff(lua: &Lua, lroff: Arc<Mutex<Lroff>>) -> LuaResult<()> {
        let t = lua.create_table()?;

        t.set("_VERSION", lroff::PPLUA_VERSION)?;

        // ---- output ----
        {
            let l = Arc::clone(&lroff);
            t.set("emit", lua.create_function(move |_, text: String| {
                l.lock().unwrap().emit(&text);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("emitln", lua.create_function(move |_, text: String| {
                l.lock().unwrap().emitln(&text);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("blank", lua.create_function(move |_, ()| {
                l.lock().unwrap().blank();
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("request", lua.create_function(move |_, req: String| {
                l.lock().unwrap().request(&req);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("request_with", lua.create_function(move |_, (req, args): (String, String)| {
                l.lock().unwrap().request_with(&req, &args);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("comment", lua.create_function(move |_, text: String| {
                l.lock().unwrap().comment(&text);
                Ok(())
            })?)?;
        }

        // ---- escaping (pure transforms, no state) ----
        t.set("escape", lua.create_function(|_, text: String| {
            Ok(lroff::escape(&text))
        })?)?;
        t.set("inline_escape", lua.create_function(|_, (code, arg): (String, String)| {
            Ok(lroff::inline_escape(&code, &arg))
        })?)?;

        // ---- fonts / sizes ----
        {
            let l = Arc::clone(&lroff);
            t.set("font", lua.create_function(move |_, f: String| {
                l.lock().unwrap().font(&f);
                Ok(())
            })?)?;
        }
        for (name, code) in [
            ("font_bold", "B"),
            ("font_italic", "I"),
            ("font_roman", "R"),
            ("font_bold_italic", "BI"),
        ] {
            let l = Arc::clone(&lroff);
            t.set(name, lua.create_function(move |_, ()| {
                l.lock().unwrap().font(code);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("font_previous", lua.create_function(move |_, ()| {
                l.lock().unwrap().font_previous();
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("size", lua.create_function(move |_, pts: i64| {
                l.lock().unwrap().size(pts);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("size_relative", lua.create_function(move |_, delta: i64| {
                l.lock().unwrap().size_relative(delta);
                Ok(())
            })?)?;
        }
        {
            // Scoped size change.  Native rather than pure Lua because the
            // previous size lives in the shadow state; the lock is released
            // before the callback runs, which re-enters other bindings.
            let l = Arc::clone(&lroff);
            t.set("with_size", lua.create_function(move |_, (pts, f): (i64, LuaFunction)| {
                let prev = {
                    let mut guard = l.lock().unwrap();
                    let prev = guard.state.point_size;
                    guard.size(pts);
                    prev
                };
                let result = f.call::<()>(());
                l.lock().unwrap().size(prev);
                result
            })?)?;
        }

        // ---- number registers ----
        {
            let l = Arc::clone(&lroff);
            t.set("nr_set", lua.create_function(move |_, (name, value): (String, i64)| {
                l.lock().unwrap().nr_set(&name, value);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("nr_incr", lua.create_function(move |_, (name, delta): (String, i64)| {
                l.lock().unwrap().nr_incr(&name, delta);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("nr_get", lua.create_function(move |_, name: String| {
                Ok(l.lock().unwrap().nr_get(&name))
            })?)?;
        }
        t.set("nr_ref", lua.create_function(|_, name: String| {
            Ok(lroff::nr_ref(&name))
        })?)?;

        // ---- string registers ----
        {
            let l = Arc::clone(&lroff);
            t.set("ds_set", lua.create_function(move |_, (name, value): (String, String)| {
                l.lock().unwrap().ds_set(&name, &value);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("ds_get", lua.create_function(move |_, name: String| {
                Ok(l.lock().unwrap().ds_get(&name).map(str::to_owned))
            })?)?;
        }
        t.set("ds_ref", lua.create_function(|_, name: String| {
            Ok(lroff::ds_ref(&name))
        })?)?;

        // ---- diversions ----
        {
            let l = Arc::clone(&lroff);
            t.set("divert_begin", lua.create_function(move |_, name: String| {
                l.lock().unwrap().divert_begin(&name);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("divert_end", lua.create_function(move |_, ()| {
                l.lock()
                    .unwrap()
                    .divert_end()
                    .map_err(|e| LuaError::RuntimeError(format!("lroff.{e}")))
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("divert_emit", lua.create_function(move |_, name: String| {
                l.lock().unwrap().divert_emit(&name);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("divert_get", lua.create_function(move |_, name: String| {
                Ok(l.lock().unwrap().divert_get(&name).to_owned())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("divert_clear", lua.create_function(move |_, name: String| {
                l.lock().unwrap().divert_clear(&name);
                Ok(())
            })?)?;
        }

        // ---- macros ----
        {
            let l = Arc::clone(&lroff);
            t.set("macro_define", lua.create_function(move |_, (name, body): (String, String)| {
                l.lock().unwrap().macro_define(&name, &body);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("macro_define_lua", lua.create_function(move |_, (name, code): (String, String)| {
                l.lock().unwrap().macro_define_lua(&name, &code);
                Ok(())
            })?)?;
        }

        // ---- inline styling (return strings, never emit) ----
        t.set("styled", lua.create_function(|_, (code, text): (String, String)| {
            Ok(lroff::styled(&code, &text))
        })?)?;
        t.set("bold", lua.create_function(|_, text: String| Ok(lroff::bold(&text)))?)?;
        t.set("italic", lua.create_function(|_, text: String| Ok(lroff::italic(&text)))?)?;
        t.set("bold_italic", lua.create_function(|_, text: String| {
            Ok(lroff::bold_italic(&text))
        })?)?;
        t.set("mono", lua.create_function(|_, text: String| Ok(lroff::mono(&text)))?)?;
        t.set("special_char", lua.create_function(|_, name: String| {
            Ok(lroff::special_char(&name))
        })?)?;

        // ---- document structure ----
        {
            let l = Arc::clone(&lroff);
            t.set("paragraph", lua.create_function(move |_, m: Option<String>| {
                l.lock().unwrap().paragraph(m.as_deref().unwrap_or("PP"));
                Ok(())
            })?)?;
        }
        for (name, emit) in [
            ("section", Lroff::section as fn(&mut Lroff, &str)),
            ("subsection", Lroff::subsection),
            ("title", Lroff::title),
            ("author", Lroff::author),
        ] {
            let l = Arc::clone(&lroff);
            t.set(name, lua.create_function(move |_, text: String| {
                emit(&mut l.lock().unwrap(), &text);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("display_begin", lua.create_function(move |_, kind: Option<String>| {
                l.lock().unwrap().display_begin(kind.as_deref().unwrap_or(""));
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("display_end", lua.create_function(move |_, ()| {
                l.lock().unwrap().display_end();
                Ok(())
            })?)?;
        }

        // ---- compound structures ----
        {
            let l = Arc::clone(&lroff);
            t.set(
                "table",
                lua.create_function(
                    move |_, (hdr, rows, fmt): (Vec<String>, Vec<Vec<String>>, Option<String>)| {
                        l.lock().unwrap().table(&hdr, &rows, fmt.as_deref().unwrap_or(""));
                        Ok(())
                    },
                )?,
            )?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("bullet_list", lua.create_function(move |_, items: Vec<String>| {
                l.lock().unwrap().bullet_list(&items);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("numbered_list", lua.create_function(move |_, items: Vec<String>| {
                l.lock().unwrap().numbered_list(&items);
                Ok(())
            })?)?;
        }
        {
            let l = Arc::clone(&lroff);
            t.set("def_list", lua.create_function(move |_, items: Vec<Vec<String>>| {
                let pairs: Vec<(String, String)> = items
                    .into_iter()
                    .map(|mut pair| {
                        let term = if pair.is_empty() { String::new() } else { pair.remove(0) };
                        let def = pair.into_iter().next().unwrap_or_default();
                        (term, def)
                    })
                    .collect();
                l.lock().unwrap().def_list(&pairs);
                Ok(())
            })?)?;
        }

        // ---- utility ----
        {
            let l = Arc::clone(&lroff);
            t.set("unique", lua.create_function(move |_, prefix: Option<String>| {
                Ok(l.lock().unwrap().unique(prefix.as_deref().unwrap_or("_lua")))
            })?)?;
        }
        t.set("version", lua.create_function(|_, ()| Ok(lroff::PPLUA_VERSION))?)?;

        lua.globals().set("lroff", t)?;

        // ---- pure-Lua convenience wrappers ----
        lua.load(
            r#"
            -- formatted emit (string.format semantics)
            function lroff.printf(fmt, ...)
                lroff.emit(string.format(fmt, ...))
            end

            function lroff.printfln(fmt, ...)
                lroff.emitln(string.format(fmt, ...))
            end

            -- apply fn(v) to every element; emit non-nil returns
            function lroff.map(tbl, fn)
                for _, v in ipairs(tbl) do
                    local r = fn(v)
                    if r ~= nil then lroff.emitln(tostring(r)) end
                end
            end

            -- call fn(k, v) for each pair (no output)
            function lroff.foreach(tbl, fn)
                for k, v in pairs(tbl) do fn(k, v) end
            end

            -- scoped font change
            function lroff.with_font(f, fn)
                lroff.font(f); fn(); lroff.font_previous()
            end

            -- emit a groff conditional:  .if cond \{ body \}
            function lroff.groff_if(cond, body)
                lroff.emitln(".if " .. cond .. " \\{")
                lroff.emitln(body)
                lroff.emitln(".\\}")
            end

            -- emit a groff .while loop
            function lroff.groff_while(cond, body)
                lroff.emitln(".while " .. cond .. " \\{")
                lroff.emitln(body)
                lroff.emitln(".\\}")
            end

            -- join values with a separator after tostring-ing each
            function lroff.concat(tbl, sep)
                sep = sep or ""
                local parts = {}
                for _, v in ipairs(tbl) do parts[#parts+1] = tostring(v) end
                return table.concat(parts, sep)
            end

            -- indented block: .RS / body / .RE
            function lroff.indented(fn)
                lroff.request("RS")
                fn()
                lroff.request("RE")
            end
            "#,
        )
        .set_name("=lroff-stdlib")
        .exec()?;

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
