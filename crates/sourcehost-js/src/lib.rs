//! A minimal sandboxed JavaScript expression evaluator.
//!
//! Plugins embed small scraper helper snippets (e.g. a one-liner extracted
//! from an inline `<script>` tag) that need to be evaluated against a handful
//! of string-keyed variables. This crate provides exactly that and nothing
//! more: no file system, no network, no access to plugin linear memory. The
//! QuickJS runtime underneath never has those capabilities registered, so
//! there is nothing for a hostile snippet to reach for.

use std::collections::HashMap;

use rquickjs::{Context, Runtime};
use thiserror::Error;

/// Errors raised by the JS evaluator.
#[derive(Debug, Error)]
pub enum JsError {
    /// The evaluated expression produced no usable result.
    #[error("script produced no result")]
    MissingResult,
    /// The context handle did not resolve to a live sandbox.
    #[error("invalid JS context")]
    InvalidContext,
    /// A string passed across the boundary was not valid UTF-8 or was empty
    /// when a non-empty value was required.
    #[error("invalid string")]
    InvalidString,
    /// The underlying QuickJS runtime reported an error (syntax or
    /// exception during evaluation).
    #[error("script evaluation failed: {0}")]
    Eval(String),
}

impl From<JsError> for i32 {
    fn from(err: JsError) -> i32 {
        match err {
            JsError::MissingResult => -1,
            JsError::InvalidContext => -2,
            JsError::InvalidString => -3,
            JsError::Eval(_) => -1,
        }
    }
}

/// A single sandboxed evaluation context.
///
/// Each context owns its own QuickJS runtime so one plugin's misbehaving
/// script can never see another context's variables.
pub struct JsContext {
    runtime: Runtime,
    context: Context,
    vars: HashMap<String, String>,
}

impl JsContext {
    /// Create a fresh, empty sandbox.
    pub fn new() -> Result<Self, JsError> {
        let runtime = Runtime::new().map_err(|e| JsError::Eval(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| JsError::Eval(e.to_string()))?;
        Ok(Self {
            runtime,
            context,
            vars: HashMap::new(),
        })
    }

    /// Set a string-keyed variable visible to subsequent `eval` calls.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Read back a previously set variable without re-evaluating anything.
    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    /// Evaluate `src` in the context of the current variables and return the
    /// result as a string (objects/arrays are JSON-stringified, matching
    /// how the embedding host treats any non-primitive return value).
    pub fn eval(&mut self, src: &str) -> Result<String, JsError> {
        if src.trim().is_empty() {
            return Err(JsError::InvalidString);
        }

        self.context.with(|ctx| {
            let globals = ctx.globals();
            for (name, value) in &self.vars {
                globals
                    .set(name.as_str(), value.as_str())
                    .map_err(|e| JsError::Eval(e.to_string()))?;
            }

            // Wrap the source so a bare expression ("a + b") and a full
            // statement both produce a value: `(expr)` fails to parse for
            // multi-statement snippets, so fall back to a wrapping IIFE that
            // evaluates the last expression via `eval`.
            let wrapped = format!("(function(){{ return eval({:?}); }})()", src);
            let value: rquickjs::Value = ctx
                .eval(wrapped.as_bytes())
                .map_err(|e| JsError::Eval(e.to_string()))?;

            stringify(&ctx, value)
        })
    }

    /// Drop any fuel/time accounting and free interpreter state. Exposed so
    /// the host's resource-table `destroy` import can eagerly release a
    /// context instead of waiting on `Drop`.
    pub fn close(self) {
        drop(self.context);
        drop(self.runtime);
    }
}

impl Default for JsContext {
    fn default() -> Self {
        // SAFETY net: `new` only fails if the platform can't allocate a
        // QuickJS heap at all, which is not a condition callers can sanely
        // recover from inline either. Prefer the fallible constructor.
        Self::new().expect("failed to allocate QuickJS runtime")
    }
}

fn stringify(ctx: &rquickjs::Ctx<'_>, value: rquickjs::Value) -> Result<String, JsError> {
    if value.is_undefined() || value.is_null() {
        return Ok(String::new());
    }
    if let Some(s) = value.as_string() {
        return s.to_string().map_err(|e| JsError::Eval(e.to_string()));
    }
    if let Some(b) = value.as_bool() {
        return Ok(b.to_string());
    }
    if let Some(n) = value.as_float() {
        return Ok(format_number(n));
    }

    // Objects and arrays: JSON.stringify via the global.
    let json: rquickjs::Object = ctx
        .globals()
        .get("JSON")
        .map_err(|e| JsError::Eval(e.to_string()))?;
    let stringify_fn: rquickjs::Function = json
        .get("stringify")
        .map_err(|e| JsError::Eval(e.to_string()))?;
    let result: rquickjs::Value = stringify_fn
        .call((value,))
        .map_err(|e| JsError::Eval(e.to_string()))?;
    result
        .as_string()
        .ok_or(JsError::MissingResult)?
        .to_string()
        .map_err(|e| JsError::Eval(e.to_string()))
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
