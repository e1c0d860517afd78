//! Capability-limited evaluator for the challenge expressions the service
//! hands out.
//!
//! The challenge is a small JavaScript function expression plus an argument.
//! Rather than embedding a browser engine, the crate ships an interpreter for
//! the subset of the language those expressions use: literals, closures,
//! control flow, and the `Math`/`String`/`Array`/`Object`/`JSON` builtins.
//! There is no I/O, no timers, no module loading and no access to the host;
//! the only inputs are the expression text and the [`Bindings`] supplied by
//! the caller.
//!
//! Every evaluation runs on a fresh global environment and is bounded by a
//! [`SandboxLimits`] budget (interpreted steps, call depth, syntax nesting
//! counting every link of an operator or call chain,
//! string and array sizes), so a hostile challenge fails with
//! [`SandboxError::LimitExceeded`] instead of hanging the caller.

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

#[cfg(test)]
mod tests;

use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

/// Failure while parsing or evaluating a sandboxed expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    /// A value thrown by the expression itself and never caught.
    #[error("uncaught exception: {0}")]
    Thrown(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("resource limit exceeded: {0}")]
    LimitExceeded(String),

    /// The evaluation task itself failed (panicked or was cancelled).
    #[error("evaluation aborted: {0}")]
    Aborted(String),
}

/// Named values made visible as globals during one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Json>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Json) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Json) {
        self.values.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resource budget applied to a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Interpreted expressions and statements before the run is aborted.
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Syntactic nesting accepted by the parser.
    pub max_nesting: usize,
    /// Upper bound on any single string, in UTF-16 code units.
    pub max_string_len: usize,
    pub max_array_len: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 64,
            max_nesting: 128,
            max_string_len: 1 << 20,
            max_array_len: 1 << 16,
        }
    }
}

impl SandboxLimits {
    /// Defaults, with the step budget overridable via `PLAYGROUND_SANDBOX_MAX_STEPS`.
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Some(steps) = env::var("PLAYGROUND_SANDBOX_MAX_STEPS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            limits.max_steps = steps;
        }
        limits
    }
}

/// Evaluates an expression with caller-supplied bindings and returns its
/// JSON-compatible result.
///
/// Implementations must not give the expression any capability beyond what
/// the bindings carry.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, source: &str, bindings: &Bindings) -> Result<Json, SandboxError>;
}

/// The built-in interpreter.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }
}

impl ExpressionEvaluator for Sandbox {
    fn evaluate(&self, source: &str, bindings: &Bindings) -> Result<Json, SandboxError> {
        let expr = parser::parse_expression(source, self.limits.max_nesting)?;
        let mut interpreter = interp::Interpreter::new(self.limits, bindings);
        let result = interpreter.run(&expr);
        tracing::trace!(
            steps = interpreter.steps(),
            ok = result.is_ok(),
            "sandbox evaluation finished"
        );
        result
    }
}

/// Run an evaluation on the blocking pool so a long challenge does not stall
/// the async runtime.
pub async fn evaluate_blocking(
    evaluator: Arc<dyn ExpressionEvaluator>,
    source: String,
    bindings: Bindings,
) -> Result<Json, SandboxError> {
    tokio::task::spawn_blocking(move || evaluator.evaluate(&source, &bindings))
        .await
        .map_err(|e| SandboxError::Aborted(e.to_string()))?
}
