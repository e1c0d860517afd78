//! Per-request authentication token.
//!
//! The service hands out a challenge at `/openai.jpeg`: a code fragment, an
//! argument and a timestamp, all UTF-16 base64 encoded. Running the fragment
//! against the argument in a browser-like global environment produces a
//! three-element array whose last slot is replaced by a fixed marker; the
//! token is that array plus the timestamp, encoded the same way. Tokens are
//! minted fresh for every generation call.

use crate::codec::{self, CodecError};
use crate::sandbox::{evaluate_blocking, Bindings, ExpressionEvaluator, SandboxError};
use crate::telemetry::{DiagnosticEvent, DiagnosticSink};
use crate::transport::HttpTransport;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub const CHALLENGE_PATH: &str = "/openai.jpeg";

/// Value the service expects in the third result slot and in `globalThis.marker`.
pub const MARKER: &str = "mark";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to fetch challenge: {0}")]
    Fetch(String),

    #[error("failed to decode challenge: {0}")]
    Decode(#[from] CodecError),

    #[error("malformed challenge: {0}")]
    MalformedChallenge(String),

    #[error("challenge evaluation failed: {0}")]
    Evaluation(#[from] SandboxError),

    #[error("challenge produced an unexpected result: {0}")]
    UnexpectedShape(String),
}

/// A decoded challenge. Used once, never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    /// Function expression source.
    pub code: String,
    pub argument: Value,
    pub timestamp: Value,
}

impl Challenge {
    /// Decode the raw `/openai.jpeg` body.
    pub fn decode(body: &str) -> Result<Self, TokenError> {
        let text = codec::from_binary(body.trim())?;
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| TokenError::MalformedChallenge(format!("not JSON: {}", e)))?;
        let Value::Object(mut fields) = parsed else {
            return Err(TokenError::MalformedChallenge(
                "expected a JSON object".to_string(),
            ));
        };
        let code = match fields.remove("c") {
            Some(Value::String(code)) => code,
            Some(_) => {
                return Err(TokenError::MalformedChallenge(
                    "field 'c' is not a string".to_string(),
                ))
            }
            None => {
                return Err(TokenError::MalformedChallenge(
                    "missing field 'c'".to_string(),
                ))
            }
        };
        Ok(Self {
            code,
            argument: fields.remove("a").unwrap_or(Value::Null),
            timestamp: fields.remove("t").unwrap_or(Value::Null),
        })
    }

    /// `(<code>)(<argument>)`. A string argument is spliced in as source
    /// text; anything else as its JSON form.
    pub fn invocation(&self) -> String {
        let argument = match &self.argument {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        format!("({})({})", self.code, argument)
    }
}

/// Opaque value for the `custom-encoding` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} chars redacted>)", self.0.len())
    }
}

/// Globals visible to the challenge: `globalThis = { marker: "mark" }`.
pub fn challenge_bindings() -> Bindings {
    Bindings::new().with("globalThis", json!({ "marker": MARKER }))
}

/// Turn the evaluated challenge result into a token.
///
/// The result must be an array of exactly three elements; the last one is
/// replaced with [`MARKER`].
pub fn seal(result: Value, timestamp: &Value) -> Result<Token, TokenError> {
    let mut items = match result {
        Value::Array(items) if items.len() == 3 => items,
        Value::Array(items) => {
            return Err(TokenError::UnexpectedShape(format!(
                "expected 3 elements, got {}",
                items.len()
            )))
        }
        other => {
            return Err(TokenError::UnexpectedShape(format!(
                "expected an array, got {}",
                other
            )))
        }
    };
    items[2] = Value::String(MARKER.to_string());
    let payload = json!({ "r": items, "t": timestamp });
    Ok(Token(codec::to_binary(&payload.to_string())))
}

pub struct TokenMinter {
    transport: Arc<HttpTransport>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl TokenMinter {
    pub fn new(
        transport: Arc<HttpTransport>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            transport,
            evaluator,
            diagnostics,
        }
    }

    /// Fetch a fresh challenge and solve it.
    pub async fn mint(&self) -> Result<Token, TokenError> {
        let started = Instant::now();
        let body = self
            .transport
            .get_text(CHALLENGE_PATH)
            .await
            .map_err(|e| TokenError::Fetch(e.to_string()))?;
        let challenge = Challenge::decode(&body)?;
        tracing::debug!(code_len = challenge.code.len(), "challenge decoded");

        let result = evaluate_blocking(
            self.evaluator.clone(),
            challenge.invocation(),
            challenge_bindings(),
        )
        .await?;
        let token = seal(result, &challenge.timestamp)?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(elapsed_ms, "token minted");
        if let Err(e) = self
            .diagnostics
            .report(DiagnosticEvent::TokenMinted { elapsed_ms })
            .await
        {
            tracing::debug!(error = %e, "diagnostic sink rejected event");
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;

    fn encode(challenge: Value) -> String {
        codec::to_binary(&challenge.to_string())
    }

    fn solve(body: &str) -> Result<Token, TokenError> {
        let challenge = Challenge::decode(body)?;
        let result = Sandbox::default().evaluate(&challenge.invocation(), &challenge_bindings())?;
        seal(result, &challenge.timestamp)
    }

    #[test]
    fn decodes_challenge_fields() {
        let body = encode(json!({ "c": "function(a){return a}", "a": 5, "t": "1700" }));
        let challenge = Challenge::decode(&body).unwrap();
        assert_eq!(challenge.code, "function(a){return a}");
        assert_eq!(challenge.argument, json!(5));
        assert_eq!(challenge.timestamp, json!("1700"));
    }

    #[test]
    fn string_arguments_are_spliced_as_source() {
        let challenge = Challenge {
            code: "function(a){return a}".into(),
            argument: json!("Math.PI"),
            timestamp: Value::Null,
        };
        assert_eq!(challenge.invocation(), "(function(a){return a})(Math.PI)");
        let challenge = Challenge {
            argument: json!({ "k": [1, 2] }),
            ..challenge
        };
        assert_eq!(challenge.invocation(), r#"(function(a){return a})({"k":[1,2]})"#);
    }

    #[test]
    fn mints_the_expected_token() {
        let body = encode(json!({
            "c": "function(a){return [a*3, \"abc\".fontcolor().length, globalThis.marker+\"!\"]}",
            "a": 7,
            "t": "1700000000.123"
        }));
        let token = solve(&body).unwrap();
        let decoded = codec::from_binary(token.as_str()).unwrap();
        let payload: Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(payload, json!({ "r": [21, 16, "mark"], "t": "1700000000.123" }));
    }

    #[test]
    fn fails_closed_on_wrong_arity() {
        for code in ["function(){return [1,2]}", "function(){return [1,2,3,4]}", "function(){return 'x'}"] {
            let body = encode(json!({ "c": code, "a": 0, "t": 1 }));
            assert!(
                matches!(solve(&body), Err(TokenError::UnexpectedShape(_))),
                "{}",
                code
            );
        }
    }

    #[test]
    fn rejects_malformed_challenges() {
        assert!(matches!(
            Challenge::decode(&encode(json!({ "a": 1, "t": 2 }))),
            Err(TokenError::MalformedChallenge(_))
        ));
        assert!(matches!(
            Challenge::decode(&encode(json!({ "c": 3 }))),
            Err(TokenError::MalformedChallenge(_))
        ));
        assert!(matches!(
            Challenge::decode(&codec::to_binary("not json")),
            Err(TokenError::MalformedChallenge(_))
        ));
        assert!(matches!(
            Challenge::decode("!!!"),
            Err(TokenError::Decode(_))
        ));
    }

    #[test]
    fn evaluation_errors_surface() {
        let body = encode(json!({ "c": "function(){return fetch('x')}", "a": 0, "t": 1 }));
        assert!(matches!(solve(&body), Err(TokenError::Evaluation(_))));
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = Token("secret".to_string());
        assert_eq!(format!("{:?}", token), "Token(<6 chars redacted>)");
    }
}
