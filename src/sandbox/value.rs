//! Runtime values and the JavaScript coercion rules the sandbox honours.

use super::ast::FunctionDef;
use super::SandboxError;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub(crate) type Env = Rc<RefCell<Scope>>;
pub(crate) type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub(crate) type ObjectRef = Rc<RefCell<Object>>;

#[derive(Clone)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Function>),
}

pub(crate) enum Function {
    Closure { def: Rc<FunctionDef>, env: Env },
    /// A global or namespaced builtin such as `parseInt` or `Math.floor`.
    Builtin(&'static str),
    /// A method looked up on a value, bound to its receiver.
    Method { receiver: Value, name: String },
}

/// Insertion-ordered property bag.
#[derive(Default)]
pub(crate) struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn set(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        before != self.entries.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }
}

pub(crate) struct Binding {
    pub value: Value,
    pub mutable: bool,
}

pub(crate) struct Scope {
    pub vars: HashMap<String, Binding>,
    pub parent: Option<Env>,
    /// `Some` on non-arrow function scopes (and the global scope).
    pub this: Option<Value>,
    pub function_scope: bool,
}

impl Scope {
    pub fn lookup(env: &Env, name: &str) -> Option<Value> {
        let mut current = Some(env.clone());
        while let Some(scope) = current {
            let scope_ref = scope.borrow();
            if let Some(binding) = scope_ref.vars.get(name) {
                return Some(binding.value.clone());
            }
            current = scope_ref.parent.clone();
        }
        None
    }

    /// Assigns to the nearest existing binding; `Ok(false)` when none exists.
    pub fn assign(env: &Env, name: &str, value: Value) -> Result<bool, SandboxError> {
        let mut current = Some(env.clone());
        while let Some(scope) = current {
            let mut scope_ref = scope.borrow_mut();
            if let Some(binding) = scope_ref.vars.get_mut(name) {
                if !binding.mutable {
                    return Err(SandboxError::Type("Assignment to constant variable.".into()));
                }
                binding.value = value;
                return Ok(true);
            }
            current = scope_ref.parent.clone();
        }
        Ok(false)
    }

    pub fn declare(env: &Env, name: &str, value: Value, mutable: bool) {
        env.borrow_mut()
            .vars
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn function_scope_of(env: &Env) -> Env {
        let mut current = env.clone();
        loop {
            let parent = {
                let scope = current.borrow();
                if scope.function_scope {
                    return current.clone();
                }
                scope.parent.clone()
            };
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    pub fn this_of(env: &Env) -> Value {
        let mut current = Some(env.clone());
        while let Some(scope) = current {
            let scope_ref = scope.borrow();
            if let Some(this) = &scope_ref.this {
                return this.clone();
            }
            current = scope_ref.parent.clone();
        }
        Value::Undefined
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(a) => write!(f, "[Array({})]", a.borrow().len()),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Function(func) => write!(f, "[Function {}]", func.name()),
        }
    }
}

impl Function {
    pub fn name(&self) -> String {
        match self {
            Function::Closure { def, .. } => def.name.clone().unwrap_or_default(),
            Function::Builtin(name) => name.rsplit('.').next().unwrap_or(name).to_string(),
            Function::Method { name, .. } => name.clone(),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(object: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(n.is_nan() || *n == 0.0),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                string_to_number(&self.to_js_string())
            }
        }
    }

    pub fn to_js_string(&self) -> String {
        self.to_js_string_depth(0)
    }

    fn to_js_string_depth(&self, depth: usize) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => {
                // Cyclic arrays stringify their repeated occurrences as "".
                if depth > 32 {
                    return String::new();
                }
                items
                    .borrow()
                    .iter()
                    .map(|v| match v {
                        Value::Undefined | Value::Null => String::new(),
                        other => other.to_js_string_depth(depth + 1),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(func) => format!("function {}() {{ [native code] }}", func.name()),
        }
    }

    /// Primitive used by `+` and loose equality: objects and arrays become strings.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                Value::str(self.to_js_string())
            }
            other => other.clone(),
        }
    }

    pub fn to_property_key(&self) -> String {
        self.to_js_string()
    }
}

pub(crate) fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `SameValueZero`, used by `includes`.
pub(crate) fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

pub(crate) fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(x), Value::Str(_)) => *x == b.to_number(),
        (Value::Str(_), Value::Number(y)) => a.to_number() == *y,
        (Value::Bool(_), _) => loose_equals(&Value::Number(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(b.to_number())),
        (Value::Array(_) | Value::Object(_) | Value::Function(_), Value::Number(_) | Value::Str(_)) => {
            loose_equals(&a.to_primitive(), b)
        }
        (Value::Number(_) | Value::Str(_), Value::Array(_) | Value::Object(_) | Value::Function(_)) => {
            loose_equals(a, &b.to_primitive())
        }
        _ => strict_equals(a, b),
    }
}

pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if exp.starts_with('-') => format!("{}e{}", mantissa, exp),
            Some((mantissa, exp)) => format!("{}e+{}", mantissa, exp),
            None => formatted,
        };
    }
    format!("{}", n)
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

pub(crate) fn js_trim(s: &str) -> &str {
    s.trim_matches(is_js_whitespace)
}

pub(crate) fn js_trim_start(s: &str) -> &str {
    s.trim_start_matches(is_js_whitespace)
}

pub(crate) fn js_trim_end(s: &str) -> &str {
    s.trim_end_matches(is_js_whitespace)
}

pub(crate) fn string_to_number(s: &str) -> f64 {
    let t = js_trim(s);
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let lower = t.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            if digits.is_empty() {
                return f64::NAN;
            }
            let mut value = 0f64;
            for c in digits.chars() {
                match c.to_digit(radix) {
                    Some(d) => value = value * radix as f64 + d as f64,
                    None => return f64::NAN,
                }
            }
            return value;
        }
    }
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub(crate) fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    m as u32
}

pub(crate) fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Lone surrogates become U+FFFD: strings are Rust `str`, not UTF-16.
pub(crate) fn from_utf16(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

pub(crate) fn array_index(key: &str) -> Option<usize> {
    let idx: usize = key.parse().ok()?;
    (idx.to_string() == key).then_some(idx)
}

pub(crate) fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
        return Json::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// Convert to JSON the way `JSON.stringify` would; `None` means "omit".
///
/// Known divergence: a string holding a lone surrogate (say
/// `'\uD83D\uDE00'.slice(0, 1)`) already carries U+FFFD here, so it
/// serializes as U+FFFD where a browser writes `"\ud83d"`. A token
/// sealed from such a result would not match the browser's.
pub(crate) fn to_json(value: &Value, depth: usize) -> Result<Option<Json>, SandboxError> {
    if depth > 64 {
        return Err(SandboxError::Type(
            "Converting circular or overly deep structure to JSON".into(),
        ));
    }
    Ok(match value {
        Value::Undefined | Value::Function(_) => None,
        Value::Null => Some(Json::Null),
        Value::Bool(b) => Some(Json::Bool(*b)),
        Value::Number(n) => Some(number_to_json(*n)),
        Value::Str(s) => Some(Json::String(s.to_string())),
        Value::Array(items) => {
            let items = items.borrow();
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(to_json(item, depth + 1)?.unwrap_or(Json::Null));
            }
            Some(Json::Array(out))
        }
        Value::Object(object) => {
            let object = object.borrow();
            let mut out = serde_json::Map::new();
            for (key, item) in object.entries() {
                if let Some(v) = to_json(item, depth + 1)? {
                    out.insert(key.clone(), v);
                }
            }
            Some(Json::Object(out))
        }
    })
}

pub(crate) fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::str(s.as_str()),
        Json::Array(items) => Value::array(items.iter().map(from_json).collect()),
        Json::Object(map) => {
            let mut object = Object::default();
            for (k, v) in map {
                object.set(k.clone(), from_json(v));
            }
            Value::object(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_surrogates_serialize_as_replacement_characters() {
        let high = from_utf16(&[0xD83D]);
        assert_eq!(
            to_json(&Value::str(high), 0).unwrap(),
            Some(Json::String("\u{fffd}".into()))
        );
        assert_eq!(from_utf16(&[0xD83D, 0xDE00]), "\u{1f600}");
    }

    #[test]
    fn formats_numbers_like_javascript() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(123456.789), "123456.789");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn coerces_strings_to_numbers() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn loose_equality_rules() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::Number(1.0), &Value::str("1")));
        assert!(loose_equals(&Value::Bool(true), &Value::Number(1.0)));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(
            &Value::array(vec![Value::Number(1.0), Value::Number(2.0)]),
            &Value::str("1,2")
        ));
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(to_int32(4_294_967_295.0), -1);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn json_conversion_drops_functions_and_normalises_numbers() {
        let mut object = Object::default();
        object.set("a".into(), Value::Number(3.0));
        object.set("b".into(), Value::Undefined);
        object.set("c".into(), Value::array(vec![Value::Undefined, Value::Number(0.5)]));
        let json = to_json(&Value::object(object), 0).unwrap().unwrap();
        assert_eq!(json, serde_json::json!({"a": 3, "c": [null, 0.5]}));
    }
}
