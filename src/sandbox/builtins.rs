//! Global objects, property access and the builtin method library.

use super::interp::{error_object, js_pow, keys_of, Eval, Interpreter, Interrupt};
use super::value::{
    array_index, from_json, from_utf16, js_trim, js_trim_end, js_trim_start, number_to_string,
    same_value_zero, strict_equals, string_to_number, to_json, to_uint32, utf16, Function, Object,
    Value,
};
use super::SandboxError;
use std::cmp::Ordering;
use std::rc::Rc;

const MATH_FUNCTIONS: &[&str] = &[
    "Math.abs", "Math.floor", "Math.ceil", "Math.round", "Math.trunc", "Math.sign", "Math.sqrt",
    "Math.cbrt", "Math.pow", "Math.min", "Math.max", "Math.sin", "Math.cos", "Math.tan",
    "Math.asin", "Math.acos", "Math.atan", "Math.atan2", "Math.sinh", "Math.cosh", "Math.tanh",
    "Math.log", "Math.log2", "Math.log10", "Math.log1p", "Math.exp", "Math.expm1", "Math.hypot",
    "Math.random", "Math.fround", "Math.imul", "Math.clz32",
];

const MATH_CONSTANTS: &[(&str, f64)] = &[
    ("PI", std::f64::consts::PI),
    ("E", std::f64::consts::E),
    ("LN2", std::f64::consts::LN_2),
    ("LN10", std::f64::consts::LN_10),
    ("LOG2E", std::f64::consts::LOG2_E),
    ("LOG10E", std::f64::consts::LOG10_E),
    ("SQRT2", std::f64::consts::SQRT_2),
    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
];

/// Static members reachable as `Ctor.member`.
const STATICS: &[&str] = &[
    "String.fromCharCode",
    "String.fromCodePoint",
    "Number.isInteger",
    "Number.isFinite",
    "Number.isNaN",
    "Number.isSafeInteger",
    "Number.parseFloat",
    "Number.parseInt",
    "Array.isArray",
    "Array.from",
    "Array.of",
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Object.assign",
    "Object.fromEntries",
    "Object.freeze",
    "JSON.stringify",
    "JSON.parse",
];

const GLOBAL_FUNCTIONS: &[&str] = &[
    "String",
    "Number",
    "Boolean",
    "Array",
    "Object",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
];

const STRING_METHODS: &[&str] = &[
    "charAt", "charCodeAt", "codePointAt", "at", "indexOf", "lastIndexOf", "includes",
    "startsWith", "endsWith", "slice", "substring", "substr", "toUpperCase", "toLowerCase",
    "trim", "trimStart", "trimEnd", "split", "concat", "repeat", "padStart", "padEnd", "replace",
    "replaceAll", "fontcolor", "toString", "valueOf", "localeCompare", "normalize",
];

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "join", "indexOf", "lastIndexOf", "includes", "slice",
    "splice", "concat", "reverse", "map", "filter", "forEach", "reduce", "reduceRight", "some",
    "every", "find", "findIndex", "fill", "sort", "at", "flat", "toString",
];

const NUMBER_METHODS: &[&str] = &["toString", "toFixed", "valueOf"];
const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString", "valueOf"];
const FUNCTION_METHODS: &[&str] = &["call", "apply", "toString"];

fn builtin(name: &'static str) -> Value {
    Value::Function(Rc::new(Function::Builtin(name)))
}

fn method(receiver: &Value, name: &str) -> Value {
    Value::Function(Rc::new(Function::Method {
        receiver: receiver.clone(),
        name: name.to_string(),
    }))
}

/// Bindings present in every fresh global environment.
pub(crate) fn globals() -> Vec<(&'static str, Value)> {
    let mut math = Object::default();
    for name in MATH_FUNCTIONS {
        math.set(name.trim_start_matches("Math.").to_string(), builtin(name));
    }
    for (name, value) in MATH_CONSTANTS {
        math.set(name.to_string(), Value::Number(*value));
    }
    let mut json = Object::default();
    json.set("stringify".into(), builtin("JSON.stringify"));
    json.set("parse".into(), builtin("JSON.parse"));

    let mut out = vec![
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
        ("Math", Value::object(math)),
        ("JSON", Value::object(json)),
    ];
    out.extend(GLOBAL_FUNCTIONS.iter().map(|name| (*name, builtin(name))));
    out
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn num_arg(args: &[Value], i: usize, default: f64) -> f64 {
    match args.get(i) {
        None | Some(Value::Undefined) => default,
        Some(v) => v.to_number(),
    }
}

fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolves a relative index (negative counts from the end) into `0..=len`.
fn relative_index(n: f64, len: usize) -> usize {
    let n = to_integer(n);
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn rfind_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    let start = from.min(haystack.len() - needle.len());
    (0..=start)
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn type_error(message: impl Into<String>) -> Interrupt {
    Interrupt::Error(SandboxError::Type(message.into()))
}

impl Interpreter {
    pub(super) fn get_property(&mut self, obj: &Value, key: &str) -> Eval<Value> {
        Ok(match obj {
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    obj.to_js_string(),
                    key
                )))
            }
            Value::Str(s) => {
                if key == "length" {
                    Value::Number(s.encode_utf16().count() as f64)
                } else if let Some(i) = array_index(key) {
                    s.encode_utf16()
                        .nth(i)
                        .map(|u| Value::str(from_utf16(&[u])))
                        .unwrap_or(Value::Undefined)
                } else if STRING_METHODS.contains(&key) {
                    method(obj, key)
                } else {
                    Value::Undefined
                }
            }
            Value::Array(items) => {
                if key == "length" {
                    Value::Number(items.borrow().len() as f64)
                } else if let Some(i) = array_index(key) {
                    items.borrow().get(i).cloned().unwrap_or(Value::Undefined)
                } else if ARRAY_METHODS.contains(&key) {
                    method(obj, key)
                } else {
                    Value::Undefined
                }
            }
            Value::Object(o) => match o.borrow().get(key) {
                Some(v) => v.clone(),
                None if OBJECT_METHODS.contains(&key) => method(obj, key),
                None => Value::Undefined,
            },
            Value::Number(_) if NUMBER_METHODS.contains(&key) => method(obj, key),
            Value::Bool(_) if matches!(key, "toString" | "valueOf") => method(obj, key),
            Value::Number(_) | Value::Bool(_) => Value::Undefined,
            Value::Function(f) => {
                if key == "name" {
                    return Ok(Value::str(f.name()));
                }
                if FUNCTION_METHODS.contains(&key) {
                    return Ok(method(obj, key));
                }
                match &**f {
                    Function::Builtin(ctor) => static_member(ctor, key),
                    Function::Closure { def, .. } if key == "length" => Value::Number(
                        def.params
                            .iter()
                            .take_while(|p| !p.rest && p.default.is_none())
                            .count() as f64,
                    ),
                    _ => Value::Undefined,
                }
            }
        })
    }

    pub(super) fn set_property(&mut self, obj: &Value, key: String, value: Value) -> Eval<()> {
        match obj {
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                obj.to_js_string(),
                key
            ))),
            Value::Object(o) => {
                o.borrow_mut().set(key, value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let n = value.to_number();
                    if n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
                        return Err(Interrupt::Error(SandboxError::Range(
                            "Invalid array length".into(),
                        )));
                    }
                    self.check_array_len(n as usize)?;
                    items.borrow_mut().resize(n as usize, Value::Undefined);
                } else if let Some(i) = array_index(&key) {
                    self.check_array_len(i + 1)?;
                    let mut items = items.borrow_mut();
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
                Ok(())
            }
            // Writes to primitives and functions are silently dropped.
            _ => Ok(()),
        }
    }

    pub(super) fn delete_property(&mut self, obj: &Value, key: &str) -> Eval<bool> {
        match obj {
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot convert undefined or null to object (deleting '{}')",
                key
            ))),
            Value::Object(o) => {
                o.borrow_mut().remove(key);
                Ok(true)
            }
            Value::Array(items) => {
                if let Some(i) = array_index(key) {
                    if let Some(slot) = items.borrow_mut().get_mut(i) {
                        *slot = Value::Undefined;
                    }
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    pub(super) fn construct_builtin(&mut self, name: &str, args: Vec<Value>) -> Eval<Value> {
        match name {
            "Error" | "TypeError" | "RangeError" | "SyntaxError" | "ReferenceError" => {
                let message = match args.first() {
                    None | Some(Value::Undefined) => String::new(),
                    Some(v) => v.to_js_string(),
                };
                Ok(error_object(name, &message))
            }
            "Array" => self.array_ctor(args),
            "Object" => Ok(match args.into_iter().next() {
                Some(v @ (Value::Object(_) | Value::Array(_))) => v,
                _ => Value::object(Object::default()),
            }),
            "String" | "Number" | "Boolean" => self.call_builtin(name, Value::Undefined, args),
            other => Err(type_error(format!("{} is not a constructor", other))),
        }
    }

    fn array_ctor(&mut self, args: Vec<Value>) -> Eval<Value> {
        if let [Value::Number(n)] = args.as_slice() {
            if *n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
                return Err(Interrupt::Error(SandboxError::Range(
                    "Invalid array length".into(),
                )));
            }
            self.check_array_len(*n as usize)?;
            return Ok(Value::array(vec![Value::Undefined; *n as usize]));
        }
        Ok(Value::array(args))
    }

    pub(super) fn call_builtin(&mut self, name: &str, _this: Value, args: Vec<Value>) -> Eval<Value> {
        if let Some(math) = name.strip_prefix("Math.") {
            return Ok(Value::Number(math_call(math, &args)));
        }
        match name {
            "String" => Ok(match args.first() {
                None => Value::str(""),
                Some(v) => Value::str(v.to_js_string()),
            }),
            "Number" => Ok(Value::Number(num_arg(&args, 0, 0.0))),
            "Boolean" => Ok(Value::Bool(arg(&args, 0).truthy())),
            "Array.of" => Ok(Value::array(args)),
            "Array" => self.array_ctor(args),
            "Object" => self.construct_builtin(name, args),
            "Error" | "TypeError" | "RangeError" | "SyntaxError" | "ReferenceError" => {
                self.construct_builtin(name, args)
            }
            "parseInt" | "Number.parseInt" => Ok(Value::Number(parse_int(
                &arg(&args, 0).to_js_string(),
                num_arg(&args, 1, 0.0),
            ))),
            "parseFloat" | "Number.parseFloat" => {
                Ok(Value::Number(parse_float(&arg(&args, 0).to_js_string())))
            }
            "isNaN" => Ok(Value::Bool(num_arg(&args, 0, f64::NAN).is_nan())),
            "isFinite" => Ok(Value::Bool(num_arg(&args, 0, f64::NAN).is_finite())),
            "encodeURIComponent" => {
                let text = arg(&args, 0).to_js_string();
                let mut out = String::with_capacity(text.len());
                for byte in text.bytes() {
                    if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
                        out.push(byte as char);
                    } else {
                        out.push_str(&format!("%{:02X}", byte));
                    }
                }
                self.make_string(out)
            }
            "String.fromCharCode" => {
                let units: Vec<u16> = args
                    .iter()
                    .map(|v| (to_uint32(v.to_number()) & 0xFFFF) as u16)
                    .collect();
                self.make_string(from_utf16(&units))
            }
            "String.fromCodePoint" => {
                let mut out = String::new();
                for v in &args {
                    let n = v.to_number();
                    let c = (n.fract() == 0.0 && n >= 0.0)
                        .then(|| char::from_u32(n as u32))
                        .flatten()
                        .ok_or_else(|| {
                            Interrupt::Error(SandboxError::Range(format!(
                                "Invalid code point {}",
                                number_to_string(n)
                            )))
                        })?;
                    out.push(c);
                }
                self.make_string(out)
            }
            "Number.isInteger" => Ok(Value::Bool(matches!(
                arg(&args, 0),
                Value::Number(n) if n.is_finite() && n.fract() == 0.0
            ))),
            "Number.isSafeInteger" => Ok(Value::Bool(matches!(
                arg(&args, 0),
                Value::Number(n) if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0
            ))),
            "Number.isFinite" => Ok(Value::Bool(matches!(
                arg(&args, 0),
                Value::Number(n) if n.is_finite()
            ))),
            "Number.isNaN" => Ok(Value::Bool(matches!(
                arg(&args, 0),
                Value::Number(n) if n.is_nan()
            ))),
            "Array.isArray" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),
            "Array.from" => {
                let source = arg(&args, 0);
                let items = match &source {
                    Value::Array(_) | Value::Str(_) => self.iterate(&source)?,
                    Value::Object(o) => {
                        let len = o
                            .borrow()
                            .get("length")
                            .map(|v| to_integer(v.to_number()).max(0.0) as usize)
                            .unwrap_or(0);
                        self.check_array_len(len)?;
                        let o = o.borrow();
                        (0..len)
                            .map(|i| o.get(&i.to_string()).cloned().unwrap_or(Value::Undefined))
                            .collect()
                    }
                    _ => Vec::new(),
                };
                let mapper = arg(&args, 1);
                if mapper.is_function() {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        out.push(self.call(
                            &mapper,
                            Value::Undefined,
                            vec![item, Value::Number(i as f64)],
                        )?);
                    }
                    Ok(Value::array(out))
                } else {
                    Ok(Value::array(items))
                }
            }
            "Object.keys" => Ok(Value::array(
                keys_of(&arg(&args, 0)).into_iter().map(Value::str).collect(),
            )),
            "Object.values" | "Object.entries" => {
                let source = arg(&args, 0);
                let mut out = Vec::new();
                for key in keys_of(&source) {
                    let value = self.get_property(&source, &key)?;
                    out.push(if name == "Object.values" {
                        value
                    } else {
                        Value::array(vec![Value::str(key), value])
                    });
                }
                Ok(Value::array(out))
            }
            "Object.assign" => {
                let target = arg(&args, 0);
                if target.is_nullish() {
                    return Err(type_error("Cannot convert undefined or null to object"));
                }
                for source in args.iter().skip(1) {
                    for key in keys_of(source) {
                        let value = self.get_property(source, &key)?;
                        self.set_property(&target, key, value)?;
                    }
                }
                Ok(target)
            }
            "Object.fromEntries" => {
                let mut object = Object::default();
                for entry in self.iterate(&arg(&args, 0))? {
                    let key = self.get_property(&entry, "0")?.to_property_key();
                    let value = self.get_property(&entry, "1")?;
                    object.set(key, value);
                }
                Ok(Value::object(object))
            }
            "Object.freeze" => Ok(arg(&args, 0)),
            "JSON.stringify" => match to_json(&arg(&args, 0), 0)? {
                Some(json) => {
                    let text = serde_json::to_string(&json)
                        .map_err(|e| type_error(format!("JSON.stringify failed: {}", e)))?;
                    self.make_string(text)
                }
                None => Ok(Value::Undefined),
            },
            "JSON.parse" => {
                let text = arg(&args, 0).to_js_string();
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Ok(from_json(&json)),
                    Err(e) => Err(Interrupt::Thrown(error_object("SyntaxError", &e.to_string()))),
                }
            }
            other => Err(type_error(format!("{} is not a function", other))),
        }
    }

    pub(super) fn call_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Eval<Value> {
        match receiver {
            Value::Str(s) => self.string_method(s.clone(), receiver, name, args),
            Value::Array(_) => self.array_method(receiver, name, args),
            Value::Number(n) => number_method(*n, name, &args),
            Value::Bool(b) => Ok(match name {
                "valueOf" => Value::Bool(*b),
                _ => Value::str(b.to_string()),
            }),
            Value::Object(o) => Ok(match name {
                "hasOwnProperty" => {
                    Value::Bool(o.borrow().contains(&arg(&args, 0).to_property_key()))
                }
                "valueOf" => receiver.clone(),
                _ => Value::str("[object Object]"),
            }),
            Value::Function(_) => match name {
                "call" => {
                    let mut args = args.into_iter();
                    let this = args.next().unwrap_or(Value::Undefined);
                    self.call(receiver, this, args.collect())
                }
                "apply" => {
                    let this = arg(&args, 0);
                    let list = match arg(&args, 1) {
                        Value::Undefined | Value::Null => Vec::new(),
                        other => self.iterate(&other)?,
                    };
                    self.call(receiver, this, list)
                }
                _ => Ok(Value::str(receiver.to_js_string())),
            },
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                receiver.to_js_string(),
                name
            ))),
        }
    }

    fn string_method(&mut self, s: Rc<str>, receiver: &Value, name: &str, args: Vec<Value>) -> Eval<Value> {
        let units = utf16(&s);
        let len = units.len();
        Ok(match name {
            "charAt" => {
                let i = to_integer(num_arg(&args, 0, 0.0));
                if i < 0.0 || i >= len as f64 {
                    Value::str("")
                } else {
                    Value::str(from_utf16(&units[i as usize..i as usize + 1]))
                }
            }
            "charCodeAt" => {
                let i = to_integer(num_arg(&args, 0, 0.0));
                if i < 0.0 || i >= len as f64 {
                    Value::Number(f64::NAN)
                } else {
                    Value::Number(units[i as usize] as f64)
                }
            }
            "codePointAt" => {
                let i = to_integer(num_arg(&args, 0, 0.0));
                if i < 0.0 || i >= len as f64 {
                    Value::Undefined
                } else {
                    let i = i as usize;
                    let cp = char::decode_utf16(units[i..].iter().copied())
                        .next()
                        .and_then(|r| r.ok())
                        .map(|c| c as u32)
                        .unwrap_or(units[i] as u32);
                    Value::Number(cp as f64)
                }
            }
            "at" => {
                let i = to_integer(num_arg(&args, 0, 0.0));
                let i = if i < 0.0 { len as f64 + i } else { i };
                if i < 0.0 || i >= len as f64 {
                    Value::Undefined
                } else {
                    Value::str(from_utf16(&units[i as usize..i as usize + 1]))
                }
            }
            "indexOf" | "includes" => {
                let needle = utf16(&arg(&args, 0).to_js_string());
                let from = relative_index(num_arg(&args, 1, 0.0).max(0.0), len);
                let found = find_units(&units, &needle, from);
                if name == "includes" {
                    Value::Bool(found.is_some())
                } else {
                    Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
                }
            }
            "lastIndexOf" => {
                let needle = utf16(&arg(&args, 0).to_js_string());
                let from = num_arg(&args, 1, f64::INFINITY);
                let from = if from.is_nan() { len } else { relative_index(from.max(0.0), len) };
                Value::Number(
                    rfind_units(&units, &needle, from)
                        .map(|i| i as f64)
                        .unwrap_or(-1.0),
                )
            }
            "startsWith" => {
                let needle = utf16(&arg(&args, 0).to_js_string());
                let pos = relative_index(num_arg(&args, 1, 0.0).max(0.0), len);
                Value::Bool(units[pos..].starts_with(&needle))
            }
            "endsWith" => {
                let needle = utf16(&arg(&args, 0).to_js_string());
                let end = relative_index(num_arg(&args, 1, len as f64).max(0.0), len);
                Value::Bool(units[..end].ends_with(&needle))
            }
            "slice" => {
                let start = relative_index(num_arg(&args, 0, 0.0), len);
                let end = relative_index(num_arg(&args, 1, len as f64), len);
                Value::str(if start < end { from_utf16(&units[start..end]) } else { String::new() })
            }
            "substring" => {
                let clamp = |n: f64| to_integer(n).clamp(0.0, len as f64) as usize;
                let a = clamp(num_arg(&args, 0, 0.0));
                let b = clamp(num_arg(&args, 1, len as f64));
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                Value::str(from_utf16(&units[start..end]))
            }
            "substr" => {
                let start = relative_index(num_arg(&args, 0, 0.0), len);
                let count = to_integer(num_arg(&args, 1, len as f64)).max(0.0) as usize;
                let end = start.saturating_add(count).min(len);
                Value::str(from_utf16(&units[start..end]))
            }
            "toUpperCase" => Value::str(s.to_uppercase()),
            "toLowerCase" => Value::str(s.to_lowercase()),
            "trim" => Value::str(js_trim(&s)),
            "trimStart" => Value::str(js_trim_start(&s)),
            "trimEnd" => Value::str(js_trim_end(&s)),
            "split" => {
                let limit = match args.get(1) {
                    None | Some(Value::Undefined) => usize::MAX,
                    Some(v) => to_uint32(v.to_number()) as usize,
                };
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![receiver.clone()],
                    Some(sep) => {
                        let sep = sep.to_js_string();
                        if sep.is_empty() {
                            units.iter().map(|u| Value::str(from_utf16(&[*u]))).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::str).collect()
                        }
                    }
                };
                self.check_array_len(parts.len().min(limit))?;
                Value::array(parts.into_iter().take(limit).collect())
            }
            "concat" => {
                let mut out = s.to_string();
                for a in &args {
                    out.push_str(&a.to_js_string());
                }
                self.make_string(out)?
            }
            "repeat" => {
                let n = to_integer(num_arg(&args, 0, 0.0));
                if n < 0.0 || n.is_infinite() {
                    return Err(Interrupt::Error(SandboxError::Range(format!(
                        "Invalid count value: {}",
                        number_to_string(n)
                    ))));
                }
                self.check_string_len(len.saturating_mul(n as usize))?;
                Value::str(s.repeat(n as usize))
            }
            "padStart" | "padEnd" => {
                let target = to_integer(num_arg(&args, 0, 0.0)).max(0.0) as usize;
                let filler = match args.get(1) {
                    None | Some(Value::Undefined) => vec![b' ' as u16],
                    Some(v) => utf16(&v.to_js_string()),
                };
                if target <= len || filler.is_empty() {
                    receiver.clone()
                } else {
                    self.check_string_len(target)?;
                    let pad: Vec<u16> = filler.iter().copied().cycle().take(target - len).collect();
                    let joined = if name == "padStart" {
                        [pad, units].concat()
                    } else {
                        [units, pad].concat()
                    };
                    Value::str(from_utf16(&joined))
                }
            }
            "replace" | "replaceAll" => {
                let pattern = arg(&args, 0).to_js_string();
                let replacement = arg(&args, 1);
                let mut out = String::new();
                let mut rest: &str = &s;
                let mut offset = 0usize;
                let mut first = true;
                while let Some(found) = if first || name == "replaceAll" {
                    rest.find(pattern.as_str())
                } else {
                    None
                } {
                    first = false;
                    out.push_str(&rest[..found]);
                    let position = offset + rest[..found].encode_utf16().count();
                    let substitute = if replacement.is_function() {
                        self.call(
                            &replacement,
                            Value::Undefined,
                            vec![
                                Value::str(pattern.as_str()),
                                Value::Number(position as f64),
                                receiver.clone(),
                            ],
                        )?
                        .to_js_string()
                    } else {
                        expand_replacement(&replacement.to_js_string(), &pattern)
                    };
                    out.push_str(&substitute);
                    self.check_string_len(out.len())?;
                    let advance = found + pattern.len();
                    offset = position + pattern.encode_utf16().count();
                    if pattern.is_empty() {
                        // Empty pattern: emit one character and step past it.
                        match rest[advance..].chars().next() {
                            Some(c) => {
                                out.push(c);
                                offset += c.len_utf16();
                                rest = &rest[advance + c.len_utf8()..];
                            }
                            None => {
                                rest = "";
                                break;
                            }
                        }
                    } else {
                        rest = &rest[advance..];
                    }
                }
                out.push_str(rest);
                self.make_string(out)?
            }
            "fontcolor" => Value::str(format!("<font>{}</font>", s)),
            "localeCompare" => {
                let other = arg(&args, 0).to_js_string();
                Value::Number(match s.as_ref().cmp(other.as_str()) {
                    Ordering::Less => -1.0,
                    Ordering::Equal => 0.0,
                    Ordering::Greater => 1.0,
                })
            }
            "toString" | "valueOf" | "normalize" => receiver.clone(),
            other => return Err(type_error(format!("{} is not a function", other))),
        })
    }

    fn array_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Eval<Value> {
        let Value::Array(items) = receiver else {
            return Err(type_error("receiver is not an array"));
        };
        let len = items.borrow().len();
        Ok(match name {
            "push" => {
                self.check_array_len(len + args.len())?;
                let mut items = items.borrow_mut();
                items.extend(args);
                Value::Number(items.len() as f64)
            }
            "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            }
            "unshift" => {
                self.check_array_len(len + args.len())?;
                let mut items = items.borrow_mut();
                items.splice(0..0, args);
                Value::Number(items.len() as f64)
            }
            "join" | "toString" => {
                let sep = match args.first() {
                    Some(v) if name == "join" && !matches!(v, Value::Undefined) => v.to_js_string(),
                    _ => ",".to_string(),
                };
                let snapshot = items.borrow().clone();
                let mut out = String::new();
                for (i, item) in snapshot.iter().enumerate() {
                    if i > 0 {
                        out.push_str(&sep);
                    }
                    if !item.is_nullish() {
                        out.push_str(&item.to_js_string());
                    }
                    self.check_string_len(out.len())?;
                }
                Value::str(out)
            }
            "indexOf" | "includes" | "lastIndexOf" => {
                let needle = arg(&args, 0);
                let snapshot = items.borrow();
                let found = if name == "lastIndexOf" {
                    snapshot.iter().rposition(|v| strict_equals(v, &needle))
                } else {
                    let from = relative_index(num_arg(&args, 1, 0.0), len);
                    snapshot
                        .iter()
                        .skip(from)
                        .position(|v| {
                            if name == "includes" {
                                same_value_zero(v, &needle)
                            } else {
                                strict_equals(v, &needle)
                            }
                        })
                        .map(|p| p + from)
                };
                if name == "includes" {
                    Value::Bool(found.is_some())
                } else {
                    Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
                }
            }
            "at" => {
                let i = to_integer(num_arg(&args, 0, 0.0));
                let i = if i < 0.0 { len as f64 + i } else { i };
                if i < 0.0 {
                    Value::Undefined
                } else {
                    items.borrow().get(i as usize).cloned().unwrap_or(Value::Undefined)
                }
            }
            "slice" => {
                let start = relative_index(num_arg(&args, 0, 0.0), len);
                let end = relative_index(num_arg(&args, 1, len as f64), len);
                let items = items.borrow();
                Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() })
            }
            "splice" => {
                let start = relative_index(num_arg(&args, 0, 0.0), len);
                let delete = match args.get(1) {
                    None => len - start,
                    Some(v) => (to_integer(v.to_number()).max(0.0) as usize).min(len - start),
                };
                let inserted: Vec<Value> = args.into_iter().skip(2).collect();
                self.check_array_len(len - delete + inserted.len())?;
                let removed: Vec<Value> = items
                    .borrow_mut()
                    .splice(start..start + delete, inserted)
                    .collect();
                Value::array(removed)
            }
            "concat" => {
                let mut out = items.borrow().clone();
                for a in args {
                    match a {
                        Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                    self.check_array_len(out.len())?;
                }
                Value::array(out)
            }
            "reverse" => {
                items.borrow_mut().reverse();
                receiver.clone()
            }
            "fill" => {
                let value = arg(&args, 0);
                let start = relative_index(num_arg(&args, 1, 0.0), len);
                let end = relative_index(num_arg(&args, 2, len as f64), len);
                for slot in items.borrow_mut().iter_mut().take(end).skip(start) {
                    *slot = value.clone();
                }
                receiver.clone()
            }
            "flat" => {
                let depth = to_integer(num_arg(&args, 0, 1.0));
                let snapshot = items.borrow().clone();
                let flattened = self.flatten(&snapshot, depth)?;
                Value::array(flattened)
            }
            "map" | "filter" | "forEach" | "some" | "every" | "find" | "findIndex" => {
                let callback = arg(&args, 0);
                if !callback.is_function() {
                    return Err(type_error(format!(
                        "{} is not a function",
                        callback.to_js_string()
                    )));
                }
                let this = arg(&args, 1);
                let snapshot = items.borrow().clone();
                let mut mapped = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let verdict = self.call(
                        &callback,
                        this.clone(),
                        vec![item.clone(), Value::Number(i as f64), receiver.clone()],
                    )?;
                    match name {
                        "map" => mapped.push(verdict),
                        "filter" if verdict.truthy() => mapped.push(item),
                        "some" if verdict.truthy() => return Ok(Value::Bool(true)),
                        "every" if !verdict.truthy() => return Ok(Value::Bool(false)),
                        "find" if verdict.truthy() => return Ok(item),
                        "findIndex" if verdict.truthy() => return Ok(Value::Number(i as f64)),
                        _ => {}
                    }
                }
                match name {
                    "map" | "filter" => Value::array(mapped),
                    "some" => Value::Bool(false),
                    "every" => Value::Bool(true),
                    "findIndex" => Value::Number(-1.0),
                    _ => Value::Undefined,
                }
            }
            "reduce" | "reduceRight" => {
                let callback = arg(&args, 0);
                if !callback.is_function() {
                    return Err(type_error(format!(
                        "{} is not a function",
                        callback.to_js_string()
                    )));
                }
                let mut indexed: Vec<(usize, Value)> =
                    items.borrow().iter().cloned().enumerate().collect();
                if name == "reduceRight" {
                    indexed.reverse();
                }
                let mut iter = indexed.into_iter();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(type_error("Reduce of empty array with no initial value"))
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call(
                        &callback,
                        Value::Undefined,
                        vec![acc, item, Value::Number(i as f64), receiver.clone()],
                    )?;
                }
                acc
            }
            "sort" => {
                let comparator = arg(&args, 0);
                let mut sorted = items.borrow().clone();
                // Insertion sort: comparator calls may fail and every call is metered.
                for i in 1..sorted.len() {
                    let mut j = i;
                    while j > 0 {
                        let ord = self.sort_compare(&comparator, &sorted[j - 1], &sorted[j])?;
                        if ord == Ordering::Greater {
                            sorted.swap(j - 1, j);
                            j -= 1;
                        } else {
                            break;
                        }
                    }
                }
                *items.borrow_mut() = sorted;
                receiver.clone()
            }
            other => return Err(type_error(format!("{} is not a function", other))),
        })
    }

    fn sort_compare(&mut self, comparator: &Value, a: &Value, b: &Value) -> Eval<Ordering> {
        match (a, b) {
            (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
            (Value::Undefined, _) => return Ok(Ordering::Greater),
            (_, Value::Undefined) => return Ok(Ordering::Less),
            _ => {}
        }
        if comparator.is_function() {
            let n = self
                .call(comparator, Value::Undefined, vec![a.clone(), b.clone()])?
                .to_number();
            Ok(if n > 0.0 {
                Ordering::Greater
            } else if n < 0.0 {
                Ordering::Less
            } else {
                Ordering::Equal
            })
        } else {
            Ok(utf16(&a.to_js_string()).cmp(&utf16(&b.to_js_string())))
        }
    }

    fn flatten(&mut self, items: &[Value], depth: f64) -> Eval<Vec<Value>> {
        let mut out = Vec::new();
        for item in items {
            match item {
                Value::Array(inner) if depth >= 1.0 => {
                    let inner = inner.borrow().clone();
                    out.extend(self.flatten(&inner, depth - 1.0)?);
                }
                other => out.push(other.clone()),
            }
            self.check_array_len(out.len())?;
        }
        Ok(out)
    }
}

fn static_member(ctor: &str, key: &str) -> Value {
    let constant = match (ctor, key) {
        ("Number", "MAX_SAFE_INTEGER") => Some(9_007_199_254_740_991.0),
        ("Number", "MIN_SAFE_INTEGER") => Some(-9_007_199_254_740_991.0),
        ("Number", "EPSILON") => Some(f64::EPSILON),
        ("Number", "MAX_VALUE") => Some(f64::MAX),
        ("Number", "MIN_VALUE") => Some(5e-324),
        ("Number", "POSITIVE_INFINITY") => Some(f64::INFINITY),
        ("Number", "NEGATIVE_INFINITY") => Some(f64::NEG_INFINITY),
        ("Number", "NaN") => Some(f64::NAN),
        _ => None,
    };
    if let Some(n) = constant {
        return Value::Number(n);
    }
    STATICS
        .iter()
        .find(|qualified| {
            qualified
                .split_once('.')
                .map(|(c, k)| c == ctor && k == key)
                .unwrap_or(false)
        })
        .map(|qualified| builtin(qualified))
        .unwrap_or(Value::Undefined)
}

fn expand_replacement(template: &str, matched: &str) -> String {
    if !template.contains('$') {
        return template.to_string();
    }
    template.replace("$$", "\u{0}").replace("$&", matched).replace('\u{0}', "$")
}

fn math_call(name: &str, args: &[Value]) -> f64 {
    let x = num_arg(args, 0, f64::NAN);
    let y = num_arg(args, 1, f64::NAN);
    match name {
        "abs" => x.abs(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => {
            if !x.is_finite() || x.fract() == 0.0 {
                x
            } else {
                (x + 0.5).floor()
            }
        }
        "trunc" => x.trunc(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "cbrt" => x.cbrt(),
        "pow" => js_pow(x, y),
        "min" | "max" => {
            let mut acc = if name == "min" { f64::INFINITY } else { f64::NEG_INFINITY };
            for v in args {
                let n = v.to_number();
                if n.is_nan() {
                    return f64::NAN;
                }
                acc = if name == "min" { acc.min(n) } else { acc.max(n) };
            }
            acc
        }
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "asin" => x.asin(),
        "acos" => x.acos(),
        "atan" => x.atan(),
        "atan2" => x.atan2(y),
        "sinh" => x.sinh(),
        "cosh" => x.cosh(),
        "tanh" => x.tanh(),
        "log" => x.ln(),
        "log2" => x.log2(),
        "log10" => x.log10(),
        "log1p" => x.ln_1p(),
        "exp" => x.exp(),
        "expm1" => x.exp_m1(),
        "hypot" => args
            .iter()
            .map(|v| v.to_number())
            .fold(0.0, |acc: f64, n| acc.hypot(n)),
        "random" => rand::random::<f64>(),
        "fround" => x as f32 as f64,
        "imul" => (to_uint32(x) as i32).wrapping_mul(to_uint32(y) as i32) as f64,
        "clz32" => to_uint32(x).leading_zeros() as f64,
        _ => f64::NAN,
    }
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Eval<Value> {
    match name {
        "valueOf" => Ok(Value::Number(n)),
        "toFixed" => {
            let digits = to_integer(num_arg(args, 0, 0.0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(Interrupt::Error(SandboxError::Range(
                    "toFixed() digits argument must be between 0 and 100".into(),
                )));
            }
            Ok(Value::str(to_fixed(n, digits as usize)))
        }
        _ => {
            let radix = to_integer(num_arg(args, 0, 10.0));
            if !(2.0..=36.0).contains(&radix) {
                return Err(Interrupt::Error(SandboxError::Range(
                    "toString() radix must be between 2 and 36".into(),
                )));
            }
            Ok(Value::str(to_radix_string(n, radix as u32)))
        }
    }
}

fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    let scale = 10f64.powi(digits as i32);
    let scaled = n.abs() * scale;
    // Ties round away from zero, unlike the formatter's round-half-even.
    if scaled.fract() == 0.5 && scaled < 9_007_199_254_740_992.0 {
        let rounded = (scaled.floor() + 1.0) as u64;
        let mut text = rounded.to_string();
        if digits > 0 {
            if text.len() <= digits {
                text = format!("{}{}", "0".repeat(digits + 1 - text.len()), text);
            }
            text.insert(text.len() - digits, '.');
        }
        return if n < 0.0 { format!("-{}", text) } else { text };
    }
    let text = format!("{:.*}", digits, n);
    if text.starts_with('-') && text[1..].chars().all(|c| c == '0' || c == '.') {
        text[1..].to_string()
    } else {
        text
    }
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return number_to_string(n);
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let negative = n < 0.0;
    let abs = n.abs();
    let mut int_part = abs.trunc();
    let mut frac = abs - int_part;
    let mut digits = Vec::new();
    while int_part >= 1.0 {
        let d = (int_part % radix as f64) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
        int_part = (int_part / radix as f64).trunc();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    let mut out: String = digits.into_iter().rev().collect();
    if frac > 0.0 {
        out.push('.');
        let mut emitted = 0;
        while frac > 0.0 && emitted < 52 {
            frac *= radix as f64;
            let d = frac.trunc() as u32;
            out.push(std::char::from_digit(d, radix).unwrap_or('0'));
            frac -= d as f64;
            emitted += 1;
        }
    }
    if negative {
        format!("-{}", out)
    } else {
        out
    }
}

fn parse_int(input: &str, radix: f64) -> f64 {
    let mut s = js_trim_start(input);
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let mut radix = to_uint32(radix);
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0f64;
    let mut any = false;
    for c in s.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                value = value * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if any {
        sign * value
    } else {
        f64::NAN
    }
}

fn parse_float(input: &str) -> f64 {
    let s = js_trim_start(input);
    for (prefix, value) in [
        ("Infinity", f64::INFINITY),
        ("+Infinity", f64::INFINITY),
        ("-Infinity", f64::NEG_INFINITY),
    ] {
        if s.starts_with(prefix) {
            return value;
        }
    }
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    string_to_number(&s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_follows_prefix_rules() {
        assert_eq!(parse_int("  42px", 0.0), 42.0);
        assert_eq!(parse_int("0x1F", 0.0), 31.0);
        assert_eq!(parse_int("-101", 2.0), -5.0);
        assert!(parse_int("px", 10.0).is_nan());
    }

    #[test]
    fn parse_float_takes_longest_numeric_prefix() {
        assert_eq!(parse_float("3.25abc"), 3.25);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert!(parse_float("abc").is_nan());
    }

    #[test]
    fn to_fixed_rounds_ties_away_from_zero() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(0.125, 2), "0.13");
        assert_eq!(to_fixed(-0.0001, 2), "0.00");
        assert_eq!(to_fixed(12.0, 3), "12.000");
    }

    #[test]
    fn radix_strings() {
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.0, 2), "-101");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
    }
}
