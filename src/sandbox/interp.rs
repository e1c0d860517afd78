//! Tree-walking evaluator.

use super::ast::*;
use super::value::{
    loose_equals, strict_equals, to_int32, to_json, to_uint32, Env, Function,
    Object, Scope, Value,
};
use super::{Bindings, SandboxError, SandboxLimits};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Non-local exits threaded through evaluation.
pub(crate) enum Interrupt {
    Error(SandboxError),
    Thrown(Value),
    /// `a?.b` hit a nullish base; unwinds to the enclosing chain boundary.
    ShortCircuit,
}

impl From<SandboxError> for Interrupt {
    fn from(err: SandboxError) -> Self {
        Interrupt::Error(err)
    }
}

pub(crate) type Eval<T> = Result<T, Interrupt>;

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Assignable location.
enum Place {
    Variable(String),
    Property(Value, String),
}

pub(crate) struct Interpreter {
    pub(super) limits: SandboxLimits,
    steps: u64,
    depth: usize,
    globals: Env,
    /// Every scope created during the run; cleared on drop to break closure cycles.
    scopes: Vec<Env>,
}

impl Interpreter {
    pub fn new(limits: SandboxLimits, bindings: &Bindings) -> Self {
        let globals = Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: None,
            this: Some(Value::Undefined),
            function_scope: true,
        }));
        for (name, value) in super::builtins::globals() {
            Scope::declare(&globals, name, value, true);
        }
        for (name, value) in bindings.iter() {
            Scope::declare(&globals, name, super::value::from_json(value), true);
        }
        Self {
            limits,
            steps: 0,
            depth: 0,
            globals: globals.clone(),
            scopes: vec![globals],
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn run(&mut self, expr: &Expr) -> Result<Json, SandboxError> {
        let globals = self.globals.clone();
        match self.eval(expr, &globals) {
            Ok(value) => Ok(to_json(&value, 0)?.unwrap_or(Json::Null)),
            Err(Interrupt::Error(err)) => Err(err),
            Err(Interrupt::Thrown(value)) => Err(SandboxError::Thrown(describe_thrown(&value))),
            Err(Interrupt::ShortCircuit) => Ok(Json::Null),
        }
    }

    fn tick(&mut self) -> Eval<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(SandboxError::LimitExceeded(format!(
                "step budget of {} exhausted",
                self.limits.max_steps
            ))
            .into());
        }
        Ok(())
    }

    pub(super) fn check_string_len(&self, units: usize) -> Eval<()> {
        if units > self.limits.max_string_len {
            return Err(SandboxError::LimitExceeded(format!(
                "string of {} code units exceeds limit of {}",
                units, self.limits.max_string_len
            ))
            .into());
        }
        Ok(())
    }

    pub(super) fn check_array_len(&self, len: usize) -> Eval<()> {
        if len > self.limits.max_array_len {
            return Err(SandboxError::LimitExceeded(format!(
                "array of {} elements exceeds limit of {}",
                len, self.limits.max_array_len
            ))
            .into());
        }
        Ok(())
    }

    fn new_scope(&mut self, parent: &Env, this: Option<Value>, function_scope: bool) -> Env {
        let scope = Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            this,
            function_scope,
        }));
        self.scopes.push(scope.clone());
        scope
    }

    pub(super) fn make_string(&self, s: String) -> Eval<Value> {
        // UTF-8 length bounds UTF-16 length from above.
        if s.len() > self.limits.max_string_len {
            self.check_string_len(s.encode_utf16().count())?;
        }
        Ok(Value::str(s))
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr, env: &Env) -> Eval<Value> {
        self.tick()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Template(quasis, exprs) => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = exprs.get(i) {
                        let v = self.eval(e, env)?;
                        out.push_str(&v.to_js_string());
                    }
                }
                self.make_string(out)
            }
            Expr::Ident(name) => Scope::lookup(env, name).ok_or_else(|| {
                SandboxError::Reference(format!("{} is not defined", name)).into()
            }),
            Expr::This => Ok(Scope::this_of(env)),
            Expr::Array(elems) => {
                let items = self.eval_elements(elems, env)?;
                Ok(Value::array(items))
            }
            Expr::Object(props) => self.eval_object(props, env),
            Expr::Function(def) => Ok(Value::Function(Rc::new(Function::Closure {
                def: def.clone(),
                env: env.clone(),
            }))),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand, env),
            Expr::Delete(target) => match &**target {
                Expr::Member {
                    object, property, ..
                } => {
                    let obj = self.eval(object, env)?;
                    let key = self.eval_key(property, env)?;
                    Ok(Value::Bool(self.delete_property(&obj, &key)?))
                }
                Expr::Ident(_) => Ok(Value::Bool(false)),
                other => {
                    self.eval(other, env)?;
                    Ok(Value::Bool(true))
                }
            },
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let place = self.resolve_place(target, env)?;
                let old = self.read_place(&place, env)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_place(place, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(..) => self.eval_binary_chain(expr, env),
            Expr::Logical(op, lhs, rhs) => {
                let l = self.eval(lhs, env)?;
                let short = match op {
                    LogicalOp::And => !l.truthy(),
                    LogicalOp::Or => l.truthy(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if short {
                    Ok(l)
                } else {
                    self.eval(rhs, env)
                }
            }
            Expr::Assign(op, target, value) => self.eval_assign(*op, target, value, env),
            Expr::Conditional(test, then, otherwise) => {
                if self.eval(test, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (func, this, label) = match &**callee {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let obj = self.eval(object, env)?;
                        if *member_optional && obj.is_nullish() {
                            return Err(Interrupt::ShortCircuit);
                        }
                        let key = self.eval_key(property, env)?;
                        let func = self.get_property(&obj, &key)?;
                        (func, obj, key)
                    }
                    other => {
                        let func = self.eval(other, env)?;
                        let label = match other {
                            Expr::Ident(name) => name.clone(),
                            _ => "expression".to_string(),
                        };
                        (func, Value::Undefined, label)
                    }
                };
                if *optional && func.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let args = self.eval_elements(args, env)?;
                if !func.is_function() {
                    return Err(
                        SandboxError::Type(format!("{} is not a function", label)).into()
                    );
                }
                self.call(&func, this, args)
            }
            Expr::New(callee, args) => {
                let func = self.eval(callee, env)?;
                let args = self.eval_elements(args, env)?;
                self.construct(&func, args)
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let obj = self.eval(object, env)?;
                if *optional && obj.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let key = self.eval_key(property, env)?;
                self.get_property(&obj, &key)
            }
            Expr::OptionalChain(inner) => match self.eval(inner, env) {
                Err(Interrupt::ShortCircuit) => Ok(Value::Undefined),
                other => other,
            },
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval(e, env)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_key(&mut self, key: &PropKey, env: &Env) -> Eval<String> {
        match key {
            PropKey::Static(name) => Ok(name.clone()),
            PropKey::Computed(expr) => Ok(self.eval(expr, env)?.to_property_key()),
        }
    }

    fn eval_elements(&mut self, elems: &[ArrayElem], env: &Env) -> Eval<Vec<Value>> {
        let mut out = Vec::with_capacity(elems.len());
        for elem in elems {
            match elem {
                ArrayElem::Hole => out.push(Value::Undefined),
                ArrayElem::Item(e) => out.push(self.eval(e, env)?),
                ArrayElem::Spread(e) => {
                    let v = self.eval(e, env)?;
                    out.extend(self.iterate(&v)?);
                }
            }
            self.check_array_len(out.len())?;
        }
        Ok(out)
    }

    fn eval_object(&mut self, props: &[ObjectProp], env: &Env) -> Eval<Value> {
        let mut object = Object::default();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, value) => {
                    let key = self.eval_key(key, env)?;
                    let value = self.eval(value, env)?;
                    object.set(key, value);
                }
                ObjectProp::Spread(source) => match self.eval(source, env)? {
                    Value::Object(src) => {
                        for (k, v) in src.borrow().entries() {
                            object.set(k.clone(), v.clone());
                        }
                    }
                    Value::Array(src) => {
                        for (i, v) in src.borrow().iter().enumerate() {
                            object.set(i.to_string(), v.clone());
                        }
                    }
                    Value::Str(s) => {
                        for (i, unit) in s.encode_utf16().enumerate() {
                            object.set(
                                i.to_string(),
                                Value::str(super::value::from_utf16(&[unit])),
                            );
                        }
                    }
                    _ => {}
                },
            }
        }
        Ok(Value::object(object))
    }

    /// `((a + b) + c) + ...` folded left to right without recursing down the spine.
    fn eval_binary_chain(&mut self, expr: &Expr, env: &Env) -> Eval<Value> {
        let mut links = Vec::new();
        let mut leftmost = expr;
        while let Expr::Binary(op, lhs, rhs) = leftmost {
            links.push((*op, &**rhs));
            leftmost = &**lhs;
        }
        let mut acc = self.eval(leftmost, env)?;
        for (op, rhs) in links.into_iter().rev() {
            let r = self.eval(rhs, env)?;
            acc = self.binary(op, acc, r)?;
        }
        Ok(acc)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> Eval<Value> {
        if op == UnaryOp::Typeof {
            if let Expr::Ident(name) = operand {
                return Ok(Value::str(
                    Scope::lookup(env, name)
                        .map(|v| v.type_of())
                        .unwrap_or("undefined"),
                ));
            }
        }
        let v = self.eval(operand, env)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!v.truthy()),
            UnaryOp::Neg => Value::Number(-v.to_number()),
            UnaryOp::Plus => Value::Number(v.to_number()),
            UnaryOp::BitNot => Value::Number(!to_int32(v.to_number()) as f64),
            UnaryOp::Typeof => Value::str(v.type_of()),
            UnaryOp::Void => Value::Undefined,
        })
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, env: &Env) -> Eval<Value> {
        let place = self.resolve_place(target, env)?;
        let result = match op {
            AssignOp::Assign => self.eval(value, env)?,
            AssignOp::Binary(bin) => {
                let old = self.read_place(&place, env)?;
                let rhs = self.eval(value, env)?;
                self.binary(bin, old, rhs)?
            }
            AssignOp::Logical(logical) => {
                let old = self.read_place(&place, env)?;
                let keep = match logical {
                    LogicalOp::And => !old.truthy(),
                    LogicalOp::Or => old.truthy(),
                    LogicalOp::Nullish => !old.is_nullish(),
                };
                if keep {
                    return Ok(old);
                }
                self.eval(value, env)?
            }
        };
        self.write_place(place, result.clone(), env)?;
        Ok(result)
    }

    fn resolve_place(&mut self, target: &Expr, env: &Env) -> Eval<Place> {
        match target {
            Expr::Ident(name) => Ok(Place::Variable(name.clone())),
            Expr::Member {
                object, property, ..
            } => {
                let obj = self.eval(object, env)?;
                let key = self.eval_key(property, env)?;
                Ok(Place::Property(obj, key))
            }
            _ => Err(SandboxError::Syntax {
                pos: 0,
                message: "invalid assignment target".into(),
            }
            .into()),
        }
    }

    fn read_place(&mut self, place: &Place, env: &Env) -> Eval<Value> {
        match place {
            Place::Variable(name) => Scope::lookup(env, name).ok_or_else(|| {
                SandboxError::Reference(format!("{} is not defined", name)).into()
            }),
            Place::Property(obj, key) => self.get_property(obj, key),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, env: &Env) -> Eval<()> {
        match place {
            Place::Variable(name) => {
                if !Scope::assign(env, &name, value.clone())? {
                    // Sloppy-mode implicit global, confined to this run.
                    Scope::declare(&self.globals, &name, value, true);
                }
                Ok(())
            }
            Place::Property(obj, key) => self.set_property(&obj, key, value),
        }
    }

    pub(super) fn binary(&mut self, op: BinaryOp, l: Value, r: Value) -> Eval<Value> {
        Ok(match op {
            BinaryOp::Add => {
                let (lp, rp) = (l.to_primitive(), r.to_primitive());
                if matches!(lp, Value::Str(_)) || matches!(rp, Value::Str(_)) {
                    let mut s = lp.to_js_string();
                    s.push_str(&rp.to_js_string());
                    self.make_string(s)?
                } else {
                    Value::Number(lp.to_number() + rp.to_number())
                }
            }
            BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
            BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
            BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
            BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
            BinaryOp::Exp => Value::Number(js_pow(l.to_number(), r.to_number())),
            BinaryOp::Eq => Value::Bool(loose_equals(&l, &r)),
            BinaryOp::NotEq => Value::Bool(!loose_equals(&l, &r)),
            BinaryOp::StrictEq => Value::Bool(strict_equals(&l, &r)),
            BinaryOp::StrictNotEq => Value::Bool(!strict_equals(&l, &r)),
            BinaryOp::Lt => Value::Bool(compare(&l, &r) == Some(std::cmp::Ordering::Less)),
            BinaryOp::Gt => Value::Bool(compare(&l, &r) == Some(std::cmp::Ordering::Greater)),
            BinaryOp::LtEq => Value::Bool(matches!(
                compare(&l, &r),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            )),
            BinaryOp::GtEq => Value::Bool(matches!(
                compare(&l, &r),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            )),
            BinaryOp::BitAnd => {
                Value::Number((to_int32(l.to_number()) & to_int32(r.to_number())) as f64)
            }
            BinaryOp::BitOr => {
                Value::Number((to_int32(l.to_number()) | to_int32(r.to_number())) as f64)
            }
            BinaryOp::BitXor => {
                Value::Number((to_int32(l.to_number()) ^ to_int32(r.to_number())) as f64)
            }
            BinaryOp::Shl => {
                let shift = to_uint32(r.to_number()) & 31;
                Value::Number(to_int32(l.to_number()).wrapping_shl(shift) as f64)
            }
            BinaryOp::Shr => {
                let shift = to_uint32(r.to_number()) & 31;
                Value::Number((to_int32(l.to_number()) >> shift) as f64)
            }
            BinaryOp::UShr => {
                let shift = to_uint32(r.to_number()) & 31;
                Value::Number((to_uint32(l.to_number()) >> shift) as f64)
            }
            BinaryOp::In => {
                let key = l.to_property_key();
                match &r {
                    Value::Object(o) => Value::Bool(o.borrow().contains(&key)),
                    Value::Array(a) => Value::Bool(
                        key == "length"
                            || super::value::array_index(&key)
                                .map(|i| i < a.borrow().len())
                                .unwrap_or(false),
                    ),
                    _ => {
                        return Err(SandboxError::Type(format!(
                            "Cannot use 'in' operator to search for '{}' in {}",
                            key,
                            r.to_js_string()
                        ))
                        .into())
                    }
                }
            }
        })
    }

    /// Values produced by spreading or `for...of`.
    pub(super) fn iterate(&mut self, value: &Value) -> Eval<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(SandboxError::Type(format!(
                "{} is not iterable",
                other.to_js_string()
            ))
            .into()),
        }
    }

    // ---- calls ----

    pub(super) fn call(&mut self, func: &Value, this: Value, args: Vec<Value>) -> Eval<Value> {
        let Value::Function(f) = func else {
            return Err(SandboxError::Type(format!(
                "{} is not a function",
                func.to_js_string()
            ))
            .into());
        };
        self.depth += 1;
        if self.depth > self.limits.max_call_depth {
            self.depth -= 1;
            return Err(SandboxError::LimitExceeded(format!(
                "call depth exceeds {}",
                self.limits.max_call_depth
            ))
            .into());
        }
        let result = match &**f {
            Function::Closure { def, env } => self.call_closure(func, def, env, this, args),
            Function::Builtin(name) => self.call_builtin(name, this, args),
            Function::Method { receiver, name } => self.call_method(receiver, name, args),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        callee: &Value,
        def: &Rc<FunctionDef>,
        closure_env: &Env,
        this: Value,
        args: Vec<Value>,
    ) -> Eval<Value> {
        let this = if def.is_arrow { None } else { Some(this) };
        let scope = self.new_scope(closure_env, this, true);
        if !def.is_arrow {
            if let Some(name) = &def.name {
                Scope::declare(&scope, name, callee.clone(), true);
            }
            Scope::declare(&scope, "arguments", Value::array(args.clone()), true);
        }
        for (i, param) in def.params.iter().enumerate() {
            let value = if param.rest {
                Value::array(args.get(i..).map(|s| s.to_vec()).unwrap_or_default())
            } else {
                let v = args.get(i).cloned().unwrap_or(Value::Undefined);
                match (&v, &param.default) {
                    (Value::Undefined, Some(default)) => self.eval(default, &scope)?,
                    _ => v,
                }
            };
            Scope::declare(&scope, &param.name, value, true);
        }
        match &def.body {
            FunctionBody::Expr(e) => self.eval(e, &scope),
            FunctionBody::Block(stmts) => {
                hoist_vars(stmts, &scope);
                match self.exec_block(stmts, &scope)? {
                    Completion::Return(v) => Ok(v),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    fn construct(&mut self, func: &Value, args: Vec<Value>) -> Eval<Value> {
        match func {
            Value::Function(f) => match &**f {
                Function::Builtin(name) => self.construct_builtin(name, args),
                Function::Closure { def, .. } if !def.is_arrow => {
                    let instance = Value::object(Object::default());
                    let result = self.call(func, instance.clone(), args)?;
                    Ok(match result {
                        Value::Object(_) | Value::Array(_) => result,
                        _ => instance,
                    })
                }
                _ => Err(SandboxError::Type(format!("{} is not a constructor", f.name())).into()),
            },
            other => Err(SandboxError::Type(format!(
                "{} is not a constructor",
                other.to_js_string()
            ))
            .into()),
        }
    }

    // ---- statements ----

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Env) -> Eval<Completion> {
        for stmt in stmts {
            if let Stmt::Function(name, def) = stmt {
                self.declare_function(name, def, scope);
            }
        }
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_scoped(&mut self, stmts: &[Stmt], env: &Env) -> Eval<Completion> {
        let scope = self.new_scope(env, None, false);
        self.exec_block(stmts, &scope)
    }

    fn declare_function(&mut self, name: &str, def: &Rc<FunctionDef>, scope: &Env) {
        let closure = Value::Function(Rc::new(Function::Closure {
            def: def.clone(),
            env: scope.clone(),
        }));
        Scope::declare(scope, name, closure, true);
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Eval<Completion> {
        self.tick()?;
        match stmt {
            Stmt::Empty | Stmt::Function(..) => Ok(Completion::Normal),
            Stmt::Expr(e) => {
                self.eval(e, env)?;
                Ok(Completion::Normal)
            }
            Stmt::Decl(kind, decls) => {
                for (name, init) in decls {
                    let value = match init {
                        Some(e) => Some(self.eval(e, env)?),
                        None => None,
                    };
                    self.declare(*kind, name, value, env)?;
                }
                Ok(Completion::Normal)
            }
            Stmt::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(e, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(v))
            }
            Stmt::If(test, then, otherwise) => {
                if self.eval(test, env)?.truthy() {
                    self.exec_nested(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.exec_nested(otherwise, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Block(stmts) => self.exec_scoped(stmts, env),
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let scope = self.new_scope(env, None, false);
                if let Some(init) = init {
                    self.exec(init, &scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_nested(body, &scope)? {
                        Completion::Break => break,
                        ret @ Completion::Return(_) => return Ok(ret),
                        Completion::Continue | Completion::Normal => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                    self.tick()?;
                }
                Ok(Completion::Normal)
            }
            Stmt::ForEach {
                kind,
                name,
                of,
                iterable,
                body,
            } => {
                let source = self.eval(iterable, env)?;
                let items = if *of {
                    self.iterate(&source)?
                } else {
                    keys_of(&source).into_iter().map(Value::str).collect()
                };
                for item in items {
                    let scope = self.new_scope(env, None, false);
                    match kind {
                        Some(kind) => self.declare(*kind, name, Some(item), &scope)?,
                        None => {
                            self.write_place(Place::Variable(name.clone()), item, &scope)?
                        }
                    }
                    match self.exec_nested(body, &scope)? {
                        Completion::Break => break,
                        ret @ Completion::Return(_) => return Ok(ret),
                        Completion::Continue | Completion::Normal => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::While(test, body) => {
                while self.eval(test, env)?.truthy() {
                    match self.exec_nested(body, env)? {
                        Completion::Break => break,
                        ret @ Completion::Return(_) => return Ok(ret),
                        Completion::Continue | Completion::Normal => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile(body, test) => {
                loop {
                    match self.exec_nested(body, env)? {
                        Completion::Break => break,
                        ret @ Completion::Return(_) => return Ok(ret),
                        Completion::Continue | Completion::Normal => {}
                    }
                    if !self.eval(test, env)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Throw(e) => {
                let v = self.eval(e, env)?;
                Err(Interrupt::Thrown(v))
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let result = match (self.exec_scoped(block, env), handler) {
                    (Err(interrupt), Some(handler)) => match catchable(interrupt) {
                        Ok(exception) => {
                            let scope = self.new_scope(env, None, false);
                            if let Some(param) = param {
                                Scope::declare(&scope, param, exception, true);
                            }
                            self.exec_block(handler, &scope)
                        }
                        Err(fatal) => Err(fatal),
                    },
                    (other, _) => other,
                };
                if let Some(finalizer) = finalizer {
                    match self.exec_scoped(finalizer, env)? {
                        Completion::Normal => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                result
            }
        }
    }

    /// Runs a statement in statement position (if/loop bodies).
    fn exec_nested(&mut self, stmt: &Stmt, env: &Env) -> Eval<Completion> {
        match stmt {
            Stmt::Function(name, def) => {
                self.declare_function(name, def, env);
                Ok(Completion::Normal)
            }
            other => self.exec(other, env),
        }
    }

    fn declare(&mut self, kind: DeclKind, name: &str, value: Option<Value>, env: &Env) -> Eval<()> {
        match kind {
            DeclKind::Var => {
                let scope = Scope::function_scope_of(env);
                let existing = scope.borrow().vars.contains_key(name);
                match value {
                    Some(v) => Scope::declare(&scope, name, v, true),
                    None if !existing => Scope::declare(&scope, name, Value::Undefined, true),
                    None => {}
                }
            }
            DeclKind::Let | DeclKind::Const => {
                Scope::declare(
                    env,
                    name,
                    value.unwrap_or(Value::Undefined),
                    kind == DeclKind::Let,
                );
            }
        }
        Ok(())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for scope in self.scopes.drain(..) {
            if let Ok(mut scope) = scope.try_borrow_mut() {
                scope.vars.clear();
                scope.parent = None;
            }
        }
    }
}

/// Pre-declares `var` bindings of a function body as `undefined`.
fn hoist_vars(stmts: &[Stmt], scope: &Env) {
    for stmt in stmts {
        match stmt {
            Stmt::Decl(DeclKind::Var, decls) => {
                for (name, _) in decls {
                    if !scope.borrow().vars.contains_key(name) {
                        Scope::declare(scope, name, Value::Undefined, true);
                    }
                }
            }
            Stmt::If(_, then, otherwise) => {
                hoist_vars(std::slice::from_ref(then), scope);
                if let Some(otherwise) = otherwise {
                    hoist_vars(std::slice::from_ref(otherwise), scope);
                }
            }
            Stmt::Block(inner) => hoist_vars(inner, scope),
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    hoist_vars(std::slice::from_ref(init), scope);
                }
                hoist_vars(std::slice::from_ref(body), scope);
            }
            Stmt::ForEach {
                kind, name, body, ..
            } => {
                if *kind == Some(DeclKind::Var) && !scope.borrow().vars.contains_key(name) {
                    Scope::declare(scope, name, Value::Undefined, true);
                }
                hoist_vars(std::slice::from_ref(body), scope);
            }
            Stmt::While(_, body) | Stmt::DoWhile(body, _) => {
                hoist_vars(std::slice::from_ref(body), scope)
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                hoist_vars(block, scope);
                if let Some(h) = handler {
                    hoist_vars(h, scope);
                }
                if let Some(f) = finalizer {
                    hoist_vars(f, scope);
                }
            }
            _ => {}
        }
    }
}

/// Converts an interrupt into the value a `catch` clause receives, or passes
/// it through when the script may not observe it.
fn catchable(interrupt: Interrupt) -> Result<Value, Interrupt> {
    match interrupt {
        Interrupt::Thrown(v) => Ok(v),
        Interrupt::Error(SandboxError::Reference(msg)) => Ok(error_object("ReferenceError", &msg)),
        Interrupt::Error(SandboxError::Type(msg)) => Ok(error_object("TypeError", &msg)),
        Interrupt::Error(SandboxError::Range(msg)) => Ok(error_object("RangeError", &msg)),
        other => Err(other),
    }
}

pub(super) fn error_object(name: &str, message: &str) -> Value {
    let mut object = Object::default();
    object.set("name".into(), Value::str(name));
    object.set("message".into(), Value::str(message));
    Value::object(object)
}

fn describe_thrown(value: &Value) -> String {
    if let Value::Object(o) = value {
        let o = o.borrow();
        if let (Some(name), Some(message)) = (o.get("name"), o.get("message")) {
            return format!("{}: {}", name.to_js_string(), message.to_js_string());
        }
    }
    value.to_js_string()
}

pub(super) fn keys_of(value: &Value) -> Vec<String> {
    match value {
        Value::Object(o) => o.borrow().keys(),
        Value::Array(a) => (0..a.borrow().len()).map(|i| i.to_string()).collect(),
        Value::Str(s) => (0..s.encode_utf16().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn compare(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    let (lp, rp) = (l.to_primitive(), r.to_primitive());
    if let (Value::Str(a), Value::Str(b)) = (&lp, &rp) {
        return Some(a.encode_utf16().cmp(b.encode_utf16()));
    }
    lp.to_number().partial_cmp(&rp.to_number())
}

pub(super) fn js_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exp)
}
