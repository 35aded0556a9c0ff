//! Evaluator for Kiln scripts
//!
//! A lexically scoped s-expression interpreter. Errors are raised as
//! Scheme-style throws: a symbolic key plus an argument list, which the
//! decoder turns into diagnostics later. Nothing here panics on bad input.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use kiln_ast::ast::{format_number, write_string_literal, Datum, DatumKind, Form};
use kiln_ast::span::Pos;
use kiln_types::{ensure_sufficient_stack, EffectSet, Tree};

use crate::host::{Builtin, BuiltinRegistry, HostCtx};

/// Default limit on nested procedure calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Frames shown in a stack trace before the rest are elided.
const MAX_TRACE_FRAMES: usize = 20;

/// Runtime values
#[derive(Clone)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Symbol(String),
    /// Proper list; the empty list is `'()`.
    List(Rc<Vec<Value>>),
    /// Numeric expression over the axes and free variables
    Tree(Tree),
    /// Geometry-tree value: a distance field built by a shape constructor
    Shape(Tree),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// Result of `(values ...)` with other than one value
    Values(Rc<Vec<Value>>),
    Unspecified,
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Display,
    Write,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn nil() -> Self {
        Value::list(Vec::new())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Symbol(s.into())
    }

    /// Everything except `#f` counts as true.
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Convert quoted syntax into data.
    pub fn from_datum(d: &Datum) -> Value {
        match &d.kind {
            DatumKind::Number(n) => Value::Number(*n),
            DatumKind::Str(s) => Value::Str(s.clone()),
            DatumKind::Bool(b) => Value::Bool(*b),
            DatumKind::Symbol(s) => Value::Symbol(s.clone()),
            DatumKind::List(items) => Value::list(items.iter().map(Value::from_datum).collect()),
            DatumKind::Quote(inner) => {
                Value::list(vec![Value::symbol("quote"), Value::from_datum(inner)])
            }
        }
    }

    /// External representation, as `write` / `~S` prints it.
    pub fn written(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.render(&mut out, Mode::Write);
        out
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Tree(_) => "tree",
            Value::Shape(_) => "shape",
            Value::Closure(_) | Value::Builtin(_) => "procedure",
            Value::Values(_) => "values",
            Value::Unspecified => "unspecified",
        }
    }

    fn render(&self, f: &mut impl fmt::Write, mode: Mode) -> fmt::Result {
        ensure_sufficient_stack(|| match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Bool(true) => f.write_str("#t"),
            Value::Bool(false) => f.write_str("#f"),
            Value::Str(s) if mode == Mode::Write => write_string_literal(f, s),
            Value::Str(s) => f.write_str(s),
            Value::Symbol(s) => f.write_str(s),
            Value::List(items) => render_seq(f, "(", items, mode),
            Value::Values(items) => render_seq(f, "(values ", items, mode),
            Value::Tree(t) => write!(f, "#<tree {}>", t),
            Value::Shape(t) => write!(f, "#<shape {}>", t.id()),
            Value::Closure(c) => {
                f.write_str("#<procedure ")?;
                if let Some(name) = &c.name {
                    write!(f, "{} ", name)?;
                }
                f.write_str("(")?;
                f.write_str(&c.params.join(" "))?;
                if let Some(rest) = &c.rest {
                    if !c.params.is_empty() {
                        f.write_str(" ")?;
                    }
                    write!(f, ". {}", rest)?;
                }
                f.write_str(")>")
            }
            Value::Builtin(b) => write!(f, "#<primitive-procedure {}>", b.name),
            Value::Unspecified => f.write_str("#<unspecified>"),
        })
    }
}

fn render_seq(f: &mut impl fmt::Write, open: &str, items: &[Value], mode: Mode) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        item.render(f, mode)?;
    }
    f.write_str(")")
}

/// `display` / `~A` rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, Mode::Display)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, Mode::Write)
    }
}

/// User-defined procedure capturing its environment
#[derive(Clone)]
pub struct Closure {
    pub name: Option<String>,
    params: Vec<String>,
    rest: Option<String>,
    body: Rc<[Datum]>,
    env: Env,
}

impl Closure {
    fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| "#<procedure>".to_string())
    }
}

struct Frame {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

/// Lexical environment: a chain of shared, mutable frames.
#[derive(Clone)]
pub struct Env(Rc<Frame>);

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Env(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn child(&self) -> Self {
        Env(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.vars.borrow_mut().insert(name.into(), value);
    }

    /// Look a name up from the innermost frame outwards.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(v) = env.0.vars.borrow().get(name) {
                return Some(v.clone());
            }
            frame = env.0.parent.as_ref();
        }
        None
    }

    /// Assign an existing binding. Returns false if `name` is unbound.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(slot) = env.0.vars.borrow_mut().get_mut(name) {
                *slot = value;
                return true;
            }
            frame = env.0.parent.as_ref();
        }
        false
    }

    /// Whether `name` resolves to a binding in the outermost frame.
    pub fn is_global_binding(&self, name: &str) -> bool {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if env.0.vars.borrow().contains_key(name) {
                return env.0.parent.is_none();
            }
            frame = env.0.parent.as_ref();
        }
        false
    }

    /// Drop every binding in this frame.
    pub fn clear(&self) {
        self.0.vars.borrow_mut().clear();
    }
}

/// A throw in flight.
///
/// Standard throws carry `(message-or-format a b)`; the machine prefixes the
/// enclosing procedure name when it stamps the throw. Raw throws (`throw`)
/// keep their arguments exactly as given.
#[derive(Debug, Clone)]
pub struct Exn {
    pub key: String,
    args: Vec<Value>,
    standard: bool,
    stack: Option<String>,
}

impl Exn {
    pub fn new(key: &str, a: Value, b: Value, c: Value) -> Self {
        Self {
            key: key.to_string(),
            args: vec![a, b, c],
            standard: true,
            stack: None,
        }
    }

    pub fn raw(key: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            args,
            standard: false,
            stack: None,
        }
    }

    /// `(format-string format-args #f)` payload.
    pub fn misc(key: &str, fmt: &str, fmt_args: Vec<Value>) -> Self {
        Self::new(key, Value::str(fmt), Value::list(fmt_args), Value::Bool(false))
    }

    pub fn wrong_type(subr: &str, position: usize, value: &Value) -> Self {
        Self::misc(
            "wrong-type-arg",
            "Wrong type argument in position ~A to ~A: ~S",
            vec![
                Value::Number(position as f64),
                Value::symbol(subr),
                value.clone(),
            ],
        )
    }

    pub fn wrong_args(subr: &str) -> Self {
        Self::misc(
            "wrong-number-of-args",
            "Wrong number of arguments to ~A",
            vec![Value::symbol(subr)],
        )
    }

    pub fn overflow(operation: &str, operands: &[Value]) -> Self {
        Self::new(
            "numerical-overflow",
            Value::str("Numerical overflow"),
            Value::symbol(operation),
            Value::list(operands.to_vec()),
        )
    }

    pub fn syntax(message: &str, form: Value, subform: Value) -> Self {
        Self::new("syntax-error", Value::str(message), form, subform)
    }

    pub fn into_raw(self) -> RawError {
        let mut args = self.args;
        if self.standard && self.stack.is_none() {
            args.insert(0, Value::Bool(false));
        }
        RawError {
            key: self.key,
            args: Value::list(args),
            stack: self.stack.unwrap_or_default(),
        }
    }
}

/// Uninterpreted diagnostic handed out of the evaluator.
#[derive(Debug, Clone)]
pub struct RawError {
    pub key: String,
    pub args: Value,
    pub stack: String,
}

/// One free variable recorded during evaluation.
#[derive(Debug, Clone)]
pub struct VarSlot {
    pub tree: Tree,
    pub value: f64,
    pub row: u32,
    pub start_col: u32,
    pub end_col: u32,
}

/// Free variables keyed by their defining name.
pub type VarRegistry = BTreeMap<String, VarSlot>;

struct CallFrame {
    name: String,
    at: Pos,
    /// Named user-defined procedure (eligible as the "who" of a throw)
    named: bool,
}

fn is_special_form(name: &str) -> bool {
    matches!(
        name,
        "quote"
            | "if"
            | "define"
            | "set!"
            | "lambda"
            | "let"
            | "let*"
            | "begin"
            | "and"
            | "or"
            | "cond"
            | "when"
            | "unless"
            | "lambda-shape"
    )
}

/// The interpreter state for one evaluation call.
pub struct Machine {
    host: Arc<BuiltinRegistry>,
    allowed: EffectSet,
    max_call_depth: usize,
    frames: Vec<CallFrame>,
    /// Environments captured by closures; cleared by `release`.
    captured: Vec<Weak<Frame>>,
    registry: VarRegistry,
    ctx: HostCtx,
}

impl Machine {
    pub fn new(host: Arc<BuiltinRegistry>, allowed: EffectSet, max_call_depth: usize) -> Self {
        Self {
            host,
            allowed,
            max_call_depth,
            frames: Vec::new(),
            captured: Vec::new(),
            registry: VarRegistry::new(),
            ctx: HostCtx::new(),
        }
    }

    /// Fresh global environment holding only the allowed builtins.
    pub fn global_env(&self) -> Env {
        let env = Env::new();
        self.host.bind(&env, self.allowed);
        env
    }

    /// Break the closure/environment reference cycles built up while
    /// evaluating. Values still held elsewhere lose their bindings.
    pub fn release(&mut self, global: &Env) {
        global.clear();
        for frame in self.captured.drain(..) {
            if let Some(frame) = frame.upgrade() {
                Env(frame).clear();
            }
        }
    }

    fn capture(&mut self, env: &Env) -> Env {
        self.captured.push(Rc::downgrade(&env.0));
        env.clone()
    }

    pub fn registry(&self) -> &VarRegistry {
        &self.registry
    }

    pub fn into_parts(self) -> (VarRegistry, String) {
        (self.registry, self.ctx.output)
    }

    /// Evaluate one top-level form, yielding its values.
    pub fn eval_toplevel(&mut self, form: &Form, env: &Env) -> Result<Vec<Value>, RawError> {
        self.frames.clear();
        if let Some(v) = self.define_free_variable(&form.datum, env) {
            return Ok(vec![v]);
        }
        match self.eval(&form.datum, env) {
            Ok(Value::Values(vs)) => Ok(vs.to_vec()),
            Ok(v) => Ok(vec![v]),
            Err(e) => Err(e.into_raw()),
        }
    }

    /// `(define name <number literal>)` at top level binds a free variable.
    /// Redefining a name keeps its tree (and id) and overwrites the value.
    fn define_free_variable(&mut self, d: &Datum, env: &Env) -> Option<Value> {
        let [head, name, literal] = d.as_list()? else {
            return None;
        };
        if head.as_symbol()? != "define" {
            return None;
        }
        let name = name.as_symbol()?;
        let value = literal.as_number()?;

        let tree = match self.registry.get(name) {
            Some(slot) => slot.tree.clone(),
            None => Tree::var(),
        };
        tracing::trace!(target: "kiln::sandbox", name, value, id = tree.id().0, "free variable");
        self.registry.insert(
            name.to_string(),
            VarSlot {
                tree: tree.clone(),
                value,
                row: literal.range.start_row,
                start_col: literal.range.start_col,
                end_col: literal.range.end_col,
            },
        );
        env.define(name, Value::Tree(tree));
        Some(Value::Unspecified)
    }

    /// `name` still resolves to the global free-variable tree it was
    /// defined as.
    fn is_free_variable(&self, name: &str, env: &Env) -> bool {
        let Some(slot) = self.registry.get(name) else {
            return false;
        };
        env.is_global_binding(name)
            && matches!(env.lookup(name), Some(Value::Tree(t)) if t == slot.tree)
    }

    /// `set!` on a free variable changes its recorded value; the binding
    /// stays the variable so later shapes keep depending on it.
    fn set_free_variable(&mut self, name: &str, v: Value) -> Result<Value, Exn> {
        let Value::Number(n) = v else {
            return Err(self.raise(Exn::wrong_type("set!", 2, &v)));
        };
        if let Some(slot) = self.registry.get_mut(name) {
            slot.value = n;
        }
        Ok(Value::Unspecified)
    }

    /// Attach the stack trace and the enclosing procedure name, once.
    fn raise(&self, mut exn: Exn) -> Exn {
        if exn.stack.is_some() {
            return exn;
        }
        exn.stack = Some(self.render_stack());
        if exn.standard {
            let who = self
                .frames
                .iter()
                .rev()
                .find(|f| f.named)
                .map(|f| Value::str(f.name.clone()))
                .unwrap_or(Value::Bool(false));
            exn.args.insert(0, who);
        }
        exn
    }

    fn render_stack(&self) -> String {
        let mut lines: Vec<String> = self
            .frames
            .iter()
            .enumerate()
            .rev()
            .take(MAX_TRACE_FRAMES)
            .map(|(depth, f)| format!("{}: {} at {}", depth, f.name, f.at))
            .collect();
        if self.frames.len() > MAX_TRACE_FRAMES {
            lines.push(format!(
                "... {} more frames",
                self.frames.len() - MAX_TRACE_FRAMES
            ));
        }
        lines.join("\n")
    }

    fn enter(&mut self, name: String, at: Pos, named: bool) -> Result<(), Exn> {
        if self.frames.len() >= self.max_call_depth {
            return Err(self.raise(Exn::misc(
                "stack-overflow",
                "Stack overflow (call depth limit ~A)",
                vec![Value::Number(self.max_call_depth as f64)],
            )));
        }
        self.frames.push(CallFrame { name, at, named });
        Ok(())
    }

    fn syntax_error(&self, message: &str, form: &Datum, subform: Option<&Datum>) -> Exn {
        self.raise(Exn::syntax(
            message,
            Value::from_datum(form),
            subform.map(Value::from_datum).unwrap_or(Value::Bool(false)),
        ))
    }

    pub fn eval(&mut self, d: &Datum, env: &Env) -> Result<Value, Exn> {
        ensure_sufficient_stack(|| match &d.kind {
            DatumKind::Number(n) => Ok(Value::Number(*n)),
            DatumKind::Str(s) => Ok(Value::Str(s.clone())),
            DatumKind::Bool(b) => Ok(Value::Bool(*b)),
            DatumKind::Quote(inner) => Ok(Value::from_datum(inner)),
            DatumKind::Symbol(name) => self.lookup(name, env),
            DatumKind::List(items) => self.eval_list(d, items, env),
        })
    }

    fn lookup(&self, name: &str, env: &Env) -> Result<Value, Exn> {
        if let Some(v) = env.lookup(name) {
            return Ok(v);
        }
        if let Some(denied) = self.host.denied(name, self.allowed) {
            let effects: Vec<&str> = denied.iter().map(|e| e.name()).collect();
            return Err(self.raise(Exn::misc(
                "sandbox-violation",
                "~A requires the ~A effect, which this sandbox does not allow",
                vec![Value::symbol(name), Value::str(effects.join(", "))],
            )));
        }
        Err(self.raise(Exn::misc(
            "unbound-variable",
            "Unbound variable: ~S",
            vec![Value::symbol(name)],
        )))
    }

    fn eval_list(&mut self, form: &Datum, items: &[Datum], env: &Env) -> Result<Value, Exn> {
        let Some((head, rest)) = items.split_first() else {
            return Err(self.syntax_error("Illegal empty combination", form, None));
        };
        if let Some(keyword) = head.as_symbol().filter(|k| is_special_form(k)) {
            return self.eval_special(keyword, form, rest, env);
        }

        let f = self.eval(head, env)?;
        let mut args = Vec::with_capacity(rest.len());
        for arg in rest {
            args.push(self.eval(arg, env)?);
        }
        self.apply(&f, args, form)
    }

    fn eval_special(
        &mut self,
        keyword: &str,
        form: &Datum,
        rest: &[Datum],
        env: &Env,
    ) -> Result<Value, Exn> {
        match keyword {
            "quote" => match rest {
                [datum] => Ok(Value::from_datum(datum)),
                _ => Err(self.syntax_error("bad quote", form, None)),
            },
            "if" => match rest {
                [test, then_] => {
                    if self.eval(test, env)?.is_true() {
                        self.eval(then_, env)
                    } else {
                        Ok(Value::Unspecified)
                    }
                }
                [test, then_, else_] => {
                    if self.eval(test, env)?.is_true() {
                        self.eval(then_, env)
                    } else {
                        self.eval(else_, env)
                    }
                }
                _ => Err(self.syntax_error("bad if", form, None)),
            },
            "define" => self.eval_define(form, rest, env),
            "set!" => match rest {
                [target, value] => {
                    let Some(name) = target.as_symbol() else {
                        return Err(self.syntax_error("bad set!", form, Some(target)));
                    };
                    let v = self.eval(value, env)?;
                    if self.is_free_variable(name, env) {
                        return self.set_free_variable(name, v);
                    }
                    if env.set(name, v) {
                        Ok(Value::Unspecified)
                    } else {
                        Err(self.raise(Exn::misc(
                            "unbound-variable",
                            "Unbound variable: ~S",
                            vec![Value::symbol(name)],
                        )))
                    }
                }
                _ => Err(self.syntax_error("bad set!", form, None)),
            },
            "lambda" => match rest {
                [formals, body @ ..] if !body.is_empty() => {
                    let (params, rest_param) = match &formals.kind {
                        DatumKind::Symbol(all) => (Vec::new(), Some(all.clone())),
                        DatumKind::List(items) => self.parse_formals(form, items)?,
                        _ => return Err(self.syntax_error("bad lambda", form, Some(formals))),
                    };
                    Ok(Value::Closure(Rc::new(Closure {
                        name: None,
                        params,
                        rest: rest_param,
                        body: body.to_vec().into(),
                        env: self.capture(env),
                    })))
                }
                _ => Err(self.syntax_error("bad lambda", form, None)),
            },
            "let" => self.eval_let(form, rest, env),
            "let*" => {
                let [bindings, body @ ..] = rest else {
                    return Err(self.syntax_error("bad let*", form, None));
                };
                let pairs = self.parse_bindings(form, bindings)?;
                let scope = env.child();
                for (name, init) in pairs {
                    let v = self.eval(init, &scope)?;
                    scope.define(name, v);
                }
                self.eval_body(body, &scope)
            }
            "begin" => self.eval_body(rest, env),
            "and" => {
                let mut last = Value::Bool(true);
                for expr in rest {
                    last = self.eval(expr, env)?;
                    if !last.is_true() {
                        break;
                    }
                }
                Ok(last)
            }
            "or" => {
                for expr in rest {
                    let v = self.eval(expr, env)?;
                    if v.is_true() {
                        return Ok(v);
                    }
                }
                Ok(Value::Bool(false))
            }
            "cond" => self.eval_cond(form, rest, env),
            "when" | "unless" => {
                let [test, body @ ..] = rest else {
                    return Err(self.syntax_error(&format!("bad {}", keyword), form, None));
                };
                let hit = self.eval(test, env)?.is_true();
                if hit == (keyword == "when") {
                    self.eval_body(body, env)
                } else {
                    Ok(Value::Unspecified)
                }
            }
            "lambda-shape" => self.eval_lambda_shape(form, rest, env),
            _ => Err(self.syntax_error("unknown special form", form, None)),
        }
    }

    fn eval_define(&mut self, form: &Datum, rest: &[Datum], env: &Env) -> Result<Value, Exn> {
        match rest {
            [target, value] if target.as_symbol().is_some() => {
                let name = target.as_symbol().unwrap_or_default().to_string();
                let v = match self.eval(value, env)? {
                    Value::Closure(c) if c.name.is_none() => {
                        let mut named = (*c).clone();
                        named.name = Some(name.clone());
                        Value::Closure(Rc::new(named))
                    }
                    other => other,
                };
                env.define(name, v);
                Ok(Value::Unspecified)
            }
            [target, body @ ..] if !body.is_empty() => {
                let Some([name, formals @ ..]) = target.as_list() else {
                    return Err(self.syntax_error("bad define", form, Some(target)));
                };
                let Some(name) = name.as_symbol() else {
                    return Err(self.syntax_error("bad define", form, Some(name)));
                };
                let (params, rest_param) = self.parse_formals(form, formals)?;
                let closure = Closure {
                    name: Some(name.to_string()),
                    params,
                    rest: rest_param,
                    body: body.to_vec().into(),
                    env: self.capture(env),
                };
                env.define(name, Value::Closure(Rc::new(closure)));
                Ok(Value::Unspecified)
            }
            _ => Err(self.syntax_error("bad define", form, None)),
        }
    }

    /// `(a b . rest)` as read: symbols, with `.` introducing a rest parameter.
    fn parse_formals(
        &self,
        form: &Datum,
        items: &[Datum],
    ) -> Result<(Vec<String>, Option<String>), Exn> {
        let mut params = Vec::new();
        let mut iter = items.iter();
        while let Some(item) = iter.next() {
            let Some(name) = item.as_symbol() else {
                return Err(self.syntax_error("bad formals", form, Some(item)));
            };
            if name == "." {
                let (Some(rest), None) = (iter.next(), iter.next()) else {
                    return Err(self.syntax_error("bad formals", form, Some(item)));
                };
                let Some(rest_name) = rest.as_symbol() else {
                    return Err(self.syntax_error("bad formals", form, Some(rest)));
                };
                return Ok((params, Some(rest_name.to_string())));
            }
            params.push(name.to_string());
        }
        Ok((params, None))
    }

    fn parse_bindings<'d>(
        &self,
        form: &Datum,
        bindings: &'d Datum,
    ) -> Result<Vec<(String, &'d Datum)>, Exn> {
        let Some(items) = bindings.as_list() else {
            return Err(self.syntax_error("bad bindings", form, Some(bindings)));
        };
        let mut out = Vec::with_capacity(items.len());
        for binding in items {
            match binding.as_list() {
                Some([name, init]) if name.as_symbol().is_some() => {
                    out.push((name.as_symbol().unwrap_or_default().to_string(), init));
                }
                _ => return Err(self.syntax_error("bad binding", form, Some(binding))),
            }
        }
        Ok(out)
    }

    fn eval_let(&mut self, form: &Datum, rest: &[Datum], env: &Env) -> Result<Value, Exn> {
        // Named let: (let loop ((i 0)) body...)
        if let [label, bindings, body @ ..] = rest {
            if let Some(label) = label.as_symbol() {
                let pairs = self.parse_bindings(form, bindings)?;
                let mut inits = Vec::with_capacity(pairs.len());
                for (_, init) in &pairs {
                    inits.push(self.eval(init, env)?);
                }
                let scope = env.child();
                let closure = Value::Closure(Rc::new(Closure {
                    name: Some(label.to_string()),
                    params: pairs.into_iter().map(|(n, _)| n).collect(),
                    rest: None,
                    body: body.to_vec().into(),
                    env: self.capture(&scope),
                }));
                scope.define(label, closure.clone());
                return self.apply(&closure, inits, form);
            }
        }

        let [bindings, body @ ..] = rest else {
            return Err(self.syntax_error("bad let", form, None));
        };
        let pairs = self.parse_bindings(form, bindings)?;
        let scope = env.child();
        for (name, init) in pairs {
            let v = self.eval(init, env)?;
            scope.define(name, v);
        }
        self.eval_body(body, &scope)
    }

    fn eval_cond(&mut self, form: &Datum, clauses: &[Datum], env: &Env) -> Result<Value, Exn> {
        for clause in clauses {
            let Some([test, body @ ..]) = clause.as_list() else {
                return Err(self.syntax_error("bad cond clause", form, Some(clause)));
            };
            let hit = if test.as_symbol() == Some("else") {
                Value::Bool(true)
            } else {
                self.eval(test, env)?
            };
            if hit.is_true() {
                if body.is_empty() {
                    return Ok(hit);
                }
                return self.eval_body(body, env);
            }
        }
        Ok(Value::Unspecified)
    }

    /// `(lambda-shape (x y z) body...)`: evaluate the body over axis trees.
    fn eval_lambda_shape(&mut self, form: &Datum, rest: &[Datum], env: &Env) -> Result<Value, Exn> {
        let [formals, body @ ..] = rest else {
            return Err(self.syntax_error("bad lambda-shape", form, None));
        };
        let names: Option<Vec<&str>> = formals
            .as_list()
            .and_then(|items| items.iter().map(Datum::as_symbol).collect());
        let Some([x, y, z]) = names.as_deref() else {
            return Err(self.syntax_error("bad lambda-shape", form, Some(formals)));
        };
        if body.is_empty() {
            return Err(self.syntax_error("bad lambda-shape", form, None));
        }
        let scope = env.child();
        scope.define(*x, Value::Tree(Tree::x()));
        scope.define(*y, Value::Tree(Tree::y()));
        scope.define(*z, Value::Tree(Tree::z()));
        match self.eval_body(body, &scope)? {
            Value::Tree(t) => Ok(Value::Shape(t)),
            Value::Number(n) => Ok(Value::Shape(Tree::constant(n))),
            other => Err(self.raise(Exn::wrong_type("lambda-shape", 1, &other))),
        }
    }

    fn eval_body(&mut self, body: &[Datum], env: &Env) -> Result<Value, Exn> {
        let mut last = Value::Unspecified;
        for expr in body {
            last = self.eval(expr, env)?;
        }
        Ok(last)
    }

    /// Apply a procedure value to already evaluated arguments.
    pub fn apply(&mut self, f: &Value, args: Vec<Value>, call: &Datum) -> Result<Value, Exn> {
        match f {
            Value::Builtin(b) => {
                if !b.arity.accepts(args.len()) {
                    return Err(self.raise(Exn::wrong_args(b.name)));
                }
                self.enter(b.name.to_string(), call.range.start(), false)?;
                let result = (b.func)(&args, &mut self.ctx).map_err(|e| self.raise(e));
                self.frames.pop();
                result
            }
            Value::Closure(c) => {
                let arity_ok = if c.rest.is_some() {
                    args.len() >= c.params.len()
                } else {
                    args.len() == c.params.len()
                };
                if !arity_ok {
                    return Err(self.raise(Exn::wrong_args(&c.label())));
                }
                let scope = c.env.child();
                let mut args = args.into_iter();
                for param in &c.params {
                    scope.define(param.clone(), args.next().unwrap_or(Value::Unspecified));
                }
                if let Some(rest) = &c.rest {
                    scope.define(rest.clone(), Value::list(args.collect()));
                }
                self.enter(c.label(), call.range.start(), c.name.is_some())?;
                let result = self.eval_body(&c.body, &scope);
                self.frames.pop();
                result
            }
            other => Err(self.raise(Exn::misc(
                "wrong-type-arg",
                "Wrong type to apply: ~S",
                vec![other.clone()],
            ))),
        }
    }
}
