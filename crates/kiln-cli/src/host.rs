//! Builtin procedure registry for Kiln scripts.
//!
//! Every builtin declares the host effects it performs. A sandbox binds only
//! the builtins whose effects it allows; the rest stay in the registry so
//! that a call to one can be reported as a sandbox violation rather than an
//! unbound name.

use std::collections::HashMap;
use std::fmt;

use kiln_types::{BinaryOp, Effect, EffectSet, Tree, UnaryOp};

use crate::eval::{Env, Exn, Value};

/// Signature shared by all builtins.
pub type BuiltinFn = fn(&[Value], &mut HostCtx) -> Result<Value, Exn>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic builtins
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub const fn at_least(n: usize) -> Self {
        Self { min: n, max: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub effects: EffectSet,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("effects", &self.effects)
            .finish()
    }
}

/// Mutable host state reachable from builtins.
pub struct HostCtx {
    /// Text written by `display` / `newline`.
    pub output: String,
    rng: u64,
}

impl Default for HostCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCtx {
    pub fn new() -> Self {
        use std::time::SystemTime;
        let seed = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            output: String::new(),
            // xorshift never leaves zero
            rng: seed | 1,
        }
    }

    fn next_random(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

pub struct BuiltinRegistry {
    builtins: HashMap<&'static str, Builtin>,
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.builtins.keys().collect();
        names.sort();
        f.debug_struct("BuiltinRegistry")
            .field("builtins", &names)
            .finish()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRegistry {
    /// Registry holding every builtin Kiln knows about.
    pub fn new() -> Self {
        let mut reg = Self {
            builtins: HashMap::new(),
        };
        let pure = EffectSet::pure();

        reg.register("+", Arity::at_least(0), pure, b_add);
        reg.register("-", Arity::at_least(1), pure, b_sub);
        reg.register("*", Arity::at_least(0), pure, b_mul);
        reg.register("/", Arity::at_least(1), pure, b_div);
        reg.register("min", Arity::at_least(1), pure, b_min);
        reg.register("max", Arity::at_least(1), pure, b_max);
        reg.register("abs", Arity::exactly(1), pure, b_abs);
        reg.register("sqrt", Arity::exactly(1), pure, b_sqrt);
        reg.register("square", Arity::exactly(1), pure, b_square);
        reg.register("sin", Arity::exactly(1), pure, b_sin);
        reg.register("cos", Arity::exactly(1), pure, b_cos);

        reg.register("=", Arity::at_least(1), pure, b_num_eq);
        reg.register("<", Arity::at_least(1), pure, b_lt);
        reg.register(">", Arity::at_least(1), pure, b_gt);
        reg.register("<=", Arity::at_least(1), pure, b_le);
        reg.register(">=", Arity::at_least(1), pure, b_ge);

        reg.register("number?", Arity::exactly(1), pure, b_is_number);
        reg.register("shape?", Arity::exactly(1), pure, b_is_shape);
        reg.register("null?", Arity::exactly(1), pure, b_is_null);
        reg.register("pair?", Arity::exactly(1), pure, b_is_pair);
        reg.register("procedure?", Arity::exactly(1), pure, b_is_procedure);
        reg.register("not", Arity::exactly(1), pure, b_not);

        reg.register("list", Arity::at_least(0), pure, b_list);
        reg.register("cons", Arity::exactly(2), pure, b_cons);
        reg.register("car", Arity::exactly(1), pure, b_car);
        reg.register("cdr", Arity::exactly(1), pure, b_cdr);
        reg.register("length", Arity::exactly(1), pure, b_length);
        reg.register("values", Arity::at_least(0), pure, b_values);

        reg.register("error", Arity::at_least(1), pure, b_error);
        reg.register("throw", Arity::at_least(1), pure, b_throw);

        reg.register("sphere", Arity::exactly(1), pure, b_sphere);
        reg.register("cube", Arity::exactly(1), pure, b_cube);
        reg.register("cylinder", Arity::exactly(2), pure, b_cylinder);
        reg.register("union", Arity::at_least(1), pure, b_union);
        reg.register("intersection", Arity::at_least(1), pure, b_intersection);
        reg.register("difference", Arity::at_least(1), pure, b_difference);
        reg.register("move", Arity::exactly(4), pure, b_move);
        reg.register("scale", Arity::exactly(2), pure, b_scale);

        let io = EffectSet::singleton(Effect::Io);
        reg.register("display", Arity::exactly(1), io, b_display);
        reg.register("newline", Arity::exactly(0), io, b_newline);
        reg.register(
            "random",
            Arity::exactly(1),
            EffectSet::singleton(Effect::Rand),
            b_random,
        );
        reg.register(
            "current-time",
            Arity::exactly(0),
            EffectSet::singleton(Effect::Time),
            b_current_time,
        );
        reg
    }

    fn register(&mut self, name: &'static str, arity: Arity, effects: EffectSet, func: BuiltinFn) {
        self.builtins.insert(
            name,
            Builtin {
                name,
                arity,
                effects,
                func,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.builtins.get(name)
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }

    /// Define every builtin whose effects `allowed` covers.
    pub fn bind(&self, env: &Env, allowed: EffectSet) {
        for b in self.builtins.values() {
            if b.effects.is_subset_of(&allowed) {
                env.define(b.name, Value::Builtin(*b));
            }
        }
    }

    /// Effects that keep `name` out of a sandbox allowing `allowed`.
    /// `None` when `name` is not a builtin or is fully allowed.
    pub fn denied(&self, name: &str, allowed: EffectSet) -> Option<EffectSet> {
        let b = self.builtins.get(name)?;
        let denied = b.effects.denied_by(&allowed);
        (!denied.is_pure()).then_some(denied)
    }
}

// ---------------------------------------------------------------------------
// Numeric operands
// ---------------------------------------------------------------------------

/// A numeric argument: a plain number or a tree over the axes and variables.
enum Num {
    Plain(f64),
    Tree(Tree),
}

impl Num {
    fn into_tree(self) -> Tree {
        match self {
            Num::Plain(n) => Tree::constant(n),
            Num::Tree(t) => t,
        }
    }
}

/// Arithmetic result kind: shapes stay shapes, anything touching a tree is
/// a tree.
fn wrap(n: Num, any_shape: bool) -> Value {
    match n {
        Num::Plain(v) => Value::Number(v),
        Num::Tree(t) if any_shape => Value::Shape(t),
        Num::Tree(t) => Value::Tree(t),
    }
}

fn operand(subr: &str, position: usize, v: &Value) -> Result<Num, Exn> {
    match v {
        Value::Number(n) => Ok(Num::Plain(*n)),
        Value::Tree(t) | Value::Shape(t) => Ok(Num::Tree(t.clone())),
        other => Err(Exn::wrong_type(subr, position, other)),
    }
}

fn number(subr: &str, position: usize, v: &Value) -> Result<f64, Exn> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(Exn::wrong_type(subr, position, other)),
    }
}

fn binary(op: BinaryOp, a: Num, b: Num) -> Num {
    match (a, b) {
        (Num::Plain(a), Num::Plain(b)) => Num::Plain(op.apply(a, b)),
        (a, b) => Num::Tree(Tree::binary(op, a.into_tree(), b.into_tree())),
    }
}

fn unary(op: UnaryOp, a: Num) -> Num {
    match a {
        Num::Plain(a) => Num::Plain(op.apply(a)),
        Num::Tree(t) => Num::Tree(Tree::unary(op, t)),
    }
}

fn has_shape(args: &[Value]) -> bool {
    args.iter().any(|v| matches!(v, Value::Shape(_)))
}

fn fold(subr: &str, op: BinaryOp, identity: f64, args: &[Value]) -> Result<Value, Exn> {
    let mut acc = Num::Plain(identity);
    for (i, v) in args.iter().enumerate() {
        let n = operand(subr, i + 1, v)?;
        acc = if i == 0 { n } else { binary(op, acc, n) };
    }
    Ok(wrap(acc, has_shape(args)))
}

fn b_add(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    fold("+", BinaryOp::Add, 0.0, args)
}

fn b_mul(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    fold("*", BinaryOp::Mul, 1.0, args)
}

fn b_sub(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    if let [only] = args {
        let n = unary(UnaryOp::Neg, operand("-", 1, only)?);
        return Ok(wrap(n, has_shape(args)));
    }
    fold("-", BinaryOp::Sub, 0.0, args)
}

fn b_div(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let mut operands = Vec::with_capacity(args.len() + 1);
    if args.len() == 1 {
        operands.push(Num::Plain(1.0));
    }
    for (i, v) in args.iter().enumerate() {
        operands.push(operand("/", i + 1, v)?);
    }
    let mut iter = operands.into_iter();
    let mut acc = iter.next().unwrap_or(Num::Plain(1.0));
    for divisor in iter {
        if matches!(divisor, Num::Plain(d) if d == 0.0) && matches!(acc, Num::Plain(_)) {
            return Err(Exn::overflow("/", args));
        }
        acc = binary(BinaryOp::Div, acc, divisor);
    }
    Ok(wrap(acc, has_shape(args)))
}

fn b_min(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    fold("min", BinaryOp::Min, f64::INFINITY, args)
}

fn b_max(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    fold("max", BinaryOp::Max, f64::NEG_INFINITY, args)
}

fn unary_builtin(subr: &str, op: UnaryOp, args: &[Value]) -> Result<Value, Exn> {
    let n = unary(op, operand(subr, 1, &args[0])?);
    Ok(wrap(n, has_shape(args)))
}

fn b_abs(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    unary_builtin("abs", UnaryOp::Abs, args)
}

fn b_sqrt(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    unary_builtin("sqrt", UnaryOp::Sqrt, args)
}

fn b_square(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    unary_builtin("square", UnaryOp::Square, args)
}

fn b_sin(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    unary_builtin("sin", UnaryOp::Sin, args)
}

fn b_cos(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    unary_builtin("cos", UnaryOp::Cos, args)
}

fn compare(subr: &str, args: &[Value], holds: fn(f64, f64) -> bool) -> Result<Value, Exn> {
    let mut nums = Vec::with_capacity(args.len());
    for (i, v) in args.iter().enumerate() {
        nums.push(number(subr, i + 1, v)?);
    }
    Ok(Value::Bool(nums.windows(2).all(|w| holds(w[0], w[1]))))
}

fn b_num_eq(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    compare("=", args, |a, b| a == b)
}

fn b_lt(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    compare("<", args, |a, b| a < b)
}

fn b_gt(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    compare(">", args, |a, b| a > b)
}

fn b_le(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    compare("<=", args, |a, b| a <= b)
}

fn b_ge(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    compare(">=", args, |a, b| a >= b)
}

// ---------------------------------------------------------------------------
// Predicates and lists
// ---------------------------------------------------------------------------

fn b_is_number(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::Bool(matches!(args[0], Value::Number(_))))
}

fn b_is_shape(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::Bool(matches!(args[0], Value::Shape(_))))
}

fn b_is_null(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::Bool(matches!(&args[0], Value::List(l) if l.is_empty())))
}

fn b_is_pair(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::Bool(matches!(&args[0], Value::List(l) if !l.is_empty())))
}

fn b_is_procedure(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::Bool(matches!(
        args[0],
        Value::Closure(_) | Value::Builtin(_)
    )))
}

fn b_not(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::Bool(!args[0].is_true()))
}

fn b_list(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    Ok(Value::list(args.to_vec()))
}

fn b_cons(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    match &args[1] {
        Value::List(tail) => {
            let mut items = Vec::with_capacity(tail.len() + 1);
            items.push(args[0].clone());
            items.extend(tail.iter().cloned());
            Ok(Value::list(items))
        }
        // Only proper lists exist.
        other => Err(Exn::wrong_type("cons", 2, other)),
    }
}

fn b_car(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    match &args[0] {
        Value::List(items) if !items.is_empty() => Ok(items[0].clone()),
        other => Err(Exn::wrong_type("car", 1, other)),
    }
}

fn b_cdr(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    match &args[0] {
        Value::List(items) if !items.is_empty() => Ok(Value::list(items[1..].to_vec())),
        other => Err(Exn::wrong_type("cdr", 1, other)),
    }
}

fn b_length(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    match &args[0] {
        Value::List(items) => Ok(Value::Number(items.len() as f64)),
        other => Err(Exn::wrong_type("length", 1, other)),
    }
}

fn b_values(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    match args {
        [one] => Ok(one.clone()),
        _ => Ok(Value::Values(std::rc::Rc::new(args.to_vec()))),
    }
}

/// `(error message irritant ...)`: each irritant is appended as `~S`.
fn b_error(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let (message, irritants) = (&args[0], &args[1..]);
    let mut fmt = message.to_string().replace('~', "~~");
    for _ in irritants {
        fmt.push_str(" ~S");
    }
    Err(Exn::misc("misc-error", &fmt, irritants.to_vec()))
}

/// `(throw 'key arg ...)`: raises with exactly the given arguments.
fn b_throw(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    match &args[0] {
        Value::Symbol(key) => Err(Exn::raw(key.clone(), args[1..].to_vec())),
        other => Err(Exn::wrong_type("throw", 1, other)),
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

fn shape_arg(subr: &str, position: usize, v: &Value) -> Result<Tree, Exn> {
    match v {
        Value::Shape(t) => Ok(t.clone()),
        other => Err(Exn::wrong_type(subr, position, other)),
    }
}

fn length_xyz() -> Tree {
    (Tree::x().square() + Tree::y().square() + Tree::z().square()).sqrt()
}

fn b_sphere(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let r = operand("sphere", 1, &args[0])?.into_tree();
    Ok(Value::Shape(length_xyz() - r))
}

fn b_cube(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let half = operand("cube", 1, &args[0])?.into_tree() / Tree::constant(2.0);
    let x = Tree::x().abs() - half.clone();
    let y = Tree::y().abs() - half.clone();
    let z = Tree::z().abs() - half;
    Ok(Value::Shape(x.max(y).max(z)))
}

fn b_cylinder(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let r = operand("cylinder", 1, &args[0])?.into_tree();
    let h = operand("cylinder", 2, &args[1])?.into_tree();
    let radial = (Tree::x().square() + Tree::y().square()).sqrt() - r;
    let axial = Tree::z().abs() - h / Tree::constant(2.0);
    Ok(Value::Shape(radial.max(axial)))
}

fn combine(subr: &str, args: &[Value], join: fn(Tree, Tree) -> Tree) -> Result<Tree, Exn> {
    let mut acc = shape_arg(subr, 1, &args[0])?;
    for (i, v) in args.iter().enumerate().skip(1) {
        acc = join(acc, shape_arg(subr, i + 1, v)?);
    }
    Ok(acc)
}

fn b_union(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    combine("union", args, Tree::min).map(Value::Shape)
}

fn b_intersection(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    combine("intersection", args, Tree::max).map(Value::Shape)
}

/// First shape minus the union of the rest.
fn b_difference(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let base = shape_arg("difference", 1, &args[0])?;
    if args.len() == 1 {
        return Ok(Value::Shape(base));
    }
    let mut cut = shape_arg("difference", 2, &args[1])?;
    for (i, v) in args.iter().enumerate().skip(2) {
        cut = cut.min(shape_arg("difference", i + 1, v)?);
    }
    Ok(Value::Shape(base.max(-cut)))
}

fn b_move(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let shape = shape_arg("move", 1, &args[0])?;
    let dx = operand("move", 2, &args[1])?.into_tree();
    let dy = operand("move", 3, &args[2])?.into_tree();
    let dz = operand("move", 4, &args[3])?.into_tree();
    Ok(Value::Shape(shape.remap(
        &(Tree::x() - dx),
        &(Tree::y() - dy),
        &(Tree::z() - dz),
    )))
}

fn b_scale(args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    let shape = shape_arg("scale", 1, &args[0])?;
    let k = match operand("scale", 2, &args[1])? {
        Num::Plain(k) if k == 0.0 => return Err(Exn::overflow("scale", args)),
        k => k.into_tree(),
    };
    Ok(Value::Shape(shape.remap(
        &(Tree::x() / k.clone()),
        &(Tree::y() / k.clone()),
        &(Tree::z() / k),
    )))
}

// ---------------------------------------------------------------------------
// Effectful builtins
// ---------------------------------------------------------------------------

fn b_display(args: &[Value], ctx: &mut HostCtx) -> Result<Value, Exn> {
    ctx.output.push_str(&args[0].to_string());
    Ok(Value::Unspecified)
}

fn b_newline(_args: &[Value], ctx: &mut HostCtx) -> Result<Value, Exn> {
    ctx.output.push('\n');
    Ok(Value::Unspecified)
}

/// `(random n)`: uniform in `[0, n)`; integral `n` gives integers.
fn b_random(args: &[Value], ctx: &mut HostCtx) -> Result<Value, Exn> {
    let n = number("random", 1, &args[0])?;
    if n <= 0.0 {
        return Err(Exn::wrong_type("random", 1, &args[0]));
    }
    let r = ctx.next_random() * n;
    Ok(Value::Number(if n.fract() == 0.0 { r.floor() } else { r }))
}

fn b_current_time(_args: &[Value], _ctx: &mut HostCtx) -> Result<Value, Exn> {
    use std::time::SystemTime;
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| Exn::misc("system-error", "current-time: ~A", vec![Value::str(e.to_string())]))?;
    Ok(Value::Number(now.as_secs() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn call(name: &str, args: &[Value]) -> Result<Value, Exn> {
        let reg = BuiltinRegistry::new();
        let b = reg.get(name).expect("builtin");
        assert!(b.arity.accepts(args.len()));
        (b.func)(args, &mut HostCtx::with_seed(7))
    }

    fn shape(v: Value) -> Tree {
        match v {
            Value::Shape(t) => t,
            other => panic!("expected shape, got {:?}", other),
        }
    }

    #[test]
    fn arity_bounds() {
        assert!(Arity::exactly(2).accepts(2));
        assert!(!Arity::exactly(2).accepts(3));
        assert!(Arity::at_least(1).accepts(9));
        assert!(!Arity::at_least(1).accepts(0));
    }

    #[test]
    fn bind_respects_effects() {
        let reg = BuiltinRegistry::new();
        let env = Env::new();
        reg.bind(&env, EffectSet::pure());
        assert!(env.lookup("sphere").is_some());
        assert!(env.lookup("display").is_none());

        let env = Env::new();
        reg.bind(&env, EffectSet::singleton(Effect::Io));
        assert!(env.lookup("display").is_some());
        assert!(env.lookup("random").is_none());
    }

    #[test]
    fn denied_reports_missing_effects() {
        let reg = BuiltinRegistry::new();
        let denied = reg.denied("current-time", EffectSet::pure()).expect("denied");
        assert!(denied.contains(Effect::Time));
        assert!(reg
            .denied("current-time", EffectSet::singleton(Effect::Time))
            .is_none());
        assert!(reg.denied("sphere", EffectSet::pure()).is_none());
        assert!(reg.denied("no-such-thing", EffectSet::pure()).is_none());
    }

    #[test]
    fn division_by_zero_overflows() {
        let err = call("/", &[Value::Number(1.0), Value::Number(0.0)]).unwrap_err();
        assert_eq!(err.key, "numerical-overflow");
        assert!(matches!(
            call("/", &[Value::Number(4.0)]),
            Ok(Value::Number(n)) if n == 0.25
        ));
    }

    #[test]
    fn sphere_is_a_distance_field() {
        let t = shape(call("sphere", &[Value::Number(1.0)]).expect("sphere"));
        let vars = BTreeMap::new();
        assert_eq!(t.eval([0.0, 0.0, 0.0], &vars), -1.0);
        assert_eq!(t.eval([3.0, 0.0, 0.0], &vars), 2.0);
    }

    #[test]
    fn move_and_union() {
        let a = call("sphere", &[Value::Number(1.0)]).expect("sphere");
        let moved = call(
            "move",
            &[
                a.clone(),
                Value::Number(5.0),
                Value::Number(0.0),
                Value::Number(0.0),
            ],
        )
        .expect("move");
        let both = shape(call("union", &[a, moved]).expect("union"));
        let vars = BTreeMap::new();
        assert_eq!(both.eval([5.0, 0.0, 0.0], &vars), -1.0);
        assert_eq!(both.eval([0.0, 0.0, 0.0], &vars), -1.0);
    }

    #[test]
    fn difference_cuts_away() {
        let big = call("cube", &[Value::Number(4.0)]).expect("cube");
        let small = call("sphere", &[Value::Number(1.0)]).expect("sphere");
        let cut = shape(call("difference", &[big, small]).expect("difference"));
        let vars = BTreeMap::new();
        assert!(cut.eval([0.0, 0.0, 0.0], &vars) > 0.0);
        assert!(cut.eval([1.5, 0.0, 0.0], &vars) < 0.0);
    }

    #[test]
    fn geometry_rejects_non_shapes() {
        let err = call("union", &[Value::Number(1.0)]).unwrap_err();
        assert_eq!(err.key, "wrong-type-arg");
    }

    #[test]
    fn error_escapes_tildes() {
        let err = call("error", &[Value::str("50~ off"), Value::Number(2.0)]).unwrap_err();
        assert_eq!(err.key, "misc-error");
        let raw = err.into_raw();
        assert_eq!(raw.args.written(), "(#f \"50~~ off ~S\" (2) #f)");
    }

    #[test]
    fn random_stays_in_range() {
        let mut ctx = HostCtx::with_seed(42);
        for _ in 0..100 {
            match b_random(&[Value::Number(10.0)], &mut ctx) {
                Ok(Value::Number(n)) => assert!((0.0..10.0).contains(&n) && n.fract() == 0.0),
                other => panic!("unexpected {:?}", other.map(|v| v.written())),
            }
        }
    }

    #[test]
    fn display_writes_to_buffer() {
        let mut ctx = HostCtx::with_seed(1);
        b_display(&[Value::str("hi")], &mut ctx).expect("display");
        b_newline(&[], &mut ctx).expect("newline");
        assert_eq!(ctx.output, "hi\n");
    }
}
