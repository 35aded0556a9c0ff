//! Geometry trees.
//!
//! A `Tree` is an immutable, reference-counted expression DAG over the
//! three axes, constants and free variables. Shapes are trees describing a
//! distance field; the rendering side treats them as opaque handles keyed by
//! `TreeId`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::stack::ensure_sufficient_stack;

/// Process-unique node identifier. Ids are never reused, so re-evaluating
/// the same text yields fresh ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TreeId(pub u64);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> TreeId {
    TreeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sqrt,
    Square,
    Sin,
    Cos,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Square => "square",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
        }
    }

    pub fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Abs => a.abs(),
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Square => a * a,
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }
}

#[derive(Debug)]
pub enum Op {
    Const(f64),
    /// Free variable; its value lives outside the tree.
    Var,
    Axis(Axis),
    Unary(UnaryOp, Tree),
    Binary(BinaryOp, Tree, Tree),
}

#[derive(Debug)]
struct Node {
    id: TreeId,
    op: Op,
}

/// Unlinks children iteratively so dropping a deep tree does not recurse.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_children(&mut self.op, &mut pending);
        while let Some(child) = pending.pop() {
            // Shared children are still owned elsewhere; leave them be.
            if let Ok(mut node) = Arc::try_unwrap(child.0) {
                take_children(&mut node.op, &mut pending);
            }
        }
    }
}

fn take_children(op: &mut Op, out: &mut Vec<Tree>) {
    match std::mem::replace(op, Op::Var) {
        Op::Unary(_, a) => out.push(a),
        Op::Binary(_, a, b) => {
            out.push(a);
            out.push(b);
        }
        Op::Const(_) | Op::Var | Op::Axis(_) => {}
    }
}

#[derive(Clone)]
pub struct Tree(Arc<Node>);

impl Tree {
    fn from_op(op: Op) -> Self {
        Tree(Arc::new(Node { id: fresh_id(), op }))
    }

    pub fn constant(v: f64) -> Self {
        Self::from_op(Op::Const(v))
    }

    pub fn var() -> Self {
        Self::from_op(Op::Var)
    }

    pub fn axis(a: Axis) -> Self {
        Self::from_op(Op::Axis(a))
    }

    pub fn x() -> Self {
        Self::axis(Axis::X)
    }

    pub fn y() -> Self {
        Self::axis(Axis::Y)
    }

    pub fn z() -> Self {
        Self::axis(Axis::Z)
    }

    pub fn unary(op: UnaryOp, a: Tree) -> Self {
        Self::from_op(Op::Unary(op, a))
    }

    pub fn binary(op: BinaryOp, a: Tree, b: Tree) -> Self {
        Self::from_op(Op::Binary(op, a, b))
    }

    pub fn min(self, other: Tree) -> Self {
        Self::binary(BinaryOp::Min, self, other)
    }

    pub fn max(self, other: Tree) -> Self {
        Self::binary(BinaryOp::Max, self, other)
    }

    pub fn sqrt(self) -> Self {
        Self::unary(UnaryOp::Sqrt, self)
    }

    pub fn square(self) -> Self {
        Self::unary(UnaryOp::Square, self)
    }

    pub fn abs(self) -> Self {
        Self::unary(UnaryOp::Abs, self)
    }

    pub fn id(&self) -> TreeId {
        self.0.id
    }

    pub fn op(&self) -> &Op {
        &self.0.op
    }

    pub fn is_var(&self) -> bool {
        matches!(self.0.op, Op::Var)
    }

    /// Ids of every free variable reachable from this node.
    pub fn vars(&self) -> BTreeSet<TreeId> {
        let mut found = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.clone()];
        while let Some(t) = stack.pop() {
            if !seen.insert(t.id()) {
                continue;
            }
            match t.op() {
                Op::Var => {
                    found.insert(t.id());
                }
                Op::Const(_) | Op::Axis(_) => {}
                Op::Unary(_, a) => stack.push(a.clone()),
                Op::Binary(_, a, b) => {
                    stack.push(a.clone());
                    stack.push(b.clone());
                }
            }
        }
        found
    }

    /// Substitute the axes with arbitrary trees (used by transforms).
    /// Shared subtrees stay shared in the result.
    pub fn remap(&self, x: &Tree, y: &Tree, z: &Tree) -> Tree {
        let mut memo = HashMap::new();
        self.remap_inner(x, y, z, &mut memo)
    }

    fn remap_inner(
        &self,
        x: &Tree,
        y: &Tree,
        z: &Tree,
        memo: &mut HashMap<TreeId, Tree>,
    ) -> Tree {
        if let Some(done) = memo.get(&self.id()) {
            return done.clone();
        }
        let out = ensure_sufficient_stack(|| match self.op() {
            Op::Axis(Axis::X) => x.clone(),
            Op::Axis(Axis::Y) => y.clone(),
            Op::Axis(Axis::Z) => z.clone(),
            Op::Const(_) | Op::Var => self.clone(),
            Op::Unary(op, a) => Tree::unary(*op, a.remap_inner(x, y, z, memo)),
            Op::Binary(op, a, b) => {
                let a = a.remap_inner(x, y, z, memo);
                let b = b.remap_inner(x, y, z, memo);
                Tree::binary(*op, a, b)
            }
        });
        memo.insert(self.id(), out.clone());
        out
    }

    /// Evaluate at a point. Unknown variables evaluate to NaN.
    pub fn eval(&self, point: [f64; 3], vars: &BTreeMap<TreeId, f64>) -> f64 {
        ensure_sufficient_stack(|| match self.op() {
            Op::Const(v) => *v,
            Op::Var => vars.get(&self.id()).copied().unwrap_or(f64::NAN),
            Op::Axis(Axis::X) => point[0],
            Op::Axis(Axis::Y) => point[1],
            Op::Axis(Axis::Z) => point[2],
            Op::Unary(op, a) => op.apply(a.eval(point, vars)),
            Op::Binary(op, a, b) => op.apply(a.eval(point, vars), b.eval(point, vars)),
        })
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Tree {}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tree({} {})", self.id(), self)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ensure_sufficient_stack(|| match self.op() {
            Op::Const(v) => write!(f, "{}", kiln_ast::ast::format_number(*v)),
            Op::Var => write!(f, "var{}", self.id()),
            Op::Axis(Axis::X) => f.write_str("x"),
            Op::Axis(Axis::Y) => f.write_str("y"),
            Op::Axis(Axis::Z) => f.write_str("z"),
            Op::Unary(op, a) => write!(f, "({} {})", op.name(), a),
            Op::Binary(op, a, b) => write!(f, "({} {} {})", op.name(), a, b),
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Tree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! tree_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Tree {
            type Output = Tree;
            fn $method(self, rhs: Tree) -> Tree {
                Tree::binary($op, self, rhs)
            }
        }
    };
}

tree_binop!(Add, add, BinaryOp::Add);
tree_binop!(Sub, sub, BinaryOp::Sub);
tree_binop!(Mul, mul, BinaryOp::Mul);
tree_binop!(Div, div, BinaryOp::Div);

impl ops::Neg for Tree {
    type Output = Tree;
    fn neg(self) -> Tree {
        Tree::unary(UnaryOp::Neg, self)
    }
}
