// src/math/tape.rs

//! 逆モード自動微分のための勾配テープ
//!
//! `GradientTape::record` のクロージャ内 (記録中) で行われた演算をノードとして
//! 記録し、クロージャを抜けると読み取り専用の `Recording` (確定済み) になる。
//! 勾配はクエリのたびに出力から逆順にたどって計算する。

use std::cell::{Cell, RefCell};
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::math::error::TapeError;

pub type NodeId = usize;

/// テープに記録される基本演算
#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Leaf,
    Constant,
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    Div(NodeId, NodeId),
    Neg(NodeId),
    Abs(NodeId),
    Powi(NodeId, i32),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    op: Op,
    value: f64,
}

/// 記録中の勾配テープ
///
/// `K` は監視対象の値を識別するキー (パラメータ名など)。
pub struct GradientTape<K> {
    nodes: RefCell<Vec<Node>>,
    watched: RefCell<Vec<(K, NodeId)>>,
}

/// テープ上の値
///
/// 演算子を適用すると結果が同じテープに記録される。
pub struct Var<'t, K> {
    tape: &'t GradientTape<K>,
    id: NodeId,
    value: f64,
}

impl<K> Clone for Var<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Var<'_, K> {}

impl<K: Copy + PartialEq> GradientTape<K> {
    /// 記録スコープを開き、`build` が返した式を確定させる
    ///
    /// # 引数
    /// - `persistent`: true なら確定後に何度でも勾配を問い合わせられる
    /// - `build`: テープ上で式を組み立てるクロージャ
    ///
    /// # 戻り値
    /// - 確定済みの記録。`build` がエラーを返した場合はテープを破棄してそのエラーを返す
    pub fn record<F, E>(persistent: bool, build: F) -> Result<Recording<K>, E>
    where
        F: for<'t> FnOnce(&'t GradientTape<K>) -> Result<Var<'t, K>, E>,
    {
        let tape = GradientTape {
            nodes: RefCell::new(Vec::new()),
            watched: RefCell::new(Vec::new()),
        };
        let (output, value) = {
            let out = build(&tape)?;
            debug_assert!(std::ptr::eq(out.tape, &tape));
            (out.id, out.value)
        };
        Ok(Recording {
            nodes: tape.nodes.into_inner(),
            watched: tape.watched.into_inner(),
            output,
            value,
            persistent,
            released: Cell::new(false),
        })
    }

    /// 勾配を追跡する値を登録する
    ///
    /// 値は登録時点でスナップショットされる。同じキーを再登録すると最初のノードを返す。
    pub fn watch(&self, key: K, value: f64) -> Var<'_, K> {
        let existing = self
            .watched
            .borrow()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, id)| *id);
        if let Some(id) = existing {
            let value = self.nodes.borrow()[id].value;
            return Var { tape: self, id, value };
        }
        let var = self.push(Op::Leaf, value);
        self.watched.borrow_mut().push((key, var.id));
        var
    }

    /// 追跡しない定数
    pub fn constant(&self, value: f64) -> Var<'_, K> {
        self.push(Op::Constant, value)
    }
}

impl<K> GradientTape<K> {
    fn push(&self, op: Op, value: f64) -> Var<'_, K> {
        let mut nodes = self.nodes.borrow_mut();
        let id = nodes.len();
        nodes.push(Node { op, value });
        Var { tape: self, id, value }
    }
}

impl<'t, K> Var<'t, K> {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn abs(self) -> Self {
        self.tape.push(Op::Abs(self.id), self.value.abs())
    }

    pub fn powi(self, n: i32) -> Self {
        self.tape.push(Op::Powi(self.id, n), self.value.powi(n))
    }

    fn lift(self, value: f64) -> Self {
        self.tape.push(Op::Constant, value)
    }
}

impl<'t, K> Add for Var<'t, K> {
    type Output = Var<'t, K>;
    fn add(self, rhs: Self) -> Self::Output {
        self.tape.push(Op::Add(self.id, rhs.id), self.value + rhs.value)
    }
}

impl<'t, K> Sub for Var<'t, K> {
    type Output = Var<'t, K>;
    fn sub(self, rhs: Self) -> Self::Output {
        self.tape.push(Op::Sub(self.id, rhs.id), self.value - rhs.value)
    }
}

impl<'t, K> Mul for Var<'t, K> {
    type Output = Var<'t, K>;
    fn mul(self, rhs: Self) -> Self::Output {
        self.tape.push(Op::Mul(self.id, rhs.id), self.value * rhs.value)
    }
}

impl<'t, K> Div for Var<'t, K> {
    type Output = Var<'t, K>;
    fn div(self, rhs: Self) -> Self::Output {
        self.tape.push(Op::Div(self.id, rhs.id), self.value / rhs.value)
    }
}

impl<'t, K> Neg for Var<'t, K> {
    type Output = Var<'t, K>;
    fn neg(self) -> Self::Output {
        self.tape.push(Op::Neg(self.id), -self.value)
    }
}

// f64 との混合演算。定数ノードを経由して記録する。
macro_rules! impl_scalar_ops {
    ($($trait:ident :: $method:ident),*) => {$(
        impl<'t, K> $trait<f64> for Var<'t, K> {
            type Output = Var<'t, K>;
            fn $method(self, rhs: f64) -> Self::Output {
                let rhs = self.lift(rhs);
                $trait::$method(self, rhs)
            }
        }

        impl<'t, K> $trait<Var<'t, K>> for f64 {
            type Output = Var<'t, K>;
            fn $method(self, rhs: Var<'t, K>) -> Self::Output {
                let lhs = rhs.lift(self);
                $trait::$method(lhs, rhs)
            }
        }
    )*};
}

impl_scalar_ops!(Add::add, Sub::sub, Mul::mul, Div::div);

/// 確定済みの記録
///
/// 勾配は記録時にスナップショットされた値で評価される。
#[derive(Debug)]
pub struct Recording<K> {
    nodes: Vec<Node>,
    watched: Vec<(K, NodeId)>,
    output: NodeId,
    value: f64,
    persistent: bool,
    released: Cell<bool>,
}

impl<K: Copy + PartialEq> Recording<K> {
    /// 記録された式の値
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// 単一の対象に対する偏微分
    ///
    /// # 戻り値
    /// - `Ok(Some(d))`: 偏微分値
    /// - `Ok(None)`: 対象が式に関与していない (感度なし)
    /// - `Err(TapeError::Released)`: 非永続テープへの2回目以降の問い合わせ
    pub fn gradient(&self, target: K) -> Result<Option<f64>, TapeError> {
        Ok(self.gradients(&[target])?.pop().flatten())
    }

    /// 複数の対象に対する偏微分 (要求と同じ順序で返す)
    pub fn gradients(&self, targets: &[K]) -> Result<Vec<Option<f64>>, TapeError> {
        self.acquire()?;
        let adjoints = self.backward();
        Ok(targets
            .iter()
            .map(|target| {
                self.watched
                    .iter()
                    .find(|(key, _)| key == target)
                    .and_then(|(_, id)| adjoints[*id])
            })
            .collect())
    }

    fn acquire(&self) -> Result<(), TapeError> {
        if self.persistent {
            return Ok(());
        }
        if self.released.replace(true) {
            return Err(TapeError::Released);
        }
        Ok(())
    }

    /// 出力から逆順にたどって随伴値を計算する。出力に到達しないノードは None のまま。
    fn backward(&self) -> Vec<Option<f64>> {
        let mut adjoints: Vec<Option<f64>> = vec![None; self.nodes.len()];
        adjoints[self.output] = Some(1.0);

        for id in (0..=self.output).rev() {
            let Some(grad) = adjoints[id] else {
                continue;
            };
            match self.nodes[id].op {
                Op::Leaf | Op::Constant => {}
                Op::Add(a, b) => {
                    accumulate(&mut adjoints, a, grad);
                    accumulate(&mut adjoints, b, grad);
                }
                Op::Sub(a, b) => {
                    accumulate(&mut adjoints, a, grad);
                    accumulate(&mut adjoints, b, -grad);
                }
                Op::Mul(a, b) => {
                    let (va, vb) = (self.nodes[a].value, self.nodes[b].value);
                    accumulate(&mut adjoints, a, grad * vb);
                    accumulate(&mut adjoints, b, grad * va);
                }
                Op::Div(a, b) => {
                    let (va, vb) = (self.nodes[a].value, self.nodes[b].value);
                    accumulate(&mut adjoints, a, grad / vb);
                    accumulate(&mut adjoints, b, -grad * va / (vb * vb));
                }
                Op::Neg(a) => accumulate(&mut adjoints, a, -grad),
                Op::Abs(a) => {
                    // |x| の微分は x = 0 で 0
                    let va = self.nodes[a].value;
                    let sign = if va > 0.0 {
                        1.0
                    } else if va < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };
                    accumulate(&mut adjoints, a, grad * sign);
                }
                Op::Powi(a, n) => {
                    // x^0 は定数なので 0 (x = 0 で 0·x^-1 を計算しない)
                    let local = if n == 0 {
                        0.0
                    } else {
                        f64::from(n) * self.nodes[a].value.powi(n - 1)
                    };
                    accumulate(&mut adjoints, a, grad * local);
                }
            }
        }
        adjoints
    }
}

fn accumulate(adjoints: &mut [Option<f64>], id: NodeId, grad: f64) {
    let slot = &mut adjoints[id];
    *slot = Some(slot.unwrap_or(0.0) + grad);
}
