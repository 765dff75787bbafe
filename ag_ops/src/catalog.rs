//! Operator catalog: the closed sets of operator kinds and their static traits.

use std::fmt;

/// Elementwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryOpKind {
    // === Arithmetic ===
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    // === Comparison ===
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Ne,
}

impl BinaryOpKind {
    pub const ALL: [BinaryOpKind; 11] = [
        BinaryOpKind::Add,
        BinaryOpKind::Sub,
        BinaryOpKind::Mul,
        BinaryOpKind::Div,
        BinaryOpKind::Pow,
        BinaryOpKind::Lt,
        BinaryOpKind::Gt,
        BinaryOpKind::Lte,
        BinaryOpKind::Gte,
        BinaryOpKind::Eq,
        BinaryOpKind::Ne,
    ];

    /// Arithmetic kinds produce a number; the rest are comparisons.
    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinaryOpKind::Add | BinaryOpKind::Sub | BinaryOpKind::Mul | BinaryOpKind::Div | BinaryOpKind::Pow
        )
    }

    /// Only arithmetic kinds carry a derivative.
    pub fn is_differentiable(self) -> bool {
        self.is_arith()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOpKind::Add => "+",
            BinaryOpKind::Sub => "-",
            BinaryOpKind::Mul => "⊙",
            BinaryOpKind::Div => "÷",
            BinaryOpKind::Pow => "^",
            BinaryOpKind::Lt => "<",
            BinaryOpKind::Gt => ">",
            BinaryOpKind::Lte => "<=",
            BinaryOpKind::Gte => ">=",
            BinaryOpKind::Eq => "==",
            BinaryOpKind::Ne => "!=",
        }
    }
}

impl fmt::Display for BinaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Elementwise unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryOpKind {
    Neg,
    Abs,
    Sign,
    Ceil,
    Floor,
    Sin,
    Cos,
    Exp,
    Ln,
    Log2,
    Sqrt,
    Square,
    Cube,
    Inverse,
    Tanh,
    Sigmoid,
}

impl UnaryOpKind {
    pub const ALL: [UnaryOpKind; 16] = [
        UnaryOpKind::Neg,
        UnaryOpKind::Abs,
        UnaryOpKind::Sign,
        UnaryOpKind::Ceil,
        UnaryOpKind::Floor,
        UnaryOpKind::Sin,
        UnaryOpKind::Cos,
        UnaryOpKind::Exp,
        UnaryOpKind::Ln,
        UnaryOpKind::Log2,
        UnaryOpKind::Sqrt,
        UnaryOpKind::Square,
        UnaryOpKind::Cube,
        UnaryOpKind::Inverse,
        UnaryOpKind::Tanh,
        UnaryOpKind::Sigmoid,
    ];

    /// Step functions have no useful derivative.
    pub fn is_differentiable(self) -> bool {
        !matches!(self, UnaryOpKind::Sign | UnaryOpKind::Ceil | UnaryOpKind::Floor)
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryOpKind::Neg => "neg",
            UnaryOpKind::Abs => "abs",
            UnaryOpKind::Sign => "sign",
            UnaryOpKind::Ceil => "ceil",
            UnaryOpKind::Floor => "floor",
            UnaryOpKind::Sin => "sin",
            UnaryOpKind::Cos => "cos",
            UnaryOpKind::Exp => "exp",
            UnaryOpKind::Ln => "ln",
            UnaryOpKind::Log2 => "log2",
            UnaryOpKind::Sqrt => "sqrt",
            UnaryOpKind::Square => "square",
            UnaryOpKind::Cube => "cube",
            UnaryOpKind::Inverse => "inverse",
            UnaryOpKind::Tanh => "tanh",
            UnaryOpKind::Sigmoid => "sigmoid",
        }
    }
}

impl fmt::Display for UnaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Linear-algebra products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinAlgKind {
    MatMul,
    MatVecMul,
    VecDot,
    OuterProd,
}

impl LinAlgKind {
    pub fn symbol(self) -> &'static str {
        match self {
            LinAlgKind::MatMul => "×",
            LinAlgKind::MatVecMul => "×",
            LinAlgKind::VecDot => "·",
            LinAlgKind::OuterProd => "⊗",
        }
    }
}

impl fmt::Display for LinAlgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Axis reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionKind {
    Sum,
    Max,
}

impl fmt::Display for ReductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionKind::Sum => f.write_str("Σ"),
            ReductionKind::Max => f.write_str("max"),
        }
    }
}
