//! Value types for abstract tensors, attributes, and the operator graph IR.
//!
//! Everything here is a plain value type: no enumeration, no SMT calls, no
//! mutation-in-place. Substituting a symbol in an [`AbstractTensor`]'s shape
//! returns a new tensor rather than mutating `shape[i]` (`spec.md` §9,
//! "Mutability of abstract tensors").

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The element type of an abstract tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 16-bit float.
    F16,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// Boolean.
    Bool,
    /// 64-bit complex (two f32 components).
    Complex64,
    /// 128-bit complex (two f64 components).
    Complex128,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::Bool => "bool",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        };
        write!(f, "{s}")
    }
}

/// An ordered wrapper over `f64` so float attribute literals can implement
/// `Eq`/`Hash` (needed for de-duplication in the invocation database).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedF64(pub f64);

impl Eq for OrderedF64 {}

impl std::hash::Hash for OrderedF64 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// The literal payload of an opaque (non-tensor, non-symbolic-integer)
/// attribute value, or of a concretized symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrLiteral {
    /// An integer literal (also used for concretized symbol values).
    Int(i64),
    /// A floating-point literal.
    Float(OrderedF64),
    /// A boolean literal.
    Bool(bool),
    /// A string literal (e.g. an enum-valued attribute like a padding mode).
    Str(String),
    /// A list of integers (e.g. a `dims` or `axes` attribute).
    IntList(Vec<i64>),
}

/// One dimension of an abstract tensor's shape: either a named symbol
/// (`s0`, `o3`, ...) or a concretized literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeDim {
    /// A symbolic dimension, named by its external `sN`/`oN` form.
    Sym(String),
    /// A concrete dimension.
    Lit(i64),
}

impl fmt::Display for ShapeDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeDim::Sym(s) => write!(f, "{s}"),
            ShapeDim::Lit(v) => write!(f, "{v}"),
        }
    }
}

/// An abstract tensor: `(rank, shape, dtype)` with `rank` implied by
/// `shape.len()` and fixed once bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractTensor {
    shape: Vec<ShapeDim>,
    /// The tensor's element type.
    pub dtype: DType,
}

impl AbstractTensor {
    /// Construct a new abstract tensor from its shape and element type.
    #[must_use]
    pub fn new(shape: Vec<ShapeDim>, dtype: DType) -> Self {
        AbstractTensor { shape, dtype }
    }

    /// The tensor's rank (number of dimensions).
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The tensor's shape, as a slice of dimensions.
    #[must_use]
    pub fn shape(&self) -> &[ShapeDim] {
        &self.shape
    }

    /// Returns a new tensor with every occurrence of `from` replaced by
    /// `to`. Never mutates `self`.
    #[must_use]
    pub fn substitute(&self, from: &str, to: &ShapeDim) -> AbstractTensor {
        let shape = self
            .shape
            .iter()
            .map(|d| match d {
                ShapeDim::Sym(s) if s == from => to.clone(),
                other => other.clone(),
            })
            .collect();
        AbstractTensor {
            shape,
            dtype: self.dtype,
        }
    }

    /// The product of all concretized dimensions, or `None` if any
    /// dimension is still symbolic.
    #[must_use]
    pub fn concrete_size(&self) -> Option<i64> {
        let mut total: i64 = 1;
        for d in &self.shape {
            match d {
                ShapeDim::Lit(v) => total = total.checked_mul(*v)?,
                ShapeDim::Sym(_) => return None,
            }
        }
        Some(total)
    }
}

/// A tagged reference to an operator (dialect-registered or the
/// rule-driven `AutoInf` node used by `hybrid` generation), together with
/// its concrete attribute values for one instruction site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorNode {
    /// The operator's registry name, or `"__autoinf__"` for the
    /// rule-driven node the hybrid generator inserts (`spec.md` §4.8).
    pub name: String,
    /// Concrete attribute values for this instruction site, keyed by
    /// attribute name.
    pub attrs: BTreeMap<String, AttrLiteral>,
}

impl OperatorNode {
    /// The reserved name of the rule-driven `AutoInf` operator node.
    pub const AUTOINF: &'static str = "__autoinf__";

    /// Construct a node for a named, dialect-registered operator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        OperatorNode {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// `true` iff this is the rule-driven `AutoInf` node rather than a
    /// dialect-registered operator.
    #[must_use]
    pub fn is_autoinf(&self) -> bool {
        self.name == Self::AUTOINF
    }
}

/// One instruction in the graph IR: an operator node applied to an ordered
/// tuple of input variable names, producing an ordered tuple of output
/// variable names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operator this instruction applies.
    pub op: OperatorNode,
    /// Input variable names, in argument order.
    pub inputs: Vec<String>,
    /// Output variable names, in result order.
    pub outputs: Vec<String>,
}

/// A directed acyclic list of instructions over named abstract tensors.
///
/// Placeholders are a distinguished set of variable names standing for
/// graph inputs or as-yet-unoccupied tensors; every other variable is
/// produced by exactly one instruction's outputs (single static
/// assignment), which keeps the use-def relationship acyclic by
/// construction: an instruction may only reference variables introduced by
/// an earlier instruction or a placeholder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    instructions: Vec<Instruction>,
    tensors: BTreeMap<String, AbstractTensor>,
    placeholders: std::collections::BTreeSet<String>,
}

impl Graph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Graph::default()
    }

    /// Declare a placeholder variable with its abstract tensor type.
    pub fn declare_placeholder(&mut self, name: impl Into<String>, tensor: AbstractTensor) {
        let name = name.into();
        self.tensors.insert(name.clone(), tensor);
        self.placeholders.insert(name);
    }

    /// Append an instruction, binding its output variables to the given
    /// abstract tensors. Returns an error if any input variable is unknown
    /// (which would break the DAG's use-def acyclicity) or if an output
    /// name collides with an existing variable.
    pub fn push_instruction(
        &mut self,
        instruction: Instruction,
        output_tensors: Vec<AbstractTensor>,
    ) -> Result<(), GraphError> {
        for input in &instruction.inputs {
            if !self.tensors.contains_key(input) {
                return Err(GraphError::UnknownVariable(input.clone()));
            }
        }
        if instruction.outputs.len() != output_tensors.len() {
            return Err(GraphError::ArityMismatch {
                expected: instruction.outputs.len(),
                actual: output_tensors.len(),
            });
        }
        for name in &instruction.outputs {
            if self.tensors.contains_key(name) {
                return Err(GraphError::DuplicateVariable(name.clone()));
            }
        }
        for (name, tensor) in instruction.outputs.iter().zip(output_tensors) {
            self.tensors.insert(name.clone(), tensor);
        }
        self.instructions.push(instruction);
        Ok(())
    }

    /// Resolve `retire` (a placeholder) to no longer be an open placeholder,
    /// used when a backward-insertion occupies it with a real instruction's
    /// output.
    pub fn retire_placeholder(&mut self, name: &str) {
        self.placeholders.remove(name);
    }

    /// Graft an instruction backward onto an existing placeholder
    /// (`spec.md` §4.8 backward insertion): `fresh_inputs` are declared as
    /// new placeholders first, then `instruction` is appended with its
    /// `outputs` required to already name open placeholders, which retire
    /// and become bound to `output_tensors` instead.
    pub fn graft_backward(
        &mut self,
        instruction: Instruction,
        fresh_inputs: Vec<(String, AbstractTensor)>,
        output_tensors: Vec<AbstractTensor>,
    ) -> Result<(), GraphError> {
        for name in &instruction.outputs {
            if !self.placeholders.contains(name) {
                return Err(GraphError::UnknownVariable(name.clone()));
            }
        }
        if instruction.outputs.len() != output_tensors.len() {
            return Err(GraphError::ArityMismatch {
                expected: instruction.outputs.len(),
                actual: output_tensors.len(),
            });
        }
        for (name, tensor) in fresh_inputs {
            self.tensors.insert(name.clone(), tensor);
            self.placeholders.insert(name);
        }
        for input in &instruction.inputs {
            if !self.tensors.contains_key(input) {
                return Err(GraphError::UnknownVariable(input.clone()));
            }
        }
        for name in &instruction.outputs {
            self.placeholders.remove(name);
        }
        for (name, tensor) in instruction.outputs.iter().zip(output_tensors) {
            self.tensors.insert(name.clone(), tensor);
        }
        self.instructions.push(instruction);
        Ok(())
    }

    /// The instructions in insertion order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The number of compute instructions (not counting placeholder
    /// declarations).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.instructions.len()
    }

    /// All currently-open placeholder variable names.
    #[must_use]
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(String::as_str)
    }

    /// The abstract tensor bound to a variable name, if any.
    #[must_use]
    pub fn tensor(&self, name: &str) -> Option<&AbstractTensor> {
        self.tensors.get(name)
    }

    /// All variable names currently bound in the graph (placeholders and
    /// instruction outputs).
    #[must_use]
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// `true` iff any instruction reads or writes `var`.
    #[must_use]
    pub fn references_variable(&self, var: &str) -> bool {
        self.instructions
            .iter()
            .any(|i| i.inputs.iter().any(|v| v == var) || i.outputs.iter().any(|v| v == var))
    }
}

/// An error produced while mutating a [`Graph`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An instruction referenced a variable with no prior binding.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    /// An instruction's output name collided with an existing variable.
    #[error("duplicate variable: {0}")]
    DuplicateVariable(String),
    /// The number of declared outputs did not match the number of output
    /// tensors supplied.
    #[error("output arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        /// Number of output names on the instruction.
        expected: usize,
        /// Number of output tensors supplied.
        actual: usize,
    },
}
