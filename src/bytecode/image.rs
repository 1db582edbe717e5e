use std::rc::Rc;

use crate::bytecode::op::Instruction;
use crate::bytecode::pool::Pool;

/// Name of the reserved sentinel type every array instance reports.
pub const ARRAY_TYPE_NAME: &str = "arr";

/// A named function as decoded from the module's function table.
///
/// Frames keep an `Rc` to the function they execute while the constant
/// pool stays the owner of record.
#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: String,
    /// Number of local slots a frame for this function allocates.
    pub locals: u8,
    /// Operand-stack capacity a frame for this function allocates.
    pub op_stack: u8,
    pub instructions: Vec<Instruction>,
}

/// Ordered virtual-method table of a type: `(name, pool address)` pairs.
///
/// Resolution is a first-match linear scan in declared order.
#[derive(Debug, PartialEq)]
pub struct MethodTable {
    entries: Vec<(String, u8)>,
}

impl MethodTable {
    pub fn new(entries: Vec<(String, u8)>) -> Self {
        MethodTable { entries }
    }

    /// Pool address of the first method with a matching name.
    pub fn resolve(&self, name: &str) -> Option<u8> {
        self.entries
            .iter()
            .find(|(method, _)| method == name)
            .map(|(_, addr)| *addr)
    }

    pub fn entries(&self) -> &[(String, u8)] {
        &self.entries
    }
}

/// A user-defined type: field count plus an optional virtual-method table.
#[derive(Debug, PartialEq)]
pub struct Type {
    pub name: String,
    pub fields: u8,
    pub methods: Option<MethodTable>,
}

/// The loaded module: entry function address plus the constant pool.
#[derive(Debug)]
pub struct ProgramImage {
    pub entry: u8,
    pub pool: Pool,
}

impl ProgramImage {
    pub fn new(entry: u8, pool: Pool) -> Self {
        ProgramImage { entry, pool }
    }
}

/// Shared handle to a pool-owned function.
pub type FunctionRef = Rc<Function>;

/// Shared handle to a pool-owned type.
pub type TypeRef = Rc<Type>;
