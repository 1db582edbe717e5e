pub mod disasm;
pub mod image;
pub mod loader;
pub mod op;
pub mod pool;

pub use image::{Function, MethodTable, ProgramImage, Type};
pub use loader::LoadError;
pub use op::{Instruction, Opcode};
