use crate::bytecode::image::FunctionRef;
use crate::bytecode::op::Instruction;
use crate::runtime::value::Value;

/// One activation record: locals, operand stack, instruction pointer and
/// the current source line. The caller link is the position in the
/// context's frame stack.
#[derive(Debug)]
pub struct Frame {
    function: FunctionRef,
    locals: Vec<Value>,
    stack: Vec<Value>,
    ip: usize,
    line: i32,
}

impl Frame {
    pub fn new(function: FunctionRef) -> Self {
        let locals = vec![Value::Null; function.locals as usize];
        let stack = Vec::with_capacity(function.op_stack as usize);
        Frame {
            function,
            locals,
            stack,
            ip: 0,
            line: -1,
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function.name
    }

    /// False when the push would exceed the declared operand-stack
    /// capacity.
    pub fn push(&mut self, value: Value) -> bool {
        if self.stack.len() >= self.function.op_stack as usize {
            return false;
        }
        self.stack.push(value);
        true
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn local(&self, idx: u8) -> Option<&Value> {
        self.locals.get(idx as usize)
    }

    pub fn set_local(&mut self, idx: u8, value: Value) -> bool {
        match self.locals.get_mut(idx as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Fetch the instruction under the instruction pointer and advance.
    /// `None` when execution ran off the end of the function body.
    pub fn fetch(&mut self) -> Option<Instruction> {
        let inst = self.function.instructions.get(self.ip)?.clone();
        self.ip += 1;
        Some(inst)
    }

    pub fn jump(&mut self, address: usize) {
        self.ip = address;
    }

    pub fn line(&self) -> i32 {
        self.line
    }

    pub fn set_line(&mut self, line: i32) {
        self.line = line;
    }
}
