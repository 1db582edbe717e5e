use crate::bytecode::image::{FunctionRef, ProgramImage};
use crate::bytecode::op::Instruction;
use crate::bytecode::pool::Pool;
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{VmError, VmErrorKind};
use crate::runtime::value::Value;

/// Owns the program image and the call-frame stack, and exposes the
/// primitives the interpreter drives: operand push/pop, locals, fetch,
/// jump, line tracking and frame push/pop.
///
/// Operand-stack and local-slot misuse is fatal here: an out-of-range
/// access signals a corrupt or miscompiled module, not a recoverable
/// condition.
#[derive(Debug)]
pub struct ExecutionContext {
    image: ProgramImage,
    frames: Vec<Frame>,
}

impl ExecutionContext {
    pub fn new(image: ProgramImage) -> Self {
        ExecutionContext {
            image,
            frames: Vec::new(),
        }
    }

    pub fn entry(&self) -> u8 {
        self.image.entry
    }

    pub fn pool(&self) -> &Pool {
        &self.image.pool
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn function_name(&self) -> Option<String> {
        self.frames
            .last()
            .map(|frame| frame.function_name().to_string())
    }

    pub fn line(&self) -> i32 {
        self.frames.last().map(|frame| frame.line()).unwrap_or(-1)
    }

    /// Build a fatal error carrying the current frame context.
    pub fn fail(&self, kind: VmErrorKind, message: impl Into<String>) -> VmError {
        match self.function_name() {
            Some(function) => VmError::in_frame(kind, message, function, self.line()),
            None => VmError::bare(kind, message),
        }
    }

    pub fn push_frame(&mut self, function: FunctionRef) {
        self.frames.push(Frame::new(function));
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn frame(&self) -> Result<&Frame, VmError> {
        self.frames
            .last()
            .ok_or_else(|| VmError::bare(VmErrorKind::Program, "no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::bare(VmErrorKind::Program, "no active frame"))
    }

    pub fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.frame_mut()?.push(value) {
            Ok(())
        } else {
            Err(self.fail(VmErrorKind::Program, "operand stack overflow"))
        }
    }

    pub fn pop(&mut self) -> Result<Value, VmError> {
        match self.frame_mut()?.pop() {
            Some(value) => Ok(value),
            None => Err(self.fail(VmErrorKind::Program, "operand stack underflow")),
        }
    }

    pub fn load_local(&self, idx: u8) -> Result<Value, VmError> {
        match self.frame()?.local(idx) {
            Some(value) => Ok(value.clone()),
            None => Err(self.fail(
                VmErrorKind::Program,
                format!("local slot {} out of range", idx),
            )),
        }
    }

    pub fn store_local(&mut self, idx: u8, value: Value) -> Result<(), VmError> {
        if self.frame_mut()?.set_local(idx, value) {
            Ok(())
        } else {
            Err(self.fail(
                VmErrorKind::Program,
                format!("local slot {} out of range", idx),
            ))
        }
    }

    pub fn fetch(&mut self) -> Result<Instruction, VmError> {
        match self.frame_mut()?.fetch() {
            Some(inst) => Ok(inst),
            None => Err(self.fail(
                VmErrorKind::Program,
                "instruction pointer out of range",
            )),
        }
    }

    pub fn jump(&mut self, address: usize) -> Result<(), VmError> {
        self.frame_mut()?.jump(address);
        Ok(())
    }

    pub fn set_line(&mut self, line: i32) -> Result<(), VmError> {
        self.frame_mut()?.set_line(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::image::Function;
    use crate::bytecode::op::Opcode;
    use crate::bytecode::pool::{Pool, PoolEntry, TAG_FUNCTION};
    use std::rc::Rc;

    fn test_function(name: &str, op_stack: u8) -> FunctionRef {
        Rc::new(Function {
            name: name.to_string(),
            locals: 1,
            op_stack,
            instructions: vec![Instruction::new(vec![Opcode::Return as u8])],
        })
    }

    fn context() -> ExecutionContext {
        let mut pool = Pool::new();
        pool.push(TAG_FUNCTION, PoolEntry::Function(test_function("main", 4)));
        ExecutionContext::new(ProgramImage::new(0, pool))
    }

    #[test]
    fn test_frame_stack_depth() {
        let mut ctx = context();
        assert!(ctx.is_empty());

        ctx.push_frame(test_function("main", 4));
        ctx.push_frame(test_function("helper", 4));
        assert_eq!(ctx.depth(), 2);
        assert_eq!(ctx.function_name().as_deref(), Some("helper"));

        ctx.pop_frame();
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.function_name().as_deref(), Some("main"));
    }

    #[test]
    fn test_operand_roundtrip_is_lifo() {
        let mut ctx = context();
        ctx.push_frame(test_function("main", 4));

        ctx.push(Value::Int(1)).unwrap();
        ctx.push(Value::Int(2)).unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_pop_empty_is_fatal() {
        let mut ctx = context();
        ctx.push_frame(test_function("main", 4));

        let err = ctx.pop().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::Program);
        assert_eq!(err.function.as_deref(), Some("main"));
    }

    #[test]
    fn test_push_beyond_capacity_is_fatal() {
        let mut ctx = context();
        ctx.push_frame(test_function("main", 1));

        ctx.push(Value::Null).unwrap();
        let err = ctx.push(Value::Null).unwrap_err();
        assert_eq!(err.kind, VmErrorKind::Program);
        assert!(err.message.contains("overflow"));
    }

    #[test]
    fn test_local_out_of_range_is_fatal() {
        let mut ctx = context();
        ctx.push_frame(test_function("main", 4));

        assert!(ctx.store_local(0, Value::Int(3)).is_ok());
        assert_eq!(ctx.load_local(0).unwrap().as_int(), Some(3));
        assert!(ctx.load_local(1).is_err());
        assert!(ctx.store_local(1, Value::Null).is_err());
    }

    #[test]
    fn test_fetch_past_end_is_fatal() {
        let mut ctx = context();
        ctx.push_frame(test_function("main", 4));

        assert!(ctx.fetch().is_ok());
        let err = ctx.fetch().unwrap_err();
        assert!(err.message.contains("instruction pointer"));
    }

    #[test]
    fn test_error_context_carries_line() {
        let mut ctx = context();
        ctx.push_frame(test_function("main", 4));
        ctx.set_line(17).unwrap();

        let err = ctx.fail(VmErrorKind::Verify, "boom");
        assert_eq!(err.line, Some(17));
        assert_eq!(err.to_string(), "boom (in main: line 17)");
    }
}
