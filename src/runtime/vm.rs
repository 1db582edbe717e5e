use crate::bytecode::image::{ARRAY_TYPE_NAME, ProgramImage};
use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::pool::{PoolEntry, TAG_INT, TAG_INT_ALT, TAG_METHOD_REF, TAG_NATIVE_REF, TAG_STRING};
use crate::runtime::context::ExecutionContext;
use crate::runtime::heap::{Handle, Heap, Instance};
use crate::runtime::native::NativeRegistry;
use crate::runtime::runtime_error::{VmError, VmErrorKind};
use crate::runtime::value::Value;

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Frame-stack depth at which the next call aborts.
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 300_000,
        }
    }
}

/// The fetch-decode-execute engine.
///
/// Binary opcodes use a fixed operand convention: the value pushed
/// earlier is the left-hand operand (`rhs` is popped first, `lhs`
/// second). This holds uniformly for subtraction, modulo, shifts and the
/// ordering comparisons.
pub struct Vm {
    ctx: ExecutionContext,
    heap: Heap,
    natives: NativeRegistry,
    config: VmConfig,
}

impl Vm {
    pub fn new(image: ProgramImage) -> Self {
        Vm::with_config(image, VmConfig::default())
    }

    pub fn with_config(image: ProgramImage, config: VmConfig) -> Self {
        Vm {
            ctx: ExecutionContext::new(image),
            heap: Heap::new(),
            natives: NativeRegistry::with_builtins(),
            config,
        }
    }

    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Push the entry function's frame and run until the frame stack
    /// empties. Any fatal condition aborts the run as an `Err`; nothing
    /// is recoverable from within the executing program.
    pub fn run(&mut self) -> Result<(), VmError> {
        let entry = self.ctx.entry();
        self.invoke_virtual(entry, 0)?;
        while !self.ctx.is_empty() {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), VmError> {
        let inst = self.ctx.fetch()?;
        let Some(opcode) = Opcode::from_byte(inst.opcode_byte()) else {
            return Err(self.ctx.fail(
                VmErrorKind::Program,
                format!("unsupported opcode {}", inst.opcode_byte()),
            ));
        };
        self.execute(opcode, &inst)
    }

    fn execute(&mut self, opcode: Opcode, inst: &Instruction) -> Result<(), VmError> {
        match opcode {
            // ------------------------------------------------------------
            // literals & locals
            // ------------------------------------------------------------
            Opcode::PushNull => self.ctx.push(Value::Null),
            Opcode::PushInt => {
                let value = self.byte_operand(inst, 0)?;
                self.ctx.push(Value::Int(value as i32))
            }
            Opcode::LoadConst => {
                let addr = self.byte_operand(inst, 0)?;
                self.load_const(addr)
            }
            Opcode::LoadLocal => {
                let idx = self.byte_operand(inst, 0)?;
                let value = self.ctx.load_local(idx)?;
                self.ctx.push(value)
            }
            Opcode::StoreLocal => {
                let idx = self.byte_operand(inst, 0)?;
                let value = self.ctx.pop()?;
                self.ctx.store_local(idx, value)
            }

            // ------------------------------------------------------------
            // objects & arrays
            // ------------------------------------------------------------
            Opcode::New => {
                let addr = self.byte_operand(inst, 0)?;
                self.new_object(addr)
            }
            Opcode::Free => self.free_instance(),
            Opcode::NullCheck => {
                let value = self.ctx.pop()?;
                if matches!(value, Value::Null) {
                    return Err(self.ctx.fail(VmErrorKind::Verify, "null pointer error"));
                }
                self.ctx.push(value)
            }
            Opcode::CheckCast => {
                let addr = self.byte_operand(inst, 0)?;
                self.check_cast(addr)
            }
            Opcode::MakeArray => {
                let count = self.byte_operand(inst, 0)? as usize;
                self.make_array(count)
            }
            Opcode::ReadArray => {
                let idx = self.byte_operand(inst, 0)? as usize;
                self.read_array(idx)
            }
            Opcode::WriteArray => {
                let idx = self.byte_operand(inst, 0)? as usize;
                self.write_array(idx)
            }
            Opcode::GetField => {
                let idx = self.byte_operand(inst, 0)? as usize;
                self.get_field(idx)
            }
            Opcode::PutField => {
                let idx = self.byte_operand(inst, 0)? as usize;
                self.put_field(idx)
            }

            // ------------------------------------------------------------
            // calls
            // ------------------------------------------------------------
            Opcode::InvokeVirtual => {
                let addr = self.byte_operand(inst, 0)?;
                let argc = self.byte_operand(inst, 1)? as usize;
                self.invoke_virtual(addr, argc)
            }
            Opcode::InvokeTemplate => {
                let addr = self.byte_operand(inst, 0)?;
                let argc = self.byte_operand(inst, 1)? as usize;
                self.invoke_template(addr, argc)
            }
            Opcode::InvokeNative => {
                let addr = self.byte_operand(inst, 0)?;
                let argc = self.byte_operand(inst, 1)? as usize;
                self.invoke_native(addr, argc)
            }
            Opcode::Return => {
                let value = self.ctx.pop()?;
                self.ctx.pop_frame();
                if !self.ctx.is_empty() {
                    self.ctx.push(value)?;
                }
                Ok(())
            }

            // ------------------------------------------------------------
            // stack shuffle
            // ------------------------------------------------------------
            Opcode::Dup => {
                let value = self.ctx.pop()?;
                self.ctx.push(value.clone())?;
                self.ctx.push(value)
            }
            Opcode::Swap => {
                let top = self.ctx.pop()?;
                let under = self.ctx.pop()?;
                self.ctx.push(top)?;
                self.ctx.push(under)
            }
            Opcode::Pop => self.ctx.pop().map(|_| ()),

            // ------------------------------------------------------------
            // unary
            // ------------------------------------------------------------
            Opcode::Not => {
                let value = self.pop_int()?;
                self.ctx.push(Value::Int(!value))
            }
            Opcode::Neg => {
                let value = self.pop_int()?;
                self.ctx.push(Value::Int(value.wrapping_neg()))
            }

            // ------------------------------------------------------------
            // binary integer / bitwise / compare
            // ------------------------------------------------------------
            Opcode::AddI => self.int_binop(|lhs, rhs| lhs.wrapping_add(rhs)),
            Opcode::SubI => self.int_binop(|lhs, rhs| lhs.wrapping_sub(rhs)),
            Opcode::MulI => self.int_binop(|lhs, rhs| lhs.wrapping_mul(rhs)),
            Opcode::Mod => {
                let rhs = self.pop_int()?;
                let lhs = self.pop_int()?;
                if rhs == 0 {
                    return Err(self.ctx.fail(VmErrorKind::Verify, "modulo by zero"));
                }
                self.ctx.push(Value::Int(lhs.wrapping_rem(rhs)))
            }
            Opcode::And => self.int_binop(|lhs, rhs| (lhs != 0 && rhs != 0) as i32),
            Opcode::Or => self.int_binop(|lhs, rhs| (lhs != 0 || rhs != 0) as i32),
            Opcode::AndBit => self.int_binop(|lhs, rhs| lhs & rhs),
            Opcode::OrBit => self.int_binop(|lhs, rhs| lhs | rhs),
            Opcode::Xor => self.int_binop(|lhs, rhs| lhs ^ rhs),
            Opcode::ShiftAl => self.int_binop(|lhs, rhs| lhs.wrapping_shl(rhs as u32)),
            Opcode::ShiftAr => self.int_binop(|lhs, rhs| lhs.wrapping_shr(rhs as u32)),
            Opcode::Less => self.int_binop(|lhs, rhs| (lhs < rhs) as i32),
            Opcode::Greater => self.int_binop(|lhs, rhs| (lhs > rhs) as i32),
            Opcode::LessEq => self.int_binop(|lhs, rhs| (lhs <= rhs) as i32),
            Opcode::GreaterEq => self.int_binop(|lhs, rhs| (lhs >= rhs) as i32),

            Opcode::Equals => self.identity_binop(true),
            Opcode::NotEquals => self.identity_binop(false),

            // ------------------------------------------------------------
            // binary float & conversions
            // ------------------------------------------------------------
            Opcode::AddF => self.float_binop(|lhs, rhs| lhs + rhs),
            Opcode::SubF => self.float_binop(|lhs, rhs| lhs - rhs),
            Opcode::MulF => self.float_binop(|lhs, rhs| lhs * rhs),
            Opcode::Div => self.float_binop(|lhs, rhs| lhs / rhs),
            Opcode::I2F => {
                let value = self.pop_int()?;
                self.ctx.push(Value::Float(value as f32))
            }
            Opcode::F2I => {
                let value = self.pop_float()?;
                self.ctx.push(Value::Int(value as i32))
            }

            // ------------------------------------------------------------
            // control flow & diagnostics
            // ------------------------------------------------------------
            Opcode::Goto => {
                let target = self.wide_operand(inst)? as usize;
                self.ctx.jump(target)
            }
            Opcode::BranchZero => {
                let target = self.wide_operand(inst)? as usize;
                let condition = self.pop_int()?;
                if condition == 0 {
                    self.ctx.jump(target)?;
                }
                Ok(())
            }
            Opcode::BranchNotZero => {
                let target = self.wide_operand(inst)? as usize;
                let condition = self.pop_int()?;
                if condition != 0 {
                    self.ctx.jump(target)?;
                }
                Ok(())
            }
            Opcode::NewLine => {
                let line = self.wide_operand(inst)? as i32;
                self.ctx.set_line(line)
            }
        }
    }

    // ----------------------------------------------------------------
    // operand helpers
    // ----------------------------------------------------------------

    fn byte_operand(&self, inst: &Instruction, n: usize) -> Result<u8, VmError> {
        inst.operand(n)
            .ok_or_else(|| self.ctx.fail(VmErrorKind::Program, "malformed instruction"))
    }

    fn wide_operand(&self, inst: &Instruction) -> Result<u16, VmError> {
        inst.wide_operand()
            .ok_or_else(|| self.ctx.fail(VmErrorKind::Program, "malformed instruction"))
    }

    fn pop_int(&mut self) -> Result<i32, VmError> {
        let value = self.ctx.pop()?;
        value.as_int().ok_or_else(|| {
            self.ctx.fail(
                VmErrorKind::Verify,
                format!("expected int value, got {}", value.kind()),
            )
        })
    }

    fn pop_float(&mut self) -> Result<f32, VmError> {
        let value = self.ctx.pop()?;
        value.as_float().ok_or_else(|| {
            self.ctx.fail(
                VmErrorKind::Verify,
                format!("expected float value, got {}", value.kind()),
            )
        })
    }

    fn pop_object(&mut self) -> Result<Handle, VmError> {
        match self.ctx.pop()? {
            Value::Obj(handle) => Ok(handle),
            Value::Null => Err(self.ctx.fail(VmErrorKind::Verify, "null pointer error")),
            other => Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("expected object reference, got {}", other.kind()),
            )),
        }
    }

    fn pop_array(&mut self) -> Result<Handle, VmError> {
        match self.ctx.pop()? {
            Value::Arr(handle) => Ok(handle),
            Value::Null => Err(self.ctx.fail(VmErrorKind::Verify, "null pointer error")),
            other => Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("expected array reference, got {}", other.kind()),
            )),
        }
    }

    fn int_binop(&mut self, op: impl Fn(i32, i32) -> i32) -> Result<(), VmError> {
        let rhs = self.pop_int()?;
        let lhs = self.pop_int()?;
        self.ctx.push(Value::Int(op(lhs, rhs)))
    }

    fn float_binop(&mut self, op: impl Fn(f32, f32) -> f32) -> Result<(), VmError> {
        let rhs = self.pop_float()?;
        let lhs = self.pop_float()?;
        self.ctx.push(Value::Float(op(lhs, rhs)))
    }

    fn identity_binop(&mut self, want_equal: bool) -> Result<(), VmError> {
        let rhs = self.ctx.pop()?;
        let lhs = self.ctx.pop()?;
        let equal = lhs.identity_eq(&rhs);
        self.ctx.push(Value::Int((equal == want_equal) as i32))
    }

    // ----------------------------------------------------------------
    // heap helpers
    // ----------------------------------------------------------------

    fn object_field_count(&self, handle: Handle) -> Result<usize, VmError> {
        match self.heap.get(handle) {
            Some(Instance::Object(obj)) => Ok(obj.fields.len()),
            _ => Err(self.ctx.fail(VmErrorKind::Verify, "stale object reference")),
        }
    }

    fn array_len(&self, handle: Handle) -> Result<usize, VmError> {
        match self.heap.get(handle) {
            Some(Instance::Array(elements)) => Ok(elements.len()),
            _ => Err(self.ctx.fail(VmErrorKind::Verify, "stale array reference")),
        }
    }

    // ----------------------------------------------------------------
    // opcode bodies
    // ----------------------------------------------------------------

    fn load_const(&mut self, addr: u8) -> Result<(), VmError> {
        let slot_tag = self.ctx.pool().tag(addr);
        let value = match (slot_tag, self.ctx.pool().entry(addr)) {
            (Some(TAG_INT) | Some(TAG_INT_ALT), Some(PoolEntry::Int(value))) => Value::Int(*value),
            (Some(TAG_STRING), Some(PoolEntry::Str(text))) => Value::Str(text.clone()),
            (None, _) => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant index {} out of range", addr),
                ));
            }
            _ => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant {} is not loadable", addr),
                ));
            }
        };
        self.ctx.push(value)
    }

    fn new_object(&mut self, addr: u8) -> Result<(), VmError> {
        let ty = match self.ctx.pool().entry(addr) {
            Some(PoolEntry::Type(ty)) => ty.clone(),
            _ => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant {} is not a type", addr),
                ));
            }
        };
        let handle = self.heap.alloc_object(ty);
        self.ctx.push(Value::Obj(handle))
    }

    fn free_instance(&mut self) -> Result<(), VmError> {
        match self.ctx.pop()? {
            Value::Null => Ok(()),
            Value::Obj(handle) | Value::Arr(handle) => {
                if self.heap.free(handle) {
                    Ok(())
                } else {
                    Err(self.ctx.fail(VmErrorKind::Verify, "reference already freed"))
                }
            }
            other => Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("expected reference, got {}", other.kind()),
            )),
        }
    }

    fn check_cast(&mut self, addr: u8) -> Result<(), VmError> {
        let required = match self.ctx.pool().entry(addr) {
            Some(PoolEntry::Type(ty)) => ty.clone(),
            _ => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant {} is not a type", addr),
                ));
            }
        };

        let value = self.ctx.pop()?;
        let (given_name, given_fields) = match &value {
            Value::Obj(handle) => match self.heap.get(*handle) {
                Some(Instance::Object(obj)) => (obj.ty.name.clone(), obj.ty.fields),
                _ => {
                    return Err(self.ctx.fail(VmErrorKind::Verify, "stale object reference"));
                }
            },
            Value::Arr(_) => (ARRAY_TYPE_NAME.to_string(), 0),
            Value::Null => {
                return Err(self.ctx.fail(VmErrorKind::Verify, "null pointer error"));
            }
            other => {
                return Err(self.ctx.fail(
                    VmErrorKind::Verify,
                    format!("expected object reference, got {}", other.kind()),
                ));
            }
        };

        if given_fields != required.fields || given_name != required.name {
            return Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("can not cast {} to {}", given_name, required.name),
            ));
        }

        self.ctx.push(value)
    }

    fn make_array(&mut self, count: usize) -> Result<(), VmError> {
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(self.ctx.pop()?);
        }
        // push order is index order: the last pop becomes index 0
        elements.reverse();
        let handle = self.heap.alloc_array(elements);
        self.ctx.push(Value::Arr(handle))
    }

    fn read_array(&mut self, idx: usize) -> Result<(), VmError> {
        let handle = self.pop_array()?;
        let len = self.array_len(handle)?;
        if idx >= len {
            return Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("index {} out of bounds for array length {}", idx, len),
            ));
        }
        let element = match self.heap.get(handle) {
            Some(Instance::Array(elements)) => elements[idx].clone(),
            _ => return Err(self.ctx.fail(VmErrorKind::Verify, "stale array reference")),
        };
        self.ctx.push(element)
    }

    fn write_array(&mut self, idx: usize) -> Result<(), VmError> {
        let handle = self.pop_array()?;
        let len = self.array_len(handle)?;
        if idx >= len {
            return Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("index {} out of bounds for array length {}", idx, len),
            ));
        }
        let value = self.ctx.pop()?;
        let stale = self.ctx.fail(VmErrorKind::Verify, "stale array reference");
        match self.heap.get_mut(handle) {
            Some(Instance::Array(elements)) => {
                elements[idx] = value;
                Ok(())
            }
            _ => Err(stale),
        }
    }

    fn get_field(&mut self, idx: usize) -> Result<(), VmError> {
        let handle = self.pop_object()?;
        let field_count = self.object_field_count(handle)?;
        if idx >= field_count {
            return Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("field index {} out of bounds for {} fields", idx, field_count),
            ));
        }
        let value = match self.heap.get(handle) {
            Some(Instance::Object(obj)) => obj.fields[idx].clone(),
            _ => return Err(self.ctx.fail(VmErrorKind::Verify, "stale object reference")),
        };
        self.ctx.push(value)
    }

    fn put_field(&mut self, idx: usize) -> Result<(), VmError> {
        let handle = self.pop_object()?;
        let field_count = self.object_field_count(handle)?;
        if idx >= field_count {
            return Err(self.ctx.fail(
                VmErrorKind::Verify,
                format!("field index {} out of bounds for {} fields", idx, field_count),
            ));
        }
        let value = self.ctx.pop()?;
        let stale = self.ctx.fail(VmErrorKind::Verify, "stale object reference");
        match self.heap.get_mut(handle) {
            Some(Instance::Object(obj)) => {
                obj.fields[idx] = value;
                Ok(())
            }
            _ => Err(stale),
        }
    }

    /// Statically-resolved direct call: the pool address names the target
    /// function. Popped arguments are re-pushed onto the new frame in
    /// their original order; the callee moves them into locals itself.
    fn invoke_virtual(&mut self, addr: u8, argc: usize) -> Result<(), VmError> {
        if self.ctx.depth() >= self.config.max_call_depth {
            return Err(self.ctx.fail(VmErrorKind::Resource, "too many recursions"));
        }

        let function = match self.ctx.pool().entry(addr) {
            Some(PoolEntry::Function(function)) => function.clone(),
            _ => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant {} is not a function", addr),
                ));
            }
        };

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.ctx.pop()?);
        }

        self.ctx.push_frame(function);
        for arg in args.into_iter().rev() {
            self.ctx.push(arg)?;
        }
        Ok(())
    }

    /// Name-based dispatch: resolve the method name against the
    /// receiver's virtual-method table, then call like `invoke_virtual`.
    /// The receiver is consumed by resolution and is not re-supplied to
    /// the callee.
    fn invoke_template(&mut self, addr: u8, argc: usize) -> Result<(), VmError> {
        let name = match (self.ctx.pool().tag(addr), self.ctx.pool().entry(addr)) {
            (Some(TAG_METHOD_REF), Some(PoolEntry::Str(name))) => name.clone(),
            _ => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant {} is not a method name", addr),
                ));
            }
        };

        let (type_name, target) = match self.ctx.pop()? {
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(Instance::Object(obj)) => {
                    let target = obj
                        .ty
                        .methods
                        .as_ref()
                        .and_then(|table| table.resolve(&name));
                    (obj.ty.name.clone(), target)
                }
                _ => {
                    return Err(self.ctx.fail(VmErrorKind::Verify, "stale object reference"));
                }
            },
            Value::Arr(_) => (ARRAY_TYPE_NAME.to_string(), None),
            Value::Null => {
                return Err(self.ctx.fail(VmErrorKind::Verify, "null pointer error"));
            }
            other => {
                return Err(self.ctx.fail(
                    VmErrorKind::Verify,
                    format!("expected object reference, got {}", other.kind()),
                ));
            }
        };

        let Some(target) = target else {
            return Err(VmError::in_frame(
                VmErrorKind::Verify,
                format!("can not find implementation of '{}'", name),
                type_name,
                self.ctx.line(),
            ));
        };

        self.invoke_virtual(target, argc)
    }

    fn invoke_native(&mut self, addr: u8, argc: usize) -> Result<(), VmError> {
        let name = match (self.ctx.pool().tag(addr), self.ctx.pool().entry(addr)) {
            (Some(TAG_NATIVE_REF), Some(PoolEntry::Str(name))) => name.clone(),
            _ => {
                return Err(self.ctx.fail(
                    VmErrorKind::Program,
                    format!("constant {} is not a native name", addr),
                ));
            }
        };

        let Some(arity) = self.natives.arity(&name) else {
            return Err(VmError::bare(
                VmErrorKind::Verify,
                format!("can not find native function '{}'", name),
            ));
        };
        if arity as usize != argc {
            return Err(VmError {
                kind: VmErrorKind::Verify,
                message: format!("invalid argument count for native function '{}'", name),
                function: self.ctx.function_name(),
                line: None,
            });
        }

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.ctx.pop()?);
        }
        args.reverse();

        let result = self
            .natives
            .invoke(&name, &args)
            .ok_or_else(|| VmError::bare(VmErrorKind::Program, "native function not found"))?;
        self.ctx.push(result)
    }
}
