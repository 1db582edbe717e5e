use std::fs;
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;

use crate::bytecode::image::{Function, MethodTable, ProgramImage, Type};
use crate::bytecode::op::{Instruction, JUMP_TARGET_LIMIT};
use crate::bytecode::pool::{
    Pool, PoolEntry, TAG_FUNCTION, TAG_INT, TAG_INT_ALT, TAG_NATIVE_REF, TAG_STRING, TAG_TYPE,
};

const MAGIC: [u8; 2] = [0xDE, 0xAD];

/// Failure to turn a module file into a [`ProgramImage`]. Reported before
/// any instruction executes.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("can not read module: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid magic number")]
    BadMagic,

    #[error("unsupported version {major}.{minor}")]
    UnsupportedVersion { major: i32, minor: i32 },

    #[error("unexpected end of module")]
    UnexpectedEof,

    #[error("unsupported tag {0} in constant-pool")]
    BadTag(u8),

    #[error("invalid utf-8 in string payload")]
    BadString,

    #[error("empty instruction in function '{0}'")]
    EmptyInstruction(String),

    #[error("function '{0}' exceeds the addressable instruction count")]
    OversizedFunction(String),

    #[error("{kind} '{name}' has no constant-pool placeholder")]
    MissingPlaceholder { kind: &'static str, name: String },

    #[error("entry address {0} does not reference a function")]
    BadEntry(u8),
}

/// Cursor over the raw module bytes. Every read is bounds-checked so a
/// truncated module surfaces as [`LoadError::UnexpectedEof`].
struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, cursor: 0 }
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        let byte = self
            .bytes
            .get(self.cursor)
            .copied()
            .ok_or(LoadError::UnexpectedEof)?;
        self.cursor += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LoadError> {
        let end = self.cursor.checked_add(len).ok_or(LoadError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.cursor..end)
            .ok_or(LoadError::UnexpectedEof)?;
        self.cursor = end;
        Ok(slice)
    }

    /// 4-byte big-endian signed integer.
    fn i32(&mut self) -> Result<i32, LoadError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Length-prefixed string: 4-byte big-endian length, then raw bytes.
    fn string(&mut self) -> Result<String, LoadError> {
        let len = self.i32()?;
        if len < 0 {
            return Err(LoadError::UnexpectedEof);
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| LoadError::BadString)
    }
}

/// Load a module from disk. The file buffer is discarded once decoding
/// finishes; only the derived [`ProgramImage`] survives.
pub fn load(path: impl AsRef<Path>) -> Result<ProgramImage, LoadError> {
    let bytes = fs::read(path)?;
    load_bytes(&bytes)
}

/// Decode a module from an in-memory byte buffer.
pub fn load_bytes(bytes: &[u8]) -> Result<ProgramImage, LoadError> {
    let mut r = Reader::new(bytes);

    // header: both magic bytes must match
    if r.take(2)? != MAGIC {
        return Err(LoadError::BadMagic);
    }

    let major = r.i32()?;
    let minor = r.i32()?;
    if minor < 1 || major > 1 {
        return Err(LoadError::UnsupportedVersion { major, minor });
    }

    let entry = r.u8()?;

    let mut pool = load_pool(&mut r)?;
    load_functions(&mut pool, &mut r)?;
    load_structs(&mut pool, &mut r)?;

    // the entry slot must have been resolved by the function table
    match pool.entry(entry) {
        Some(PoolEntry::Function(_)) => Ok(ProgramImage::new(entry, pool)),
        _ => Err(LoadError::BadEntry(entry)),
    }
}

fn load_pool(r: &mut Reader) -> Result<Pool, LoadError> {
    let count = r.u8()?;
    let mut pool = Pool::new();

    for _ in 0..count {
        let tag = r.u8()?;
        let entry = match tag {
            TAG_INT | TAG_INT_ALT => PoolEntry::Int(r.i32()?),
            TAG_STRING..=TAG_NATIVE_REF => PoolEntry::Str(r.string()?.into()),
            other => return Err(LoadError::BadTag(other)),
        };
        pool.push(tag, entry);
    }

    Ok(pool)
}

fn load_instructions(r: &mut Reader, function: &str) -> Result<Vec<Instruction>, LoadError> {
    let count = r.i32()?;
    if count < 0 {
        return Err(LoadError::UnexpectedEof);
    }
    if count as usize > JUMP_TARGET_LIMIT {
        return Err(LoadError::OversizedFunction(function.to_string()));
    }

    let mut instructions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = r.u8()?;
        if len == 0 {
            return Err(LoadError::EmptyInstruction(function.to_string()));
        }
        instructions.push(Instruction::new(r.take(len as usize)?.to_vec()));
    }

    Ok(instructions)
}

fn load_functions(pool: &mut Pool, r: &mut Reader) -> Result<(), LoadError> {
    let count = r.u8()?;

    for _ in 0..count {
        let name = r.string()?;
        let op_stack = r.u8()?;
        let locals = r.u8()?;
        let instructions = load_instructions(r, &name)?;

        let function = Rc::new(Function {
            name: name.clone(),
            locals,
            op_stack,
            instructions,
        });

        if !pool.resolve(TAG_FUNCTION, &name, PoolEntry::Function(function)) {
            return Err(LoadError::MissingPlaceholder {
                kind: "function",
                name,
            });
        }
    }

    Ok(())
}

fn load_structs(pool: &mut Pool, r: &mut Reader) -> Result<(), LoadError> {
    let count = r.u8()?;

    for _ in 0..count {
        let name = r.string()?;
        let fields = r.u8()?;
        let method_count = r.u8()?;

        let methods = if method_count > 0 {
            let mut entries = Vec::with_capacity(method_count as usize);
            for _ in 0..method_count {
                let method_name = r.string()?;
                let address = r.u8()?;
                entries.push((method_name, address));
            }
            Some(MethodTable::new(entries))
        } else {
            None
        };

        let ty = Rc::new(Type {
            name: name.clone(),
            fields,
            methods,
        });

        if !pool.resolve(TAG_TYPE, &name, PoolEntry::Type(ty)) {
            return Err(LoadError::MissingPlaceholder { kind: "type", name });
        }
    }

    Ok(())
}
