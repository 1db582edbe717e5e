// =============================================================================
// OP - Instruction set of the cinder virtual machine
// =============================================================================

/// Pool, local-slot and field indices are encoded in a single byte.
pub const BYTE_INDEX_LIMIT: usize = 256;

/// Jump targets are encoded in two big-endian bytes; instructions past
/// this index could never be branched to.
pub const JUMP_TARGET_LIMIT: usize = 65536;

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// Opcode byte only.
    None,
    /// One single-byte operand (pool index, local slot, field index, count).
    Byte,
    /// Two single-byte operands (pool index + argument count).
    ByteByte,
    /// One 16-bit big-endian operand (jump target or line number).
    Wide,
}

/// One operation code, with its wire byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    // literals & locals
    PushNull = 0,
    PushInt = 1,
    LoadConst = 2,
    LoadLocal = 3,
    StoreLocal = 4,

    // objects & arrays
    New = 5,
    Free = 6,
    NullCheck = 7,
    CheckCast = 8,
    I2F = 9,
    F2I = 10,
    MakeArray = 11,
    ReadArray = 12,
    WriteArray = 13,
    GetField = 14,
    PutField = 15,

    // calls
    InvokeVirtual = 16,
    InvokeTemplate = 17,
    InvokeNative = 18,
    Return = 19,

    // stack shuffle
    Dup = 20,
    Swap = 21,
    Pop = 22,

    // unary
    Not = 23,
    Neg = 24,

    // binary integer / bitwise / compare
    AddI = 25,
    SubI = 26,
    MulI = 27,
    Mod = 28,
    And = 29,
    Or = 30,
    AndBit = 31,
    OrBit = 32,
    Xor = 33,
    ShiftAl = 34,
    ShiftAr = 35,

    // binary float
    AddF = 36,
    SubF = 37,
    MulF = 38,
    Div = 39,

    Equals = 40,
    NotEquals = 41,
    Less = 42,
    Greater = 43,
    LessEq = 44,
    GreaterEq = 45,

    // control flow
    Goto = 46,
    BranchNotZero = 47,
    BranchZero = 48,

    // diagnostics
    NewLine = 49,
}

impl Opcode {
    /// Decode a wire byte. `None` means the module carries an opcode this
    /// machine does not know, which is fatal at execution time.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;

        const TABLE: [Opcode; 50] = [
            PushNull,
            PushInt,
            LoadConst,
            LoadLocal,
            StoreLocal,
            New,
            Free,
            NullCheck,
            CheckCast,
            I2F,
            F2I,
            MakeArray,
            ReadArray,
            WriteArray,
            GetField,
            PutField,
            InvokeVirtual,
            InvokeTemplate,
            InvokeNative,
            Return,
            Dup,
            Swap,
            Pop,
            Not,
            Neg,
            AddI,
            SubI,
            MulI,
            Mod,
            And,
            Or,
            AndBit,
            OrBit,
            Xor,
            ShiftAl,
            ShiftAr,
            AddF,
            SubF,
            MulF,
            Div,
            Equals,
            NotEquals,
            Less,
            Greater,
            LessEq,
            GreaterEq,
            Goto,
            BranchNotZero,
            BranchZero,
            NewLine,
        ];

        TABLE.get(byte as usize).copied()
    }

    pub fn operands(self) -> Operands {
        use Opcode::*;
        match self {
            PushNull | NullCheck | I2F | F2I | Free | Return | Dup | Swap | Pop | Not | Neg
            | AddI | SubI | MulI | Mod | And | Or | AndBit | OrBit | Xor | ShiftAl | ShiftAr
            | AddF | SubF | MulF | Div | Equals | NotEquals | Less | Greater | LessEq
            | GreaterEq => Operands::None,

            PushInt | LoadConst | LoadLocal | StoreLocal | New | CheckCast | MakeArray
            | ReadArray | WriteArray | GetField | PutField => Operands::Byte,

            InvokeVirtual | InvokeTemplate | InvokeNative => Operands::ByteByte,

            Goto | BranchNotZero | BranchZero | NewLine => Operands::Wide,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            PushNull => "push_null",
            PushInt => "push_int",
            LoadConst => "load_const",
            LoadLocal => "load_local",
            StoreLocal => "store_local",
            New => "new",
            Free => "free",
            NullCheck => "null_check",
            CheckCast => "check_cast",
            I2F => "i2f",
            F2I => "f2i",
            MakeArray => "make_array",
            ReadArray => "read_array",
            WriteArray => "write_array",
            GetField => "get_field",
            PutField => "put_field",
            InvokeVirtual => "invoke_virtual",
            InvokeTemplate => "invoke_template",
            InvokeNative => "invoke_native",
            Return => "return",
            Dup => "dup",
            Swap => "swap",
            Pop => "pop",
            Not => "not",
            Neg => "neg",
            AddI => "add_i",
            SubI => "sub_i",
            MulI => "mul_i",
            Mod => "mod",
            And => "and",
            Or => "or",
            AndBit => "and_bit",
            OrBit => "or_bit",
            Xor => "xor",
            ShiftAl => "shift_al",
            ShiftAr => "shift_ar",
            AddF => "add_f",
            SubF => "sub_f",
            MulF => "mul_f",
            Div => "div",
            Equals => "equals",
            NotEquals => "not_equals",
            Less => "less",
            Greater => "greater",
            LessEq => "less_eq",
            GreaterEq => "greater_eq",
            Goto => "goto",
            BranchNotZero => "branch_not_zero",
            BranchZero => "branch_zero",
            NewLine => "new_line",
        }
    }
}

/// One raw instruction as it appears on the wire: the opcode byte followed
/// by its operand bytes. Operand access is checked so that a truncated
/// instruction surfaces as an error instead of an out-of-bounds read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    bytes: Box<[u8]>,
}

impl Instruction {
    /// Wrap a raw byte string. The loader guarantees `bytes` is non-empty.
    pub fn new(bytes: Vec<u8>) -> Self {
        debug_assert!(!bytes.is_empty());
        Instruction {
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn opcode_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Operand byte `n` (0-based, after the opcode byte).
    pub fn operand(&self, n: usize) -> Option<u8> {
        self.bytes.get(1 + n).copied()
    }

    /// 16-bit big-endian operand used by the jump-class opcodes.
    pub fn wide_operand(&self) -> Option<u16> {
        match (self.operand(0), self.operand(1)) {
            (Some(hi), Some(lo)) => Some(u16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }
}
