use crate::bytecode::image::{Function, ProgramImage, Type};
use crate::bytecode::op::{Instruction, Opcode, Operands};
use crate::bytecode::pool::PoolEntry;

/// Print a human-readable listing of a loaded module.
pub fn print_image(image: &ProgramImage) {
    println!("entry: pool[{}]", image.entry);
    println!();

    for (idx, slot) in image.pool.slots().iter().enumerate() {
        match &slot.entry {
            PoolEntry::Int(value) => {
                println!("pool[{:03}] tag {} int {}", idx, slot.tag, value)
            }
            PoolEntry::Str(text) => {
                println!("pool[{:03}] tag {} str {:?}", idx, slot.tag, text)
            }
            PoolEntry::Function(function) => {
                println!("pool[{:03}] tag {} function", idx, slot.tag);
                print_function(function);
            }
            PoolEntry::Type(ty) => {
                println!("pool[{:03}] tag {} type", idx, slot.tag);
                print_type(ty);
            }
        }
    }
}

fn print_function(function: &Function) {
    println!(
        "  {} (locals: {}, stack: {})",
        function.name, function.locals, function.op_stack
    );
    for (ip, inst) in function.instructions.iter().enumerate() {
        print!("  {:04} ", ip);
        print_instruction(inst);
    }
    println!();
}

fn print_type(ty: &Type) {
    println!("  {} ({} fields)", ty.name, ty.fields);
    if let Some(table) = &ty.methods {
        for (name, address) in table.entries() {
            println!("    {} -> pool[{}]", name, address);
        }
    }
    println!();
}

fn print_instruction(inst: &Instruction) {
    let Some(opcode) = Opcode::from_byte(inst.opcode_byte()) else {
        println!("?? (byte {})", inst.opcode_byte());
        return;
    };

    match opcode.operands() {
        Operands::None => println!("{}", opcode.mnemonic()),
        Operands::Byte => match inst.operand(0) {
            Some(operand) => println!("{} {}", opcode.mnemonic(), operand),
            None => println!("{} <truncated>", opcode.mnemonic()),
        },
        Operands::ByteByte => match (inst.operand(0), inst.operand(1)) {
            (Some(a), Some(b)) => println!("{} {} {}", opcode.mnemonic(), a, b),
            _ => println!("{} <truncated>", opcode.mnemonic()),
        },
        Operands::Wide => match inst.wide_operand() {
            Some(target) => println!("{} {}", opcode.mnemonic(), target),
            None => println!("{} <truncated>", opcode.mnemonic()),
        },
    }
}
