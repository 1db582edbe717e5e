mod bytecode;
mod runtime;

use std::env;

use crate::bytecode::disasm::print_image;
use crate::bytecode::loader;
use crate::runtime::vm::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let disassemble = args.contains(&"--dis".to_string());

    // first non-flag argument is the module file
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    match filename {
        Some(filename) => run_module(filename, disassemble),
        None => print_usage(),
    }
}

fn print_usage() {
    println!("CINDER - Bytecode Virtual Machine");
    println!();
    println!("Usage:");
    println!("  cinder <file>             Load and run a module");
    println!("  cinder --dis <file>       Show the loaded module and exit");
}

fn run_module(filename: &str, disassemble: bool) {
    let image = match loader::load(filename) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Load error in '{}': {}", filename, e);
            std::process::exit(1);
        }
    };

    if disassemble {
        print_image(&image);
        return;
    }

    let mut vm = Vm::new(image);
    if let Err(e) = vm.run() {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
