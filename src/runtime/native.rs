use std::collections::HashMap;

use crate::runtime::value::Value;

/// Name-indexed registry of host-provided functions.
///
/// The machine only relies on two operations: arity lookup and
/// invocation. Arguments are passed in push order.
pub struct NativeRegistry {
    functions: HashMap<String, NativeFunction>,
}

struct NativeFunction {
    arity: u8,
    func: Box<dyn Fn(&[Value]) -> Value>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        NativeRegistry {
            functions: HashMap::new(),
        }
    }

    /// Registry with the built-in functions: `println`/1.
    pub fn with_builtins() -> Self {
        let mut registry = NativeRegistry::new();
        registry.register("println", 1, |args| {
            println!("{}", args[0]);
            Value::Null
        });
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        arity: u8,
        func: impl Fn(&[Value]) -> Value + 'static,
    ) {
        self.functions.insert(
            name.to_string(),
            NativeFunction {
                arity,
                func: Box::new(func),
            },
        );
    }

    /// Declared argument count. `None` for unregistered names.
    pub fn arity(&self, name: &str) -> Option<u8> {
        self.functions.get(name).map(|f| f.arity)
    }

    pub fn invoke(&self, name: &str, args: &[Value]) -> Option<Value> {
        self.functions.get(name).map(|f| (f.func)(args))
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        NativeRegistry::with_builtins()
    }
}
