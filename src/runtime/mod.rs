pub mod context;
pub mod frame;
pub mod heap;
pub mod native;
pub mod runtime_error;
pub mod value;
pub mod vm;

pub use native::NativeRegistry;
pub use runtime_error::{VmError, VmErrorKind};
pub use value::Value;
pub use vm::{Vm, VmConfig};
