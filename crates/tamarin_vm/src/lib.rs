pub mod chunk;
pub mod compiler;
pub mod error;
pub mod opcode;
pub mod stdlib;
pub mod symbol_table;
pub mod value;
pub mod vm;

pub use compiler::Compiler;
pub use error::{CompileError, TamarinError, VmError, VmResult};
pub use value::Value;
pub use vm::Vm;

/// Lexes, parses, compiles, and runs a complete program, returning the
/// value of its last popped expression statement.
pub fn run(source: &str) -> Result<Value, TamarinError> {
    let (program, lex_errors, parse_errors) = tamarin_parser::parse(source);
    if let Some(e) = lex_errors.into_iter().next() {
        return Err(TamarinError::Syntax(e.to_string()));
    }
    if let Some(e) = parse_errors.into_iter().next() {
        return Err(TamarinError::Syntax(e.to_string()));
    }
    let chunk = compiler::compile(&program)?;
    let mut vm = Vm::new();
    Ok(vm.run(chunk)?)
}
