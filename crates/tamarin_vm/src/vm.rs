use std::rc::Rc;

use crate::chunk::{read_u16, Chunk};
use crate::error::{VmError, VmResult};
use crate::opcode::Op;
use crate::stdlib::BUILTINS;
use crate::value::{Closure, CompiledFunction, Value};

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;

struct CallFrame {
    closure: Rc<Closure>,
    ip: usize,
    base: usize,
}

impl CallFrame {
    fn chunk(&self) -> &Chunk {
        &self.closure.func.chunk
    }
}

/// A frame-based stack interpreter: one fixed-size operand stack shared
/// by every call frame, base pointers into it rather than per-frame
/// allocation, globals addressed by compile-time index.
pub struct Vm {
    stack: Vec<Value>,
    sp: usize,
    frames: Vec<CallFrame>,
    globals: Vec<Value>,
    last_popped: Value,
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            frames: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
            last_popped: Value::Null,
        }
    }

    pub fn run(&mut self, chunk: Chunk) -> VmResult<Value> {
        let main_func = CompiledFunction { chunk: Rc::new(chunk), num_locals: 0, num_params: 0 };
        let main_closure = Rc::new(Closure { func: main_func, free: Vec::new() });
        self.frames.push(CallFrame { closure: main_closure, ip: 0, base: 0 });

        while self.frame_has_more() {
            self.step()?;
        }
        Ok(self.last_popped.clone())
    }

    fn frame_has_more(&self) -> bool {
        match self.frames.last() {
            Some(frame) => frame.ip < frame.chunk().code.len(),
            None => false,
        }
    }

    fn push(&mut self, v: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = v;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        let v = std::mem::replace(&mut self.stack[self.sp], Value::Null);
        self.last_popped = v.clone();
        v
    }

    fn step(&mut self) -> VmResult<()> {
        let (op, operand_pos) = {
            let frame = self.frames.last().unwrap();
            let op = Op::from_u8(frame.chunk().code[frame.ip]).expect("compiler only emits valid opcodes");
            (op, frame.ip + 1)
        };
        self.frames.last_mut().unwrap().ip = operand_pos + op.operand_bytes();

        match op {
            Op::Constant => {
                let idx = self.read_operand_u16(operand_pos);
                let v = self.frames.last().unwrap().chunk().constants[idx as usize].clone();
                self.push(v)?;
            }
            Op::True => self.push(Value::Bool(true))?,
            Op::False => self.push(Value::Bool(false))?,
            Op::Null => self.push(Value::Null)?,
            Op::Pop => {
                self.pop();
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div => self.exec_arithmetic(op)?,
            Op::Equal | Op::NotEqual | Op::GreaterThan => self.exec_comparison(op)?,
            Op::Minus => {
                let v = self.pop();
                match v {
                    Value::Int(n) => self.push(Value::Int(-n))?,
                    _ => return Err(VmError::ArithmeticTypeError),
                }
            }
            Op::Bang => {
                let v = self.pop();
                self.push(Value::Bool(!v.is_truthy()))?;
            }
            Op::Jump => {
                let addr = self.read_operand_u16(operand_pos);
                self.frames.last_mut().unwrap().ip = addr as usize;
            }
            Op::JumpCond => {
                let addr = self.read_operand_u16(operand_pos);
                let v = self.pop();
                if !v.is_truthy() {
                    self.frames.last_mut().unwrap().ip = addr as usize;
                }
            }
            Op::SetGlobal => {
                let idx = self.read_operand_u16(operand_pos);
                let v = self.pop();
                self.globals[idx as usize] = v;
            }
            Op::GetGlobal => {
                let idx = self.read_operand_u16(operand_pos);
                self.push(self.globals[idx as usize].clone())?;
            }
            Op::SetLocal => {
                let idx = self.frames.last().unwrap().chunk().code[operand_pos] as usize;
                let base = self.frames.last().unwrap().base;
                let v = self.pop();
                self.stack[base + idx] = v;
            }
            Op::GetLocal => {
                let idx = self.frames.last().unwrap().chunk().code[operand_pos] as usize;
                let base = self.frames.last().unwrap().base;
                self.push(self.stack[base + idx].clone())?;
            }
            Op::GetBuiltin => {
                let idx = self.frames.last().unwrap().chunk().code[operand_pos] as usize;
                let b = BUILTINS[idx].clone();
                self.push(Value::Builtin(b))?;
            }
            Op::GetFree => {
                let idx = self.frames.last().unwrap().chunk().code[operand_pos] as usize;
                let v = self.frames.last().unwrap().closure.free[idx].clone();
                self.push(v)?;
            }
            Op::CurrentClosure => {
                let closure = Rc::clone(&self.frames.last().unwrap().closure);
                self.push(Value::Closure(closure))?;
            }
            Op::Array => {
                let n = self.read_operand_u16(operand_pos) as usize;
                let items = self.pop_n(n);
                self.push(Value::array(items))?;
            }
            Op::Map => {
                let n = self.read_operand_u16(operand_pos) as usize;
                let flat = self.pop_n(2 * n);
                let mut map = indexmap::IndexMap::new();
                for pair in flat.chunks(2) {
                    let key = pair[0]
                        .as_hash_key()
                        .ok_or(VmError::IndexTypeError)?;
                    map.insert(key, pair[1].clone());
                }
                self.push(Value::Map(Rc::new(map)))?;
            }
            Op::Index => self.exec_index()?,
            Op::Call => {
                let argc = self.frames.last().unwrap().chunk().code[operand_pos] as usize;
                self.exec_call(argc)?;
            }
            Op::ReturnValue => {
                let value = self.pop();
                let frame = self.frames.pop().unwrap();
                self.sp = frame.base - 1;
                self.push(value)?;
            }
            Op::Return => {
                let frame = self.frames.pop().unwrap();
                self.sp = frame.base - 1;
                self.push(Value::Null)?;
            }
            Op::Closure => {
                let const_idx = self.read_operand_u16(operand_pos);
                let num_free = self.frames.last().unwrap().chunk().code[operand_pos + 2] as usize;
                let func = match &self.frames.last().unwrap().chunk().constants[const_idx as usize] {
                    Value::CompiledFunction(f) => f.clone(),
                    _ => unreachable!("compiler only emits Closure for CompiledFunction constants"),
                };
                let free = self.pop_n(num_free);
                self.push(Value::Closure(Rc::new(Closure { func, free })))?;
            }
        }
        Ok(())
    }

    fn read_operand_u16(&self, pos: usize) -> u16 {
        read_u16(&self.frames.last().unwrap().chunk().code, pos)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let mut items: Vec<Value> = (0..n).map(|_| self.pop()).collect();
        items.reverse();
        items
    }

    fn exec_arithmetic(&mut self, op: Op) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();
        let result = match (&left, &right, op) {
            (Value::Int(l), Value::Int(r), Op::Add) => Value::Int(l + r),
            (Value::Int(l), Value::Int(r), Op::Sub) => Value::Int(l - r),
            (Value::Int(l), Value::Int(r), Op::Mul) => Value::Int(l * r),
            (Value::Int(l), Value::Int(r), Op::Div) => {
                if *r == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Value::Int(l / r)
            }
            (Value::Str(l), Value::Str(r), Op::Add) => Value::str(format!("{}{}", l, r)),
            _ => return Err(VmError::ArithmeticTypeError),
        };
        self.push(result)
    }

    fn exec_comparison(&mut self, op: Op) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();
        let result = match (&left, &right, op) {
            (Value::Int(l), Value::Int(r), Op::Equal) => l == r,
            (Value::Int(l), Value::Int(r), Op::NotEqual) => l != r,
            (Value::Int(l), Value::Int(r), Op::GreaterThan) => l > r,
            (_, _, Op::GreaterThan) => return Err(VmError::ArithmeticTypeError),
            (_, _, Op::Equal) => left == right,
            (_, _, Op::NotEqual) => left != right,
            _ => unreachable!("exec_comparison only called for Equal/NotEqual/GreaterThan"),
        };
        self.push(Value::Bool(result))
    }

    fn exec_index(&mut self) -> VmResult<()> {
        let index = self.pop();
        let container = self.pop();
        let result = match (&container, &index) {
            (Value::Array(a), Value::Int(i)) => {
                let arr = a.borrow();
                if *i < 0 || *i as usize >= arr.len() {
                    Value::Null
                } else {
                    arr[*i as usize].clone()
                }
            }
            (Value::Map(m), key) => {
                let hk = key.as_hash_key().ok_or(VmError::IndexTypeError)?;
                m.get(&hk).cloned().unwrap_or(Value::Null)
            }
            _ => return Err(VmError::IndexTypeError),
        };
        self.push(result)
    }

    fn exec_call(&mut self, argc: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - argc - 1].clone();
        match callee {
            Value::Closure(closure) => {
                if argc != closure.func.num_params {
                    return Err(VmError::ArityMismatch { want: closure.func.num_params, got: argc });
                }
                let base = self.sp - argc;
                self.sp = base + closure.func.num_locals;
                self.frames.push(CallFrame { closure, ip: 0, base });
                Ok(())
            }
            Value::Builtin(b) => {
                let args = self.pop_n(argc);
                self.pop(); // discard callee
                let result = (b.func)(&args).map_err(VmError::Builtin)?;
                self.push(result)
            }
            _ => Err(VmError::NotCallable),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use tamarin_parser::parse as parse_source;

    fn run_src(src: &str) -> Value {
        let (program, lex_errors, parse_errors) = parse_source(src);
        assert!(lex_errors.is_empty() && parse_errors.is_empty(), "{:?} {:?}", lex_errors, parse_errors);
        let chunk = compile(&program).expect("compile should succeed");
        Vm::new().run(chunk).expect("run should succeed")
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(run_src("1 + 2;"), Value::Int(3));
        assert_eq!(run_src("6 - 2;"), Value::Int(4));
        assert_eq!(run_src("5 * 4;"), Value::Int(20));
        assert_eq!(run_src("4 / 2;"), Value::Int(2));
        assert_eq!(run_src("5 * 4 * 2 * 3;"), Value::Int(120));
        assert_eq!(run_src("5 + 4 * (2 - 3);"), Value::Int(1));
    }

    #[test]
    fn test_booleans_and_comparisons() {
        assert_eq!(run_src("true;"), Value::Bool(true));
        assert_eq!(run_src("1 < 2;"), Value::Bool(true));
        assert_eq!(run_src("1 > 2;"), Value::Bool(false));
        assert_eq!(run_src("1 == 1;"), Value::Bool(true));
        assert_eq!(run_src("1 != 1;"), Value::Bool(false));
    }

    #[test]
    fn test_if_else_falls_through() {
        assert_eq!(run_src("if (false) { 10 } else { 20 }; 30;"), Value::Int(30));
        assert_eq!(run_src("if (true) { 10 };"), Value::Int(10));
        assert_eq!(run_src("if (false) { 10 };"), Value::Null);
    }

    #[test]
    fn test_if_with_empty_block_does_not_underflow_the_stack() {
        assert_eq!(run_src("if (true) {};"), Value::Null);
        assert_eq!(run_src("if (false) {} else {};"), Value::Null);
    }

    #[test]
    fn test_globals_and_let() {
        assert_eq!(run_src("let x = 2; let y = x; y;"), Value::Int(2));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(run_src(r#""foo" + "bar";"#), Value::str("foobar"));
    }

    #[test]
    fn test_array_literal_and_index() {
        assert_eq!(run_src("[1, 2, 3][1];"), Value::Int(2));
        assert_eq!(run_src("[1, 2, 3][10];"), Value::Null);
        assert_eq!(run_src("[1, 2, 3][-1];"), Value::Null);
    }

    #[test]
    fn test_map_literal_and_index() {
        assert_eq!(run_src(r#"{"one": 1, "two": 2}["one"];"#), Value::Int(1));
        assert_eq!(run_src(r#"{"one": 1}["missing"];"#), Value::Null);
    }

    #[test]
    fn test_function_call_and_return_value() {
        assert_eq!(run_src("let add = fn(a, b) { a + b }; add(1, 2);"), Value::Int(3));
    }

    #[test]
    fn test_implicit_null_return() {
        assert_eq!(run_src("let f = fn() { }; f();"), Value::Null);
    }

    #[test]
    fn test_closures_capture_enclosing_values() {
        let src = "\
            let newAdder = fn(a) { fn(b) { a + b } };\
            let addTwo = newAdder(2);\
            addTwo(3);";
        assert_eq!(run_src(src), Value::Int(5));
    }

    #[test]
    fn test_recursive_closure_via_self_reference() {
        let src = "\
            let countdown = fn(x) { if (x == 0) { 0 } else { countdown(x - 1) } };\
            countdown(3);";
        assert_eq!(run_src(src), Value::Int(0));
    }

    #[test]
    fn test_fibonacci() {
        let src = "\
            let fib = fn(x) { if (x < 2) { x } else { fib(x - 1) + fib(x - 2) } };\
            fib(10);";
        assert_eq!(run_src(src), Value::Int(55));
    }

    #[test]
    fn test_builtins_len_first_last_push_rest() {
        assert_eq!(run_src(r#"len("hello");"#), Value::Int(5));
        assert_eq!(run_src("first([1, 2, 3]);"), Value::Int(1));
        assert_eq!(run_src("last([1, 2, 3]);"), Value::Int(3));
        assert_eq!(run_src("push([1], 2);"), Value::array(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(run_src("rest([1, 2, 3]);"), Value::array(vec![Value::Int(2), Value::Int(3)]));
        assert_eq!(run_src("first([]);"), Value::Null);
    }

    #[test]
    fn test_calling_non_function_is_error() {
        let (program, _, _) = parse_source("1(2);");
        let chunk = compile(&program).unwrap();
        let err = Vm::new().run(chunk).unwrap_err();
        assert_eq!(err.to_string(), "Error attempting to call non-function");
    }

    #[test]
    fn test_wrong_arity_is_error() {
        let (program, _, _) = parse_source("let f = fn(a) { a }; f(1, 2);");
        let chunk = compile(&program).unwrap();
        let err = Vm::new().run(chunk).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of args: want 1, got 2");
    }

    #[test]
    fn test_type_mismatch_in_arithmetic_is_error() {
        let (program, _, _) = parse_source("1 + true;");
        let chunk = compile(&program).unwrap();
        let err = Vm::new().run(chunk).unwrap_err();
        assert_eq!(err.to_string(), "Cannot find arithmetic function for input types.");
    }
}
