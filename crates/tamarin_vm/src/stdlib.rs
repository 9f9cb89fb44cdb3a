use crate::value::{Builtin, Value};

fn arity_err(need: usize) -> String {
    format!("wrong number of args: need {}", need)
}

fn type_err(must_be: &str) -> String {
    format!("arg is wrong type, must be {}", must_be)
}

fn len(args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(arity_err(1));
    }
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        Value::Array(a) => Ok(Value::Int(a.borrow().len() as i64)),
        _ => Err(type_err("string or array")),
    }
}

fn puts(args: &[Value]) -> Result<Value, String> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(Value::Null)
}

fn first(args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(arity_err(1));
    }
    match &args[0] {
        Value::Array(a) => Ok(a.borrow().first().cloned().unwrap_or(Value::Null)),
        _ => Err(type_err("array")),
    }
}

fn last(args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(arity_err(1));
    }
    match &args[0] {
        Value::Array(a) => Ok(a.borrow().last().cloned().unwrap_or(Value::Null)),
        _ => Err(type_err("array")),
    }
}

fn push(args: &[Value]) -> Result<Value, String> {
    if args.len() != 2 {
        return Err(arity_err(2));
    }
    match &args[0] {
        Value::Array(a) => {
            let mut new_arr = a.borrow().clone();
            new_arr.push(args[1].clone());
            Ok(Value::array(new_arr))
        }
        _ => Err(type_err("array")),
    }
}

fn rest(args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(arity_err(1));
    }
    match &args[0] {
        Value::Array(a) => {
            let arr = a.borrow();
            if arr.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::array(arr[1..].to_vec()))
            }
        }
        _ => Err(type_err("array")),
    }
}

/// Fixed order, fixed `GETBUILTIN` indices 0-5. Never reorder: bytecode
/// produced by the compiler bakes these indices in directly.
pub const BUILTINS: [Builtin; 6] = [
    Builtin { name: "len", func: len },
    Builtin { name: "puts", func: puts },
    Builtin { name: "first", func: first },
    Builtin { name: "last", func: last },
    Builtin { name: "push", func: push },
    Builtin { name: "rest", func: rest },
];
