use std::rc::Rc;

use tamarin_parser::{Expr, ExprKind, InfixOp, Literal, PrefixOp, Program, Stmt, StmtKind};

use crate::chunk::Chunk;
use crate::error::{CompileError, CompileResult};
use crate::opcode::Op;
use crate::stdlib::BUILTINS;
use crate::symbol_table::{self, ScopeClass, Symbol, SymbolTable};
use crate::value::{CompiledFunction, Value};

struct EmittedIns {
    op: Op,
    pos: usize,
}

struct CompilerScope {
    chunk: Chunk,
    last: Option<EmittedIns>,
    prev: Option<EmittedIns>,
}

impl CompilerScope {
    fn new() -> Self {
        CompilerScope { chunk: Chunk::new(), last: None, prev: None }
    }
}

/// Lowers a parsed program into a `Chunk` of bytecode.
///
/// One `CompilerScope` and one `SymbolTable` are pushed per `enter_scope`
/// (function literal) and always popped together in `leave_scope`, so the
/// two stacks stay in lockstep and `self.scopes.len() - 1` indexes both.
pub struct Compiler {
    scopes: Vec<CompilerScope>,
    symbols: Vec<SymbolTable>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut root = SymbolTable::new_root();
        for (i, b) in BUILTINS.iter().enumerate() {
            root.define_builtin(i, b.name);
        }
        Compiler { scopes: vec![CompilerScope::new()], symbols: vec![root] }
    }

    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn into_chunk(mut self) -> Chunk {
        self.scopes.pop().expect("root scope always present").chunk
    }

    fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    fn emit(&mut self, op: Op) -> usize {
        let depth = self.depth();
        let pos = self.scopes[depth].chunk.emit(op);
        self.set_last(op, pos);
        pos
    }

    fn emit_op(&mut self, op: Op, operands: &[u32]) -> usize {
        let depth = self.depth();
        let pos = self.scopes[depth].chunk.emit_op(op, operands);
        self.set_last(op, pos);
        pos
    }

    fn emit_jump(&mut self, op: Op) -> usize {
        let depth = self.depth();
        let opcode_pos = self.scopes[depth].chunk.code.len();
        let patch = self.scopes[depth].chunk.emit_jump(op);
        self.set_last(op, opcode_pos);
        patch
    }

    fn patch_jump(&mut self, patch: usize) {
        let depth = self.depth();
        self.scopes[depth].chunk.patch_jump(patch);
    }

    fn set_last(&mut self, op: Op, pos: usize) {
        let depth = self.depth();
        let scope = &mut self.scopes[depth];
        scope.prev = scope.last.take();
        scope.last = Some(EmittedIns { op, pos });
    }

    fn last_is(&self, op: Op) -> bool {
        let depth = self.depth();
        self.scopes[depth].last.as_ref().map(|e| e.op == op).unwrap_or(false)
    }

    /// Truncates the instruction stream back to before the last emitted
    /// instruction. Used by the if-expression and function-body rules that
    /// replace a trailing `POP` with something else.
    fn remove_last(&mut self) {
        let depth = self.depth();
        let scope = &mut self.scopes[depth];
        if let Some(last) = scope.last.take() {
            scope.chunk.code.truncate(last.pos);
            scope.last = scope.prev.take();
        }
    }

    fn add_const(&mut self, v: Value) -> u16 {
        let depth = self.depth();
        self.scopes[depth].chunk.add_const(v)
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilerScope::new());
        self.symbols.push(SymbolTable::new_enclosed());
    }

    fn leave_scope(&mut self) -> Chunk {
        self.symbols.pop();
        self.scopes.pop().expect("enter_scope/leave_scope must balance").chunk
    }

    fn compile_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.inner {
            StmtKind::ExprStmt(e) => {
                self.compile_expr(e)?;
                self.emit(Op::Pop);
            }
            StmtKind::Let { name, value } => {
                let depth = self.depth();
                let symbol = self.symbols[depth].define(name);
                self.compile_expr(value)?;
                match symbol.scope {
                    ScopeClass::Global => {
                        self.emit_op(Op::SetGlobal, &[symbol.index as u32]);
                    }
                    ScopeClass::Local => {
                        self.emit_op(Op::SetLocal, &[symbol.index as u32]);
                    }
                    _ => unreachable!("SymbolTable::define only yields Global or Local"),
                }
            }
            StmtKind::Return(e) => {
                self.compile_expr(e)?;
                self.emit(Op::ReturnValue);
            }
            StmtKind::Block(stmts) => {
                self.compile_block(stmts)?;
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.inner {
            ExprKind::Literal(lit) => self.compile_literal(lit)?,
            ExprKind::Prefix { op, right } => {
                self.compile_expr(right)?;
                match op {
                    PrefixOp::Neg => self.emit(Op::Minus),
                    PrefixOp::Not => self.emit(Op::Bang),
                };
            }
            ExprKind::Infix { left, op, right } => {
                self.compile_infix(left, *op, right)?;
            }
            ExprKind::If { condition, consequence, alternative } => {
                self.compile_if(condition, consequence, alternative.as_deref())?;
            }
            ExprKind::Call { callee, args } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit_op(Op::Call, &[args.len() as u32]);
            }
            ExprKind::Error => return Err(CompileError::NotImplemented("Error")),
        }
        Ok(())
    }

    fn compile_infix(&mut self, left: &Expr, op: InfixOp, right: &Expr) -> CompileResult<()> {
        match op {
            InfixOp::Lt => {
                // No dedicated LT opcode: swap operand order and emit GREATERTHAN.
                self.compile_expr(right)?;
                self.compile_expr(left)?;
                self.emit(Op::GreaterThan);
            }
            InfixOp::Index => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Op::Index);
            }
            _ => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let opcode = match op {
                    InfixOp::Add => Op::Add,
                    InfixOp::Sub => Op::Sub,
                    InfixOp::Mul => Op::Mul,
                    InfixOp::Div => Op::Div,
                    InfixOp::Eq => Op::Equal,
                    InfixOp::NotEq => Op::NotEqual,
                    InfixOp::Gt => Op::GreaterThan,
                    InfixOp::Lt | InfixOp::Index => unreachable!("handled above"),
                };
                self.emit(opcode);
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &[Stmt],
        alternative: Option<&[Stmt]>,
    ) -> CompileResult<()> {
        self.compile_expr(condition)?;
        let jump_cond_patch = self.emit_jump(Op::JumpCond);

        self.compile_block(consequence)?;
        if self.last_is(Op::Pop) {
            self.remove_last();
        } else {
            // An empty block, or one ending in a non-expression statement
            // (`let`), leaves nothing on the stack for the if-expression's
            // value; the outer `POP` always expects exactly one.
            self.emit(Op::Null);
        }
        let jump_patch = self.emit_jump(Op::Jump);
        self.patch_jump(jump_cond_patch);

        match alternative {
            Some(alt) => {
                self.compile_block(alt)?;
                if self.last_is(Op::Pop) {
                    self.remove_last();
                } else {
                    self.emit(Op::Null);
                }
            }
            None => {
                self.emit(Op::Null);
            }
        }
        self.patch_jump(jump_patch);
        Ok(())
    }

    fn compile_literal(&mut self, lit: &Literal) -> CompileResult<()> {
        match lit {
            Literal::Int(n) => {
                let idx = self.add_const(Value::Int(*n));
                self.emit_op(Op::Constant, &[idx as u32]);
            }
            Literal::Str(s) => {
                let idx = self.add_const(Value::str(s.clone()));
                self.emit_op(Op::Constant, &[idx as u32]);
            }
            Literal::Bool(b) => {
                self.emit(if *b { Op::True } else { Op::False });
            }
            Literal::Ident(name) => self.compile_identifier(name)?,
            Literal::Array(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit_op(Op::Array, &[items.len() as u32]);
            }
            Literal::Map(pairs) => {
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit_op(Op::Map, &[pairs.len() as u32]);
            }
            Literal::Function { params, body, name } => {
                self.compile_function_literal(params, body, name.as_deref())?;
            }
        }
        Ok(())
    }

    fn compile_identifier(&mut self, name: &str) -> CompileResult<()> {
        let depth = self.depth();
        let symbol = symbol_table::resolve(&mut self.symbols, depth, name)
            .ok_or_else(|| CompileError::UnresolvedIdentifier(name.to_string()))?;
        self.load_symbol(&symbol);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            ScopeClass::Global => {
                self.emit_op(Op::GetGlobal, &[symbol.index as u32]);
            }
            ScopeClass::Local => {
                self.emit_op(Op::GetLocal, &[symbol.index as u32]);
            }
            ScopeClass::Builtin => {
                self.emit_op(Op::GetBuiltin, &[symbol.index as u32]);
            }
            ScopeClass::Free => {
                self.emit_op(Op::GetFree, &[symbol.index as u32]);
            }
            ScopeClass::Function => {
                self.emit(Op::CurrentClosure);
            }
        };
    }

    fn compile_function_literal(
        &mut self,
        params: &[String],
        body: &[Stmt],
        name: Option<&str>,
    ) -> CompileResult<()> {
        self.enter_scope();
        {
            let depth = self.depth();
            for param in params {
                self.symbols[depth].define(param);
            }
            if let Some(n) = name {
                self.symbols[depth].define_function_name(n);
            }
        }

        self.compile_block(body)?;
        if self.last_is(Op::Pop) {
            self.remove_last();
            self.emit(Op::ReturnValue);
        }
        if !self.last_is(Op::ReturnValue) {
            self.emit(Op::Return);
        }

        let depth = self.depth();
        let free_symbols = self.symbols[depth].free_symbols.clone();
        let num_locals = self.symbols[depth].num_defs;
        let chunk = self.leave_scope();

        for sym in &free_symbols {
            self.load_symbol(sym);
        }

        let func = CompiledFunction { chunk: Rc::new(chunk), num_locals, num_params: params.len() };
        let const_idx = self.add_const(Value::CompiledFunction(func));
        self.emit_op(Op::Closure, &[const_idx as u32, free_symbols.len() as u32]);
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

pub fn compile(program: &Program) -> CompileResult<Chunk> {
    let mut compiler = Compiler::new();
    compiler.compile(program)?;
    Ok(compiler.into_chunk())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Op;
    use tamarin_parser::parse as parse_source;

    fn compiled(src: &str) -> Chunk {
        let (program, lex_errors, parse_errors) = parse_source(src);
        assert!(lex_errors.is_empty() && parse_errors.is_empty());
        compile(&program).expect("compile should succeed")
    }

    fn ops(chunk: &Chunk) -> Vec<Op> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < chunk.code.len() {
            let op = Op::from_u8(chunk.code[i]).unwrap();
            out.push(op);
            i += 1 + op.operand_bytes();
        }
        out
    }

    #[test]
    fn test_integer_arithmetic() {
        let chunk = compiled("1 + 2;");
        assert_eq!(ops(&chunk), vec![Op::Constant, Op::Constant, Op::Add, Op::Pop]);
        assert_eq!(chunk.constants, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_less_than_is_swapped_and_emits_greaterthan() {
        let chunk = compiled("1 < 2;");
        assert_eq!(ops(&chunk), vec![Op::Constant, Op::Constant, Op::GreaterThan, Op::Pop]);
        assert_eq!(chunk.constants, vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_if_without_else() {
        let chunk = compiled("if (true) { 5 }; 3333;");
        assert_eq!(
            ops(&chunk),
            vec![
                Op::True,
                Op::JumpCond,
                Op::Constant,
                Op::Jump,
                Op::Null,
                Op::Pop,
                Op::Constant,
                Op::Pop,
            ]
        );
    }

    #[test]
    fn test_if_with_empty_consequence_still_pushes_a_value() {
        let chunk = compiled("if (true) {};");
        assert_eq!(
            ops(&chunk),
            vec![Op::True, Op::JumpCond, Op::Null, Op::Jump, Op::Null, Op::Pop]
        );
    }

    #[test]
    fn test_globals() {
        let chunk = compiled("let x = 2; let y = x; y;");
        assert_eq!(
            ops(&chunk),
            vec![Op::Constant, Op::SetGlobal, Op::GetGlobal, Op::SetGlobal, Op::GetGlobal, Op::Pop]
        );
    }

    #[test]
    fn test_closure_chain_captures_free_variables() {
        let chunk = compiled("fn(a) { fn(b) { fn(c) { a + b + c } } };");
        assert_eq!(ops(&chunk), vec![Op::Closure, Op::Pop]);
        let outer = match &chunk.constants[chunk.constants.len() - 1] {
            Value::CompiledFunction(f) => f.clone(),
            other => panic!("{:?}", other),
        };
        assert_eq!(ops(&outer.chunk), vec![Op::GetLocal, Op::Closure, Op::ReturnValue]);
    }

    #[test]
    fn test_builtins_resolve_to_getbuiltin() {
        let chunk = compiled("len([]); push([], 1);");
        assert_eq!(
            ops(&chunk),
            vec![
                Op::GetBuiltin,
                Op::Array,
                Op::Call,
                Op::Pop,
                Op::GetBuiltin,
                Op::Array,
                Op::Constant,
                Op::Call,
                Op::Pop,
            ]
        );
    }

    #[test]
    fn test_recursive_self_reference_emits_currentclosure() {
        let chunk = compiled("let countdown = fn(x) { countdown(x - 1); };");
        let func = match &chunk.constants[0] {
            Value::CompiledFunction(f) => f.clone(),
            other => panic!("{:?}", other),
        };
        assert!(ops(&func.chunk).contains(&Op::CurrentClosure));
    }

    #[test]
    fn test_unresolved_identifier_is_compile_error() {
        let (program, _, _) = parse_source("foobar;");
        let err = compile(&program).unwrap_err();
        assert_eq!(err.to_string(), "Cannot resolve identifier foobar");
    }
}
