pub mod ast;
pub mod error;
pub mod parser;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::Parser;

use tamarin_lexer::tokenize as lex;

pub fn parse(source: &str) -> (Program, Vec<tamarin_lexer::LexError>, Vec<ParseError>) {
    let (tokens, lex_errors) = lex(source);
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    (program, lex_errors, parser.errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        let (program, lex_errors, parse_errors) = parse(src);
        assert!(lex_errors.is_empty(), "Lex errors: {:?}", lex_errors);
        assert!(parse_errors.is_empty(), "Parse errors: {:?}", parse_errors);
        program
    }
    fn first_stmt(src: &str) -> StmtKind {
        parse_ok(src).stmts.into_iter().next().unwrap().inner
    }
    fn first_expr(src: &str) -> ExprKind {
        match first_stmt(src) {
            StmtKind::ExprStmt(e) => e.inner,
            StmtKind::Let { value, .. } => value.inner,
            other => panic!("Expected ExprStmt/Let, got {:?}", other),
        }
    }

    #[test]
    fn test_int_literal() {
        assert_eq!(first_expr("42;"), ExprKind::Literal(Literal::Int(42)));
    }
    #[test]
    fn test_bool_literals() {
        assert_eq!(first_expr("true;"), ExprKind::Literal(Literal::Bool(true)));
        assert_eq!(first_expr("false;"), ExprKind::Literal(Literal::Bool(false)));
    }
    #[test]
    fn test_string_literal() {
        assert_eq!(first_expr(r#""hello";"#), ExprKind::Literal(Literal::Str("hello".to_string())));
    }
    #[test]
    fn test_ident() {
        assert_eq!(first_expr("foobar;"), ExprKind::Literal(Literal::Ident("foobar".to_string())));
    }

    #[test]
    fn test_let_statement() {
        assert!(matches!(first_stmt("let x = 5;"), StmtKind::Let { name, .. } if name == "x"));
    }

    #[test]
    fn test_return_statement() {
        assert!(matches!(first_stmt("return 5;"), StmtKind::Return(_)));
    }

    #[test]
    fn test_optional_semicolon() {
        let (program, lex_errors, parse_errors) = parse("let x = 5");
        assert!(lex_errors.is_empty() && parse_errors.is_empty());
        assert_eq!(program.stmts.len(), 1);
    }

    #[test]
    fn test_prefix_operators() {
        assert!(matches!(first_expr("-5;"), ExprKind::Prefix { op: PrefixOp::Neg, .. }));
        assert!(matches!(first_expr("!true;"), ExprKind::Prefix { op: PrefixOp::Not, .. }));
    }

    #[test]
    fn test_infix_operators() {
        for (src, op) in [
            ("1 + 2;", InfixOp::Add),
            ("1 - 2;", InfixOp::Sub),
            ("1 * 2;", InfixOp::Mul),
            ("1 / 2;", InfixOp::Div),
            ("1 < 2;", InfixOp::Lt),
            ("1 > 2;", InfixOp::Gt),
            ("1 == 2;", InfixOp::Eq),
            ("1 != 2;", InfixOp::NotEq),
        ] {
            match first_expr(src) {
                ExprKind::Infix { op: got, .. } => assert_eq!(got, op, "for {}", src),
                other => panic!("expected Infix for {}, got {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_precedence_mul_over_add() {
        match first_expr("1 + 2 * 3;") {
            ExprKind::Infix { op: InfixOp::Add, right, .. } => {
                assert!(matches!(right.inner, ExprKind::Infix { op: InfixOp::Mul, .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_grouped_expression() {
        match first_expr("(1 + 2) * 3;") {
            ExprKind::Infix { op: InfixOp::Mul, left, .. } => {
                assert!(matches!(left.inner, ExprKind::Infix { op: InfixOp::Add, .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_call_expression() {
        match first_expr("add(1, 2 * 3);") {
            ExprKind::Call { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_index_expression() {
        assert!(matches!(first_expr("arr[0];"), ExprKind::Infix { op: InfixOp::Index, .. }));
    }

    #[test]
    fn test_array_literal() {
        match first_expr("[1, 2 * 2, 3 + 3];") {
            ExprKind::Literal(Literal::Array(items)) => assert_eq!(items.len(), 3),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_empty_array_literal() {
        match first_expr("[];") {
            ExprKind::Literal(Literal::Array(items)) => assert!(items.is_empty()),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_map_literal() {
        match first_expr(r#"{"one": 1, "two": 2};"#) {
            ExprKind::Literal(Literal::Map(pairs)) => assert_eq!(pairs.len(), 2),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_empty_map_literal() {
        match first_expr("{};") {
            ExprKind::Literal(Literal::Map(pairs)) => assert!(pairs.is_empty()),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_function_literal() {
        match first_expr("fn(x, y) { x + y; };") {
            ExprKind::Literal(Literal::Function { params, body, name }) => {
                assert_eq!(params, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(body.len(), 1);
                assert!(name.is_none());
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_let_names_function_literal_for_self_reference() {
        match first_stmt("let countdown = fn(x) { return countdown(x - 1); };") {
            StmtKind::Let { value, .. } => match value.inner {
                ExprKind::Literal(Literal::Function { name, .. }) => {
                    assert_eq!(name, Some("countdown".to_string()));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_if_expression() {
        match first_expr("if (x < y) { x } else { y };") {
            ExprKind::If { alternative, .. } => assert!(alternative.is_some()),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_if_without_else() {
        match first_expr("if (x < y) { x };") {
            ExprKind::If { alternative, .. } => assert!(alternative.is_none()),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_unexpected_token_reports_expected_vs_got() {
        let (_, _, errors) = parse("add(1, 2;");
        assert!(!errors.is_empty());
        assert_eq!(errors[0].to_string(), "Expected: ), Got: ;");
    }

    #[test]
    fn test_structural_equality_on_ast() {
        let a = parse_ok("1 + 2;");
        let b = parse_ok("1 + 2;");
        assert_eq!(a, b);
    }
}
