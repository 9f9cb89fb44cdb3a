use crate::error::{LexError, LexResult};
use crate::token::{lookup_keyword, Span, Token, TokenKind};

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    pub errors: Vec<LexError>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' { self.line += 1; self.column = 1; } else { self.column += 1; }
        Some(ch)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) { self.advance(); true } else { false }
    }

    fn make_token(&self, kind: TokenKind, start: usize, start_col: usize, lexeme: &str) -> Token {
        Token::new(kind, Span::new(self.line, start_col, start, self.pos), lexeme)
    }

    /// Runs the scanner to completion. A trailing `Eof` token is always appended;
    /// further calls are unnecessary since the whole stream is returned at once.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.source.len() {
                tokens.push(Token::new(TokenKind::Eof, Span::new(self.line, self.column, self.pos, self.pos), ""));
                break;
            }
            match self.next_token() {
                Ok(tok) => tokens.push(tok),
                Err(e) => {
                    self.errors.push(e);
                    let start = self.pos;
                    let col = self.column;
                    tokens.push(self.make_token(TokenKind::Illegal, start, col, ""));
                }
            }
        }
        tokens
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r') | Some('\n')) {
            self.advance();
        }
    }

    fn next_token(&mut self) -> LexResult<Token> {
        let start = self.pos;
        let start_col = self.column;
        let ch = self.peek().expect("next_token called at end of input");

        if ch == '"' {
            return self.lex_string(start, start_col);
        }
        if ch.is_ascii_digit() {
            return self.lex_number(start, start_col);
        }
        if ch.is_alphabetic() || ch == '_' {
            return Ok(self.lex_identifier(start, start_col));
        }

        self.advance();
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '=' => if self.match_char('=') { TokenKind::EqualEqual } else { TokenKind::Equal },
            '!' => if self.match_char('=') { TokenKind::BangEqual } else { TokenKind::Bang },
            _ => TokenKind::Illegal,
        };

        let lexeme: String = self.source[start..self.pos].iter().collect();
        Ok(self.make_token(kind, start, start_col, &lexeme))
    }

    fn lex_string(&mut self, start: usize, start_col: usize) -> LexResult<Token> {
        self.advance(); // opening quote
        let mut content = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { span: Span::new(self.line, start_col, start, self.pos) }),
                Some('"') => { self.advance(); break; }
                Some(c) => { content.push(c); self.advance(); }
            }
        }
        let lexeme: String = self.source[start..self.pos].iter().collect();
        Ok(Token::new(TokenKind::StringLiteral(content), Span::new(self.line, start_col, start, self.pos), lexeme))
    }

    fn lex_number(&mut self, start: usize, start_col: usize) -> LexResult<Token> {
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
        let lexeme: String = self.source[start..self.pos].iter().collect();
        let span = Span::new(self.line, start_col, start, self.pos);
        let val: i64 = lexeme
            .parse()
            .map_err(|_| LexError::InvalidNumber { lexeme: lexeme.clone(), span })?;
        Ok(self.make_token(TokenKind::IntLiteral(val), start, start_col, &lexeme))
    }

    fn lex_identifier(&mut self, start: usize, start_col: usize) -> Token {
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let lexeme: String = self.source[start..self.pos].iter().collect();
        let kind = lookup_keyword(&lexeme).unwrap_or_else(|| TokenKind::Identifier(lexeme.clone()));
        self.make_token(kind, start, start_col, &lexeme)
    }
}
