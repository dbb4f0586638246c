use crate::error::{MachineError, Result, Span};
use logos::Logos;

/// Tokens of the sandbox language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    /// `/* ... */`, dropped by [`tokenize_at`]
    #[token("/*", block_comment)]
    BlockComment,

    // Keywords
    #[token("var")]
    Var,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,
    #[token("typeof")]
    Typeof,

    // Identifiers and literals
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| unescape(lex.slice()))]
    Str(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,

    // End of file
    Eof,
}

impl Token {
    /// Source text of a keyword, usable as a property name after `.`
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::Var => "var",
            Token::Let => "let",
            Token::Const => "const",
            Token::Function => "function",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Undefined => "undefined",
            Token::Typeof => "typeof",
            _ => return None,
        };
        Some(text)
    }

    pub fn is_keyword(&self) -> bool {
        self.keyword_text().is_some()
    }
}

/// Consume a block comment body through the closing `*/`
fn block_comment(lex: &mut logos::Lexer<Token>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

/// Decode a quoted string literal, either quote style
fn unescape(quoted: &str) -> Option<String> {
    let body = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            other => out.push(other),
        }
    }

    Some(out)
}

/// A token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
}

impl SpannedToken {
    pub fn new(token: Token, span: Span, newline_before: bool) -> Self {
        Self {
            token,
            span,
            newline_before,
        }
    }
}

/// Tokenize `source`
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    tokenize_at(source, 0)
}

/// Tokenize `source`, reporting spans shifted by `offset`
///
/// The machine keeps every appended chunk in one buffer; lexing each chunk at
/// its offset keeps spans valid against that buffer.
pub fn tokenize_at(source: &str, offset: usize) -> Result<Vec<SpannedToken>> {
    let mut lex = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut prev_end = 0;

    while let Some(token_result) = lex.next() {
        let range = lex.span();
        let span = Span::new(range.start + offset, range.end + offset);

        match token_result {
            // Comments count toward `newline_before` through `prev_end`
            Ok(Token::BlockComment) => continue,
            Ok(token) => {
                let newline_before = source[prev_end..range.start].contains('\n');
                tokens.push(SpannedToken::new(token, span, newline_before));
                prev_end = range.end;
            }
            Err(_) => {
                let text = &source[range.start..range.end];
                let message = if text.starts_with("/*") {
                    "Unterminated comment".to_string()
                } else {
                    format!("Invalid token: {}", text)
                };
                return Err(MachineError::LexerError { span, message });
            }
        }
    }

    let end = source.len() + offset;
    let newline_before = source[prev_end..].contains('\n');
    tokens.push(SpannedToken::new(Token::Eof, Span::new(end, end), newline_before));
    Ok(tokens)
}
