use std::fmt;

use logos::{Lexer, Logos};

pub type SourceId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    pub source: SourceId,
    pub span: core::ops::Range<usize>,
}

impl Loc {
    pub fn new(source: SourceId, span: core::ops::Range<usize>) -> Self {
        Self { source, span }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
#[logos(skip r"[ \t\r\n\f]+")]
#[rustfmt::skip]
pub enum Token {
    // ==< Operators & Separators >==
    #[token("(")] LeftParen,
    #[token(")")] RightParen,
    #[token("{")] LeftCurly,
    #[token("}")] RightCurly,

    #[token("*")] Star,
    #[token("/")] Slash,
    #[token("%")] Percent,
    #[token("+")] Plus,
    #[token("-")] Minus,
    #[token(";")] Semicolon,
    #[token(".")] Dot,
    #[token(",")] Comma,
    #[token("=")] Assign,
    #[token("!")] Bang,

    #[token("&&")] Conjunction,
    #[token("||")] Disjunction,
    #[token("<")] Less,
    #[token(">")] Greater,
    #[token("<=")] LessEqual,
    #[token(">=")] GreaterEqual,
    #[token("!=")] NotEqual,
    #[token("==")] EqualEqual,

    // ==< Keywords >==
    #[token("class")] ClassKW,
    #[token("int")] IntKW,
    #[token("float")] FloatKW,
    #[token("string")] StringKW,
    #[token("void")] VoidKW,
    #[token("if")] IfKW,
    #[token("else")] ElseKW,
    #[token("while")] WhileKW,
    #[token("return")] ReturnKW,
    #[token("break")] BreakKW,
    #[token("continue")] ContinueKW,
    #[token("print")] PrintKW,
    #[token("new")] NewKW,
    #[token("null")] NullKW,
    #[token("this")] ThisKW,

    // ==< Value literals >==
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())] IntLiteral(i64),
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),
    #[regex(r#""(?:\\.|[^\\"])*""#, allocated_string)] StringLiteral(String),

    // ==< Other >==
    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*", allocated_string)] Identifier(String),

    Error
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::IntLiteral(value) => write!(f, "{value}"),
            Token::FloatLiteral(value) => write!(f, "{value}"),
            Token::StringLiteral(value) | Token::Identifier(value) => write!(f, "{value}"),
            Token::Error => write!(f, "<invalid>"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[inline(always)]
fn allocated_string(lex: &mut Lexer<Token>) -> String {
    lex.slice().to_owned()
}

/// Splits `source` into located tokens. Unrecognised input is kept as [`Token::Error`] so the
/// parser can point at it.
pub fn lex(source_id: SourceId, source: &str) -> Vec<(Token, Loc)> {
    Token::lexer(source)
        .spanned()
        .map(|(tok, span)| match tok {
            Ok(tok) => (tok, Loc::new(source_id, span)),
            Err(()) => (Token::Error, Loc::new(source_id, span)),
        })
        .collect()
}
