//! Lexer for the statement language.
//!
//! Produces a flat token list terminated by [`Token::Eof`]. Newlines inside
//! brackets are dropped (implicit line joining); all other whitespace and
//! `#` comments are skipped.
//!
//! Each token is recognized by a small `nom` parser over a
//! [`LocatedSpan`], which carries the line and column used in syntax error
//! messages.

use std::borrow::Cow;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till1, take_while, take_while1},
    character::complete::{anychar, char, not_line_ending, one_of, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    multi::{fold_many0, many0_count},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use nom_locate::LocatedSpan;

use super::exception::{EvalResult, Exception};

/// Input position tracked while lexing.
pub type Span<'a> = LocatedSpan<&'a str>;

type LexResult<'a, T> = IResult<Span<'a>, T, LexError>;

/// Binary operators usable in augmented assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),

    True,
    False,
    None,
    And,
    Or,
    Not,
    If,
    Else,
    In,
    Is,
    Del,
    Pass,

    Op(BinOp),
    AugAssign(BinOp),
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Newline,
    Eof,
}

impl Token {
    /// Short description for syntax error messages.
    pub fn describe(&self) -> String {
        let text = match self {
            Token::Int(n) => return n.to_string(),
            Token::Float(f) => return f.to_string(),
            Token::Str(_) => "string literal",
            Token::Name(name) => return name.clone(),
            Token::Newline => "newline",
            Token::Eof => "end of input",
            Token::Op(op) => op.symbol(),
            Token::AugAssign(op) => return format!("{}=", op.symbol()),
            Token::True => "True",
            Token::False => "False",
            Token::None => "None",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::If => "if",
            Token::Else => "else",
            Token::In => "in",
            Token::Is => "is",
            Token::Del => "del",
            Token::Pass => "pass",
            Token::Assign => "=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
        };
        text.to_string()
    }
}

/// Source position (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    fn of(span: &Span) -> Self {
        Self {
            line: span.location_line() as usize,
            column: span.get_utf8_column(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: Pos,
}

/// Lexing failure.
///
/// `exception` is `None` when no token parser matched; the driver then
/// reports the offending character.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    exception: Option<Exception>,
}

impl LexError {
    fn syntax(input: Span, message: &str) -> Self {
        let pos = Pos::of(&input);
        Self {
            exception: Some(Exception::syntax(format!(
                "{} (line {}, column {})",
                message, pos.line, pos.column
            ))),
        }
    }

    fn raise(exception: Exception) -> Self {
        Self {
            exception: Some(exception),
        }
    }
}

impl<'a> nom::error::ParseError<Span<'a>> for LexError {
    fn from_error_kind(_input: Span<'a>, _kind: nom::error::ErrorKind) -> Self {
        Self { exception: None }
    }

    fn append(_input: Span<'a>, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

/// Turn any error of `parser` into a failure reported at `input`.
fn fail_with<'a, O>(
    message: &'static str,
    mut parser: impl FnMut(Span<'a>) -> LexResult<'a, O>,
) -> impl FnMut(Span<'a>) -> LexResult<'a, O> {
    move |input| {
        parser(input).map_err(|_| nom::Err::Failure(LexError::syntax(input, message)))
    }
}

/// Split source text into tokens.
pub fn tokenize(source: &str) -> EvalResult<Vec<Spanned>> {
    let mut input = Span::new(source);
    let mut tokens = Vec::new();
    let mut depth = 0usize;

    loop {
        let (rest, _) = trivia(input).map_err(|e| to_exception(input, e))?;
        input = rest;
        if input.fragment().is_empty() {
            break;
        }

        let pos = Pos::of(&input);
        let (rest, token) = token(input).map_err(|e| to_exception(input, e))?;
        input = rest;

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => {
                depth = depth.saturating_sub(1)
            }
            Token::Newline if depth > 0 => continue,
            _ => {}
        }
        tokens.push(Spanned { token, pos });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        pos: Pos::of(&input),
    });
    Ok(tokens)
}

fn to_exception(input: Span, error: nom::Err<LexError>) -> Exception {
    let error = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => LexError::syntax(input, "unexpected end of input"),
    };
    match error.exception {
        Some(exception) => exception,
        None => {
            let found = input.fragment().chars().next().unwrap_or(' ');
            let pos = Pos::of(&input);
            Exception::syntax(format!(
                "invalid character '{}' (line {}, column {})",
                found, pos.line, pos.column
            ))
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whitespace other than newlines, comments and `\` line continuations.
fn trivia(input: Span) -> LexResult<usize> {
    many0_count(alt((
        recognize(take_while1(|c: char| matches!(c, ' ' | '\t' | '\r' | '\x0c'))),
        recognize(preceded(char('#'), not_line_ending)),
        recognize(preceded(
            char('\\'),
            fail_with(
                "unexpected character after line continuation",
                recognize(pair(opt(char('\r')), char('\n'))),
            ),
        )),
    )))(input)
}

fn token(input: Span) -> LexResult<Token> {
    alt((
        value(Token::Newline, char('\n')),
        number,
        string_literal,
        keyword,
        name,
        symbol,
    ))(input)
}

/// A keyword, unless it is only the prefix of a longer name.
fn word<'a>(text: &'static str, token: Token) -> impl FnMut(Span<'a>) -> LexResult<'a, Token> {
    value(token, terminated(tag(text), not(peek(satisfy(is_ident_char)))))
}

fn keyword(input: Span) -> LexResult<Token> {
    alt((
        word("True", Token::True),
        word("False", Token::False),
        word("None", Token::None),
        word("and", Token::And),
        word("or", Token::Or),
        word("not", Token::Not),
        word("if", Token::If),
        word("else", Token::Else),
        word("in", Token::In),
        word("is", Token::Is),
        word("del", Token::Del),
        word("pass", Token::Pass),
    ))(input)
}

fn name(input: Span) -> LexResult<Token> {
    map(
        recognize(pair(
            satisfy(|c: char| c.is_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |word: Span| Token::Name(word.fragment().to_string()),
    )(input)
}

fn symbol(input: Span) -> LexResult<Token> {
    alt((
        alt((
            value(Token::AugAssign(BinOp::Pow), tag("**=")),
            value(Token::AugAssign(BinOp::FloorDiv), tag("//=")),
            value(Token::Op(BinOp::Pow), tag("**")),
            value(Token::Op(BinOp::FloorDiv), tag("//")),
            value(Token::AugAssign(BinOp::Add), tag("+=")),
            value(Token::AugAssign(BinOp::Sub), tag("-=")),
            value(Token::AugAssign(BinOp::Mul), tag("*=")),
            value(Token::AugAssign(BinOp::Div), tag("/=")),
            value(Token::AugAssign(BinOp::Mod), tag("%=")),
            value(Token::EqEq, tag("==")),
            value(Token::NotEq, tag("!=")),
            value(Token::Le, tag("<=")),
            value(Token::Ge, tag(">=")),
        )),
        alt((
            value(Token::Op(BinOp::Add), char('+')),
            value(Token::Op(BinOp::Sub), char('-')),
            value(Token::Op(BinOp::Mul), char('*')),
            value(Token::Op(BinOp::Div), char('/')),
            value(Token::Op(BinOp::Mod), char('%')),
            value(Token::Assign, char('=')),
            value(Token::Lt, char('<')),
            value(Token::Gt, char('>')),
        )),
        alt((
            value(Token::LParen, char('(')),
            value(Token::RParen, char(')')),
            value(Token::LBracket, char('[')),
            value(Token::RBracket, char(']')),
            value(Token::LBrace, char('{')),
            value(Token::RBrace, char('}')),
            value(Token::Comma, char(',')),
            value(Token::Colon, char(':')),
            value(Token::Semicolon, char(';')),
        )),
    ))(input)
}

/// Digits in `radix`, with `_` separators after the first digit.
fn digits<'a>(radix: u32) -> impl FnMut(Span<'a>) -> LexResult<'a, Span<'a>> {
    move |input| {
        recognize(pair(
            satisfy(move |c: char| c.is_digit(radix)),
            take_while(move |c: char| c.is_digit(radix) || c == '_'),
        ))(input)
    }
}

fn number(input: Span) -> LexResult<Token> {
    let (rest, token) = alt((radix_integer, decimal))(input)?;
    // `1abc` is one bad literal, not a number followed by a name
    let (rest, _) = not(peek(satisfy(is_ident_char)))(rest).map_err(|_: nom::Err<LexError>| {
        nom::Err::Failure(LexError::syntax(input, "invalid number literal"))
    })?;
    Ok((rest, token))
}

fn prefixed<'a>(
    prefix: &'static str,
    radix: u32,
) -> impl FnMut(Span<'a>) -> LexResult<'a, (Span<'a>, u32)> {
    map(
        preceded(
            tag_no_case(prefix),
            fail_with("invalid number literal", digits(radix)),
        ),
        move |text: Span<'a>| (text, radix),
    )
}

fn radix_integer(input: Span) -> LexResult<Token> {
    let (rest, (text, radix)) =
        alt((prefixed("0x", 16), prefixed("0o", 8), prefixed("0b", 2)))(input)?;

    let cleaned = text.fragment().replace('_', "");
    let value = i64::from_str_radix(&cleaned, radix)
        .map_err(|_| nom::Err::Failure(LexError::raise(Exception::overflow())))?;
    Ok((rest, Token::Int(value)))
}

fn decimal(input: Span) -> LexResult<Token> {
    let mantissa = alt((
        recognize(pair(digits(10), opt(pair(char('.'), opt(digits(10)))))),
        recognize(pair(char('.'), digits(10))),
    ));
    let exponent = recognize(tuple((
        one_of("eE"),
        opt(one_of("+-")),
        fail_with("invalid number literal", digits(10)),
    )));
    let (rest, text) = recognize(pair(mantissa, opt(exponent)))(input)?;

    let cleaned = text.fragment().replace('_', "");
    let token = if cleaned.contains(['.', 'e', 'E']) {
        let value = cleaned.parse::<f64>().map_err(|_| {
            nom::Err::Failure(LexError::syntax(input, "invalid number literal"))
        })?;
        Token::Float(value)
    } else {
        let value = cleaned
            .parse::<i64>()
            .map_err(|_| nom::Err::Failure(LexError::raise(Exception::overflow())))?;
        Token::Int(value)
    };
    Ok((rest, token))
}

fn escape<'a>(c: char) -> Cow<'a, str> {
    let text = match c {
        'n' => "\n",
        't' => "\t",
        'r' => "\r",
        '0' => "\0",
        '\\' => "\\",
        '\'' => "'",
        '"' => "\"",
        // escaped newline continues the literal on the next line
        '\n' => "",
        other => return Cow::Owned(format!("\\{}", other)),
    };
    Cow::Borrowed(text)
}

/// A run of plain characters or one escape sequence inside a literal.
fn string_piece<'a>(quote: char) -> impl FnMut(Span<'a>) -> LexResult<'a, Cow<'a, str>> {
    alt((
        map(
            take_till1(move |c: char| c == quote || c == '\\' || c == '\n'),
            |text: Span<'a>| Cow::Borrowed(*text.fragment()),
        ),
        map(preceded(char('\\'), anychar), escape),
    ))
}

fn string_literal(input: Span) -> LexResult<Token> {
    let (body, quote) = one_of("'\"")(input)?;

    let (rest, text) = fold_many0(
        string_piece(quote),
        String::new,
        |mut text: String, piece: Cow<str>| {
            text.push_str(&piece);
            text
        },
    )(body)?;

    let (rest, _) = char(quote)(rest).map_err(|_: nom::Err<LexError>| {
        nom::Err::Failure(LexError::syntax(input, "unterminated string literal"))
    })?;
    Ok((rest, Token::Str(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ExceptionKind;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_arithmetic_tokens() {
        assert_eq!(
            kinds("1 + 2.5 ** x // 3"),
            vec![
                Token::Int(1),
                Token::Op(BinOp::Add),
                Token::Float(2.5),
                Token::Op(BinOp::Pow),
                Token::Name("x".to_string()),
                Token::Op(BinOp::FloorDiv),
                Token::Int(3),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_assignment_and_comparison() {
        assert_eq!(
            kinds("x += 1; y = x == 2"),
            vec![
                Token::Name("x".to_string()),
                Token::AugAssign(BinOp::Add),
                Token::Int(1),
                Token::Semicolon,
                Token::Name("y".to_string()),
                Token::Assign,
                Token::Name("x".to_string()),
                Token::EqEq,
                Token::Int(2),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_a_name() {
        assert_eq!(
            kinds("island is_ok"),
            vec![
                Token::Name("island".to_string()),
                Token::Name("is_ok".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_are_joined() {
        assert_eq!(
            kinds("[1,\n 2]\nx"),
            vec![
                Token::LBracket,
                Token::Int(1),
                Token::Comma,
                Token::Int(2),
                Token::RBracket,
                Token::Newline,
                Token::Name("x".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            kinds("1 + \\\n2"),
            vec![Token::Int(1), Token::Op(BinOp::Add), Token::Int(2), Token::Eof]
        );
        let err = tokenize("1 \\ 2").unwrap_err();
        assert!(err.message.contains("after line continuation"));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\tb\n" 'c\q'"#),
            vec![
                Token::Str("it's".to_string()),
                Token::Str("a\tb\n".to_string()),
                Token::Str("c\\q".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            kinds("0x1f 0b101 0o17 1_000 .5 1e3 2."),
            vec![
                Token::Int(31),
                Token::Int(5),
                Token::Int(15),
                Token::Int(1000),
                Token::Float(0.5),
                Token::Float(1000.0),
                Token::Float(2.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_invalid_number_literals() {
        for source in ["1abc", "0x", "1e"] {
            let err = tokenize(source).unwrap_err();
            assert_eq!(err.kind, ExceptionKind::SyntaxError, "source: {:?}", source);
            assert!(err.message.contains("invalid number literal"));
        }
    }

    #[test]
    fn test_keywords_and_comments() {
        assert_eq!(
            kinds("not None # trailing comment"),
            vec![Token::Not, Token::None, Token::Eof]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a\n  bb").unwrap();
        assert_eq!(tokens[0].pos, Pos { line: 1, column: 1 });
        assert_eq!(tokens[2].pos, Pos { line: 2, column: 3 });
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::SyntaxError);
        assert!(err.message.contains("unterminated string"));
        assert!(tokenize("'abc\n'").is_err());
    }

    #[test]
    fn test_integer_literal_overflow() {
        let err = tokenize("99999999999999999999").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("a $ b").unwrap_err();
        assert!(err.message.contains("invalid character '$'"));
        assert!(err.message.contains("column 3"));
    }
}
