//! Recursive descent parser for the statement language.
//!
//! Two entry points mirror the two ways a statement is run:
//! [`parse_expression`] accepts exactly one expression (the evaluation
//! path), [`parse_program`] accepts a sequence of statements (the execution
//! path).

use super::ast::{BinOp, BoolOp, CmpOp, Constant, Expr, Stmt, Target, UnaryOp};
use super::exception::{EvalResult, Exception};
use super::lexer::{tokenize, Spanned, Token};

/// Maximum nesting of brackets, unary operators, `**` and call or
/// subscript suffixes.
///
/// Operator chains such as `a + b + c` are parsed into flat lists and do
/// not count against it.
pub const MAX_NESTING: usize = 200;

/// Parse source that must consist of a single expression.
///
/// Leading and trailing newlines are allowed. A top-level comma list is a
/// tuple, so `1, 2` is an expression.
pub fn parse_expression(source: &str) -> EvalResult<Expr> {
    let mut parser = Parser::new(tokenize(source)?);
    parser.skip_newlines();
    let expr = parser.expression_list()?;
    parser.skip_newlines();
    parser.expect_end()?;
    Ok(expr)
}

/// Parse source as a sequence of statements separated by newlines or `;`.
pub fn parse_program(source: &str) -> EvalResult<Vec<Stmt>> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut statements = Vec::new();

    loop {
        parser.skip_separators();
        if parser.at(&Token::Eof) {
            break;
        }
        statements.push(parser.statement()?);
        match parser.peek() {
            Token::Newline | Token::Semicolon | Token::Eof => {}
            _ => return Err(parser.unexpected()),
        }
    }

    Ok(statements)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        // tokenize always terminates the list with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> EvalResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_end(&self) -> EvalResult<()> {
        if self.at(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> Exception {
        let spanned = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        Exception::syntax(format!(
            "invalid syntax: unexpected {} (line {}, column {})",
            spanned.token.describe(),
            spanned.pos.line,
            spanned.pos.column
        ))
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.eat(&Token::Newline) || self.eat(&Token::Semicolon) {}
    }

    fn nest(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(Exception::syntax("too many nested parentheses"));
        }
        Ok(())
    }

    fn unnest(&mut self) {
        self.depth -= 1;
    }

    // ---- statements ----

    fn statement(&mut self) -> EvalResult<Stmt> {
        if self.eat(&Token::Pass) {
            return Ok(Stmt::Pass);
        }

        if self.eat(&Token::Del) {
            let mut targets = vec![Self::target_from(self.postfix()?)?];
            while self.eat(&Token::Comma) {
                targets.push(Self::target_from(self.postfix()?)?);
            }
            return Ok(Stmt::Delete(targets));
        }

        let first = self.expression_list()?;

        if let Token::AugAssign(op) = self.peek().clone() {
            self.advance();
            let target = match Self::target_from(first)? {
                Target::Unpack(_) => {
                    return Err(Exception::syntax(
                        "illegal expression for augmented assignment",
                    ))
                }
                target => target,
            };
            let value = self.expression_list()?;
            return Ok(Stmt::AugAssign { target, op, value });
        }

        if self.at(&Token::Assign) {
            let mut chain = vec![first];
            while self.eat(&Token::Assign) {
                chain.push(self.expression_list()?);
            }
            let value = chain.pop().unwrap_or(Expr::Constant(Constant::None));
            let targets = chain
                .into_iter()
                .map(Self::target_from)
                .collect::<EvalResult<Vec<_>>>()?;
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr(first))
    }

    fn target_from(expr: Expr) -> EvalResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript { value, index } => Ok(Target::Subscript {
                value: *value,
                index: *index,
            }),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Unpack(
                items
                    .into_iter()
                    .map(Self::target_from)
                    .collect::<EvalResult<Vec<_>>>()?,
            )),
            Expr::Call { .. } => Err(Exception::syntax("cannot assign to function call")),
            Expr::Constant(_) => Err(Exception::syntax("cannot assign to literal")),
            _ => Err(Exception::syntax("cannot assign to expression")),
        }
    }

    // ---- expressions ----

    /// `expr (, expr)* [,]`: a bare comma list is a tuple.
    fn expression_list(&mut self) -> EvalResult<Expr> {
        let first = self.expression()?;
        if !self.at(&Token::Comma) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.starts_expression() {
                items.push(self.expression()?);
            } else {
                break;
            }
        }
        Ok(Expr::Tuple(items))
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek(),
            Token::Newline
                | Token::Semicolon
                | Token::Eof
                | Token::Assign
                | Token::AugAssign(_)
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::Colon
                | Token::Comma
        )
    }

    /// `or_test ['if' or_test 'else' expression]`
    fn expression(&mut self) -> EvalResult<Expr> {
        self.nest()?;
        let body = self.or_test()?;
        let expr = if self.eat(&Token::If) {
            let test = self.or_test()?;
            self.expect(&Token::Else)?;
            let orelse = self.expression()?;
            Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            }
        } else {
            body
        };
        self.unnest();
        Ok(expr)
    }

    fn boolean(op: BoolOp, mut values: Vec<Expr>) -> Expr {
        if values.len() == 1 {
            values.remove(0)
        } else {
            Expr::Bool { op, values }
        }
    }

    fn or_test(&mut self) -> EvalResult<Expr> {
        let mut values = vec![self.and_test()?];
        while self.eat(&Token::Or) {
            values.push(self.and_test()?);
        }
        Ok(Self::boolean(BoolOp::Or, values))
    }

    fn and_test(&mut self) -> EvalResult<Expr> {
        let mut values = vec![self.not_test()?];
        while self.eat(&Token::And) {
            values.push(self.not_test()?);
        }
        Ok(Self::boolean(BoolOp::And, values))
    }

    fn not_test(&mut self) -> EvalResult<Expr> {
        if self.eat(&Token::Not) {
            self.nest()?;
            let operand = self.not_test()?;
            self.unnest();
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek().clone() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            Token::In => CmpOp::In,
            Token::Not if *self.peek_next() == Token::In => {
                self.advance();
                CmpOp::NotIn
            }
            Token::Is => {
                if *self.peek_next() == Token::Not {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> EvalResult<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn chain(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
        if rest.is_empty() {
            first
        } else {
            Expr::Arith {
                first: Box::new(first),
                rest,
            }
        }
    }

    fn arith(&mut self) -> EvalResult<Expr> {
        let first = self.term()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Op(op @ (BinOp::Add | BinOp::Sub)) => *op,
                _ => break,
            };
            self.advance();
            rest.push((op, self.term()?));
        }
        Ok(Self::chain(first, rest))
    }

    fn term(&mut self) -> EvalResult<Expr> {
        let first = self.factor()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Op(op @ (BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod)) => *op,
                _ => break,
            };
            self.advance();
            rest.push((op, self.factor()?));
        }
        Ok(Self::chain(first, rest))
    }

    /// `('+'|'-') factor | power`
    fn factor(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            Token::Op(BinOp::Sub) => UnaryOp::Neg,
            Token::Op(BinOp::Add) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        self.nest()?;
        let operand = self.factor()?;
        self.unnest();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// `postfix ['**' factor]`, right associative.
    fn power(&mut self) -> EvalResult<Expr> {
        let base = self.postfix()?;
        if self.eat(&Token::Op(BinOp::Pow)) {
            self.nest()?;
            let exponent = self.factor()?;
            self.unnest();
            return Ok(Expr::Power {
                base: Box::new(base),
                exponent: Box::new(exponent),
            });
        }
        Ok(base)
    }

    /// `atom (call | subscript)*`. Each suffix wraps the expression so far
    /// and counts as one level of nesting.
    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.atom()?;
        let mut suffixes = 0;
        loop {
            if matches!(self.peek(), Token::LParen | Token::LBracket) {
                self.nest()?;
                suffixes += 1;
            }
            if self.eat(&Token::LParen) {
                let args = self.sequence(&Token::RParen)?.0;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.expression_list()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                self.depth -= suffixes;
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to `close`. Returns the items and
    /// whether a trailing comma was seen.
    fn sequence(&mut self, close: &Token) -> EvalResult<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while !self.eat(close) {
            items.push(self.expression()?);
            trailing_comma = self.eat(&Token::Comma);
            if !trailing_comma {
                self.expect(close)?;
                break;
            }
        }
        Ok((items, trailing_comma))
    }

    fn atom(&mut self) -> EvalResult<Expr> {
        let start = self.pos;
        let expr = match self.advance() {
            Token::Int(n) => Expr::Constant(Constant::Int(n)),
            Token::Float(f) => Expr::Constant(Constant::Float(f)),
            Token::Str(mut s) => {
                // adjacent string literals concatenate
                while let Token::Str(next) = self.peek().clone() {
                    s.push_str(&next);
                    self.advance();
                }
                Expr::Constant(Constant::Str(s))
            }
            Token::True => Expr::Constant(Constant::Bool(true)),
            Token::False => Expr::Constant(Constant::Bool(false)),
            Token::None => Expr::Constant(Constant::None),
            Token::Name(name) => Expr::Name(name),
            Token::LParen => {
                self.nest()?;
                let (mut items, trailing_comma) = self.sequence(&Token::RParen)?;
                self.unnest();
                if items.len() == 1 && !trailing_comma {
                    items.remove(0)
                } else {
                    Expr::Tuple(items)
                }
            }
            Token::LBracket => {
                self.nest()?;
                let items = self.sequence(&Token::RBracket)?.0;
                self.unnest();
                Expr::List(items)
            }
            Token::LBrace => {
                self.nest()?;
                let entries = self.dict_entries()?;
                self.unnest();
                Expr::Dict(entries)
            }
            _ => {
                self.pos = start;
                return Err(self.unexpected());
            }
        };
        Ok(expr)
    }

    fn dict_entries(&mut self) -> EvalResult<Vec<(Expr, Expr)>> {
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = self.expression()?;
            self.expect(&Token::Colon)?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace)?;
                break;
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ExceptionKind;

    fn int(n: i64) -> Expr {
        Expr::Constant(Constant::Int(n))
    }

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    fn power(base: Expr, exponent: Expr) -> Expr {
        Expr::Power {
            base: Box::new(base),
            exponent: Box::new(exponent),
        }
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Parser::chain(
                int(1),
                vec![(BinOp::Add, Parser::chain(int(2), vec![(BinOp::Mul, int(3))]))]
            )
        );
    }

    #[test]
    fn test_operator_chains_are_flat() {
        let expr = parse_expression("a - b + c or d or e").unwrap();
        assert_eq!(
            expr,
            Expr::Bool {
                op: BoolOp::Or,
                values: vec![
                    Parser::chain(name("a"), vec![(BinOp::Sub, name("b")), (BinOp::Add, name("c"))]),
                    name("d"),
                    name("e"),
                ],
            }
        );

        let long = format!("1{}", " + 1".repeat(100_000));
        match parse_expression(&long).unwrap() {
            Expr::Arith { rest, .. } => assert_eq!(rest.len(), 100_000),
            other => panic!("expected a flat chain, got {:?}", other),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let expr = parse_expression("-2 ** 2").unwrap();
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(power(int(2), int(2))),
            }
        );
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse_expression("2 ** 3 ** 2").unwrap();
        assert_eq!(expr, power(int(2), power(int(3), int(2))));
    }

    #[test]
    fn test_chained_comparison() {
        let expr = parse_expression("a < b not in c").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                first: Box::new(name("a")),
                rest: vec![(CmpOp::Lt, name("b")), (CmpOp::NotIn, name("c"))],
            }
        );
    }

    #[test]
    fn test_tuples_and_grouping() {
        assert_eq!(parse_expression("(1)").unwrap(), int(1));
        assert_eq!(parse_expression("(1,)").unwrap(), Expr::Tuple(vec![int(1)]));
        assert_eq!(parse_expression("()").unwrap(), Expr::Tuple(vec![]));
        assert_eq!(
            parse_expression("1, 2").unwrap(),
            Expr::Tuple(vec![int(1), int(2)])
        );
    }

    #[test]
    fn test_call_and_subscript() {
        let expr = parse_expression("f(x)[0]").unwrap();
        assert_eq!(
            expr,
            Expr::Subscript {
                value: Box::new(Expr::Call {
                    func: Box::new(name("f")),
                    args: vec![name("x")],
                }),
                index: Box::new(int(0)),
            }
        );
    }

    #[test]
    fn test_assignment_is_not_an_expression() {
        let err = parse_expression("x = 5").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::SyntaxError);
    }

    #[test]
    fn test_program_statements() {
        let program = parse_program("x = y = 1; x += 2\ndel x\npass").unwrap();
        assert_eq!(
            program,
            vec![
                Stmt::Assign {
                    targets: vec![Target::Name("x".into()), Target::Name("y".into())],
                    value: int(1),
                },
                Stmt::AugAssign {
                    target: Target::Name("x".into()),
                    op: BinOp::Add,
                    value: int(2),
                },
                Stmt::Delete(vec![Target::Name("x".into())]),
                Stmt::Pass,
            ]
        );
    }

    #[test]
    fn test_unpacking_target() {
        let program = parse_program("a, b = 1, 2").unwrap();
        assert_eq!(
            program,
            vec![Stmt::Assign {
                targets: vec![Target::Unpack(vec![
                    Target::Name("a".into()),
                    Target::Name("b".into()),
                ])],
                value: Expr::Tuple(vec![int(1), int(2)]),
            }]
        );
    }

    #[test]
    fn test_empty_program() {
        assert!(parse_program("").unwrap().is_empty());
        assert!(parse_program("\n;\n").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_programs() {
        for source in [")(", "1 +", "x = ", "1 = x", "f() = 3", "[1, 2", "a b"] {
            let err = parse_program(source).unwrap_err();
            assert_eq!(err.kind, ExceptionKind::SyntaxError, "source: {:?}", source);
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_expression(&deep).unwrap_err();
        assert!(err.message.contains("too many nested"));

        let unary = format!("{}1", "-".repeat(500));
        assert!(parse_expression(&unary).is_err());

        for suffix in ["[0]", "()"] {
            let chained = format!("x{}", suffix.repeat(500));
            let err = parse_expression(&chained).unwrap_err();
            assert!(err.message.contains("too many nested"), "suffix: {}", suffix);
        }
        // suffixes release their nesting once the postfix expression ends
        let siblings = vec!["f(x)[0]"; 500].join(" + ");
        assert!(parse_expression(&siblings).is_ok());
    }
}
