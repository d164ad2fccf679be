//! Tokens → abstract syntax tree, via precedence climbing ("shunting-yard";
//! see spec §4.2).
//!
//! Every `parse_*` method returns `Ok(Node)` on success or `Err(())` once it
//! has pushed a [`Diagnostic`] describing the failure — the `()` carries no
//! information of its own because the diagnostic already does, mirroring
//! the teacher's error-enum split between an internal marker and a
//! formatted user-facing message.
//!
//! [`Diagnostic`]: crate::error::Diagnostic

use crate::ast::{BinaryOp, Function, FunctionAnalysis, Node, ObjectEntry, UnaryOp, Variable, VariableKind};
use crate::error::{Coords, Diagnostics, Stage};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

type PResult<T> = Result<T, ()>;

/// Operator-stack entry for the shunting-yard loop in [`Parser::parse_expression`].
enum OpEntry {
    Sentinel,
    Unary(UnaryOp, Coords),
    Binary(BinaryOp, Coords),
    /// `a[i]` — the bracketed index expression has already been parsed.
    Index(Node, Coords),
    /// `a(args...)` — the argument list has already been parsed.
    Call(Vec<Node>, Coords),
    /// `name : (params) { body }` or `name :: { body }` — the function
    /// literal has already been parsed; this folds into an assignment.
    FunctionAssign(Function, Coords),
    /// `a.name` — member access.
    Member(Coords),
    /// `a -> f(args)` — desugars into a call with `a` prepended (§4.2).
    Arrow(Coords),
}

impl OpEntry {
    fn precedence(&self) -> i32 {
        match self {
            Self::Sentinel => -1,
            Self::Unary(..) => 120,
            Self::Arrow(..) => 130,
            Self::Binary(op, _) => binary_precedence(*op),
            Self::Index(..) | Self::Call(..) | Self::FunctionAssign(..) | Self::Member(..) => 150,
        }
    }

    fn right_associative(&self) -> bool {
        match self {
            Self::Binary(op, _) => matches!(
                op,
                BinaryOp::Assign
                    | BinaryOp::AddAssign
                    | BinaryOp::SubAssign
                    | BinaryOp::MulAssign
                    | BinaryOp::DivAssign
                    | BinaryOp::PowAssign
                    | BinaryOp::ModAssign
                    | BinaryOp::ConcatAssign
                    | BinaryOp::Shr
                    | BinaryOp::Shl
            ),
            _ => false,
        }
    }
}

fn binary_precedence(op: BinaryOp) -> i32 {
    use BinaryOp::*;
    match op {
        Assign | AddAssign | SubAssign | MulAssign | DivAssign | PowAssign | ModAssign | ConcatAssign => 20,
        Shr => 24,
        Shl => 25,
        Or => 40,
        And => 50,
        Xor => 60,
        Eq | NotEq => 70,
        Lt | Gt | LtEq | GtEq => 80,
        Add | Sub | Concatenate => 90,
        Mul | Div | Mod => 100,
        Pow => 110,
    }
}

/// Produces an AST whose root is always a [`Function`] node representing
/// the top-level script (§4.2).
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
}

impl<'src> Parser<'src> {
    pub fn parse_program(source: &'src str, diags: &mut Diagnostics) -> PResult<Function> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token(diags);
        let mut parser = Self { lexer, current };
        let body = parser.parse_block_of_statements_until_eof(diags)?;
        Ok(Function {
            name: None,
            named_parameters: vec![],
            body: Box::new(body),
            analysis: FunctionAnalysis::default(),
            at: Coords::new(1, 1),
        })
    }

    fn bump(&mut self, diags: &mut Diagnostics) -> Token {
        let prev = self.current;
        self.current = self.lexer.next_token(diags);
        prev
    }

    fn bump_ignoring_newlines(&mut self, diags: &mut Diagnostics) -> Token {
        let prev = self.current;
        self.current = self.lexer.next_token_ignoring_newlines(diags);
        prev
    }

    fn error(&self, diags: &mut Diagnostics, message: impl Into<String>) {
        diags.push(Stage::Syntax, message, self.current.at);
    }

    fn expect(&mut self, kind: TokenKind, what: &str, diags: &mut Diagnostics) -> PResult<()> {
        if self.current.kind == kind {
            self.bump_ignoring_newlines(diags);
            Ok(())
        } else {
            self.error(diags, format!("expected {what}"));
            Err(())
        }
    }

    fn parse_block_of_statements_until_eof(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        let mut nodes = vec![];
        while self.current.kind != TokenKind::Eof {
            while matches!(self.current.kind, TokenKind::NewLine | TokenKind::Semicolon) {
                self.bump_ignoring_newlines(diags);
            }
            if self.current.kind == TokenKind::Eof {
                break;
            }
            nodes.push(self.parse_expression(diags)?);
            while matches!(self.current.kind, TokenKind::NewLine | TokenKind::Semicolon) {
                self.bump_ignoring_newlines(diags);
            }
        }
        Ok(Node::Block(nodes, at))
    }

    /// The shunting-yard expression parser (spec §4.2).
    fn parse_expression(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let mut prev_kind: Option<TokenKind> = None;

        if matches!(self.current.kind, TokenKind::NewLine | TokenKind::Semicolon) {
            while matches!(self.current.kind, TokenKind::NewLine | TokenKind::Semicolon) {
                self.bump_ignoring_newlines(diags);
            }
        }
        if self.current.kind == TokenKind::Eof {
            self.error(diags, "expression expected");
            return Err(());
        }

        let mut operators: Vec<OpEntry> = vec![OpEntry::Sentinel];
        let mut operands: Vec<Node> = vec![];
        let mut primary_expected;

        loop {
            primary_expected = false;
            let at = self.current.at;
            let kind = self.current.kind;

            match classify(prev_kind, kind) {
                ExprClass::Binary => {
                    let op = binary_op_for(kind).expect("classify guarantees a binary op");
                    let prec = binary_precedence(op);
                    while prec < operators.last().expect("sentinel").precedence()
                        || (prec == operators.last().expect("sentinel").precedence()
                            && !right_assoc_for_binary(op))
                    {
                        fold(&mut operators, &mut operands)?;
                    }
                    operators.push(OpEntry::Binary(op, at));
                    primary_expected = true;
                    self.bump_ignoring_newlines(diags);
                }
                ExprClass::Unary => {
                    let op = unary_op_for(kind).expect("classify guarantees a unary op");
                    while operators.last().expect("sentinel").precedence() > 120 {
                        fold(&mut operators, &mut operands)?;
                    }
                    operators.push(OpEntry::Unary(op, at));
                    primary_expected = true;
                    self.bump_ignoring_newlines(diags);
                }
                ExprClass::Index => {
                    while 150 < operators.last().expect("sentinel").precedence() {
                        fold(&mut operators, &mut operands)?;
                    }
                    let index_expr = self.parse_index_operator(diags)?;
                    operators.push(OpEntry::Index(index_expr, at));
                }
                ExprClass::Call => {
                    while 150 < operators.last().expect("sentinel").precedence() {
                        fold(&mut operators, &mut operands)?;
                    }
                    let args = self.parse_arguments(diags)?;
                    operators.push(OpEntry::Call(args, at));
                }
                ExprClass::FunctionAssign => {
                    while 150 < operators.last().expect("sentinel").precedence() {
                        fold(&mut operators, &mut operands)?;
                    }
                    let function = self.parse_function_literal(diags)?;
                    operators.push(OpEntry::FunctionAssign(function, at));
                }
                ExprClass::Member => {
                    while 150 < operators.last().expect("sentinel").precedence() {
                        fold(&mut operators, &mut operands)?;
                    }
                    operators.push(OpEntry::Member(at));
                    primary_expected = true;
                    self.bump_ignoring_newlines(diags);
                }
                ExprClass::Arrow => {
                    while 130 <= operators.last().expect("sentinel").precedence() {
                        fold(&mut operators, &mut operands)?;
                    }
                    operators.push(OpEntry::Arrow(at));
                    primary_expected = true;
                    self.bump_ignoring_newlines(diags);
                }
                ExprClass::Primary => {
                    let node = self.parse_primary(diags)?;
                    operands.push(node);
                }
                ExprClass::Unknown => {
                    self.error(diags, "operator expected");
                    return Err(());
                }
            }

            prev_kind = Some(kind);
            if self.current.kind.is_expr_terminator() && !primary_expected {
                break;
            }
        }

        while operands.len() > 1 || operators.len() > 1 {
            fold(&mut operators, &mut operands)?;
        }

        operands.pop().ok_or(())
    }

    fn parse_primary(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        match self.current.kind {
            TokenKind::Nil => {
                self.bump_ignoring_newlines(diags);
                Ok(Node::Nil(at))
            }
            TokenKind::Int => {
                let v = self.lexer.last_integer;
                self.bump_ignoring_newlines(diags);
                Ok(Node::Int(v, at))
            }
            TokenKind::Float => {
                let v = self.lexer.last_float;
                self.bump_ignoring_newlines(diags);
                Ok(Node::Float(v, at))
            }
            TokenKind::String => {
                let v = self.lexer.last_string.clone();
                self.bump_ignoring_newlines(diags);
                Ok(Node::Str(v, at))
            }
            TokenKind::Bool => {
                let v = self.lexer.last_bool;
                self.bump_ignoring_newlines(diags);
                Ok(Node::Bool(v, at))
            }
            TokenKind::This => {
                self.bump_ignoring_newlines(diags);
                Ok(Node::Variable(Variable {
                    kind: VariableKind::This,
                    binding: crate::ast::Binding::Unresolved,
                    first_occurrence: false,
                    at,
                }))
            }
            TokenKind::DollarDollar => {
                self.bump_ignoring_newlines(diags);
                Ok(Node::Variable(Variable {
                    kind: VariableKind::ArgsArray,
                    binding: crate::ast::Binding::Unresolved,
                    first_occurrence: false,
                    at,
                }))
            }
            TokenKind::Dollar | TokenKind::DollarIndex => {
                let idx = self.lexer.last_argument_index.unwrap_or(0);
                self.bump_ignoring_newlines(diags);
                Ok(Node::Variable(Variable {
                    kind: VariableKind::ArgIndex(idx),
                    binding: crate::ast::Binding::Unresolved,
                    first_occurrence: false,
                    at,
                }))
            }
            TokenKind::Underscore => {
                self.bump_ignoring_newlines(diags);
                Ok(Node::Variable(Variable {
                    kind: VariableKind::Discard,
                    binding: crate::ast::Binding::Unresolved,
                    first_occurrence: false,
                    at,
                }))
            }
            TokenKind::Identifier => {
                let name = self.lexer.last_identifier.clone();
                self.bump_ignoring_newlines(diags);
                Ok(Node::Variable(Variable::named(name, at)))
            }
            TokenKind::LParen => self.parse_parenthesis(diags),
            TokenKind::LBrace => self.parse_block(diags),
            TokenKind::LBracket => self.parse_array_or_object(diags),
            TokenKind::Colon | TokenKind::DoubleColon => Ok(Node::Function(Box::new(self.parse_function_literal(diags)?))),
            TokenKind::If => self.parse_if(diags),
            TokenKind::While => self.parse_while(diags),
            TokenKind::For => self.parse_for(diags),
            TokenKind::Return | TokenKind::Break | TokenKind::Continue | TokenKind::Yield => {
                self.parse_control_expression(diags)
            }
            _ => {
                self.error(diags, "unexpected token");
                Err(())
            }
        }
    }

    fn parse_parenthesis(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        self.bump_ignoring_newlines(diags); // eat (
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let node = self.parse_expression(diags)?;
        self.expect(TokenKind::RParen, "')'", diags)?;
        Ok(node)
    }

    fn parse_index_operator(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        self.bump_ignoring_newlines(diags); // eat [
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let node = self.parse_expression(diags)?;
        self.expect(TokenKind::RBracket, "']'", diags)?;
        Ok(node)
    }

    fn parse_arguments(&mut self, diags: &mut Diagnostics) -> PResult<Vec<Node>> {
        self.bump_ignoring_newlines(diags); // eat (
        let mut args = vec![];
        while self.current.kind != TokenKind::RParen {
            if self.current.kind.is_expr_terminator() {
                self.error(diags, "expression expected");
                return Err(());
            }
            args.push(self.parse_expression(diags)?);
            while self.current.kind == TokenKind::NewLine {
                self.bump_ignoring_newlines(diags);
            }
            if self.current.kind == TokenKind::Comma {
                self.bump_ignoring_newlines(diags);
            } else if self.current.kind != TokenKind::RParen {
                self.error(diags, "expected ')'");
                return Err(());
            }
        }
        self.bump(diags); // eat )
        Ok(args)
    }

    fn parse_block(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        self.bump_ignoring_newlines(diags); // eat {
        let mut nodes = vec![];
        while self.current.kind != TokenKind::RBrace {
            if self.current.kind == TokenKind::Eof {
                self.error(diags, "expected '}'");
                return Err(());
            }
            nodes.push(self.parse_expression(diags)?);
            while matches!(self.current.kind, TokenKind::NewLine | TokenKind::Semicolon) {
                self.bump_ignoring_newlines(diags);
            }
        }
        self.bump(diags); // eat }
        Ok(Node::Block(nodes, at))
    }

    fn parse_function_literal(&mut self, diags: &mut Diagnostics) -> PResult<Function> {
        let at = self.current.at;
        let mut named_parameters = vec![];

        if self.current.kind == TokenKind::DoubleColon {
            self.bump_ignoring_newlines(diags); // eat ::
        } else if self.current.kind == TokenKind::Colon {
            self.bump_ignoring_newlines(diags); // eat :
            self.expect(TokenKind::LParen, "'('", diags)?;
            while self.current.kind != TokenKind::RParen {
                if self.current.kind != TokenKind::Identifier {
                    self.error(diags, "identifier expected");
                    return Err(());
                }
                named_parameters.push(self.lexer.last_identifier.clone());
                self.bump_ignoring_newlines(diags);
                if self.current.kind == TokenKind::Comma {
                    self.bump_ignoring_newlines(diags);
                } else if self.current.kind != TokenKind::RParen {
                    self.error(diags, "expected ',' or ')'");
                    return Err(());
                }
            }
            self.bump_ignoring_newlines(diags); // eat )
        }

        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let body = self.parse_expression(diags)?;
        Ok(Function {
            name: None,
            named_parameters,
            body: Box::new(body),
            analysis: FunctionAnalysis::default(),
            at,
        })
    }

    fn parse_array_or_object(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        self.bump_ignoring_newlines(diags); // eat [

        if self.current.kind == TokenKind::Assign {
            self.bump_ignoring_newlines(diags); // eat =
            if self.current.kind == TokenKind::RBracket {
                self.bump(diags);
                return Ok(Node::Object(vec![], at));
            }
            self.error(diags, "expression expected");
            return Err(());
        }

        let mut first = true;
        let mut is_object = false;
        let mut elements = vec![];
        let mut entries: Vec<ObjectEntry> = vec![];

        while self.current.kind != TokenKind::RBracket {
            if self.current.kind.is_expr_terminator() {
                self.error(diags, "expression expected");
                return Err(());
            }
            let element = self.parse_expression(diags)?;
            let this_is_object = matches!(&element, Node::BinaryOp { op: BinaryOp::Assign, .. });

            if first {
                is_object = this_is_object;
                first = false;
            } else if is_object != this_is_object {
                self.error(diags, "mixing array and object literal syntax");
                return Err(());
            }

            if is_object {
                let Node::BinaryOp { lhs, rhs, at: entry_at, .. } = element else {
                    unreachable!("this_is_object guarantees a BinaryOp::Assign node");
                };
                let Node::Variable(Variable {
                    kind: VariableKind::Named(key),
                    ..
                }) = *lhs
                else {
                    self.error(diags, "object literal keys must be named identifiers");
                    return Err(());
                };
                entries.push(ObjectEntry {
                    key,
                    value: *rhs,
                    at: entry_at,
                });
            } else {
                elements.push(element);
            }

            while self.current.kind == TokenKind::NewLine {
                self.bump_ignoring_newlines(diags);
            }
            if self.current.kind == TokenKind::Comma {
                self.bump_ignoring_newlines(diags);
            } else if self.current.kind != TokenKind::RBracket {
                self.error(diags, "elements should be separated by commas");
                return Err(());
            }
        }
        self.bump(diags); // eat ]

        if is_object {
            Ok(Node::Object(entries, at))
        } else {
            Ok(Node::Array(elements, at))
        }
    }

    fn parse_if(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        self.bump_ignoring_newlines(diags); // eat if
        self.expect(TokenKind::LParen, "'('", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let condition = self.parse_expression(diags)?;
        self.expect(TokenKind::RParen, "')'", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let then_branch = self.parse_expression(diags)?;

        let mut else_branch = None;
        let mut should_rewind = true;

        if self.current.kind == TokenKind::NewLine {
            self.bump_ignoring_newlines(diags);
        }

        if self.current.kind == TokenKind::Elif {
            else_branch = Some(Box::new(self.parse_if(diags)?));
            should_rewind = false;
        } else if self.current.kind == TokenKind::Else {
            self.bump_ignoring_newlines(diags); // eat else
            if self.current.kind.is_expr_terminator() {
                self.error(diags, "expression expected");
                return Err(());
            }
            else_branch = Some(Box::new(self.parse_expression(diags)?));
            should_rewind = false;
        }

        if should_rewind {
            self.lexer.rewind_to_last_newline();
            self.current = Token::new(TokenKind::NewLine, self.current.at);
        }

        Ok(Node::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
            at,
        })
    }

    fn parse_while(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        self.bump_ignoring_newlines(diags); // eat while
        self.expect(TokenKind::LParen, "'('", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let condition = self.parse_expression(diags)?;
        self.expect(TokenKind::RParen, "')'", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let body = self.parse_expression(diags)?;
        Ok(Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
            at,
        })
    }

    fn parse_for(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        self.bump_ignoring_newlines(diags); // eat for
        self.expect(TokenKind::LParen, "'('", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let variable = self.parse_expression(diags)?;
        self.expect(TokenKind::In, "'in'", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let iterated = self.parse_expression(diags)?;
        self.expect(TokenKind::RParen, "')'", diags)?;
        if self.current.kind.is_expr_terminator() {
            self.error(diags, "expression expected");
            return Err(());
        }
        let body = self.parse_expression(diags)?;
        Ok(Node::For {
            variable: Box::new(variable),
            iterated: Box::new(iterated),
            body: Box::new(body),
            at,
        })
    }

    fn parse_control_expression(&mut self, diags: &mut Diagnostics) -> PResult<Node> {
        let at = self.current.at;
        let kind = self.current.kind;
        self.bump_ignoring_newlines(diags); // eat return/break/continue/yield

        let value = if self.current.kind.is_expr_terminator() {
            None
        } else {
            Some(Box::new(self.parse_expression(diags)?))
        };

        Ok(match kind {
            TokenKind::Return => Node::Return(value, at),
            TokenKind::Break => Node::Break(value, at),
            TokenKind::Continue => Node::Continue(value, at),
            TokenKind::Yield => Node::Yield(value, at),
            _ => unreachable!("caller only dispatches control-keyword kinds"),
        })
    }
}

enum ExprClass {
    Binary,
    Unary,
    Index,
    Call,
    FunctionAssign,
    Member,
    Arrow,
    Primary,
    Unknown,
}

fn is_general_operator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::Caret
            | TokenKind::Percent
            | TokenKind::Tilde
            | TokenKind::Assign
            | TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::SlashAssign
            | TokenKind::StarAssign
            | TokenKind::CaretAssign
            | TokenKind::PercentAssign
            | TokenKind::TildeAssign
            | TokenKind::Dot
            | TokenKind::Arrow
            | TokenKind::Shl
            | TokenKind::Shr
            | TokenKind::Eq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::LtEq
            | TokenKind::GtEq
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Xor
            | TokenKind::Not
            | TokenKind::Hash
    )
}

fn is_unary_operator_token(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Not | TokenKind::Hash | TokenKind::Minus | TokenKind::Plus | TokenKind::Tilde
    )
}

/// Classifies the current token's expression role from the previous
/// token's category, per §4.2.
fn classify(prev: Option<TokenKind>, kind: TokenKind) -> ExprClass {
    match prev {
        None => {
            if is_unary_operator_token(kind) {
                ExprClass::Unary
            } else {
                ExprClass::Primary
            }
        }
        Some(p) if is_general_operator(p) => {
            if is_unary_operator_token(kind) {
                ExprClass::Unary
            } else {
                ExprClass::Primary
            }
        }
        Some(_) => {
            if kind == TokenKind::LBracket {
                ExprClass::Index
            } else if kind == TokenKind::LParen {
                ExprClass::Call
            } else if matches!(kind, TokenKind::Colon | TokenKind::DoubleColon) {
                ExprClass::FunctionAssign
            } else if kind == TokenKind::Dot {
                ExprClass::Member
            } else if kind == TokenKind::Arrow {
                ExprClass::Arrow
            } else if is_general_operator(kind) && kind != TokenKind::Not && kind != TokenKind::Hash {
                ExprClass::Binary
            } else {
                ExprClass::Unknown
            }
        }
    }
}

fn unary_op_for(kind: TokenKind) -> Option<UnaryOp> {
    Some(match kind {
        TokenKind::Not => UnaryOp::Not,
        TokenKind::Hash => UnaryOp::SizeOf,
        TokenKind::Minus => UnaryOp::Minus,
        TokenKind::Plus => UnaryOp::Plus,
        TokenKind::Tilde => UnaryOp::Concatenate,
        _ => return None,
    })
}

fn binary_op_for(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::Tilde => BinaryOp::Concatenate,
        TokenKind::Assign => BinaryOp::Assign,
        TokenKind::PlusAssign => BinaryOp::AddAssign,
        TokenKind::MinusAssign => BinaryOp::SubAssign,
        TokenKind::StarAssign => BinaryOp::MulAssign,
        TokenKind::SlashAssign => BinaryOp::DivAssign,
        TokenKind::CaretAssign => BinaryOp::PowAssign,
        TokenKind::PercentAssign => BinaryOp::ModAssign,
        TokenKind::TildeAssign => BinaryOp::ConcatAssign,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::And => BinaryOp::And,
        TokenKind::Xor => BinaryOp::Xor,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::GtEq => BinaryOp::GtEq,
        _ => return None,
    })
}

fn right_assoc_for_binary(op: BinaryOp) -> bool {
    OpEntry::Binary(op, Coords::default()).right_associative()
}

/// Pops the top operator and the operand(s) it needs, pushing the folded
/// node back onto the operand stack (§4.2's `FoldOperatorStacks`).
fn fold(operators: &mut Vec<OpEntry>, operands: &mut Vec<Node>) -> PResult<()> {
    let top = operators.pop().ok_or(())?;
    let node = match top {
        OpEntry::Sentinel => return Err(()),
        OpEntry::Unary(op, at) => {
            let operand = operands.pop().ok_or(())?;
            Node::UnaryOp {
                op,
                operand: Box::new(operand),
                at,
            }
        }
        OpEntry::Binary(op, at) => {
            let rhs = operands.pop().ok_or(())?;
            let lhs = operands.pop().ok_or(())?;
            Node::BinaryOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                at,
            }
        }
        OpEntry::Member(at) => {
            let rhs = operands.pop().ok_or(())?;
            let object = operands.pop().ok_or(())?;
            let Node::Variable(Variable {
                kind: VariableKind::Named(name),
                ..
            }) = rhs
            else {
                return Err(());
            };
            Node::Member {
                object: Box::new(object),
                name,
                at,
            }
        }
        OpEntry::Arrow(at) => {
            let rhs = operands.pop().ok_or(())?;
            let lhs = operands.pop().ok_or(())?;
            let Node::FunctionCall { callee, mut arguments, .. } = rhs else {
                return Err(());
            };
            arguments.insert(0, lhs);
            Node::FunctionCall { callee, arguments, at }
        }
        OpEntry::Index(index_expr, at) => {
            let object = operands.pop().ok_or(())?;
            Node::Index {
                object: Box::new(object),
                index: Box::new(index_expr),
                at,
            }
        }
        OpEntry::Call(args, at) => {
            let callee = operands.pop().ok_or(())?;
            Node::FunctionCall {
                callee: Box::new(callee),
                arguments: args,
                at,
            }
        }
        OpEntry::FunctionAssign(function, at) => {
            let lhs = operands.pop().ok_or(())?;
            Node::BinaryOp {
                op: BinaryOp::Assign,
                lhs: Box::new(lhs),
                rhs: Box::new(Node::Function(Box::new(function))),
                at,
            }
        }
    };
    operands.push(node);
    Ok(())
}
