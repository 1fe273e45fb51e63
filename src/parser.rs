use std::{cell::RefCell, rc::Rc};

use chumsky::{
    Parser, extra,
    input::{Input, Stream, ValueInput},
    prelude::*,
};

use crate::{
    ast::{Ast, BinaryOp, NodeId, NodeKind, TypeSpecKind, UnaryOp},
    error::RichParseError,
    lexer::{Loc, SourceId, Token, lex},
};

impl chumsky::span::Span for Loc {
    type Context = SourceId;
    type Offset = usize;

    fn new(context: Self::Context, range: std::ops::Range<Self::Offset>) -> Self {
        Loc::new(context, range)
    }

    fn context(&self) -> Self::Context {
        self.source
    }
    fn start(&self) -> Self::Offset {
        self.span.start
    }
    fn end(&self) -> Self::Offset {
        self.span.end
    }
}

// Context used for building the flat AST during parsing.
#[derive(Clone)]
pub struct AstContext {
    pub ast: Rc<RefCell<Ast>>,
    source_id: SourceId,
}

impl AstContext {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            ast: Rc::new(RefCell::new(Ast::new(source_id))),
            source_id,
        }
    }

    pub fn add_node(&self, kind: NodeKind, loc: Loc) -> NodeId {
        self.ast.borrow_mut().add_node(kind, loc)
    }

    fn add_type(&self, (ann, loc): (TypeAnn, Loc)) -> NodeId {
        let kind = match ann {
            TypeAnn::Int => TypeSpecKind::Int,
            TypeAnn::Float => TypeSpecKind::Float,
            TypeAnn::Str => TypeSpecKind::Str,
            TypeAnn::Void => TypeSpecKind::Void,
            TypeAnn::Class(name) => TypeSpecKind::Class(
                self.add_node(NodeKind::Identifier { name, args: None }, loc.clone()),
            ),
        };
        self.add_node(NodeKind::TypeSpec(kind), loc)
    }

    /// Takes the finished tree out of the context, leaving an empty one behind.
    pub fn take_ast(&self) -> Ast {
        self.ast.replace(Ast::new(self.source_id))
    }
}

// Type annotations are parsed without touching the arena, so a declaration that turns out to be
// an expression statement leaves no orphan nodes behind.
#[derive(Debug, Clone)]
enum TypeAnn {
    Int,
    Float,
    Str,
    Void,
    Class(String),
}

type ParserContext<'a> = &'a AstContext;
type ParserExtra<'a> = extra::Err<RichParseError<'a>>;

macro_rules! parser_functions {
    ($(
        $vis:vis fn $name:ident($cx:ident $(,$arg:ident: $typ:ty)*) -> $out:ty => $code:tt
    )+) => {
        $(
            $vis fn $name<'src, I>($cx: ParserContext<'src> $(, $arg: $typ)*)
                -> impl Parser<'src, I, $out, ParserExtra<'src>> + Clone
                    where I: ValueInput<'src, Token = Token, Span = Loc>, $code
        )*
    };
}

// ---< HELPER PARSERS >---
parser_functions! {
    fn ident_parser(_cx) -> String => {
        select! { Token::Identifier(ident) => ident }.labelled("identifier")
    }

    fn type_parser(cx) -> (TypeAnn, Loc) => {
        choice((
            just(Token::IntKW).to(TypeAnn::Int),
            just(Token::FloatKW).to(TypeAnn::Float),
            just(Token::StringKW).to(TypeAnn::Str),
            just(Token::VoidKW).to(TypeAnn::Void),
            ident_parser(cx).map(TypeAnn::Class),
        ))
        .map_with(|ann, e| (ann, e.span()))
        .labelled("type")
        .boxed()
    }
}

// ---< MAIN PARSERS >---
parser_functions! {
    pub fn comp_unit_parser(cx) -> NodeId => {
        class_parser(cx)
            .repeated()
            .collect::<Vec<_>>()
            .then_ignore(end())
            .map_with(move |classes, e| cx.add_node(NodeKind::CompUnit { classes }, e.span()))
    }

    pub fn class_parser(cx) -> NodeId => {
        let param = type_parser(cx)
            .then(ident_parser(cx))
            .map_with(move |(ty, name), e| {
                let ty = cx.add_type(ty);
                cx.add_node(NodeKind::ParamDecl { ty, name }, e.span())
            })
            .labelled("parameter");

        let params = param
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LeftParen), just(Token::RightParen))
            .map_with(move |params, e| cx.add_node(NodeKind::ParamList(params), e.span()))
            .labelled("parameter list");

        let member = type_parser(cx)
            .then(ident_parser(cx))
            .then(choice((
                just(Token::Semicolon).to(None::<(NodeId, NodeId)>),
                params.then(compound_parser(cx)).map(Some),
            )))
            .map_with(move |((ty, name), rest), e| {
                let ty = cx.add_type(ty);
                let kind = match rest {
                    None => NodeKind::FieldDef { ty, name },
                    Some((params, body)) => NodeKind::FunctionDef { ty, name, params, body },
                };
                cx.add_node(kind, e.span())
            })
            .labelled("field or function definition");

        let members = member
            .repeated()
            .collect::<Vec<_>>()
            .map_with(move |members, e| cx.add_node(NodeKind::DefinitionsList(members), e.span()))
            .delimited_by(just(Token::LeftCurly), just(Token::RightCurly));

        just(Token::ClassKW)
            .ignore_then(ident_parser(cx))
            .then(members)
            .map_with(move |(name, members), e| {
                cx.add_node(NodeKind::ClassDef { name, members }, e.span())
            })
            .labelled("class definition")
            .boxed()
    }

    pub fn compound_parser(cx) -> NodeId => {
        just(Token::LeftCurly)
            .ignore_then(statement_parser(cx).repeated().collect::<Vec<_>>())
            .then_ignore(just(Token::RightCurly))
            .map_with(move |stmts, e| {
                let stmts = cx.add_node(NodeKind::StatementList(stmts), e.span());
                cx.add_node(NodeKind::Compound { stmts }, e.span())
            })
            .labelled("block")
            .boxed()
    }

    pub fn statement_parser(cx) -> NodeId => {
        let mut statement_parser_rec = Recursive::declare();
        let expr = expr_parser(cx);
        let semi = just(Token::Semicolon);
        let condition = expr
            .clone()
            .delimited_by(just(Token::LeftParen), just(Token::RightParen));

        let block = statement_parser_rec
            .clone()
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LeftCurly), just(Token::RightCurly))
            .map_with(move |stmts, e| NodeKind::Compound {
                stmts: cx.add_node(NodeKind::StatementList(stmts), e.span()),
            })
            .labelled("block");

        let declaration = type_parser(cx)
            .then(ident_parser(cx))
            .then_ignore(semi.clone())
            .map(move |(ty, name)| NodeKind::Declaration { ty: cx.add_type(ty), name })
            .labelled("declaration");

        let if_stmt = just(Token::IfKW)
            .ignore_then(condition.clone())
            .then(statement_parser_rec.clone())
            .then(just(Token::ElseKW).ignore_then(statement_parser_rec.clone()).or_not())
            .map(|((cond, then_branch), else_branch)| match else_branch {
                Some(else_branch) => NodeKind::IfElse { cond, then_branch, else_branch },
                None => NodeKind::If { cond, then_branch },
            })
            .labelled("if statement");

        let while_stmt = just(Token::WhileKW)
            .ignore_then(condition.clone())
            .then(statement_parser_rec.clone())
            .map(|(cond, body)| NodeKind::While { cond, body })
            .labelled("while statement");

        let return_stmt = just(Token::ReturnKW)
            .ignore_then(expr.clone().or_not())
            .then_ignore(semi.clone())
            .map(|value| NodeKind::Return { value })
            .labelled("return statement");

        let break_stmt = just(Token::BreakKW).then(semi.clone()).to(NodeKind::Break);
        let continue_stmt = just(Token::ContinueKW).then(semi.clone()).to(NodeKind::Continue);

        let print_stmt = just(Token::PrintKW)
            .ignore_then(condition)
            .then_ignore(semi.clone())
            .map(|expr| NodeKind::Write { expr })
            .labelled("print statement");

        // Parsed in one go so the left-hand side is never built twice.
        let expr_or_assignment = expr
            .clone()
            .then(just(Token::Assign).ignore_then(expr).or_not())
            .then_ignore(semi)
            .map(|(target, value)| match value {
                Some(value) => NodeKind::Assignment { target, value },
                None => NodeKind::ExprStmt(target),
            });

        statement_parser_rec.define(
            choice((
                block,
                declaration,
                if_stmt,
                while_stmt,
                return_stmt,
                break_stmt,
                continue_stmt,
                print_stmt,
                expr_or_assignment,
            ))
            .map_with(move |kind, e| cx.add_node(kind, e.span()))
            .labelled("statement"),
        );
        statement_parser_rec
    }

    pub fn expr_parser(cx) -> NodeId => {
        use chumsky::pratt::{infix, left, postfix, prefix};

        let mut expr_parser_rec = Recursive::declare();

        let args = expr_parser_rec
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LeftParen), just(Token::RightParen))
            .map_with(move |exprs, e| cx.add_node(NodeKind::ExpressionList(exprs), e.span()))
            .labelled("argument list")
            .boxed();

        let literal = select! {
            Token::IntLiteral(value) => NodeKind::IntLit(value),
            Token::FloatLiteral(value) => NodeKind::FloatLit(value),
            Token::NullKW => NodeKind::Null,
            Token::ThisKW => NodeKind::This,
        };

        let string_literal = select! { Token::StringLiteral(raw) => raw }
            .try_map(|raw: String, span: Loc| {
                unescape::unescape(&raw[1..raw.len() - 1])
                    .map(NodeKind::StringLit)
                    .ok_or_else(|| Rich::custom(span, "invalid escape sequence in string"))
            });

        let new_object = just(Token::NewKW)
            .ignore_then(ident_parser(cx))
            .then(args.clone())
            .map(|(class, args)| NodeKind::New { class, args: Some(args) });

        let name_or_call = ident_parser(cx)
            .then(args.clone().or_not())
            .map(|(name, args)| NodeKind::Identifier { name, args });

        let parenthesized = expr_parser_rec
            .clone()
            .delimited_by(just(Token::LeftParen), just(Token::RightParen))
            .map(NodeKind::Paren);

        let atom = choice((
            literal,
            string_literal,
            new_object,
            name_or_call,
            parenthesized,
        ))
        .map_with(move |kind, e| (cx.add_node(kind, e.span()), e.span()));

        // Fold with left-associativity
        fn la_fold(cx: ParserContext, op: BinaryOp, l: (NodeId, Loc), r: (NodeId, Loc)) -> (NodeId, Loc) {
            let new_span = Loc::new(cx.source_id, l.1.span.start..r.1.span.end);
            (cx.add_node(
                NodeKind::Binary { op, left: l.0, right: r.0 },
                new_span.clone()
            ), new_span)
        }

        // Fold with unary prefix.
        fn unary_fold(cx: ParserContext, op: UnaryOp, op_loc: Loc, operand: (NodeId, Loc)) -> (NodeId, Loc) {
            let new_span = Loc::new(cx.source_id, op_loc.span.start..operand.1.span.end);
            (cx.add_node(
                NodeKind::Unary { op, operand: operand.0 },
                new_span.clone()
            ), new_span)
        }

        // Fold `.member` / `.member(args)` onto the object expression.
        fn member_fold(cx: ParserContext, object: (NodeId, Loc), member: ((String, Option<NodeId>), Loc)) -> (NodeId, Loc) {
            let ((member, args), member_loc) = member;
            let new_span = Loc::new(cx.source_id, object.1.span.start..member_loc.span.end);
            (cx.add_node(
                NodeKind::Accessor { object: object.0, member, args },
                new_span.clone()
            ), new_span)
        }

        let member_access = just(Token::Dot)
            .ignore_then(ident_parser(cx))
            .then(args.or_not())
            .map_with(|member, e| (member, e.span()));
        let minus = just(Token::Minus).map_with(|_, e| e.span());
        let bang = just(Token::Bang).map_with(|_, e| e.span());

        let pratt_expr = atom.boxed().pratt((
            postfix(10, member_access, move |lhs, member, _| member_fold(cx, lhs, member)),

            prefix(7, bang, move |op_loc, rhs, _| unary_fold(cx, UnaryOp::Not, op_loc, rhs)),
            prefix(7, minus, move |op_loc, rhs, _| unary_fold(cx, UnaryOp::Neg, op_loc, rhs)),

            infix(left(6), just(Token::Star), move |l, _, r, _| la_fold(cx, BinaryOp::Mul, l, r)),
            infix(left(6), just(Token::Slash), move |l, _, r, _| la_fold(cx, BinaryOp::Div, l, r)),
            infix(left(6), just(Token::Percent), move |l, _, r, _| la_fold(cx, BinaryOp::Mod, l, r)),

            infix(left(5), just(Token::Plus), move |l, _, r, _| la_fold(cx, BinaryOp::Add, l, r)),
            infix(left(5), just(Token::Minus), move |l, _, r, _| la_fold(cx, BinaryOp::Sub, l, r)),

            infix(left(4), just(Token::LessEqual), move |l, _, r, _| la_fold(cx, BinaryOp::LessEq, l, r)),
            infix(left(4), just(Token::GreaterEqual), move |l, _, r, _| la_fold(cx, BinaryOp::GreaterEq, l, r)),
            infix(left(4), just(Token::Less), move |l, _, r, _| la_fold(cx, BinaryOp::Less, l, r)),
            infix(left(4), just(Token::Greater), move |l, _, r, _| la_fold(cx, BinaryOp::Greater, l, r)),

            infix(left(3), just(Token::EqualEqual), move |l, _, r, _| la_fold(cx, BinaryOp::EqEq, l, r)),
            infix(left(3), just(Token::NotEqual), move |l, _, r, _| la_fold(cx, BinaryOp::NotEq, l, r)),

            infix(left(2), just(Token::Conjunction), move |l, _, r, _| la_fold(cx, BinaryOp::And, l, r)),
            infix(left(1), just(Token::Disjunction), move |l, _, r, _| la_fold(cx, BinaryOp::Or, l, r)),
        ));

        expr_parser_rec.define(pratt_expr.map(|(id, _)| id).labelled("expression").boxed());
        expr_parser_rec
    }
}

/// Lexes and parses a whole source file.
pub fn parse_source(
    source_id: SourceId,
    source: &str,
) -> Result<(Ast, NodeId), Vec<RichParseError<'static>>> {
    let cx = AstContext::new(source_id);
    let eoi = Loc::new(source_id, source.len()..source.len());
    let token_stream =
        Stream::from_iter(lex(source_id, source).into_iter()).map(eoi, |(t, s): (_, _)| (t, s));

    let result = comp_unit_parser(&cx).parse(token_stream).into_result();
    match result {
        Ok(root) => Ok((cx.take_ast(), root)),
        Err(errs) => Err(errs.into_iter().map(|err| err.into_owned()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Ast, NodeId) {
        match parse_source(0, source) {
            Ok(parsed) => parsed,
            Err(errs) => panic!("parse failed: {errs:?}"),
        }
    }

    fn kind(ast: &Ast, id: NodeId) -> &NodeKind {
        &ast.get_node(id).unwrap().kind
    }

    fn first_function(ast: &Ast, root: NodeId) -> NodeId {
        ast.descendants(root)
            .into_iter()
            .find(|id| matches!(kind(ast, *id), NodeKind::FunctionDef { .. }))
            .expect("no function in source")
    }

    #[test]
    fn parses_class_with_field_and_function() {
        let (ast, root) = parse(
            "class Point {
                int x;
                float scale(float by, Point other) { return by; }
            }",
        );
        let NodeKind::CompUnit { classes } = kind(&ast, root) else {
            panic!("root is not a compilation unit");
        };
        assert_eq!(classes.len(), 1);

        let func = first_function(&ast, root);
        let NodeKind::FunctionDef { name, params, .. } = kind(&ast, func) else {
            unreachable!()
        };
        assert_eq!(name, "scale");
        assert_eq!(
            ast.parameter_types(*params),
            Some(vec![
                crate::types::Type::Float,
                crate::types::Type::Class("Point".into())
            ])
        );
    }

    #[test]
    fn declarations_and_assignments_are_told_apart() {
        let (ast, root) = parse(
            "class A { void f() { Point p; p = new Point(); p.x = 1; p; } }",
        );
        let kinds: Vec<&str> = ast
            .descendants(root)
            .into_iter()
            .map(|id| kind(&ast, id).name())
            .filter(|name| matches!(*name, "declaration" | "assignment" | "expr_stmt"))
            .collect();
        assert_eq!(kinds, vec!["declaration", "assignment", "assignment", "expr_stmt"]);
        // Backtracking out of the declaration alternative leaves nothing behind.
        assert_eq!(ast.len(), ast.descendants(root).len());
    }

    #[test]
    fn precedence_and_member_calls() {
        let (ast, root) = parse("class A { void f() { print(1 + 2 * -x.get(3)); } }");
        let binary = ast
            .descendants(root)
            .into_iter()
            .find(|id| matches!(kind(&ast, *id), NodeKind::Binary { .. }))
            .unwrap();
        let NodeKind::Binary { op, right, .. } = kind(&ast, binary) else {
            unreachable!()
        };
        assert_eq!(*op, BinaryOp::Add);
        let NodeKind::Binary { op, right, .. } = kind(&ast, *right) else {
            panic!("multiplication should bind tighter")
        };
        assert_eq!(*op, BinaryOp::Mul);
        let NodeKind::Unary { operand, .. } = kind(&ast, *right) else {
            panic!("expected negation")
        };
        assert!(matches!(
            kind(&ast, *operand),
            NodeKind::Accessor { member, args: Some(_), .. } if member == "get"
        ));
    }

    #[test]
    fn dangling_else_binds_to_nearest_if() {
        let (ast, root) = parse(
            "class A { void f() { if (a) if (b) return; else break; } }",
        );
        let names: Vec<&str> = ast
            .descendants(root)
            .into_iter()
            .map(|id| kind(&ast, id).name())
            .filter(|name| name.starts_with("if"))
            .collect();
        assert_eq!(names, vec!["if", "if_else"]);
    }

    #[test]
    fn string_escapes_are_resolved() {
        let (ast, root) = parse(r#"class A { void f() { print("a\tb"); } }"#);
        assert!(ast.descendants(root).into_iter().any(|id| matches!(
            kind(&ast, id),
            NodeKind::StringLit(value) if value == "a\tb"
        )));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let errs = parse_source(0, "class A { int }").unwrap_err();
        assert!(!errs.is_empty());
    }

    #[test]
    fn comments_between_members() {
        let (ast, root) = parse("class A { /* note */ void f() { /* inner */ } // tail\n }");
        assert_eq!(kind(&ast, first_function(&ast, root)).name(), "function");
    }
}
