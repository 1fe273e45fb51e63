use crate::lexer::{Loc, SourceId};
use crate::types::Type;
use slotmap::SlotMap;
use std::fmt;

slotmap::new_key_type! {
    /// Handle to a node inside an [`Ast`] arena.
    pub struct NodeId;
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:?}", self.0)
    }
}

/// Arena holding every node of one compilation unit. Children are referenced by [`NodeId`], so
/// the tree can be annotated from side tables without touching the nodes themselves.
#[derive(Debug)]
pub struct Ast {
    pub nodes: SlotMap<NodeId, Node>,
    pub source_id: SourceId,
}

impl Ast {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            source_id,
        }
    }

    pub fn add_node(&mut self, kind: NodeKind, loc: Loc) -> NodeId {
        self.nodes.insert_with_key(|id| Node { id, kind, loc })
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Detaches a node from the arena. Parents keep their (now dangling) reference.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Structural children of `id`, in the order every traversal visits them.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.get_node(id) else {
            return Vec::new();
        };
        match &node.kind {
            NodeKind::CompUnit { classes } => classes.clone(),
            NodeKind::ClassDef { members, .. } => vec![*members],
            NodeKind::DefinitionsList(items)
            | NodeKind::ParamList(items)
            | NodeKind::StatementList(items)
            | NodeKind::ExpressionList(items) => items.clone(),
            NodeKind::FieldDef { ty, .. }
            | NodeKind::ParamDecl { ty, .. }
            | NodeKind::Declaration { ty, .. } => vec![*ty],
            NodeKind::FunctionDef {
                ty, params, body, ..
            } => vec![*ty, *params, *body],
            NodeKind::TypeSpec(TypeSpecKind::Class(name)) => vec![*name],
            NodeKind::TypeSpec(_) => Vec::new(),
            NodeKind::Compound { stmts } => vec![*stmts],
            NodeKind::Assignment { target, value } => vec![*target, *value],
            NodeKind::If { cond, then_branch } => vec![*cond, *then_branch],
            NodeKind::IfElse {
                cond,
                then_branch,
                else_branch,
            } => vec![*cond, *then_branch, *else_branch],
            NodeKind::While { cond, body } => vec![*cond, *body],
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Write { expr } | NodeKind::ExprStmt(expr) | NodeKind::Paren(expr) => {
                vec![*expr]
            }
            NodeKind::Identifier { args, .. } | NodeKind::New { args, .. } => {
                args.iter().copied().collect()
            }
            NodeKind::Accessor { object, args, .. } => {
                std::iter::once(*object).chain(args.iter().copied()).collect()
            }
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::IntLit(_)
            | NodeKind::FloatLit(_)
            | NodeKind::StringLit(_)
            | NodeKind::Null
            | NodeKind::This
            | NodeKind::Error => Vec::new(),
        }
    }

    /// Every node reachable from `root`, pre-order. Dangling child ids are skipped.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if self.get_node(id).is_none() {
                continue;
            }
            out.push(id);
            pending.extend(self.children(id).into_iter().rev());
        }
        out
    }

    /// Declared types of the parameters of a `ParamList`, in declaration order.
    ///
    /// Returns `None` when `list` is not a parameter list or one of its entries is malformed.
    pub fn parameter_types(&self, list: NodeId) -> Option<Vec<Type>> {
        let NodeKind::ParamList(params) = &self.get_node(list)?.kind else {
            return None;
        };
        params
            .iter()
            .map(|param| match &self.get_node(*param)?.kind {
                NodeKind::ParamDecl { ty, .. } => self.type_of(*ty),
                _ => None,
            })
            .collect()
    }

    /// Resolves a `TypeSpec` node into its [`Type`].
    pub fn type_of(&self, type_spec: NodeId) -> Option<Type> {
        let NodeKind::TypeSpec(kind) = &self.get_node(type_spec)?.kind else {
            return None;
        };
        Some(match kind {
            TypeSpecKind::Int => Type::Int,
            TypeSpecKind::Float => Type::Float,
            TypeSpecKind::Str => Type::Str,
            TypeSpecKind::Void => Type::Void,
            TypeSpecKind::Class(name) => Type::Class(self.get_ident_name(*name)?.to_owned()),
        })
    }

    pub fn get_ident_name(&self, id: NodeId) -> Option<&str> {
        match &self.get_node(id)?.kind {
            NodeKind::Identifier { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    // Root
    CompUnit {
        classes: Vec<NodeId>, // ClassDef
    },

    // Definitions
    ClassDef {
        name: String,
        members: NodeId, // DefinitionsList
    },
    DefinitionsList(Vec<NodeId> /* FieldDef or FunctionDef */),
    FieldDef {
        ty: NodeId, // TypeSpec
        name: String,
    },
    FunctionDef {
        ty: NodeId, // TypeSpec of the return value
        name: String,
        params: NodeId, // ParamList
        body: NodeId,   // Compound
    },
    ParamList(Vec<NodeId> /* ParamDecl */),
    ParamDecl {
        ty: NodeId,
        name: String,
    },
    TypeSpec(TypeSpecKind),

    // Statements
    StatementList(Vec<NodeId>),
    Compound {
        stmts: NodeId, // StatementList
    },
    Declaration {
        ty: NodeId,
        name: String,
    },
    Assignment {
        target: NodeId,
        value: NodeId,
    },
    If {
        cond: NodeId,
        then_branch: NodeId,
    },
    IfElse {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Break,
    Continue,
    Write {
        expr: NodeId,
    },
    ExprStmt(NodeId),

    // Expressions
    ExpressionList(Vec<NodeId>),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Null,
    This,
    /// Plain name, or a call when `args` is present.
    Identifier {
        name: String,
        args: Option<NodeId>, // ExpressionList
    },
    New {
        class: String,
        args: Option<NodeId>,
    },
    /// `object.member` or `object.member(args)`.
    Accessor {
        object: NodeId,
        member: String,
        args: Option<NodeId>,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Paren(NodeId),

    Error, // Parsing failed here.
}

impl NodeKind {
    /// Short variant name, used in diagnostics and tree dumps.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::CompUnit { .. } => "comp_unit",
            NodeKind::ClassDef { .. } => "class",
            NodeKind::DefinitionsList(_) => "definitions",
            NodeKind::FieldDef { .. } => "field",
            NodeKind::FunctionDef { .. } => "function",
            NodeKind::ParamList(_) => "params",
            NodeKind::ParamDecl { .. } => "param",
            NodeKind::TypeSpec(_) => "type",
            NodeKind::StatementList(_) => "statements",
            NodeKind::Compound { .. } => "compound",
            NodeKind::Declaration { .. } => "declaration",
            NodeKind::Assignment { .. } => "assignment",
            NodeKind::If { .. } => "if",
            NodeKind::IfElse { .. } => "if_else",
            NodeKind::While { .. } => "while",
            NodeKind::Return { .. } => "return",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Write { .. } => "print",
            NodeKind::ExprStmt(_) => "expr_stmt",
            NodeKind::ExpressionList(_) => "expressions",
            NodeKind::IntLit(_) => "int",
            NodeKind::FloatLit(_) => "float",
            NodeKind::StringLit(_) => "string",
            NodeKind::Null => "null",
            NodeKind::This => "this",
            NodeKind::Identifier { .. } => "identifier",
            NodeKind::New { .. } => "new",
            NodeKind::Accessor { .. } => "accessor",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Paren(_) => "paren",
            NodeKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpecKind {
    Int,
    Float,
    Str,
    Void,
    Class(NodeId /* Identifier */),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    // Logical
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::EqEq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg, // -
    Not, // !
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Loc {
        Loc::new(0, 0..0)
    }

    fn type_spec(ast: &mut Ast, kind: TypeSpecKind) -> NodeId {
        ast.add_node(NodeKind::TypeSpec(kind), loc())
    }

    #[test]
    fn parameter_types_follow_declaration_order() {
        let mut ast = Ast::new(0);
        let point = ast.add_node(
            NodeKind::Identifier {
                name: "Point".into(),
                args: None,
            },
            loc(),
        );
        let mut params = Vec::new();
        for (kind, name) in [
            (TypeSpecKind::Float, "x"),
            (TypeSpecKind::Class(point), "p"),
            (TypeSpecKind::Int, "n"),
        ] {
            let ty = type_spec(&mut ast, kind);
            params.push(ast.add_node(
                NodeKind::ParamDecl {
                    ty,
                    name: name.into(),
                },
                loc(),
            ));
        }
        let list = ast.add_node(NodeKind::ParamList(params), loc());

        assert_eq!(
            ast.parameter_types(list),
            Some(vec![Type::Float, Type::Class("Point".into()), Type::Int])
        );
    }

    #[test]
    fn parameter_types_of_empty_list() {
        let mut ast = Ast::new(0);
        let list = ast.add_node(NodeKind::ParamList(Vec::new()), loc());
        assert_eq!(ast.parameter_types(list), Some(Vec::new()));
    }

    #[test]
    fn parameter_types_rejects_other_nodes() {
        let mut ast = Ast::new(0);
        let list = ast.add_node(NodeKind::StatementList(Vec::new()), loc());
        assert_eq!(ast.parameter_types(list), None);
    }

    #[test]
    fn children_and_descendants_follow_grammar_order() {
        let mut ast = Ast::new(0);
        let left = ast.add_node(NodeKind::IntLit(1), loc());
        let right = ast.add_node(NodeKind::IntLit(2), loc());
        let sum = ast.add_node(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            },
            loc(),
        );
        let paren = ast.add_node(NodeKind::Paren(sum), loc());

        assert_eq!(ast.children(sum), vec![left, right]);
        assert_eq!(ast.descendants(paren), vec![paren, sum, left, right]);

        ast.remove_node(right);
        assert_eq!(ast.descendants(paren), vec![paren, sum, left]);
    }

    #[test]
    fn children_follow_rewired_references() {
        let mut ast = Ast::new(0);
        let one = ast.add_node(NodeKind::IntLit(1), loc());
        let two = ast.add_node(NodeKind::IntLit(2), loc());
        let three = ast.add_node(NodeKind::IntLit(3), loc());
        let sum = ast.add_node(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left: one,
                right: two,
            },
            loc(),
        );

        if let Some(NodeKind::Binary { right, .. }) =
            ast.get_node_mut(sum).map(|node| &mut node.kind)
        {
            *right = three;
        }
        assert_eq!(ast.children(sum), vec![one, three]);
        assert_eq!(ast.descendants(sum), vec![sum, one, three]);
    }
}
