#![allow(clippy::too_many_arguments)] // Visitor methods can have many arguments

use crate::ast::*;
use crate::lexer::Loc;

// Helper macro for visiting Option<NodeId>
macro_rules! visit_opt_node_id {
    ($visitor:expr, $ast:expr, $node_id_opt:expr) => {
        if let Some(node_id) = $node_id_opt {
            $visitor.visit_node($ast, node_id)?;
        }
    };
}

// Helper macro for visiting Vec<NodeId>
macro_rules! visit_vec_node_id {
    ($visitor:expr, $ast:expr, $node_ids:expr) => {
        for &node_id in $node_ids {
            $visitor.visit_node($ast, node_id)?;
        }
    };
}

// Must stay below the macros, which the passes use.
pub mod local_slots;
pub mod scope_resolution;

pub type VisitResult<E> = Result<(), E>;

/// Double dispatch over [`NodeKind`]. Every variant has its own `visit_*` method whose default
/// walks the children in grammar order; passes override only the variants they care about.
pub trait Visitor<S>: Sized {
    type Error;

    // Required stack accessors
    fn get_stack(&self) -> &Vec<S>;
    fn get_stack_mut(&mut self) -> &mut Vec<S>;

    /// A child id that does not resolve to a node. There is no sensible default: the grammar
    /// guarantees the child is there.
    fn missing_node(&mut self, ast: &Ast, node_id: NodeId) -> VisitResult<Self::Error>;
    /// Placeholder left behind by a failed parse.
    fn visit_error_node(&mut self, ast: &Ast, node_loc: Loc) -> VisitResult<Self::Error>;

    // Provided stack utilities
    fn push_stack(&mut self, data: S) {
        self.get_stack_mut().push(data);
    }
    fn pop_stack(&mut self) -> Option<S> {
        self.get_stack_mut().pop()
    }
    fn peek_stack(&self) -> Option<&S> {
        self.get_stack().last()
    }

    fn traverse(&mut self, ast: &Ast, root: NodeId) -> VisitResult<Self::Error> {
        self.visit_node(ast, root)
    }

    // Main entry point for visiting a node
    fn visit_node(&mut self, ast: &Ast, node_id: NodeId) -> VisitResult<Self::Error> {
        walk_node(self, ast, node_id)
    }

    // Definitions
    fn visit_comp_unit(
        &mut self,
        ast: &Ast,
        classes: &[NodeId],
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_comp_unit(self, ast, classes)
    }
    fn visit_class_def(
        &mut self,
        ast: &Ast,
        _name: &str,
        members: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_class_def(self, ast, members)
    }
    fn visit_definitions_list(
        &mut self,
        ast: &Ast,
        definitions: &[NodeId],
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_list(self, ast, definitions)
    }
    fn visit_field_def(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        _name: &str,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_typed_name(self, ast, ty)
    }
    fn visit_function_def(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        _name: &str,
        params: NodeId,
        body: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_function_def(self, ast, ty, params, body)
    }
    fn visit_param_list(
        &mut self,
        ast: &Ast,
        params: &[NodeId],
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_list(self, ast, params)
    }
    fn visit_param_decl(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        _name: &str,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_typed_name(self, ast, ty)
    }
    fn visit_type_spec(
        &mut self,
        ast: &Ast,
        kind: &TypeSpecKind,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_type_spec(self, ast, kind)
    }

    // Statements
    fn visit_statement_list(
        &mut self,
        ast: &Ast,
        stmts: &[NodeId],
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_list(self, ast, stmts)
    }
    fn visit_compound(
        &mut self,
        ast: &Ast,
        stmts: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        self.visit_node(ast, stmts)
    }
    fn visit_declaration(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        _name: &str,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_typed_name(self, ast, ty)
    }
    fn visit_assignment(
        &mut self,
        ast: &Ast,
        target: NodeId,
        value: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_pair(self, ast, target, value)
    }
    fn visit_if(
        &mut self,
        ast: &Ast,
        cond: NodeId,
        then_branch: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_pair(self, ast, cond, then_branch)
    }
    fn visit_if_else(
        &mut self,
        ast: &Ast,
        cond: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_if_else(self, ast, cond, then_branch, else_branch)
    }
    fn visit_while(
        &mut self,
        ast: &Ast,
        cond: NodeId,
        body: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_pair(self, ast, cond, body)
    }
    fn visit_return(
        &mut self,
        ast: &Ast,
        value: Option<NodeId>,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        visit_opt_node_id!(self, ast, value);
        Ok(())
    }
    fn visit_break(&mut self, _ast: &Ast, _node_loc: Loc) -> VisitResult<Self::Error> {
        // Terminal node
        Ok(())
    }
    fn visit_continue(&mut self, _ast: &Ast, _node_loc: Loc) -> VisitResult<Self::Error> {
        // Terminal node
        Ok(())
    }
    fn visit_write(&mut self, ast: &Ast, expr: NodeId, _node_loc: Loc) -> VisitResult<Self::Error> {
        self.visit_node(ast, expr)
    }
    fn visit_expr_stmt(
        &mut self,
        ast: &Ast,
        expr: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        self.visit_node(ast, expr)
    }

    // Expressions
    fn visit_expression_list(
        &mut self,
        ast: &Ast,
        exprs: &[NodeId],
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_list(self, ast, exprs)
    }
    fn visit_int_lit(&mut self, _ast: &Ast, _value: i64, _node_loc: Loc) -> VisitResult<Self::Error> {
        Ok(())
    }
    fn visit_float_lit(
        &mut self,
        _ast: &Ast,
        _value: f64,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        Ok(())
    }
    fn visit_string_lit(
        &mut self,
        _ast: &Ast,
        _value: &str,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        Ok(())
    }
    fn visit_null(&mut self, _ast: &Ast, _node_loc: Loc) -> VisitResult<Self::Error> {
        Ok(())
    }
    fn visit_this(&mut self, _ast: &Ast, _node_loc: Loc) -> VisitResult<Self::Error> {
        Ok(())
    }
    fn visit_identifier(
        &mut self,
        ast: &Ast,
        _name: &str,
        args: Option<NodeId>,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        visit_opt_node_id!(self, ast, args);
        Ok(())
    }
    fn visit_new(
        &mut self,
        ast: &Ast,
        _class: &str,
        args: Option<NodeId>,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        visit_opt_node_id!(self, ast, args);
        Ok(())
    }
    fn visit_accessor(
        &mut self,
        ast: &Ast,
        object: NodeId,
        _member: &str,
        args: Option<NodeId>,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_accessor(self, ast, object, args)
    }
    fn visit_binary(
        &mut self,
        ast: &Ast,
        _op: BinaryOp,
        left: NodeId,
        right: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        walk_pair(self, ast, left, right)
    }
    fn visit_unary(
        &mut self,
        ast: &Ast,
        _op: UnaryOp,
        operand: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        self.visit_node(ast, operand)
    }
    fn visit_paren(&mut self, ast: &Ast, expr: NodeId, _node_loc: Loc) -> VisitResult<Self::Error> {
        self.visit_node(ast, expr)
    }
}

// Default traversal functions (walk_...)

pub fn walk_node<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    node_id: NodeId,
) -> VisitResult<V::Error> {
    let Some(node) = ast.get_node(node_id) else {
        return visitor.missing_node(ast, node_id);
    };
    let loc = node.loc.clone();
    match &node.kind {
        NodeKind::CompUnit { classes } => visitor.visit_comp_unit(ast, classes, loc),
        NodeKind::ClassDef { name, members } => visitor.visit_class_def(ast, name, *members, loc),
        NodeKind::DefinitionsList(definitions) => {
            visitor.visit_definitions_list(ast, definitions, loc)
        }
        NodeKind::FieldDef { ty, name } => visitor.visit_field_def(ast, *ty, name, loc),
        NodeKind::FunctionDef {
            ty,
            name,
            params,
            body,
        } => visitor.visit_function_def(ast, *ty, name, *params, *body, loc),
        NodeKind::ParamList(params) => visitor.visit_param_list(ast, params, loc),
        NodeKind::ParamDecl { ty, name } => visitor.visit_param_decl(ast, *ty, name, loc),
        NodeKind::TypeSpec(kind) => visitor.visit_type_spec(ast, kind, loc),
        NodeKind::StatementList(stmts) => visitor.visit_statement_list(ast, stmts, loc),
        NodeKind::Compound { stmts } => visitor.visit_compound(ast, *stmts, loc),
        NodeKind::Declaration { ty, name } => visitor.visit_declaration(ast, *ty, name, loc),
        NodeKind::Assignment { target, value } => {
            visitor.visit_assignment(ast, *target, *value, loc)
        }
        NodeKind::If { cond, then_branch } => visitor.visit_if(ast, *cond, *then_branch, loc),
        NodeKind::IfElse {
            cond,
            then_branch,
            else_branch,
        } => visitor.visit_if_else(ast, *cond, *then_branch, *else_branch, loc),
        NodeKind::While { cond, body } => visitor.visit_while(ast, *cond, *body, loc),
        NodeKind::Return { value } => visitor.visit_return(ast, *value, loc),
        NodeKind::Break => visitor.visit_break(ast, loc),
        NodeKind::Continue => visitor.visit_continue(ast, loc),
        NodeKind::Write { expr } => visitor.visit_write(ast, *expr, loc),
        NodeKind::ExprStmt(expr) => visitor.visit_expr_stmt(ast, *expr, loc),
        NodeKind::ExpressionList(exprs) => visitor.visit_expression_list(ast, exprs, loc),
        NodeKind::IntLit(value) => visitor.visit_int_lit(ast, *value, loc),
        NodeKind::FloatLit(value) => visitor.visit_float_lit(ast, *value, loc),
        NodeKind::StringLit(value) => visitor.visit_string_lit(ast, value, loc),
        NodeKind::Null => visitor.visit_null(ast, loc),
        NodeKind::This => visitor.visit_this(ast, loc),
        NodeKind::Identifier { name, args } => visitor.visit_identifier(ast, name, *args, loc),
        NodeKind::New { class, args } => visitor.visit_new(ast, class, *args, loc),
        NodeKind::Accessor {
            object,
            member,
            args,
        } => visitor.visit_accessor(ast, *object, member, *args, loc),
        NodeKind::Binary { op, left, right } => visitor.visit_binary(ast, *op, *left, *right, loc),
        NodeKind::Unary { op, operand } => visitor.visit_unary(ast, *op, *operand, loc),
        NodeKind::Paren(expr) => visitor.visit_paren(ast, *expr, loc),
        NodeKind::Error => visitor.visit_error_node(ast, loc),
    }
}

pub fn walk_comp_unit<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    classes: &[NodeId],
) -> VisitResult<V::Error> {
    visit_vec_node_id!(visitor, ast, classes);
    Ok(())
}

pub fn walk_class_def<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    members: NodeId,
) -> VisitResult<V::Error> {
    visitor.visit_node(ast, members)
}

/// Any of the list variants: children in insertion order.
pub fn walk_list<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    items: &[NodeId],
) -> VisitResult<V::Error> {
    visit_vec_node_id!(visitor, ast, items);
    Ok(())
}

/// Fields, parameters and declarations: only the type is a node, the name is plain data.
pub fn walk_typed_name<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    ty: NodeId,
) -> VisitResult<V::Error> {
    visitor.visit_node(ast, ty)
}

pub fn walk_function_def<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    ty: NodeId,
    params: NodeId,
    body: NodeId,
) -> VisitResult<V::Error> {
    visitor.visit_node(ast, ty)?;
    visitor.visit_node(ast, params)?;
    visitor.visit_node(ast, body)
}

pub fn walk_type_spec<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    kind: &TypeSpecKind,
) -> VisitResult<V::Error> {
    match kind {
        TypeSpecKind::Class(name) => visitor.visit_node(ast, *name),
        _ => Ok(()), // Terminal
    }
}

/// Two children, left before right.
pub fn walk_pair<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    first: NodeId,
    second: NodeId,
) -> VisitResult<V::Error> {
    visitor.visit_node(ast, first)?;
    visitor.visit_node(ast, second)
}

pub fn walk_if_else<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    cond: NodeId,
    then_branch: NodeId,
    else_branch: NodeId,
) -> VisitResult<V::Error> {
    visitor.visit_node(ast, cond)?;
    visitor.visit_node(ast, then_branch)?;
    visitor.visit_node(ast, else_branch)
}

pub fn walk_accessor<V: Visitor<S>, S>(
    visitor: &mut V,
    ast: &Ast,
    object: NodeId,
    args: Option<NodeId>,
) -> VisitResult<V::Error> {
    visitor.visit_node(ast, object)?;
    visit_opt_node_id!(visitor, ast, args);
    Ok(())
}
