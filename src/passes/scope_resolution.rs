use derive_more::Deref;
use tracing::{debug, trace};

use crate::{
    ast::{Ast, NodeId, NodeKind},
    error::{CompilationError, CompilerErrorType},
    lexer::Loc,
    passes::*,
    scope::{PoolId, PoolKind, ScopePools},
    utils::ComponentStorage,
};

/// The scope pool a node belongs to. Declarations reserve their slot in it; identifier reads
/// look their slot up in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deref)]
pub struct LocalPool(pub PoolId);

/// Attaches a [`LocalPool`] to every node of a compilation unit.
///
/// Scoping is flat: a compilation unit and each function definition open a pool, and every node
/// below them (however deeply nested in blocks) shares it. Classes do not open a pool of their
/// own, and since functions cannot nest, the pool stack is never deeper than two.
pub struct ScopeResolutionPass<'a> {
    pool_stack: Vec<PoolId>,
    component_storage: &'a mut ComponentStorage,
    pools: &'a mut ScopePools,
    current_node: Option<NodeId>,
}

impl<'a> ScopeResolutionPass<'a> {
    pub fn new(component_storage: &'a mut ComponentStorage, pools: &'a mut ScopePools) -> Self {
        Self {
            pool_stack: Vec::new(),
            component_storage,
            pools,
            current_node: None,
        }
    }

    /// Resolves an isolated subtree as if `pool` were the enclosing scope.
    pub fn resolve_subtree(
        &mut self,
        ast: &Ast,
        node: NodeId,
        pool: PoolId,
    ) -> Result<(), CompilationError> {
        self.push_stack(pool);
        let result = self.visit_node(ast, node);
        self.pop_stack();
        result
    }

    fn annotate(&mut self, node: NodeId, pool: PoolId) {
        self.component_storage.insert(node, LocalPool(pool));
    }

    /// Opens a fresh pool, makes it the active one and attaches it to the node being visited.
    fn enter_scope(&mut self, kind: PoolKind) -> PoolId {
        let pool = self.pools.create(kind);
        self.push_stack(pool);
        trace!(?pool, ?kind, depth = self.pool_stack.len(), "entered scope pool");
        if let Some(node) = self.current_node {
            self.annotate(node, pool);
        }
        pool
    }

    fn leave_scope(&mut self) {
        if let Some(pool) = self.pop_stack() {
            trace!(?pool, depth = self.pool_stack.len(), "left scope pool");
        }
    }

    fn error_loc(&self, ast: &Ast) -> Loc {
        self.current_node
            .and_then(|node| ast.get_node(node))
            .map(|node| node.loc.clone())
            .unwrap_or_else(|| Loc::new(ast.source_id, 0..0))
    }
}

fn opens_scope(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::CompUnit { .. } | NodeKind::FunctionDef { .. })
}

impl<'a> Visitor<PoolId> for ScopeResolutionPass<'a> {
    type Error = CompilationError;

    fn get_stack(&self) -> &Vec<PoolId> {
        &self.pool_stack
    }
    fn get_stack_mut(&mut self) -> &mut Vec<PoolId> {
        &mut self.pool_stack
    }

    fn traverse(&mut self, ast: &Ast, root: NodeId) -> VisitResult<Self::Error> {
        debug!(%root, "resolving local scopes");
        let pools_before = self.pools.len();
        self.visit_node(ast, root)?;
        debug!(
            pools = self.pools.len() - pools_before,
            "local scopes resolved"
        );
        Ok(())
    }

    fn missing_node(&mut self, ast: &Ast, node_id: NodeId) -> VisitResult<Self::Error> {
        let parent = self
            .current_node
            .and_then(|node| ast.get_node(node))
            .map_or("<root>", |node| node.kind.name());
        Err(CompilationError::new(
            CompilerErrorType::MissingNode { node: node_id },
            self.error_loc(ast),
        )
        .with_note(format!("referenced from this `{parent}`"), None))
    }

    fn visit_error_node(&mut self, _ast: &Ast, node_loc: Loc) -> VisitResult<Self::Error> {
        Err(CompilationError::new(
            CompilerErrorType::UnparsedNode,
            node_loc,
        ))
    }

    fn visit_node(&mut self, ast: &Ast, node_id: NodeId) -> VisitResult<Self::Error> {
        let Some(node) = ast.get_node(node_id) else {
            return self.missing_node(ast, node_id);
        };

        // Scope-opening nodes are annotated once their own pool is active.
        if !opens_scope(&node.kind) {
            let Some(&pool) = self.peek_stack() else {
                return Err(CompilationError::new(
                    CompilerErrorType::NoActiveScope {
                        node_kind: node.kind.name(),
                    },
                    node.loc.clone(),
                ));
            };
            self.annotate(node_id, pool);
        }

        // Track in which node we are, so failures can point at the parent.
        let prev = self.current_node.replace(node_id);
        let r = walk_node(self, ast, node_id);
        self.current_node = prev;
        r
    }

    fn visit_comp_unit(
        &mut self,
        ast: &Ast,
        classes: &[NodeId],
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        self.enter_scope(PoolKind::Global);
        let value = walk_comp_unit(self, ast, classes);
        self.leave_scope();
        value
    }

    fn visit_function_def(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        name: &str,
        params: NodeId,
        body: NodeId,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        let pool = self.enter_scope(PoolKind::Function);
        trace!(function = name, ?pool, "function scope");
        let value = walk_function_def(self, ast, ty, params, body);
        self.leave_scope();
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, TypeSpecKind};

    fn loc() -> Loc {
        Loc::new(0, 0..0)
    }

    fn pool_of(storage: &ComponentStorage, node: NodeId) -> PoolId {
        **storage.fetch::<LocalPool>(node).expect("node has no pool")
    }

    #[test]
    fn subtree_uses_the_given_pool() {
        let mut ast = Ast::new(0);
        let left = ast.add_node(NodeKind::IntLit(1), loc());
        let right = ast.add_node(NodeKind::This, loc());
        let sum = ast.add_node(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            },
            loc(),
        );

        let mut storage = ComponentStorage::new();
        let mut pools = ScopePools::new();
        let pool = pools.create(PoolKind::Function);
        ScopeResolutionPass::new(&mut storage, &mut pools)
            .resolve_subtree(&ast, sum, pool)
            .unwrap();

        for node in [sum, left, right] {
            assert_eq!(pool_of(&storage, node), pool);
        }
        assert_eq!(pools.len(), 1);
    }

    #[test]
    fn function_subtree_opens_its_own_pool() {
        let mut ast = Ast::new(0);
        let ty = ast.add_node(NodeKind::TypeSpec(TypeSpecKind::Void), loc());
        let params = ast.add_node(NodeKind::ParamList(Vec::new()), loc());
        let stmts = ast.add_node(NodeKind::StatementList(Vec::new()), loc());
        let body = ast.add_node(NodeKind::Compound { stmts }, loc());
        let func = ast.add_node(
            NodeKind::FunctionDef {
                ty,
                name: "f".into(),
                params,
                body,
            },
            loc(),
        );

        let mut storage = ComponentStorage::new();
        let mut pools = ScopePools::new();
        let outer = pools.create(PoolKind::Global);
        let mut pass = ScopeResolutionPass::new(&mut storage, &mut pools);
        pass.resolve_subtree(&ast, func, outer).unwrap();
        assert!(pass.get_stack().is_empty());

        let inner = pool_of(&storage, func);
        assert_ne!(inner, outer);
        for node in [ty, params, body, stmts] {
            assert_eq!(pool_of(&storage, node), inner);
        }
        assert_eq!(pools.get(inner).unwrap().kind(), PoolKind::Function);
    }

    #[test]
    fn no_active_scope_is_a_failure() {
        let mut ast = Ast::new(0);
        let node = ast.add_node(NodeKind::Break, Loc::new(0, 3..8));

        let mut storage = ComponentStorage::new();
        let mut pools = ScopePools::new();
        let err = ScopeResolutionPass::new(&mut storage, &mut pools)
            .traverse(&ast, node)
            .unwrap_err();

        assert_eq!(
            err.error_type,
            CompilerErrorType::NoActiveScope { node_kind: "break" }
        );
        assert_eq!(err.loc, Loc::new(0, 3..8));
        assert!(!storage.has::<LocalPool>(node));
    }

    #[test]
    fn error_placeholder_aborts() {
        let mut ast = Ast::new(0);
        let broken = ast.add_node(NodeKind::Error, Loc::new(0, 1..2));
        let after = ast.add_node(NodeKind::Continue, loc());
        let list = ast.add_node(NodeKind::StatementList(vec![broken, after]), loc());

        let mut storage = ComponentStorage::new();
        let mut pools = ScopePools::new();
        let pool = pools.create(PoolKind::Function);
        let err = ScopeResolutionPass::new(&mut storage, &mut pools)
            .resolve_subtree(&ast, list, pool)
            .unwrap_err();

        assert_eq!(err.error_type, CompilerErrorType::UnparsedNode);
        assert_eq!(err.loc, Loc::new(0, 1..2));
        // No rollback of what was annotated before the failure, nothing after it.
        assert!(storage.has::<LocalPool>(list));
        assert!(!storage.has::<LocalPool>(after));
    }
}
