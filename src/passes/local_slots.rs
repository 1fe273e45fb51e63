use derive_more::Deref;
use tracing::{debug, trace};

use crate::{
    ast::{Ast, NodeId, TypeSpecKind},
    error::{CompilationError, CompilerErrorType},
    lexer::Loc,
    passes::{scope_resolution::LocalPool, *},
    scope::{PoolId, ScopePool, ScopePools},
    utils::ComponentStorage,
};

/// Index into the local-variable table of the frame, for declarations, parameters and reads of
/// a local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deref)]
pub struct LocalSlot(pub u16);

/// Number of local slots a function needs, `this` included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deref)]
pub struct FrameSize(pub u16);

/// Numbers the locals of every function using the pools attached by
/// [`ScopeResolutionPass`](super::scope_resolution::ScopeResolutionPass).
///
/// Slot 0 of a function pool is `this`, parameters follow in order, then locals in order of
/// declaration. Identifiers that do not name a local (fields, unknown names) get no slot.
pub struct LocalSlotPass<'a> {
    pool_stack: Vec<PoolId>,
    component_storage: &'a mut ComponentStorage,
    pools: &'a mut ScopePools,
    current_node: Option<NodeId>,
    in_type: bool,
}

impl<'a> LocalSlotPass<'a> {
    pub fn new(component_storage: &'a mut ComponentStorage, pools: &'a mut ScopePools) -> Self {
        Self {
            pool_stack: Vec::new(),
            component_storage,
            pools,
            current_node: None,
            in_type: false,
        }
    }

    fn current(&self, loc: &Loc) -> Result<(NodeId, PoolId), CompilationError> {
        match (self.current_node, self.peek_stack()) {
            (Some(node), Some(&pool)) => Ok((node, pool)),
            _ => Err(CompilationError::new(
                CompilerErrorType::InternalCompilerError(
                    "slot assignment outside of a node".to_string(),
                ),
                loc.clone(),
            )),
        }
    }

    fn pool_mut(&mut self, pool: PoolId, loc: &Loc) -> Result<&mut ScopePool, CompilationError> {
        self.pools.get_mut(pool).ok_or_else(|| {
            CompilationError::new(
                CompilerErrorType::InternalCompilerError(format!(
                    "scope pool {pool:?} is not registered"
                )),
                loc.clone(),
            )
        })
    }

    fn reserve_in(&mut self, pool: PoolId, name: &str, loc: &Loc) -> Result<u16, CompilationError> {
        self.pool_mut(pool, loc)?.reserve(name).ok_or_else(|| {
            CompilationError::new(
                CompilerErrorType::TooManyLocals {
                    name: name.to_owned(),
                },
                loc.clone(),
            )
        })
    }

    /// Reserves `name` in the pool of the current node and annotates the node with its slot.
    fn reserve(&mut self, name: &str, loc: &Loc) -> Result<u16, CompilationError> {
        let (node, pool) = self.current(loc)?;
        let slot = self.reserve_in(pool, name, loc)?;
        self.component_storage.insert(node, LocalSlot(slot));
        Ok(slot)
    }
}

impl<'a> Visitor<PoolId> for LocalSlotPass<'a> {
    type Error = CompilationError;

    fn get_stack(&self) -> &Vec<PoolId> {
        &self.pool_stack
    }
    fn get_stack_mut(&mut self) -> &mut Vec<PoolId> {
        &mut self.pool_stack
    }

    fn traverse(&mut self, ast: &Ast, root: NodeId) -> VisitResult<Self::Error> {
        debug!(%root, "assigning local slots");
        self.visit_node(ast, root)?;
        debug!(
            locals = self.component_storage.count::<LocalSlot>(),
            "local slots assigned"
        );
        Ok(())
    }

    fn missing_node(&mut self, ast: &Ast, node_id: NodeId) -> VisitResult<Self::Error> {
        let loc = self
            .current_node
            .and_then(|node| ast.get_node(node))
            .map(|node| node.loc.clone())
            .unwrap_or_else(|| Loc::new(ast.source_id, 0..0));
        Err(CompilationError::new(
            CompilerErrorType::MissingNode { node: node_id },
            loc,
        ))
    }

    fn visit_error_node(&mut self, _ast: &Ast, node_loc: Loc) -> VisitResult<Self::Error> {
        Err(CompilationError::new(
            CompilerErrorType::UnparsedNode,
            node_loc,
        ))
    }

    // Every node runs with its own pool on top of the stack.
    fn visit_node(&mut self, ast: &Ast, node_id: NodeId) -> VisitResult<Self::Error> {
        let Some(node) = ast.get_node(node_id) else {
            return self.missing_node(ast, node_id);
        };
        let Some(&LocalPool(pool)) = self.component_storage.fetch::<LocalPool>(node_id) else {
            return Err(CompilationError::new(
                CompilerErrorType::Unresolved {
                    node_kind: node.kind.name(),
                },
                node.loc.clone(),
            ));
        };

        self.push_stack(pool);
        let prev = self.current_node.replace(node_id);
        let r = walk_node(self, ast, node_id);
        self.current_node = prev;
        self.pop_stack();
        r
    }

    fn visit_function_def(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        name: &str,
        params: NodeId,
        body: NodeId,
        node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        let (node, pool) = self.current(&node_loc)?;
        self.reserve_in(pool, "this", &node_loc)?;

        walk_function_def(self, ast, ty, params, body)?;

        let size = self.pool_mut(pool, &node_loc)?.max_locals();
        trace!(function = name, size, "frame size");
        self.component_storage.insert(node, FrameSize(size));
        Ok(())
    }

    fn visit_param_decl(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        name: &str,
        node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        self.reserve(name, &node_loc)?;
        walk_typed_name(self, ast, ty)
    }

    fn visit_declaration(
        &mut self,
        ast: &Ast,
        ty: NodeId,
        name: &str,
        node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        self.reserve(name, &node_loc)?;
        walk_typed_name(self, ast, ty)
    }

    fn visit_identifier(
        &mut self,
        ast: &Ast,
        name: &str,
        args: Option<NodeId>,
        node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        // Calls and class names in types never refer to locals.
        if args.is_none() && !self.in_type {
            let (node, pool) = self.current(&node_loc)?;
            match self.pools.get(pool).and_then(|pool| pool.lookup(name)) {
                Some(slot) => self.component_storage.insert(node, LocalSlot(slot)),
                None => trace!(name, "not a local"),
            }
        }
        visit_opt_node_id!(self, ast, args);
        Ok(())
    }

    fn visit_type_spec(
        &mut self,
        ast: &Ast,
        kind: &TypeSpecKind,
        _node_loc: Loc,
    ) -> VisitResult<Self::Error> {
        let outer = std::mem::replace(&mut self.in_type, true);
        let r = walk_type_spec(self, ast, kind);
        self.in_type = outer;
        r
    }
}
