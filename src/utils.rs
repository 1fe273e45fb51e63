use std::any::{Any, TypeId};
use std::fmt::Write;

use colored::Colorize;
use rustc_hash::FxHashMap;
use slotmap::SecondaryMap;

use crate::{
    ast::{Ast, NodeId, NodeKind, TypeSpecKind},
    passes::{local_slots::LocalSlot, scope_resolution::LocalPool},
    scope::PoolId,
};

/// Side table of per-node facts produced by compiler passes, one map per component type.
#[derive(Default)]
pub struct ComponentStorage {
    components: FxHashMap<TypeId, SecondaryMap<NodeId, Box<dyn Any>>>,
}

impl ComponentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `component` to `node`, replacing a previous component of the same type.
    pub fn insert<T: 'static>(&mut self, node: NodeId, component: T) {
        self.components
            .entry(TypeId::of::<T>())
            .or_insert_with(SecondaryMap::new)
            .insert(node, Box::new(component));
    }

    pub fn fetch<T: 'static>(&self, node: NodeId) -> Option<&T> {
        self.components
            .get(&TypeId::of::<T>())?
            .get(node)
            .and_then(|inner| inner.downcast_ref::<T>())
    }

    pub fn fetch_mut<T: 'static>(&mut self, node: NodeId) -> Option<&mut T> {
        self.components
            .get_mut(&TypeId::of::<T>())?
            .get_mut(node)
            .and_then(|inner| inner.downcast_mut::<T>())
    }

    pub fn has<T: 'static>(&self, node: NodeId) -> bool {
        self.components
            .get(&TypeId::of::<T>())
            .is_some_and(|component| component.contains_key(node))
    }

    /// Number of nodes carrying a component of type `T`.
    pub fn count<T: 'static>(&self) -> usize {
        self.components
            .get(&TypeId::of::<T>())
            .map_or(0, |component| component.len())
    }
}

/// Renders an annotated tree, one node per line, with the pool each node belongs to.
///
/// Pools are labelled `@0`, `@1`, ... in order of first appearance so the output does not depend
/// on arena key values.
pub struct AstPrinter<'a> {
    ast: &'a Ast,
    storage: &'a ComponentStorage,
    color: bool,
    pool_labels: FxHashMap<PoolId, usize>,
    out: String,
}

impl<'a> AstPrinter<'a> {
    pub fn new(ast: &'a Ast, storage: &'a ComponentStorage, color: bool) -> Self {
        Self {
            ast,
            storage,
            color,
            pool_labels: FxHashMap::default(),
            out: String::new(),
        }
    }

    pub fn print(mut self, root: NodeId) -> String {
        self.print_node(root, 0);
        self.out
    }

    fn print_node(&mut self, id: NodeId, depth: usize) {
        let ast = self.ast;
        let indent = "  ".repeat(depth);
        let Some(node) = ast.get_node(id) else {
            let missing = format!("<missing {id}>");
            let missing = self.paint(missing, |s| s.red().to_string());
            let _ = writeln!(self.out, "{indent}{missing}");
            return;
        };

        let keyword = self.paint(node.kind.name().to_owned(), |s| s.yellow().to_string());
        let detail = self.detail(&node.kind);
        let mut line = format!("{indent}{keyword}");
        if let Some(detail) = detail {
            let detail = self.paint(detail, |s| s.cyan().to_string());
            line.push(' ');
            line.push_str(&detail);
        }
        if let Some(LocalPool(pool)) = self.storage.fetch::<LocalPool>(id) {
            let next = self.pool_labels.len();
            let label = *self.pool_labels.entry(*pool).or_insert(next);
            let label = self.paint(format!("@{label}"), |s| s.bright_purple().to_string());
            line.push(' ');
            line.push_str(&label);
        }
        if let Some(LocalSlot(slot)) = self.storage.fetch::<LocalSlot>(id) {
            let slot = self.paint(format!("slot {slot}"), |s| s.bright_green().to_string());
            line.push(' ');
            line.push_str(&slot);
        }
        let _ = writeln!(self.out, "{line}");

        for child in ast.children(id) {
            self.print_node(child, depth + 1);
        }
    }

    fn detail(&self, kind: &NodeKind) -> Option<String> {
        match kind {
            NodeKind::ClassDef { name, .. }
            | NodeKind::FieldDef { name, .. }
            | NodeKind::FunctionDef { name, .. }
            | NodeKind::ParamDecl { name, .. }
            | NodeKind::Declaration { name, .. } => Some(name.clone()),
            NodeKind::TypeSpec(spec) => Some(
                match spec {
                    TypeSpecKind::Int => "int",
                    TypeSpecKind::Float => "float",
                    TypeSpecKind::Str => "string",
                    TypeSpecKind::Void => "void",
                    TypeSpecKind::Class(_) => "<class>",
                }
                .to_owned(),
            ),
            NodeKind::IntLit(value) => Some(value.to_string()),
            NodeKind::FloatLit(value) => Some(value.to_string()),
            NodeKind::StringLit(value) => Some(format!("{value:?}")),
            NodeKind::Identifier { name, args } => Some(match args {
                Some(_) => format!("{name}()"),
                None => name.clone(),
            }),
            NodeKind::New { class, .. } => Some(class.clone()),
            NodeKind::Accessor { member, args, .. } => Some(match args {
                Some(_) => format!(".{member}()"),
                None => format!(".{member}"),
            }),
            NodeKind::Binary { op, .. } => Some(op.to_string()),
            NodeKind::Unary { op, .. } => Some(op.to_string()),
            _ => None,
        }
    }

    fn paint(&self, text: String, style: impl Fn(&str) -> String) -> String {
        if self.color { style(&text) } else { text }
    }
}
