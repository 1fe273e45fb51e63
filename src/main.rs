use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stackc::{
    ast::{Ast, NodeId, NodeKind},
    error::{AriadneCache, CompilationError, report_parser_errors},
    parser::parse_source,
    passes::{
        Visitor,
        local_slots::{FrameSize, LocalSlotPass},
        scope_resolution::ScopeResolutionPass,
    },
    scope::ScopePools,
    types::method_descriptor,
    utils::{AstPrinter, ComponentStorage},
};

const EXAMPLE_SOURCE: &str = "
class Counter {
    int total;

    int add(int step, int times) {
        int i;
        i = 0;
        while (i < times) {
            int next;
            next = total + step;
            total = next;
            i = i + 1;
        }
        return total;
    }

    void report(string label) {
        if (total > 10) {
            string msg;
            msg = label;
            print(msg);
        } else {
            print(\"small\");
        }
    }
}
";

/// Resolves the local scope pools of a program and prints the annotated tree.
#[derive(Parser, Debug)]
#[command(name = "stackc", version, about)]
struct Args {
    /// Source file to compile. A built-in example is used when omitted.
    file: Option<PathBuf>,

    /// Disable coloured output.
    #[arg(long)]
    no_color: bool,

    /// Also assign local variable slots and print them.
    #[arg(long)]
    slots: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let (filename, source) = match &args.file {
        Some(path) => (
            path.display().to_string(),
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => ("example".to_string(), EXAMPLE_SOURCE.to_owned()),
    };

    let mut cache = AriadneCache::new();
    cache.add_source(0, filename.clone(), source.clone());

    let (ast, root) = match parse_source(0, &source) {
        Ok(parsed) => parsed,
        Err(errs) => {
            let count = errs.len();
            report_parser_errors(&cache, errs);
            bail!("{filename}: {count} syntax error(s)");
        }
    };

    let mut component_storage = ComponentStorage::new();
    let mut pools = ScopePools::new();
    if let Err(err) = compiler_passes(&mut component_storage, &mut pools, &ast, root, args.slots) {
        err.report(&cache);
        bail!("{filename}: {err}");
    }

    print!(
        "{}",
        AstPrinter::new(&ast, &component_storage, !args.no_color).print(root)
    );
    if args.slots {
        print_frames(&ast, &component_storage, root);
    }
    Ok(())
}

fn compiler_passes(
    component_storage: &mut ComponentStorage,
    pools: &mut ScopePools,
    ast: &Ast,
    root: NodeId,
    slots: bool,
) -> Result<(), CompilationError> {
    ScopeResolutionPass::new(component_storage, pools).traverse(ast, root)?;
    if slots {
        LocalSlotPass::new(component_storage, pools).traverse(ast, root)?;
    }
    Ok(())
}

/// One line per function: its call descriptor and the number of local slots it needs.
fn print_frames(ast: &Ast, component_storage: &ComponentStorage, root: NodeId) {
    println!();
    for id in ast.descendants(root) {
        let Some(node) = ast.get_node(id) else {
            continue;
        };
        let NodeKind::FunctionDef {
            ty, name, params, ..
        } = &node.kind
        else {
            continue;
        };
        let descriptor = match (ast.type_of(*ty), ast.parameter_types(*params)) {
            (Some(ret), Some(params)) => method_descriptor(&ret, &params),
            _ => "<malformed>".to_string(),
        };
        let frame = component_storage
            .fetch::<FrameSize>(id)
            .map_or(0, |size| **size);
        println!("{name}{descriptor} locals={frame}");
    }
}
