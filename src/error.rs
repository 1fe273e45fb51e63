use crate::ast::NodeId;
use crate::lexer::{Loc, SourceId, Token};
use ariadne::{ColorGenerator, Config, Label, Report, ReportKind, Source};
use std::collections::HashMap;
use std::fmt;

// --- Ariadne Cache ---

#[derive(Default)]
pub struct AriadneCache {
    sources: HashMap<SourceId, Source>,
    filenames: HashMap<SourceId, String>,
}

impl AriadneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, id: SourceId, filename: String, content: String) {
        self.sources.insert(id, Source::from(content));
        self.filenames.insert(id, filename);
    }
}

#[allow(refining_impl_trait)]
impl ariadne::Cache<SourceId> for &AriadneCache {
    type Storage = String;

    fn fetch(&mut self, id: &SourceId) -> Result<&Source, Box<dyn fmt::Debug + '_>> {
        self.sources
            .get(id)
            .ok_or_else(|| Box::new(format!("Source not found: {:?}", id)) as Box<dyn fmt::Debug>)
    }

    fn display<'a>(&self, id: &'a SourceId) -> Option<Box<dyn fmt::Display + 'a>> {
        self.filenames
            .get(id)
            .map(|f| Box::new(f.clone()) as Box<dyn fmt::Display + 'a>)
    }
}

impl ariadne::Span for Loc {
    type SourceId = SourceId;
    fn source(&self) -> &Self::SourceId {
        &self.source
    }
    fn start(&self) -> usize {
        self.span.start
    }
    fn end(&self) -> usize {
        self.span.end
    }
}

// --- Parser Errors ---

pub type RichParseError<'a> = chumsky::error::Rich<'a, Token, Loc>;

pub fn report_parser_errors(cache: &AriadneCache, errors: Vec<RichParseError<'_>>) {
    let mut colors = ColorGenerator::new();
    for err in errors {
        let mut report_builder = Report::build(ReportKind::Error, err.span().clone())
            .with_config(
                Config::default()
                    .with_cross_gap(false)
                    .with_char_set(ariadne::CharSet::Ascii),
            )
            .with_message("Syntax error");

        match err.reason() {
            chumsky::error::RichReason::ExpectedFound { expected, found } => {
                report_builder = report_builder.with_label(
                    Label::new(err.span().clone())
                        .with_message(format!(
                            "Unexpected {}, expected {}",
                            found
                                .as_ref()
                                .map(|t| format!("`{}`", **t))
                                .unwrap_or_else(|| "end of input".to_string()),
                            if expected.is_empty() {
                                "something else".to_string()
                            } else {
                                expected
                                    .iter()
                                    .map(|pattern| format!("`{pattern}`"))
                                    .collect::<Vec<_>>()
                                    .join(" or ")
                            }
                        ))
                        .with_color(colors.next()),
                );
            }
            chumsky::error::RichReason::Custom(msg) => {
                report_builder = report_builder.with_label(
                    Label::new(err.span().clone())
                        .with_message(msg)
                        .with_color(colors.next()),
                );
            }
        }

        report_builder
            .finish()
            .eprint(cache)
            .unwrap_or_else(|e| eprintln!("Error reporting error: {:?}", e));
    }
}

// --- Compiler Errors ---

/// Reasons a pass gives up on a tree. Every one of them aborts the pass it was raised in.
#[derive(Debug, Clone, PartialEq)]
pub enum CompilerErrorType {
    /// A child reference points at a node that is not in the arena.
    MissingNode { node: NodeId },
    /// The parser left an error placeholder in the tree.
    UnparsedNode,
    /// A node was reached while no scope pool was active.
    NoActiveScope { node_kind: &'static str },
    /// A later pass reached a node the scope-resolution pass never annotated.
    Unresolved { node_kind: &'static str },
    /// A function declares more locals than a frame can index.
    TooManyLocals { name: String },
    InternalCompilerError(String),
}

#[derive(Debug, Clone)]
pub struct CompilationError {
    pub error_type: CompilerErrorType,
    pub loc: Loc,
    pub notes: Vec<(String, Option<Loc>)>,
}

impl CompilationError {
    pub fn new(error_type: CompilerErrorType, loc: Loc) -> Self {
        Self {
            error_type,
            loc,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, message: String, loc: Option<Loc>) -> Self {
        self.notes.push((message, loc));
        self
    }

    pub fn report(&self, cache: &AriadneCache) {
        let mut colors = ColorGenerator::new();
        let main_color = colors.next();

        let (code, message) = self.error_details();

        let mut report = Report::build(ReportKind::Error, self.loc.clone())
            .with_code(code)
            .with_message(message)
            .with_label(
                Label::new(self.loc.clone())
                    .with_message(self.primary_message())
                    .with_color(main_color),
            );

        for (note_msg, note_loc) in &self.notes {
            if let Some(loc) = note_loc {
                report = report.with_label(
                    Label::new(loc.clone())
                        .with_message(note_msg)
                        .with_color(colors.next()),
                );
            } else {
                report = report.with_note(note_msg);
            }
        }

        report
            .finish()
            .eprint(cache)
            .unwrap_or_else(|e| eprintln!("Error reporting error: {:?}", e));
    }

    fn error_details(&self) -> (&'static str, &'static str) {
        match &self.error_type {
            CompilerErrorType::MissingNode { .. } => ("E001", "Malformed Tree"),
            CompilerErrorType::UnparsedNode => ("E002", "Malformed Tree"),
            CompilerErrorType::NoActiveScope { .. } => ("E003", "Scope Resolution Failed"),
            CompilerErrorType::Unresolved { .. } => ("E004", "Scope Resolution Missing"),
            CompilerErrorType::TooManyLocals { .. } => ("E005", "Frame Too Large"),
            CompilerErrorType::InternalCompilerError(_) => ("E999", "Compilation Error"),
        }
    }

    fn primary_message(&self) -> String {
        match &self.error_type {
            CompilerErrorType::MissingNode { node } => {
                format!("Required child {node} is absent from the tree")
            }
            CompilerErrorType::UnparsedNode => {
                "This construct could not be parsed and cannot be compiled".to_string()
            }
            CompilerErrorType::NoActiveScope { node_kind } => {
                format!("`{node_kind}` reached with no active scope pool")
            }
            CompilerErrorType::Unresolved { node_kind } => {
                format!("`{node_kind}` has no scope pool; run scope resolution first")
            }
            CompilerErrorType::TooManyLocals { name } => {
                format!("No local slot left for `{name}`; a frame holds at most {} slots", u16::MAX)
            }
            CompilerErrorType::InternalCompilerError(msg) => {
                format!("Internal compiler error: {}", msg)
            }
        }
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, _) = self.error_details();
        write!(
            f,
            "[{code}] {} at {}..{}",
            self.primary_message(),
            self.loc.span.start,
            self.loc.span.end
        )
    }
}

impl std::error::Error for CompilationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_span() {
        let err = CompilationError::new(
            CompilerErrorType::NoActiveScope { node_kind: "class" },
            Loc::new(0, 4..9),
        );
        assert_eq!(
            err.to_string(),
            "[E003] `class` reached with no active scope pool at 4..9"
        );
    }

    #[test]
    fn notes_accumulate() {
        let err = CompilationError::new(CompilerErrorType::UnparsedNode, Loc::new(0, 0..1))
            .with_note("first".into(), None)
            .with_note("second".into(), Some(Loc::new(0, 2..3)));
        assert_eq!(err.notes.len(), 2);
        assert_eq!(err.notes[1].1, Some(Loc::new(0, 2..3)));
    }
}
