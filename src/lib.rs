pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod passes;
pub mod scope;
pub mod types;
pub mod utils;
