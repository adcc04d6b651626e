//! Frontend: lexer, parser, and normalized tree for a C subset.
//!
//! The analyses never look at source text. This module turns C into the
//! closed statement/expression tree they consume, with every identifier
//! resolved to a binding:
//!
//! ```text
//! void smooth(int n, double a[]) {
//!     for (int i = 1; i < n; i++)
//!         a[i] = a[i - 1] + 1;
//! }
//! ```
//!
//! Only text that is not C is rejected here. `while` loops, `goto` and
//! friends parse fine and are refused later, where the refusal can name the
//! transformation it blocks.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod token;

// Re-exports
pub use ast::*;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Token, TokenKind};

use crate::utils::errors::AnalysisResult;

/// Parse C source into a translation unit.
pub fn parse(source: &str) -> AnalysisResult<TranslationUnit> {
    let lexer = Lexer::new(source);
    Parser::new(lexer)?.parse_translation_unit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let source = r#"
            void test(int n, int a[]) {
                for (int i = 0; i < n; i++) {
                    a[i] = i;
                }
            }
        "#;
        let unit = parse(source).unwrap();
        assert!(unit.function("test").is_some());
        assert!(unit.function("missing").is_none());
    }

    #[test]
    fn test_lexer_error_surfaces() {
        assert!(matches!(
            parse("void f() { @ }"),
            Err(crate::utils::errors::AnalysisError::Lexer(_))
        ));
    }
}
