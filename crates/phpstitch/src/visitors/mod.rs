//! AST transformations applied to every fragment
//!
//! Each pass walks the statement containers of a [`crate::ast::Program`]
//! (the top level, namespace bodies and block bodies) and never looks inside
//! opaque code.

mod declaration_filter;
mod inclusion_stripper;
mod return_rewriter;

pub use declaration_filter::DeclarationFilter;
pub use inclusion_stripper::InclusionStripper;
pub use return_rewriter::ReturnRewriter;
