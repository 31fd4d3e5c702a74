//! A table-driven, retargetable meta-assembler.
//!
//! The assembler itself knows nothing about any one CPU's opcodes: it drives a
//! three-phase pipeline (analyze block structure, resolve addresses, then emit)
//! over a stream of statements, expanding macros/defines/expressions and evaluating
//! a small C-like expression language as it goes. Everything architecture-specific —
//! turning a mnemonic into bytes — is delegated to an [`architecture::Architecture`]
//! implementation the caller supplies; this crate ships only the inert
//! [`architecture::NoneArchitecture`].
//!
//! [`Diagnostic`] is the single error type threaded through every phase: parse
//! failures, unresolved symbols and architecture rejections all surface as one,
//! carrying the `(file, line, block, statement)` that was executing when it fired.

mod analyzer;
mod architecture;
mod defines;
mod directives;
mod driver;
mod error;
mod executor;
mod expr;
mod scope;
mod source;
mod symbols;
mod text;

pub use architecture::{Architecture, NoneArchitecture};
pub use driver::{Driver, Endian, Phase};
pub use error::{Diagnostic, Kind, Location, Result};
pub use expr::Evaluation;
pub use scope::Scope;
pub use symbols::{Define, Expression, Frame, HasStore, Level, Macro, ScopedStore, Variable};
