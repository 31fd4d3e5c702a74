//! The extension point every CPU-specific backend plugs into.
//!
//! `directives::assemble` hands any statement it doesn't recognize as a core
//! directive to the active `Architecture`, which gets first refusal on turning a
//! mnemonic into bytes via `driver.write(...)`. Returning `Ok(false)` means "not
//! mine"; the driver then tries evaluating the statement as a bare expression
//! (e.g. a side-effecting assignment) before giving up.

use crate::driver::Driver;
use crate::error::Result;

pub trait Architecture {
    fn assemble(&mut self, driver: &mut Driver, statement: &str) -> Result<bool>;
}

/// The architecture selected by `architecture none`: accepts no statements of its
/// own, for assembling pure data/macro programs with no instruction set at all.
#[derive(Default)]
pub struct NoneArchitecture;

impl Architecture for NoneArchitecture {
    fn assemble(&mut self, _driver: &mut Driver, _statement: &str) -> Result<bool> {
        Ok(false)
    }
}
