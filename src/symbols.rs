//! Frames, scoped symbol stores, and the four kinds of name they hold.
//!
//! Macros, defines, expressions and variables all resolve the same way: insertion
//! honors a `Level` (which frame the name lands in) and lookup walks frames
//! innermost-to-outermost, trying every scope prefix at each frame. Rather than
//! writing that walk four times (as the original does, once per kind, with four
//! identical copies of the same loop), it's written once here against a generic
//! `ScopedStore<T>` and a small trait that picks which store on a `Frame` a given
//! symbol kind lives in.

use crate::scope::Scope;
use std::collections::HashMap;

/// Where a `set*` operation inserts its symbol, from `spec.md` §4.3.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    /// Insert into the current (innermost) frame, even if it is inlined.
    Inline,
    /// Insert into the innermost non-inlined frame.
    Active,
    /// Like `Active`, but skip one additional non-inlined frame first.
    Parent,
    /// Insert into the outermost (base) frame only.
    Global,
}

/// A name-keyed table of one symbol kind, shared by every `Frame`.
#[derive(Clone, Debug)]
pub struct ScopedStore<T>(HashMap<String, T>);

impl<T> Default for ScopedStore<T> {
    fn default() -> Self {
        ScopedStore(HashMap::new())
    }
}

impl<T> ScopedStore<T> {
    pub fn new() -> Self {
        ScopedStore(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: String, value: T) {
        self.0.insert(key, value);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Macro {
    pub parameters: Vec<String>,
    pub ip: u32,
    pub inlined: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Define {
    pub parameters: Vec<String>,
    pub value: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expression {
    pub parameters: Vec<String>,
    pub value: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Variable {
    pub value: i64,
}

/// An execution-scope record: the return address to restore `ip` to when it is
/// popped, whether it is transparent to `Active`-level resolution, and one
/// `ScopedStore` per symbol kind.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub ip: u32,
    pub inlined: bool,
    pub macros: ScopedStore<Macro>,
    pub defines: ScopedStore<Define>,
    pub expressions: ScopedStore<Expression>,
    pub variables: ScopedStore<Variable>,
}

impl Frame {
    pub fn new(ip: u32, inlined: bool) -> Self {
        Frame { ip, inlined, ..Default::default() }
    }
}

/// Picks which of a `Frame`'s four stores holds symbols of kind `T`, so the
/// level/lookup walks below can be written once and reused for every kind.
pub trait HasStore<T> {
    fn store(&self) -> &ScopedStore<T>;
    fn store_mut(&mut self) -> &mut ScopedStore<T>;
}

impl HasStore<Macro> for Frame {
    fn store(&self) -> &ScopedStore<Macro> {
        &self.macros
    }
    fn store_mut(&mut self) -> &mut ScopedStore<Macro> {
        &mut self.macros
    }
}

impl HasStore<Define> for Frame {
    fn store(&self) -> &ScopedStore<Define> {
        &self.defines
    }
    fn store_mut(&mut self) -> &mut ScopedStore<Define> {
        &mut self.defines
    }
}

impl HasStore<Expression> for Frame {
    fn store(&self) -> &ScopedStore<Expression> {
        &self.expressions
    }
    fn store_mut(&mut self) -> &mut ScopedStore<Expression> {
        &mut self.expressions
    }
}

impl HasStore<Variable> for Frame {
    fn store(&self) -> &ScopedStore<Variable> {
        &self.variables
    }
    fn store_mut(&mut self) -> &mut ScopedStore<Variable> {
        &mut self.variables
    }
}

/// Inserts `value` under `name` (optionally arity-suffixed by the caller) honoring
/// `level`, walking `frames` innermost (end of the slice) to outermost (index 0).
pub fn set_scoped<T>(frames: &mut [Frame], scope: &Scope, level: Level, name: &str, value: T)
where
    Frame: HasStore<T>,
{
    let key = scope.qualify(name);
    let mut level = level;
    for n in (0..frames.len()).rev() {
        if level != Level::Inline {
            if frames[n].inlined {
                continue;
            }
            if level == Level::Global && n != 0 {
                continue;
            }
            if level == Level::Parent && n != 0 {
                level = Level::Active;
                continue;
            }
        }
        HasStore::<T>::store_mut(&mut frames[n]).insert(key, value);
        return;
    }
}

/// Looks up `name`, walking frames innermost to outermost and, at each frame, every
/// scope prefix from the current scope outward to empty.
pub fn find_scoped<'a, T>(frames: &'a [Frame], scope: &Scope, name: &str) -> Option<&'a T>
where
    Frame: HasStore<T>,
{
    let keys = scope.lookup_keys(name);
    for frame in frames.iter().rev() {
        let store = HasStore::<T>::store(frame);
        for key in &keys {
            if let Some(found) = store.get(key) {
                return Some(found);
            }
        }
    }
    None
}

pub fn find_scoped_mut<'a, T>(
    frames: &'a mut [Frame],
    scope: &Scope,
    name: &str,
) -> Option<&'a mut T>
where
    Frame: HasStore<T>,
{
    let keys = scope.lookup_keys(name);
    for frame in frames.iter_mut().rev() {
        let store = HasStore::<T>::store(frame);
        if keys.iter().any(|key| store.get(key).is_some()) {
            let store_mut = HasStore::<T>::store_mut(frame);
            for key in &keys {
                if store_mut.get(key).is_some() {
                    return store_mut.get_mut(key);
                }
            }
        }
    }
    None
}

/// Validates an identifier per `spec.md` §4.3: `[A-Za-z_#]` anywhere, and
/// (non-leading) `[0-9.]`.
pub fn validate_identifier(name: &str) -> bool {
    for (n, c) in name.chars().enumerate() {
        let ok = matches!(c, 'A'..='Z' | 'a'..='z' | '_' | '#')
            || (n > 0 && matches!(c, '0'..='9' | '.'));
        if !ok {
            return false;
        }
    }
    !name.is_empty()
}
