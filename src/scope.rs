//! The lexical-name prefix maintained while executing a program.
//!
//! Mutated by entering/leaving `namespace`/`function` blocks and by non-inlined
//! macro invocation; never touched during analysis.

/// An ordered sequence of name segments, joined with `.` to prefix identifiers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Scope(Vec<String>);

impl Scope {
    pub fn new() -> Self {
        Scope(Vec::new())
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&self) -> String {
        self.0.join(".")
    }

    /// Prefixes `name` with the current scope, i.e. `scope.name`, or just `name` if
    /// the scope is empty.
    pub fn qualify(&self, name: &str) -> String {
        if self.0.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{}", self.merge(), name)
        }
    }

    /// Every key `name` would resolve to, walking from the full current scope prefix
    /// up to the empty prefix (bare `name`). Lookup tries these in order and takes the
    /// first hit, matching the scope-prefix walk every `find*` does in `core.cpp`.
    pub fn lookup_keys(&self, name: &str) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.0.len() + 1);
        for len in (0..=self.0.len()).rev() {
            if len == 0 {
                keys.push(name.to_owned());
            } else {
                keys.push(format!("{}.{}", self.0[..len].join("."), name));
            }
        }
        keys
    }
}

#[cfg(test)]
mod test {
    use super::Scope;

    #[test]
    fn qualify_empty_scope() {
        let scope = Scope::new();
        assert_eq!("x", scope.qualify("x"));
    }

    #[test]
    fn qualify_nested_scope() {
        let mut scope = Scope::new();
        scope.push("a");
        scope.push("b");
        assert_eq!("a.b.x", scope.qualify("x"));
    }

    #[test]
    fn lookup_keys_walk_outward_to_bare_name() {
        let mut scope = Scope::new();
        scope.push("a");
        scope.push("b");
        assert_eq!(vec!["a.b.x".to_owned(), "a.x".to_owned(), "x".to_owned()], scope.lookup_keys("x"));
    }
}
