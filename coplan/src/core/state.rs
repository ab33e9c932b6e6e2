//! World attributes held in every agent snapshot.
//!
//! A [`WorldState`] maps attribute names to per-entity [`Fact`]s. Each
//! attribute table sits behind an `Arc` and is copied on first write, so
//! cloning a snapshot at a branch point only pays for the attributes the
//! branch later modifies.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Value bound to one entity key of an attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Fact {
    #[default]
    Unset,
    Symbol(String),
    Number(f64),
    /// Ordered collection of opaque member identifiers.
    List(Vec<String>),
}

impl Fact {
    pub fn symbol(value: impl Into<String>) -> Self {
        Fact::Symbol(value.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Fact::List(items.into_iter().map(Into::into).collect())
    }

    /// Members used for membership comparison.
    ///
    /// Scalars are singleton collections and `Unset` is empty.
    pub fn members(&self) -> Vec<String> {
        match self {
            Fact::Unset => Vec::new(),
            Fact::Symbol(value) => vec![value.clone()],
            Fact::Number(value) => vec![value.to_string()],
            Fact::List(items) => items.clone(),
        }
    }

    pub fn contains(&self, member: &str) -> bool {
        match self {
            Fact::Unset => false,
            Fact::Symbol(value) => value == member,
            Fact::Number(value) => value.to_string() == member,
            Fact::List(items) => items.iter().any(|item| item == member),
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Fact::Symbol(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Unset => f.write_str("none"),
            Fact::Symbol(value) => f.write_str(value),
            Fact::Number(value) => write!(f, "{value}"),
            Fact::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

type Table = BTreeMap<String, Fact>;

/// Named attributes mapping entity keys to facts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldState {
    attributes: BTreeMap<String, Arc<Table>>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`WorldState::set`].
    pub fn with(mut self, attribute: &str, key: &str, fact: Fact) -> Self {
        self.set(attribute, key, fact);
        self
    }

    pub fn get(&self, attribute: &str, key: &str) -> Option<&Fact> {
        self.attributes.get(attribute)?.get(key)
    }

    pub fn set(&mut self, attribute: &str, key: &str, fact: Fact) {
        self.table_mut(attribute).insert(key.to_string(), fact);
    }

    pub fn members(&self, attribute: &str, key: &str) -> Vec<String> {
        self.get(attribute, key).map(Fact::members).unwrap_or_default()
    }

    pub fn contains(&self, attribute: &str, key: &str, member: &str) -> bool {
        self.get(attribute, key)
            .is_some_and(|fact| fact.contains(member))
    }

    /// Append `member`, promoting an unset or scalar binding to a list.
    pub fn push(&mut self, attribute: &str, key: &str, member: impl Into<String>) {
        let member = member.into();
        let table = self.table_mut(attribute);
        let fact = table.entry(key.to_string()).or_default();
        match fact {
            Fact::List(items) => items.push(member),
            Fact::Unset => *fact = Fact::List(vec![member]),
            Fact::Symbol(_) | Fact::Number(_) => {
                let mut items = fact.members();
                items.push(member);
                *fact = Fact::List(items);
            }
        }
    }

    /// Remove one occurrence of `member`. A matching scalar becomes `Unset`.
    ///
    /// Returns `false` when `member` was not bound to `key`.
    pub fn remove_member(&mut self, attribute: &str, key: &str, member: &str) -> bool {
        if !self.contains(attribute, key, member) {
            return false;
        }
        let table = self.table_mut(attribute);
        let Some(fact) = table.get_mut(key) else {
            return false;
        };
        match fact {
            Fact::List(items) => {
                if let Some(pos) = items.iter().position(|item| item == member) {
                    items.remove(pos);
                }
            }
            Fact::Symbol(_) | Fact::Number(_) => *fact = Fact::Unset,
            Fact::Unset => return false,
        }
        true
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> + '_ {
        self.attributes.keys().map(String::as_str)
    }

    pub fn keys<'a>(&'a self, attribute: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .get(attribute)
            .into_iter()
            .flat_map(|table| table.keys().map(String::as_str))
    }

    /// True if both states still share the same storage for `attribute`.
    pub fn shares_attribute(&self, other: &WorldState, attribute: &str) -> bool {
        match (self.attributes.get(attribute), other.attributes.get(attribute)) {
            (Some(left), Some(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }

    fn table_mut(&mut self, attribute: &str) -> &mut Table {
        let shared = self.attributes.entry(attribute.to_string()).or_default();
        Arc::make_mut(shared)
    }
}

impl fmt::Display for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (attribute, table) in &self.attributes {
            for (key, fact) in table.iter() {
                writeln!(f, "    {attribute}.{key} = {fact}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_singleton_members() {
        assert_eq!(Fact::symbol("a").members(), vec!["a".to_string()]);
        assert!(Fact::Unset.members().is_empty());
        assert!(Fact::Number(3.0).contains("3"));
    }

    #[test]
    fn push_promotes_unset_to_list() {
        let mut state = WorldState::new();
        state.push("holding", "robot", "a");
        state.push("holding", "robot", "b");
        assert_eq!(
            state.get("holding", "robot"),
            Some(&Fact::list(["a", "b"]))
        );
    }

    #[test]
    fn remove_member_tolerates_absent_values() {
        let mut state = WorldState::new().with("holding", "robot", Fact::list(["a"]));
        assert!(!state.remove_member("holding", "robot", "z"));
        assert!(state.remove_member("holding", "robot", "a"));
        assert_eq!(state.get("holding", "robot"), Some(&Fact::List(Vec::new())));
    }

    #[test]
    fn remove_matching_scalar_unsets_it() {
        let mut state = WorldState::new().with("at", "robot", Fact::symbol("room"));
        assert!(state.remove_member("at", "robot", "room"));
        assert_eq!(state.get("at", "robot"), Some(&Fact::Unset));
    }

    #[test]
    fn clone_shares_untouched_attributes() {
        let base = WorldState::new()
            .with("at", "robot", Fact::symbol("room"))
            .with("holding", "robot", Fact::List(Vec::new()));
        let mut branch = base.clone();
        branch.push("holding", "robot", "a");

        assert!(branch.shares_attribute(&base, "at"));
        assert!(!branch.shares_attribute(&base, "holding"));
        assert!(base.members("holding", "robot").is_empty());
    }

    #[test]
    fn display_lists_every_binding() {
        let state = WorldState::new()
            .with("at", "robot", Fact::symbol("room"))
            .with("weight", "a", Fact::Number(2.0));
        let rendered = state.to_string();
        assert!(rendered.contains("at.robot = room"));
        assert!(rendered.contains("weight.a = 2"));
    }
}
