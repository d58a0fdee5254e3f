use super::container::Unit;
use super::template::ResidueTemplate;
use std::collections::HashMap;

/// An insertion-ordered, name-keyed collection of library units.
#[derive(Debug, Clone, Default)]
pub struct Library {
    units: Vec<(String, Unit)>,
    index: HashMap<String, usize>,
}

impl Library {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `unit` under `name`, returning the unit it replaced.
    ///
    /// A replaced entry keeps its original position.
    pub fn insert(&mut self, name: &str, unit: impl Into<Unit>) -> Option<Unit> {
        let unit = unit.into();
        match self.index.get(name) {
            Some(&slot) => Some(std::mem::replace(&mut self.units[slot].1, unit)),
            None => {
                self.index.insert(name.to_string(), self.units.len());
                self.units.push((name.to_string(), unit));
                None
            }
        }
    }

    /// Unit stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Unit> {
        self.index.get(name).map(|&slot| &self.units[slot].1)
    }

    /// Returns the entry under `name` if it is a single template.
    pub fn get_template(&self, name: &str) -> Option<&ResidueTemplate> {
        self.get(name).and_then(Unit::as_single)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entry names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|(name, _)| name.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Unit)> {
        self.units.iter().map(|(name, unit)| (name.as_str(), unit))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;

    fn template(name: &str, atoms: usize) -> ResidueTemplate {
        let mut template = ResidueTemplate::new(name);
        for i in 0..atoms {
            template.add_atom(Atom::new(&format!("A{i}"), "DU")).unwrap();
        }
        template
    }

    #[test]
    fn insert_preserves_order_and_indexes_by_name() {
        let mut library = Library::new();
        library.insert("WAT", template("WAT", 3));
        library.insert("ACE", template("ACE", 6));

        assert_eq!(library.len(), 2);
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["WAT", "ACE"]);
        assert_eq!(library.get_template("ACE").unwrap().len(), 6);
        assert!(library.contains("WAT"));
        assert!(library.get("NME").is_none());
    }

    #[test]
    fn insert_replaces_existing_entry_in_place() {
        let mut library = Library::new();
        library.insert("WAT", template("WAT", 3));
        library.insert("ACE", template("ACE", 6));

        let previous = library.insert("WAT", template("WAT", 4)).unwrap();
        assert_eq!(previous.as_single().unwrap().len(), 3);
        assert_eq!(library.len(), 2);
        assert_eq!(library.names().next(), Some("WAT"));
        assert_eq!(library.get_template("WAT").unwrap().len(), 4);
    }

    #[test]
    fn empty_library_reports_empty() {
        let library = Library::new();
        assert!(library.is_empty());
        assert_eq!(library.iter().count(), 0);
    }
}
