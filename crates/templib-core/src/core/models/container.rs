use super::error::TemplateError;
use super::library::Library;
use super::structure::Structure;
use super::template::{PeriodicBox, ResidueTemplate};
use std::sync::Arc;

/// One entry of a container or library.
#[derive(Debug, Clone)]
pub enum Unit {
    /// A standalone residue template.
    Single(Arc<ResidueTemplate>),
    /// A multi-residue entry (e.g. a solvent box) whose members share one box.
    Multi(ResidueTemplateContainer),
}

impl Unit {
    /// Name of the template or container.
    pub fn name(&self) -> &str {
        match self {
            Self::Single(template) => &template.name,
            Self::Multi(container) => &container.name,
        }
    }

    /// The template, if this unit holds a single residue.
    pub fn as_single(&self) -> Option<&ResidueTemplate> {
        match self {
            Self::Single(template) => Some(template),
            Self::Multi(_) => None,
        }
    }

    /// The container, if this unit holds several residues.
    pub fn as_multi(&self) -> Option<&ResidueTemplateContainer> {
        match self {
            Self::Single(_) => None,
            Self::Multi(container) => Some(container),
        }
    }

    /// The periodic box of this entry, if any.
    pub fn periodic_box(&self) -> Option<PeriodicBox> {
        match self {
            Self::Single(template) => template.periodic_box,
            Self::Multi(container) => container.periodic_box,
        }
    }

    /// Copies the entry without sharing any template with `self`.
    /// Copies the container and every member template so nothing is shared.
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Single(template) => Self::Single(Arc::new(ResidueTemplate::clone(template))),
            Self::Multi(container) => Self::Multi(container.deep_copy()),
        }
    }

    fn fix_charges(&mut self, target: Option<f64>, precision: usize) -> Result<(), TemplateError> {
        match self {
            Self::Single(template) => {
                Arc::make_mut(template).fix_charges(target, precision)?;
            }
            Self::Multi(container) => {
                container.fix_charges(target, precision)?;
            }
        }
        Ok(())
    }
}

impl From<ResidueTemplate> for Unit {
    fn from(template: ResidueTemplate) -> Self {
        Self::Single(Arc::new(template))
    }
}

impl From<Arc<ResidueTemplate>> for Unit {
    fn from(template: Arc<ResidueTemplate>) -> Self {
        Self::Single(template)
    }
}

impl From<ResidueTemplateContainer> for Unit {
    fn from(container: ResidueTemplateContainer) -> Self {
        Self::Multi(container)
    }
}

/// An ordered collection of units, optionally sharing a periodic box.
#[derive(Debug, Clone, Default)]
pub struct ResidueTemplateContainer {
    pub name: String,
    pub periodic_box: Option<PeriodicBox>,
    units: Vec<Unit>,
}

impl ResidueTemplateContainer {
    /// Creates an empty container without a box. An empty name marks a loose
    /// collection of independent units.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Appends a member unit.
    pub fn push(&mut self, unit: impl Into<Unit>) {
        self.units.push(unit.into());
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Member at `index`, in insertion order.
    pub fn get(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All single templates, descending into multi-unit entries in order.
    pub fn templates(&self) -> Vec<&ResidueTemplate> {
        let mut out = Vec::new();
        for unit in &self.units {
            match unit {
                Unit::Single(template) => out.push(template.as_ref()),
                Unit::Multi(container) => out.extend(container.templates()),
            }
        }
        out
    }

    /// Builds a container holding every entry of `library` in order.
    ///
    /// With `copy` unset the container shares the library's templates;
    /// otherwise every template is deep-copied.
    pub fn from_library(library: &Library, copy: bool) -> Self {
        let units = library
            .iter()
            .map(|(_, unit)| if copy { unit.deep_copy() } else { unit.clone() })
            .collect();
        Self {
            name: String::new(),
            periodic_box: None,
            units,
        }
    }

    /// Converts the container into a library keyed by unit name, sharing templates.
    pub fn to_library(&self) -> Library {
        let mut library = Library::new();
        for unit in &self.units {
            library.insert(unit.name(), unit.clone());
        }
        library
    }

    /// Projects every residue of `structure` into its own template.
    pub fn from_structure(structure: &Structure) -> Result<Self, TemplateError> {
        let units = (0..structure.residues().len())
            .map(|idx| ResidueTemplate::from_residue(structure, idx).map(Unit::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: String::new(),
            periodic_box: structure.periodic_box,
            units,
        })
    }

    pub fn deep_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            periodic_box: self.periodic_box,
            units: self.units.iter().map(Unit::deep_copy).collect(),
        }
    }

    /// Normalizes the charges of every member template independently.
    ///
    /// Templates shared with other owners are copied before being modified.
    pub fn fix_charges(
        &mut self,
        target: Option<f64>,
        precision: usize,
    ) -> Result<&mut Self, TemplateError> {
        for unit in &mut self.units {
            unit.fix_charges(target, precision)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::residue::ResidueKind;
    use crate::core::models::structure::StructureBuilder;
    use crate::core::models::topology::BondOrder;

    fn charged(name: &str, charges: &[f64]) -> ResidueTemplate {
        let mut template = ResidueTemplate::new(name);
        for (i, &q) in charges.iter().enumerate() {
            template
                .add_atom(Atom::new(&format!("A{i}"), "DU").with_charge(q))
                .unwrap();
        }
        template
    }

    fn library() -> Library {
        let mut library = Library::new();
        library.insert("ONE", charged("ONE", &[0.31, 0.52, 0.2]));
        library.insert("TWO", charged("TWO", &[-0.43, -0.61]));
        let mut boxed = ResidueTemplateContainer::new("BOX");
        boxed.push(charged("WAT", &[-0.8, 0.41, 0.41]));
        boxed.push(charged("WAT", &[-0.8, 0.41, 0.41]));
        boxed.periodic_box = Some(PeriodicBox::rectangular(10.0, 10.0, 10.0));
        library.insert("BOX", boxed);
        library
    }

    #[test]
    fn from_library_without_copy_shares_templates() {
        let library = library();
        let container = ResidueTemplateContainer::from_library(&library, false);

        assert_eq!(container.len(), 3);
        let (Unit::Single(ours), Some(Unit::Single(theirs))) = (&container.units()[0], library.get("ONE")) else {
            panic!("expected single units");
        };
        assert!(Arc::ptr_eq(ours, theirs));
    }

    #[test]
    fn from_library_with_copy_deep_copies_templates() {
        let library = library();
        let container = ResidueTemplateContainer::from_library(&library, true);

        let (Unit::Single(ours), Some(Unit::Single(theirs))) = (&container.units()[0], library.get("ONE")) else {
            panic!("expected single units");
        };
        assert!(!Arc::ptr_eq(ours, theirs));
        assert_eq!(ours.len(), theirs.len());
        assert_eq!(container.units()[2].as_multi().unwrap().len(), 2);
        assert!(container.units()[2].periodic_box().is_some());
    }

    #[test]
    fn to_library_keys_units_by_name_and_shares_them() {
        let container = ResidueTemplateContainer::from_library(&library(), false);
        let library = container.to_library();

        assert_eq!(library.names().collect::<Vec<_>>(), vec!["ONE", "TWO", "BOX"]);
        let (Unit::Single(ours), Some(Unit::Single(theirs))) = (&container.units()[1], library.get("TWO")) else {
            panic!("expected single units");
        };
        assert!(Arc::ptr_eq(ours, theirs));
    }

    #[test]
    fn fix_charges_normalizes_every_member_independently() {
        let source = library();
        let mut container = ResidueTemplateContainer::from_library(&source, false);
        container.fix_charges(None, 4).unwrap();

        let templates = container.templates();
        assert_eq!(templates.len(), 4);
        let expected = [1.0, -1.0, 0.0, 0.0];
        for (template, target) in templates.iter().zip(expected) {
            assert!((template.net_charge() - target).abs() < 1e-7);
        }
        // Shared templates are copied on write, leaving the source library untouched.
        let original = source.get_template("ONE").unwrap();
        assert!((original.net_charge() - 1.03).abs() < 1e-12);
    }

    #[test]
    fn from_structure_projects_each_residue() {
        let mut builder = StructureBuilder::new();
        for _ in 0..3 {
            let base = builder.atom_count();
            builder
                .start_residue("WAT", ResidueKind::Solvent)
                .add_atom(Atom::new("O", "OW"))
                .add_atom(Atom::new("H1", "HW"))
                .add_atom(Atom::new("H2", "HW"))
                .add_bond(base, base + 1, BondOrder::Single)
                .add_bond(base, base + 2, BondOrder::Single);
        }
        builder.periodic_box(PeriodicBox::rectangular(9.0, 9.0, 9.0));
        let structure = builder.build();

        let container = ResidueTemplateContainer::from_structure(&structure).unwrap();
        assert_eq!(container.len(), 3);
        assert_eq!(container.periodic_box, structure.periodic_box);
        for template in container.templates() {
            assert_eq!(template.len(), 3);
            assert_eq!(template.bonds().len(), 2);
            assert_eq!(template.kind, ResidueKind::Solvent);
        }
    }
}
