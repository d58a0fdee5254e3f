use crate::core::models::container::{ResidueTemplateContainer, Unit};
use crate::core::models::library::Library;
use crate::core::models::template::{PeriodicBox, ResidueTemplate};

/// A flattened, borrowed view of one library unit or molecule record: a name,
/// its residues in order and the box they share.
#[derive(Debug, Clone)]
pub(crate) struct EntryView<'a> {
    pub name: &'a str,
    pub residues: Vec<&'a ResidueTemplate>,
    pub periodic_box: Option<PeriodicBox>,
}

impl<'a> EntryView<'a> {
    pub fn single(name: &'a str, template: &'a ResidueTemplate) -> Self {
        Self {
            name,
            residues: vec![template],
            periodic_box: template.periodic_box,
        }
    }

    pub fn of_unit(name: &'a str, unit: &'a Unit) -> Self {
        match unit {
            Unit::Single(template) => Self::single(name, template),
            Unit::Multi(container) => Self {
                name,
                residues: container.templates(),
                periodic_box: container.periodic_box,
            },
        }
    }

    /// One entry per library unit, keyed by its library name.
    pub fn of_library(library: &'a Library) -> Vec<Self> {
        library
            .iter()
            .map(|(name, unit)| Self::of_unit(name, unit))
            .collect()
    }

    /// One entry per member unit of a top-level container.
    pub fn of_members(container: &'a ResidueTemplateContainer) -> Vec<Self> {
        container
            .iter()
            .map(|unit| Self::of_unit(unit.name(), unit))
            .collect()
    }
}
