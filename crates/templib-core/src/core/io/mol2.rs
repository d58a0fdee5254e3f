use super::entry::EntryView;
use super::error::{IoError, ReadReport};
use super::off::check_consistency;
use super::traits::TemplateFile;
use crate::core::config::CodecConfig;
use crate::core::elements::guess_atomic_number;
use crate::core::models::atom::Atom;
use crate::core::models::container::{ResidueTemplateContainer, Unit};
use crate::core::models::error::TemplateError;
use crate::core::models::ids::AtomId;
use crate::core::models::residue::ResidueKind;
use crate::core::models::structure::{Structure, StructureBuilder};
use crate::core::models::template::{PeriodicBox, ResidueTemplate};
use crate::core::models::topology::BondOrder;
use nalgebra::Point3;
use phf::{Map, phf_map};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::{debug, instrument};

const FORMAT: &str = "Mol2";
const MAX_CONNECTIONS: usize = 4;
const UNNAMED: &str = "****";

/// Tripos Mol2 codec. Head, tail and connection atoms are not written.
pub struct Mol2File;

/// Mol2 extended with `HEADTAIL` and `RESIDUECONNECT` records, so attachment
/// points survive a round trip.
pub struct Mol3File;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    Molecule,
    Atom,
    Bond,
    Substructure,
    Crysin,
    HeadTail,
    ResidueConnect,
    Other,
}

static RECORDS: Map<&'static str, Record> = phf_map! {
    "MOLECULE" => Record::Molecule,
    "ATOM" => Record::Atom,
    "BOND" => Record::Bond,
    "SUBSTRUCTURE" => Record::Substructure,
    "CRYSIN" => Record::Crysin,
    "HEADTAIL" => Record::HeadTail,
    "RESIDUECONNECT" => Record::ResidueConnect,
};

struct AtomLine {
    id: usize,
    atom: Atom,
    subst_id: usize,
    subst_name: Option<String>,
}

struct BondLine {
    line: usize,
    origin: usize,
    target: usize,
    order: BondOrder,
}

/// An attachment atom named in a `HEADTAIL` row.
struct NamedAtom {
    line: usize,
    name: String,
    residue: usize,
}

struct ResidueConnectLine {
    line: usize,
    residue: usize,
    head: Option<String>,
    tail: Option<String>,
    connections: Vec<String>,
}

#[derive(Default)]
struct MoleculeBlock {
    line: usize,
    name: String,
    counts: Option<(usize, Option<usize>)>,
    kind: ResidueKind,
    charge_type: String,
    header_lines: usize,
    atoms: Vec<AtomLine>,
    bonds: Vec<BondLine>,
    substructures: HashMap<usize, String>,
    periodic_box: Option<PeriodicBox>,
    headtail_lines: usize,
    head: Option<NamedAtom>,
    tail: Option<NamedAtom>,
    residue_connect: Vec<ResidueConnectLine>,
}

fn field<T: FromStr>(tokens: &[&str], idx: usize, line: usize, what: &str) -> Result<T, IoError> {
    let raw = tokens
        .get(idx)
        .ok_or_else(|| IoError::parse(FORMAT, line, format!("missing {}", what)))?;
    raw.parse()
        .map_err(|_| IoError::parse(FORMAT, line, format!("invalid {} '{}'", what, raw)))
}

/// `****` stands for an empty molecule or substructure name.
fn label(name: &str) -> &str {
    if name.is_empty() { UNNAMED } else { name }
}

fn unlabel(token: &str) -> String {
    if token == UNNAMED { String::new() } else { token.to_string() }
}

/// `0` stands for an absent attachment atom.
fn attachment(token: Option<&&str>) -> Option<String> {
    token.filter(|&&t| t != "0").map(|t| t.to_string())
}

impl MoleculeBlock {
    fn declares_charges(&self) -> bool {
        !self.charge_type.is_empty() && !self.charge_type.eq_ignore_ascii_case("NO_CHARGES")
    }

    fn parse_line(&mut self, record: Record, trimmed: &str, line: usize) -> Result<(), IoError> {
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        match record {
            Record::Molecule => {
                match self.header_lines {
                    0 if trimmed != UNNAMED => self.name = trimmed.to_string(),
                    1 => {
                        let bonds = match tokens.get(1) {
                            Some(_) => Some(field(&tokens, 1, line, "bond count")?),
                            None => None,
                        };
                        self.counts = Some((field(&tokens, 0, line, "atom count")?, bonds));
                    }
                    2 => self.kind = trimmed.parse().unwrap_or_default(),
                    3 => self.charge_type = trimmed.to_string(),
                    _ => {}
                }
                self.header_lines += 1;
            }
            Record::Atom => {
                let name: String = field(&tokens, 1, line, "atom name")?;
                let atom_type: String = field(&tokens, 5, line, "atom type")?;
                let position: Point3<f64> = Point3::new(
                    field(&tokens, 2, line, "x coordinate")?,
                    field(&tokens, 3, line, "y coordinate")?,
                    field(&tokens, 4, line, "z coordinate")?,
                );
                let charge = match tokens.get(8) {
                    Some(_) => field(&tokens, 8, line, "charge")?,
                    None if self.declares_charges() => {
                        return Err(IoError::parse(
                            FORMAT,
                            line,
                            format!("missing charge for {} molecule", self.charge_type),
                        ));
                    }
                    None => 0.0,
                };
                let subst_id = match tokens.get(6) {
                    Some(_) => field(&tokens, 6, line, "substructure id")?,
                    None => 1,
                };
                self.atoms.push(AtomLine {
                    id: field(&tokens, 0, line, "atom id")?,
                    atom: Atom::new(&name, &atom_type)
                        .with_atomic_number(guess_atomic_number(&name, &atom_type))
                        .with_charge(charge)
                        .with_position(position),
                    subst_id,
                    subst_name: tokens.get(7).map(|t| unlabel(t)),
                });
            }
            Record::Bond => {
                let code: String = field(&tokens, 3, line, "bond type")?;
                self.bonds.push(BondLine {
                    line,
                    origin: field(&tokens, 1, line, "origin atom id")?,
                    target: field(&tokens, 2, line, "target atom id")?,
                    order: code
                        .parse()
                        .map_err(|e| IoError::parse(FORMAT, line, format!("{}", e)))?,
                });
            }
            Record::Substructure => {
                let name: String = field(&tokens, 1, line, "substructure name")?;
                self.substructures
                    .insert(field(&tokens, 0, line, "substructure id")?, unlabel(&name));
            }
            Record::Crysin => {
                let mut values = [0.0; 6];
                for (idx, value) in values.iter_mut().enumerate() {
                    *value = field(&tokens, idx, line, "cell parameter")?;
                }
                self.periodic_box = Some(PeriodicBox::new(
                    [values[0], values[1], values[2]],
                    [values[3], values[4], values[5]],
                ));
            }
            Record::HeadTail => {
                let named = match attachment(tokens.first()) {
                    Some(name) => Some(NamedAtom {
                        line,
                        name,
                        residue: field(&tokens, 1, line, "residue number")?,
                    }),
                    None => None,
                };
                match self.headtail_lines {
                    0 => self.head = named,
                    1 => self.tail = named,
                    _ => {}
                }
                self.headtail_lines += 1;
            }
            Record::ResidueConnect => {
                self.residue_connect.push(ResidueConnectLine {
                    line,
                    residue: field(&tokens, 0, line, "residue number")?,
                    head: attachment(tokens.get(1)),
                    tail: attachment(tokens.get(2)),
                    connections: (3..7).filter_map(|idx| attachment(tokens.get(idx))).collect(),
                });
            }
            Record::Other => {}
        }
        Ok(())
    }

    /// Groups atoms into residues by substructure id and resolves bonds.
    ///
    /// Returns the structure together with the substructure id of every residue.
    fn build_structure(&self) -> Result<(Structure, Vec<usize>), IoError> {
        if let Some((atoms, bonds)) = self.counts {
            let bonds = bonds.unwrap_or(self.bonds.len());
            if atoms != self.atoms.len() || bonds != self.bonds.len() {
                return Err(IoError::parse(
                    FORMAT,
                    self.line,
                    format!(
                        "molecule '{}' declares {} atoms and {} bonds but lists {} and {}",
                        self.name,
                        atoms,
                        bonds,
                        self.atoms.len(),
                        self.bonds.len()
                    ),
                ));
            }
        }

        let mut builder = StructureBuilder::new();
        let mut id_map = HashMap::with_capacity(self.atoms.len());
        let mut residue_ids = Vec::new();
        for line in &self.atoms {
            if residue_ids.last() != Some(&line.subst_id) {
                let name = line
                    .subst_name
                    .as_deref()
                    .or_else(|| self.substructures.get(&line.subst_id).map(String::as_str))
                    .unwrap_or(&self.name);
                builder.start_residue(name, self.kind);
                residue_ids.push(line.subst_id);
            }
            id_map.insert(line.id, builder.atom_count());
            builder.add_atom(line.atom.clone());
        }

        for bond in &self.bonds {
            let resolve = |id: usize| {
                id_map.get(&id).copied().ok_or_else(|| {
                    IoError::parse(FORMAT, bond.line, format!("bond references unknown atom id {}", id))
                })
            };
            builder.add_bond(resolve(bond.origin)?, resolve(bond.target)?, bond.order);
        }
        if let Some(periodic_box) = self.periodic_box {
            builder.periodic_box(periodic_box);
        }
        Ok((builder.build(), residue_ids))
    }

    fn into_unit(self, config: &CodecConfig, report: &mut ReadReport) -> Result<Unit, IoError> {
        let (structure, residue_ids) = self.build_structure()?;
        let mut templates = Vec::with_capacity(residue_ids.len());
        for r in 0..residue_ids.len() {
            let template = ResidueTemplate::from_residue(&structure, r).map_err(|e| {
                IoError::template(format!("residue {} of molecule '{}'", r + 1, self.name), e)
            })?;
            templates.push(template);
        }

        let position = |residue: usize, line: usize| {
            residue_ids.iter().position(|&id| id == residue).ok_or_else(|| {
                IoError::parse(FORMAT, line, format!("unknown residue number {}", residue))
            })
        };
        if let Some(head) = &self.head {
            let template = &mut templates[position(head.residue, head.line)?];
            let id = named(template, &head.name, head.line)?;
            template.set_head(id).map_err(|e| IoError::template(&self.name, e))?;
        }
        if let Some(tail) = &self.tail {
            let template = &mut templates[position(tail.residue, tail.line)?];
            let id = named(template, &tail.name, tail.line)?;
            template.set_tail(id).map_err(|e| IoError::template(&self.name, e))?;
        }
        for row in &self.residue_connect {
            let template = &mut templates[position(row.residue, row.line)?];
            apply_residue_connect(template, row).map_err(|e| IoError::template(&self.name, e))?;
        }

        match templates.len() {
            0 => Err(IoError::parse(
                FORMAT,
                self.line,
                format!("molecule '{}' has no atoms", self.name),
            )),
            1 => {
                let mut template = templates.remove(0);
                template.name = self.name;
                template.periodic_box = structure.periodic_box;
                Ok(Unit::from(template))
            }
            _ => {
                let mut container = ResidueTemplateContainer::new(&self.name);
                container.periodic_box = structure.periodic_box;
                for template in templates {
                    container.push(template);
                }
                check_consistency(&container, config, report)?;
                Ok(Unit::Multi(container))
            }
        }
    }
}

fn named(template: &ResidueTemplate, name: &str, line: usize) -> Result<AtomId, IoError> {
    template.id_by_name(name).ok_or_else(|| {
        IoError::parse(
            FORMAT,
            line,
            format!("residue '{}' has no atom named '{}'", template.name, name),
        )
    })
}

fn apply_residue_connect(
    template: &mut ResidueTemplate,
    row: &ResidueConnectLine,
) -> Result<(), TemplateError> {
    let lookup = |name: &str| {
        template
            .id_by_name(name)
            .ok_or_else(|| TemplateError::UnknownAtom {
                template: template.name.clone(),
                reference: format!("named '{}'", name),
            })
    };
    let head = row.head.as_deref().map(lookup).transpose()?;
    let tail = row.tail.as_deref().map(lookup).transpose()?;
    let connections = row
        .connections
        .iter()
        .map(|name| lookup(name))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(head) = head {
        template.set_head(head)?;
    }
    if let Some(tail) = tail {
        template.set_tail(tail)?;
    }
    if !connections.is_empty() {
        template.clear_connections();
        for id in connections {
            template.add_connection(id)?;
        }
    }
    Ok(())
}

fn parse_blocks(reader: &mut impl BufRead) -> Result<Vec<MoleculeBlock>, IoError> {
    let mut blocks: Vec<MoleculeBlock> = Vec::new();
    let mut record = Record::Other;
    for (idx, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let line_num = idx + 1;
        let trimmed = line.trim();
        // Header lines of a MOLECULE record are positional, so blank ones count.
        if trimmed.starts_with('#') || (trimmed.is_empty() && record != Record::Molecule) {
            continue;
        }

        if let Some(tag) = trimmed.strip_prefix("@<TRIPOS>") {
            record = RECORDS.get(tag.trim()).copied().unwrap_or(Record::Other);
            if record == Record::Molecule {
                blocks.push(MoleculeBlock {
                    line: line_num,
                    ..MoleculeBlock::default()
                });
            }
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            return Err(IoError::parse(
                FORMAT,
                line_num,
                "data before the first @<TRIPOS>MOLECULE record",
            ));
        };
        block.parse_line(record, trimmed, line_num)?;
    }
    Ok(blocks)
}

fn read_unit(reader: &mut impl BufRead, config: &CodecConfig) -> Result<(Unit, ReadReport), IoError> {
    let blocks = parse_blocks(reader)?;
    let mut report = ReadReport::default();
    let count = blocks.len();
    let unit = match count {
        0 => return Err(IoError::parse(FORMAT, 1, "no @<TRIPOS>MOLECULE record")),
        1 => {
            let mut blocks = blocks;
            blocks.remove(0).into_unit(config, &mut report)?
        }
        _ => {
            let mut container = ResidueTemplateContainer::new("");
            for block in blocks {
                container.push(block.into_unit(config, &mut report)?);
            }
            Unit::Multi(container)
        }
    };
    debug!(records = count, "Read Mol2 file.");
    Ok((unit, report))
}

impl Mol2File {
    /// Reads a file holding exactly one molecule record as a raw [`Structure`],
    /// keeping bonds between its substructures.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MultiRecord`] when the file holds several records.
    pub fn read_structure(reader: &mut impl BufRead) -> Result<Structure, IoError> {
        let mut blocks = parse_blocks(reader)?;
        match blocks.len() {
            0 => Err(IoError::parse(FORMAT, 1, "no @<TRIPOS>MOLECULE record")),
            1 => Ok(blocks.remove(0).build_structure()?.0),
            count => Err(IoError::MultiRecord { count }),
        }
    }
}

impl TemplateFile for Mol2File {
    type Content = Unit;
    type Error = IoError;

    #[instrument(skip_all, name = "mol2_read")]
    fn read_from(reader: &mut impl BufRead, config: &CodecConfig) -> Result<(Unit, ReadReport), IoError> {
        read_unit(reader, config)
    }

    fn write_to(unit: &Unit, config: &CodecConfig, writer: &mut impl Write) -> Result<(), IoError> {
        write_unit(unit, config, writer, false)
    }
}

impl TemplateFile for Mol3File {
    type Content = Unit;
    type Error = IoError;

    #[instrument(skip_all, name = "mol3_read")]
    fn read_from(reader: &mut impl BufRead, config: &CodecConfig) -> Result<(Unit, ReadReport), IoError> {
        read_unit(reader, config)
    }

    fn write_to(unit: &Unit, config: &CodecConfig, writer: &mut impl Write) -> Result<(), IoError> {
        write_unit(unit, config, writer, true)
    }
}

/// Records written for a unit: an unnamed container yields one record per
/// member, anything else a single record.
pub(crate) fn entries_of(unit: &Unit) -> Vec<EntryView<'_>> {
    match unit {
        Unit::Single(template) => vec![EntryView::single(&template.name, template)],
        Unit::Multi(container) if container.name.is_empty() => EntryView::of_members(container),
        Unit::Multi(container) => vec![EntryView::of_unit(&container.name, unit)],
    }
}

fn write_unit(unit: &Unit, config: &CodecConfig, writer: &mut impl Write, extended: bool) -> Result<(), IoError> {
    write_entries(&entries_of(unit), config, writer, extended)
}

pub(crate) fn write_entries(
    entries: &[EntryView<'_>],
    config: &CodecConfig,
    writer: &mut impl Write,
    extended: bool,
) -> Result<(), IoError> {
    if extended {
        for residue in entries.iter().flat_map(|entry| entry.residues.iter()) {
            if residue.connections().len() > MAX_CONNECTIONS {
                return Err(IoError::TooManyConnections {
                    residue: residue.name.clone(),
                    count: residue.connections().len(),
                    max: MAX_CONNECTIONS,
                });
            }
        }
    }
    for entry in entries {
        write_record(entry, config, writer, extended)?;
    }
    Ok(())
}

fn attachment_name(residue: &ResidueTemplate, id: Option<AtomId>) -> String {
    id.and_then(|id| residue.atom(id))
        .map_or_else(|| "0".to_string(), |atom| atom.name.clone())
}

fn write_record(
    entry: &EntryView<'_>,
    config: &CodecConfig,
    writer: &mut impl Write,
    extended: bool,
) -> Result<(), IoError> {
    let residues = &entry.residues;
    let precision = config.position_precision;
    let mut offsets = Vec::with_capacity(residues.len());
    let mut total = 0;
    for residue in residues {
        offsets.push(total);
        total += residue.len();
    }

    // Tail of each residue bonded to the head of the next one.
    let links: Vec<(usize, usize)> = residues
        .windows(2)
        .enumerate()
        .filter_map(|(r, pair)| {
            let tail = pair[0].tail_index()?;
            let head = pair[1].head_index()?;
            Some((offsets[r] + tail + 1, offsets[r + 1] + head + 1))
        })
        .collect();
    let bond_count = residues.iter().map(|r| r.bonds().len()).sum::<usize>() + links.len();
    let kind = residues.first().map_or(ResidueKind::Unknown, |r| r.kind);
    let name = label(entry.name);

    writeln!(writer, "@<TRIPOS>MOLECULE")?;
    writeln!(writer, "{}", name)?;
    writeln!(writer, "{:>5} {:>5} {:>5} 0 0", total, bond_count, residues.len())?;
    writeln!(writer, "{}", kind.mol2_molecule_type())?;
    writeln!(writer, "USER_CHARGES")?;
    writeln!(writer)?;

    writeln!(writer, "@<TRIPOS>ATOM")?;
    for (r, residue) in residues.iter().enumerate() {
        for (local, atom) in residue.iter().enumerate() {
            writeln!(
                writer,
                "{:>7} {:<8} {:>10.*} {:>10.*} {:>10.*} {:<6} {:>3} {:<8} {:>10}",
                offsets[r] + local + 1,
                atom.name,
                precision,
                atom.position.x,
                precision,
                atom.position.y,
                precision,
                atom.position.z,
                atom.atom_type,
                r + 1,
                label(&residue.name),
                config.format_charge(atom.charge)
            )?;
        }
    }

    writeln!(writer, "@<TRIPOS>BOND")?;
    let mut bond_id = 0;
    for (r, residue) in residues.iter().enumerate() {
        for bond in residue.bonds() {
            if let (Some(a), Some(b)) = (residue.index_of(bond.atom1), residue.index_of(bond.atom2)) {
                bond_id += 1;
                writeln!(
                    writer,
                    "{:>7} {:>4} {:>4} {}",
                    bond_id,
                    offsets[r] + a + 1,
                    offsets[r] + b + 1,
                    bond.order.sybyl_code()
                )?;
            }
        }
    }
    for &(a, b) in &links {
        bond_id += 1;
        writeln!(writer, "{:>7} {:>4} {:>4} {}", bond_id, a, b, BondOrder::Single.sybyl_code())?;
    }

    writeln!(writer, "@<TRIPOS>SUBSTRUCTURE")?;
    for (r, residue) in residues.iter().enumerate() {
        let inter_bonds = links
            .iter()
            .filter(|&&(a, b)| {
                let inside = |idx: usize| idx > offsets[r] && idx <= offsets[r] + residue.len();
                inside(a) || inside(b)
            })
            .count();
        writeln!(
            writer,
            "{:>7} {:<8} {:>7} RESIDUE {:>5} **** {:<8} {:>3} ROOT",
            r + 1,
            label(&residue.name),
            offsets[r] + 1,
            1,
            label(&residue.name),
            inter_bonds
        )?;
    }

    if let Some(periodic_box) = entry.periodic_box {
        let (l, a) = (periodic_box.lengths, periodic_box.angles);
        writeln!(writer, "@<TRIPOS>CRYSIN")?;
        writeln!(writer, "{} {} {} {} {} {} 1 1", l.x, l.y, l.z, a.x, a.y, a.z)?;
    }

    if extended {
        writeln!(writer, "@<TRIPOS>HEADTAIL")?;
        match residues.first().and_then(|first| first.head()) {
            Some(head) => writeln!(writer, "{} 1", head.name)?,
            None => writeln!(writer, "0 0")?,
        }
        match residues.last().and_then(|last| last.tail()) {
            Some(tail) => writeln!(writer, "{} {}", tail.name, residues.len())?,
            None => writeln!(writer, "0 0")?,
        }

        writeln!(writer, "@<TRIPOS>RESIDUECONNECT")?;
        for (r, residue) in residues.iter().enumerate() {
            let mut row = vec![
                (r + 1).to_string(),
                attachment_name(residue, residue.head_id()),
                attachment_name(residue, residue.tail_id()),
            ];
            for slot in 0..MAX_CONNECTIONS {
                row.push(attachment_name(residue, residue.connections().get(slot).copied()));
            }
            writeln!(writer, "{}", row.join(" "))?;
        }
    }
    Ok(())
}
