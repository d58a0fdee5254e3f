use super::entry::EntryView;
use super::error::{IoError, ReadReport};
use super::traits::TemplateFile;
use crate::core::config::CodecConfig;
use crate::core::models::atom::Atom;
use crate::core::models::container::{ResidueTemplateContainer, Unit};
use crate::core::models::error::TemplateError;
use crate::core::models::library::Library;
use crate::core::models::residue::ResidueKind;
use crate::core::models::structure::StructureBuilder;
use crate::core::models::template::{PeriodicBox, ResidueTemplate};
use crate::core::models::topology::BondOrder;
use nalgebra::{Point3, Vector3};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::{debug, instrument};

const FORMAT: &str = "OFF library";
const ATOM_FLAGS: u32 = 131072;
const MAX_CONNECTIONS: usize = 4;

/// Amber Object File Format library codec.
///
/// Units holding a single residue decode to [`Unit::Single`]; units holding
/// several residues (solvent boxes) decode to [`Unit::Multi`] whose members
/// share the unit's box.
pub struct OffLibraryFile;

#[derive(Debug, Default)]
struct Section {
    line: usize,
    rows: Vec<(usize, String)>,
}

type UnitSections = HashMap<String, Section>;

enum Block {
    None,
    Index,
    Field { unit: String, field: String },
}

struct OffAtom {
    name: String,
    atom_type: String,
    resx: usize,
    atomic_number: u8,
    charge: f64,
}

struct OffResidue {
    name: String,
    kind: ResidueKind,
}

fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            tokens.push(&quoted[..end]);
            rest = quoted.get(end + 1..).unwrap_or("").trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            tokens.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }
    }
    tokens
}

fn column<T: FromStr>(tokens: &[&str], idx: usize, line: usize, what: &str) -> Result<T, IoError> {
    let raw = tokens
        .get(idx)
        .ok_or_else(|| IoError::parse(FORMAT, line, format!("missing column '{}'", what)))?;
    raw.parse()
        .map_err(|_| IoError::parse(FORMAT, line, format!("invalid {} '{}'", what, raw)))
}

fn required<'s>(sections: &'s UnitSections, unit: &str, field: &str) -> Result<&'s Section, IoError> {
    sections.get(field).ok_or_else(|| IoError::MissingSection {
        unit: unit.to_string(),
        section: field.to_string(),
    })
}

fn array_values<T: FromStr>(section: &Section, what: &str) -> Result<Vec<T>, IoError> {
    let mut values = Vec::new();
    for (line, row) in &section.rows {
        let tokens = tokenize(row);
        for idx in 0..tokens.len() {
            values.push(column(&tokens, idx, *line, what)?);
        }
    }
    Ok(values)
}

fn vectors(section: &Section, expected: usize, what: &str) -> Result<Vec<Vector3<f64>>, IoError> {
    if section.rows.len() != expected {
        return Err(IoError::parse(
            FORMAT,
            section.line,
            format!("{} has {} rows but the unit has {} atoms", what, section.rows.len(), expected),
        ));
    }
    section
        .rows
        .iter()
        .map(|(line, row)| {
            let tokens = tokenize(row);
            Ok(Vector3::new(
                column(&tokens, 0, *line, what)?,
                column(&tokens, 1, *line, what)?,
                column(&tokens, 2, *line, what)?,
            ))
        })
        .collect()
}

fn atom_index(raw: usize, count: usize, line: usize) -> Result<usize, IoError> {
    if raw == 0 || raw > count {
        return Err(IoError::parse(
            FORMAT,
            line,
            format!("atom index {} is outside 1..={}", raw, count),
        ));
    }
    Ok(raw - 1)
}

impl TemplateFile for OffLibraryFile {
    type Content = Library;
    type Error = IoError;

    #[instrument(skip_all, name = "off_read")]
    fn read_from(
        reader: &mut impl BufRead,
        config: &CodecConfig,
    ) -> Result<(Library, ReadReport), IoError> {
        let mut names: Vec<String> = Vec::new();
        let mut sections: HashMap<String, UnitSections> = HashMap::new();
        let mut block = Block::None;
        let mut seen_index = false;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            if line.trim().is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('!') {
                if header.starts_with("!index") {
                    block = Block::Index;
                    seen_index = true;
                    continue;
                }
                let key = header.split_whitespace().next().unwrap_or("");
                let (unit, field) = key
                    .strip_prefix("entry.")
                    .and_then(|path| path.rfind(".unit.").map(|at| (&path[..at], &path[at + 6..])))
                    .ok_or_else(|| {
                        IoError::parse(FORMAT, line_num, format!("unrecognized section header '{}'", key))
                    })?;
                sections.entry(unit.to_string()).or_default().insert(
                    field.to_string(),
                    Section {
                        line: line_num,
                        rows: Vec::new(),
                    },
                );
                block = Block::Field {
                    unit: unit.to_string(),
                    field: field.to_string(),
                };
                continue;
            }

            match &block {
                Block::Index => {
                    if let Some(name) = tokenize(&line).first() {
                        names.push(name.to_string());
                    }
                }
                Block::Field { unit, field } => {
                    if let Some(section) = sections.get_mut(unit).and_then(|s| s.get_mut(field)) {
                        section.rows.push((line_num, line));
                    }
                }
                Block::None => {
                    return Err(IoError::parse(FORMAT, line_num, "data outside of any section"));
                }
            }
        }

        if !seen_index {
            return Err(IoError::parse(FORMAT, 1, "missing '!!index array str' block"));
        }

        let mut library = Library::new();
        let mut report = ReadReport::default();
        for name in names {
            let unit_sections = sections.remove(&name).unwrap_or_default();
            let unit = read_unit(&name, &unit_sections, config, &mut report)?;
            library.insert(&name, unit);
        }
        debug!(units = library.len(), warnings = report.warnings.len(), "Read OFF library.");
        Ok((library, report))
    }

    fn write_to(library: &Library, config: &CodecConfig, writer: &mut impl Write) -> Result<(), IoError> {
        write_entries(&EntryView::of_library(library), config, writer)
    }
}

fn read_unit(
    name: &str,
    sections: &UnitSections,
    config: &CodecConfig,
    report: &mut ReadReport,
) -> Result<Unit, IoError> {
    let atoms = read_atoms(required(sections, name, "atoms")?)?;
    let positions = vectors(required(sections, name, "positions")?, atoms.len(), "positions")?;
    let velocities = match sections.get("velocities") {
        Some(section) => vectors(section, atoms.len(), "velocities")?,
        None => vec![Vector3::zeros(); atoms.len()],
    };
    let residues = match sections.get("residues") {
        Some(section) => read_residues(section)?,
        None => Vec::new(),
    };
    let bonds = match sections.get("connectivity") {
        Some(section) => read_bonds(section, atoms.len())?,
        None => Vec::new(),
    };
    let connect: Vec<usize> = match sections.get("connect") {
        Some(section) => array_values(section, "connect index")?,
        None => Vec::new(),
    };
    let residue_connect = match sections.get("residueconnect") {
        Some(section) => read_residue_connect(section)?,
        None => Vec::new(),
    };
    let periodic_box = match sections.get("boundbox") {
        Some(section) => read_box(section)?,
        None => None,
    };

    let records: Vec<Atom> = atoms
        .iter()
        .zip(positions.iter().zip(&velocities))
        .map(|(atom, (position, velocity))| {
            let mut record = Atom::new(&atom.name, &atom.atom_type)
                .with_atomic_number(atom.atomic_number)
                .with_charge(atom.charge)
                .with_position(Point3::from(*position));
            record.velocity = *velocity;
            record
        })
        .collect();

    if residues.len() <= 1 {
        let kind = residues.first().map_or(ResidueKind::Unknown, |r| r.kind);
        let mut template = ResidueTemplate::new(name).with_kind(kind);
        template.periodic_box = periodic_box;
        let context = || format!("unit '{}'", name);
        for record in records {
            template
                .add_atom(record)
                .map_err(|e| IoError::template(context(), e))?;
        }
        for &(a, b, order) in &bonds {
            template
                .add_bond_with_order(a, b, order)
                .map_err(|e| IoError::template(context(), e))?;
        }
        if let Some(&head) = connect.first().filter(|&&h| h > 0) {
            template
                .set_head(head - 1)
                .map_err(|e| IoError::template(context(), e))?;
        }
        if let Some(&tail) = connect.get(1).filter(|&&t| t > 0) {
            template
                .set_tail(tail - 1)
                .map_err(|e| IoError::template(context(), e))?;
        }
        if let Some(row) = residue_connect.first() {
            for &c in row[2..].iter().filter(|&&c| c > 0) {
                template
                    .add_connection(c - 1)
                    .map_err(|e| IoError::template(context(), e))?;
            }
        }
        return Ok(Unit::from(template));
    }

    let mut builder = StructureBuilder::new();
    let mut global = vec![0usize; records.len()];
    for (r, residue) in residues.iter().enumerate() {
        builder.start_residue(&residue.name, residue.kind);
        for (i, (atom, record)) in atoms.iter().zip(&records).enumerate() {
            if atom.resx == r + 1 {
                global[i] = builder.atom_count();
                builder.add_atom(record.clone());
            }
        }
    }
    if builder.atom_count() != records.len() {
        return Err(IoError::parse(
            FORMAT,
            required(sections, name, "atoms")?.line,
            format!("unit '{}' has atoms outside its {} residues", name, residues.len()),
        ));
    }
    for &(a, b, order) in &bonds {
        builder.add_bond(global[a], global[b], order);
    }
    builder.end_residue();
    let structure = builder.build();

    let mut container = ResidueTemplateContainer::new(name);
    container.periodic_box = periodic_box;
    for r in 0..residues.len() {
        let context = || format!("residue {} of unit '{}'", r + 1, name);
        let mut template = ResidueTemplate::from_residue(&structure, r)
            .map_err(|e| IoError::template(context(), e))?;
        if let Some(row) = residue_connect.get(r) {
            apply_residue_connect(&mut template, row).map_err(|e| IoError::template(context(), e))?;
        }
        container.push(template);
    }
    check_consistency(&container, config, report)?;
    Ok(Unit::Multi(container))
}

fn apply_residue_connect(
    template: &mut ResidueTemplate,
    row: &[usize; 6],
) -> Result<(), TemplateError> {
    if row[0] > 0 {
        template.set_head(row[0] - 1)?;
    }
    if row[1] > 0 {
        template.set_tail(row[1] - 1)?;
    }
    if row[2..].iter().any(|&c| c > 0) {
        template.clear_connections();
        for &c in row[2..].iter().filter(|&&c| c > 0) {
            template.add_connection(c - 1)?;
        }
    }
    Ok(())
}

fn read_atoms(section: &Section) -> Result<Vec<OffAtom>, IoError> {
    section
        .rows
        .iter()
        .map(|(line, row)| {
            let tokens = tokenize(row);
            let element: i32 = column(&tokens, 6, *line, "elmnt")?;
            Ok(OffAtom {
                name: column(&tokens, 0, *line, "name")?,
                atom_type: column(&tokens, 1, *line, "type")?,
                resx: column(&tokens, 3, *line, "resx")?,
                atomic_number: u8::try_from(element).unwrap_or(0),
                charge: column(&tokens, 7, *line, "chg")?,
            })
        })
        .collect()
}

fn read_residues(section: &Section) -> Result<Vec<OffResidue>, IoError> {
    section
        .rows
        .iter()
        .map(|(line, row)| {
            let tokens = tokenize(row);
            let tag: String = column(&tokens, 4, *line, "restype")?;
            Ok(OffResidue {
                name: column(&tokens, 0, *line, "residue name")?,
                kind: ResidueKind::from_off_tag(&tag),
            })
        })
        .collect()
}

fn read_bonds(section: &Section, count: usize) -> Result<Vec<(usize, usize, BondOrder)>, IoError> {
    section
        .rows
        .iter()
        .map(|(line, row)| {
            let tokens = tokenize(row);
            let a = atom_index(column(&tokens, 0, *line, "atom1x")?, count, *line)?;
            let b = atom_index(column(&tokens, 1, *line, "atom2x")?, count, *line)?;
            let flag: u32 = column(&tokens, 2, *line, "flags")?;
            Ok((a, b, BondOrder::from_off_flag(flag)))
        })
        .collect()
}

fn read_residue_connect(section: &Section) -> Result<Vec<[usize; 6]>, IoError> {
    section
        .rows
        .iter()
        .map(|(line, row)| {
            let tokens = tokenize(row);
            let mut values = [0usize; 6];
            for (idx, value) in values.iter_mut().enumerate() {
                *value = column(&tokens, idx, *line, "residueconnect index")?;
            }
            Ok(values)
        })
        .collect()
}

fn read_box(section: &Section) -> Result<Option<PeriodicBox>, IoError> {
    let values: Vec<f64> = array_values(section, "boundbox value")?;
    match values.as_slice() {
        [flag, angle, a, b, c, ..] if *flag > 0.0 => {
            Ok(Some(PeriodicBox::new([*a, *b, *c], [*angle; 3])))
        }
        [_, _, _, _, _, ..] => Ok(None),
        _ => Err(IoError::parse(
            FORMAT,
            section.line,
            format!("boundbox needs 5 values, found {}", values.len()),
        )),
    }
}

fn partner_names(template: &ResidueTemplate, index: usize) -> BTreeSet<&str> {
    template
        .bond_partners(index)
        .iter()
        .filter_map(|&id| template.atom(id))
        .map(|atom| atom.name.as_str())
        .collect()
}

/// Describes the first difference between `candidate` and `reference`, if any.
fn compare_subunits(reference: &ResidueTemplate, candidate: &ResidueTemplate, tolerance: f64) -> Option<String> {
    if reference.len() != candidate.len() {
        return Some(format!(
            "has {} atoms, expected {}",
            candidate.len(),
            reference.len()
        ));
    }
    for (idx, (a, b)) in reference.iter().zip(candidate.iter()).enumerate() {
        if a.name != b.name {
            return Some(format!("atom {} is named '{}', expected '{}'", idx + 1, b.name, a.name));
        }
        if a.atom_type != b.atom_type {
            return Some(format!("atom '{}' has type '{}', expected '{}'", b.name, b.atom_type, a.atom_type));
        }
        if a.atomic_number != b.atomic_number {
            return Some(format!(
                "atom '{}' has atomic number {}, expected {}",
                b.name, b.atomic_number, a.atomic_number
            ));
        }
        if (a.charge - b.charge).abs() > tolerance {
            return Some(format!("atom '{}' has charge {}, expected {}", b.name, b.charge, a.charge));
        }
        if partner_names(reference, idx) != partner_names(candidate, idx) {
            return Some(format!("atom '{}' has different bond partners", b.name));
        }
    }
    None
}

pub(crate) fn check_consistency(
    container: &ResidueTemplateContainer,
    config: &CodecConfig,
    report: &mut ReadReport,
) -> Result<(), IoError> {
    let templates = container.templates();
    let Some(first) = templates.first() else {
        return Ok(());
    };

    let mut inconsistent = 0;
    for (idx, template) in templates.iter().enumerate().skip(1) {
        if template.name != first.name {
            continue;
        }
        if let Some(details) = compare_subunits(first, template, config.charge_tolerance) {
            inconsistent += 1;
            report.warn(&container.name, idx, details);
        }
    }

    if let Some(limit) = config.max_inconsistent_subunits {
        if inconsistent > limit {
            return Err(IoError::InconsistentUnit {
                unit: container.name.clone(),
                count: inconsistent,
                limit,
            });
        }
    }
    Ok(())
}

pub(crate) fn write_entries(
    entries: &[EntryView<'_>],
    config: &CodecConfig,
    writer: &mut impl Write,
) -> Result<(), IoError> {
    for entry in entries {
        for residue in &entry.residues {
            if residue.connections().len() > MAX_CONNECTIONS {
                return Err(IoError::TooManyConnections {
                    residue: residue.name.clone(),
                    count: residue.connections().len(),
                    max: MAX_CONNECTIONS,
                });
            }
        }
    }

    writeln!(writer, "!!index array str")?;
    for entry in entries {
        writeln!(writer, " \"{}\"", entry.name)?;
    }
    for entry in entries {
        write_unit(entry, config, writer)?;
    }
    Ok(())
}

fn write_unit(entry: &EntryView<'_>, config: &CodecConfig, writer: &mut impl Write) -> Result<(), IoError> {
    let name = entry.name;
    let precision = config.position_precision;
    let mut offsets = Vec::with_capacity(entry.residues.len());
    let mut total = 0;
    for residue in &entry.residues {
        offsets.push(total);
        total += residue.len();
    }
    // 1-based unit-wide index of an atom given its residue and local index.
    let unit_index = |r: usize, local: usize| offsets[r] + local + 1;

    writeln!(
        writer,
        "!entry.{}.unit.atoms table  str name  str type  int typex  int resx  int flags  int seq  int elmnt  dbl chg",
        name
    )?;
    for (r, residue) in entry.residues.iter().enumerate() {
        for (local, atom) in residue.iter().enumerate() {
            writeln!(
                writer,
                " \"{}\" \"{}\" 0 {} {} {} {} {}",
                atom.name,
                atom.atom_type,
                r + 1,
                ATOM_FLAGS,
                unit_index(r, local),
                atom.atomic_number,
                config.format_charge(atom.charge)
            )?;
        }
    }

    writeln!(
        writer,
        "!entry.{}.unit.atomspertinfo table  str pname  str ptype  int ptypex  int pelmnt  dbl pchg",
        name
    )?;
    for residue in &entry.residues {
        for atom in residue.iter() {
            writeln!(writer, " \"{}\" \"{}\" 0 -1 0.0", atom.name, atom.atom_type)?;
        }
    }

    writeln!(writer, "!entry.{}.unit.boundbox array dbl", name)?;
    match entry.periodic_box {
        Some(periodic_box) => {
            writeln!(writer, " 1.000000")?;
            writeln!(writer, " {}", periodic_box.angles.x)?;
            for length in periodic_box.lengths.iter() {
                writeln!(writer, " {}", length)?;
            }
        }
        None => {
            writeln!(writer, " -1.000000")?;
            for _ in 0..4 {
                writeln!(writer, " 0.0")?;
            }
        }
    }

    writeln!(writer, "!entry.{}.unit.childsequence single int", name)?;
    writeln!(writer, " {}", entry.residues.len() + 1)?;

    let head = entry.residues.first().and_then(|first| first.head_index()).map_or(0, |i| unit_index(0, i));
    let last = entry.residues.len().saturating_sub(1);
    let tail = entry.residues.last().and_then(|r| r.tail_index()).map_or(0, |i| unit_index(last, i));
    writeln!(writer, "!entry.{}.unit.connect array int", name)?;
    writeln!(writer, " {}", head)?;
    writeln!(writer, " {}", tail)?;

    if entry.residues.iter().any(|residue| !residue.bonds().is_empty()) {
        writeln!(
            writer,
            "!entry.{}.unit.connectivity table  int atom1x  int atom2x  int flags",
            name
        )?;
        for (r, residue) in entry.residues.iter().enumerate() {
            for bond in residue.bonds() {
                if let (Some(a), Some(b)) = (residue.index_of(bond.atom1), residue.index_of(bond.atom2)) {
                    writeln!(
                        writer,
                        " {} {} {}",
                        unit_index(r, a),
                        unit_index(r, b),
                        bond.order.off_flag()
                    )?;
                }
            }
        }
    }

    writeln!(
        writer,
        "!entry.{}.unit.hierarchy table  str abovetype  int abovex  str belowtype  int belowx",
        name
    )?;
    for (r, residue) in entry.residues.iter().enumerate() {
        writeln!(writer, " \"U\" 0 \"R\" {}", r + 1)?;
        for local in 0..residue.len() {
            writeln!(writer, " \"R\" {} \"A\" {}", r + 1, unit_index(r, local))?;
        }
    }

    writeln!(writer, "!entry.{}.unit.name single str", name)?;
    writeln!(writer, " \"{}\"", name)?;

    writeln!(writer, "!entry.{}.unit.positions table  dbl x  dbl y  dbl z", name)?;
    for residue in &entry.residues {
        for atom in residue.iter() {
            let p = atom.position;
            writeln!(writer, " {:.*} {:.*} {:.*}", precision, p.x, precision, p.y, precision, p.z)?;
        }
    }

    writeln!(
        writer,
        "!entry.{}.unit.residueconnect table  int c1x  int c2x  int c3x  int c4x  int c5x  int c6x",
        name
    )?;
    for residue in &entry.residues {
        let local = |index: Option<usize>| index.map_or(0, |i| i + 1);
        let mut row = [0usize; 6];
        row[0] = local(residue.head_index());
        row[1] = local(residue.tail_index());
        for (slot, &id) in row[2..].iter_mut().zip(residue.connections()) {
            *slot = local(residue.index_of(id));
        }
        let row: Vec<String> = row.iter().map(ToString::to_string).collect();
        writeln!(writer, " {}", row.join(" "))?;
    }

    writeln!(
        writer,
        "!entry.{}.unit.residues table  str name  int seq  int childseq  int startatomx  str restype  int imagingx",
        name
    )?;
    for (r, residue) in entry.residues.iter().enumerate() {
        writeln!(
            writer,
            " \"{}\" {} {} {} \"{}\" 0",
            residue.name,
            r + 1,
            residue.len() + 1,
            unit_index(r, 0),
            residue.kind.off_tag()
        )?;
    }

    writeln!(writer, "!entry.{}.unit.residuesPdbSequenceNumber array int", name)?;
    for _ in &entry.residues {
        writeln!(writer, " 0")?;
    }

    writeln!(writer, "!entry.{}.unit.solventcap array dbl", name)?;
    writeln!(writer, " -1.000000")?;
    for _ in 0..4 {
        writeln!(writer, " 0.0")?;
    }

    writeln!(writer, "!entry.{}.unit.velocities table  dbl x  dbl y  dbl z", name)?;
    for residue in &entry.residues {
        for atom in residue.iter() {
            let v = atom.velocity;
            writeln!(writer, " {:.*} {:.*} {:.*}", precision, v.x, precision, v.y, precision, v.z)?;
        }
    }
    Ok(())
}
