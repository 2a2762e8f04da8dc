//! DWARF 2-5 debug info extraction.
//!
//! Reads `.debug_info`/`.debug_abbrev`/`.debug_line`/`.debug_str`/
//! `.debug_line_str`/`.debug_ranges`/`.debug_rnglists` via `gimli` against
//! whatever sections `object` exposes for the artifact's format.

use gimli::{EndianSlice, RunTimeEndian};
use heimdall_model::{CompileUnit, Function};
use object::{Object, ObjectSection};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DwarfError {
    #[error("not a recognizable object file")]
    NotAnObject,
}

#[derive(Debug, Default, Clone)]
pub struct DebugFacts {
    pub source_files: BTreeSet<String>,
    pub functions: BTreeSet<Function>,
    pub compile_units: BTreeSet<CompileUnit>,
    pub languages: BTreeSet<String>,
    /// Set when parsing stopped partway through a malformed unit; the
    /// orchestrator attaches `"dwarf.partial" = "true"` when this is true.
    pub partial: bool,
}

/// Extracts debug facts from `bytes`. Returns an empty, successful
/// `DebugFacts` when no DWARF sections are present — absence is not an
/// error.
pub fn extract_debug(bytes: &[u8]) -> Result<DebugFacts, DwarfError> {
    let file = object::File::parse(bytes).map_err(|_| DwarfError::NotAnObject)?;
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let load_section = |id: gimli::SectionId| -> Result<Vec<u8>, gimli::Error> {
        match file.section_by_name(id.name()) {
            Some(section) => Ok(section.uncompressed_data().unwrap_or_default().into_owned()),
            None => Ok(Vec::new()),
        }
    };

    let owned: gimli::Dwarf<Vec<u8>> = match gimli::Dwarf::load(load_section) {
        Ok(d) => d,
        Err(_) => return Ok(DebugFacts::default()),
    };

    let dwarf = owned.borrow(|section| EndianSlice::new(section.as_slice(), endian));

    let mut facts = DebugFacts::default();
    let mut units = dwarf.units();
    loop {
        let header = match units.next() {
            Ok(Some(h)) => h,
            Ok(None) => break,
            Err(_) => {
                facts.partial = true;
                break;
            }
        };
        let unit = match dwarf.unit(header) {
            Ok(u) => u,
            Err(_) => {
                facts.partial = true;
                continue;
            }
        };

        if let Err(_) = collect_unit(&dwarf, &unit, &mut facts) {
            facts.partial = true;
        }
    }

    tracing::debug!(
        units = facts.compile_units.len(),
        files = facts.source_files.len(),
        functions = facts.functions.len(),
        "extracted dwarf debug info"
    );

    Ok(facts)
}

fn collect_unit(
    dwarf: &gimli::Dwarf<EndianSlice<RunTimeEndian>>,
    unit: &gimli::Unit<EndianSlice<RunTimeEndian>>,
    facts: &mut DebugFacts,
) -> gimli::Result<()> {
    let mut comp_dir = String::new();
    let mut comp_name = String::new();
    let mut producer = String::new();
    let mut language = String::new();

    let mut entries = unit.entries();
    let mut root_done = false;
    while let Some((_, entry)) = entries.next_dfs()? {
        if !root_done && entry.tag() == gimli::DW_TAG_compile_unit {
            root_done = true;
            if let Some(attr) = entry.attr(gimli::DW_AT_comp_dir)? {
                comp_dir = attr_to_string(dwarf, unit, &attr);
            }
            if let Some(attr) = entry.attr(gimli::DW_AT_name)? {
                comp_name = attr_to_string(dwarf, unit, &attr);
            }
            if let Some(attr) = entry.attr(gimli::DW_AT_producer)? {
                producer = attr_to_string(dwarf, unit, &attr);
            }
            if let Some(attr) = entry.attr(gimli::DW_AT_language)? {
                if let gimli::AttributeValue::Language(lang) = attr.value() {
                    language = format!("{:?}", lang);
                }
            }
        }

        if entry.tag() == gimli::DW_TAG_subprogram {
            let name = entry
                .attr(gimli::DW_AT_name)?
                .map(|a| attr_to_string(dwarf, unit, &a));
            let has_low_pc = entry.attr(gimli::DW_AT_low_pc)?.is_some();
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                if has_low_pc {
                    let line = entry
                        .attr(gimli::DW_AT_decl_line)?
                        .and_then(|a| a.udata_value())
                        .map(|v| v as u32);
                    let file_idx = entry
                        .attr(gimli::DW_AT_decl_file)?
                        .and_then(|a| a.udata_value());
                    let source_file = file_idx.and_then(|idx| {
                        line_program_file(dwarf, unit, idx, &comp_dir, &comp_name)
                    });
                    facts.functions.insert(Function {
                        name,
                        source_file,
                        line,
                    });
                }
            }
        }
    }

    if root_done {
        facts.compile_units.insert(CompileUnit {
            name: comp_name.clone(),
            producer,
            language: language.clone(),
        });
        if !language.is_empty() {
            facts.languages.insert(language);
        }
    }

    if let Some(program) = unit.line_program.clone() {
        let header = program.header();
        for file_entry in header.file_names() {
            if let Some(path) = reconstruct_path(dwarf, unit, header, file_entry, &comp_dir) {
                facts.source_files.insert(path);
            }
        }
    }

    Ok(())
}

fn attr_to_string(
    dwarf: &gimli::Dwarf<EndianSlice<RunTimeEndian>>,
    unit: &gimli::Unit<EndianSlice<RunTimeEndian>>,
    attr: &gimli::Attribute<EndianSlice<RunTimeEndian>>,
) -> String {
    dwarf
        .attr_string(unit, attr.value())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn reconstruct_path(
    dwarf: &gimli::Dwarf<EndianSlice<RunTimeEndian>>,
    unit: &gimli::Unit<EndianSlice<RunTimeEndian>>,
    header: &gimli::LineProgramHeader<EndianSlice<RunTimeEndian>>,
    file_entry: &gimli::FileEntry<EndianSlice<RunTimeEndian>>,
    comp_dir: &str,
) -> Option<String> {
    let name = dwarf
        .attr_string(unit, file_entry.path_name())
        .ok()?
        .to_string_lossy()
        .into_owned();

    let mut path = PathBuf::new();
    if let Some(dir) = file_entry.directory(header) {
        if let Ok(dir_str) = dwarf.attr_string(unit, dir) {
            let dir_str = dir_str.to_string_lossy();
            if !dir_str.is_empty() {
                path.push(dir_str.as_ref());
            }
        }
    }
    if path.as_os_str().is_empty() && !comp_dir.is_empty() {
        path.push(comp_dir);
    }
    path.push(&name);
    Some(path.to_string_lossy().into_owned())
}

fn line_program_file(
    dwarf: &gimli::Dwarf<EndianSlice<RunTimeEndian>>,
    unit: &gimli::Unit<EndianSlice<RunTimeEndian>>,
    file_index: u64,
    comp_dir: &str,
    _comp_name: &str,
) -> Option<String> {
    let program = unit.line_program.as_ref()?;
    let header = program.header();
    let file_entry = header.file(file_index)?;
    reconstruct_path(dwarf, unit, header, file_entry, comp_dir)
}
