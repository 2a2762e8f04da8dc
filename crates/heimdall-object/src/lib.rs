//! ELF/Mach-O/PE decoding.
//!
//! Primary decode (sections, symbols, entry point, build-id, debug-section
//! presence) goes through the `object` crate's unified reader. Needed-library
//! names are pulled from `goblin`, whose per-format structs (`Elf::libraries`,
//! `Mach::libs`, PE import descriptors) keep the exact DT_NEEDED / LC_LOAD_DYLIB
//! / IMPORTS semantics which `object`'s unified
//! `Object` trait does not expose uniformly.

use heimdall_model::{Section, Symbol, SymbolKind};
use object::{Object, ObjectSection, ObjectSymbol};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("unrecognized object format")]
    UnsupportedFormat,
    #[error("a header or section offset exceeds the file bounds")]
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Elf,
    MachO,
    Pe,
}

/// The linker's own classification of the image, distinct from
/// `heimdall_model::ComponentKind` (which also covers archives and
/// non-object artifacts the object decoder never sees).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Executable,
    SharedLibrary,
    Relocatable,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ObjectFacts {
    pub format: ObjectFormat,
    pub arch: String,
    pub bits: u8,
    pub little_endian: bool,
    pub sections: Vec<Section>,
    pub symbols: BTreeSet<Symbol>,
    /// Raw dependency names as they appear in the object (e.g. `libssl.so.3`).
    pub needed: Vec<String>,
    pub build_id: Option<String>,
    pub entry_point: Option<u64>,
    pub is_pie: bool,
    pub is_stripped: bool,
    pub debug_section_presence: bool,
    pub image_kind: ImageKind,
}

const DEBUG_SECTION_NAMES: &[&str] = &[
    ".debug_info",
    ".debug_abbrev",
    ".debug_line",
    ".debug_str",
    ".debug_line_str",
    ".debug_ranges",
    ".debug_rnglists",
];

/// Decodes `bytes` as ELF, Mach-O, or PE. Never panics: malformed
/// size/offset fields surface as `Truncated`, unrecognized magic as
/// `UnsupportedFormat`
pub fn decode(bytes: &[u8]) -> Result<ObjectFacts, ObjectError> {
    let file = object::File::parse(bytes).map_err(|e| classify_object_error(&e))?;

    let format = match file.format() {
        object::BinaryFormat::Elf => ObjectFormat::Elf,
        object::BinaryFormat::MachO => ObjectFormat::MachO,
        object::BinaryFormat::Pe | object::BinaryFormat::Coff => ObjectFormat::Pe,
        _ => return Err(ObjectError::UnsupportedFormat),
    };

    let bits = if file.is_64() { 64 } else { 32 };
    let little_endian = file.is_little_endian();
    let arch = format!("{:?}", file.architecture());

    let mut sections = Vec::new();
    let mut debug_section_presence = false;
    for section in file.sections() {
        let name = section.name().unwrap_or("").to_string();
        if DEBUG_SECTION_NAMES.contains(&name.as_str()) {
            debug_section_presence = true;
        }
        sections.push(Section {
            name,
            size: section.size(),
            flags: section_flags(&section),
        });
    }

    let mut symbols = BTreeSet::new();
    for sym in file.symbols().chain(file.dynamic_symbols()) {
        let name = match sym.name() {
            Ok(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        let kind = classify_symbol(&sym);
        symbols.insert(Symbol {
            name,
            kind,
            binding: format!("{:?}", sym.scope()),
            size: sym.size(),
        });
    }

    let is_stripped = file.symbols().next().is_none() && file.dynamic_symbols().next().is_none();
    let build_id = file.build_id().ok().flatten().map(hex::encode);
    let entry_point = Some(file.entry()).filter(|e| *e != 0);
    let is_pie = matches!(file.kind(), object::ObjectKind::Dynamic);
    let image_kind = match file.kind() {
        object::ObjectKind::Executable => ImageKind::Executable,
        object::ObjectKind::Dynamic => ImageKind::SharedLibrary,
        object::ObjectKind::Relocatable => ImageKind::Relocatable,
        _ => ImageKind::Unknown,
    };

    let needed = extract_needed(bytes, format);

    Ok(ObjectFacts {
        format,
        arch,
        bits,
        little_endian,
        sections,
        symbols,
        needed,
        build_id,
        entry_point,
        is_pie,
        is_stripped,
        debug_section_presence,
        image_kind,
    })
}

fn classify_object_error(err: &object::Error) -> ObjectError {
    let msg = err.to_string();
    if msg.contains("too short")
        || msg.contains("out of bounds")
        || msg.contains("invalid")
        || msg.contains("offset")
    {
        ObjectError::Truncated
    } else {
        ObjectError::UnsupportedFormat
    }
}

fn section_flags(section: &object::Section) -> u64 {
    match section.flags() {
        object::SectionFlags::Elf { sh_flags } => sh_flags,
        object::SectionFlags::MachO { flags } => flags as u64,
        object::SectionFlags::Coff { characteristics } => characteristics as u64,
        _ => 0,
    }
}

fn classify_symbol(sym: &object::Symbol) -> SymbolKind {
    if sym.is_weak() {
        SymbolKind::Weak
    } else if sym.is_undefined() {
        SymbolKind::Undefined
    } else {
        SymbolKind::Defined
    }
}

/// Parses the format-specific dependency table with `goblin`, degrading to
/// an empty list (never an error) if goblin can't parse what `object` just
/// accepted.
fn extract_needed(bytes: &[u8], format: ObjectFormat) -> Vec<String> {
    match goblin::Object::parse(bytes) {
        Ok(goblin::Object::Elf(elf)) if format == ObjectFormat::Elf => {
            elf.libraries.iter().map(|s| s.to_string()).collect()
        }
        Ok(goblin::Object::Mach(goblin::mach::Mach::Binary(macho))) if format == ObjectFormat::MachO => {
            macho.libs.iter().filter(|l| **l != "self").map(|s| s.to_string()).collect()
        }
        Ok(goblin::Object::Mach(goblin::mach::Mach::Fat(fat))) if format == ObjectFormat::MachO => {
            fat.into_iter()
                .filter_map(|arch| arch.ok())
                .flat_map(|arch| arch.libs.iter().filter(|l| **l != "self").map(|s| s.to_string()).collect::<Vec<_>>())
                .collect()
        }
        Ok(goblin::Object::PE(pe)) if format == ObjectFormat::Pe => {
            pe.libraries.iter().map(|s| s.to_string()).collect()
        }
        _ => Vec::new(),
    }
}
