//! Mach-O header decoding.
//!
//! Only the fixed-size header is read: the magic number resolves word size
//! and byte order in a single match, the CPU type resolves the processor
//! family, and the CPU subtype resolves the micro-architecture variant
//! through a second table scoped to the already-resolved family.

use crate::error;
use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::{fmt, fs, io::Read, path::Path, result};

/// 32-bit big-endian magic.
const MH_MAGIC: u32 = 0xFEED_FACE;
/// 32-bit little-endian magic.
const MH_CIGAM: u32 = 0xCEFA_EDFE;
/// 64-bit big-endian magic.
const MH_MAGIC_64: u32 = 0xFEED_FACF;
/// 64-bit little-endian magic.
const MH_CIGAM_64: u32 = 0xCFFA_EDFE;

/// Flag marking a 64-bit architecture inside the CPU type code.
const CPU_ARCH_ABI64: u32 = 0x0100_0000;
/// Mask that strips the capability bits from a CPU subtype code.
const CPU_SUBTYPE_MASK: u32 = 0x00FF_FFFF;

const CPU_TYPE_VAX: u32 = 1;
const CPU_TYPE_MC680X0: u32 = 6;
const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_MC98000: u32 = 10;
const CPU_TYPE_HPPA: u32 = 11;
const CPU_TYPE_ARM: u32 = 12;
const CPU_TYPE_MC88000: u32 = 13;
const CPU_TYPE_SPARC: u32 = 14;
const CPU_TYPE_I860: u32 = 15;
const CPU_TYPE_POWERPC: u32 = 18;
const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
const CPU_TYPE_POWERPC64: u32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;

/// Word size of the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    /// 32-bit executable.
    Bits32,
    /// 64-bit executable.
    Bits64,
}

impl fmt::Display for WordSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits32 => write!(f, "32-bit"),
            Self::Bits64 => write!(f, "64-bit"),
        }
    }
}

/// Byte order of the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Big-endian byte order.
    Big,
    /// Little-endian byte order.
    Little,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Big => write!(f, "big-endian"),
            Self::Little => write!(f, "little-endian"),
        }
    }
}

/// Processor family declared in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFamily {
    Vax,
    M68k,
    X86,
    X86_64,
    M98k,
    Hppa,
    Arm,
    Arm64,
    M88k,
    Sparc,
    I860,
    PowerPc,
    PowerPc64,
}

impl fmt::Display for CpuFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vax => "VAX",
            Self::M68k => "m68k",
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::M98k => "m98k",
            Self::Hppa => "hppa",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
            Self::M88k => "m88k",
            Self::Sparc => "sparc",
            Self::I860 => "i860",
            Self::PowerPc => "ppc",
            Self::PowerPc64 => "ppc64",
        };
        write!(f, "{}", name)
    }
}

macro_rules! serialize_display {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(self.to_string().as_str())
            }
        }
    )*};
}

serialize_display!(WordSize, Endianness, CpuFamily);

/// Decoded Mach-O header information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachoInfo {
    word_size: WordSize,
    endianness: Endianness,
    cpu: CpuFamily,
    sub_cpu: String,
}

impl MachoInfo {
    /// Gets the word size.
    pub fn word_size(&self) -> WordSize {
        self.word_size
    }

    /// Gets the byte order.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Gets the CPU family.
    pub fn cpu(&self) -> CpuFamily {
        self.cpu
    }

    /// Gets the CPU sub-family, empty when the code has no known mapping.
    pub fn sub_cpu(&self) -> &str {
        &self.sub_cpu
    }
}

/// Decodes the Mach-O header of the executable at the given path.
pub fn decode<P: AsRef<Path>>(executable: P) -> Result<MachoInfo> {
    let mut file = fs::File::open(executable.as_ref()).with_context(|| {
        format!(
            "could not open the executable {}",
            executable.as_ref().display()
        )
    })?;
    let mut header = [0_u8; 12];
    file.read_exact(&mut header)
        .context("could not read the Mach-O header")?;

    decode_header(&header)
}

/// Decodes a raw 12-byte Mach-O header.
pub fn decode_header(header: &[u8; 12]) -> Result<MachoInfo> {
    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let (word_size, endianness) = match magic {
        MH_MAGIC => (WordSize::Bits32, Endianness::Big),
        MH_CIGAM => (WordSize::Bits32, Endianness::Little),
        MH_MAGIC_64 => (WordSize::Bits64, Endianness::Big),
        MH_CIGAM_64 => (WordSize::Bits64, Endianness::Little),
        magic => return Err(error::Kind::UnknownMagic { magic }.into()),
    };

    let cpu_code = read_u32(&header[4..8], endianness);
    let sub_code = read_u32(&header[8..12], endianness);

    let cpu = cpu_family(cpu_code)?;
    let sub_cpu = cpu_sub_family(cpu, sub_code).to_owned();

    Ok(MachoInfo {
        word_size,
        endianness,
        cpu,
        sub_cpu,
    })
}

fn read_u32(bytes: &[u8], endianness: Endianness) -> u32 {
    let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match endianness {
        Endianness::Big => u32::from_be_bytes(bytes),
        Endianness::Little => u32::from_le_bytes(bytes),
    }
}

/// Resolves the CPU family from the raw CPU type code.
///
/// An unknown code is a decoding error.
pub fn cpu_family(code: u32) -> Result<CpuFamily> {
    match code {
        CPU_TYPE_VAX => Ok(CpuFamily::Vax),
        CPU_TYPE_MC680X0 => Ok(CpuFamily::M68k),
        CPU_TYPE_X86 => Ok(CpuFamily::X86),
        CPU_TYPE_X86_64 => Ok(CpuFamily::X86_64),
        CPU_TYPE_MC98000 => Ok(CpuFamily::M98k),
        CPU_TYPE_HPPA => Ok(CpuFamily::Hppa),
        CPU_TYPE_ARM => Ok(CpuFamily::Arm),
        CPU_TYPE_ARM64 => Ok(CpuFamily::Arm64),
        CPU_TYPE_MC88000 => Ok(CpuFamily::M88k),
        CPU_TYPE_SPARC => Ok(CpuFamily::Sparc),
        CPU_TYPE_I860 => Ok(CpuFamily::I860),
        CPU_TYPE_POWERPC => Ok(CpuFamily::PowerPc),
        CPU_TYPE_POWERPC64 => Ok(CpuFamily::PowerPc64),
        cpu_type => Err(error::Kind::UnknownCpuType { cpu_type }.into()),
    }
}

/// Resolves the CPU sub-family from the raw subtype code.
///
/// The table is scoped to the given family: the same code means different
/// things, or nothing at all, under different families. Unknown codes are
/// tolerated and resolve to an empty name.
pub fn cpu_sub_family(family: CpuFamily, code: u32) -> &'static str {
    match (family, code & CPU_SUBTYPE_MASK) {
        (CpuFamily::Arm, 5) => "armv4t",
        (CpuFamily::Arm, 6) => "armv6",
        (CpuFamily::Arm, 7) => "armv5tej",
        (CpuFamily::Arm, 8) => "xscale",
        (CpuFamily::Arm, 9) => "armv7",
        (CpuFamily::Arm, 10) => "armv7f",
        (CpuFamily::Arm, 11) => "armv7s",
        (CpuFamily::Arm, 12) => "armv7k",
        (CpuFamily::Arm, 13) => "armv8",
        (CpuFamily::Arm, 14) => "armv6m",
        (CpuFamily::Arm, 15) => "armv7m",
        (CpuFamily::Arm, 16) => "armv7em",
        (CpuFamily::Arm64, 0) => "arm64 (all)",
        (CpuFamily::Arm64, 1) => "armv8",
        (CpuFamily::Arm64, 2) => "arm64e",
        (CpuFamily::X86, 3) => "i386 (all)",
        (CpuFamily::X86, 4) => "i486",
        (CpuFamily::X86, 5) => "pentium",
        (CpuFamily::X86_64, 3) => "x86_64 (all)",
        (CpuFamily::X86_64, 8) => "x86_64h (Haswell)",
        (CpuFamily::PowerPc, 0) => "ppc (all)",
        (CpuFamily::PowerPc, 1) => "ppc601",
        (CpuFamily::PowerPc, 3) => "ppc603",
        (CpuFamily::PowerPc, 9) => "ppc750",
        (CpuFamily::PowerPc, 10) => "ppc7400",
        (CpuFamily::PowerPc, 11) => "ppc7450",
        (CpuFamily::PowerPc, 100) => "ppc970",
        (CpuFamily::PowerPc64, 0) => "ppc64 (all)",
        (CpuFamily::PowerPc64, 100) => "ppc970-64",
        _ => "",
    }
}
