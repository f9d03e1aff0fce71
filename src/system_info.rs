//! `GetSystemInfo`.

use crate::arch::ArchitectureProfile;
use crate::codec::Codec;
use crate::ffi::Kernel32;
use crate::layout::{StructKind, system_info as field};
use crate::memory::{Arena, Region};
use crate::prelude::*;

pub const PROCESSOR_ARCHITECTURE_INTEL: u16 = 0;
pub const PROCESSOR_ARCHITECTURE_ARM: u16 = 5;
pub const PROCESSOR_ARCHITECTURE_IA64: u16 = 6;
pub const PROCESSOR_ARCHITECTURE_AMD64: u16 = 9;
pub const PROCESSOR_ARCHITECTURE_ARM64: u16 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub processor_architecture: u16,
    pub page_size: u32,
    pub min_application_address: u64,
    pub max_application_address: u64,
    pub active_processor_mask: u64,
    pub number_of_processors: u32,
    pub processor_type: u32,
    pub allocation_granularity: u32,
    pub processor_level: u16,
    pub processor_revision: u16,
}

impl SystemInfo {
    /// Decodes a `SYSTEM_INFO` block laid out for `profile`.
    pub fn decode<R: Region + ?Sized>(region: &R, profile: ArchitectureProfile) -> Result<Self> {
        let layout = profile.layout(StructKind::SystemInfo);
        let codec = Codec::new(profile);
        let u16_at = |name| codec.read_u16(region, layout.offset_of(name));
        let u32_at = |name| codec.read_u32(region, layout.offset_of(name));
        let pointer_at = |name| codec.read_pointer(region, layout.offset_of(name));

        Ok(Self {
            processor_architecture: u16_at(field::PROCESSOR_ARCHITECTURE)?,
            page_size: u32_at(field::PAGE_SIZE)?,
            min_application_address: pointer_at(field::MIN_APPLICATION_ADDRESS)?,
            max_application_address: pointer_at(field::MAX_APPLICATION_ADDRESS)?,
            active_processor_mask: pointer_at(field::ACTIVE_PROCESSOR_MASK)?,
            number_of_processors: u32_at(field::NUMBER_OF_PROCESSORS)?,
            processor_type: u32_at(field::PROCESSOR_TYPE)?,
            allocation_granularity: u32_at(field::ALLOCATION_GRANULARITY)?,
            processor_level: u16_at(field::PROCESSOR_LEVEL)?,
            processor_revision: u16_at(field::PROCESSOR_REVISION)?,
        })
    }

    /// Calls `GetSystemInfo` into a scratch buffer and decodes it.
    pub fn query(api: &Kernel32<'_>, arena: Arena<'_>) -> Result<Self> {
        let profile = api.profile();
        let buffer = arena.allocate_for(profile.layout(StructKind::SystemInfo))?;
        api.get_system_info(buffer.address())?;
        let info = Self::decode(&buffer, profile)?;
        debug!(
            "{} processor(s), architecture {}, page size {}",
            info.number_of_processors,
            info.architecture_name(),
            info.page_size
        );
        Ok(info)
    }

    pub fn architecture_name(&self) -> &'static str {
        match self.processor_architecture {
            PROCESSOR_ARCHITECTURE_INTEL => "x86",
            PROCESSOR_ARCHITECTURE_ARM => "arm",
            PROCESSOR_ARCHITECTURE_IA64 => "ia64",
            PROCESSOR_ARCHITECTURE_AMD64 => "x64",
            PROCESSOR_ARCHITECTURE_ARM64 => "arm64",
            _ => "unknown",
        }
    }
}
