use crate::layout::{self, FieldLayout, StructKind};

/// Native pointer width of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordSize {
    /// Handles and pointers occupy 4 bytes, no padding.
    Four,
    /// Handles and pointers occupy 8 bytes, 8-byte alignment.
    Eight,
}

impl WordSize {
    pub fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }
}

/// Selects which structure layouts apply. Chosen once from the running process, never from the
/// target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchitectureProfile {
    word: WordSize,
}

impl ArchitectureProfile {
    pub const X86: Self = Self {
        word: WordSize::Four,
    };
    pub const X64: Self = Self {
        word: WordSize::Eight,
    };

    #[cfg(target_pointer_width = "64")]
    pub fn native() -> Self {
        Self::X64
    }

    #[cfg(target_pointer_width = "32")]
    pub fn native() -> Self {
        Self::X86
    }

    pub fn from_word_size(bytes: usize) -> Option<Self> {
        match bytes {
            4 => Some(Self::X86),
            8 => Some(Self::X64),
            _ => None,
        }
    }

    pub fn word(&self) -> WordSize {
        self.word
    }

    pub fn word_size(&self) -> usize {
        self.word.bytes()
    }

    pub fn layout(&self, kind: StructKind) -> &'static FieldLayout {
        layout::layout_for(kind, *self)
    }

    /// Keeps only the bits a pointer-sized value can hold on this architecture.
    pub fn truncate_word(&self, value: u64) -> u64 {
        match self.word {
            WordSize::Four => value & u64::from(u32::MAX),
            WordSize::Eight => value,
        }
    }

    /// `INVALID_HANDLE_VALUE` as seen at this word size.
    pub fn invalid_handle(&self) -> u64 {
        self.truncate_word(u64::MAX)
    }

    pub fn name(&self) -> &'static str {
        match self.word {
            WordSize::Four => "x86",
            WordSize::Eight => "x64",
        }
    }
}
