//! Contract of the foreign invocation capability.
//!
//! The host registers an exported symbol together with a textual [`Signature`] and later calls
//! it by name. This crate never performs the call itself: it only builds arguments, checks them
//! against the registered signature and interprets the returned value.

use crate::error::ForeignCallError;

pub mod kernel32;
mod signature;

pub use kernel32::Kernel32;
pub use signature::{MarshalClass, ParamClass, Signature};

/// Dynamic "call an exported function by name" capability.
pub trait ForeignInvoker {
    /// Makes `symbol` from `module` callable with `signature`. Registering the same symbol
    /// twice must be harmless.
    fn register(
        &self,
        module: &str,
        symbol: &str,
        signature: &Signature,
    ) -> Result<(), ForeignCallError>;

    fn invoke(&self, symbol: &str, args: &[ForeignArg]) -> Result<ForeignValue, ForeignCallError>;
}

/// One marshalled argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignArg {
    I32(i32),
    U32(u32),
    U16(u16),
    Handle(u64),
    /// Raw address, `0` is null.
    Pointer(u64),
    /// UTF-16 string argument, `None` passes null.
    WideStr(Option<String>),
}

impl ForeignArg {
    pub const NULL: ForeignArg = ForeignArg::Pointer(0);

    /// Whether this argument can be marshalled as `param`.
    pub fn accepts(&self, param: &ParamClass) -> bool {
        if param.output {
            return matches!(self, ForeignArg::Pointer(_));
        }
        matches!(
            (self, param.class),
            (ForeignArg::I32(_), MarshalClass::Long)
                | (ForeignArg::U32(_), MarshalClass::ULong)
                | (ForeignArg::U16(_), MarshalClass::UShort)
                | (
                    ForeignArg::Handle(_) | ForeignArg::Pointer(_),
                    MarshalClass::Handle | MarshalClass::Pointer
                )
                | (ForeignArg::WideStr(_), MarshalClass::WideString)
        )
    }
}

/// Value returned by an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignValue {
    Void,
    I32(i32),
    U32(u32),
    /// Pointer or handle, zero-extended to 64 bits.
    Pointer(u64),
}

impl ForeignValue {
    /// Raw bits of the value, sign-extended for signed results.
    pub fn bits(&self) -> u64 {
        match self {
            ForeignValue::Void => 0,
            ForeignValue::I32(v) => *v as i64 as u64,
            ForeignValue::U32(v) => u64::from(*v),
            ForeignValue::Pointer(v) => *v,
        }
    }

    pub fn as_u32(&self) -> u32 {
        self.bits() as u32
    }

    /// Win32 `BOOL` semantics: anything non-zero is success.
    pub fn is_true(&self) -> bool {
        self.bits() != 0
    }
}
