use crate::error::ForeignCallError;
use std::fmt;

/// Marshalling class of one parameter or of the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarshalClass {
    Long,
    ULong,
    Handle,
    Pointer,
    Short,
    UShort,
    Char,
    UChar,
    Float,
    Double,
    LongLong,
    WideString,
    AnsiString,
    OemString,
    Void,
}

impl MarshalClass {
    fn from_letter(letter: char) -> Option<Self> {
        let class = match letter.to_ascii_lowercase() {
            'l' => MarshalClass::Long,
            'u' => MarshalClass::ULong,
            'h' => MarshalClass::Handle,
            'p' => MarshalClass::Pointer,
            'n' => MarshalClass::Short,
            't' => MarshalClass::UShort,
            'c' => MarshalClass::Char,
            'b' => MarshalClass::UChar,
            'f' => MarshalClass::Float,
            'd' => MarshalClass::Double,
            'q' => MarshalClass::LongLong,
            'w' => MarshalClass::WideString,
            's' => MarshalClass::AnsiString,
            'z' => MarshalClass::OemString,
            'v' if letter == 'v' => MarshalClass::Void,
            _ => return None,
        };
        Some(class)
    }

    fn letter(&self) -> char {
        match self {
            MarshalClass::Long => 'l',
            MarshalClass::ULong => 'u',
            MarshalClass::Handle => 'h',
            MarshalClass::Pointer => 'p',
            MarshalClass::Short => 'n',
            MarshalClass::UShort => 't',
            MarshalClass::Char => 'c',
            MarshalClass::UChar => 'b',
            MarshalClass::Float => 'f',
            MarshalClass::Double => 'd',
            MarshalClass::LongLong => 'q',
            MarshalClass::WideString => 'w',
            MarshalClass::AnsiString => 's',
            MarshalClass::OemString => 'z',
            MarshalClass::Void => 'v',
        }
    }
}

/// A parameter slot. Output parameters (uppercase letters) are passed as a pointer to storage
/// of `class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamClass {
    pub class: MarshalClass,
    pub output: bool,
}

impl ParamClass {
    pub fn input(class: MarshalClass) -> Self {
        Self {
            class,
            output: false,
        }
    }
}

/// Parsed form of a textual signature such as `l=wwpplupppp`.
///
/// The letter before `=` is the return class (empty means void), each letter after it is one
/// parameter. Uppercase parameter letters mark output parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub ret: MarshalClass,
    pub params: Vec<ParamClass>,
}

impl Signature {
    pub fn parse(text: &str) -> Result<Self, ForeignCallError> {
        let Some((ret, params)) = text.split_once('=') else {
            return Err(ForeignCallError::new(format!(
                "signature `{text}` has no `=` separator"
            )));
        };

        let mut ret_letters = ret.chars();
        let ret = match (ret_letters.next(), ret_letters.next()) {
            (None, _) => MarshalClass::Void,
            (Some(letter), None) if letter.is_ascii_lowercase() => MarshalClass::from_letter(letter)
                .ok_or_else(|| {
                    ForeignCallError::new(format!("unknown return class `{letter}` in `{text}`"))
                })?,
            _ => {
                return Err(ForeignCallError::new(format!(
                    "return class `{ret}` in `{text}` must be a single lowercase letter"
                )));
            }
        };

        let params = params
            .chars()
            .map(|letter| {
                let class = MarshalClass::from_letter(letter)
                    .filter(|class| *class != MarshalClass::Void)
                    .ok_or_else(|| {
                        ForeignCallError::new(format!(
                            "unknown parameter class `{letter}` in `{text}`"
                        ))
                    })?;
                Ok(ParamClass {
                    class,
                    output: letter.is_ascii_uppercase(),
                })
            })
            .collect::<Result<Vec<_>, ForeignCallError>>()?;

        Ok(Self { ret, params })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ret != MarshalClass::Void {
            write!(f, "{}", self.ret.letter())?;
        }
        write!(f, "=")?;
        for param in &self.params {
            let letter = param.class.letter();
            if param.output {
                write!(f, "{}", letter.to_ascii_uppercase())?;
            } else {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Signature {
    type Err = ForeignCallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}
