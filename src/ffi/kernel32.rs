//! Typed view over the kernel32 exports the core relies on.

use super::{ForeignArg, ForeignInvoker, ForeignValue, Signature};
use crate::arch::ArchitectureProfile;
use crate::error::ForeignCallError;
use crate::memory::Address;
use crate::prelude::*;
use std::collections::HashMap;

pub const MODULE: &str = "kernel32.dll";

pub const TH32CS_SNAPPROCESS: u32 = 0x0000_0002;

pub const PROCESS_QUERY_INFORMATION: u32 = 0x0400;
pub const PROCESS_QUERY_LIMITED_INFORMATION: u32 = 0x1000;
pub const PROCESS_ALL_ACCESS: u32 = 0x001F_0FFF;

pub const WAIT_OBJECT_0: u32 = 0x0000_0000;
pub const WAIT_TIMEOUT: u32 = 0x0000_0102;
pub const WAIT_FAILED: u32 = 0xFFFF_FFFF;
pub const INFINITE: u32 = 0xFFFF_FFFF;

pub const STILL_ACTIVE: u32 = 259;

pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub(crate) const GET_CURRENT_PROCESS: &str = "GetCurrentProcess";
pub(crate) const GET_CURRENT_PROCESS_ID: &str = "GetCurrentProcessId";
pub(crate) const GET_PROCESS_ID: &str = "GetProcessId";
pub(crate) const OPEN_PROCESS: &str = "OpenProcess";
pub(crate) const CLOSE_HANDLE: &str = "CloseHandle";
pub(crate) const GET_EXIT_CODE_PROCESS: &str = "GetExitCodeProcess";
pub(crate) const TERMINATE_PROCESS: &str = "TerminateProcess";
pub(crate) const WAIT_FOR_SINGLE_OBJECT: &str = "WaitForSingleObject";
pub(crate) const GET_LAST_ERROR: &str = "GetLastError";
pub(crate) const CREATE_TOOLHELP32_SNAPSHOT: &str = "CreateToolhelp32Snapshot";
pub(crate) const PROCESS32_FIRST: &str = "Process32FirstW";
pub(crate) const PROCESS32_NEXT: &str = "Process32NextW";
pub(crate) const CREATE_PROCESS: &str = "CreateProcessW";
pub(crate) const GET_SYSTEM_INFO: &str = "GetSystemInfo";

/// Every export the core calls, with the signature it is registered under.
pub const BINDINGS: &[(&str, &str)] = &[
    (GET_CURRENT_PROCESS, "p="),
    (GET_CURRENT_PROCESS_ID, "u="),
    (GET_PROCESS_ID, "u=p"),
    (OPEN_PROCESS, "p=uuu"),
    (CLOSE_HANDLE, "l=p"),
    (GET_EXIT_CODE_PROCESS, "l=pp"),
    (TERMINATE_PROCESS, "l=pu"),
    (WAIT_FOR_SINGLE_OBJECT, "u=pu"),
    (GET_LAST_ERROR, "u="),
    (CREATE_TOOLHELP32_SNAPSHOT, "p=uu"),
    (PROCESS32_FIRST, "l=pp"),
    (PROCESS32_NEXT, "l=pp"),
    (CREATE_PROCESS, "l=wwpplupppp"),
    (GET_SYSTEM_INFO, "=p"),
];

/// kernel32 bound through a [`ForeignInvoker`].
///
/// Symbols are registered once, in [`Kernel32::bind`]. Each call is checked against the
/// registered signature before it reaches the invoker.
pub struct Kernel32<'a> {
    invoker: &'a dyn ForeignInvoker,
    profile: ArchitectureProfile,
    signatures: HashMap<&'static str, Signature>,
}

impl<'a> Kernel32<'a> {
    pub fn bind(invoker: &'a dyn ForeignInvoker, profile: ArchitectureProfile) -> Result<Self> {
        let mut signatures = HashMap::with_capacity(BINDINGS.len());
        for (symbol, text) in BINDINGS {
            let signature = Signature::parse(text)?;
            invoker.register(MODULE, symbol, &signature)?;
            debug!("Registered {MODULE}!{symbol} as `{signature}`");
            signatures.insert(*symbol, signature);
        }

        Ok(Self {
            invoker,
            profile,
            signatures,
        })
    }

    pub fn profile(&self) -> ArchitectureProfile {
        self.profile
    }

    fn call(&self, symbol: &'static str, args: &[ForeignArg]) -> Result<ForeignValue> {
        let signature = self
            .signatures
            .get(symbol)
            .ok_or_else(|| ForeignCallError::new(format!("{symbol} was never registered")))?;

        if signature.params.len() != args.len() {
            return Err(ForeignCallError::new(format!(
                "{symbol} takes {} arguments, got {}",
                signature.params.len(),
                args.len()
            ))
            .into());
        }
        if let Some((i, (arg, _))) = args
            .iter()
            .zip(&signature.params)
            .enumerate()
            .find(|(_, (arg, param))| !arg.accepts(param))
        {
            return Err(ForeignCallError::new(format!(
                "argument {i} of {symbol} ({arg:?}) does not match `{signature}`"
            ))
            .into());
        }

        trace!("Calling {symbol}{args:?}");
        let value = self.invoker.invoke(symbol, args)?;
        trace!("{symbol} returned {value:?}");
        Ok(value)
    }

    pub fn last_error(&self) -> Result<u32> {
        Ok(self.call(GET_LAST_ERROR, &[])?.as_u32())
    }

    /// Fetches the last error, reporting `0` when even that call fails.
    pub(crate) fn last_error_or_zero(&self) -> u32 {
        self.last_error().unwrap_or_else(|e| {
            warn!("Could not retrieve the last error: {e}");
            0
        })
    }

    pub fn current_process(&self) -> Result<u64> {
        Ok(self.profile.truncate_word(self.call(GET_CURRENT_PROCESS, &[])?.bits()))
    }

    pub fn current_process_id(&self) -> Result<u32> {
        Ok(self.call(GET_CURRENT_PROCESS_ID, &[])?.as_u32())
    }

    pub fn process_id(&self, handle: u64) -> Result<u32> {
        Ok(self
            .call(GET_PROCESS_ID, &[ForeignArg::Handle(handle)])?
            .as_u32())
    }

    /// Returns the raw handle, `0` when the process could not be opened.
    pub fn open_process(&self, access: u32, inherit: bool, pid: u32) -> Result<u64> {
        let value = self.call(
            OPEN_PROCESS,
            &[
                ForeignArg::U32(access),
                ForeignArg::U32(inherit.into()),
                ForeignArg::U32(pid),
            ],
        )?;
        Ok(self.profile.truncate_word(value.bits()))
    }

    pub fn close_handle(&self, handle: u64) -> Result<bool> {
        Ok(self
            .call(CLOSE_HANDLE, &[ForeignArg::Handle(handle)])?
            .is_true())
    }

    pub fn get_exit_code_process(&self, handle: u64, out: Address) -> Result<bool> {
        Ok(self
            .call(
                GET_EXIT_CODE_PROCESS,
                &[ForeignArg::Handle(handle), ForeignArg::Pointer(out as u64)],
            )?
            .is_true())
    }

    pub fn terminate_process(&self, handle: u64, exit_code: u32) -> Result<bool> {
        Ok(self
            .call(
                TERMINATE_PROCESS,
                &[ForeignArg::Handle(handle), ForeignArg::U32(exit_code)],
            )?
            .is_true())
    }

    pub fn wait_for_single_object(&self, handle: u64, millis: u32) -> Result<u32> {
        Ok(self
            .call(
                WAIT_FOR_SINGLE_OBJECT,
                &[ForeignArg::Handle(handle), ForeignArg::U32(millis)],
            )?
            .as_u32())
    }

    pub fn create_toolhelp32_snapshot(&self, flags: u32, pid: u32) -> Result<u64> {
        let value = self.call(
            CREATE_TOOLHELP32_SNAPSHOT,
            &[ForeignArg::U32(flags), ForeignArg::U32(pid)],
        )?;
        Ok(self.profile.truncate_word(value.bits()))
    }

    pub fn process32_first(&self, snapshot: u64, entry: Address) -> Result<bool> {
        Ok(self
            .call(
                PROCESS32_FIRST,
                &[ForeignArg::Handle(snapshot), ForeignArg::Pointer(entry as u64)],
            )?
            .is_true())
    }

    pub fn process32_next(&self, snapshot: u64, entry: Address) -> Result<bool> {
        Ok(self
            .call(
                PROCESS32_NEXT,
                &[ForeignArg::Handle(snapshot), ForeignArg::Pointer(entry as u64)],
            )?
            .is_true())
    }

    /// `CreateProcessW` with null security attributes, environment and current directory.
    pub fn create_process(
        &self,
        application_name: Option<&str>,
        command_line: &str,
        inherit_handles: bool,
        creation_flags: u32,
        startup_info: Address,
        process_information: Address,
    ) -> Result<bool> {
        Ok(self
            .call(
                CREATE_PROCESS,
                &[
                    ForeignArg::WideStr(application_name.map(str::to_owned)),
                    ForeignArg::WideStr(Some(command_line.to_owned())),
                    ForeignArg::NULL,
                    ForeignArg::NULL,
                    ForeignArg::I32(inherit_handles.into()),
                    ForeignArg::U32(creation_flags),
                    ForeignArg::NULL,
                    ForeignArg::NULL,
                    ForeignArg::Pointer(startup_info as u64),
                    ForeignArg::Pointer(process_information as u64),
                ],
            )?
            .is_true())
    }

    pub fn get_system_info(&self, out: Address) -> Result<()> {
        self.call(GET_SYSTEM_INFO, &[ForeignArg::Pointer(out as u64)])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records registrations and calls, answers every call with `U32(1)`.
    #[derive(Default)]
    struct RecordingInvoker {
        registered: RefCell<Vec<(String, String, String)>>,
        calls: RefCell<Vec<(String, Vec<ForeignArg>)>>,
    }

    impl ForeignInvoker for RecordingInvoker {
        fn register(
            &self,
            module: &str,
            symbol: &str,
            signature: &Signature,
        ) -> Result<(), ForeignCallError> {
            self.registered.borrow_mut().push((
                module.to_string(),
                symbol.to_string(),
                signature.to_string(),
            ));
            Ok(())
        }

        fn invoke(
            &self,
            symbol: &str,
            args: &[ForeignArg],
        ) -> Result<ForeignValue, ForeignCallError> {
            self.calls
                .borrow_mut()
                .push((symbol.to_string(), args.to_vec()));
            Ok(ForeignValue::U32(1))
        }
    }

    struct RejectingInvoker;

    impl ForeignInvoker for RejectingInvoker {
        fn register(
            &self,
            _module: &str,
            symbol: &str,
            _signature: &Signature,
        ) -> Result<(), ForeignCallError> {
            Err(ForeignCallError::new(format!("{symbol} not found")))
        }

        fn invoke(&self, symbol: &str, _: &[ForeignArg]) -> Result<ForeignValue, ForeignCallError> {
            Err(ForeignCallError::new(format!("{symbol} not registered")))
        }
    }

    #[test]
    fn test_bind_registers_every_symbol_once() {
        let invoker = RecordingInvoker::default();
        let _api = Kernel32::bind(&invoker, ArchitectureProfile::X64).unwrap();

        let registered = invoker.registered.borrow();
        assert_eq!(registered.len(), BINDINGS.len());
        assert!(registered.iter().all(|(module, _, _)| module == MODULE));
        assert!(registered.contains(&(
            MODULE.to_string(),
            "CreateProcessW".to_string(),
            "l=wwpplupppp".to_string()
        )));
    }

    #[test]
    fn test_bind_failure_surfaces_as_foreign_call_error() {
        let err = Kernel32::bind(&RejectingInvoker, ArchitectureProfile::X64)
            .err()
            .unwrap();
        assert!(matches!(err, Error::ForeignCall(_)));
        assert!(err.to_string().contains("GetCurrentProcess not found"));
    }

    #[test]
    fn test_create_process_marshals_ten_arguments() {
        let invoker = RecordingInvoker::default();
        let api = Kernel32::bind(&invoker, ArchitectureProfile::X64).unwrap();
        assert!(
            api.create_process(None, "cmd.exe /c echo", false, CREATE_NO_WINDOW, 0x10, 0x20)
                .unwrap()
        );

        let calls = invoker.calls.borrow();
        let (symbol, args) = &calls[0];
        assert_eq!(symbol, "CreateProcessW");
        assert_eq!(args.len(), 10);
        assert_eq!(args[0], ForeignArg::WideStr(None));
        assert_eq!(args[5], ForeignArg::U32(CREATE_NO_WINDOW));
        assert_eq!(args[8], ForeignArg::Pointer(0x10));
    }

    #[test]
    fn test_open_process_passes_pid_as_dword() {
        let invoker = RecordingInvoker::default();
        let api = Kernel32::bind(&invoker, ArchitectureProfile::X64).unwrap();
        api.open_process(PROCESS_QUERY_LIMITED_INFORMATION, false, 4242)
            .unwrap();

        let calls = invoker.calls.borrow();
        let (symbol, args) = &calls[0];
        assert_eq!(symbol, "OpenProcess");
        assert_eq!(
            args,
            &vec![
                ForeignArg::U32(PROCESS_QUERY_LIMITED_INFORMATION),
                ForeignArg::U32(0),
                ForeignArg::U32(4242),
            ]
        );
    }

    #[test]
    fn test_handles_are_truncated_to_word_size() {
        struct AllOnes;
        impl ForeignInvoker for AllOnes {
            fn register(&self, _: &str, _: &str, _: &Signature) -> Result<(), ForeignCallError> {
                Ok(())
            }
            fn invoke(&self, _: &str, _: &[ForeignArg]) -> Result<ForeignValue, ForeignCallError> {
                Ok(ForeignValue::Pointer(u64::MAX))
            }
        }

        let api = Kernel32::bind(&AllOnes, ArchitectureProfile::X86).unwrap();
        assert_eq!(
            api.create_toolhelp32_snapshot(TH32CS_SNAPPROCESS, 0).unwrap(),
            ArchitectureProfile::X86.invalid_handle()
        );
    }
}
