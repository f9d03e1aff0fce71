
use procscope::ffi::kernel32::{PROCESS_QUERY_INFORMATION, STILL_ACTIVE};
use procscope::handle::ProcessHandle;
use procscope::lifecycle::{PollOptions, PollOutcome};
use procscope::{ArchitectureProfile, Error, ProcessExit, Timeout, WaitOutcome};
use rstest::rstest;
use shared::{
    CURRENT_PID, ERROR_INVALID_HANDLE, LiveProcess, SimulatedMachine, assert_no_leaks, control,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A handle value the simulated machine never issued.
struct Bogus;

impl ProcessHandle for Bogus {
    fn raw_handle(&self) -> u64 {
        0xDEAD0
    }
}

fn fast_poll(deadline: Option<Duration>) -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(1),
        deadline,
    }
}

#[test_log::test]
fn test_immediate_wait_does_not_block() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    let control = control(&machine);
    let lifecycle = control.lifecycle();
    let handle = lifecycle
        .open_process(100, PROCESS_QUERY_INFORMATION)
        .unwrap()
        .unwrap();

    let start = Instant::now();
    let outcome = lifecycle.wait_for(&handle, Timeout::IMMEDIATE).unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_millis(50));

    drop(handle);
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_wait_on_invalid_handle_reports_error_code() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    let control = control(&machine);

    let outcome = control.lifecycle().wait_for(&Bogus, Timeout::Infinite).unwrap();
    assert_eq!(outcome, WaitOutcome::Error(ERROR_INVALID_HANDLE));
}

#[rstest]
#[case(ArchitectureProfile::X86)]
#[case(ArchitectureProfile::X64)]
#[test_log::test]
fn test_exit_code_and_terminate(#[case] profile: ArchitectureProfile) {
    let machine = SimulatedMachine::with_processes(profile, 1);
    let control = control(&machine);
    let lifecycle = control.lifecycle();
    let mut handle = lifecycle.open_for_monitoring(100).unwrap().unwrap();

    assert_eq!(lifecycle.exit_code(&handle).unwrap(), ProcessExit::Running);
    assert!(lifecycle.terminate(&handle, 7));
    assert_eq!(lifecycle.exit_code(&handle).unwrap(), ProcessExit::Exited(7));
    assert_eq!(
        lifecycle.wait_and_collect(&handle, Timeout::IMMEDIATE).unwrap(),
        (WaitOutcome::Signaled, Some(7))
    );

    assert!(lifecycle.close(&mut handle));
    assert!(!lifecycle.close(&mut handle));
    drop(handle);
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_still_active_sentinel_is_not_an_exit_code() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    machine.set_live(
        100,
        LiveProcess {
            exit_code: Some(STILL_ACTIVE),
            ..Default::default()
        },
    );
    let control = control(&machine);
    let lifecycle = control.lifecycle();
    let handle = lifecycle.open_for_monitoring(100).unwrap().unwrap();

    assert_eq!(lifecycle.exit_code(&handle).unwrap(), ProcessExit::Running);
}

#[test_log::test]
fn test_best_effort_failures_do_not_error() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    let control = control(&machine);
    let lifecycle = control.lifecycle();

    assert!(!lifecycle.terminate(&Bogus, 1));
    let err = lifecycle.exit_code(&Bogus).unwrap_err();
    assert!(matches!(
        err,
        Error::Platform {
            operation: "GetExitCodeProcess",
            code: ERROR_INVALID_HANDLE
        }
    ));
    // The exit code cell is released on the error path too.
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_open_for_monitoring_falls_back_to_query_access() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    machine.set_live(
        100,
        LiveProcess {
            restricted: true,
            ..Default::default()
        },
    );
    let control = control(&machine);

    let handle = control.lifecycle().open_for_monitoring(100).unwrap();
    assert!(handle.is_some());
    machine.with_stats(|stats| assert_eq!(stats.opens[&100], 2));
    drop(handle);
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_open_unknown_pid_is_none() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    let control = control(&machine);

    assert!(control.lifecycle().open_for_monitoring(31337).unwrap().is_none());
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_is_alive_uses_exit_code() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 2);
    machine.set_live(
        104,
        LiveProcess {
            exit_code: Some(0),
            ..Default::default()
        },
    );
    let control = control(&machine);
    let lifecycle = control.lifecycle();

    assert!(lifecycle.is_alive(100).unwrap());
    // Exited but still openable: the exit code settles it.
    assert!(!lifecycle.is_alive(104).unwrap());
    assert!(!lifecycle.is_alive(31337).unwrap());
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_access_denied_process_is_alive() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    machine.set_live(
        100,
        LiveProcess {
            denies_access: true,
            ..Default::default()
        },
    );
    let control = control(&machine);
    let lifecycle = control.lifecycle();

    assert!(lifecycle.is_alive(100).unwrap());
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_unexpected_open_failure_is_reported() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    machine.set_live(
        100,
        LiveProcess {
            open_error: Some(ERROR_INVALID_HANDLE),
            ..Default::default()
        },
    );
    let control = control(&machine);

    let err = control.lifecycle().is_alive(100).unwrap_err();
    assert!(matches!(
        err,
        Error::Platform {
            operation: "OpenProcess",
            code: ERROR_INVALID_HANDLE
        }
    ));
}

#[test_log::test]
fn test_poll_keeps_waiting_on_access_denied_process() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    machine.set_live(
        100,
        LiveProcess {
            denies_access: true,
            ..Default::default()
        },
    );
    let control = control(&machine);

    let outcome = control
        .lifecycle()
        .poll_until_exit(100, &fast_poll(Some(Duration::from_millis(20))), None)
        .unwrap();
    assert_eq!(outcome, PollOutcome::TimedOut);
    machine.with_stats(|stats| assert!(stats.opens[&100] >= 2));
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_poll_until_exit_observes_exit() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    machine.set_live(
        100,
        LiveProcess {
            opens_until_exit: Some(3),
            ..Default::default()
        },
    );
    let control = control(&machine);

    let outcome = control
        .lifecycle()
        .poll_until_exit(100, &fast_poll(None), None)
        .unwrap();
    assert_eq!(outcome, PollOutcome::Exited);
    machine.with_stats(|stats| assert_eq!(stats.opens[&100], 4));
    assert!(machine.live(100).unwrap().gone);
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_poll_until_exit_with_configured_interval() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X86, 1);
    machine.set_live(
        100,
        LiveProcess {
            opens_until_exit: Some(1),
            ..Default::default()
        },
    );
    let control = control(&machine);

    assert_eq!(control.poll_until_exit(100, None).unwrap(), PollOutcome::Exited);
}

#[test_log::test]
fn test_poll_until_exit_deadline() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    let control = control(&machine);

    let start = Instant::now();
    let outcome = control
        .lifecycle()
        .poll_until_exit(100, &fast_poll(Some(Duration::from_millis(20))), None)
        .unwrap();
    assert_eq!(outcome, PollOutcome::TimedOut);
    assert!(start.elapsed() >= Duration::from_millis(20));
    machine.with_stats(|stats| assert!(stats.opens[&100] >= 2));
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_poll_until_exit_cancelled_before_first_check() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    let control = control(&machine);
    let cancel = AtomicBool::new(true);

    let outcome = control
        .lifecycle()
        .poll_until_exit(100, &fast_poll(None), Some(&cancel))
        .unwrap();
    assert_eq!(outcome, PollOutcome::Cancelled);
    machine.with_stats(|stats| assert!(stats.opens.is_empty()));
}

#[test_log::test]
fn test_poll_until_exit_cancelled_from_another_thread() {
    let machine = SimulatedMachine::with_processes(ArchitectureProfile::X64, 1);
    let control = control(&machine);
    let cancel = AtomicBool::new(false);

    let outcome = std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(20));
            cancel.store(true, Ordering::SeqCst);
        });
        control
            .lifecycle()
            .poll_until_exit(100, &fast_poll(None), Some(&cancel))
            .unwrap()
    });
    assert_eq!(outcome, PollOutcome::Cancelled);
    assert_no_leaks(&machine);
}

#[rstest]
#[case(ArchitectureProfile::X86)]
#[case(ArchitectureProfile::X64)]
#[test_log::test]
fn test_current_process_helpers(#[case] profile: ArchitectureProfile) {
    let machine = SimulatedMachine::new(profile);
    let control = control(&machine);
    let lifecycle = control.lifecycle();

    let pseudo = lifecycle.current_process().unwrap();
    assert_eq!(pseudo.raw(), profile.invalid_handle());
    assert_eq!(lifecycle.current_pid().unwrap(), CURRENT_PID);

    // The pseudo-handle is not accepted by GetProcessId.
    assert!(matches!(
        lifecycle.pid_of(&pseudo),
        Err(Error::Platform {
            operation: "GetProcessId",
            ..
        })
    ));
    assert_eq!(lifecycle.pid_of_current().unwrap(), CURRENT_PID);
    assert_eq!(lifecycle.exit_code(&pseudo).unwrap(), ProcessExit::Running);
    assert_no_leaks(&machine);
}

#[rstest]
#[case(ArchitectureProfile::X86, "x86")]
#[case(ArchitectureProfile::X64, "x64")]
#[test_log::test]
fn test_system_info(#[case] profile: ArchitectureProfile, #[case] architecture: &str) {
    let machine = SimulatedMachine::new(profile);
    let control = control(&machine);

    let info = control.system_info().unwrap();
    assert_eq!(info.architecture_name(), architecture);
    assert_eq!(info.page_size, 4096);
    assert_eq!(info.number_of_processors, 4);
    assert_eq!(info.allocation_granularity, 65536);
    assert_eq!(info.active_processor_mask, 0xF);
    // Fields the host left alone read as zero, not as allocator garbage.
    assert_eq!(info.processor_level, 0);
    assert_no_leaks(&machine);
}
