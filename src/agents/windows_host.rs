//! Windows service control manager integration.
//!
//! Registration goes through `ServiceManager`, one call per action. A
//! process launched by the SCM hands its main thread to the dispatcher,
//! which runs [`service_main`] and forwards stop and shutdown controls into
//! the same `ControlRequest` channel the console loop uses.

use crate::agents::service_control::{ServiceBackend, absolute_executable};
use crate::agents::service_lifecycle::{ControlRequest, ServiceController, ServiceRunState};
use crate::agents::{DesktopNotifier, UpdateCycleRunner};
use crate::config::Config;
use crate::error::{Result, WingetauError};
use crate::winget::WingetFactory;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use windows_service::service::{
    ServiceAccess, ServiceControl, ServiceControlAccept, ServiceErrorControl, ServiceExitCode,
    ServiceInfo, ServiceStartType, ServiceState, ServiceStatus, ServiceType,
};
use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};
use windows_service::{define_windows_service, service_dispatcher};

/// Own process, allowed to show notifications on the interactive desktop.
const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS.union(ServiceType::INTERACTIVE_PROCESS);

/// `ERROR_FAILED_SERVICE_CONTROLLER_CONNECT`: not started by the SCM.
const NOT_LAUNCHED_BY_SCM: i32 = 1063;

const PENDING_WAIT_HINT: Duration = Duration::from_secs(30);

fn scm_error(action: &str, err: windows_service::Error) -> WingetauError {
    WingetauError::ServiceManager(format!("Failed to {action}: {err}"))
}

/// Service entry managed through the local service control manager.
pub struct ScmBackend {
    service_name: String,
    executable: PathBuf,
}

impl ScmBackend {
    pub fn new<P: AsRef<Path>>(service_name: &str, executable: P) -> Result<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
            executable: absolute_executable(executable.as_ref())?,
        })
    }

    fn manager(access: ServiceManagerAccess) -> Result<ServiceManager> {
        ServiceManager::local_computer(None::<&str>, access)
            .map_err(|e| scm_error("connect to service manager", e))
    }

    fn open(&self, access: ServiceAccess) -> Result<windows_service::service::Service> {
        Self::manager(ServiceManagerAccess::CONNECT)?
            .open_service(&self.service_name, access)
            .map_err(|e| scm_error(&format!("open service {}", self.service_name), e))
    }

    fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            name: OsString::from(&self.service_name),
            display_name: OsString::from(&self.service_name),
            service_type: SERVICE_TYPE,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: self.executable.clone(),
            launch_arguments: vec![OsString::from("runservice")],
            dependencies: Vec::new(),
            // LocalSystem
            account_name: None,
            account_password: None,
        }
    }
}

impl ServiceBackend for ScmBackend {
    fn register(&self) -> Result<()> {
        let manager =
            Self::manager(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
        let service = manager
            .create_service(&self.service_info(), ServiceAccess::CHANGE_CONFIG)
            .map_err(|e| scm_error("create service", e))?;
        service
            .set_description("Checks for and applies WinGet package upgrades")
            .map_err(|e| scm_error("set service description", e))
    }

    fn unregister(&self) -> Result<()> {
        self.open(ServiceAccess::DELETE)?
            .delete()
            .map_err(|e| scm_error("delete service", e))
    }

    fn start(&self) -> Result<()> {
        self.open(ServiceAccess::START)?
            .start::<&OsStr>(&[])
            .map_err(|e| scm_error("start service", e))
    }

    fn stop(&self) -> Result<()> {
        let status = self
            .open(ServiceAccess::STOP)?
            .stop()
            .map_err(|e| scm_error("stop service", e))?;
        info!("Service stop requested (state: {:?})", status.current_state);
        Ok(())
    }
}

define_windows_service!(ffi_service_main, service_main);

/// Run under the service dispatcher when launched by the SCM.
///
/// Returns `Ok(false)` without doing anything when the process was started
/// from a console, so the caller can fall back to the console loop.
pub fn dispatch(service_name: &str) -> Result<bool> {
    match service_dispatcher::start(service_name, ffi_service_main) {
        Ok(()) => Ok(true),
        Err(windows_service::Error::Winapi(e)) if e.raw_os_error() == Some(NOT_LAUNCHED_BY_SCM) => {
            Ok(false)
        }
        Err(e) => Err(scm_error("start service dispatcher", e)),
    }
}

fn service_main(_arguments: Vec<OsString>) {
    // Logging is already up; startup warnings were reported by `main`
    let config = Config::load();
    if let Err(err) = run_service(&config) {
        error!("Service failed: {err}");
    }
}

fn run_service(config: &Config) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let status = service_control_handler::register(&config.service_name, move |control| {
        forward_control(&tx, control)
    })
    .map_err(|e| scm_error("register control handler", e))?;

    let result = run_controller(config, status, rx);

    let exit_code = if result.is_ok() { 0 } else { 1 };
    set_status(status, ServiceState::Stopped, ServiceExitCode::Win32(exit_code));
    result
}

fn run_controller(
    config: &Config,
    status: ServiceStatusHandle,
    rx: mpsc::UnboundedReceiver<ControlRequest>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let factory = WingetFactory::new(config);
    let notifier = DesktopNotifier;
    let runner = UpdateCycleRunner::new(config, &factory, &notifier);
    let mut controller = ServiceController::new(runner, config.check_interval)
        .on_transition(move |state| report_state(status, state));

    let cycles = runtime.block_on(controller.run(rx));
    info!("Service stopped after {cycles} update cycle(s)");
    Ok(())
}

fn forward_control(
    tx: &mpsc::UnboundedSender<ControlRequest>,
    control: ServiceControl,
) -> ServiceControlHandlerResult {
    let request = match control {
        ServiceControl::Interrogate => return ServiceControlHandlerResult::NoError,
        ServiceControl::Stop => ControlRequest::Stop,
        ServiceControl::Shutdown => ControlRequest::Shutdown,
        other => ControlRequest::Other(format!("{other:?}")),
    };
    let handled = !matches!(request, ControlRequest::Other(_));
    // The loop may already be gone during shutdown
    let _ = tx.send(request);
    if handled {
        ServiceControlHandlerResult::NoError
    } else {
        ServiceControlHandlerResult::NotImplemented
    }
}

fn report_state(status: ServiceStatusHandle, state: ServiceRunState) {
    let scm_state = match state {
        ServiceRunState::Starting => ServiceState::StartPending,
        ServiceRunState::Running => ServiceState::Running,
        ServiceRunState::StopPending => ServiceState::StopPending,
    };
    set_status(status, scm_state, ServiceExitCode::Win32(0));
}

fn set_status(status: ServiceStatusHandle, state: ServiceState, exit_code: ServiceExitCode) {
    let (controls_accepted, wait_hint) = match state {
        ServiceState::Running => (
            ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
            Duration::default(),
        ),
        ServiceState::StartPending | ServiceState::StopPending => {
            (ServiceControlAccept::empty(), PENDING_WAIT_HINT)
        }
        _ => (ServiceControlAccept::empty(), Duration::default()),
    };

    let next = ServiceStatus {
        service_type: SERVICE_TYPE,
        current_state: state,
        controls_accepted,
        exit_code,
        checkpoint: 0,
        wait_hint,
        process_id: None,
    };
    if let Err(err) = status.set_service_status(next) {
        warn!("Failed to report {state:?} to the service manager: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_and_shutdown_reach_the_controller() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = forward_control(&tx, ServiceControl::Stop);
        assert_eq!(result, ServiceControlHandlerResult::NoError);
        assert_eq!(rx.try_recv().unwrap(), ControlRequest::Stop);

        forward_control(&tx, ServiceControl::Shutdown);
        assert_eq!(rx.try_recv().unwrap(), ControlRequest::Shutdown);
    }

    #[test]
    fn interrogate_is_answered_without_a_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = forward_control(&tx, ServiceControl::Interrogate);
        assert_eq!(result, ServiceControlHandlerResult::NoError);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_controls_are_forwarded_and_refused() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = forward_control(&tx, ServiceControl::Pause);
        assert_eq!(result, ServiceControlHandlerResult::NotImplemented);
        assert!(matches!(rx.try_recv().unwrap(), ControlRequest::Other(_)));
    }

    #[test]
    fn service_launches_in_service_mode() {
        let backend = ScmBackend::new("Winget-AutoUpdate", r"C:\Tools\wingetau.exe").unwrap();
        let info = backend.service_info();
        assert_eq!(info.launch_arguments, vec![OsString::from("runservice")]);
        assert_eq!(info.start_type, ServiceStartType::AutoStart);
        assert!(info.account_name.is_none());
    }
}
