use crate::error::{Result, WingetauError};
use std::path::{Path, PathBuf};
use tracing::info;

/// One call into the OS service manager per action.
pub trait ServiceBackend {
    fn register(&self) -> Result<()>;
    fn unregister(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

/// Registers and controls the background service.
///
/// systemd on Unix, the service control manager on Windows. Every failure
/// is a [`WingetauError::ServiceManager`].
pub struct ServiceControlAgent {
    service_name: String,
    backend: Box<dyn ServiceBackend>,
}

impl ServiceControlAgent {
    pub fn new(service_name: &str, backend: Box<dyn ServiceBackend>) -> Self {
        Self {
            service_name: service_name.to_string(),
            backend,
        }
    }

    /// Agent for the currently running binary on this platform's service manager.
    pub fn for_current_exe(service_name: &str) -> Result<Self> {
        let executable = std::env::current_exe().map_err(|e| {
            WingetauError::ServiceManager(format!("Failed to get executable path: {e}"))
        })?;

        #[cfg(windows)]
        let backend = crate::agents::windows_host::ScmBackend::new(service_name, executable)?;
        #[cfg(not(windows))]
        let backend = SystemdBackend::new(service_name, executable)?;

        Ok(Self::new(service_name, Box::new(backend)))
    }

    /// Register the service and start it.
    pub fn install(&self) -> Result<()> {
        self.backend.register()?;
        info!("Service {} installed", self.service_name);
        self.start()
    }

    /// Stop the service if it is running, then remove its registration.
    pub fn uninstall(&self) -> Result<()> {
        if let Err(err) = self.backend.stop() {
            info!("Service was not stopped before removal: {err}");
        }
        self.backend.unregister()?;
        info!("Service {} uninstalled", self.service_name);
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.backend.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.backend.stop()
    }
}

/// The service manager launches `executable` by absolute path.
pub fn absolute_executable(executable: &Path) -> Result<PathBuf> {
    if !executable.is_absolute() {
        return Err(WingetauError::ServiceManager(format!(
            "Service executable must be an absolute path: {}",
            executable.display()
        )));
    }
    Ok(executable.to_path_buf())
}

/// systemd system unit driven through `systemctl`.
#[cfg(not(windows))]
pub struct SystemdBackend {
    service_name: String,
    executable: PathBuf,
    unit_dir: PathBuf,
}

#[cfg(not(windows))]
impl SystemdBackend {
    const UNIT_DIR: &'static str = "/etc/systemd/system";

    /// Upper bound systemd waits for an in-flight update cycle on stop.
    const STOP_TIMEOUT: &'static str = "30min";

    pub fn new<P: AsRef<Path>>(service_name: &str, executable: P) -> Result<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
            executable: absolute_executable(executable.as_ref())?,
            unit_dir: PathBuf::from(Self::UNIT_DIR),
        })
    }

    fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit_name())
    }

    /// Only the main process receives SIGTERM on stop, so a running
    /// winget child is left to finish before the loop exits.
    fn unit_file(&self) -> String {
        format!(
            "[Unit]\n\
             Description={name} automatic package updates\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart=\"{exe}\" runservice\n\
             Restart=on-failure\n\
             KillMode=mixed\n\
             TimeoutStopSec={timeout}\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            name = self.service_name,
            exe = self.executable.display(),
            timeout = Self::STOP_TIMEOUT
        )
    }

    fn systemctl(args: &[&str]) -> Result<()> {
        let command = format!("systemctl {}", args.join(" "));
        let output = std::process::Command::new("systemctl")
            .args(args)
            .output()
            .map_err(|e| {
                WingetauError::ServiceManager(format!("Failed to execute '{command}': {e}"))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        Err(WingetauError::ServiceManager(format!(
            "{command} failed: {}",
            detail.trim()
        )))
    }
}

#[cfg(not(windows))]
impl ServiceBackend for SystemdBackend {
    fn register(&self) -> Result<()> {
        let unit_path = self.unit_path();
        std::fs::write(&unit_path, self.unit_file()).map_err(|e| {
            WingetauError::ServiceManager(format!(
                "Failed to write {}: {e}",
                unit_path.display()
            ))
        })?;
        Self::systemctl(&["daemon-reload"])?;
        Self::systemctl(&["enable", &self.unit_name()])
    }

    fn unregister(&self) -> Result<()> {
        Self::systemctl(&["disable", &self.unit_name()])?;
        let unit_path = self.unit_path();
        std::fs::remove_file(&unit_path).map_err(|e| {
            WingetauError::ServiceManager(format!(
                "Failed to remove {}: {e}",
                unit_path.display()
            ))
        })?;
        Self::systemctl(&["daemon-reload"])
    }

    fn start(&self) -> Result<()> {
        Self::systemctl(&["start", &self.unit_name()])
    }

    fn stop(&self) -> Result<()> {
        Self::systemctl(&["stop", &self.unit_name()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FakeBackend {
        calls: Rc<RefCell<Vec<&'static str>>>,
        failing: Option<&'static str>,
    }

    impl FakeBackend {
        fn record(&self, call: &'static str) -> Result<()> {
            self.calls.borrow_mut().push(call);
            if self.failing == Some(call) {
                return Err(WingetauError::ServiceManager(format!("{call} refused")));
            }
            Ok(())
        }
    }

    impl ServiceBackend for FakeBackend {
        fn register(&self) -> Result<()> {
            self.record("register")
        }

        fn unregister(&self) -> Result<()> {
            self.record("unregister")
        }

        fn start(&self) -> Result<()> {
            self.record("start")
        }

        fn stop(&self) -> Result<()> {
            self.record("stop")
        }
    }

    fn agent(failing: Option<&'static str>) -> (ServiceControlAgent, Rc<RefCell<Vec<&'static str>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let backend = FakeBackend {
            calls: Rc::clone(&calls),
            failing,
        };
        (ServiceControlAgent::new("svc", Box::new(backend)), calls)
    }

    #[test]
    fn install_registers_then_starts() {
        let (agent, calls) = agent(None);
        agent.install().unwrap();
        assert_eq!(*calls.borrow(), vec!["register", "start"]);
    }

    #[test]
    fn install_stops_after_failed_register() {
        let (agent, calls) = agent(Some("register"));

        let err = agent.install().unwrap_err();
        assert!(matches!(err, WingetauError::ServiceManager(_)));
        assert_eq!(*calls.borrow(), vec!["register"]);
    }

    #[test]
    fn uninstall_continues_when_service_is_not_running() {
        let (agent, calls) = agent(Some("stop"));
        agent.uninstall().unwrap();
        assert_eq!(*calls.borrow(), vec!["stop", "unregister"]);
    }

    #[test]
    fn rejects_relative_executable() {
        let err = absolute_executable(Path::new("wingetau")).unwrap_err();
        assert!(matches!(err, WingetauError::ServiceManager(_)));
    }

    #[cfg(not(windows))]
    #[test]
    fn unit_file_runs_service_mode() {
        let backend = SystemdBackend::new("Winget-AutoUpdate", "/usr/bin/wingetau").unwrap();
        let unit = backend.unit_file();
        assert_eq!(backend.unit_name(), "Winget-AutoUpdate.service");
        assert!(unit.contains("ExecStart=\"/usr/bin/wingetau\" runservice"));
        assert!(unit.contains("KillMode=mixed\n"));
        assert!(unit.contains("TimeoutStopSec=30min\n"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[cfg(not(windows))]
    #[test]
    fn register_fails_cleanly_when_unit_dir_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = SystemdBackend::new("svc", "/usr/bin/wingetau").unwrap();
        backend.unit_dir = dir.path().join("missing");

        let err = backend.register().unwrap_err();
        assert!(err.to_string().contains("Failed to write"));
    }
}
