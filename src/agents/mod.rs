pub mod notifier;
pub mod service_control;
pub mod service_lifecycle;
pub mod update_cycle;
#[cfg(windows)]
pub mod windows_host;

pub use notifier::{DesktopNotifier, NotificationKind, Notifier};
pub use service_control::ServiceControlAgent;
pub use service_lifecycle::ServiceController;
pub use update_cycle::{CycleRunner, CycleSummary, UpdateCycleRunner};
