//! Desktop notifications for update outcomes.
//!
//! Delivery is best effort: a notification that cannot be shown is logged
//! and otherwise ignored.

use std::fmt;
use std::process::Command;
use tracing::{debug, warn};

pub const NOTIFICATION_TITLE: &str = "WinGet Update";

/// Category of a notification, mapped to urgency and icon by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Error,
    Success,
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotificationKind::Error => "error",
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
        };
        f.write_str(label)
    }
}

pub trait Notifier {
    fn notify(&self, title: &str, message: &str, kind: NotificationKind);
}

/// Shows notifications through the platform's notification command.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str, kind: NotificationKind) {
        let mut command = platform_command(title, message, kind);
        match command.output() {
            Ok(output) if output.status.success() => {
                debug!("Sent {kind} notification: {title}");
            }
            Ok(output) => {
                warn!(
                    "Failed to send notification: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("Failed to send notification: {e}");
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn platform_command(title: &str, message: &str, kind: NotificationKind) -> Command {
    let (urgency, icon) = match kind {
        NotificationKind::Error => ("critical", "dialog-error"),
        NotificationKind::Success => ("normal", "emblem-default"),
        NotificationKind::Info => ("low", "dialog-information"),
    };

    let mut command = Command::new("notify-send");
    command
        .arg("--app-name=wingetau")
        .arg(format!("--urgency={urgency}"))
        .arg(format!("--icon={icon}"))
        .arg(title)
        .arg(message);
    command
}

#[cfg(target_os = "macos")]
fn platform_command(title: &str, message: &str, _kind: NotificationKind) -> Command {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_quotes(message),
        escape_quotes(title)
    );
    let mut command = Command::new("osascript");
    command.args(["-e", &script]);
    command
}

#[cfg(windows)]
fn platform_command(title: &str, message: &str, kind: NotificationKind) -> Command {
    let script = format!(
        "[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] > $null;\
         $xml = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02);\
         $text = $xml.GetElementsByTagName('text');\
         $text.Item(0).AppendChild($xml.CreateTextNode('{} [{}]')) > $null;\
         $text.Item(1).AppendChild($xml.CreateTextNode('{}')) > $null;\
         $toast = [Windows.UI.Notifications.ToastNotification]::new($xml);\
         [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('wingetau').Show($toast)",
        title.replace('\'', "''"),
        kind,
        message.replace('\'', "''")
    );
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    command
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn platform_command(title: &str, message: &str, _kind: NotificationKind) -> Command {
    let mut command = Command::new("notify-send");
    command.arg(title).arg(message);
    command
}

#[cfg(target_os = "macos")]
fn escape_quotes(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records every notification for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: RefCell<Vec<(NotificationKind, String)>>,
    }

    impl RecordingNotifier {
        pub fn count(&self, kind: NotificationKind) -> usize {
            self.sent.borrow().iter().filter(|(k, _)| *k == kind).count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _title: &str, message: &str, kind: NotificationKind) {
            self.sent.borrow_mut().push((kind, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(NotificationKind::Error.to_string(), "error");
        assert_eq!(NotificationKind::Success.to_string(), "success");
        assert_eq!(NotificationKind::Info.to_string(), "info");
    }

    #[test]
    fn recording_notifier_counts_by_kind() {
        let notifier = RecordingNotifier::default();
        notifier.notify(NOTIFICATION_TITLE, "a", NotificationKind::Info);
        notifier.notify(NOTIFICATION_TITLE, "b", NotificationKind::Error);
        notifier.notify(NOTIFICATION_TITLE, "c", NotificationKind::Info);

        assert_eq!(notifier.count(NotificationKind::Info), 2);
        assert_eq!(notifier.count(NotificationKind::Error), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_command_maps_urgency() {
        let command = platform_command("t", "m", NotificationKind::Error);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(command.get_program(), "notify-send");
        assert!(args.contains(&"--urgency=critical".to_string()));
        assert_eq!(&args[args.len() - 2..], ["t", "m"]);
    }
}
