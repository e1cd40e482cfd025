use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// The page's toast widget. Messages may carry HTML.
pub trait Notifier {
    fn toast(&self, level: ToastLevel, message: &str);
}

/// Sends toasts to the log, for hosts without a toast widget.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn toast(&self, level: ToastLevel, message: &str) {
        match level {
            ToastLevel::Info | ToastLevel::Success => info!(target: "toast", "{message}"),
            ToastLevel::Warning => warn!(target: "toast", "{message}"),
            ToastLevel::Error => error!(target: "toast", "{message}"),
        }
    }
}
