use log::{ error, info, warn };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: ToastLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(ToastLevel::Success, message);
    }

    fn info(&self, message: &str) {
        self.notify(ToastLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.notify(ToastLevel::Error, message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: ToastLevel, message: &str) {
        match level {
            ToastLevel::Success | ToastLevel::Info => info!("{}", message),
            ToastLevel::Warning => warn!("{}", message),
            ToastLevel::Error => error!("{}", message),
        }
    }
}
