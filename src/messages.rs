/// User-facing message text for recorder errors.
pub trait Messages: Send + Sync {
    fn invalid_data(&self) -> String;

    fn error_saving(&self, name: &str) -> String;
}

/// English messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessages;

impl Messages for DefaultMessages {
    fn invalid_data(&self) -> String {
        "Invalid data".to_string()
    }

    fn error_saving(&self, name: &str) -> String {
        format!("Error saving {}", name)
    }
}
