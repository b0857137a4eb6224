use std::collections::BTreeMap;
use tracing::{debug, error, info, trace, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "coordinator", "climate", "setup")
    pub component: String,
    /// Vehicle identification number the message concerns
    pub vin: Option<String>,
    /// Energy site the message concerns
    pub site_id: Option<u64>,
    /// Additional context fields
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            vin: None,
            site_id: None,
            extra_fields: BTreeMap::new(),
        }
    }

    /// Set vehicle
    pub fn with_vin(mut self, vin: &str) -> Self {
        self.vin = Some(vin.to_string());
        self
    }

    /// Set energy site
    pub fn with_site_id(mut self, site_id: u64) -> Self {
        self.site_id = Some(site_id);
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    /// Create a new structured logger with context
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Log an info message with context
    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }
    /// Log a warning message with context
    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }
    /// Log an error message with context
    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }
    /// Log a debug message with context
    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }
    /// Log a trace message with context
    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(ref vin) = self.context.vin {
            fields.push(format!("vin={}", vin));
        }
        if let Some(site_id) = self.context.site_id {
            fields.push(format!("site_id={}", site_id));
        }
        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{}={}", key, value));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let context = LogContext::new("coordinator")
            .with_vin("LRW3F7EK4NC000001")
            .with_site_id(42)
            .with_field("endpoint", "live_status".to_string());

        assert_eq!(context.component, "coordinator");
        assert_eq!(context.vin.as_deref(), Some("LRW3F7EK4NC000001"));
        assert_eq!(context.site_id, Some(42));
        assert_eq!(
            context.extra_fields.get("endpoint"),
            Some(&"live_status".to_string())
        );
    }

    #[test]
    fn test_format_fields_orders_context() {
        let logger = get_logger_with_context(
            LogContext::new("lock")
                .with_vin("5YJ3E1EA7JF000002")
                .with_field("b", "2".to_string())
                .with_field("a", "1".to_string()),
        );
        assert_eq!(
            logger.format_fields(),
            "component=lock,vin=5YJ3E1EA7JF000002,a=1,b=2"
        );
    }

    #[test]
    fn test_get_logger() {
        let logger = get_logger("setup");
        assert_eq!(logger.context.component, "setup");
        // Emitting without a subscriber must not panic
        logger.info("hello");
        logger.debug("hello");
    }
}
