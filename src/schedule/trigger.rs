//! Cron trigger computed from a resolved schedule

use serde::Serialize;
use std::fmt;

/// The timer trigger for one resolve cycle. An empty expression disables it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronTrigger {
    expression: Option<String>,
}

impl CronTrigger {
    pub fn from_expression(expression: &str) -> Self {
        let expression = expression.trim();
        Self {
            expression: (!expression.is_empty()).then(|| expression.to_string()),
        }
    }

    pub fn disabled() -> Self {
        Self { expression: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.expression.is_some()
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }
}

impl fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expr) => write!(f, "cron({})", expr),
            None => write!(f, "disabled"),
        }
    }
}
