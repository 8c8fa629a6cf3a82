//! Handler dispatch for approved actions.
//!
//! Handlers are keyed by `(action_type, service_type)` and resolved from
//! a registry built once at startup — adding a pair is a code change,
//! not configuration. The known pairs:
//!
//! | action_type   | service_type |
//! |---------------|--------------|
//! | send_email    | gmail        |
//! | place_order   | binance      |
//! | create_event  | calendar     |
//! | update_event  | calendar     |
//! | delete_event  | calendar     |
//! | create_folder | drive        |
//! | upload_file   | drive        |

use std::collections::HashMap;
use std::sync::Arc;

use wd_core::traits::ServiceAdapter;

/// The action/service pairs the platform ships handlers for.
pub const BUILTIN_PAIRS: &[(&str, &str)] = &[
    ("send_email", "gmail"),
    ("place_order", "binance"),
    ("create_event", "calendar"),
    ("update_event", "calendar"),
    ("delete_event", "calendar"),
    ("create_folder", "drive"),
    ("upload_file", "drive"),
];

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn ServiceAdapter>>
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for an action/service pair. Last write wins.
    pub fn register(
        &mut self,
        action_type: &str,
        service_type: &str,
        adapter: Arc<dyn ServiceAdapter>
    ) {
        self.handlers
            .insert((action_type.to_string(), service_type.to_string()), adapter);
    }

    /// Look up the executor for an action/service pair.
    #[must_use]
    pub fn get(&self, action_type: &str, service_type: &str) -> Option<Arc<dyn ServiceAdapter>> {
        self.handlers
            .get(&(action_type.to_string(), service_type.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
