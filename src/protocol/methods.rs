// ! MCP Protocol Method Constants
// !
// ! Grouped by direction: requests the client issues, then notifications in
// ! either direction.

// ----------------------------------------------------------------------------
// Client → server requests
// ----------------------------------------------------------------------------

pub const INITIALIZE: &str = "initialize";
/// Also answered by the client when the server sends it
pub const PING: &str = "ping";
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";
pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// Sent by the client once the `initialize` result is in
pub const INITIALIZED: &str = "notifications/initialized";
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
/// Server log record (`level`, `logger`, `data`)
pub const LOGGING_MESSAGE: &str = "notifications/message";
pub const PROGRESS: &str = "notifications/progress";
pub const CANCELLED: &str = "notifications/cancelled";
