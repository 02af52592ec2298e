//! Wire protocol shared by the control surface and its clients

/// Paths of the per-process HTTP endpoints
pub mod routes {
    pub const STATUS: &str = "/status";
    pub const GET_STATE: &str = "/getState";
    pub const START: &str = "/start";
    pub const STOP: &str = "/stop";
    pub const MESSAGE: &str = "/message";
}

/// Body returned by `status` for a healthy process
pub const LIVE_BODY: &str = "live";

/// Body returned by `status` for a faulty process
pub const FAULTY_BODY: &str = "faulty";
