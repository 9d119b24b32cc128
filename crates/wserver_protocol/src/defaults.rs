//! Canonical default values shared by the server and its core node client.

pub const DEFAULT_RPC_BIND_ADDR: &str = "tcp://0.0.0.0:8888";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:gdb.sqlite3?mode=rwc";
pub const DEFAULT_PHOTOS_DIR: &str = "photos";

/// Port every core node listens on.
pub const DEFAULT_CORE_PORT: u16 = 15500;
pub const DEFAULT_CORE_LOGIN: &str = "wserver";
pub const DEFAULT_CORE_PASSWORD: &str = "wserver";
pub const DEFAULT_CORE_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_CORE_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// `duo_polygons.duo_role` value marking a polygon as a broadcast target.
pub const BROADCAST_ROLE: i64 = 1;

/// Name of the argument that selects the destination polygon.
pub const DESTINATION_PARAM: &str = "polygon";
