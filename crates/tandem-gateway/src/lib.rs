pub mod connection;
pub mod dispatcher;

use tandem_types::models::Session;

/// Where the gateway fetches the latest committed snapshot when a client
/// (re)subscribes. Reconnecting clients converge from this snapshot alone;
/// no event replay is ever needed.
pub trait SnapshotSource: Send + Sync + 'static {
    fn latest(&self, session_code: &str) -> anyhow::Result<Option<Session>>;
}
