/*!
 * Server Configuration
 *
 * Built once at startup and shared read-only by the snapshot loader,
 * the listener and the command dispatcher.
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default directory holding the snapshot file
pub const DEFAULT_DIR: &str = "/tmp/redis-data";
/// Default snapshot file name
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";
/// Default Redis-compatible port
pub const DEFAULT_PORT: u16 = 6379;
/// Default cap on buffered, not yet decoded input per connection
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Startup parameters for a cinder instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the snapshot
    pub dir: PathBuf,
    /// Snapshot file name inside `dir`
    pub dbfilename: String,
    /// Address to bind the listener to
    pub bind: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Number of reactor threads serving connections
    pub workers: usize,
    /// Master to send REPLCONF ACKs to, as `host:port`
    pub replicaof: Option<String>,
    /// Largest amount of undecoded input a connection may buffer
    pub max_request_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            replicaof: None,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl Config {
    /// Full path of the snapshot file (`<dir>/<dbfilename>`)
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    /// Socket address the listener binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Look up a setting by name, as served by `CONFIG GET`
    ///
    /// Names are matched case-insensitively. Unknown names yield `None`.
    pub fn get(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "dir" => Some(self.dir.display().to_string()),
            "dbfilename" => Some(self.dbfilename.clone()),
            "port" => Some(self.port.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_path_joins_dir_and_filename() {
        let config = Config {
            dir: PathBuf::from("/var/lib/cinder"),
            dbfilename: "snap.rdb".into(),
            ..Config::default()
        };
        assert_eq!(config.snapshot_path(), PathBuf::from("/var/lib/cinder/snap.rdb"));
    }

    #[test]
    fn get_is_case_insensitive() {
        let config = Config::default();
        assert_eq!(config.get("DIR").as_deref(), Some(DEFAULT_DIR));
        assert_eq!(config.get("dbFilename").as_deref(), Some(DEFAULT_DBFILENAME));
        assert_eq!(config.get("port").as_deref(), Some("6379"));
        assert_eq!(config.get("maxmemory"), None);
    }

    #[test]
    fn request_cap_defaults_to_16_mib() {
        assert_eq!(Config::default().max_request_bytes, 16 * 1024 * 1024);
    }
}
