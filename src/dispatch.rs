/*!
 * Command Dispatcher
 *
 * Routes parsed frames to the store and writes exactly one RESP reply per
 * request. Shared by every connection on every reactor thread.
 */

use crate::config::Config;
use crate::protocol::{
    write_array_len, write_bulk, write_error, write_null, write_simple, Cmd, Frame,
    INFO_REPLICATION,
};
use crate::storage::Store;
use bytes::{BufMut, BytesMut};
use std::sync::Arc;

/// Answers requests from the shared store and startup configuration
pub struct Dispatcher {
    store: Arc<Store>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one frame read from a connection
    ///
    /// Non-request lines and empty requests produce no reply. Everything
    /// else produces exactly one reply, success or `-ERR`.
    pub fn handle(&self, frame: Frame, out: &mut BytesMut) {
        match frame {
            Frame::Skipped => {}
            Frame::Request(args) if args.is_empty() => {}
            Frame::Request(args) => match Cmd::from_args(args) {
                Ok(cmd) => self.exec(cmd, out),
                Err(e) => write_error(&e.to_string(), out),
            },
            Frame::Invalid(e) => write_error(&e.to_string(), out),
        }
    }

    /// Execute a command and write its reply into `out`
    pub fn exec(&self, cmd: Cmd, out: &mut BytesMut) {
        match cmd {
            // Expiry-aware read; purges the key if it has expired
            Cmd::Get(k) => match self.store.get(&k) {
                Some(v) => write_bulk(&v, out),
                None => write_null(out),
            },

            Cmd::Info => out.put_slice(INFO_REPLICATION),

            Cmd::Type(k) => write_simple(self.store.key_type(&k), out),

            Cmd::ConfigGet(name) => {
                let value = std::str::from_utf8(&name)
                    .ok()
                    .and_then(|n| self.config.get(n));
                match value {
                    Some(v) => {
                        write_array_len(2, out);
                        write_bulk(&name, out);
                        write_bulk(v.as_bytes(), out);
                    }
                    None => write_array_len(0, out),
                }
            }
        }
    }
}
